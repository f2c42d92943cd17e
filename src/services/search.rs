use serde::{Deserialize, Serialize};

use crate::db::models::{DifficultyLevel, Video};

/// Maximum number of rows returned by one search.
pub const SEARCH_RESULT_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub course_id: Option<i32>,
    pub level: Option<String>,
}

/// A parsed search request: conjunctive over `tokens`, each token matched
/// case-insensitively as a substring of title, description, transcript or
/// difficulty level.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub raw: String,
    pub tokens: Vec<String>,
    pub course_id: Option<i32>,
    pub level: Option<DifficultyLevel>,
}

#[derive(Debug, Serialize)]
pub struct SearchPage {
    pub query: String,
    pub normalized_tokens: Vec<String>,
    pub total: i64,
    pub results: Vec<Video>,
}

/// Punctuation becomes a separator, then the query splits on whitespace.
///
/// Only ASCII punctuation is stripped, which also removes the `%`, `_` and
/// `\` characters that are special inside a LIKE pattern.
pub fn tokenize(raw: &str) -> Vec<String> {
    raw.chars()
        .map(|c| if c.is_ascii_punctuation() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_owned)
        .collect()
}

impl SearchQuery {
    pub fn new(raw: &str, course_id: Option<i32>, level: Option<DifficultyLevel>) -> Self {
        Self {
            raw: raw.to_owned(),
            tokens: tokenize(raw),
            course_id,
            level,
        }
    }

    /// `%token%` patterns for ILIKE, one per token.
    pub fn like_patterns(&self) -> Vec<String> {
        self.tokens.iter().map(|t| format!("%{t}%")).collect()
    }

    /// In-process equivalent of the SQL predicate built by the repository.
    #[cfg(test)]
    pub fn matches(&self, video: &Video) -> bool {
        if self.course_id.is_some() && video.course_id != self.course_id {
            return false;
        }
        if self.level.is_some() && video.difficulty_level != self.level {
            return false;
        }

        let fields = [
            Some(video.title.to_lowercase()),
            video.description.as_deref().map(str::to_lowercase),
            video.transcript.as_deref().map(str::to_lowercase),
            video.difficulty_level.map(|l| l.as_str().to_owned()),
        ];

        self.tokens.iter().all(|token| {
            let token = token.to_lowercase();
            fields.iter().flatten().any(|field| field.contains(&token))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(title: &str, transcript: Option<&str>) -> Video {
        Video {
            video_id: 1,
            course_id: None,
            uploaded_by: None,
            title: title.into(),
            description: None,
            file_url: "videos/x.mp4".into(),
            thumbnail_url: None,
            duration: None,
            transcript: transcript.map(Into::into),
            difficulty_level: None,
            tags: None,
            embedding_vector: None,
            uploaded_at: chrono::Utc::now().naive_utc(),
        }
    }

    #[test]
    fn punctuation_splits_tokens() {
        assert_eq!(tokenize("intro, to ML!"), vec!["intro", "to", "ML"]);
        assert_eq!(tokenize("rust's  borrow-checker"), vec!["rust", "s", "borrow", "checker"]);
    }

    #[test]
    fn punctuation_only_query_has_no_tokens() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  ?!., ;  ").is_empty());
        assert!(tokenize("%_\\").is_empty());
    }

    #[test]
    fn every_token_must_hit_some_field() {
        let query = SearchQuery::new("intro, to ML!", None, None);

        assert!(query.matches(&video("Intro to ML: Machine Learning", None)));
        assert!(query.matches(&video("Intro", Some("deep dive into ML systems"))));
        assert!(!query.matches(&video("Intro", None)));
        // "machine learning" does not contain "ml" as a substring.
        assert!(!query.matches(&video("Intro to Machine Learning", None)));
    }

    #[test]
    fn matching_is_substring_not_whole_word() {
        let query = SearchQuery::new("learn", None, None);
        assert!(query.matches(&video("Machine Learning", None)));
    }

    #[test]
    fn level_field_is_searchable() {
        let mut v = video("Closures", None);
        v.difficulty_level = Some(DifficultyLevel::Advanced);

        assert!(SearchQuery::new("closures ADVANCED", None, None).matches(&v));
        assert!(!SearchQuery::new("closures basic", None, None).matches(&v));
    }

    #[test]
    fn like_patterns_wrap_each_token() {
        let query = SearchQuery::new("a b", None, None);
        assert_eq!(query.like_patterns(), vec!["%a%", "%b%"]);
    }
}

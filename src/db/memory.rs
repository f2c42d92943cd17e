use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};

use crate::db::models::{NewVideo, Video};
use crate::db::repository::{SearchHits, VideoRepository};
use crate::db::DbError;
use crate::services::search::{SearchQuery, SEARCH_RESULT_LIMIT};

/// In-process `VideoRepository` for exercising the video flows in tests.
#[derive(Default)]
pub struct MemoryVideoRepository {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    courses: HashSet<i32>,
    videos: Vec<Video>,
    searches: Vec<(Option<i32>, String)>,
    fail_inserts: bool,
}

impl MemoryVideoRepository {
    pub fn with_courses(ids: &[i32]) -> Self {
        let repo = Self::default();
        repo.state.lock().unwrap().courses.extend(ids);
        repo
    }

    pub fn fail_inserts(&self) {
        self.state.lock().unwrap().fail_inserts = true;
    }

    /// Inserts a video with an explicit upload time, returning its id.
    pub fn seed(&self, video: NewVideo, uploaded_at: NaiveDateTime) -> i32 {
        let mut state = self.state.lock().unwrap();
        let video_id = state.videos.len() as i32 + 1;
        state.videos.push(materialize(video_id, video, uploaded_at));
        video_id
    }

    pub fn videos(&self) -> Vec<Video> {
        self.state.lock().unwrap().videos.clone()
    }

    pub fn searches(&self) -> Vec<(Option<i32>, String)> {
        self.state.lock().unwrap().searches.clone()
    }
}

fn materialize(video_id: i32, video: NewVideo, uploaded_at: NaiveDateTime) -> Video {
    Video {
        video_id,
        course_id: video.course_id,
        uploaded_by: video.uploaded_by,
        title: video.title,
        description: video.description,
        file_url: video.file_url,
        thumbnail_url: video.thumbnail_url,
        duration: video.duration,
        transcript: video.transcript,
        difficulty_level: video.difficulty_level,
        tags: video.tags,
        embedding_vector: None,
        uploaded_at,
    }
}

#[async_trait]
impl VideoRepository for MemoryVideoRepository {
    async fn course_exists(&self, course_id: i32) -> Result<bool, DbError> {
        Ok(self.state.lock().unwrap().courses.contains(&course_id))
    }

    async fn insert_video(&self, video: NewVideo) -> Result<Video, DbError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_inserts {
            return Err(DbError::Query(diesel::result::Error::BrokenTransactionManager));
        }
        let video_id = state.videos.len() as i32 + 1;
        let uploaded_at = Utc::now().naive_utc() + Duration::milliseconds(video_id as i64);
        let video = materialize(video_id, video, uploaded_at);
        state.videos.push(video.clone());
        Ok(video)
    }

    async fn find_video(&self, video_id: i32) -> Result<Option<Video>, DbError> {
        let state = self.state.lock().unwrap();
        Ok(state.videos.iter().find(|v| v.video_id == video_id).cloned())
    }

    async fn search_videos(&self, query: &SearchQuery) -> Result<SearchHits, DbError> {
        let state = self.state.lock().unwrap();
        let mut hits: Vec<Video> = state
            .videos
            .iter()
            .filter(|v| query.matches(v))
            .cloned()
            .collect();
        hits.sort_by(|a, b| {
            b.uploaded_at
                .cmp(&a.uploaded_at)
                .then(b.video_id.cmp(&a.video_id))
        });

        let total = hits.len() as i64;
        hits.truncate(SEARCH_RESULT_LIMIT as usize);
        Ok(SearchHits {
            total,
            videos: hits,
        })
    }

    async fn record_search(&self, user_id: Option<i32>, query: &str) -> Result<(), DbError> {
        self.state
            .lock()
            .unwrap()
            .searches
            .push((user_id, query.to_owned()));
        Ok(())
    }
}

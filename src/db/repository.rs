use async_trait::async_trait;
use diesel::dsl::sql;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use diesel_async::RunQueryDsl;

use crate::db::models::{NewSearchLog, NewVideo, Video};
use crate::db::schema::{courses, search_logs, videos};
use crate::db::{connection, DbError, DbPool};
use crate::services::search::{SearchQuery, SEARCH_RESULT_LIMIT};

/// Matching rows for a search: the unbounded count and the first page.
#[derive(Debug)]
pub struct SearchHits {
    pub total: i64,
    pub videos: Vec<Video>,
}

/// Video persistence used by the upload, playback and search flows.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn course_exists(&self, course_id: i32) -> Result<bool, DbError>;
    async fn insert_video(&self, video: NewVideo) -> Result<Video, DbError>;
    async fn find_video(&self, video_id: i32) -> Result<Option<Video>, DbError>;
    async fn search_videos(&self, query: &SearchQuery) -> Result<SearchHits, DbError>;
    async fn record_search(&self, user_id: Option<i32>, query: &str) -> Result<(), DbError>;
}

pub struct PgVideoRepository {
    pool: DbPool,
}

impl PgVideoRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Adds the course, level and token predicates to a boxed `videos` query.
fn apply_search<'a, ST>(
    mut statement: videos::BoxedQuery<'a, Pg, ST>,
    query: &SearchQuery,
) -> videos::BoxedQuery<'a, Pg, ST> {
    if let Some(course_id) = query.course_id {
        statement = statement.filter(videos::course_id.eq(course_id));
    }
    if let Some(level) = query.level {
        statement = statement.filter(videos::difficulty_level.eq(level));
    }
    for pattern in query.like_patterns() {
        statement = statement.filter(
            videos::title
                .nullable()
                .ilike(pattern.clone())
                .or(videos::description.ilike(pattern.clone()))
                .or(videos::transcript.ilike(pattern.clone()))
                .or(videos::difficulty_level.ilike(pattern)),
        );
    }
    statement
}

/// Newest first, capped to one result page.
fn newest_page<'a, ST>(
    statement: videos::BoxedQuery<'a, Pg, ST>,
) -> videos::BoxedQuery<'a, Pg, ST> {
    statement
        .order((videos::uploaded_at.desc(), videos::video_id.desc()))
        .limit(SEARCH_RESULT_LIMIT)
}

/// Window count over the filtered set, evaluated before `LIMIT`.
fn total_matches() -> diesel::expression::SqlLiteral<BigInt> {
    sql::<BigInt>("count(*) OVER ()")
}

#[async_trait]
impl VideoRepository for PgVideoRepository {
    async fn course_exists(&self, course_id: i32) -> Result<bool, DbError> {
        let conn = &mut connection(&self.pool).await?;
        let found = courses::table
            .find(course_id)
            .select(courses::course_id)
            .first::<i32>(conn)
            .await
            .optional()?;
        Ok(found.is_some())
    }

    async fn insert_video(&self, video: NewVideo) -> Result<Video, DbError> {
        let conn = &mut connection(&self.pool).await?;
        let video = diesel::insert_into(videos::table)
            .values(&video)
            .returning(Video::as_returning())
            .get_result(conn)
            .await?;
        Ok(video)
    }

    async fn find_video(&self, video_id: i32) -> Result<Option<Video>, DbError> {
        let conn = &mut connection(&self.pool).await?;
        let video = videos::table
            .find(video_id)
            .select(Video::as_select())
            .first(conn)
            .await
            .optional()?;
        Ok(video)
    }

    async fn search_videos(&self, query: &SearchQuery) -> Result<SearchHits, DbError> {
        let conn = &mut connection(&self.pool).await?;

        // One statement, so the count and the page share a snapshot.
        let rows = newest_page(apply_search(
            videos::table
                .select((Video::as_select(), total_matches()))
                .into_boxed(),
            query,
        ))
        .load::<(Video, i64)>(conn)
        .await?;

        let total = rows.as_slice().first().map_or(0, |(_, total)| *total);
        let videos = rows.into_iter().map(|(video, _)| video).collect();
        Ok(SearchHits { total, videos })
    }

    async fn record_search(&self, user_id: Option<i32>, query: &str) -> Result<(), DbError> {
        let conn = &mut connection(&self.pool).await?;
        diesel::insert_into(search_logs::table)
            .values(&NewSearchLog {
                user_id,
                query: query.chars().take(255).collect(),
            })
            .execute(conn)
            .await?;
        Ok(())
    }
}

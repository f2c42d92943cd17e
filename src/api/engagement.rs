use actix_web::{web, HttpResponse};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use serde_json::json;

use crate::api::auth::AuthUser;
use crate::db::models::{
    Bookmark, Comment, NewBookmark, NewComment, NewLike, NewRating, NewVideoProgress, Rating,
    VideoProgress,
};
use crate::db::schema::{bookmarks, comments, likes, ratings, video_progress, videos};
use crate::db::{connection, DbConnection, DbPool};
use crate::error::ApiError;

/// Routes nested under `/videos`.
pub fn video_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/{id}/like/")
            .route(web::post().to(like))
            .route(web::delete().to(unlike)),
    )
    .service(
        web::resource("/{id}/bookmark/")
            .route(web::post().to(bookmark))
            .route(web::delete().to(remove_bookmark)),
    )
    .service(
        web::resource("/{id}/comments/")
            .route(web::get().to(list_comments))
            .route(web::post().to(add_comment)),
    )
    .route("/{id}/rating/", web::put().to(rate));
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/progress/")
            .route(web::get().to(list_progress))
            .route(web::put().to(save_progress)),
    )
    .route("/bookmarks/", web::get().to(list_bookmarks));
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub video: i32,
    #[serde(default)]
    pub watched_seconds: i32,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub rating: i32,
}

fn validate_rating(rating: i32) -> Result<(), ApiError> {
    if (1..=5).contains(&rating) {
        Ok(())
    } else {
        Err(ApiError::validation(
            "rating",
            "Ensure this value is between 1 and 5.",
        ))
    }
}

async fn ensure_video(conn: &mut DbConnection, video_id: i32) -> Result<(), ApiError> {
    let found = videos::table
        .find(video_id)
        .select(videos::video_id)
        .first::<i32>(conn)
        .await
        .optional()?;
    found
        .map(|_| ())
        .ok_or_else(|| ApiError::NotFound("No Video matches the given query.".to_string()))
}

async fn like_count(conn: &mut DbConnection, video_id: i32) -> Result<i64, ApiError> {
    Ok(likes::table
        .filter(likes::video_id.eq(video_id))
        .count()
        .get_result(conn)
        .await?)
}

async fn list_progress(auth: AuthUser, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let conn = &mut connection(&pool).await?;
    let rows = video_progress::table
        .filter(video_progress::user_id.eq(auth.user_id))
        .order_by(video_progress::updated_at.desc())
        .select(VideoProgress::as_select())
        .load(conn)
        .await?;
    Ok(HttpResponse::Ok().json(rows))
}

/// One progress row per (user, video); later writes overwrite earlier ones.
async fn save_progress(
    auth: AuthUser,
    body: web::Json<ProgressRequest>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    if body.watched_seconds < 0 {
        return Err(ApiError::validation(
            "watched_seconds",
            "Ensure this value is greater than or equal to 0.",
        ));
    }

    let conn = &mut connection(&pool).await?;
    ensure_video(conn, body.video).await?;

    let row = diesel::insert_into(video_progress::table)
        .values(&NewVideoProgress {
            user_id: auth.user_id,
            video_id: body.video,
            watched_seconds: body.watched_seconds,
            completed: body.completed,
        })
        .on_conflict((video_progress::user_id, video_progress::video_id))
        .do_update()
        .set((
            video_progress::watched_seconds.eq(excluded(video_progress::watched_seconds)),
            video_progress::completed.eq(excluded(video_progress::completed)),
            video_progress::updated_at.eq(diesel::dsl::now),
        ))
        .returning(VideoProgress::as_returning())
        .get_result(conn)
        .await?;
    Ok(HttpResponse::Ok().json(row))
}

async fn like(
    auth: AuthUser,
    path: web::Path<i32>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    let video_id = path.into_inner();
    let conn = &mut connection(&pool).await?;
    ensure_video(conn, video_id).await?;

    diesel::insert_into(likes::table)
        .values(&NewLike {
            user_id: auth.user_id,
            video_id,
        })
        .on_conflict_do_nothing()
        .execute(conn)
        .await?;

    let count = like_count(conn, video_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "liked": true, "likes": count })))
}

async fn unlike(
    auth: AuthUser,
    path: web::Path<i32>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    let video_id = path.into_inner();
    let conn = &mut connection(&pool).await?;

    diesel::delete(
        likes::table
            .filter(likes::user_id.eq(auth.user_id))
            .filter(likes::video_id.eq(video_id)),
    )
    .execute(conn)
    .await?;

    let count = like_count(conn, video_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "liked": false, "likes": count })))
}

async fn bookmark(
    auth: AuthUser,
    path: web::Path<i32>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    let video_id = path.into_inner();
    let conn = &mut connection(&pool).await?;
    ensure_video(conn, video_id).await?;

    diesel::insert_into(bookmarks::table)
        .values(&NewBookmark {
            user_id: auth.user_id,
            video_id,
        })
        .on_conflict_do_nothing()
        .execute(conn)
        .await?;

    let row = bookmarks::table
        .filter(bookmarks::user_id.eq(auth.user_id))
        .filter(bookmarks::video_id.eq(video_id))
        .select(Bookmark::as_select())
        .first(conn)
        .await?;
    Ok(HttpResponse::Created().json(row))
}

async fn remove_bookmark(
    auth: AuthUser,
    path: web::Path<i32>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    let conn = &mut connection(&pool).await?;
    let removed = diesel::delete(
        bookmarks::table
            .filter(bookmarks::user_id.eq(auth.user_id))
            .filter(bookmarks::video_id.eq(path.into_inner())),
    )
    .execute(conn)
    .await?;

    if removed == 0 {
        return Err(ApiError::NotFound("Not found.".to_string()));
    }
    Ok(HttpResponse::NoContent().finish())
}

async fn list_bookmarks(auth: AuthUser, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let conn = &mut connection(&pool).await?;
    let rows = bookmarks::table
        .filter(bookmarks::user_id.eq(auth.user_id))
        .order_by(bookmarks::created_at.desc())
        .select(Bookmark::as_select())
        .load(conn)
        .await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn list_comments(
    path: web::Path<i32>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    let video_id = path.into_inner();
    let conn = &mut connection(&pool).await?;
    ensure_video(conn, video_id).await?;

    let rows = comments::table
        .filter(comments::video_id.eq(video_id))
        .order_by((comments::created_at.desc(), comments::id.desc()))
        .select(Comment::as_select())
        .load(conn)
        .await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn add_comment(
    auth: AuthUser,
    path: web::Path<i32>,
    body: web::Json<CommentRequest>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    let text = body.into_inner().text;
    if text.trim().is_empty() {
        return Err(ApiError::validation("text", "This field may not be blank."));
    }

    let video_id = path.into_inner();
    let conn = &mut connection(&pool).await?;
    ensure_video(conn, video_id).await?;

    let row = diesel::insert_into(comments::table)
        .values(&NewComment {
            user_id: auth.user_id,
            video_id,
            text,
        })
        .returning(Comment::as_returning())
        .get_result(conn)
        .await?;
    Ok(HttpResponse::Created().json(row))
}

/// One rating per (user, video); re-rating replaces the value.
async fn rate(
    auth: AuthUser,
    path: web::Path<i32>,
    body: web::Json<RatingRequest>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    validate_rating(body.rating)?;

    let video_id = path.into_inner();
    let conn = &mut connection(&pool).await?;
    ensure_video(conn, video_id).await?;

    let row = diesel::insert_into(ratings::table)
        .values(&NewRating {
            user_id: auth.user_id,
            video_id,
            rating: body.rating,
        })
        .on_conflict((ratings::user_id, ratings::video_id))
        .do_update()
        .set(ratings::rating.eq(excluded(ratings::rating)))
        .returning(Rating::as_returning())
        .get_result(conn)
        .await?;
    Ok(HttpResponse::Ok().json(row))
}

use std::collections::HashMap;

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use futures::TryStreamExt;
use serde_json::json;

use crate::api::auth::AuthUser;
use crate::api::engagement;
use crate::api::shared::{ListQueryParams, PageMeta};
use crate::db::models::Video;
use crate::db::schema::videos;
use crate::db::{connection, DbPool};
use crate::error::ApiError;
use crate::services::search::SearchParams;
use crate::services::upload::{SpoolWriter, SpooledFile, VideoUploadForm, DEFAULT_CONTENT_TYPE};
use crate::services::VideoService;

/// Upper bound for any non-file form field (transcripts included).
const MAX_TEXT_FIELD_BYTES: usize = 4 * 1024 * 1024;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/videos")
            .route("/", web::get().to(list_videos))
            .route("/upload/", web::post().to(upload_video))
            .route("/search/", web::get().to(search_videos))
            .service(
                web::resource("/{id}/")
                    .route(web::get().to(get_video))
                    .route(web::delete().to(delete_video)),
            )
            .route("/{id}/play/", web::get().to(play_video))
            .configure(engagement::video_routes),
    );
}

/// Spools the `file` part to disk and collects every other part as text.
async fn read_upload(
    mut payload: Multipart,
    service: &VideoService,
) -> Result<(Option<SpooledFile>, HashMap<String, String>), ApiError> {
    let mut file = None;
    let mut fields = HashMap::new();

    while let Some(mut field) = payload.try_next().await? {
        let name = field
            .name()
            .map(str::to_owned)
            .ok_or_else(|| ApiError::BadRequest("No field name".to_string()))?;

        if name == "file" {
            let file_name = field
                .content_disposition()
                .and_then(|cd| cd.get_filename())
                .map(str::to_owned)
                .ok_or_else(|| {
                    ApiError::validation(
                        "file",
                        "The submitted data was not a file. Check the encoding type on the form.",
                    )
                })?;
            let content_type = field
                .content_type()
                .map(|m| m.to_string())
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

            let mut writer = SpoolWriter::create(service.spool()).await?;
            while let Some(chunk) = field.try_next().await? {
                writer.write_chunk(&chunk).await?;
            }
            file = Some(writer.finish(file_name, content_type).await?);
        } else {
            let mut value = Vec::new();
            while let Some(chunk) = field.try_next().await? {
                if value.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
                    return Err(ApiError::validation(&name, "Field is too large."));
                }
                value.extend_from_slice(&chunk);
            }
            let value = String::from_utf8(value)
                .map_err(|_| ApiError::validation(&name, "Field is not valid UTF-8."))?;
            fields.insert(name, value);
        }
    }

    Ok((file, fields))
}

pub async fn upload_video(
    auth: AuthUser,
    payload: Multipart,
    service: web::Data<VideoService>,
) -> Result<HttpResponse, ApiError> {
    let (file, fields) = read_upload(payload, &service).await?;
    let file =
        file.ok_or_else(|| ApiError::validation("file", "No file was submitted."))?;
    let form = VideoUploadForm::from_fields(fields)?;

    let video = service.upload(file, form, auth.user_id).await?;
    Ok(HttpResponse::Created().json(video))
}

pub async fn play_video(
    _auth: AuthUser,
    path: web::Path<i32>,
    service: web::Data<VideoService>,
) -> Result<HttpResponse, ApiError> {
    let url = service.playback_url(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "url": url })))
}

pub async fn search_videos(
    auth: Option<AuthUser>,
    query: web::Query<SearchParams>,
    service: web::Data<VideoService>,
) -> Result<HttpResponse, ApiError> {
    let page = service
        .search(query.into_inner(), auth.map(|a| a.user_id))
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

pub async fn list_videos(
    query: web::Query<ListQueryParams>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    let conn = &mut connection(&pool).await?;
    let (page, per_page, offset) = query.resolve();

    let video_list = videos::table
        .select(Video::as_select())
        .order_by((videos::uploaded_at.desc(), videos::video_id.desc()))
        .offset(offset)
        .limit(per_page)
        .load(conn)
        .await?;

    let total_count: i64 = videos::table.count().get_result(conn).await?;

    Ok(HttpResponse::Ok().json(json!({
        "videos": video_list,
        "meta": PageMeta::new(total_count, page, per_page),
    })))
}

pub async fn get_video(
    path: web::Path<i32>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    let conn = &mut connection(&pool).await?;
    let video = videos::table
        .find(path.into_inner())
        .select(Video::as_select())
        .first(conn)
        .await?;
    Ok(HttpResponse::Ok().json(video))
}

/// Removes the metadata row only; the stored object is left in place.
pub async fn delete_video(
    auth: AuthUser,
    path: web::Path<i32>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    let video_id = path.into_inner();
    let conn = &mut connection(&pool).await?;
    let uploader: Option<i32> = videos::table
        .find(video_id)
        .select(videos::uploaded_by)
        .first(conn)
        .await?;

    if uploader != Some(auth.user_id) && !auth.is_admin() {
        return Err(ApiError::Forbidden(
            "You do not have permission to perform this action.".to_string(),
        ));
    }

    diesel::delete(videos::table.find(video_id))
        .execute(conn)
        .await?;
    log::info!("User {} deleted video {}", auth.user_id, video_id);
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::db::memory::MemoryVideoRepository;
    use crate::services::auth::JwtKeys;
    use crate::services::upload::SpoolSettings;
    use crate::storage::memory::MemoryObjectStore;
    use actix_web::{http::StatusCode, test, App};
    use std::sync::Arc;

    const BOUNDARY: &str = "----portal-test-boundary";

    struct TestApp {
        store: Arc<MemoryObjectStore>,
        repo: Arc<MemoryVideoRepository>,
        service: web::Data<VideoService>,
        keys: web::Data<JwtKeys>,
        _spool_dir: tempfile::TempDir,
    }

    fn test_app() -> TestApp {
        let spool_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new("studentportalvideos"));
        let repo = Arc::new(MemoryVideoRepository::with_courses(&[1]));
        let service = VideoService::new(
            repo.clone(),
            store.clone(),
            SpoolSettings {
                dir: spool_dir.path().to_path_buf(),
                max_file_size: 1024,
            },
        );
        let keys = JwtKeys::new(&AuthConfig {
            jwt_secret: "test-secret".to_string(),
            token_ttl_secs: 3600,
        });
        TestApp {
            store,
            repo,
            service: web::Data::new(service),
            keys: web::Data::new(keys),
            _spool_dir: spool_dir,
        }
    }

    fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, content_type, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(token: Option<&str>, body: Vec<u8>) -> test::TestRequest {
        let mut req = test::TestRequest::post()
            .uri("/api/videos/upload/")
            .insert_header((
                "Content-Type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(body);
        if let Some(token) = token {
            req = req.insert_header(("Authorization", format!("Bearer {token}")));
        }
        req
    }

    #[actix_web::test]
    async fn upload_then_play_then_search() {
        let ctx = test_app();
        let token = ctx.keys.issue(5, "i@school.edu", "instructor").unwrap().access_token;
        let app = test::init_service(
            App::new()
                .app_data(ctx.service.clone())
                .app_data(ctx.keys.clone())
                .configure(crate::api::configure),
        )
        .await;

        let body = multipart_body(
            &[
                ("title", "Intro to ML"),
                ("course", "1"),
                ("difficulty_level", "basic"),
                ("tags", r#"{"topic":"ml"}"#),
            ],
            Some(("lecture one.mp4", "video/mp4", b"fake-video-bytes")),
        );
        let resp = test::call_service(&app, upload_request(Some(&token), body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: serde_json::Value = test::read_body_json(resp).await;

        let key = created["file_url"].as_str().unwrap().to_string();
        assert!(key.starts_with("videos/") && key.ends_with(".mp4"));
        assert_eq!(created["uploaded_by"], 5);
        assert_eq!(created["tags"]["topic"], "ml");
        assert!(created["presigned_url"].as_str().is_some());
        assert!(created["object_url"].as_str().unwrap().ends_with(&key));
        assert_eq!(ctx.store.object(&key).unwrap().bytes, b"fake-video-bytes");

        let video_id = created["video_id"].as_i64().unwrap();
        let req = test::TestRequest::get()
            .uri(&format!("/api/videos/{video_id}/play/"))
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let played: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert!(played["url"].as_str().unwrap().contains(&key));

        let req = test::TestRequest::get()
            .uri("/api/videos/search/?q=intro%2C+ML%21&level=basic")
            .to_request();
        let found: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(found["query"], "intro, ML!");
        assert_eq!(found["normalized_tokens"], json!(["intro", "ML"]));
        assert_eq!(found["total"], 1);
        assert_eq!(found["results"][0]["video_id"], video_id);
    }

    #[actix_web::test]
    async fn upload_requires_authentication() {
        let ctx = test_app();
        let app = test::init_service(
            App::new()
                .app_data(ctx.service.clone())
                .app_data(ctx.keys.clone())
                .configure(crate::api::configure),
        )
        .await;

        let body = multipart_body(&[("title", "x")], Some(("a.mp4", "video/mp4", b"x")));
        let resp = test::call_service(&app, upload_request(None, body).to_request()).await;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(ctx.store.keys().is_empty());
    }

    #[actix_web::test]
    async fn invalid_tags_are_a_field_error_and_store_nothing() {
        let ctx = test_app();
        let token = ctx.keys.issue(5, "i@school.edu", "student").unwrap().access_token;
        let app = test::init_service(
            App::new()
                .app_data(ctx.service.clone())
                .app_data(ctx.keys.clone())
                .configure(crate::api::configure),
        )
        .await;

        let body = multipart_body(
            &[("title", "x"), ("tags", "{oops")],
            Some(("a.mp4", "video/mp4", b"x")),
        );
        let resp = test::call_service(&app, upload_request(Some(&token), body).to_request()).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "tags": ["Invalid JSON"] }));
        assert!(ctx.store.keys().is_empty());
        assert!(ctx.repo.videos().is_empty());
    }

    #[actix_web::test]
    async fn oversized_upload_is_rejected() {
        let ctx = test_app();
        let token = ctx.keys.issue(5, "i@school.edu", "student").unwrap().access_token;
        let app = test::init_service(
            App::new()
                .app_data(ctx.service.clone())
                .app_data(ctx.keys.clone())
                .configure(crate::api::configure),
        )
        .await;

        let big = vec![0u8; 2048];
        let body = multipart_body(&[("title", "x")], Some(("a.mp4", "video/mp4", &big)));
        let resp = test::call_service(&app, upload_request(Some(&token), body).to_request()).await;

        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(ctx.store.keys().is_empty());
    }

    #[actix_web::test]
    async fn playing_an_object_missing_from_the_store_is_a_500() {
        let ctx = test_app();
        let token = ctx.keys.issue(5, "i@school.edu", "student").unwrap().access_token;
        let video_id = ctx.repo.seed(
            crate::db::models::NewVideo {
                course_id: None,
                uploaded_by: None,
                title: "lost".into(),
                description: None,
                file_url: "videos/missing.mp4".into(),
                thumbnail_url: None,
                duration: None,
                transcript: None,
                difficulty_level: None,
                tags: None,
            },
            chrono::Utc::now().naive_utc(),
        );
        let app = test::init_service(
            App::new()
                .app_data(ctx.service.clone())
                .app_data(ctx.keys.clone())
                .configure(crate::api::configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/api/videos/{video_id}/play/"))
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["detail"], "Unable to get video URL");
        assert!(body["error"].as_str().unwrap().contains("videos/missing.mp4"));
    }
}

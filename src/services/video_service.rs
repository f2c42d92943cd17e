use std::sync::Arc;
use std::time::Duration;

use crate::db::models::{DifficultyLevel, VideoWithUrls};
use crate::db::repository::VideoRepository;
use crate::error::ApiError;
use crate::services::search::{SearchPage, SearchParams, SearchQuery};
use crate::services::upload::{object_key, SpoolSettings, SpooledFile, VideoUploadForm};
use crate::storage::ObjectStore;

/// Lifetime of every signed playback URL.
pub const PLAYBACK_URL_TTL: Duration = Duration::from_secs(60 * 60);

/// Upload, playback and search over an injected repository and object store.
pub struct VideoService {
    repo: Arc<dyn VideoRepository>,
    store: Arc<dyn ObjectStore>,
    spool: SpoolSettings,
}

impl VideoService {
    pub fn new(
        repo: Arc<dyn VideoRepository>,
        store: Arc<dyn ObjectStore>,
        spool: SpoolSettings,
    ) -> Self {
        Self { repo, store, spool }
    }

    pub fn spool(&self) -> &SpoolSettings {
        &self.spool
    }

    /// Stores the bytes, then the metadata row. A failed object write leaves
    /// no row behind.
    pub async fn upload(
        &self,
        file: SpooledFile,
        form: VideoUploadForm,
        uploaded_by: i32,
    ) -> Result<VideoWithUrls, ApiError> {
        if let Some(course_id) = form.course_id {
            if !self.repo.course_exists(course_id).await? {
                return Err(ApiError::validation(
                    "course",
                    format!("Invalid pk \"{course_id}\" - object does not exist."),
                ));
            }
        }

        let key = object_key(file.file_name());
        self.store
            .put_object(&key, file.path(), file.length(), file.content_type())
            .await
            .map_err(|e| ApiError::storage("Unable to store video", e))?;
        log::info!(
            "Stored {} ({} bytes, {}) for user {}",
            key,
            file.length(),
            file.content_type(),
            uploaded_by
        );
        drop(file);

        let video = self
            .repo
            .insert_video(form.into_new_video(key.clone(), Some(uploaded_by)))
            .await
            .map_err(|e| {
                log::warn!("Metadata insert failed after storing {key}; object is orphaned: {e}");
                e
            })?;

        let presigned_url = match self.store.presigned_get_url(&key, PLAYBACK_URL_TTL).await {
            Ok(url) => Some(url),
            Err(e) => {
                log::warn!("Could not presign freshly stored {key}: {e}");
                None
            }
        };

        Ok(VideoWithUrls {
            object_url: self.store.object_url(&key),
            video,
            presigned_url,
        })
    }

    pub async fn playback_url(&self, video_id: i32) -> Result<String, ApiError> {
        let video = self
            .repo
            .find_video(video_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("No Video matches the given query.".to_string()))?;

        self.store
            .presigned_get_url(&video.file_url, PLAYBACK_URL_TTL)
            .await
            .map_err(|e| ApiError::storage("Unable to get video URL", e))
    }

    pub async fn search(
        &self,
        params: SearchParams,
        user_id: Option<i32>,
    ) -> Result<SearchPage, ApiError> {
        let level = params
            .level
            .as_deref()
            .filter(|l| !l.is_empty())
            .map(|l| {
                l.parse::<DifficultyLevel>()
                    .map_err(|e| ApiError::validation("level", e))
            })
            .transpose()?;
        let raw = params.q.unwrap_or_default();
        let query = SearchQuery::new(&raw, params.course_id, level);

        if !raw.trim().is_empty() {
            if let Err(e) = self.repo.record_search(user_id, &raw).await {
                log::warn!("Failed to record search log: {e}");
            }
        }

        let hits = self.repo.search_videos(&query).await?;
        Ok(SearchPage {
            query: query.raw,
            normalized_tokens: query.tokens,
            total: hits.total,
            results: hits.videos,
        })
    }
}

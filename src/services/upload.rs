use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::db::models::{DifficultyLevel, NewVideo};
use crate::error::ApiError;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const MAX_TITLE_CHARS: usize = 200;
const MAX_URL_CHARS: usize = 500;

/// NFKD-normalizes the name and keeps only `[A-Za-z0-9_.-]` style characters,
/// with spaces turned into underscores.
pub fn sanitize_filename(name: &str) -> String {
    name.nfkd()
        .collect::<String>()
        .trim()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect()
}

/// Extension including the leading dot, or "" when there is none. A leading
/// dot (".bashrc") does not start an extension.
fn extension(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) if file_name[..idx].chars().any(|c| c != '.') => &file_name[idx..],
        _ => "",
    }
}

/// `videos/<random 128-bit hex>.<ext>`; only the extension comes from the client.
pub fn object_key(original_name: &str) -> String {
    let safe = sanitize_filename(original_name);
    format!("videos/{}{}", Uuid::new_v4().simple(), extension(&safe))
}

/// Where uploads are buffered on disk and how large they may get.
#[derive(Debug, Clone)]
pub struct SpoolSettings {
    pub dir: PathBuf,
    pub max_file_size: usize,
}

impl From<&StorageConfig> for SpoolSettings {
    fn from(config: &StorageConfig) -> Self {
        Self {
            dir: PathBuf::from(&config.upload_path),
            max_file_size: config.max_file_size,
        }
    }
}

/// A fully received upload on local disk. The file is removed on drop.
#[derive(Debug)]
pub struct SpooledFile {
    path: PathBuf,
    length: u64,
    file_name: String,
    content_type: String,
}

impl SpooledFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

impl Drop for SpooledFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove spool file {}: {}", self.path.display(), e);
            }
        }
    }
}

pub struct SpoolWriter {
    file: File,
    spooled: SpooledFile,
    limit: usize,
}

impl SpoolWriter {
    pub async fn create(settings: &SpoolSettings) -> Result<Self, ApiError> {
        let path = settings.dir.join(format!("{}.part", Uuid::new_v4().simple()));
        let file = File::create(&path).await.map_err(|e| {
            log::error!("Failed to create spool file {}: {}", path.display(), e);
            ApiError::Internal("Storage error".to_string())
        })?;

        Ok(Self {
            file,
            spooled: SpooledFile {
                path,
                length: 0,
                file_name: String::new(),
                content_type: String::new(),
            },
            limit: settings.max_file_size,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), ApiError> {
        let length = self.spooled.length + chunk.len() as u64;
        if length > self.limit as u64 {
            return Err(ApiError::PayloadTooLarge { limit: self.limit });
        }
        self.file.write_all(chunk).await.map_err(|e| {
            log::error!("Error writing chunk: {}", e);
            ApiError::Internal("Storage error".to_string())
        })?;
        self.spooled.length = length;
        Ok(())
    }

    pub async fn finish(
        mut self,
        file_name: String,
        content_type: String,
    ) -> Result<SpooledFile, ApiError> {
        self.file.sync_all().await.map_err(|e| {
            log::error!("Error syncing file: {}", e);
            ApiError::Internal("Storage error".to_string())
        })?;
        self.spooled.file_name = file_name;
        self.spooled.content_type = content_type;
        Ok(self.spooled)
    }
}

/// Metadata fields of the upload form, decoded and validated.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoUploadForm {
    pub title: String,
    pub course_id: Option<i32>,
    pub description: Option<String>,
    pub difficulty_level: Option<DifficultyLevel>,
    pub tags: Option<serde_json::Value>,
    pub thumbnail_url: Option<String>,
    pub duration: Option<i32>,
    pub transcript: Option<String>,
}

/// Multipart sends every value as text, so `tags` always arrives as JSON text.
pub fn decode_tags(raw: &str) -> Result<serde_json::Value, ApiError> {
    serde_json::from_str(raw).map_err(|_| ApiError::validation("tags", "Invalid JSON"))
}

fn non_blank(fields: &mut HashMap<String, String>, name: &str) -> Option<String> {
    fields.remove(name).filter(|v| !v.trim().is_empty())
}

fn parse_int(field: &str, raw: Option<String>) -> Result<Option<i32>, ApiError> {
    raw.map(|v| {
        v.trim()
            .parse::<i32>()
            .map_err(|_| ApiError::validation(field, "A valid integer is required."))
    })
    .transpose()
}

impl VideoUploadForm {
    pub fn from_fields(mut fields: HashMap<String, String>) -> Result<Self, ApiError> {
        let title = non_blank(&mut fields, "title")
            .ok_or_else(|| ApiError::validation("title", "This field is required."))?;
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(ApiError::validation(
                "title",
                format!("Ensure this field has no more than {MAX_TITLE_CHARS} characters."),
            ));
        }

        let course_id = parse_int("course", non_blank(&mut fields, "course"))?;
        let duration = parse_int("duration", non_blank(&mut fields, "duration"))?;
        if duration.is_some_and(|d| d < 0) {
            return Err(ApiError::validation(
                "duration",
                "Ensure this value is greater than or equal to 0.",
            ));
        }

        let difficulty_level = non_blank(&mut fields, "difficulty_level")
            .map(|v| {
                v.parse::<DifficultyLevel>()
                    .map_err(|e| ApiError::validation("difficulty_level", e))
            })
            .transpose()?;

        let tags = non_blank(&mut fields, "tags")
            .map(|v| decode_tags(&v))
            .transpose()?;

        let thumbnail_url = non_blank(&mut fields, "thumbnail_url");
        if thumbnail_url
            .as_ref()
            .is_some_and(|u| u.chars().count() > MAX_URL_CHARS)
        {
            return Err(ApiError::validation(
                "thumbnail_url",
                format!("Ensure this field has no more than {MAX_URL_CHARS} characters."),
            ));
        }

        Ok(Self {
            title,
            course_id,
            description: non_blank(&mut fields, "description"),
            difficulty_level,
            tags,
            thumbnail_url,
            duration,
            transcript: non_blank(&mut fields, "transcript"),
        })
    }

    pub fn into_new_video(self, file_url: String, uploaded_by: Option<i32>) -> NewVideo {
        NewVideo {
            course_id: self.course_id,
            uploaded_by,
            title: self.title,
            description: self.description,
            file_url,
            thumbnail_url: self.thumbnail_url,
            duration: self.duration,
            transcript: self.transcript,
            difficulty_level: self.difficulty_level,
            tags: self.tags,
        }
    }
}

/// Writes `bytes` through a `SpoolWriter`, as the multipart handler would.
#[cfg(test)]
pub async fn spool_bytes(
    settings: &SpoolSettings,
    bytes: &[u8],
    file_name: &str,
    content_type: &str,
) -> Result<SpooledFile, ApiError> {
    let mut writer = SpoolWriter::create(settings).await?;
    writer.write_chunk(bytes).await?;
    writer
        .finish(file_name.to_owned(), content_type.to_owned())
        .await
}

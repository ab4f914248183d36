use chrono::Utc;
use std::path::PathBuf;
use tracing::{info, instrument};

use crate::store::file::classify_io;
use crate::{Result, ShopError};

/// Public URL prefix uploaded images are served under.
pub const UPLOADS_URL_PREFIX: &str = "/images/uploads";

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "avif", "svg"];

#[derive(Clone)]
pub struct MediaService {
    upload_dir: PathBuf,
}

impl MediaService {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self { Self { upload_dir: upload_dir.into() } }

    pub fn upload_dir(&self) -> &PathBuf { &self.upload_dir }

    /// Stores an uploaded image and returns the URL it is served at.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn save_image(&self, original_name: &str, bytes: &[u8]) -> Result<String> {
        if bytes.is_empty() {
            return Err(ShopError::Validation("No file received".to_string()));
        }
        let name = sanitize_file_name(original_name)?;
        let file_name = format!("upload_{}_{name}", Utc::now().timestamp_millis());

        tokio::fs::create_dir_all(&self.upload_dir).await.map_err(|e| ShopError::from(classify_io(e)))?;
        tokio::fs::write(self.upload_dir.join(&file_name), bytes).await.map_err(|e| ShopError::from(classify_io(e)))?;

        info!(file = %file_name, "image stored");
        Ok(format!("{UPLOADS_URL_PREFIX}/{file_name}"))
    }
}

/// Keeps only the final path component and replaces whitespace with `_`.
fn sanitize_file_name(original: &str) -> Result<String> {
    let base = original.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    let name: String = base.chars().map(|c| if c.is_whitespace() { '_' } else { c }).collect();
    let extension = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension {
        Some(ext) if !name.starts_with('.') && ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(name),
        _ => Err(ShopError::Validation(format!("Unsupported image file '{original}'"))),
    }
}

//! Profile picture storage on the local filesystem

use crate::error::{ApiError, ApiResult};
use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::info;

/// URL prefix under which `UPLOAD_DIR` is served
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

const IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

pub fn image_extension(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    IMAGE_TYPES
        .iter()
        .find(|(mime, _)| mime.eq_ignore_ascii_case(essence))
        .map(|(_, ext)| *ext)
}

pub struct Uploads {
    root: PathBuf,
    max_bytes: usize,
}

impl Uploads {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Writes `UPLOAD_DIR/<user_id>/<uuid>.<ext>` and returns its public URL
    pub async fn store_profile_picture(
        &self,
        user_id: &str,
        content_type: &str,
        data: &[u8],
    ) -> ApiResult<String> {
        let ext = image_extension(content_type).ok_or_else(|| {
            ApiError::bad_request("Invalid file type. Allowed types: png, jpg, jpeg, gif, webp")
        })?;
        if data.is_empty() {
            return Err(ApiError::bad_request("Uploaded file is empty"));
        }
        if data.len() > self.max_bytes {
            return Err(ApiError::PayloadTooLarge(format!(
                "File too large. Maximum size is {} bytes",
                self.max_bytes
            )));
        }

        let dir = self.root.join(user_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create upload directory {}", dir.display()))?;

        let file_name = format!("{}.{}", uuid::Uuid::new_v4(), ext);
        let path = dir.join(&file_name);
        tokio::fs::write(&path, data)
            .await
            .with_context(|| format!("Failed to write upload {}", path.display()))?;

        info!("Stored profile picture for {} at {}", user_id, path.display());
        Ok(format!("{}/{}/{}", UPLOADS_URL_PREFIX, user_id, file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_image_types() {
        assert_eq!(image_extension("image/png"), Some("png"));
        assert_eq!(image_extension("IMAGE/JPEG"), Some("jpg"));
        assert_eq!(image_extension("image/webp; charset=binary"), Some("webp"));
        assert_eq!(image_extension("application/pdf"), None);
    }

    #[tokio::test]
    async fn stores_under_user_directory() {
        let root =
            std::env::temp_dir().join(format!("scoreboard-uploads-{}", uuid::Uuid::new_v4()));
        let uploads = Uploads::new(&root, 8);

        let url = uploads
            .store_profile_picture("user1", "image/gif", b"GIF89a")
            .await
            .unwrap();
        assert!(url.starts_with("/uploads/user1/"));
        assert!(url.ends_with(".gif"));
        let file = url.trim_start_matches("/uploads/");
        assert_eq!(tokio::fs::read(root.join(file)).await.unwrap(), b"GIF89a");

        let err = uploads
            .store_profile_picture("user1", "image/gif", b"0123456789")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::PayloadTooLarge(_)));
        assert!(matches!(
            uploads.store_profile_picture("user1", "text/plain", b"x").await,
            Err(ApiError::BadRequest(_))
        ));

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }
}

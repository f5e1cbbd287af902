//! Photo upload checks and static serving of stored photos.

use crate::{
    errors::AppError,
    services::{AppState, image_store::UPLOAD_DIR, lifecycle::ImageUpload},
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use std::io::ErrorKind;
use tokio_util::io::ReaderStream;

/// Largest accepted photo.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const IMAGE_TYPES: [&str; 5] = ["jpeg", "jpg", "png", "gif", "webp"];

/// Accept only image files of a known type within the size limit. Both the
/// file extension and the declared MIME type must look like an image.
pub fn validate_image(upload: &ImageUpload, content_type: Option<&str>) -> Result<(), String> {
    if upload.bytes.len() > MAX_IMAGE_BYTES {
        return Err(format!(
            "Image must be at most {} MB",
            MAX_IMAGE_BYTES / (1024 * 1024)
        ));
    }

    let ext_ok = upload
        .file_name
        .rsplit_once('.')
        .map(|(_, ext)| IMAGE_TYPES.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    let mime_ok = content_type
        .map(|ct| {
            let ct = ct.to_ascii_lowercase();
            IMAGE_TYPES.iter().any(|t| ct.contains(t))
        })
        .unwrap_or(false);

    if ext_ok && mime_ok {
        Ok(())
    } else {
        Err("Only image files are allowed!".to_string())
    }
}

/// `GET /uploads/{*path}`: stream a stored photo.
pub async fn serve_image(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let relative = format!("{}/{}", UPLOAD_DIR, path);
    let file = state.images.open(&relative).await.map_err(|err| {
        if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::InvalidInput) {
            AppError::not_found("Image not found")
        } else {
            AppError::internal(err.to_string())
        }
    })?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&path)),
    );
    Ok(response)
}

fn content_type_for(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn upload(name: &str, len: usize) -> ImageUpload {
        ImageUpload {
            bytes: Bytes::from(vec![0u8; len]),
            file_name: name.to_string(),
        }
    }

    #[test]
    fn accepts_known_image_types() {
        assert!(validate_image(&upload("a.JPG", 10), Some("image/jpeg")).is_ok());
        assert!(validate_image(&upload("a.webp", 10), Some("image/webp")).is_ok());
    }

    #[test]
    fn rejects_non_images_and_oversized_files() {
        assert!(validate_image(&upload("a.pdf", 10), Some("application/pdf")).is_err());
        assert!(validate_image(&upload("a.png", 10), Some("text/plain")).is_err());
        assert!(validate_image(&upload("a.png", 10), None).is_err());
        assert!(validate_image(&upload("a.png", MAX_IMAGE_BYTES + 1), Some("image/png")).is_err());
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for("image-1.PNG"), "image/png");
        assert_eq!(content_type_for("image-1"), "application/octet-stream");
    }
}

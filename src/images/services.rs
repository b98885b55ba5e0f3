use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use crate::clients::ai::InlineImage;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub const PRESIGN_TTL_SECS: u64 = 30 * 60;

/// A validated upload, kept in both binary and base64 form since it goes
/// to object storage and to the vision model.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub body: Bytes,
    pub content_type: &'static str,
    pub base64: String,
}

impl DecodedImage {
    pub fn inline(&self) -> InlineImage {
        InlineImage {
            mime: self.content_type.to_string(),
            base64: self.base64.clone(),
        }
    }
}

/// JSON body cap for routes carrying base64 images. Twice the encoded image
/// limit, so moderately oversized photos still get the descriptive 400.
pub fn request_body_limit(max_image_bytes: usize) -> usize {
    max_image_bytes.div_ceil(3) * 4 * 2 + 256 * 1024
}

fn too_large(max_bytes: usize) -> AppError {
    const MIB: usize = 1024 * 1024;
    let limit = if max_bytes >= MIB {
        format!("{:.1} MB", max_bytes as f64 / MIB as f64)
    } else {
        format!("{} KB", max_bytes.div_ceil(1024))
    };
    AppError::bad_request(format!("Image too large, maximum size is {limit}"))
}

/// Accepts raw base64 or a `data:<mime>;base64,` URL.
pub fn decode_image(input: &str, max_bytes: usize) -> AppResult<DecodedImage> {
    let trimmed = input.trim();
    let b64 = match trimmed.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, data)| data)
            .ok_or_else(|| AppError::bad_request("Malformed image data URL"))?,
        None => trimmed,
    };
    if b64.is_empty() {
        return Err(AppError::bad_request("image is required"));
    }

    // Reject before decoding: 4 base64 chars carry 3 bytes.
    let max_encoded = max_bytes.div_ceil(3) * 4;
    if b64.len() > max_encoded {
        return Err(too_large(max_bytes));
    }

    let raw = STANDARD
        .decode(b64)
        .map_err(|_| AppError::bad_request("Image is not valid base64"))?;
    if raw.len() > max_bytes {
        return Err(too_large(max_bytes));
    }
    let content_type = sniff_mime(&raw)
        .ok_or_else(|| AppError::bad_request("Unsupported image type, use JPEG, PNG, WebP or HEIC"))?;

    Ok(DecodedImage {
        body: Bytes::from(raw),
        content_type,
        base64: b64.to_string(),
    })
}

fn sniff_mime(b: &[u8]) -> Option<&'static str> {
    match b {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, b'P', b'N', b'G', ..] => Some("image/png"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        [_, _, _, _, b'f', b't', b'y', b'p', b'h', b'e', b'i', b'c' | b'f', ..] => {
            Some("image/heic")
        }
        _ => None,
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// Stores the image under `<prefix>/<user>/<uuid>.<ext>` and returns the key.
pub async fn store_image(
    st: &AppState,
    prefix: &str,
    user_id: Uuid,
    image: &DecodedImage,
) -> anyhow::Result<String> {
    let ext = ext_from_mime(image.content_type).unwrap_or("bin");
    let key = format!("{}/{}/{}.{}", prefix, user_id, Uuid::new_v4(), ext);
    st.storage
        .put_object(&key, image.body.clone(), image.content_type)
        .await
        .with_context(|| format!("store image {key}"))?;
    Ok(key)
}

/// Presigned URL for an optional key; failures are logged and dropped.
pub async fn presign_opt(st: &AppState, key: Option<&str>) -> Option<String> {
    let key = key?;
    match st.storage.presign_get(key, PRESIGN_TTL_SECS).await {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(error = %e, key, "presign failed");
            None
        }
    }
}

/// Best-effort removal of an object whose row is already gone.
pub async fn delete_quietly(st: &AppState, key: Option<&str>) {
    if let Some(key) = key {
        if let Err(e) = st.storage.delete_object(key).await {
            warn!(error = %e, key, "failed to delete stored object");
        }
    }
}

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::GenerationError;

pub const DATA_URI_PREFIX: &str = "data:";

/// Decoded `data:<mime>;base64,<payload>` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DataUri {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    pub fn parse(value: &str) -> Result<Self, GenerationError> {
        let (meta, payload) = split_data_uri(value)?;
        let mut segments = meta.split(';').map(str::trim);
        let mime = segments
            .next()
            .filter(|item| !item.is_empty())
            .unwrap_or("application/octet-stream")
            .to_string();
        if !segments.any(|item| item.eq_ignore_ascii_case("base64")) {
            return Err(GenerationError::Decode(format!(
                "data URI for {mime} is not base64 encoded"
            )));
        }
        let bytes = BASE64
            .decode(payload.trim().as_bytes())
            .map_err(|err| GenerationError::Decode(format!("base64 payload for {mime}: {err}")))?;
        Ok(Self { mime, bytes })
    }

    pub fn encode(&self) -> String {
        encode(&self.mime, &self.bytes)
    }

    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime)
    }
}

pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("{DATA_URI_PREFIX}{mime};base64,{}", BASE64.encode(bytes))
}

pub fn is_data_uri(value: &str) -> bool {
    value.trim_start().starts_with(DATA_URI_PREFIX)
}

/// MIME type of a data URI without decoding the payload.
pub fn mime_of(value: &str) -> Option<&str> {
    let (meta, _) = split_data_uri(value).ok()?;
    meta.split(';')
        .next()
        .map(str::trim)
        .filter(|item| !item.is_empty())
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "obj" => Some("model/obj"),
        "gltf" => Some("model/gltf+json"),
        "glb" => Some("model/gltf-binary"),
        "mp4" => Some("video/mp4"),
        "webm" => Some("video/webm"),
        _ => None,
    }
}

/// File extension used when a data URI is saved to disk.
pub fn extension_for_mime(mime: &str) -> &'static str {
    let lowered = mime.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "model/obj" => "obj",
        "model/gltf+json" | "model/gltf" => "gltf",
        "model/gltf-binary" => "glb",
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        _ if lowered.starts_with("video/") => "mp4",
        _ => "dat",
    }
}

fn split_data_uri(value: &str) -> Result<(&str, &str), GenerationError> {
    let rest = value
        .trim()
        .strip_prefix(DATA_URI_PREFIX)
        .ok_or_else(|| GenerationError::Decode("missing `data:` prefix".to_string()))?;
    rest.split_once(',')
        .ok_or_else(|| GenerationError::Decode("missing `,` before payload".to_string()))
}

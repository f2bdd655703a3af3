use std::collections::BTreeMap;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use meshgen_contracts::media::{AsyncOperation, MediaKind, MediaPart};
use meshgen_contracts::models::{ModelSpec, CAPABILITY_PREVIEW_IMAGE, CAPABILITY_PREVIEW_VIDEO};
use meshgen_contracts::GenerationError;
use reqwest::blocking::Response as HttpResponse;
use serde_json::{Map, Value};

use crate::poller::OperationSource;
use crate::prompt::PromptPlan;

mod dryrun;
mod gemini;
mod veo;

pub use dryrun::DryrunBackend;
pub use gemini::GeminiBackend;
pub use veo::VeoBackend;

/// Which media kinds a model is asked to produce for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputProfile {
    MeshWithPreviewImage,
    MeshWithPreviewVideo,
    MeshOnly,
    Animation,
}

impl OutputProfile {
    pub fn for_mesh_model(model: &ModelSpec) -> Self {
        if model.supports(CAPABILITY_PREVIEW_VIDEO) {
            Self::MeshWithPreviewVideo
        } else if model.supports(CAPABILITY_PREVIEW_IMAGE) {
            Self::MeshWithPreviewImage
        } else {
            Self::MeshOnly
        }
    }

    pub fn wanted_kinds(self) -> &'static [MediaKind] {
        match self {
            Self::MeshWithPreviewImage => &[MediaKind::Mesh, MediaKind::PreviewImage],
            Self::MeshWithPreviewVideo => &[MediaKind::Mesh, MediaKind::Video],
            Self::MeshOnly => &[MediaKind::Mesh],
            Self::Animation => &[MediaKind::Video],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MeshWithPreviewImage => "mesh_with_preview_image",
            Self::MeshWithPreviewVideo => "mesh_with_preview_video",
            Self::MeshOnly => "mesh_only",
            Self::Animation => "animation",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub request_id: String,
    pub model: String,
    pub profile: OutputProfile,
    pub plan: PromptPlan,
}

/// What a backend hands back right after the initial call.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Immediate {
        parts: Vec<MediaPart>,
        payload: Map<String, Value>,
    },
    Pending {
        operation: AsyncOperation,
        payload: Map<String, Value>,
    },
}

impl Submission {
    /// Request body as sent, for receipts.
    pub fn payload(&self) -> &Map<String, Value> {
        match self {
            Self::Immediate { payload, .. } | Self::Pending { payload, .. } => payload,
        }
    }
}

pub trait MeshBackend: OperationSource + Send + Sync {
    fn name(&self) -> &str;
    fn submit(&self, request: &BackendRequest) -> Result<Submission, GenerationError>;
}

#[derive(Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Box<dyn MeshBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<B: MeshBackend + 'static>(&mut self, backend: B) {
        self.backends
            .insert(backend.name().to_string(), Box::new(backend));
    }

    pub fn get(&self, name: &str) -> Option<&dyn MeshBackend> {
        self.backends.get(name).map(|backend| backend.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }
}

pub(crate) fn response_json_or_error(
    backend: &str,
    response: HttpResponse,
) -> Result<Value, GenerationError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{backend} response body read failed"))
        .map_err(|err| GenerationError::transport(&err))?;
    if !status.is_success() {
        return Err(GenerationError::Transport(format!(
            "{backend} request failed ({code}): {}",
            truncate_text(&remote_error_message(&body), 512)
        )));
    }
    serde_json::from_str(&body)
        .with_context(|| format!("{backend} returned invalid JSON payload"))
        .map_err(|err| GenerationError::transport(&err))
}

/// Turns a `reqwest` send failure into a transport error with the URL
/// (and its `key` query parameter) stripped.
pub(crate) fn send_error(backend: &str, err: reqwest::Error) -> GenerationError {
    let err = anyhow::Error::new(err.without_url()).context(format!("{backend} request failed"));
    GenerationError::transport(&err)
}

fn remote_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|payload| {
            payload
                .get("error")
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Walks a vendor response and collects every media reference in it.
///
/// Handles `inlineData`/`inline_data` blobs, `fileData` references and
/// objects carrying a `uri`/`url` next to a MIME field. When no MIME type is
/// given the parent key decides (`video`, `mesh`/`model`, `image`). An inline
/// blob that is not valid base64 is a decode error.
pub(crate) fn collect_media_parts(
    value: &Value,
    key_hint: Option<&str>,
    out: &mut Vec<MediaPart>,
) -> Result<(), GenerationError> {
    match value {
        Value::Array(rows) => {
            for row in rows {
                collect_media_parts(row, key_hint, out)?;
            }
        }
        Value::Object(obj) => {
            if let Some(inline) = obj
                .get("inlineData")
                .or_else(|| obj.get("inline_data"))
                .and_then(Value::as_object)
            {
                if let Some(part) = inline_part(inline)? {
                    push_unique(out, part);
                }
                return Ok(());
            }
            if let Some(file) = obj
                .get("fileData")
                .or_else(|| obj.get("file_data"))
                .and_then(Value::as_object)
            {
                let uri = file
                    .get("fileUri")
                    .or_else(|| file.get("file_uri"))
                    .and_then(Value::as_str);
                if let Some(uri) = uri.map(str::trim).filter(|uri| !uri.is_empty()) {
                    let mime = mime_field(file)
                        .unwrap_or_else(|| default_mime_for_hint(key_hint).to_string());
                    push_unique(out, MediaPart::from_reference(mime, uri));
                }
                return Ok(());
            }
            let reference = obj
                .get("uri")
                .or_else(|| obj.get("url"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|uri| !uri.is_empty());
            if let Some(reference) = reference {
                let mime = mime_field(obj)
                    .unwrap_or_else(|| default_mime_for_hint(key_hint).to_string());
                push_unique(out, MediaPart::from_reference(mime, reference));
                return Ok(());
            }
            for (key, row) in obj {
                if matches!(row, Value::Object(_) | Value::Array(_)) {
                    collect_media_parts(row, Some(key.as_str()), out)?;
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn inline_part(inline: &Map<String, Value>) -> Result<Option<MediaPart>, GenerationError> {
    let Some(data) = inline.get("data").and_then(Value::as_str).map(str::trim) else {
        return Ok(None);
    };
    if data.is_empty() {
        return Ok(None);
    }
    let mime = mime_field(inline).unwrap_or_else(|| "application/octet-stream".to_string());
    let bytes = BASE64.decode(data.as_bytes()).map_err(|err| {
        GenerationError::Decode(format!("inline {mime} part is not valid base64: {err}"))
    })?;
    Ok(Some(MediaPart::inline(mime, &bytes)))
}

fn mime_field(obj: &Map<String, Value>) -> Option<String> {
    ["mimeType", "mime_type", "contentType", "content_type", "encoding"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|mime| mime.contains('/'))
        .map(str::to_string)
}

fn default_mime_for_hint(key_hint: Option<&str>) -> &'static str {
    let hint = key_hint.unwrap_or_default().to_ascii_lowercase();
    if hint.contains("video") || hint.contains("sample") {
        return MediaKind::Video.preferred_content_type();
    }
    if hint.contains("mesh") || hint.contains("model") {
        return MediaKind::Mesh.preferred_content_type();
    }
    if hint.contains("image") || hint.contains("preview") {
        return MediaKind::PreviewImage.preferred_content_type();
    }
    MediaKind::Video.preferred_content_type()
}

fn push_unique(out: &mut Vec<MediaPart>, part: MediaPart) {
    if !out.contains(&part) {
        out.push(part);
    }
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn model_path(model: &str) -> String {
    let trimmed = model.trim();
    if trimmed.starts_with("models/") {
        trimmed.to_string()
    } else {
        format!("models/{trimmed}")
    }
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::data_uri;
use crate::error::GenerationError;

/// Kind of content a request wants back from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Mesh,
    PreviewImage,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mesh => "mesh",
            Self::PreviewImage => "preview_image",
            Self::Video => "video",
        }
    }

    /// Content type requested from the model for this kind.
    pub fn preferred_content_type(self) -> &'static str {
        match self {
            Self::Mesh => "model/obj",
            Self::PreviewImage => "image/png",
            Self::Video => "video/mp4",
        }
    }

    pub fn matches(self, content_type: &str) -> bool {
        let lowered = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match self {
            Self::Mesh => lowered == "model/obj" || lowered.starts_with("model/gltf"),
            Self::PreviewImage => lowered.starts_with("image/"),
            Self::Video => lowered.starts_with("video/"),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Mesh => "3D mesh",
            Self::PreviewImage => "preview image",
            Self::Video => "video",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MediaSource {
    /// Remote URL hosted by the model vendor.
    Url(String),
    /// Payload already held locally as a data URI.
    Inline(String),
}

/// One tagged payload inside a model response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPart {
    pub content_type: String,
    pub source: MediaSource,
}

impl MediaPart {
    pub fn url(content_type: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            source: MediaSource::Url(url.into()),
        }
    }

    pub fn inline(content_type: impl Into<String>, bytes: &[u8]) -> Self {
        let content_type = content_type.into();
        let uri = data_uri::encode(&content_type, bytes);
        Self {
            content_type,
            source: MediaSource::Inline(uri),
        }
    }

    /// Builds a part from a string that may already be a data URI.
    pub fn from_reference(content_type: impl Into<String>, reference: &str) -> Self {
        let content_type = content_type.into();
        if data_uri::is_data_uri(reference) {
            return Self {
                content_type,
                source: MediaSource::Inline(reference.trim().to_string()),
            };
        }
        Self::url(content_type, reference.trim())
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.source, MediaSource::Inline(_))
    }
}

/// Remote long-running job as last reported by the backend.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AsyncOperation {
    pub name: String,
    pub done: bool,
    pub error: Option<String>,
    pub parts: Vec<MediaPart>,
    pub metadata: Map<String, Value>,
}

impl AsyncOperation {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Error text of a finished operation, ignoring blank messages.
    pub fn failure(&self) -> Option<&str> {
        if !self.done {
            return None;
        }
        self.error
            .as_deref()
            .map(str::trim)
            .filter(|message| !message.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedParts {
    pub mesh: Option<MediaPart>,
    pub preview_image: Option<MediaPart>,
    pub video: Option<MediaPart>,
}

impl ExtractedParts {
    pub fn get(&self, kind: MediaKind) -> Option<&MediaPart> {
        match kind {
            MediaKind::Mesh => self.mesh.as_ref(),
            MediaKind::PreviewImage => self.preview_image.as_ref(),
            MediaKind::Video => self.video.as_ref(),
        }
    }

    fn slot(&mut self, kind: MediaKind) -> &mut Option<MediaPart> {
        match kind {
            MediaKind::Mesh => &mut self.mesh,
            MediaKind::PreviewImage => &mut self.preview_image,
            MediaKind::Video => &mut self.video,
        }
    }
}

/// First part of the given kind, in response order.
pub fn find_part(parts: &[MediaPart], kind: MediaKind) -> Option<&MediaPart> {
    parts.iter().find(|part| kind.matches(&part.content_type))
}

/// Picks one part per wanted kind. First match wins; a missing kind fails
/// on its own and is never substituted by another part.
pub fn extract_parts(
    parts: &[MediaPart],
    wanted: &[MediaKind],
) -> Result<ExtractedParts, GenerationError> {
    let mut out = ExtractedParts::default();
    for kind in wanted {
        let part = find_part(parts, *kind).ok_or(GenerationError::MissingPart { kind: *kind })?;
        *out.slot(*kind) = Some(part.clone());
    }
    Ok(out)
}

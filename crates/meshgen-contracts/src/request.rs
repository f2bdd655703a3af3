use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data_uri;
use crate::error::GenerationError;

pub const DEFAULT_MESH_PROMPT: &str = "A standard 3D model of the object in the image.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StylePreset {
    Realistic,
    Cartoonish,
    LowPoly,
    Sculpture,
}

impl StylePreset {
    pub const ALL: [StylePreset; 4] = [
        Self::Realistic,
        Self::Cartoonish,
        Self::LowPoly,
        Self::Sculpture,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::Realistic => "realistic",
            Self::Cartoonish => "cartoonish",
            Self::LowPoly => "low-poly",
            Self::Sculpture => "sculpture",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Realistic => "Realistic",
            Self::Cartoonish => "Cartoonish",
            Self::LowPoly => "Low Poly",
            Self::Sculpture => "Sculpture",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Realistic => "Aims for a photorealistic representation.",
            Self::Cartoonish => "Stylized, with exaggerated features.",
            Self::LowPoly => "A minimalistic, geometric art style.",
            Self::Sculpture => "Looks like a classical stone sculpture.",
        }
    }
}

impl fmt::Display for StylePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for StylePreset {
    type Err = GenerationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        if normalized.is_empty() {
            return Err(GenerationError::validation(
                "style",
                "A style must be selected.",
            ));
        }
        Self::ALL
            .into_iter()
            .find(|preset| preset.id() == normalized)
            .ok_or_else(|| {
                GenerationError::validation(
                    "style",
                    format!("Unknown style preset '{}'.", raw.trim()),
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnimationStyle {
    Turntable,
    Bounce,
    Crumble,
    Dismantle,
    Custom,
}

impl AnimationStyle {
    pub const ALL: [AnimationStyle; 5] = [
        Self::Turntable,
        Self::Bounce,
        Self::Crumble,
        Self::Dismantle,
        Self::Custom,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::Turntable => "turntable",
            Self::Bounce => "bounce",
            Self::Crumble => "crumble",
            Self::Dismantle => "dismantle",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for AnimationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for AnimationStyle {
    type Err = GenerationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|style| style.id() == normalized)
            .ok_or_else(|| {
                GenerationError::validation(
                    "animation_style",
                    format!("Unknown animation style '{}'.", raw.trim()),
                )
            })
    }
}

/// Uploaded photo, already read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub mime: String,
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
}

impl SourceImage {
    pub fn new(
        mime: impl Into<String>,
        bytes: Vec<u8>,
        file_name: Option<String>,
    ) -> Result<Self, GenerationError> {
        let mime = mime.into().trim().to_ascii_lowercase();
        if bytes.is_empty() {
            return Err(GenerationError::validation("image", "An image is required."));
        }
        if !mime.starts_with("image/") {
            return Err(GenerationError::validation(
                "image",
                "Only image files are allowed.",
            ));
        }
        Ok(Self {
            mime,
            bytes,
            file_name,
        })
    }

    pub fn to_data_uri(&self) -> String {
        data_uri::encode(&self.mime, &self.bytes)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub image: SourceImage,
    pub prompt: Option<String>,
    pub style: StylePreset,
    pub animation: Option<AnimationStyle>,
}

impl GenerationRequest {
    pub fn new(image: SourceImage, style: StylePreset) -> Self {
        Self {
            image,
            prompt: None,
            style,
            animation: None,
        }
    }

    pub fn with_prompt(mut self, prompt: Option<String>) -> Self {
        self.prompt = non_blank(prompt);
        self
    }

    pub fn with_animation(mut self, animation: Option<AnimationStyle>) -> Self {
        self.animation = animation;
        self
    }

    pub fn effective_prompt(&self) -> &str {
        self.prompt.as_deref().unwrap_or(DEFAULT_MESH_PROMPT)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationRequest {
    pub mesh_data_uri: String,
    pub preview_image_uri: Option<String>,
    pub style: AnimationStyle,
    pub prompt: Option<String>,
}

impl AnimationRequest {
    pub fn new(
        mesh_data_uri: impl Into<String>,
        style: AnimationStyle,
    ) -> Result<Self, GenerationError> {
        let mesh_data_uri = mesh_data_uri.into();
        if mesh_data_uri.trim().is_empty() {
            return Err(GenerationError::validation(
                "mesh",
                "A 3D model is required to generate an animation.",
            ));
        }
        if !data_uri::is_data_uri(&mesh_data_uri) {
            return Err(GenerationError::validation(
                "mesh",
                "The 3D model must be provided as a data URI.",
            ));
        }
        Ok(Self {
            mesh_data_uri,
            preview_image_uri: None,
            style,
            prompt: None,
        })
    }

    pub fn with_preview(mut self, preview_image_uri: Option<String>) -> Self {
        self.preview_image_uri = non_blank(preview_image_uri);
        self
    }

    pub fn with_prompt(mut self, prompt: Option<String>) -> Self {
        self.prompt = non_blank(prompt);
        self
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

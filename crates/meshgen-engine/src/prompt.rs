use meshgen_contracts::data_uri;
use meshgen_contracts::request::{AnimationRequest, AnimationStyle, GenerationRequest};
use serde_json::{json, Map, Value};

use crate::backends::OutputProfile;

pub const DEFAULT_ASPECT_RATIO: &str = "16:9";
pub const PREVIEW_DURATION_SECONDS: u32 = 1;
pub const ANIMATION_DURATION_SECONDS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentRole {
    SourceImage,
    Mesh,
    PreviewImage,
}

impl AttachmentRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SourceImage => "source_image",
            Self::Mesh => "mesh",
            Self::PreviewImage => "preview_image",
        }
    }
}

/// Media sent along with the instruction, as a data URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub role: AttachmentRole,
    pub data_uri: String,
}

impl Attachment {
    pub fn mime(&self) -> &str {
        data_uri::mime_of(&self.data_uri).unwrap_or("application/octet-stream")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    pub duration_seconds: u32,
    pub aspect_ratio: &'static str,
}

/// Backend-neutral description of one model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPlan {
    pub instruction: String,
    pub attachments: Vec<Attachment>,
    pub output: OutputConfig,
}

impl PromptPlan {
    /// Summary for receipts and events; attachment payloads are left out.
    pub fn describe(&self) -> Map<String, Value> {
        let attachments: Vec<Value> = self
            .attachments
            .iter()
            .map(|attachment| {
                json!({
                    "role": attachment.role.as_str(),
                    "mime": attachment.mime(),
                })
            })
            .collect();
        let mut out = Map::new();
        out.insert(
            "instruction".to_string(),
            Value::String(self.instruction.clone()),
        );
        out.insert("attachments".to_string(), Value::Array(attachments));
        out.insert(
            "duration_seconds".to_string(),
            json!(self.output.duration_seconds),
        );
        out.insert(
            "aspect_ratio".to_string(),
            Value::String(self.output.aspect_ratio.to_string()),
        );
        out
    }
}

pub fn build_mesh_prompt(request: &GenerationRequest, profile: OutputProfile) -> PromptPlan {
    let mut lines = vec![
        "From the provided image, generate a basic 3D mesh model suitable as a base for animation."
            .to_string(),
        format!(
            "Use the following prompt to guide the generation: \"{}\".",
            request.effective_prompt()
        ),
        format!("Apply the following style: \"{}\".", request.style.id()),
    ];
    match profile {
        OutputProfile::MeshWithPreviewVideo => lines.push(
            "Also generate a very short, static, 1-second video of the model from an interesting angle to serve as a preview."
                .to_string(),
        ),
        OutputProfile::MeshWithPreviewImage => lines.push(
            "Also render a single still image of the model from an interesting angle to serve as a preview."
                .to_string(),
        ),
        OutputProfile::MeshOnly | OutputProfile::Animation => {}
    }
    if let Some(animation) = request.animation {
        lines.push(format!(
            "The model will later receive a \"{}\" animation, so keep the parts that move clearly separated.",
            animation.id()
        ));
    }
    lines.push(return_clause(profile));

    PromptPlan {
        instruction: lines.join("\n"),
        attachments: vec![Attachment {
            role: AttachmentRole::SourceImage,
            data_uri: request.image.to_data_uri(),
        }],
        output: OutputConfig {
            duration_seconds: PREVIEW_DURATION_SECONDS,
            aspect_ratio: DEFAULT_ASPECT_RATIO,
        },
    }
}

pub fn build_animation_prompt(request: &AnimationRequest) -> PromptPlan {
    let mut attachments = vec![Attachment {
        role: AttachmentRole::Mesh,
        data_uri: request.mesh_data_uri.clone(),
    }];
    if let Some(preview) = request.preview_image_uri.as_ref() {
        attachments.push(Attachment {
            role: AttachmentRole::PreviewImage,
            data_uri: preview.clone(),
        });
    }
    PromptPlan {
        instruction: animation_instruction(request.style, request.prompt.as_deref()),
        attachments,
        output: OutputConfig {
            duration_seconds: ANIMATION_DURATION_SECONDS,
            aspect_ratio: DEFAULT_ASPECT_RATIO,
        },
    }
}

/// Fixed text per style; `custom` uses the caller's prompt and falls back
/// to the turntable text when that is blank.
pub fn animation_instruction(style: AnimationStyle, custom_prompt: Option<&str>) -> String {
    const TURNTABLE: &str =
        "Create a smooth, 360-degree turntable animation of the provided 3D model.";
    match style {
        AnimationStyle::Turntable => TURNTABLE.to_string(),
        AnimationStyle::Bounce => {
            "Create a playful bouncing animation for the provided 3D model.".to_string()
        }
        AnimationStyle::Crumble => {
            "Animate the provided 3D model to look like it is slowly crumbling into dust."
                .to_string()
        }
        AnimationStyle::Dismantle => "Create an animation where the provided 3D model gracefully disassembles into its core components, which then float apart before reassembling back into the original model.".to_string(),
        AnimationStyle::Custom => custom_prompt
            .map(str::trim)
            .filter(|prompt| !prompt.is_empty())
            .unwrap_or(TURNTABLE)
            .to_string(),
    }
}

fn return_clause(profile: OutputProfile) -> String {
    let mesh = "the 3D mesh data (as a downloadable 'model/obj' part)";
    match profile {
        OutputProfile::MeshWithPreviewVideo => {
            format!("Return {mesh} and the preview video (as a 'video/mp4' part).")
        }
        OutputProfile::MeshWithPreviewImage => {
            format!("Return {mesh} and the preview image (as an 'image/png' part).")
        }
        OutputProfile::MeshOnly | OutputProfile::Animation => format!("Return {mesh}."),
    }
}

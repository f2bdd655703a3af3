use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Cursor;
use std::sync::Mutex;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use meshgen_contracts::data_uri::DataUri;
use meshgen_contracts::media::{AsyncOperation, MediaKind, MediaPart};
use meshgen_contracts::GenerationError;
use serde_json::json;
use sha2::{Digest, Sha256};

use super::{map_object, BackendRequest, MeshBackend, OutputProfile, Submission};
use crate::poller::OperationSource;
use crate::prompt::{AttachmentRole, PromptPlan};

const PREVIEW_WIDTH: u32 = 64;
const PREVIEW_HEIGHT: u32 = 36;

/// Offline backend that builds a box mesh sized after the source photo.
///
/// Submissions come back as pending operations that finish after
/// `pending_checks` status queries, so the full polling path runs without
/// a network.
pub struct DryrunBackend {
    pending_checks: u32,
    jobs: Mutex<HashMap<String, DryrunJob>>,
}

struct DryrunJob {
    remaining: u32,
    parts: Vec<MediaPart>,
}

impl DryrunBackend {
    pub fn new(pending_checks: u32) -> Self {
        Self {
            pending_checks,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    fn render(&self, request: &BackendRequest) -> Result<Vec<MediaPart>, GenerationError> {
        let plan = &request.plan;
        let mut parts = Vec::new();
        if request.profile == OutputProfile::Animation {
            parts.push(MediaPart::inline(
                MediaKind::Video.preferred_content_type(),
                &placeholder_video(&plan.instruction),
            ));
            return Ok(parts);
        }

        let (width, height) = source_dimensions(plan);
        let low_poly = plan.instruction.contains("\"low-poly\"");
        parts.push(MediaPart::inline(
            MediaKind::Mesh.preferred_content_type(),
            box_mesh_obj(width, height, low_poly).as_bytes(),
        ));
        match request.profile {
            OutputProfile::MeshWithPreviewImage => parts.push(MediaPart::inline(
                MediaKind::PreviewImage.preferred_content_type(),
                &preview_png(&plan.instruction)?,
            )),
            OutputProfile::MeshWithPreviewVideo => parts.push(MediaPart::inline(
                MediaKind::Video.preferred_content_type(),
                &placeholder_video(&plan.instruction),
            )),
            OutputProfile::MeshOnly | OutputProfile::Animation => {}
        }
        Ok(parts)
    }
}

impl Default for DryrunBackend {
    fn default() -> Self {
        Self::new(2)
    }
}

impl OperationSource for DryrunBackend {
    fn check_operation(
        &self,
        operation: &AsyncOperation,
    ) -> Result<AsyncOperation, GenerationError> {
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|_| GenerationError::Operation("dryrun job table is poisoned".to_string()))?;
        let Some(job) = jobs.get_mut(&operation.name) else {
            return Err(GenerationError::Operation(format!(
                "unknown dryrun operation '{}'",
                operation.name
            )));
        };
        job.remaining = job.remaining.saturating_sub(1);
        let mut next = AsyncOperation::pending(operation.name.clone());
        next.metadata = map_object(json!({ "remaining_checks": job.remaining }));
        if job.remaining == 0 {
            if let Some(job) = jobs.remove(&operation.name) {
                next.done = true;
                next.parts = job.parts;
            }
        }
        Ok(next)
    }

    fn abandon_operation(&self, operation: &AsyncOperation) {
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.remove(&operation.name);
        }
    }
}

impl MeshBackend for DryrunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn submit(&self, request: &BackendRequest) -> Result<Submission, GenerationError> {
        let parts = self.render(request)?;
        let name = format!("dryrun/operations/{}", request.request_id);
        let payload = map_object(json!({
            "model": request.model,
            "profile": request.profile.as_str(),
            "prompt": request.plan.describe(),
        }));

        let mut operation = AsyncOperation::pending(name.clone());
        if self.pending_checks == 0 {
            operation.done = true;
            operation.parts = parts;
        } else {
            let mut jobs = self.jobs.lock().map_err(|_| {
                GenerationError::Operation("dryrun job table is poisoned".to_string())
            })?;
            jobs.insert(
                name,
                DryrunJob {
                    remaining: self.pending_checks,
                    parts,
                },
            );
        }
        Ok(Submission::Pending { operation, payload })
    }
}

fn source_dimensions(plan: &PromptPlan) -> (u32, u32) {
    plan.attachments
        .iter()
        .find(|attachment| attachment.role == AttachmentRole::SourceImage)
        .and_then(|attachment| DataUri::parse(&attachment.data_uri).ok())
        .and_then(|decoded| image::load_from_memory(&decoded.bytes).ok())
        .map(|decoded| (decoded.width().max(1), decoded.height().max(1)))
        .unwrap_or((1, 1))
}

/// Axis-aligned box whose front face keeps the photo's aspect ratio.
fn box_mesh_obj(width: u32, height: u32, triangulate: bool) -> String {
    let longest = f64::from(width.max(height));
    let sx = f64::from(width) / longest;
    let sy = f64::from(height) / longest;
    let sz = sx.min(sy) * 0.5;
    let corners = [
        (-sx, -sy, -sz),
        (sx, -sy, -sz),
        (sx, sy, -sz),
        (-sx, sy, -sz),
        (-sx, -sy, sz),
        (sx, -sy, sz),
        (sx, sy, sz),
        (-sx, sy, sz),
    ];
    let quads = [
        [1, 4, 3, 2],
        [5, 6, 7, 8],
        [1, 2, 6, 5],
        [4, 8, 7, 3],
        [1, 5, 8, 4],
        [2, 3, 7, 6],
    ];

    let mut out = format!("# meshgen dryrun box {width}x{height}\no dryrun_box\n");
    for (x, y, z) in corners {
        let _ = writeln!(out, "v {x:.4} {y:.4} {z:.4}");
    }
    for [a, b, c, d] in quads {
        if triangulate {
            let _ = writeln!(out, "f {a} {b} {c}");
            let _ = writeln!(out, "f {a} {c} {d}");
        } else {
            let _ = writeln!(out, "f {a} {b} {c} {d}");
        }
    }
    out
}

fn preview_png(instruction: &str) -> Result<Vec<u8>, GenerationError> {
    let (r, g, b) = color_from_prompt(instruction);
    let mut image = RgbImage::new(PREVIEW_WIDTH, PREVIEW_HEIGHT);
    for pixel in image.pixels_mut() {
        *pixel = Rgb([r, g, b]);
    }
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|err| GenerationError::Operation(format!("dryrun preview encode failed: {err}")))?;
    Ok(bytes)
}

/// An MP4 `ftyp` box followed by a `free` box naming the instruction digest.
/// Players reject it, but the bytes are stable and correctly typed.
fn placeholder_video(instruction: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(&24u32.to_be_bytes());
    out.extend_from_slice(b"ftypisom");
    out.extend_from_slice(&0x200u32.to_be_bytes());
    out.extend_from_slice(b"isommp41");

    let label = format!("meshgen dryrun {}", short_digest(instruction));
    out.extend_from_slice(&(8 + label.len() as u32).to_be_bytes());
    out.extend_from_slice(b"free");
    out.extend_from_slice(label.as_bytes());
    out
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let digest = Sha256::digest(prompt.as_bytes());
    (digest[0], digest[1], digest[2])
}

fn short_digest(prompt: &str) -> String {
    Sha256::digest(prompt.as_bytes())
        .iter()
        .take(4)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use meshgen_contracts::data_uri::DataUri;
    use meshgen_contracts::events::EventWriter;
    use meshgen_contracts::media::{AsyncOperation, MediaSource};
    use meshgen_contracts::request::{
        AnimationRequest, AnimationStyle, GenerationRequest, SourceImage, StylePreset,
    };
    use meshgen_contracts::GenerationError;

    use super::{box_mesh_obj, placeholder_video, DryrunBackend};
    use crate::backends::{BackendRequest, MeshBackend, OutputProfile, Submission};
    use crate::poller::tests::RecordingSleep;
    use crate::poller::{await_completion, CancelToken, OperationSource, PollPolicy};
    use crate::prompt::{build_animation_prompt, build_mesh_prompt};

    fn mesh_request(style: StylePreset, profile: OutputProfile) -> BackendRequest {
        let image = SourceImage::new("image/png", vec![0x89, b'P', b'N', b'G'], None).unwrap();
        BackendRequest {
            request_id: "req-1".to_string(),
            model: "dryrun-mesh-1".to_string(),
            profile,
            plan: build_mesh_prompt(&GenerationRequest::new(image, style), profile),
        }
    }

    fn pending(submission: Submission) -> AsyncOperation {
        match submission {
            Submission::Pending { operation, .. } => operation,
            Submission::Immediate { .. } => panic!("dryrun always returns an operation"),
        }
    }

    #[test]
    fn operation_finishes_after_configured_checks() -> anyhow::Result<()> {
        let backend = DryrunBackend::new(2);
        let operation = pending(backend.submit(&mesh_request(
            StylePreset::Realistic,
            OutputProfile::MeshWithPreviewImage,
        ))?);
        assert!(!operation.done);
        assert_eq!(operation.name, "dryrun/operations/req-1");

        let first = backend.check_operation(&operation)?;
        assert!(!first.done);
        let second = backend.check_operation(&first)?;
        assert!(second.done);
        let types: Vec<&str> = second.parts.iter().map(|part| part.content_type.as_str()).collect();
        assert_eq!(types, vec!["model/obj", "image/png"]);

        assert!(backend.check_operation(&second).is_err());
        Ok(())
    }

    #[test]
    fn zero_checks_returns_a_finished_operation() -> anyhow::Result<()> {
        let backend = DryrunBackend::new(0);
        let operation = pending(backend.submit(&mesh_request(
            StylePreset::Sculpture,
            OutputProfile::MeshWithPreviewVideo,
        ))?);
        assert!(operation.done);
        assert_eq!(operation.parts[1].content_type, "video/mp4");
        Ok(())
    }

    #[test]
    fn low_poly_style_triangulates_the_box() {
        let quads = box_mesh_obj(4, 3, false);
        let triangles = box_mesh_obj(4, 3, true);
        assert_eq!(quads.lines().filter(|line| line.starts_with("f ")).count(), 6);
        assert_eq!(triangles.lines().filter(|line| line.starts_with("f ")).count(), 12);
        assert!(quads.contains("v -1.0000 -0.7500 -0.3750"));
    }

    #[test]
    fn animation_yields_a_typed_video() -> anyhow::Result<()> {
        let backend = DryrunBackend::new(0);
        let animation =
            AnimationRequest::new("data:model/obj;base64,dg==", AnimationStyle::Crumble)?;
        let operation = pending(backend.submit(&BackendRequest {
            request_id: "req-2".to_string(),
            model: "dryrun-mesh-1".to_string(),
            profile: OutputProfile::Animation,
            plan: build_animation_prompt(&animation),
        })?);
        assert_eq!(operation.parts.len(), 1);
        let MediaSource::Inline(uri) = &operation.parts[0].source else {
            panic!("expected inline video");
        };
        let decoded = DataUri::parse(uri)?;
        assert_eq!(decoded.mime, "video/mp4");
        assert_eq!(&decoded.bytes[4..8], b"ftyp");
        assert_eq!(placeholder_video("a"), placeholder_video("a"));
        Ok(())
    }

    #[test]
    fn abandoned_operation_is_forgotten() -> anyhow::Result<()> {
        let backend = DryrunBackend::new(3);
        let operation = pending(backend.submit(&mesh_request(
            StylePreset::Realistic,
            OutputProfile::MeshOnly,
        ))?);
        let err = await_completion(
            &backend,
            operation.clone(),
            &PollPolicy {
                max_attempts: 1,
                ..PollPolicy::default()
            },
            &RecordingSleep::default(),
            &CancelToken::new(),
            &EventWriter::disabled("test"),
        )
        .unwrap_err();
        assert!(matches!(err, GenerationError::Timeout { attempts: 1, .. }));
        assert!(backend.check_operation(&operation).is_err());
        Ok(())
    }
}

pub mod backends;
pub mod config;
pub mod materialize;
pub mod mesh;
pub mod poller;
pub mod prompt;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use meshgen_contracts::data_uri::{self, DataUri};
use meshgen_contracts::events::{EventPayload, EventWriter};
use meshgen_contracts::media::{extract_parts, MediaKind, MediaPart};
use meshgen_contracts::models::{
    ModelRegistry, ModelSelection, ModelSelector, ModelSpec, CAPABILITY_ANIMATION,
    CAPABILITY_MESH,
};
use meshgen_contracts::request::{AnimationRequest, GenerationRequest, SourceImage};
use meshgen_contracts::runs::receipts::{build_receipt, write_receipt, ArtifactRecord, Receipt};
use meshgen_contracts::GenerationError;
use serde::Serialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::backends::{
    map_object, BackendRegistry, BackendRequest, DryrunBackend, GeminiBackend, MeshBackend,
    OutputProfile, Submission, VeoBackend,
};
pub use crate::config::StudioConfig;
use crate::materialize::{materialize, HttpFetcher, MediaFetcher};
use crate::mesh::{inspect_mesh, MeshSummary};
pub use crate::poller::CancelToken;
use crate::poller::{await_completion, Sleep, ThreadSleep};
use crate::prompt::{build_animation_prompt, build_mesh_prompt, PromptPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StudioAction {
    Generate,
    Animate,
}

impl StudioAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Animate => "animate",
        }
    }

    /// Prefix used in user-facing failure lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::Generate => "Generation",
            Self::Animate => "Animation",
        }
    }
}

/// Media produced by one request, every field a self-contained data URI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub request_id: String,
    pub action: StudioAction,
    pub model: String,
    pub fallback_reason: Option<String>,
    pub mesh_data_uri: Option<String>,
    pub preview_image_uri: Option<String>,
    pub video_data_uri: Option<String>,
    pub mesh: Option<MeshSummary>,
    pub warnings: Vec<String>,
}

impl GenerationResult {
    /// `(kind, data URI)` pairs in display order.
    pub fn outputs(&self) -> Vec<(MediaKind, &str)> {
        [
            (MediaKind::Mesh, self.mesh_data_uri.as_deref()),
            (MediaKind::PreviewImage, self.preview_image_uri.as_deref()),
            (MediaKind::Video, self.video_data_uri.as_deref()),
        ]
        .into_iter()
        .filter_map(|(kind, uri)| uri.map(|uri| (kind, uri)))
        .collect()
    }
}

/// File name used when an output is saved, e.g. `model.obj`,
/// `preview.png` or `animation.mp4`.
pub fn artifact_file_name(action: StudioAction, kind: MediaKind, mime: &str) -> String {
    let stem = match (action, kind) {
        (_, MediaKind::Mesh) => "model",
        (StudioAction::Animate, MediaKind::Video) => "animation",
        (StudioAction::Generate, MediaKind::Video) | (_, MediaKind::PreviewImage) => "preview",
    };
    let extension = data_uri::extension_for_mime(mime);
    if extension == "dat" {
        let subtype = mime
            .split('/')
            .nth(1)
            .and_then(|rest| rest.split(';').next())
            .map(str::trim)
            .filter(|rest| !rest.is_empty())
            .unwrap_or("bin");
        return format!("output.{subtype}");
    }
    format!("{stem}.{extension}")
}

/// Runs generation and animation requests against the configured backends.
///
/// Each request is strictly sequential: submit, poll, extract, fetch,
/// validate. `Studio` holds no per-request state, so one instance can serve
/// requests from several threads.
pub struct Studio {
    config: StudioConfig,
    events: EventWriter,
    selector: ModelSelector,
    backends: BackendRegistry,
    fetcher: Box<dyn MediaFetcher>,
    sleeper: Box<dyn Sleep>,
    preferred_model: Option<String>,
}

impl Studio {
    pub fn new(config: StudioConfig, events: EventWriter) -> Self {
        let backends = default_backend_registry(&config);
        let fetcher = HttpFetcher::new(config.api_key.clone(), config.request_timeout);
        Self {
            config,
            events,
            selector: ModelSelector::new(None),
            backends,
            fetcher: Box::new(fetcher),
            sleeper: Box::new(ThreadSleep),
            preferred_model: None,
        }
    }

    pub fn with_backends(mut self, backends: BackendRegistry) -> Self {
        self.backends = backends;
        self
    }

    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.selector = ModelSelector::new(Some(registry));
        self
    }

    pub fn with_fetcher(mut self, fetcher: impl MediaFetcher + 'static) -> Self {
        self.fetcher = Box::new(fetcher);
        self
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleep + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.preferred_model = model
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty());
        self
    }

    /// Every registered model and whether its backend is configured.
    pub fn models(&self) -> Vec<(ModelSpec, bool)> {
        self.selector
            .registry
            .list()
            .map(|spec| (spec.clone(), self.backends.contains(&spec.backend)))
            .collect()
    }

    pub fn generate_model(
        &self,
        request: &GenerationRequest,
        cancel: &CancelToken,
    ) -> Result<GenerationResult, GenerationError> {
        let selection = self.select(CAPABILITY_MESH)?;
        let profile = OutputProfile::for_mesh_model(&selection.model);
        let plan = build_mesh_prompt(request, profile);
        let summary = map_object(json!({
            "image": {
                "mime": request.image.mime,
                "bytes": request.image.bytes.len(),
                "file_name": request.image.file_name,
            },
            "prompt": request.prompt,
            "style": request.style.id(),
            "animation": request.animation.map(|style| style.id()),
        }));
        self.run(StudioAction::Generate, selection, profile, plan, summary, cancel)
    }

    pub fn animate(
        &self,
        request: &AnimationRequest,
        cancel: &CancelToken,
    ) -> Result<GenerationResult, GenerationError> {
        let selection = self.select(CAPABILITY_ANIMATION)?;
        let plan = build_animation_prompt(request);
        let summary = map_object(json!({
            "mesh": request.mesh_data_uri,
            "preview_image": request.preview_image_uri,
            "style": request.style.id(),
            "prompt": request.prompt,
        }));
        self.run(
            StudioAction::Animate,
            selection,
            OutputProfile::Animation,
            plan,
            summary,
            cancel,
        )
    }

    fn select(&self, capability: &str) -> Result<ModelSelection, GenerationError> {
        self.selector
            .select_among(self.preferred_model.as_deref(), capability, |spec| {
                self.backends.contains(&spec.backend)
            })
            .map_err(GenerationError::Config)
    }

    fn run(
        &self,
        action: StudioAction,
        selection: ModelSelection,
        profile: OutputProfile,
        plan: PromptPlan,
        request_summary: Map<String, Value>,
        cancel: &CancelToken,
    ) -> Result<GenerationResult, GenerationError> {
        let request_id = Uuid::new_v4().to_string();
        let mut receipt = Receipt {
            request_id: request_id.clone(),
            action: action.as_str().to_string(),
            model: selection.model.name.clone(),
            backend: selection.model.backend.clone(),
            fallback_reason: selection.fallback_reason.clone(),
            request: request_summary,
            backend_request: Map::new(),
            operation: Map::new(),
            artifacts: Vec::new(),
            warnings: Vec::new(),
            error: None,
            started_at: now_utc_iso(),
            finished_at: String::new(),
        };

        let mut started = self.request_payload(&request_id, action);
        started.insert("model".to_string(), json!(selection.model.name));
        started.insert("backend".to_string(), json!(selection.model.backend));
        started.insert("profile".to_string(), json!(profile.as_str()));
        started.insert(
            "fallback_reason".to_string(),
            json!(selection.fallback_reason),
        );
        self.events.record("request_started", started);

        let outcome = self.execute(
            &request_id,
            action,
            &selection,
            profile,
            plan,
            cancel,
            &mut receipt,
        );

        receipt.finished_at = now_utc_iso();
        let mut finished = self.request_payload(&request_id, action);
        match &outcome {
            Ok(result) => {
                receipt.warnings = result.warnings.clone();
                receipt.artifacts = artifact_records(result);
                let outputs: Vec<&str> = result
                    .outputs()
                    .into_iter()
                    .map(|(kind, _)| kind.as_str())
                    .collect();
                finished.insert("outputs".to_string(), json!(outputs));
                finished.insert("mesh".to_string(), json!(result.mesh));
                self.events.record("request_completed", finished);
            }
            Err(err) => {
                receipt.error = Some(err.to_string());
                finished.insert("error_kind".to_string(), json!(err.kind().as_str()));
                finished.insert("error".to_string(), json!(err.to_string()));
                self.events.record("request_failed", finished);
            }
        }
        self.persist_receipt(&receipt);
        outcome
    }

    fn execute(
        &self,
        request_id: &str,
        action: StudioAction,
        selection: &ModelSelection,
        profile: OutputProfile,
        plan: PromptPlan,
        cancel: &CancelToken,
        receipt: &mut Receipt,
    ) -> Result<GenerationResult, GenerationError> {
        let backend = self.backend_for(&selection.model)?;
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        receipt
            .operation
            .insert("prompt".to_string(), Value::Object(plan.describe()));

        let request = BackendRequest {
            request_id: request_id.to_string(),
            model: selection.model.name.clone(),
            profile,
            plan,
        };
        let submission = backend.submit(&request)?;
        receipt.backend_request = submission.payload().clone();

        let parts = match submission {
            Submission::Immediate { parts, .. } => {
                receipt
                    .operation
                    .insert("mode".to_string(), json!("immediate"));
                parts
            }
            Submission::Pending { operation, .. } => {
                let mut submitted = self.request_payload(request_id, action);
                submitted.insert("operation".to_string(), json!(operation.name));
                self.events.record("operation_submitted", submitted);
                receipt
                    .operation
                    .insert("mode".to_string(), json!("long_running"));
                receipt
                    .operation
                    .insert("name".to_string(), json!(operation.name));

                let completed = await_completion(
                    backend,
                    operation,
                    &self.config.poll,
                    self.sleeper.as_ref(),
                    cancel,
                    &self.events,
                )?;
                receipt
                    .operation
                    .insert("status_checks".to_string(), json!(completed.status_checks));
                receipt.operation.insert(
                    "waited_s".to_string(),
                    json!(completed.waited.as_secs_f64()),
                );
                completed.operation.parts
            }
        };
        receipt.operation.insert(
            "parts".to_string(),
            Value::Array(parts.iter().map(describe_part).collect()),
        );

        let wanted = profile.wanted_kinds();
        let extracted = extract_parts(&parts, wanted)?;
        let mut result = GenerationResult {
            request_id: request_id.to_string(),
            action,
            model: selection.model.name.clone(),
            fallback_reason: selection.fallback_reason.clone(),
            mesh_data_uri: None,
            preview_image_uri: None,
            video_data_uri: None,
            mesh: None,
            warnings: Vec::new(),
        };
        for kind in wanted {
            let Some(part) = extracted.get(*kind) else {
                continue;
            };
            if cancel.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }
            let uri = materialize(part, self.fetcher.as_ref())?;
            match kind {
                MediaKind::Mesh => result.mesh_data_uri = Some(uri),
                MediaKind::PreviewImage => result.preview_image_uri = Some(uri),
                MediaKind::Video => result.video_data_uri = Some(uri),
            }
        }
        if let Some(mesh) = result.mesh_data_uri.as_deref() {
            result.mesh = Some(inspect_mesh(mesh)?);
        }

        if selection.requested.is_some() {
            if let Some(reason) = selection.fallback_reason.as_ref() {
                result.warnings.push(reason.clone());
            }
        }
        if profile == OutputProfile::MeshOnly {
            result.warnings.push(format!(
                "Model '{}' returns no preview for the mesh.",
                selection.model.name
            ));
        }
        Ok(result)
    }

    fn backend_for(&self, model: &ModelSpec) -> Result<&dyn MeshBackend, GenerationError> {
        self.backends.get(&model.backend).ok_or_else(|| {
            GenerationError::Config(format!(
                "Backend '{}' for model '{}' is not configured.",
                model.backend, model.name
            ))
        })
    }

    fn request_payload(&self, request_id: &str, action: StudioAction) -> EventPayload {
        let mut payload = EventPayload::new();
        payload.insert("request_id".to_string(), json!(request_id));
        payload.insert("action".to_string(), json!(action.as_str()));
        payload
    }

    fn persist_receipt(&self, receipt: &Receipt) {
        let Some(dir) = self.config.receipts_dir.as_ref() else {
            return;
        };
        let path = receipt_path(dir, &receipt.request_id);
        if let Err(err) = write_receipt(&path, &build_receipt(receipt)) {
            let mut payload = EventPayload::new();
            payload.insert("request_id".to_string(), json!(receipt.request_id));
            payload.insert("path".to_string(), json!(path.to_string_lossy()));
            payload.insert("error".to_string(), json!(format!("{err:#}")));
            self.events.record("receipt_write_failed", payload);
        }
    }
}

/// Backends available for `config`: `dryrun` always, the remote ones only
/// when an API key is present.
pub fn default_backend_registry(config: &StudioConfig) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    registry.register(DryrunBackend::new(config.dryrun_pending_checks));
    if let Some(api_key) = config.api_key.as_deref() {
        registry.register(VeoBackend::new(
            config.api_base.clone(),
            api_key,
            config.request_timeout,
        ));
        registry.register(GeminiBackend::new(
            config.api_base.clone(),
            api_key,
            config.request_timeout,
        ));
    }
    registry
}

pub fn receipt_path(dir: &Path, request_id: &str) -> PathBuf {
    dir.join(format!("receipt-{request_id}.json"))
}

/// Reads a photo from disk. The MIME type is sniffed from the content and
/// falls back to the file extension; non-images are rejected here, before
/// any network call.
pub fn load_source_image(path: &Path) -> Result<SourceImage> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mime = image::guess_format(&bytes)
        .ok()
        .map(|format| format.to_mime_type())
        .or_else(|| data_uri::mime_for_path(path))
        .unwrap_or("application/octet-stream");
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string());
    Ok(SourceImage::new(mime, bytes, file_name)?)
}

/// Reads a saved output back as a data URI. Files that already hold a data
/// URI are passed through.
pub fn load_media_file(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if let Ok(text) = std::str::from_utf8(&bytes) {
        if data_uri::is_data_uri(text) {
            DataUri::parse(text)?;
            return Ok(text.trim().to_string());
        }
    }
    let mime = data_uri::mime_for_path(path)
        .or_else(|| {
            image::guess_format(&bytes)
                .ok()
                .map(|format| format.to_mime_type())
        })
        .unwrap_or("application/octet-stream");
    Ok(data_uri::encode(mime, &bytes))
}

fn artifact_records(result: &GenerationResult) -> Vec<ArtifactRecord> {
    result
        .outputs()
        .into_iter()
        .filter_map(|(kind, uri)| {
            let decoded = DataUri::parse(uri).ok()?;
            let name = artifact_file_name(result.action, kind, &decoded.mime);
            Some(ArtifactRecord::new(
                kind,
                &decoded.mime,
                Path::new(&name),
                &decoded.bytes,
            ))
        })
        .collect()
}

fn describe_part(part: &MediaPart) -> Value {
    json!({
        "content_type": part.content_type,
        "inline": part.is_inline(),
    })
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Mutex;
    use std::time::Duration;

    use image::{DynamicImage, ImageFormat, RgbImage};
    use meshgen_contracts::data_uri::DataUri;
    use meshgen_contracts::events::EventWriter;
    use meshgen_contracts::media::{AsyncOperation, MediaKind, MediaPart};
    use meshgen_contracts::request::{
        AnimationRequest, AnimationStyle, GenerationRequest, StylePreset,
    };
    use meshgen_contracts::{ErrorKind, GenerationError};
    use serde_json::Value;

    use super::{
        artifact_file_name, load_media_file, load_source_image, receipt_path, CancelToken,
        Studio, StudioAction, StudioConfig,
    };
    use crate::backends::{
        BackendRegistry, BackendRequest, DryrunBackend, MeshBackend, Submission,
    };
    use crate::materialize::tests::CannedFetcher;
    use crate::mesh::MeshFormat;
    use crate::poller::{OperationSource, Sleep};

    #[derive(Default)]
    struct CountingSleep {
        calls: Mutex<u32>,
    }

    impl Sleep for CountingSleep {
        fn sleep(&self, _duration: Duration, _cancel: &CancelToken) -> bool {
            if let Ok(mut calls) = self.calls.lock() {
                *calls += 1;
            }
            true
        }
    }

    /// Long-running backend whose finished operation points at remote URLs.
    struct RemoteBackend {
        parts: Vec<MediaPart>,
    }

    impl OperationSource for RemoteBackend {
        fn check_operation(
            &self,
            operation: &AsyncOperation,
        ) -> Result<AsyncOperation, GenerationError> {
            Ok(AsyncOperation {
                name: operation.name.clone(),
                done: true,
                parts: self.parts.clone(),
                ..AsyncOperation::default()
            })
        }
    }

    impl MeshBackend for RemoteBackend {
        fn name(&self) -> &str {
            "veo"
        }

        fn submit(&self, _request: &BackendRequest) -> Result<Submission, GenerationError> {
            Ok(Submission::Pending {
                operation: AsyncOperation::pending("operations/remote-1"),
                payload: Default::default(),
            })
        }
    }

    fn write_photo(dir: &std::path::Path) -> anyhow::Result<std::path::PathBuf> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(8, 6))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)?;
        let path = dir.join("photo.jpg");
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    fn offline_studio(events: EventWriter, receipts: Option<std::path::PathBuf>) -> Studio {
        let config = StudioConfig {
            receipts_dir: receipts,
            ..StudioConfig::default()
        };
        Studio::new(config, events).with_sleeper(CountingSleep::default())
    }

    #[test]
    fn photo_to_low_poly_mesh_through_dryrun() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let photo = write_photo(temp.path())?;
        let events_path = temp.path().join("events.jsonl");
        let receipts = temp.path().join("receipts");
        let studio = offline_studio(
            EventWriter::new(&events_path, "session-1"),
            Some(receipts.clone()),
        );

        let image = load_source_image(&photo)?;
        assert_eq!(image.mime, "image/jpeg");
        let request =
            GenerationRequest::new(image, StylePreset::LowPoly).with_prompt(Some(String::new()));
        let result = studio.generate_model(&request, &CancelToken::new())?;

        let mesh = result.mesh_data_uri.as_deref().unwrap_or_default();
        assert!(mesh.starts_with("data:model/obj;base64,"));
        let summary = result.mesh.expect("mesh summary");
        assert_eq!(summary.format, MeshFormat::Obj);
        assert_eq!((summary.vertices, summary.faces), (8, 12));
        assert!(result
            .preview_image_uri
            .as_deref()
            .unwrap_or_default()
            .starts_with("data:image/png;base64,"));
        assert_eq!(result.video_data_uri, None);
        assert_eq!(result.model, "dryrun-mesh-1");
        assert!(result.warnings.is_empty());

        let content = std::fs::read_to_string(&events_path)?;
        let types: Vec<String> = content
            .lines()
            .map(|line| {
                serde_json::from_str::<Value>(line)
                    .map(|event| event["type"].as_str().unwrap_or_default().to_string())
            })
            .collect::<Result<_, _>>()?;
        assert_eq!(
            types,
            vec![
                "request_started",
                "operation_submitted",
                "poll_attempt",
                "poll_attempt",
                "request_completed",
            ]
        );

        let receipt: Value = serde_json::from_str(&std::fs::read_to_string(receipt_path(
            &receipts,
            &result.request_id,
        ))?)?;
        assert_eq!(receipt["operation"]["status_checks"], Value::from(2));
        assert_eq!(receipt["artifacts"][0]["path"], Value::from("model.obj"));
        assert_eq!(receipt["request"]["style"], Value::from("low-poly"));
        Ok(())
    }

    #[test]
    fn animation_returns_video_data_uri() -> anyhow::Result<()> {
        let studio = offline_studio(EventWriter::disabled("session-2"), None);
        let request =
            AnimationRequest::new("data:model/obj;base64,dg==", AnimationStyle::Dismantle)?;
        let result = studio.animate(&request, &CancelToken::new())?;

        assert!(result
            .video_data_uri
            .as_deref()
            .unwrap_or_default()
            .starts_with("data:video/mp4;base64,"));
        assert_eq!(result.mesh_data_uri, None);
        assert_eq!(result.action, StudioAction::Animate);
        Ok(())
    }

    #[test]
    fn remote_parts_are_downloaded_and_a_missing_file_fails_the_request() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let photo = write_photo(temp.path())?;
        let request = GenerationRequest::new(load_source_image(&photo)?, StylePreset::Realistic);

        let mut backends = BackendRegistry::new();
        backends.register(RemoteBackend {
            parts: vec![
                MediaPart::url("video/mp4", "https://files.test/preview"),
                MediaPart::url("model/obj", "https://files.test/mesh"),
            ],
        });
        let fetcher = CannedFetcher::default().with(
            "https://files.test/mesh",
            200,
            Some("model/obj"),
            b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n",
        );
        let studio = offline_studio(EventWriter::disabled("session-3"), None)
            .with_backends(backends)
            .with_fetcher(fetcher);

        let err = studio
            .generate_model(&request, &CancelToken::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Download);
        assert!(err
            .user_message(StudioAction::Generate.label())
            .starts_with("Generation failed: Failed to download https://files.test/preview"));
        Ok(())
    }

    #[test]
    fn generic_download_type_keeps_the_matched_mesh_type() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let photo = write_photo(temp.path())?;
        let request = GenerationRequest::new(load_source_image(&photo)?, StylePreset::Realistic);

        let mut backends = BackendRegistry::new();
        backends.register(RemoteBackend {
            parts: vec![
                MediaPart::url("model/obj", "https://files.test/mesh"),
                MediaPart::url("video/mp4", "https://files.test/preview"),
            ],
        });
        let fetcher = CannedFetcher::default()
            .with(
                "https://files.test/mesh",
                200,
                Some("application/octet-stream"),
                b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n",
            )
            .with(
                "https://files.test/preview",
                200,
                Some("binary/octet-stream"),
                b"\x00\x00\x00\x18ftyp",
            );
        let studio = offline_studio(EventWriter::disabled("session-7"), None)
            .with_backends(backends)
            .with_fetcher(fetcher);

        let result = studio.generate_model(&request, &CancelToken::new())?;
        let mesh = result.mesh_data_uri.as_deref().unwrap_or_default();
        assert!(mesh.starts_with("data:model/obj;base64,"));
        assert_eq!(result.mesh.map(|summary| summary.faces), Some(1));
        assert!(result
            .video_data_uri
            .as_deref()
            .unwrap_or_default()
            .starts_with("data:video/mp4;base64,"));
        let names: Vec<String> = result
            .outputs()
            .into_iter()
            .map(|(kind, uri)| {
                let mime = DataUri::parse(uri).map(|decoded| decoded.mime).unwrap_or_default();
                artifact_file_name(result.action, kind, &mime)
            })
            .collect();
        assert_eq!(names, vec!["model.obj", "preview.mp4"]);
        Ok(())
    }

    #[test]
    fn requested_model_without_backend_falls_back_with_warning() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let photo = write_photo(temp.path())?;
        let request = GenerationRequest::new(load_source_image(&photo)?, StylePreset::Sculpture);
        let studio = offline_studio(EventWriter::disabled("session-4"), None)
            .with_model(Some("veo-2.0-generate-001".to_string()));

        let result = studio.generate_model(&request, &CancelToken::new())?;
        assert_eq!(result.model, "dryrun-mesh-1");
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("not configured"));
        Ok(())
    }

    #[test]
    fn no_configured_backend_is_a_config_error() {
        let studio = offline_studio(EventWriter::disabled("session-5"), None)
            .with_backends(BackendRegistry::new());
        let request = AnimationRequest::new("data:model/obj;base64,dg==", AnimationStyle::Bounce)
            .expect("valid request");
        let err = studio.animate(&request, &CancelToken::new()).unwrap_err();
        assert_eq!(
            err,
            GenerationError::Config("No models available for capability 'animation'.".to_string())
        );
    }

    #[test]
    fn cancelled_token_stops_before_submission() -> anyhow::Result<()> {
        let mut backends = BackendRegistry::new();
        backends.register(DryrunBackend::new(1));
        let studio =
            offline_studio(EventWriter::disabled("session-6"), None).with_backends(backends);
        let cancel = CancelToken::new();
        cancel.cancel();
        let request =
            AnimationRequest::new("data:model/obj;base64,dg==", AnimationStyle::Turntable)?;
        assert_eq!(
            studio.animate(&request, &cancel).unwrap_err(),
            GenerationError::Cancelled
        );
        Ok(())
    }

    #[test]
    fn non_image_input_is_rejected_before_any_request() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("notes.txt");
        std::fs::write(&path, "hello")?;
        let err = load_source_image(&path).unwrap_err();
        let validation = err
            .downcast_ref::<GenerationError>()
            .map(GenerationError::is_validation);
        assert_eq!(validation, Some(true));
        assert_eq!(err.to_string(), "Only image files are allowed.");
        Ok(())
    }

    #[test]
    fn saved_outputs_load_back_as_data_uris() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let obj = temp.path().join("model.obj");
        std::fs::write(&obj, "v 0 0 0\n")?;
        let uri = load_media_file(&obj)?;
        assert_eq!(DataUri::parse(&uri)?.mime, "model/obj");

        let stored = temp.path().join("mesh.txt");
        std::fs::write(&stored, format!("{uri}\n"))?;
        assert_eq!(load_media_file(&stored)?, uri);
        Ok(())
    }

    #[test]
    fn artifact_names_follow_mime() {
        let generate = StudioAction::Generate;
        assert_eq!(artifact_file_name(generate, MediaKind::Mesh, "model/obj"), "model.obj");
        assert_eq!(
            artifact_file_name(generate, MediaKind::Mesh, "model/gltf+json"),
            "model.gltf"
        );
        assert_eq!(artifact_file_name(generate, MediaKind::Video, "video/mp4"), "preview.mp4");
        assert_eq!(
            artifact_file_name(StudioAction::Animate, MediaKind::Video, "video/mp4"),
            "animation.mp4"
        );
        assert_eq!(
            artifact_file_name(generate, MediaKind::PreviewImage, "image/png"),
            "preview.png"
        );
        assert_eq!(
            artifact_file_name(generate, MediaKind::Mesh, "application/x-tgif"),
            "output.x-tgif"
        );
    }
}

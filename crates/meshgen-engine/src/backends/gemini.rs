use std::time::Duration;

use meshgen_contracts::data_uri::DataUri;
use meshgen_contracts::media::{AsyncOperation, MediaKind, MediaPart};
use meshgen_contracts::GenerationError;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use super::{
    collect_media_parts, map_object, model_path, response_json_or_error, send_error,
    BackendRequest, MeshBackend, Submission,
};
use crate::poller::OperationSource;
use crate::prompt::PromptPlan;

/// `generateContent` answers in one round trip, so nothing is polled.
pub struct GeminiBackend {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl GeminiBackend {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http: HttpClient::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| HttpClient::new()),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        format!("{}/{}:generateContent", self.api_base, model_path(model))
    }

    pub(crate) fn build_payload(plan: &PromptPlan) -> Result<Value, GenerationError> {
        let mut parts = Vec::with_capacity(plan.attachments.len() + 1);
        for attachment in &plan.attachments {
            let decoded = DataUri::parse(&attachment.data_uri)?;
            let payload = attachment
                .data_uri
                .split_once(',')
                .map(|(_, b64)| b64.trim())
                .unwrap_or_default();
            parts.push(json!({
                "inlineData": {
                    "mimeType": decoded.mime,
                    "data": payload,
                }
            }));
        }
        parts.push(json!({ "text": plan.instruction }));

        Ok(json!({
            "contents": [{"role": "user", "parts": parts}],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "candidateCount": 1,
            },
        }))
    }

    pub(crate) fn extract_parts(payload: &Value) -> Result<Vec<MediaPart>, GenerationError> {
        if let Some(reason) = payload
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
        {
            return Err(GenerationError::Operation(format!(
                "request was blocked ({reason})"
            )));
        }

        let mut parts = Vec::new();
        let candidates = payload
            .get("candidates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for candidate in &candidates {
            let Some(content_parts) = candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
            else {
                continue;
            };
            for part in content_parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    if let Some(obj) = obj_from_text(text) {
                        parts.push(MediaPart::inline(
                            MediaKind::Mesh.preferred_content_type(),
                            obj.as_bytes(),
                        ));
                    }
                    continue;
                }
                collect_media_parts(part, None, &mut parts)?;
            }
        }
        Ok(parts)
    }
}

/// Text answers sometimes carry the OBJ inline, optionally fenced.
fn obj_from_text(text: &str) -> Option<String> {
    let mut body = text.trim();
    if let Some(start) = body.find("```") {
        let after = &body[start + 3..];
        let after = after.split_once('\n').map(|(_, rest)| rest).unwrap_or(after);
        body = after.split("```").next().unwrap_or(after);
    }
    let lines: Vec<&str> = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let has_vertex = lines.iter().any(|line| line.starts_with("v "));
    let has_face = lines.iter().any(|line| line.starts_with("f "));
    if !(has_vertex && has_face) {
        return None;
    }
    Some(lines.join("\n") + "\n")
}

impl OperationSource for GeminiBackend {
    fn check_operation(
        &self,
        operation: &AsyncOperation,
    ) -> Result<AsyncOperation, GenerationError> {
        Ok(operation.clone())
    }
}

impl MeshBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn submit(&self, request: &BackendRequest) -> Result<Submission, GenerationError> {
        let payload = Self::build_payload(&request.plan)?;
        let response = self
            .http
            .post(self.endpoint_for_model(&request.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .map_err(|err| send_error("gemini", err))?;
        let body = response_json_or_error("gemini", response)?;
        let parts = Self::extract_parts(&body)?;
        Ok(Submission::Immediate {
            parts,
            payload: map_object(payload),
        })
    }
}

#[cfg(test)]
mod tests {
    use meshgen_contracts::data_uri::DataUri;
    use meshgen_contracts::media::{MediaPart, MediaSource};
    use meshgen_contracts::request::{GenerationRequest, SourceImage, StylePreset};
    use meshgen_contracts::{ErrorKind, GenerationError};
    use serde_json::json;

    use super::{obj_from_text, GeminiBackend};
    use crate::backends::OutputProfile;
    use crate::prompt::build_mesh_prompt;

    #[test]
    fn payload_puts_image_before_instruction() -> anyhow::Result<()> {
        let image = SourceImage::new("image/png", vec![1, 2, 3], None)?;
        let request = GenerationRequest::new(image, StylePreset::Cartoonish);
        let plan = build_mesh_prompt(&request, OutputProfile::MeshWithPreviewImage);
        let payload = GeminiBackend::build_payload(&plan)?;

        let parts = &payload["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/png"));
        assert_eq!(parts[0]["inlineData"]["data"], json!("AQID"));
        assert!(parts[1]["text"].as_str().unwrap_or_default().contains("cartoonish"));
        Ok(())
    }

    #[test]
    fn inline_and_file_parts_become_media() -> anyhow::Result<()> {
        let response = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "Here is your model."},
                    {"fileData": {"mimeType": "model/gltf+json", "fileUri": "https://files.test/m.gltf"}},
                    {"inlineData": {"mimeType": "image/png", "data": "iVBORw=="}},
                ]}
            }]
        });
        let parts = GeminiBackend::extract_parts(&response)?;
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], MediaPart::url("model/gltf+json", "https://files.test/m.gltf"));
        assert!(matches!(parts[1].source, MediaSource::Inline(_)));
        Ok(())
    }

    #[test]
    fn obj_text_answer_becomes_inline_mesh() -> anyhow::Result<()> {
        let response = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "```obj\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n```"},
                ]}
            }]
        });
        let parts = GeminiBackend::extract_parts(&response)?;
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].content_type, "model/obj");
        let MediaSource::Inline(uri) = &parts[0].source else {
            panic!("expected inline mesh");
        };
        let decoded = DataUri::parse(uri)?;
        assert_eq!(decoded.bytes, b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n");
        Ok(())
    }

    #[test]
    fn blocked_prompt_is_an_operation_error() {
        let response = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = GeminiBackend::extract_parts(&response).unwrap_err();
        assert_eq!(
            err,
            GenerationError::Operation("request was blocked (SAFETY)".to_string())
        );
        assert_eq!(obj_from_text("no mesh here"), None);
    }

    #[test]
    fn corrupt_inline_mesh_is_reported_as_decode_error() {
        let response = json!({
            "candidates": [{
                "content": {"parts": [
                    {"inlineData": {"mimeType": "model/obj", "data": "%%%"}},
                ]}
            }]
        });
        let err = GeminiBackend::extract_parts(&response).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }
}

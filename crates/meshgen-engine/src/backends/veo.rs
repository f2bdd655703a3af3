use std::time::Duration;

use meshgen_contracts::data_uri::DataUri;
use meshgen_contracts::media::AsyncOperation;
use meshgen_contracts::GenerationError;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};

use super::{
    collect_media_parts, map_object, model_path, response_json_or_error, send_error,
    BackendRequest, MeshBackend, Submission,
};
use crate::poller::OperationSource;
use crate::prompt::PromptPlan;

/// Long-running generation API: submit returns an operation name that is
/// polled until `done`.
pub struct VeoBackend {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl VeoBackend {
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

    fn submit_endpoint(&self, model: &str) -> String {
        format!("{}/{}:predictLongRunning", self.api_base, model_path(model))
    }

    fn operation_endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.api_base, name.trim().trim_start_matches('/'))
    }

    pub(crate) fn build_payload(plan: &PromptPlan) -> Result<Value, GenerationError> {
        let mut media = plan
            .attachments
            .iter()
            .map(|attachment| {
                let decoded = DataUri::parse(&attachment.data_uri)?;
                Ok::<_, GenerationError>(inline_media(&attachment.data_uri, &decoded.mime))
            })
            .collect::<Result<Vec<Value>, GenerationError>>()?;

        let mut instance = Map::new();
        instance.insert(
            "prompt".to_string(),
            Value::String(plan.instruction.clone()),
        );
        if !media.is_empty() {
            instance.insert("image".to_string(), media.remove(0));
        }
        if !media.is_empty() {
            instance.insert("referenceMedia".to_string(), Value::Array(media));
        }

        Ok(json!({
            "instances": [Value::Object(instance)],
            "parameters": {
                "durationSeconds": plan.output.duration_seconds,
                "aspectRatio": plan.output.aspect_ratio,
                "sampleCount": 1,
            },
        }))
    }

    /// Reads `{ name, done, error, response }` into an [`AsyncOperation`].
    pub(crate) fn parse_operation(payload: &Value) -> Result<AsyncOperation, GenerationError> {
        let name = payload
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or(GenerationError::MissingOperation)?;
        let done = payload.get("done").and_then(Value::as_bool).unwrap_or(false);
        let error = payload.get("error").and_then(|error| match error {
            Value::String(message) => Some(message.clone()),
            Value::Object(obj) => obj
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| Some(error.to_string())),
            _ => None,
        });
        let mut parts = Vec::new();
        if let Some(response) = payload.get("response") {
            collect_media_parts(response, None, &mut parts)?;
        }
        let metadata = payload
            .get("metadata")
            .cloned()
            .map(map_object)
            .unwrap_or_default();
        Ok(AsyncOperation {
            name: name.to_string(),
            done,
            error,
            parts,
            metadata,
        })
    }
}

fn inline_media(data_uri: &str, mime: &str) -> Value {
    let payload = data_uri.split_once(',').map(|(_, b64)| b64).unwrap_or_default();
    json!({
        "bytesBase64Encoded": payload.trim(),
        "mimeType": mime,
    })
}

impl OperationSource for VeoBackend {
    fn check_operation(
        &self,
        operation: &AsyncOperation,
    ) -> Result<AsyncOperation, GenerationError> {
        let response = self
            .http
            .get(self.operation_endpoint(&operation.name))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .map_err(|err| send_error("veo status", err))?;
        let payload = response_json_or_error("veo status", response)?;
        Self::parse_operation(&payload)
    }
}

impl MeshBackend for VeoBackend {
    fn name(&self) -> &str {
        "veo"
    }

    fn submit(&self, request: &BackendRequest) -> Result<Submission, GenerationError> {
        let payload = Self::build_payload(&request.plan)?;
        let response = self
            .http
            .post(self.submit_endpoint(&request.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .map_err(|err| send_error("veo", err))?;
        let body = response_json_or_error("veo", response)?;
        let operation = Self::parse_operation(&body)?;
        Ok(Submission::Pending {
            operation,
            payload: map_object(payload),
        })
    }
}

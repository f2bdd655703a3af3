use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::media::MediaKind;

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

/// One file written for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub kind: MediaKind,
    pub mime: String,
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

impl ArtifactRecord {
    pub fn new(kind: MediaKind, mime: &str, path: &Path, payload: &[u8]) -> Self {
        Self {
            kind,
            mime: mime.to_string(),
            path: path.to_path_buf(),
            bytes: payload.len() as u64,
            sha256: sha256_hex(payload),
        }
    }
}

/// Everything needed to explain one generation or animation request after
/// the fact. Media payloads are never stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub request_id: String,
    pub action: String,
    pub model: String,
    pub backend: String,
    pub fallback_reason: Option<String>,
    pub request: Map<String, Value>,
    pub backend_request: Map<String, Value>,
    pub operation: Map<String, Value>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactRecord>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: String,
}

pub fn build_receipt(receipt: &Receipt) -> Value {
    let mut root = Map::new();
    root.insert(
        "schema_version".to_string(),
        Value::Number(RECEIPT_SCHEMA_VERSION.into()),
    );
    if let Ok(Value::Object(fields)) = serde_json::to_value(receipt) {
        for (key, value) in fields {
            root.insert(key, sanitize_payload(&value));
        }
    }
    Value::Object(root)
}

pub fn write_receipt(path: &Path, payload: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(payload)?)?;
    Ok(())
}

pub fn sha256_hex(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Drops inline media and credentials from a payload before it is logged.
pub fn sanitize_payload(value: &Value) -> Value {
    match value {
        Value::String(text) if text.trim_start().starts_with("data:") => {
            let header = text.split(',').next().unwrap_or_default();
            Value::String(format!("{header},<omitted>"))
        }
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Array(rows) => Value::Array(rows.iter().map(sanitize_payload).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, row) in map {
                let lowered = key.to_ascii_lowercase();
                if matches!(
                    lowered.as_str(),
                    "data" | "bytesbase64encoded" | "b64_json" | "key" | "api_key"
                ) {
                    out.insert(key.clone(), Value::String("<omitted>".to_string()));
                    continue;
                }
                out.insert(key.clone(), sanitize_payload(row));
            }
            Value::Object(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::{json, Map, Value};

    use super::{
        build_receipt, sanitize_payload, sha256_hex, write_receipt, ArtifactRecord, Receipt,
        RECEIPT_SCHEMA_VERSION,
    };
    use crate::media::MediaKind;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn receipt_round_trips_through_disk_without_payloads() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let receipt_path = temp.path().join("receipt-req-1.json");
        let mesh_path = temp.path().join("model.obj");

        let receipt = Receipt {
            request_id: "req-1".to_string(),
            action: "generate".to_string(),
            model: "dryrun-mesh-1".to_string(),
            backend: "dryrun".to_string(),
            fallback_reason: None,
            request: obj(json!({
                "style": "low-poly",
                "image": "data:image/jpeg;base64,/9j/4AAQ",
            })),
            backend_request: obj(json!({
                "instances": [{"image": {"bytesBase64Encoded": "AAAA", "mimeType": "image/jpeg"}}],
            })),
            operation: obj(json!({"name": "operations/1", "status_checks": 2})),
            artifacts: vec![ArtifactRecord::new(
                MediaKind::Mesh,
                "model/obj",
                &mesh_path,
                b"v 0 0 0\n",
            )],
            warnings: vec!["note".to_string()],
            error: None,
            started_at: "2026-10-18T00:00:00+00:00".to_string(),
            finished_at: "2026-10-18T00:00:05+00:00".to_string(),
        };
        write_receipt(&receipt_path, &build_receipt(&receipt))?;

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&receipt_path)?)?;
        assert_eq!(parsed["schema_version"], json!(RECEIPT_SCHEMA_VERSION));
        assert_eq!(parsed["request"]["style"], json!("low-poly"));
        assert_eq!(
            parsed["request"]["image"],
            json!("data:image/jpeg;base64,<omitted>")
        );
        assert_eq!(
            parsed["backend_request"]["instances"][0]["image"]["bytesBase64Encoded"],
            json!("<omitted>")
        );
        assert_eq!(parsed["artifacts"][0]["kind"], json!("mesh"));
        assert_eq!(parsed["artifacts"][0]["bytes"], json!(8));
        assert_eq!(
            parsed["artifacts"][0]["path"],
            json!(mesh_path.to_string_lossy())
        );
        Ok(())
    }

    #[test]
    fn sanitize_hides_credentials() {
        let cleaned = sanitize_payload(&json!({"url": "https://x.test/v", "key": "secret"}));
        assert_eq!(cleaned["key"], json!("<omitted>"));
        assert_eq!(cleaned["url"], json!("https://x.test/v"));
    }

    #[test]
    fn artifact_digest_is_hex_sha256() {
        let record = ArtifactRecord::new(MediaKind::Video, "video/mp4", Path::new("a.mp4"), b"abc");
        assert_eq!(
            record.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(sha256_hex(b"abc"), record.sha256);
    }
}

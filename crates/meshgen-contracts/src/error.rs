use std::time::Duration;

use crate::media::MediaKind;

/// Every way a generation or animation request can fail.
///
/// Callers branch on the variant (or on [`ErrorKind`]); the `Display` text is
/// meant for people.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Expected the model to return an operation.")]
    MissingOperation,

    #[error("Model generation failed: {0}")]
    Operation(String),

    #[error("Failed to find the generated {kind} in the operation result.")]
    MissingPart { kind: MediaKind },

    #[error("Failed to download {url}: {reason}")]
    Download {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Operation did not finish after {attempts} status checks ({:.1}s)", .waited.as_secs_f64())]
    Timeout { attempts: u32, waited: Duration },

    #[error("Request was cancelled.")]
    Cancelled,

    #[error("Generated mesh is malformed: {0}")]
    InvalidMesh(String),

    #[error("Invalid data URI: {0}")]
    Decode(String),

    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    Config(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    MissingOperation,
    Operation,
    MissingPart,
    Download,
    Timeout,
    Cancelled,
    InvalidMesh,
    Decode,
    Transport,
    Config,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::MissingOperation => "missing_operation",
            Self::Operation => "operation_error",
            Self::MissingPart => "missing_part",
            Self::Download => "download_error",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::InvalidMesh => "invalid_mesh",
            Self::Decode => "decode_error",
            Self::Transport => "transport_error",
            Self::Config => "config_error",
        }
    }
}

impl GenerationError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn transport(err: &anyhow::Error) -> Self {
        Self::Transport(format!("{err:#}"))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::MissingOperation => ErrorKind::MissingOperation,
            Self::Operation(_) => ErrorKind::Operation,
            Self::MissingPart { .. } => ErrorKind::MissingPart,
            Self::Download { .. } => ErrorKind::Download,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InvalidMesh(_) => ErrorKind::InvalidMesh,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Single line shown to the user, e.g. `Generation failed: ...`.
    ///
    /// Validation messages are shown as-is since they already name the field.
    pub fn user_message(&self, action: &str) -> String {
        if self.is_validation() {
            return self.to_string();
        }
        format!("{action} failed: {self}")
    }
}

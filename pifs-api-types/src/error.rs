use serde::Serialize;

/// The error taxonomy of the HTTP surface (spec §7).
///
/// Every fallible operation that can be reached directly from a handler
/// ultimately resolves to one of these kinds. Internal failures (anything
/// that does not have a dedicated variant) are folded into `Internal`
/// before crossing the handler boundary; the original `anyhow::Error` is
/// logged, never returned to the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("{0}")]
    UploadError(String),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("missing Content-Length header")]
    MissingContentLength,

    #[error("{message}")]
    Conflict {
        message: String,
        files: Vec<String>,
        kind: ConflictKind,
    },

    #[error("locked by another task")]
    LockAlreadyTaken,

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("unsupported content type")]
    UnsupportedContentType,

    #[error("file or directory is referenced by a pending dataset")]
    HasPendingDataset,

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

/// Distinguishes why a 409 was raised, since `UploadConflict` and
/// `LockAlreadyTaken` both serialise to 409 but carry different bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    PathExists,
    MetadataExists,
}

impl ApiError {
    /// Wire status code per spec §7.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InvalidPath(_) => 400,
            ApiError::UploadError(_) => 400,
            ApiError::ChecksumMismatch => 400,
            ApiError::Unauthorized => 401,
            ApiError::Forbidden => 403,
            ApiError::NotFound(_) => 404,
            ApiError::MethodNotAllowed => 405,
            ApiError::MissingContentLength => 411,
            ApiError::Conflict { .. } => 409,
            ApiError::LockAlreadyTaken => 409,
            ApiError::PayloadTooLarge(_) => 413,
            ApiError::UnsupportedContentType => 415,
            ApiError::HasPendingDataset => 403,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn conflict(message: impl Into<String>, files: Vec<String>) -> Self {
        ApiError::Conflict {
            message: message.into(),
            files,
            kind: ConflictKind::PathExists,
        }
    }

    pub fn metadata_conflict(message: impl Into<String>, files: Vec<String>) -> Self {
        ApiError::Conflict {
            message: message.into(),
            files,
            kind: ConflictKind::MetadataExists,
        }
    }

    /// The JSON body shape of spec §6: `{code, error, files?}`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "code": self.status_code(),
            "error": self.public_message(),
        });
        if let ApiError::Conflict { files, .. } = self {
            body["files"] = serde_json::json!(files);
        }
        body
    }

    /// The message that is safe to show to a client. Internal errors are
    /// scrubbed; the real cause is only ever logged.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Internal(_) => "Internal server error".to_string(),
            ApiError::LockAlreadyTaken => "locked by another task".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_are_scrubbed() {
        let err = ApiError::Internal(anyhow::anyhow!("postgres connection refused at 10.0.0.5"));
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn conflict_carries_files() {
        let err = ApiError::conflict("File already exists", vec!["/a/b.txt".to_string()]);
        let json = err.to_json();
        assert_eq!(json["code"], 409);
        assert_eq!(json["files"][0], "/a/b.txt");
    }
}

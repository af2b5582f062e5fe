//! Resumable upload support (C12, spec §6 "tus metadata fields").
//!
//! The HTTP layer owns the actual tus wire protocol (offsets, `HEAD`/
//! `PATCH`, `Upload-Metadata` parsing); this module is the pair of
//! lifecycle callbacks the original event-handler design names
//! `upload-started` and `upload-completed`, adapted onto the upload
//! state machine in [`crate::server::upload`].

use base64::Engine;
use pifs_api_types::{ApiError, UploadType};

/// Fields carried in the tus `Upload-Metadata` header, base64-decoded
/// per key (spec §6).
#[derive(Debug, Clone)]
pub struct TusMetadata {
    pub upload_type: UploadType,
    pub project_id: String,
    pub upload_path: String,
    pub filename: String,
    pub checksum: Option<String>,
}

/// Parses the tus `Upload-Metadata` header: comma-separated
/// `key base64(value)` pairs.
pub fn parse_metadata(header_value: &str) -> Result<TusMetadata, ApiError> {
    let mut upload_type = None;
    let mut project_id = None;
    let mut upload_path = None;
    let mut filename = None;
    let mut checksum = None;

    for pair in header_value.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let mut parts = pair.splitn(2, ' ');
        let key = parts
            .next()
            .ok_or_else(|| ApiError::UploadError("malformed Upload-Metadata".to_string()))?;
        let encoded = parts.next().unwrap_or("");
        let value = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ApiError::UploadError(format!("malformed Upload-Metadata: {e}")))?;
        let value = String::from_utf8(value)
            .map_err(|e| ApiError::UploadError(format!("malformed Upload-Metadata: {e}")))?;

        match key {
            "type" => {
                upload_type = Some(match value.as_str() {
                    "file" => UploadType::File,
                    "archive" => UploadType::Archive,
                    other => {
                        return Err(ApiError::UploadError(format!("unknown upload type '{other}'")))
                    }
                })
            }
            "project_id" => project_id = Some(value),
            "upload_path" => upload_path = Some(value),
            "filename" => filename = Some(value),
            "checksum" => checksum = Some(value),
            _ => {}
        }
    }

    Ok(TusMetadata {
        upload_type: upload_type
            .ok_or_else(|| ApiError::UploadError("missing 'type' metadata field".to_string()))?,
        project_id: project_id
            .ok_or_else(|| ApiError::UploadError("missing 'project_id' metadata field".to_string()))?,
        upload_path: upload_path
            .ok_or_else(|| ApiError::UploadError("missing 'upload_path' metadata field".to_string()))?,
        filename: filename.unwrap_or_default(),
        checksum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn encode(s: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(s)
    }

    #[test]
    fn parses_a_full_metadata_header() {
        let header = format!(
            "type {},project_id {},upload_path {},filename {}",
            encode("file"),
            encode("demo"),
            encode("a/b.txt"),
            encode("b.txt"),
        );
        let meta = parse_metadata(&header).unwrap();
        assert_eq!(meta.upload_type, UploadType::File);
        assert_eq!(meta.project_id, "demo");
        assert_eq!(meta.upload_path, "a/b.txt");
        assert_eq!(meta.filename, "b.txt");
        assert!(meta.checksum.is_none());
    }

    #[test]
    fn rejects_unknown_upload_type() {
        let header = format!(
            "type {},project_id {},upload_path {}",
            encode("tarball"),
            encode("demo"),
            encode("a.txt"),
        );
        assert!(parse_metadata(&header).is_err());
    }

    #[test]
    fn rejects_missing_required_field() {
        let header = format!("type {}", encode("file"));
        assert!(parse_metadata(&header).is_err());
    }
}

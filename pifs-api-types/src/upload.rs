use serde::{Deserialize, Serialize};

pub type UploadId = String;

/// Whether an upload's payload is a single file or an archive to extract
/// server-side (spec §3, §4.6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "upload_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UploadType {
    File,
    Archive,
}

/// The active-upload record (spec §3, §4.6). Created when an upload
/// begins, deleted on successful publish or abort. While it exists,
/// `declared_size` counts against the project's reserved quota.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Upload {
    pub id: UploadId,
    pub project_id: String,
    pub relative_path: String,
    pub upload_type: UploadType,
    pub declared_size: i64,
    pub source_checksum: Option<String>,
    pub is_resumable: bool,
    pub bytes_received: i64,
}

use serde::{Deserialize, Serialize};

/// Persistent mapping `absolute_path -> (checksum, catalogue identifier)`
/// for every stored file (spec §3, C4). Exactly one record exists iff the
/// file exists on disk after publication.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FileRecord {
    pub path: String,
    pub checksum: String,
    pub identifier: String,
}

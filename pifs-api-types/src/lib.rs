//! Data model and error taxonomy shared by every PIFS crate.
//!
//! Mirrors the role `pbs-api-types` plays in the teacher workspace: a
//! dependency-light crate of plain record types and API schemas that both
//! the storage layer and the HTTP layer can depend on without pulling in
//! each other.

mod error;
mod principal;
mod project;
mod upload;
mod file_record;
mod task;
mod token;
mod dataset;

pub use error::{ApiError, ConflictKind};
pub use principal::Principal;
pub use project::{Project, ProjectId};
pub use upload::{Upload, UploadId, UploadType};
pub use file_record::FileRecord;
pub use task::{Task, TaskError, TaskId, TaskStatus};
pub use token::{Token, TokenId};
pub use dataset::{DatasetInfo, PreservationState};

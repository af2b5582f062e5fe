//! Project tree layout and the file-level mechanics that sit underneath
//! it: path sanitisation, checksumming, quota arithmetic and archive
//! extraction. Nothing in this crate talks to a database or the network;
//! it only ever touches `project_root` and the bytes handed to it, the
//! same separation the teacher workspace draws between low-level storage
//! access and the higher `server`/`api2` layers.

pub mod archive;
pub mod checksum;
pub mod path;
pub mod quota;

pub use archive::{extract_archive, ArchiveError, ArchiveFormat, ExtractedEntry};
pub use checksum::{verify_checksum, Checksum, ChecksumAlgorithm, ChecksumError};
pub use path::{resolve, PathError};
pub use quota::admit;

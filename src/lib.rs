//! Pre-Ingest File Storage: a multi-tenant HTTP service that accepts,
//! stores and tracks user files destined for later ingestion into a
//! downstream digital-preservation catalogue.
//!
//! `server` holds the stateful pieces (locking, tasks, the upload state
//! machine, auth); `api2` is the HTTP surface built on top of it. Path
//! sanitisation, checksums and archive extraction live in the
//! `pifs-store` crate; the catalogue client and dataset guard live in
//! `pifs-client`.

pub mod api2;
pub mod server;

pub use server::AppState;

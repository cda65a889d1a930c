//! Metadata Module
//!
//! The file record exchanged with the external metadata store, and the narrow
//! store contract the engine depends on.
//!
//! ## Status Lifecycle
//! ```text
//!   Initiated ──► Partial ──► Committed
//!       │            │
//!       └────────────┴──────► Failed
//! ```
//! `Committed` and `Failed` are terminal.

mod journal;
mod memory;

pub use journal::{JournalMetadataStore, ReplayStats};
pub use memory::InMemoryMetadataStore;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::checksum::DigestAlgorithm;
use crate::error::Result;

/// Upload status of a logical file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileStatus {
    /// Multipart upload prepared, no partition received yet
    Initiated,
    /// At least one partition received
    Partial,
    /// Artifact stored and checksum verified
    Committed,
    /// Upload attempt rejected; the client must start over
    Failed,
}

impl FileStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Committed | FileStatus::Failed)
    }

    /// Whether moving from `self` to `next` respects the forward-only lifecycle
    ///
    /// Repeating a non-terminal status is allowed (idempotent partition writes).
    pub fn can_transition_to(&self, next: FileStatus) -> bool {
        use FileStatus::*;
        match (self, next) {
            (Initiated, Initiated) | (Partial, Partial) => true,
            (Initiated, Partial) => true,
            (Initiated, Committed) | (Partial, Committed) => true,
            (Initiated, Failed) | (Partial, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileStatus::Initiated => "INITIATED",
            FileStatus::Partial => "PARTIAL",
            FileStatus::Committed => "COMMITTED",
            FileStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// One record per logical file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Assigned by the metadata store on first persistence
    pub id: Option<u64>,
    /// Logical file name (artifact and container key)
    pub name: String,
    /// Total byte length (declared until merged)
    pub size: u64,
    /// Lowercase hex digest (declared until merged)
    pub checksum: String,
    /// Algorithm the checksum was computed with
    pub algorithm: DigestAlgorithm,
    pub status: FileStatus,
    /// Expected partition count, multipart uploads only
    pub partition_count: Option<u32>,
}

impl FileMetadata {
    /// Record for a file stored in one stream
    pub fn committed(name: &str, size: u64, checksum: String, algorithm: DigestAlgorithm) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            size,
            checksum,
            algorithm,
            status: FileStatus::Committed,
            partition_count: None,
        }
    }

    /// Record for a freshly prepared multipart upload
    pub fn initiated(
        name: &str,
        partition_count: u32,
        declared_size: u64,
        declared_checksum: String,
        algorithm: DigestAlgorithm,
    ) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            size: declared_size,
            checksum: declared_checksum,
            algorithm,
            status: FileStatus::Initiated,
            partition_count: Some(partition_count),
        }
    }

    pub fn is_multipart(&self) -> bool {
        self.partition_count.is_some()
    }
}

/// Contract of the external metadata store
///
/// The engine only creates, updates and looks up records by name. Any
/// schema or query language behind it belongs to the implementation.
pub trait MetadataStore: Send + Sync {
    /// Persist a new record, returning it with its assigned id
    fn create(&self, record: FileMetadata) -> Result<FileMetadata>;

    /// Replace an existing record (matched by id)
    ///
    /// Fails with `NotFound` if the record has no id or the id is unknown.
    fn update(&self, record: &FileMetadata) -> Result<()>;

    /// Look up the current record for a file name
    fn find_by_name(&self, name: &str) -> Result<Option<FileMetadata>>;
}

//! Partition Module
//!
//! Containers for in-flight multipart uploads.
//!
//! ## Responsibilities
//! - Create one isolated container per upload, with a durable manifest
//! - Persist partitions under stable numeric keys, atomically and idempotently
//! - Enumerate partitions in numeric order for the merge
//!
//! ## Container Layout
//! ```text
//! uploads/{name}/
//!   ├── manifest            (CRC32-framed bincode UploadManifest)
//!   ├── 00000001.part
//!   ├── 00000002.part
//!   ├── 00000002.part.<nonce>.tmp   (upload in progress, never listed)
//!   └── rejected            (merged output that failed verification)
//! ```

mod store;

pub use store::PartitionStore;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::checksum::DigestAlgorithm;
use crate::metadata::FileStatus;

/// Durable record of a multipart upload's declared parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadManifest {
    pub file_name: String,
    /// Number of partitions the merge requires (ids `1..=partition_count`)
    pub partition_count: u32,
    pub declared_size: u64,
    /// Client-declared checksum, normalized to lowercase hex
    pub declared_checksum: String,
    /// Algorithm the declared checksum is verified with
    pub algorithm: DigestAlgorithm,
    pub status: FileStatus,
}

/// A stored partition, as seen by the merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionHandle {
    pub partition_id: u32,
    pub path: PathBuf,
    /// Size in bytes when listed
    pub size: u64,
}

//! Provider Module
//!
//! The storage façade consumed by transport layers.
//!
//! ## Responsibilities
//! - Single-stream store with checksum
//! - Multipart lifecycle: prepare → partitions → merge
//! - Re-verification of stored artifacts
//! - Per-file serialization and metadata bookkeeping
//!
//! Providers are plain values built with their collaborators; there is no
//! process-wide instance.

mod local;
mod locks;

pub use local::LocalDiskStorage;
pub use locks::{ExclusiveGuard, FileLocks, SharedGuard};

use std::io::Read;

use crate::error::Result;
use crate::metadata::FileMetadata;

/// Storage operations exposed to request handlers
pub trait StorageProvider: Send + Sync {
    /// Store a complete file from one stream
    ///
    /// Returns the `Committed` record with the computed checksum.
    fn store_file(&self, name: &str, content: &mut dyn Read) -> Result<FileMetadata>;

    /// Start a multipart upload of `partition_count` partitions
    ///
    /// `size` and `checksum` are the client's declared values, verified at
    /// merge time.
    fn prepare_for_multipart_upload(
        &self,
        name: &str,
        partition_count: u32,
        size: u64,
        checksum: &str,
    ) -> Result<()>;

    /// Store (or replace) one partition, `partition_id` in `1..=partition_count`
    fn store_partition_for_file(
        &self,
        name: &str,
        partition_id: u32,
        content: &mut dyn Read,
    ) -> Result<()>;

    /// Merge all partitions and verify the result
    ///
    /// Returns the `Committed` record, or `ChecksumMismatch` / `SizeMismatch`
    /// after the upload has been recorded as `Failed`.
    fn merge_partitions_for_file(&self, name: &str) -> Result<FileMetadata>;

    /// Re-digest the stored artifact and compare with the recorded checksum
    fn is_file_valid(&self, name: &str) -> Result<bool>;

    /// Current record for `name`, if any
    fn file_metadata(&self, name: &str) -> Result<Option<FileMetadata>>;
}

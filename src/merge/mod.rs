//! Merge Module
//!
//! Reassembles a multipart upload into one artifact and verifies it.
//!
//! ## Merge Pipeline
//! ```text
//!   manifest ──► list partitions (numeric order) ──► completeness check
//!                                                         │
//!        staging/{name}.<nonce>.tmp ◄── stream-copy 1..=n ┘
//!                 │
//!                 ▼
//!           digest + size check
//!            │              │
//!        verified        mismatch
//!            │              │
//!   rename → files/{name}   rename → uploads/{name}/rejected
//!   manifest: Committed     manifest: Failed
//! ```

mod engine;
mod reader;

pub use engine::MergeEngine;
pub use reader::PartitionReader;

use std::path::PathBuf;

use crate::checksum::DigestAlgorithm;
use crate::error::VaultError;
use crate::metadata::FileStatus;

/// Outcome of comparing merged output with the declared values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeVerdict {
    Verified,
    SizeMismatch { expected: u64, actual: u64 },
    ChecksumMismatch { expected: String, actual: String },
}

impl MergeVerdict {
    pub fn is_verified(&self) -> bool {
        matches!(self, MergeVerdict::Verified)
    }

    /// The error a rejected merge reports to callers
    pub fn to_error(&self) -> Option<VaultError> {
        match self {
            MergeVerdict::Verified => None,
            MergeVerdict::SizeMismatch { expected, actual } => Some(VaultError::SizeMismatch {
                expected: *expected,
                actual: *actual,
            }),
            MergeVerdict::ChecksumMismatch { expected, actual } => {
                Some(VaultError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual: actual.clone(),
                })
            }
        }
    }
}

/// The single file produced by a merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedArtifact {
    pub file_name: String,
    /// Final artifact path when verified, retained rejected file otherwise
    pub path: PathBuf,
    pub size: u64,
    /// Digest computed over the merged bytes
    pub checksum: String,
    pub algorithm: DigestAlgorithm,
    pub partition_count: u32,
    /// `Committed` when verified, `Failed` otherwise
    pub status: FileStatus,
    pub verdict: MergeVerdict,
}

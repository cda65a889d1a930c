//! Merge Engine
//!
//! Concatenates a complete set of partitions into a staged file, verifies
//! it, and publishes or rejects it.

use std::sync::Arc;

use crate::checksum::ChecksumEngine;
use crate::config::SyncStrategy;
use crate::durable;
use crate::error::{Result, VaultError};
use crate::layout::StorageLayout;
use crate::metadata::FileStatus;
use crate::partition::{PartitionHandle, PartitionStore, UploadManifest};

use super::{MergeVerdict, MergedArtifact, PartitionReader};

/// Produces verified artifacts from partition containers
///
/// The caller must hold the file's exclusive lock for the whole merge; the
/// engine itself takes no locks.
pub struct MergeEngine {
    partitions: Arc<PartitionStore>,
    layout: StorageLayout,
    checksum: ChecksumEngine,
    sync_strategy: SyncStrategy,
}

impl MergeEngine {
    pub fn new(
        partitions: Arc<PartitionStore>,
        layout: StorageLayout,
        checksum: ChecksumEngine,
        sync_strategy: SyncStrategy,
    ) -> Self {
        Self {
            partitions,
            layout,
            checksum,
            sync_strategy,
        }
    }

    /// Merge all partitions of `file_name`
    ///
    /// Returns `Ok` for both verified and rejected merges; inspect
    /// `MergedArtifact::verdict`. Errors mean nothing was published and the
    /// manifest status is unchanged:
    /// - `NotFound`: the upload was never prepared
    /// - `InvalidState`: the upload already finished
    /// - `IncompletePartitions`: some declared partition is missing
    pub fn merge(&self, file_name: &str) -> Result<MergedArtifact> {
        let manifest = self.partitions.load_manifest(file_name)?;
        if manifest.status.is_terminal() {
            return Err(VaultError::InvalidState(format!(
                "upload for {} is already {}",
                file_name, manifest.status
            )));
        }

        let partitions = self.partitions.list_partitions(file_name)?;
        Self::check_complete(&manifest, &partitions)?;

        // Step 1: Concatenate into staging (removed again on failure)
        let staging_path = self.layout.staging_path();
        let mut reader = PartitionReader::new(partitions);
        durable::stream_to_temp(
            &mut reader,
            &staging_path,
            self.checksum.buffer_size(),
            self.sync_strategy,
        )?;

        // Step 2: Digest the staged bytes with the upload's algorithm
        let digest = match self
            .checksum
            .with_algorithm(manifest.algorithm)
            .digest_file(&staging_path)
        {
            Ok(digest) => digest,
            Err(e) => {
                durable::remove_if_exists(&staging_path)?;
                return Err(e);
            }
        };

        // Step 3: Compare with the declared values (checksum decides first)
        let verdict = if !digest.matches(&manifest.declared_checksum) {
            MergeVerdict::ChecksumMismatch {
                expected: manifest.declared_checksum.clone(),
                actual: digest.hex.clone(),
            }
        } else if digest.bytes_read != manifest.declared_size {
            MergeVerdict::SizeMismatch {
                expected: manifest.declared_size,
                actual: digest.bytes_read,
            }
        } else {
            MergeVerdict::Verified
        };

        // Step 4: Publish or retain for diagnosis
        let (path, status) = if verdict.is_verified() {
            let dest = self.layout.artifact_path(file_name);
            durable::publish(&staging_path, &dest, self.sync_strategy)?;
            (dest, FileStatus::Committed)
        } else {
            let dest = self.layout.rejected_path(file_name);
            durable::publish(&staging_path, &dest, self.sync_strategy)?;
            tracing::warn!(
                file = %file_name,
                verdict = ?verdict,
                retained = %dest.display(),
                "Merged artifact failed verification"
            );
            (dest, FileStatus::Failed)
        };

        self.partitions.set_status(file_name, status)?;

        tracing::info!(
            file = %file_name,
            partitions = manifest.partition_count,
            bytes = digest.bytes_read,
            status = %status,
            "Merge finished"
        );

        Ok(MergedArtifact {
            file_name: file_name.to_string(),
            path,
            size: digest.bytes_read,
            checksum: digest.hex,
            algorithm: manifest.algorithm,
            partition_count: manifest.partition_count,
            status,
            verdict,
        })
    }

    /// Every id in `1..=partition_count` must be present exactly once
    fn check_complete(manifest: &UploadManifest, partitions: &[PartitionHandle]) -> Result<()> {
        let found = partitions.len() as u32;
        let contiguous = partitions
            .iter()
            .zip(1..=manifest.partition_count)
            .all(|(p, expected)| p.partition_id == expected);

        if found != manifest.partition_count || !contiguous {
            return Err(VaultError::IncompletePartitions {
                expected: manifest.partition_count,
                found,
            });
        }
        Ok(())
    }
}

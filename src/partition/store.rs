//! Partition Store
//!
//! Writes partitions into per-upload containers and lists them back in
//! numeric order.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use crate::checksum::{normalize_hex, DigestAlgorithm};
use crate::config::SyncStrategy;
use crate::durable;
use crate::error::{Result, VaultError};
use crate::layout::{self, StorageLayout, PARTITION_EXT};
use crate::metadata::FileStatus;
use crate::record;

use super::{PartitionHandle, UploadManifest};

/// Manages upload containers under `{root}/uploads`
///
/// ## Concurrency:
/// - Holds no locks; callers serialize prepare/merge per file name
/// - `store_partition` calls for different ids touch different files and
///   may run in parallel; the same id is last-rename-wins
pub struct PartitionStore {
    layout: StorageLayout,
    buffer_size: usize,
    sync_strategy: SyncStrategy,
}

impl PartitionStore {
    pub fn new(layout: StorageLayout, buffer_size: usize, sync_strategy: SyncStrategy) -> Self {
        Self {
            layout,
            buffer_size: buffer_size.max(1),
            sync_strategy,
        }
    }

    /// Create the container and manifest for a new upload
    ///
    /// Fails with `AlreadyExists` while a previous upload of the same name is
    /// still in progress. A terminal upload's container (kept for audit) is
    /// replaced.
    pub fn prepare(
        &self,
        file_name: &str,
        partition_count: u32,
        declared_size: u64,
        declared_checksum: &str,
        algorithm: DigestAlgorithm,
    ) -> Result<UploadManifest> {
        if partition_count == 0 {
            return Err(VaultError::InvalidArgument(
                "partition count must be positive".to_string(),
            ));
        }

        let container = self.layout.container_path(file_name);
        if container.exists() {
            match self.load_manifest(file_name) {
                Ok(existing) if !existing.status.is_terminal() => {
                    return Err(VaultError::AlreadyExists(format!(
                        "upload for {} is already in progress ({})",
                        file_name, existing.status
                    )));
                }
                Ok(existing) => {
                    tracing::debug!(
                        file = %file_name,
                        previous = %existing.status,
                        "Replacing container of finished upload"
                    );
                }
                Err(e) => {
                    // Container without a readable manifest: prepare never finished
                    tracing::warn!(file = %file_name, "Discarding unusable container: {}", e);
                }
            }
            fs::remove_dir_all(&container)?;
        }

        fs::create_dir_all(&container)?;

        let manifest = UploadManifest {
            file_name: file_name.to_string(),
            partition_count,
            declared_size,
            declared_checksum: normalize_hex(declared_checksum),
            algorithm,
            status: FileStatus::Initiated,
        };
        self.write_manifest(&manifest)?;

        Ok(manifest)
    }

    /// Read a container's manifest
    pub fn load_manifest(&self, file_name: &str) -> Result<UploadManifest> {
        let path = self.layout.manifest_path(file_name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VaultError::NotFound(format!(
                    "no multipart upload for {}",
                    file_name
                )));
            }
            Err(e) => return Err(e.into()),
        };

        record::decode(&bytes).map_err(|e| match e {
            VaultError::Corruption(reason) => {
                VaultError::Corruption(format!("manifest of {}: {}", file_name, reason))
            }
            other => other,
        })
    }

    /// Move a container's manifest to a new status
    ///
    /// Returns whether the status changed; repeating the current status is a
    /// no-op. Fails with `InvalidState` if the lifecycle does not allow the
    /// move.
    pub fn set_status(&self, file_name: &str, status: FileStatus) -> Result<bool> {
        let mut manifest = self.load_manifest(file_name)?;

        if manifest.status == status {
            return Ok(false);
        }
        if !manifest.status.can_transition_to(status) {
            return Err(VaultError::InvalidState(format!(
                "{} cannot move from {} to {}",
                file_name, manifest.status, status
            )));
        }

        manifest.status = status;
        self.write_manifest(&manifest)?;
        Ok(true)
    }

    /// Persist one partition's bytes
    ///
    /// The stream is written to a temporary inside the container and renamed
    /// to `{partition_id:08}.part` only once complete, so a failed or aborted
    /// stream never produces a listable partition. Storing an id again
    /// replaces its previous content. Returns the bytes written.
    pub fn store_partition<R: Read + ?Sized>(
        &self,
        file_name: &str,
        partition_id: u32,
        reader: &mut R,
    ) -> Result<u64> {
        let manifest = self.load_manifest(file_name)?;

        if manifest.status.is_terminal() {
            return Err(VaultError::InvalidState(format!(
                "upload for {} is {}",
                file_name, manifest.status
            )));
        }
        if partition_id == 0 || partition_id > manifest.partition_count {
            return Err(VaultError::InvalidArgument(format!(
                "partition id {} outside 1..={}",
                partition_id, manifest.partition_count
            )));
        }

        let temp_path = self.layout.partition_temp_path(file_name, partition_id);
        let dest = self.layout.partition_path(file_name, partition_id);

        let written =
            durable::stream_to_temp(reader, &temp_path, self.buffer_size, self.sync_strategy)?;
        durable::publish(&temp_path, &dest, self.sync_strategy)?;

        tracing::debug!(
            file = %file_name,
            partition = partition_id,
            bytes = written,
            "Partition stored"
        );

        Ok(written)
    }

    /// List stored partitions in ascending numeric id order
    ///
    /// Temporaries, the manifest and anything not named `{digits}.part` are
    /// ignored.
    pub fn list_partitions(&self, file_name: &str) -> Result<Vec<PartitionHandle>> {
        let container = self.layout.container_path(file_name);
        if !container.is_dir() {
            return Err(VaultError::NotFound(format!(
                "no multipart upload for {}",
                file_name
            )));
        }

        let mut partitions = Vec::new();
        for entry in fs::read_dir(&container)? {
            let entry = entry?;
            let path = entry.path();

            if layout::is_temporary(&path) {
                continue;
            }
            let Some(partition_id) = Self::parse_partition_id(&path) else {
                continue;
            };

            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }

            partitions.push(PartitionHandle {
                partition_id,
                path,
                size: metadata.len(),
            });
        }

        partitions.sort_by_key(|p| p.partition_id);
        Ok(partitions)
    }

    /// Whether a container exists for `file_name`
    pub fn has_container(&self, file_name: &str) -> bool {
        self.layout.container_path(file_name).is_dir()
    }

    /// Delete a container with everything in it
    pub fn remove_container(&self, file_name: &str) -> Result<()> {
        match fs::remove_dir_all(self.layout.container_path(file_name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn write_manifest(&self, manifest: &UploadManifest) -> Result<()> {
        let bytes = record::encode(manifest)?;
        let temp_path = self.layout.manifest_temp_path(&manifest.file_name);
        let path = self.layout.manifest_path(&manifest.file_name);
        durable::write_bytes_atomically(&bytes, &temp_path, &path, self.sync_strategy)
    }

    /// Parse partition id from filename
    /// "00000042.part" → Some(42)
    fn parse_partition_id(path: &Path) -> Option<u32> {
        if path.extension()?.to_str()? != PARTITION_EXT {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        stem.parse().ok()
    }
}

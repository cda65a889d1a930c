//! Local disk storage provider
//!
//! Stores artifacts and upload containers under one directory tree and keeps
//! the injected metadata store in step with every lifecycle change.

use std::io::Read;
use std::sync::Arc;

use crate::checksum::{ChecksumEngine, DigestAlgorithm};
use crate::config::Config;
use crate::durable;
use crate::error::{Result, VaultError};
use crate::layout::{validate_name, StorageLayout};
use crate::merge::MergeEngine;
use crate::metadata::{FileMetadata, FileStatus, MetadataStore};
use crate::partition::PartitionStore;

use super::{FileLocks, StorageProvider};

/// Storage provider backed by the local filesystem
///
/// ## Concurrency Model: per-file reader/writer locks
///
/// - **Exclusive** (prepare, merge, store_file, abort, cleanup): one at a
///   time per file name, never overlapping partition writes of that name
/// - **Shared** (partition writes, validity checks): any number in parallel
/// - Different file names never contend
pub struct LocalDiskStorage {
    config: Config,
    layout: StorageLayout,
    checksum: ChecksumEngine,
    partitions: Arc<PartitionStore>,
    merger: MergeEngine,
    metadata: Arc<dyn MetadataStore>,
    locks: FileLocks,
}

impl LocalDiskStorage {
    /// Open or create a storage root
    ///
    /// On startup:
    /// 1. Create the directory tree
    /// 2. Remove temporaries orphaned by a previous crash
    pub fn open(config: Config, metadata: Arc<dyn MetadataStore>) -> Result<Self> {
        let layout = StorageLayout::new(&config.storage_root);
        layout.create_dirs()?;

        let swept = layout.sweep_temporaries()?;
        if swept > 0 {
            tracing::info!(
                root = %layout.root().display(),
                removed = swept,
                "Removed orphaned temporaries"
            );
        }

        let checksum =
            ChecksumEngine::new(config.digest_algorithm).with_buffer_size(config.buffer_size);
        let partitions = Arc::new(PartitionStore::new(
            layout.clone(),
            config.buffer_size,
            config.sync_strategy,
        ));
        let merger = MergeEngine::new(
            Arc::clone(&partitions),
            layout.clone(),
            checksum,
            config.sync_strategy,
        );

        tracing::debug!(
            root = %layout.root().display(),
            algorithm = %config.digest_algorithm,
            "Storage opened"
        );

        Ok(Self {
            config,
            layout,
            checksum,
            partitions,
            merger,
            metadata,
            locks: FileLocks::new(),
        })
    }

    /// Start a multipart upload whose checksum uses a specific algorithm
    ///
    /// For clients that declare e.g. MD5 checksums while new uploads default
    /// to the configured algorithm.
    pub fn prepare_for_multipart_upload_with(
        &self,
        name: &str,
        partition_count: u32,
        size: u64,
        checksum: &str,
        algorithm: DigestAlgorithm,
    ) -> Result<()> {
        validate_name(name)?;
        if partition_count == 0 {
            return Err(VaultError::InvalidArgument(
                "partition count must be positive".to_string(),
            ));
        }
        if checksum.trim().is_empty() {
            return Err(VaultError::InvalidArgument(
                "declared checksum must not be empty".to_string(),
            ));
        }

        self.with_exclusive(name, || {
            let manifest = self
                .partitions
                .prepare(name, partition_count, size, checksum, algorithm)?;

            self.persist(FileMetadata::initiated(
                name,
                manifest.partition_count,
                manifest.declared_size,
                manifest.declared_checksum,
                manifest.algorithm,
            ))?;

            tracing::info!(
                file = %name,
                partitions = partition_count,
                declared_size = size,
                algorithm = %algorithm,
                "Multipart upload initiated"
            );
            Ok(())
        })
    }

    /// Abandon an in-progress upload
    ///
    /// Marks it `Failed` and deletes its container. Fails with `NotFound` if
    /// it was never prepared and `InvalidState` if it already finished.
    pub fn abort_multipart_upload(&self, name: &str) -> Result<FileMetadata> {
        validate_name(name)?;
        self.with_exclusive(name, || {
            let manifest = self.partitions.load_manifest(name)?;
            if manifest.status.is_terminal() {
                return Err(VaultError::InvalidState(format!(
                    "upload for {} is already {}",
                    name, manifest.status
                )));
            }

            self.partitions.set_status(name, FileStatus::Failed)?;
            self.partitions.remove_container(name)?;

            let record = self.set_record_status(name, FileStatus::Failed)?;
            tracing::info!(file = %name, "Multipart upload aborted");
            Ok(record)
        })
    }

    /// Delete the partitions retained after an upload finished
    ///
    /// Only terminal uploads can be cleaned up; the committed artifact is not
    /// touched.
    pub fn cleanup_upload(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.with_exclusive(name, || {
            let manifest = self.partitions.load_manifest(name)?;
            if !manifest.status.is_terminal() {
                return Err(VaultError::InvalidState(format!(
                    "upload for {} is still {}",
                    name, manifest.status
                )));
            }

            self.partitions.remove_container(name)?;
            tracing::debug!(file = %name, "Upload container removed");
            Ok(())
        })
    }

    /// Ids of the partitions stored so far, ascending
    pub fn received_partitions(&self, name: &str) -> Result<Vec<u32>> {
        validate_name(name)?;
        self.with_shared(name, || {
            Ok(self
                .partitions
                .list_partitions(name)?
                .into_iter()
                .map(|p| p.partition_id)
                .collect())
        })
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Number of file names with a live lock entry
    pub fn tracked_locks(&self) -> usize {
        self.locks.len()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Run `f` under the exclusive lock of `name`, then drop idle lock entries
    fn with_exclusive<T>(&self, name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let guard = self.locks.exclusive(name);
        let result = f();
        drop(guard);
        self.locks.prune_idle();
        result
    }

    /// Run `f` under the shared lock of `name`, then drop idle lock entries
    fn with_shared<T>(&self, name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let guard = self.locks.shared(name);
        let result = f();
        drop(guard);
        self.locks.prune_idle();
        result
    }

    /// Create the record, or replace the existing one for the same name
    fn persist(&self, mut record: FileMetadata) -> Result<FileMetadata> {
        match self.metadata.find_by_name(&record.name)? {
            Some(existing) => {
                record.id = existing.id;
                self.metadata.update(&record)?;
                Ok(record)
            }
            None => self.metadata.create(record),
        }
    }

    /// Move an existing record to `status`
    fn set_record_status(&self, name: &str, status: FileStatus) -> Result<FileMetadata> {
        let mut record = self
            .metadata
            .find_by_name(name)?
            .ok_or_else(|| VaultError::NotFound(format!("no metadata record for {}", name)))?;

        if record.status != status {
            if !record.status.can_transition_to(status) {
                return Err(VaultError::InvalidState(format!(
                    "{} cannot move from {} to {}",
                    name, record.status, status
                )));
            }
            record.status = status;
            self.metadata.update(&record)?;
        }
        Ok(record)
    }
}

impl StorageProvider for LocalDiskStorage {
    fn store_file(&self, name: &str, content: &mut dyn Read) -> Result<FileMetadata> {
        validate_name(name)?;
        self.with_exclusive(name, || self.store_single(name, content))
    }

    fn prepare_for_multipart_upload(
        &self,
        name: &str,
        partition_count: u32,
        size: u64,
        checksum: &str,
    ) -> Result<()> {
        self.prepare_for_multipart_upload_with(
            name,
            partition_count,
            size,
            checksum,
            self.config.digest_algorithm,
        )
    }

    fn store_partition_for_file(
        &self,
        name: &str,
        partition_id: u32,
        content: &mut dyn Read,
    ) -> Result<()> {
        validate_name(name)?;
        self.with_shared(name, || {
            self.partitions.store_partition(name, partition_id, content)?;

            if self.partitions.set_status(name, FileStatus::Partial)? {
                self.set_record_status(name, FileStatus::Partial)?;
                tracing::info!(file = %name, "First partition received");
            }
            Ok(())
        })
    }

    fn merge_partitions_for_file(&self, name: &str) -> Result<FileMetadata> {
        validate_name(name)?;
        self.with_exclusive(name, || {
            let artifact = self.merger.merge(name)?;

            let record = self.persist(FileMetadata {
                id: None,
                name: name.to_string(),
                size: artifact.size,
                checksum: artifact.checksum.clone(),
                algorithm: artifact.algorithm,
                status: artifact.status,
                partition_count: Some(artifact.partition_count),
            })?;

            match artifact.verdict.to_error() {
                Some(err) => Err(err),
                None => Ok(record),
            }
        })
    }

    fn is_file_valid(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        self.with_shared(name, || self.verify_artifact(name))
    }

    fn file_metadata(&self, name: &str) -> Result<Option<FileMetadata>> {
        validate_name(name)?;
        self.metadata.find_by_name(name)
    }
}

impl LocalDiskStorage {
    /// Body of `store_file`; the caller holds the exclusive lock
    fn store_single(&self, name: &str, content: &mut dyn Read) -> Result<FileMetadata> {
        match self.partitions.load_manifest(name) {
            Ok(manifest) if !manifest.status.is_terminal() => {
                return Err(VaultError::AlreadyExists(format!(
                    "multipart upload for {} is in progress",
                    name
                )));
            }
            Ok(_) | Err(VaultError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        // Step 1: Stream into staging
        let staging_path = self.layout.staging_path();
        let written = durable::stream_to_temp(
            content,
            &staging_path,
            self.config.buffer_size,
            self.config.sync_strategy,
        )?;

        // Step 2: Digest what actually landed on disk
        let digest = match self.checksum.digest_file(&staging_path) {
            Ok(digest) => digest,
            Err(e) => {
                durable::remove_if_exists(&staging_path)?;
                return Err(e);
            }
        };

        // Step 3: Publish under the final name
        let dest = self.layout.artifact_path(name);
        durable::publish(&staging_path, &dest, self.config.sync_strategy)?;

        let record = self.persist(FileMetadata::committed(
            name,
            digest.bytes_read,
            digest.hex,
            digest.algorithm,
        ))?;

        tracing::info!(
            file = %name,
            bytes = written,
            checksum = %record.checksum,
            "File stored"
        );

        Ok(record)
    }

    /// Body of `is_file_valid`; the caller holds the shared lock
    fn verify_artifact(&self, name: &str) -> Result<bool> {
        let record = self
            .metadata
            .find_by_name(name)?
            .ok_or_else(|| VaultError::NotFound(format!("no metadata record for {}", name)))?;

        if record.status != FileStatus::Committed {
            return Ok(false);
        }

        let path = self.layout.artifact_path(name);
        if !path.is_file() {
            tracing::warn!(file = %name, "Committed artifact is missing");
            return Ok(false);
        }

        let digest = self
            .checksum
            .with_algorithm(record.algorithm)
            .digest_file(&path)?;

        let valid = digest.bytes_read == record.size && digest.matches(&record.checksum);
        if !valid {
            tracing::warn!(
                file = %name,
                recorded = %record.checksum,
                actual = %digest.hex,
                "Stored artifact no longer matches its checksum"
            );
        }
        Ok(valid)
    }
}

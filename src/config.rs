//! Configuration for FileVault
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::checksum::DigestAlgorithm;
use crate::error::{Result, VaultError};

/// Environment variable naming the storage root
pub const STORAGE_PATH_ENV: &str = "DATA_STORAGE_PATH";

/// Environment variable naming the digest algorithm (md5, sha256, sha512)
pub const DIGEST_ENV: &str = "FILEVAULT_DIGEST";

/// Environment variable overriding the streaming buffer size (bytes)
pub const BUFFER_SIZE_ENV: &str = "FILEVAULT_BUFFER_SIZE";

/// Main configuration for a FileVault instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files (artifacts, uploads, staging)
    /// Internal structure:
    ///   {storage_root}/
    ///     ├── files/       (committed artifacts)
    ///     ├── uploads/     (one container per in-flight multipart upload)
    ///     └── staging/     (temporaries renamed into place when complete)
    pub storage_root: PathBuf,

    /// Sync strategy: whether completed writes are fsynced before publish
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Checksum Configuration
    // -------------------------------------------------------------------------
    /// Algorithm used for new checksums
    pub digest_algorithm: DigestAlgorithm,

    /// Chunk size for streaming reads and writes (in bytes)
    pub buffer_size: usize,
}

/// Durability strategy for completed files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync every partition, artifact and manifest before it is renamed into place
    EveryWrite,

    /// Leave flushing to the OS page cache (faster, loses data on power failure)
    OsManaged,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./filevault_data"),
            sync_strategy: SyncStrategy::EveryWrite,
            digest_algorithm: DigestAlgorithm::Sha256,
            buffer_size: 64 * 1024, // 64 KB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Build a config from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup
    ///
    /// When `DATA_STORAGE_PATH` is unset the storage root falls back to
    /// `{temp_dir}/filevault` and a warning is logged. That directory is not
    /// suitable for production data.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Config::builder();

        match lookup(STORAGE_PATH_ENV).filter(|v| !v.trim().is_empty()) {
            Some(path) => builder = builder.storage_root(path),
            None => {
                let fallback = std::env::temp_dir().join("filevault");
                tracing::warn!(
                    fallback = %fallback.display(),
                    "{} is not set; storing files under the system temporary directory",
                    STORAGE_PATH_ENV
                );
                builder = builder.storage_root(fallback);
            }
        }

        if let Some(name) = lookup(DIGEST_ENV) {
            builder = builder.digest_algorithm(name.parse()?);
        }

        if let Some(raw) = lookup(BUFFER_SIZE_ENV) {
            let size: usize = raw.trim().parse().map_err(|_| {
                VaultError::Config(format!("{} must be a byte count, got {:?}", BUFFER_SIZE_ENV, raw))
            })?;
            if size == 0 {
                return Err(VaultError::Config(format!("{} must be positive", BUFFER_SIZE_ENV)));
            }
            builder = builder.buffer_size(size);
        }

        Ok(builder.build())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the storage root directory
    pub fn storage_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage_root = path.into();
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the digest algorithm for new checksums
    pub fn digest_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.config.digest_algorithm = algorithm;
        self
    }

    /// Set the streaming buffer size (in bytes, clamped to at least 1)
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size.max(1);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

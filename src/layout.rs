//! Storage Layout
//!
//! Derives every on-disk path from the storage root.
//!
//! ```text
//! {root}/
//!   files/{name}                  committed artifacts
//!   uploads/{name}/manifest       upload manifest
//!   uploads/{name}/00000001.part  partitions (zero-padded numeric id)
//!   uploads/{name}/rejected       merged output that failed verification
//!   staging/                      in-flight temporaries
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, VaultError};

/// Suffix shared by every temporary file
pub(crate) const TEMP_SUFFIX: &str = ".tmp";

/// Extension of a stored partition
pub(crate) const PARTITION_EXT: &str = "part";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Paths for one storage root
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const FILES_DIR: &'static str = "files";
    const UPLOADS_DIR: &'static str = "uploads";
    const STAGING_DIR: &'static str = "staging";
    const MANIFEST_FILENAME: &'static str = "manifest";
    const REJECTED_FILENAME: &'static str = "rejected";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root and its fixed subdirectories
    pub fn create_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.files_dir())?;
        fs::create_dir_all(self.uploads_dir())?;
        fs::create_dir_all(self.staging_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files_dir(&self) -> PathBuf {
        self.root.join(Self::FILES_DIR)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join(Self::UPLOADS_DIR)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(Self::STAGING_DIR)
    }

    /// Final location of a committed file
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.files_dir().join(name)
    }

    /// Container directory of a multipart upload
    pub fn container_path(&self, name: &str) -> PathBuf {
        self.uploads_dir().join(name)
    }

    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.container_path(name).join(Self::MANIFEST_FILENAME)
    }

    /// Stable key for a partition: "00000007.part"
    pub fn partition_path(&self, name: &str, partition_id: u32) -> PathBuf {
        self.container_path(name)
            .join(format!("{:08}.{}", partition_id, PARTITION_EXT))
    }

    /// Unique temporary for a partition upload, inside its container
    pub fn partition_temp_path(&self, name: &str, partition_id: u32) -> PathBuf {
        self.container_path(name).join(format!(
            "{:08}.{}.{}{}",
            partition_id,
            PARTITION_EXT,
            next_nonce(),
            TEMP_SUFFIX
        ))
    }

    /// Unique temporary for a manifest rewrite, inside its container
    pub fn manifest_temp_path(&self, name: &str) -> PathBuf {
        self.container_path(name).join(format!(
            "{}.{}{}",
            Self::MANIFEST_FILENAME,
            next_nonce(),
            TEMP_SUFFIX
        ))
    }

    /// Where merged output that failed verification is retained
    pub fn rejected_path(&self, name: &str) -> PathBuf {
        self.container_path(name).join(Self::REJECTED_FILENAME)
    }

    /// Unique staging file for an artifact being written
    ///
    /// Named by nonce only, so any name valid under `files/` fits.
    pub fn staging_path(&self) -> PathBuf {
        self.staging_dir()
            .join(format!("{}{}", next_nonce(), TEMP_SUFFIX))
    }

    /// Remove temporaries orphaned by a crash or an aborted stream
    ///
    /// Clears the staging directory and every `*.tmp` entry inside upload
    /// containers. Returns the number of files removed.
    pub fn sweep_temporaries(&self) -> Result<usize> {
        let mut removed = 0;

        let staging = self.staging_dir();
        if staging.is_dir() {
            for entry in fs::read_dir(&staging)? {
                let path = entry?.path();
                if path.is_file() {
                    fs::remove_file(&path)?;
                    removed += 1;
                }
            }
        }

        let uploads = self.uploads_dir();
        if uploads.is_dir() {
            for container in fs::read_dir(&uploads)? {
                let container = container?.path();
                if !container.is_dir() {
                    continue;
                }
                for entry in fs::read_dir(&container)? {
                    let path = entry?.path();
                    if is_temporary(&path) {
                        fs::remove_file(&path)?;
                        removed += 1;
                    }
                }
            }
        }

        Ok(removed)
    }
}

/// Check that a file name is usable as a single path component
///
/// Rejects empty names, separators, "." / ".." and NUL bytes.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(VaultError::InvalidArgument(
            "file name must not be empty".to_string(),
        ));
    }
    if name == "." || name == ".." {
        return Err(VaultError::InvalidArgument(format!(
            "file name {:?} is reserved",
            name
        )));
    }
    if name.contains(&['/', '\\', '\0'][..]) {
        return Err(VaultError::InvalidArgument(format!(
            "file name {:?} must not contain path separators",
            name
        )));
    }
    Ok(())
}

pub(crate) fn is_temporary(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().ends_with(TEMP_SUFFIX))
        .unwrap_or(false)
}

fn next_nonce() -> String {
    format!(
        "{}-{}",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

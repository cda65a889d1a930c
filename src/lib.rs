//! # FileVault
//!
//! A durable file storage engine with:
//! - Single-stream uploads with checksum computation
//! - Multi-partition uploads merged server-side in numeric order
//! - Atomic publish (temp file + rename) for every stored object
//! - Checksum verification at merge time and on demand
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Transport / Request Handlers                  │
//! │                     (not part of this crate)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   Storage Provider                           │
//! │          (per-file RwLock, metadata bookkeeping)             │
//! └──────┬──────────────────────┬──────────────────────┬────────┘
//!        │                      │                      │
//!        ▼                      ▼                      ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌──────────────┐
//!  │  Partition  │──────►│    Merge    │       │   Metadata   │
//!  │    Store    │       │   Engine    │       │    Store     │
//!  └─────────────┘       └──────┬──────┘       └──────────────┘
//!                               │
//!                               ▼
//!                        ┌─────────────┐
//!                        │  Checksum   │
//!                        │   Engine    │
//!                        └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod checksum;
pub mod layout;
pub mod metadata;
pub mod partition;
pub mod merge;
pub mod provider;

mod durable;
mod record;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{VaultError, Result};
pub use config::{Config, SyncStrategy};
pub use checksum::{ChecksumEngine, DigestAlgorithm, DigestResult};
pub use metadata::{FileMetadata, FileStatus, MetadataStore};
pub use provider::{LocalDiskStorage, StorageProvider};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of FileVault
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Checksum Module
//!
//! Streaming digest computation over arbitrary byte sources.
//!
//! ## Responsibilities
//! - Read sources in bounded chunks (never whole files in memory)
//! - Support several algorithms, selected by configuration
//! - Produce lowercase hex digests
//! - Surface every failure as an error, never as an empty digest

mod algorithm;
mod engine;

pub use algorithm::DigestAlgorithm;
pub use engine::{ChecksumEngine, DigestResult};

/// Normalize a hex checksum for comparison (trimmed, lowercase)
pub fn normalize_hex(checksum: &str) -> String {
    checksum.trim().to_ascii_lowercase()
}

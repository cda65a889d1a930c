//! Checksum Engine
//!
//! Computes digests by streaming a reader through a fixed-size buffer.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use crate::error::Result;

use super::{normalize_hex, DigestAlgorithm};

/// Outcome of a digest computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestResult {
    /// Algorithm that produced the digest
    pub algorithm: DigestAlgorithm,
    /// Lowercase hex digest
    pub hex: String,
    /// Total number of bytes hashed
    pub bytes_read: u64,
}

impl DigestResult {
    /// Compare against a hex checksum (case and surrounding whitespace ignored)
    pub fn matches(&self, expected: &str) -> bool {
        self.hex == normalize_hex(expected)
    }
}

/// Streaming digest computation
#[derive(Debug, Clone, Copy)]
pub struct ChecksumEngine {
    algorithm: DigestAlgorithm,
    buffer_size: usize,
}

impl ChecksumEngine {
    /// Default read chunk (64 KB)
    pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
        }
    }

    /// Set the read chunk size (clamped to at least 1 byte)
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Same engine, different algorithm
    pub fn with_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Digest everything the reader yields until EOF
    ///
    /// Any read error aborts the computation and is returned as-is;
    /// interrupted reads are retried.
    pub fn digest<R: Read + ?Sized>(&self, reader: &mut R) -> Result<DigestResult> {
        let mut hasher = self.algorithm.hasher();
        let mut buffer = vec![0u8; self.buffer_size];
        let mut bytes_read: u64 = 0;

        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            hasher.update(&buffer[..n]);
            bytes_read += n as u64;
        }

        Ok(DigestResult {
            algorithm: self.algorithm,
            hex: hasher.finalize_hex(),
            bytes_read,
        })
    }

    /// Digest a byte slice
    pub fn digest_bytes(&self, data: &[u8]) -> DigestResult {
        let mut hasher = self.algorithm.hasher();
        hasher.update(data);
        DigestResult {
            algorithm: self.algorithm,
            hex: hasher.finalize_hex(),
            bytes_read: data.len() as u64,
        }
    }

    /// Digest a file on disk
    pub fn digest_file(&self, path: &Path) -> Result<DigestResult> {
        let mut file = File::open(path)?;
        self.digest(&mut file)
    }

    /// Digest the reader and compare against an expected hex checksum
    pub fn verify<R: Read + ?Sized>(&self, reader: &mut R, expected: &str) -> Result<bool> {
        Ok(self.digest(reader)?.matches(expected))
    }
}

impl Default for ChecksumEngine {
    fn default() -> Self {
        Self::new(DigestAlgorithm::default())
    }
}

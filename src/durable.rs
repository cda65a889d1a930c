//! Durable file writes
//!
//! Everything the engine exposes under a stable name is first written to a
//! temporary, flushed, optionally fsynced, then renamed into place.

use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use crate::config::SyncStrategy;
use crate::error::Result;

/// Stream a reader into a fresh file at `temp_path`
///
/// Returns the number of bytes written. If the copy fails for any reason the
/// temporary is removed before the error is returned, so an aborted stream
/// never leaves a half-written file behind.
pub(crate) fn stream_to_temp<R: Read + ?Sized>(
    reader: &mut R,
    temp_path: &Path,
    buffer_size: usize,
    sync: SyncStrategy,
) -> Result<u64> {
    match write_file(reader, temp_path, buffer_size, sync) {
        Ok(n) => Ok(n),
        Err(e) => {
            remove_if_exists(temp_path)?;
            Err(e.into())
        }
    }
}

fn write_file<R: Read + ?Sized>(
    reader: &mut R,
    path: &Path,
    buffer_size: usize,
    sync: SyncStrategy,
) -> io::Result<u64> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;

    let mut writer = BufWriter::with_capacity(buffer_size, file);
    let written = io::copy(reader, &mut writer)?;
    writer.flush()?;

    let file = writer.into_inner().map_err(|e| e.into_error())?;
    if sync == SyncStrategy::EveryWrite {
        file.sync_all()?;
    }

    Ok(written)
}

/// Write a small in-memory buffer durably under `path` via `temp_path`
pub(crate) fn write_bytes_atomically(
    bytes: &[u8],
    temp_path: &Path,
    path: &Path,
    sync: SyncStrategy,
) -> Result<()> {
    let mut reader = bytes;
    stream_to_temp(&mut reader, temp_path, bytes.len().max(1), sync)?;
    publish(temp_path, path, sync)
}

/// Rename a completed temporary to its final name
///
/// The rename replaces any previous file at `dest`. With `EveryWrite` the
/// parent directory is synced so the rename itself survives a crash.
pub(crate) fn publish(temp_path: &Path, dest: &Path, sync: SyncStrategy) -> Result<()> {
    if let Err(e) = fs::rename(temp_path, dest) {
        remove_if_exists(temp_path)?;
        return Err(e.into());
    }

    if sync == SyncStrategy::EveryWrite {
        if let Some(parent) = dest.parent() {
            sync_dir(parent)?;
        }
    }

    Ok(())
}

/// Remove a file, treating "already gone" as success
pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    // Directories cannot be opened for sync on this platform
    Ok(())
}

//! Journal metadata store
//!
//! Append-only log of record versions on local disk. Every create/update
//! appends one CRC32-framed record; on open the log is replayed and the last
//! version of each id wins.
//!
//! ## Recovery
//! A crash during an append leaves a torn frame at the tail. Replay stops at
//! the first torn frame and the file is truncated back to the last complete
//! record, so later appends start from a clean boundary.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::SyncStrategy;
use crate::error::Result;
use crate::record::{self, Frame};

use super::memory::Records;
use super::{FileMetadata, MetadataStore};

/// Statistics from replaying a journal on open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Complete records applied
    pub records_replayed: u64,
    /// Bytes discarded from a torn tail
    pub bytes_truncated: u64,
}

struct Journal {
    file: File,
    records: Records,
}

/// Metadata store persisted as an append-only journal
///
/// ## Concurrency:
/// - One `Mutex` covers the file handle and the index, so the order of
///   appends matches the order of in-memory updates
pub struct JournalMetadataStore {
    path: PathBuf,
    sync_strategy: SyncStrategy,
    replay_stats: ReplayStats,
    journal: Mutex<Journal>,
}

impl JournalMetadataStore {
    /// Open or create a journal at `path`
    pub fn open(path: &Path, sync_strategy: SyncStrategy) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        let (records, replay_stats) = Self::replay(&mut file, path)?;

        // Appends go after the last good record
        file.seek(SeekFrom::End(0))?;

        Ok(Self {
            path: path.to_path_buf(),
            sync_strategy,
            replay_stats,
            journal: Mutex::new(Journal { file, records }),
        })
    }

    fn replay(file: &mut File, path: &Path) -> Result<(Records, ReplayStats)> {
        let file_len = file.metadata()?.len();
        let mut records = Records::default();
        let mut stats = ReplayStats::default();
        let mut good_offset: u64 = 0;

        {
            let mut reader = BufReader::new(&mut *file);
            loop {
                match record::read_frame::<FileMetadata, _>(&mut reader)? {
                    Frame::Record(entry, len) => {
                        records.upsert(entry);
                        stats.records_replayed += 1;
                        good_offset += len;
                    }
                    Frame::End => break,
                    Frame::Torn(reason) => {
                        tracing::warn!(
                            journal = %path.display(),
                            offset = good_offset,
                            "Torn journal tail: {}",
                            reason
                        );
                        break;
                    }
                }
            }
        }

        if good_offset < file_len {
            stats.bytes_truncated = file_len - good_offset;
            file.set_len(good_offset)?;
            file.sync_all()?;
        }

        if stats.records_replayed > 0 || stats.bytes_truncated > 0 {
            tracing::info!(
                journal = %path.display(),
                records = stats.records_replayed,
                truncated_bytes = stats.bytes_truncated,
                "Metadata journal replayed"
            );
        }

        Ok((records, stats))
    }

    fn append(&self, journal: &mut Journal, entry: &FileMetadata) -> Result<()> {
        let frame = record::encode(entry)?;
        journal.file.write_all(&frame)?;
        journal.file.flush()?;
        if self.sync_strategy == SyncStrategy::EveryWrite {
            journal.file.sync_data()?;
        }
        Ok(())
    }

    /// Journal file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// What replay found when the journal was opened
    pub fn replay_stats(&self) -> ReplayStats {
        self.replay_stats
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.journal.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetadataStore for JournalMetadataStore {
    fn create(&self, record: FileMetadata) -> Result<FileMetadata> {
        let mut journal = self.journal.lock();
        let record = journal.records.prepare_create(record)?;
        self.append(&mut journal, &record)?;
        journal.records.upsert(record.clone());
        Ok(record)
    }

    fn update(&self, record: &FileMetadata) -> Result<()> {
        let mut journal = self.journal.lock();
        journal.records.check_update(record)?;
        self.append(&mut journal, record)?;
        journal.records.upsert(record.clone());
        Ok(())
    }

    fn find_by_name(&self, name: &str) -> Result<Option<FileMetadata>> {
        Ok(self.journal.lock().records.find_by_name(name))
    }
}

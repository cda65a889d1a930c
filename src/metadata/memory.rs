//! In-memory metadata store
//!
//! Process-local store for tests and embedding. Records are lost on drop.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{Result, VaultError};

use super::{FileMetadata, MetadataStore};

/// Record index shared by the in-memory and journal stores
#[derive(Default)]
pub(super) struct Records {
    by_id: HashMap<u64, FileMetadata>,
    by_name: HashMap<String, u64>,
    next_id: u64,
}

impl Records {
    pub(super) fn len(&self) -> usize {
        self.by_id.len()
    }

    pub(super) fn find_by_name(&self, name: &str) -> Option<FileMetadata> {
        self.by_name
            .get(name)
            .and_then(|id| self.by_id.get(id))
            .cloned()
    }

    /// Assign the next id to a new record without storing it
    pub(super) fn prepare_create(&self, mut record: FileMetadata) -> Result<FileMetadata> {
        if self.by_name.contains_key(&record.name) {
            return Err(VaultError::AlreadyExists(format!(
                "record for {} already exists",
                record.name
            )));
        }
        record.id = Some(self.next_id + 1);
        Ok(record)
    }

    /// Validate an update against the current index
    pub(super) fn check_update(&self, record: &FileMetadata) -> Result<()> {
        let id = record.id.ok_or_else(|| {
            VaultError::NotFound(format!("record for {} has no id", record.name))
        })?;

        if !self.by_id.contains_key(&id) {
            return Err(VaultError::NotFound(format!("no record with id {}", id)));
        }

        match self.by_name.get(&record.name) {
            Some(other) if *other != id => Err(VaultError::AlreadyExists(format!(
                "another record is named {}",
                record.name
            ))),
            _ => Ok(()),
        }
    }

    /// Store a record whose id is set, replacing any previous version
    ///
    /// Callers validate first; replay from the journal uses this directly.
    pub(super) fn upsert(&mut self, record: FileMetadata) {
        let Some(id) = record.id else {
            return;
        };

        if let Some(previous) = self.by_id.get(&id) {
            if previous.name != record.name {
                let old_name = previous.name.clone();
                self.by_name.remove(&old_name);
            }
        }

        self.next_id = self.next_id.max(id);
        self.by_name.insert(record.name.clone(), id);
        self.by_id.insert(id, record);
    }
}

/// Metadata store backed by hash maps
///
/// ## Concurrency:
/// - All records live behind one `RwLock`; lookups share it
#[derive(Default)]
pub struct InMemoryMetadataStore {
    records: RwLock<Records>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn create(&self, record: FileMetadata) -> Result<FileMetadata> {
        let mut records = self.records.write();
        let record = records.prepare_create(record)?;
        records.upsert(record.clone());
        Ok(record)
    }

    fn update(&self, record: &FileMetadata) -> Result<()> {
        let mut records = self.records.write();
        records.check_update(record)?;
        records.upsert(record.clone());
        Ok(())
    }

    fn find_by_name(&self, name: &str) -> Result<Option<FileMetadata>> {
        Ok(self.records.read().find_by_name(name))
    }
}

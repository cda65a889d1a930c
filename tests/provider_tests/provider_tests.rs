//! Tests for LocalDiskStorage
//!
//! These tests verify:
//! - Single-stream stores and their records
//! - The multipart lifecycle end to end (prepare → partitions → merge)
//! - Metadata status tracking, including rejected merges
//! - Re-verification of stored artifacts
//! - Per-file locking and concurrent partition uploads
//! - Configuration from environment lookups

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use filevault::config::{BUFFER_SIZE_ENV, DIGEST_ENV, STORAGE_PATH_ENV};
use filevault::metadata::InMemoryMetadataStore;
use filevault::provider::FileLocks;
use filevault::{
    ChecksumEngine, Config, DigestAlgorithm, FileStatus, LocalDiskStorage, StorageProvider,
    SyncStrategy, VaultError,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_with(algorithm: DigestAlgorithm) -> (TempDir, LocalDiskStorage) {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .storage_root(temp.path())
        .digest_algorithm(algorithm)
        .buffer_size(64)
        .build();
    let storage = LocalDiskStorage::open(config, Arc::new(InMemoryMetadataStore::new())).unwrap();
    (temp, storage)
}

fn setup() -> (TempDir, LocalDiskStorage) {
    setup_with(DigestAlgorithm::Sha256)
}

fn sha256(data: &[u8]) -> String {
    ChecksumEngine::new(DigestAlgorithm::Sha256).digest_bytes(data).hex
}

fn put(storage: &LocalDiskStorage, name: &str, id: u32, data: &[u8]) {
    let mut reader = data;
    storage
        .store_partition_for_file(name, id, &mut reader)
        .unwrap();
}

/// Three 100-byte partitions of a 300-byte file
fn report_parts() -> Vec<Vec<u8>> {
    vec![vec![b'A'; 100], vec![b'B'; 100], vec![b'C'; 100]]
}

struct BrokenStream;

impl Read for BrokenStream {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::UnexpectedEof, "client hung up"))
    }
}

// =============================================================================
// Store File Tests
// =============================================================================

#[test]
fn test_store_file_commits_record() {
    let (_temp, storage) = setup();
    let data = b"single stream content".to_vec();

    let record = storage.store_file("notes.txt", &mut data.as_slice()).unwrap();

    assert!(record.id.is_some());
    assert_eq!(record.name, "notes.txt");
    assert_eq!(record.status, FileStatus::Committed);
    assert_eq!(record.size, data.len() as u64);
    assert_eq!(record.checksum, sha256(&data));
    assert_eq!(record.algorithm, DigestAlgorithm::Sha256);
    assert!(!record.is_multipart());

    assert_eq!(
        fs::read(storage.layout().artifact_path("notes.txt")).unwrap(),
        data
    );
    assert_eq!(storage.file_metadata("notes.txt").unwrap(), Some(record));
}

#[test]
fn test_store_file_uses_configured_algorithm() {
    let (_temp, storage) = setup_with(DigestAlgorithm::Md5);

    let record = storage.store_file("abc.txt", &mut &b"abc"[..]).unwrap();

    assert_eq!(record.algorithm, DigestAlgorithm::Md5);
    assert_eq!(record.checksum, "900150983cd24fb0d6963f7d28e17f72");
}

#[test]
fn test_store_file_replaces_previous_version() {
    let (_temp, storage) = setup();

    let first = storage.store_file("doc.txt", &mut &b"v1"[..]).unwrap();
    let second = storage.store_file("doc.txt", &mut &b"version two"[..]).unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.size, 11);
    assert_eq!(
        fs::read(storage.layout().artifact_path("doc.txt")).unwrap(),
        b"version two"
    );
}

#[test]
fn test_store_file_rejects_invalid_names() {
    let (_temp, storage) = setup();

    for name in ["", "  ", ".", "..", "../escape", "a/b", "a\\b", "nul\0byte"] {
        let result = storage.store_file(name, &mut &b"x"[..]);
        assert!(
            matches!(result, Err(VaultError::InvalidArgument(_))),
            "name {:?}",
            name
        );
    }
}

#[test]
fn test_store_file_accepts_tmp_suffix() {
    let temp = TempDir::new().unwrap();
    let metadata = Arc::new(InMemoryMetadataStore::new());
    let config = Config::builder().storage_root(temp.path()).build();

    {
        let storage = LocalDiskStorage::open(config.clone(), metadata.clone()).unwrap();
        let record = storage
            .store_file("backup.tmp", &mut &b"nightly dump"[..])
            .unwrap();
        assert_eq!(record.status, FileStatus::Committed);
    }

    // Reopening sweeps temporaries but never committed artifacts
    let storage = LocalDiskStorage::open(config, metadata).unwrap();
    assert!(storage.is_file_valid("backup.tmp").unwrap());
    assert_eq!(
        fs::read(storage.layout().artifact_path("backup.tmp")).unwrap(),
        b"nightly dump"
    );
}

#[test]
fn test_store_file_long_name() {
    let (_temp, storage) = setup();
    let name = "x".repeat(250);

    let record = storage.store_file(&name, &mut &b"long"[..]).unwrap();

    assert_eq!(record.status, FileStatus::Committed);
    assert!(storage.is_file_valid(&name).unwrap());
}

#[test]
fn test_multipart_long_name() {
    let (_temp, storage) = setup();
    let name = "y".repeat(250);
    let parts = report_parts();
    let whole = parts.concat();

    storage
        .prepare_for_multipart_upload(&name, 3, 300, &sha256(&whole))
        .unwrap();
    for (i, part) in parts.iter().enumerate() {
        put(&storage, &name, i as u32 + 1, part);
    }
    let record = storage.merge_partitions_for_file(&name).unwrap();

    assert_eq!(record.status, FileStatus::Committed);
    assert_eq!(fs::read(storage.layout().artifact_path(&name)).unwrap(), whole);
}

#[test]
fn test_store_file_with_unreadable_manifest_fails() {
    let (_temp, storage) = setup();
    storage
        .prepare_for_multipart_upload("mixed.bin", 2, 10, "abc123")
        .unwrap();
    fs::write(
        storage.layout().manifest_path("mixed.bin"),
        b"not a framed manifest",
    )
    .unwrap();

    let result = storage.store_file("mixed.bin", &mut &b"x"[..]);

    assert!(matches!(result, Err(VaultError::Corruption(_))));
    assert!(!storage.layout().artifact_path("mixed.bin").exists());
}

#[test]
fn test_store_file_broken_stream_leaves_nothing() {
    let (_temp, storage) = setup();

    let result = storage.store_file("lost.bin", &mut BrokenStream);

    assert!(matches!(result, Err(VaultError::Io(_))));
    assert!(!storage.layout().artifact_path("lost.bin").exists());
    assert_eq!(storage.file_metadata("lost.bin").unwrap(), None);
    assert_eq!(
        fs::read_dir(storage.layout().staging_dir()).unwrap().count(),
        0
    );
}

#[test]
fn test_store_file_during_multipart_upload_fails() {
    let (_temp, storage) = setup();
    storage
        .prepare_for_multipart_upload("busy.bin", 2, 10, "abc123")
        .unwrap();

    let result = storage.store_file("busy.bin", &mut &b"x"[..]);

    assert!(matches!(result, Err(VaultError::AlreadyExists(_))));
    assert_eq!(
        storage.file_metadata("busy.bin").unwrap().unwrap().status,
        FileStatus::Initiated
    );
}

// =============================================================================
// Multipart Lifecycle Tests
// =============================================================================

#[test]
fn test_multipart_upload_commits() {
    let (_temp, storage) = setup();
    let parts = report_parts();
    let whole = parts.concat();

    storage
        .prepare_for_multipart_upload("report.pdf", 3, 300, &sha256(&whole))
        .unwrap();
    let initiated = storage.file_metadata("report.pdf").unwrap().unwrap();
    assert_eq!(initiated.status, FileStatus::Initiated);
    assert_eq!(initiated.partition_count, Some(3));

    put(&storage, "report.pdf", 2, &parts[1]);
    assert_eq!(
        storage.file_metadata("report.pdf").unwrap().unwrap().status,
        FileStatus::Partial
    );
    put(&storage, "report.pdf", 3, &parts[2]);
    put(&storage, "report.pdf", 1, &parts[0]);
    assert_eq!(storage.received_partitions("report.pdf").unwrap(), vec![1, 2, 3]);

    let record = storage.merge_partitions_for_file("report.pdf").unwrap();

    assert_eq!(record.status, FileStatus::Committed);
    assert_eq!(record.size, 300);
    assert_eq!(record.checksum, sha256(&whole));
    assert_eq!(record.id, initiated.id);
    assert_eq!(
        fs::read(storage.layout().artifact_path("report.pdf")).unwrap(),
        whole
    );
    assert!(storage.is_file_valid("report.pdf").unwrap());
}

#[test]
fn test_multipart_checksum_mismatch_marks_failed() {
    let (_temp, storage) = setup();
    let parts = report_parts();

    storage
        .prepare_for_multipart_upload("report.pdf", 3, 300, "abc123")
        .unwrap();
    for (i, part) in parts.iter().enumerate() {
        put(&storage, "report.pdf", i as u32 + 1, part);
    }

    let result = storage.merge_partitions_for_file("report.pdf");

    match result {
        Err(VaultError::ChecksumMismatch { expected, actual }) => {
            assert_eq!(expected, "abc123");
            assert_eq!(actual, sha256(&parts.concat()));
        }
        other => panic!("expected ChecksumMismatch, got {:?}", other),
    }

    let record = storage.file_metadata("report.pdf").unwrap().unwrap();
    assert_eq!(record.status, FileStatus::Failed);
    assert_eq!(record.status.to_string(), "FAILED");
    assert!(!storage.layout().artifact_path("report.pdf").exists());
    assert!(storage.layout().rejected_path("report.pdf").is_file());
    assert!(!storage.is_file_valid("report.pdf").unwrap());

    // A failed upload cannot be resumed
    let mut reader = parts[0].as_slice();
    assert!(matches!(
        storage.store_partition_for_file("report.pdf", 1, &mut reader),
        Err(VaultError::InvalidState(_))
    ));
}

#[test]
fn test_multipart_size_mismatch_marks_failed() {
    let (_temp, storage) = setup();
    let parts = report_parts();
    let whole = parts.concat();

    storage
        .prepare_for_multipart_upload("report.pdf", 3, 299, &sha256(&whole))
        .unwrap();
    for (i, part) in parts.iter().enumerate() {
        put(&storage, "report.pdf", i as u32 + 1, part);
    }

    let result = storage.merge_partitions_for_file("report.pdf");

    assert!(matches!(
        result,
        Err(VaultError::SizeMismatch {
            expected: 299,
            actual: 300
        })
    ));
    assert_eq!(
        storage.file_metadata("report.pdf").unwrap().unwrap().status,
        FileStatus::Failed
    );
}

#[test]
fn test_multipart_checksum_and_size_mismatch_reports_checksum() {
    let (_temp, storage) = setup();

    storage
        .prepare_for_multipart_upload("report.pdf", 1, 300, "abc123")
        .unwrap();
    put(&storage, "report.pdf", 1, &[b'Z'; 299]);

    let result = storage.merge_partitions_for_file("report.pdf");

    match result {
        Err(VaultError::ChecksumMismatch { expected, actual }) => {
            assert_eq!(expected, "abc123");
            assert_eq!(actual, sha256(&[b'Z'; 299]));
        }
        other => panic!("expected ChecksumMismatch, got {:?}", other),
    }
    let record = storage.file_metadata("report.pdf").unwrap().unwrap();
    assert_eq!(record.status, FileStatus::Failed);
    assert_eq!(record.size, 299);
}

#[test]
fn test_multipart_incomplete_merge_keeps_upload_open() {
    let (_temp, storage) = setup();
    let parts = report_parts();
    let whole = parts.concat();

    storage
        .prepare_for_multipart_upload("report.pdf", 3, 300, &sha256(&whole))
        .unwrap();
    put(&storage, "report.pdf", 1, &parts[0]);
    put(&storage, "report.pdf", 3, &parts[2]);

    assert!(matches!(
        storage.merge_partitions_for_file("report.pdf"),
        Err(VaultError::IncompletePartitions {
            expected: 3,
            found: 2
        })
    ));
    assert_eq!(
        storage.file_metadata("report.pdf").unwrap().unwrap().status,
        FileStatus::Partial
    );

    put(&storage, "report.pdf", 2, &parts[1]);
    let record = storage.merge_partitions_for_file("report.pdf").unwrap();
    assert_eq!(record.status, FileStatus::Committed);
}

#[test]
fn test_multipart_reupload_last_write_wins() {
    let (_temp, storage) = setup();
    let final_parts = [b"first-".to_vec(), b"second".to_vec()];
    let whole = final_parts.concat();

    storage
        .prepare_for_multipart_upload("retry.bin", 2, whole.len() as u64, &sha256(&whole))
        .unwrap();
    put(&storage, "retry.bin", 1, b"stale!");
    put(&storage, "retry.bin", 2, &final_parts[1]);
    put(&storage, "retry.bin", 1, &final_parts[0]);

    let record = storage.merge_partitions_for_file("retry.bin").unwrap();

    assert_eq!(record.status, FileStatus::Committed);
    assert_eq!(
        fs::read(storage.layout().artifact_path("retry.bin")).unwrap(),
        whole
    );
}

#[test]
fn test_multipart_twelve_partitions_in_numeric_order() {
    let (_temp, storage) = setup();
    let parts: Vec<Vec<u8>> = (1..=12u8).map(|id| vec![id; 10]).collect();
    let whole = parts.concat();

    storage
        .prepare_for_multipart_upload("dozen.bin", 12, 120, &sha256(&whole))
        .unwrap();
    for id in [12, 11, 10, 1, 2, 9, 3, 8, 4, 7, 5, 6] {
        put(&storage, "dozen.bin", id, &parts[id as usize - 1]);
    }

    storage.merge_partitions_for_file("dozen.bin").unwrap();

    assert_eq!(
        fs::read(storage.layout().artifact_path("dozen.bin")).unwrap(),
        whole
    );
}

#[test]
fn test_multipart_md5_declared_checksum() {
    let (_temp, storage) = setup();
    let parts = report_parts();
    let md5 = ChecksumEngine::new(DigestAlgorithm::Md5)
        .digest_bytes(&parts.concat())
        .hex;

    storage
        .prepare_for_multipart_upload_with("legacy.pdf", 3, 300, &md5, DigestAlgorithm::Md5)
        .unwrap();
    for (i, part) in parts.iter().enumerate() {
        put(&storage, "legacy.pdf", i as u32 + 1, part);
    }

    let record = storage.merge_partitions_for_file("legacy.pdf").unwrap();

    assert_eq!(record.algorithm, DigestAlgorithm::Md5);
    assert_eq!(record.checksum, md5);
    assert!(storage.is_file_valid("legacy.pdf").unwrap());
}

#[test]
fn test_prepare_rejects_bad_arguments() {
    let (_temp, storage) = setup();

    assert!(matches!(
        storage.prepare_for_multipart_upload("a.bin", 0, 10, "abc"),
        Err(VaultError::InvalidArgument(_))
    ));
    assert!(matches!(
        storage.prepare_for_multipart_upload("a.bin", 2, 10, "  "),
        Err(VaultError::InvalidArgument(_))
    ));
    assert!(matches!(
        storage.prepare_for_multipart_upload("../a.bin", 2, 10, "abc"),
        Err(VaultError::InvalidArgument(_))
    ));
    assert_eq!(storage.file_metadata("a.bin").unwrap(), None);
}

#[test]
fn test_prepare_twice_while_in_progress_fails() {
    let (_temp, storage) = setup();
    storage
        .prepare_for_multipart_upload("a.bin", 2, 10, "abc")
        .unwrap();

    assert!(matches!(
        storage.prepare_for_multipart_upload("a.bin", 3, 10, "abc"),
        Err(VaultError::AlreadyExists(_))
    ));
}

#[test]
fn test_prepare_after_failure_restarts_upload() {
    let (_temp, storage) = setup();
    let parts = report_parts();
    let whole = parts.concat();

    storage
        .prepare_for_multipart_upload("report.pdf", 3, 300, "abc123")
        .unwrap();
    for (i, part) in parts.iter().enumerate() {
        put(&storage, "report.pdf", i as u32 + 1, part);
    }
    assert!(storage.merge_partitions_for_file("report.pdf").is_err());
    let failed = storage.file_metadata("report.pdf").unwrap().unwrap();

    storage
        .prepare_for_multipart_upload("report.pdf", 3, 300, &sha256(&whole))
        .unwrap();
    let restarted = storage.file_metadata("report.pdf").unwrap().unwrap();
    assert_eq!(restarted.status, FileStatus::Initiated);
    assert_eq!(restarted.id, failed.id);
    assert!(storage.received_partitions("report.pdf").unwrap().is_empty());

    for (i, part) in parts.iter().enumerate() {
        put(&storage, "report.pdf", i as u32 + 1, part);
    }
    let record = storage.merge_partitions_for_file("report.pdf").unwrap();
    assert_eq!(record.status, FileStatus::Committed);
}

#[test]
fn test_store_partition_without_prepare_fails() {
    let (_temp, storage) = setup();
    let mut reader: &[u8] = b"orphan";

    assert!(matches!(
        storage.store_partition_for_file("ghost.bin", 1, &mut reader),
        Err(VaultError::NotFound(_))
    ));
    assert!(matches!(
        storage.merge_partitions_for_file("ghost.bin"),
        Err(VaultError::NotFound(_))
    ));
}

// =============================================================================
// Abort / Cleanup Tests
// =============================================================================

#[test]
fn test_abort_marks_failed_and_removes_partitions() {
    let (_temp, storage) = setup();
    storage
        .prepare_for_multipart_upload("big.iso", 4, 400, "abc")
        .unwrap();
    put(&storage, "big.iso", 1, &[0u8; 100]);

    let record = storage.abort_multipart_upload("big.iso").unwrap();

    assert_eq!(record.status, FileStatus::Failed);
    assert_eq!(
        storage.file_metadata("big.iso").unwrap().unwrap().status,
        FileStatus::Failed
    );
    assert!(!storage.layout().container_path("big.iso").exists());
    assert!(matches!(
        storage.abort_multipart_upload("big.iso"),
        Err(VaultError::NotFound(_))
    ));
}

#[test]
fn test_abort_finished_upload_fails() {
    let (_temp, storage) = setup();
    let data = b"tiny".to_vec();
    storage
        .prepare_for_multipart_upload("t.bin", 1, 4, &sha256(&data))
        .unwrap();
    put(&storage, "t.bin", 1, &data);
    storage.merge_partitions_for_file("t.bin").unwrap();

    assert!(matches!(
        storage.abort_multipart_upload("t.bin"),
        Err(VaultError::InvalidState(_))
    ));
}

#[test]
fn test_cleanup_only_after_finish() {
    let (_temp, storage) = setup();
    let data = b"tiny".to_vec();
    storage
        .prepare_for_multipart_upload("t.bin", 1, 4, &sha256(&data))
        .unwrap();
    put(&storage, "t.bin", 1, &data);

    assert!(matches!(
        storage.cleanup_upload("t.bin"),
        Err(VaultError::InvalidState(_))
    ));

    storage.merge_partitions_for_file("t.bin").unwrap();
    storage.cleanup_upload("t.bin").unwrap();

    assert!(!storage.layout().container_path("t.bin").exists());
    assert!(storage.is_file_valid("t.bin").unwrap());
}

// =============================================================================
// Validity Tests
// =============================================================================

#[test]
fn test_is_file_valid_detects_corruption() {
    let (_temp, storage) = setup();
    storage
        .store_file("photo.jpg", &mut vec![7u8; 1000].as_slice())
        .unwrap();
    assert!(storage.is_file_valid("photo.jpg").unwrap());

    let path = storage.layout().artifact_path("photo.jpg");
    let mut bytes = fs::read(&path).unwrap();
    bytes[500] ^= 0x01;
    fs::write(&path, bytes).unwrap();

    assert!(!storage.is_file_valid("photo.jpg").unwrap());
}

#[test]
fn test_is_file_valid_missing_artifact() {
    let (_temp, storage) = setup();
    storage.store_file("gone.txt", &mut &b"here"[..]).unwrap();
    fs::remove_file(storage.layout().artifact_path("gone.txt")).unwrap();

    assert!(!storage.is_file_valid("gone.txt").unwrap());
}

#[test]
fn test_is_file_valid_in_progress_and_unknown() {
    let (_temp, storage) = setup();
    storage
        .prepare_for_multipart_upload("wip.bin", 2, 10, "abc")
        .unwrap();

    assert!(!storage.is_file_valid("wip.bin").unwrap());
    assert!(matches!(
        storage.is_file_valid("nobody.bin"),
        Err(VaultError::NotFound(_))
    ));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_partition_uploads() {
    let (_temp, storage) = setup();
    let storage = Arc::new(storage);
    let parts: Vec<Vec<u8>> = (1..=8u32)
        .map(|id| (0..4096).map(|i| (i as u32 * id % 251) as u8).collect())
        .collect();
    let whole = parts.concat();

    storage
        .prepare_for_multipart_upload("parallel.bin", 8, whole.len() as u64, &sha256(&whole))
        .unwrap();

    let handles: Vec<_> = parts
        .iter()
        .cloned()
        .enumerate()
        .map(|(i, part)| {
            let storage = Arc::clone(&storage);
            thread::spawn(move || {
                let mut reader = part.as_slice();
                storage
                    .store_partition_for_file("parallel.bin", i as u32 + 1, &mut reader)
                    .unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(
        storage.file_metadata("parallel.bin").unwrap().unwrap().status,
        FileStatus::Partial
    );
    let record = storage.merge_partitions_for_file("parallel.bin").unwrap();
    assert_eq!(record.status, FileStatus::Committed);
    assert_eq!(
        fs::read(storage.layout().artifact_path("parallel.bin")).unwrap(),
        whole
    );
}

#[test]
fn test_concurrent_uploads_of_different_files() {
    let (_temp, storage) = setup();
    let storage = Arc::new(storage);

    let handles: Vec<_> = (0..6)
        .map(|n| {
            let storage = Arc::clone(&storage);
            thread::spawn(move || {
                let name = format!("file-{}.bin", n);
                let data = vec![n as u8; 1000 + n];
                let half = data.len() / 2;
                storage
                    .prepare_for_multipart_upload(&name, 2, data.len() as u64, &sha256(&data))
                    .unwrap();
                put(&storage, &name, 2, &data[half..]);
                put(&storage, &name, 1, &data[..half]);
                storage.merge_partitions_for_file(&name).unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap().status, FileStatus::Committed);
    }
    assert_eq!(storage.tracked_locks(), 0);
}

#[test]
fn test_lock_entries_released_after_every_operation() {
    let (_temp, storage) = setup();
    let data = b"tiny".to_vec();

    storage
        .prepare_for_multipart_upload("a.bin", 1, 4, &sha256(&data))
        .unwrap();
    assert_eq!(storage.tracked_locks(), 0);

    put(&storage, "a.bin", 1, &data);
    assert_eq!(storage.tracked_locks(), 0);

    storage.received_partitions("a.bin").unwrap();
    storage.merge_partitions_for_file("a.bin").unwrap();
    storage.is_file_valid("a.bin").unwrap();
    storage.cleanup_upload("a.bin").unwrap();
    assert_eq!(storage.tracked_locks(), 0);

    storage
        .prepare_for_multipart_upload("b.bin", 2, 10, "abc")
        .unwrap();
    storage.abort_multipart_upload("b.bin").unwrap();
    assert_eq!(storage.tracked_locks(), 0);

    // Failed operations release their entry too
    assert!(storage.abort_multipart_upload("b.bin").is_err());
    assert!(storage.is_file_valid("c.bin").is_err());
    assert!(storage.cleanup_upload("c.bin").is_err());
    assert_eq!(storage.tracked_locks(), 0);
}

#[test]
fn test_exclusive_waits_for_shared() {
    let locks = Arc::new(FileLocks::new());
    let acquired = Arc::new(AtomicBool::new(false));

    let shared = locks.shared("a.bin");

    let waiter = {
        let locks = Arc::clone(&locks);
        let acquired = Arc::clone(&acquired);
        thread::spawn(move || {
            let _exclusive = locks.exclusive("a.bin");
            acquired.store(true, Ordering::SeqCst);
        })
    };

    // Other names are unaffected
    drop(locks.exclusive("b.bin"));

    thread::sleep(Duration::from_millis(50));
    assert!(!acquired.load(Ordering::SeqCst));

    drop(shared);
    waiter.join().unwrap();
    assert!(acquired.load(Ordering::SeqCst));
}

#[test]
fn test_lock_table_pruning() {
    let locks = FileLocks::new();

    let held = locks.shared("busy.bin");
    drop(locks.exclusive("idle.bin"));
    assert_eq!(locks.len(), 2);

    assert_eq!(locks.prune_idle(), 1);
    assert_eq!(locks.len(), 1);

    drop(held);
    assert_eq!(locks.prune_idle(), 1);
    assert!(locks.is_empty());
}

// =============================================================================
// Configuration Tests
// =============================================================================

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_config_from_lookup_overrides() {
    let config = Config::from_lookup(lookup(&[
        (STORAGE_PATH_ENV, "/srv/vault"),
        (DIGEST_ENV, "sha512"),
        (BUFFER_SIZE_ENV, "8192"),
    ]))
    .unwrap();

    assert_eq!(config.storage_root, std::path::PathBuf::from("/srv/vault"));
    assert_eq!(config.digest_algorithm, DigestAlgorithm::Sha512);
    assert_eq!(config.buffer_size, 8192);
    assert_eq!(config.sync_strategy, SyncStrategy::EveryWrite);
}

#[test]
fn test_config_falls_back_to_temp_dir() {
    let config = Config::from_lookup(lookup(&[])).unwrap();

    assert_eq!(config.storage_root, std::env::temp_dir().join("filevault"));
    assert_eq!(config.digest_algorithm, DigestAlgorithm::Sha256);
    assert_eq!(config.buffer_size, 64 * 1024);

    let blank = Config::from_lookup(lookup(&[(STORAGE_PATH_ENV, "  ")])).unwrap();
    assert_eq!(blank.storage_root, std::env::temp_dir().join("filevault"));
}

#[test]
fn test_config_rejects_bad_values() {
    assert!(matches!(
        Config::from_lookup(lookup(&[(DIGEST_ENV, "crc64")])),
        Err(VaultError::AlgorithmUnavailable(_))
    ));
    assert!(matches!(
        Config::from_lookup(lookup(&[(BUFFER_SIZE_ENV, "lots")])),
        Err(VaultError::Config(_))
    ));
    assert!(matches!(
        Config::from_lookup(lookup(&[(BUFFER_SIZE_ENV, "0")])),
        Err(VaultError::Config(_))
    ));
}

//! FileVault CLI
//!
//! Drives a local storage root: single-stream stores, parallel multipart
//! uploads, verification and status queries.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use crossbeam::channel::Receiver;
use filevault::config::{DIGEST_ENV, STORAGE_PATH_ENV};
use filevault::metadata::JournalMetadataStore;
use filevault::{
    ChecksumEngine, Config, FileMetadata, LocalDiskStorage, Result, StorageProvider, VaultError,
};
use tracing_subscriber::{fmt, EnvFilter};

/// FileVault CLI
#[derive(Parser, Debug)]
#[command(name = "filevault")]
#[command(about = "Durable file storage with multipart uploads")]
#[command(version)]
struct Args {
    /// Storage root (defaults to $DATA_STORAGE_PATH)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Digest algorithm for new checksums (md5, sha256, sha512)
    #[arg(short, long)]
    algorithm: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a local file in one stream
    Store {
        /// File to upload
        path: PathBuf,

        /// Name to store it under (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Upload a local file as partitions, then merge
    Upload {
        /// File to upload
        path: PathBuf,

        /// Name to store it under (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,

        /// Number of partitions
        #[arg(short, long, default_value = "4")]
        partitions: u32,

        /// Parallel partition writers
        #[arg(short, long, default_value = "4")]
        workers: usize,
    },

    /// Re-verify a stored file against its checksum
    Verify {
        name: String,
    },

    /// Show the metadata record of a file
    Status {
        name: String,
    },

    /// Abandon an in-progress multipart upload
    Abort {
        name: String,
    },

    /// Remove the partitions retained after an upload finished
    Cleanup {
        name: String,
    },
}

const JOURNAL_FILENAME: &str = "metadata.log";

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,filevault=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    // Command-line flags take precedence over the environment
    let config = Config::from_lookup(|key| match key {
        STORAGE_PATH_ENV => args
            .data_dir
            .as_ref()
            .map(|dir| dir.display().to_string())
            .or_else(|| std::env::var(key).ok()),
        DIGEST_ENV => args.algorithm.clone().or_else(|| std::env::var(key).ok()),
        _ => std::env::var(key).ok(),
    })?;

    tracing::info!("FileVault v{}", filevault::VERSION);
    tracing::info!("Storage root: {}", config.storage_root.display());

    let journal = JournalMetadataStore::open(
        &config.storage_root.join(JOURNAL_FILENAME),
        config.sync_strategy,
    )?;
    let storage = LocalDiskStorage::open(config, Arc::new(journal))?;

    match args.command {
        Commands::Store { path, name } => {
            let name = resolve_name(&path, name)?;
            let mut file = File::open(&path)?;
            let record = storage.store_file(&name, &mut file)?;
            print_record(&record);
        }
        Commands::Upload {
            path,
            name,
            partitions,
            workers,
        } => {
            let name = resolve_name(&path, name)?;
            let record = upload_multipart(&storage, &path, &name, partitions, workers)?;
            print_record(&record);
        }
        Commands::Verify { name } => {
            let valid = storage.is_file_valid(&name)?;
            println!("{}: {}", name, if valid { "valid" } else { "INVALID" });
            if !valid {
                std::process::exit(2);
            }
        }
        Commands::Status { name } => match storage.file_metadata(&name)? {
            Some(record) => {
                print_record(&record);
                if let Ok(received) = storage.received_partitions(&name) {
                    println!("received:   {:?}", received);
                }
            }
            None => println!("{}: not found", name),
        },
        Commands::Abort { name } => {
            let record = storage.abort_multipart_upload(&name)?;
            print_record(&record);
        }
        Commands::Cleanup { name } => {
            storage.cleanup_upload(&name)?;
            println!("{}: upload container removed", name);
        }
    }

    Ok(())
}

/// Split `path` into `partitions` contiguous ranges and upload them in parallel
fn upload_multipart(
    storage: &LocalDiskStorage,
    path: &Path,
    name: &str,
    partitions: u32,
    workers: usize,
) -> Result<FileMetadata> {
    if partitions == 0 {
        return Err(VaultError::InvalidArgument(
            "partition count must be positive".to_string(),
        ));
    }

    let total = std::fs::metadata(path)?.len();
    let chunk = total.div_ceil(partitions as u64).max(1);

    let engine = ChecksumEngine::new(storage.config().digest_algorithm)
        .with_buffer_size(storage.config().buffer_size);
    let declared = engine.digest_file(path)?;

    storage.prepare_for_multipart_upload(name, partitions, total, &declared.hex)?;

    let rx = queue_partitions(partitions)?;

    let outcomes: Vec<Result<()>> = crossbeam::scope(|s| {
        let handles: Vec<_> = (0..workers.max(1))
            .map(|_| {
                let rx = rx.clone();
                s.spawn(move |_| -> Result<()> {
                    for partition_id in rx.iter() {
                        let offset = (partition_id as u64 - 1) * chunk;
                        let len = chunk.min(total.saturating_sub(offset));

                        let mut file = File::open(path)?;
                        file.seek(SeekFrom::Start(offset.min(total)))?;
                        let mut range = file.take(len);

                        storage.store_partition_for_file(name, partition_id, &mut range)?;
                        tracing::debug!(partition = partition_id, bytes = len, "Uploaded");
                    }
                    Ok(())
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| {
                h.join().unwrap_or_else(|_| {
                    Err(VaultError::InvalidState("upload worker panicked".to_string()))
                })
            })
            .collect()
    })
    .map_err(|_| VaultError::InvalidState("upload workers panicked".to_string()))?;

    for outcome in outcomes {
        outcome?;
    }

    storage.merge_partitions_for_file(name)
}

/// Channel pre-filled with ids `1..=partitions`, closed for sending
fn queue_partitions(partitions: u32) -> Result<Receiver<u32>> {
    // Holds every id up front, so sends never block
    let (tx, rx) = crossbeam::channel::bounded::<u32>(partitions as usize);
    for partition_id in 1..=partitions {
        tx.send(partition_id).map_err(|e| {
            VaultError::InvalidState(format!("upload queue closed at partition {}", e.0))
        })?;
    }
    Ok(rx)
}

fn resolve_name(path: &Path, name: Option<String>) -> Result<String> {
    match name {
        Some(name) => Ok(name),
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                VaultError::InvalidArgument(format!("cannot derive a name from {}", path.display()))
            }),
    }
}

fn print_record(record: &FileMetadata) {
    println!("name:       {}", record.name);
    if let Some(id) = record.id {
        println!("id:         {}", id);
    }
    println!("status:     {}", record.status);
    println!("size:       {}", record.size);
    println!("checksum:   {} ({})", record.checksum, record.algorithm);
    if let Some(count) = record.partition_count {
        println!("partitions: {}", count);
    }
}

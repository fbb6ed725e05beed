//! mlnet OS layer probe
//!
//! Reports what the OS abstraction layer sees on this host: platform,
//! descriptor limits, file sizes and allocation, and streamed hashes.

use anyhow::Context;
use clap::{Parser, Subcommand};
use mlnet_os::file_io::allocated_bytes;
use mlnet_os::platform::supports_sparse_files;
use mlnet_os::{
    Descriptor, HASH_BUFFER_LEN, Offset, PlatformInfo, detect_platform, dtable_size, fd_size,
    path_size, shared_hash_buffer, truncate,
};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Inspect the mlnet OS layer on this host
#[derive(Parser)]
#[command(name = "mlnet-probe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the detected platform
    Platform,

    /// Show descriptor and buffer limits
    Limits,

    /// Show the size and allocation of a file
    Size {
        /// File to inspect
        path: PathBuf,
    },

    /// Stream a file through the hash buffer into BLAKE3
    Hash {
        /// File to hash
        path: PathBuf,
    },

    /// Create or resize a file and report its allocation
    Extend {
        /// File to resize (created if missing)
        path: PathBuf,

        /// New length in bytes
        len: Offset,

        /// Leave the new range as a hole
        #[arg(long)]
        sparse: bool,
    },
}

#[derive(Debug, Serialize)]
struct PlatformReport {
    #[serde(flatten)]
    info: PlatformInfo,
    sparse_files: bool,
}

#[derive(Debug, Serialize)]
struct LimitsReport {
    dtable_size: i32,
    hash_buffer_len: usize,
}

#[derive(Debug, Serialize)]
struct SizeReport {
    path: PathBuf,
    path_size: Offset,
    fd_size: Offset,
    allocated_bytes: Option<Offset>,
}

#[derive(Debug, Serialize)]
struct HashReport {
    path: PathBuf,
    bytes: u64,
    blocks: u64,
    blake3: String,
}

#[derive(Debug, Serialize)]
struct ExtendReport {
    path: PathBuf,
    sparse: bool,
    size_before: Offset,
    size_after: Offset,
    allocated_before: Option<Offset>,
    allocated_after: Option<Offset>,
}

fn platform_report() -> PlatformReport {
    PlatformReport {
        info: detect_platform(),
        sparse_files: supports_sparse_files(),
    }
}

fn limits_report() -> LimitsReport {
    LimitsReport {
        dtable_size: dtable_size(),
        hash_buffer_len: HASH_BUFFER_LEN,
    }
}

fn size_report(path: &Path) -> anyhow::Result<SizeReport> {
    let by_path = path_size(path)?;
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let fd = Descriptor::from_file(&file);

    Ok(SizeReport {
        path: path.to_path_buf(),
        path_size: by_path,
        fd_size: fd_size(&fd)?,
        allocated_bytes: allocated_bytes(&fd)?,
    })
}

fn hash_report(path: &Path) -> anyhow::Result<HashReport> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let fd = Descriptor::from_file(&file);

    let mut buffer = shared_hash_buffer()
        .lock()
        .map_err(|_| anyhow::anyhow!("hash buffer lock poisoned"))?;
    let mut hasher = blake3::Hasher::new();
    let mut bytes = 0u64;
    let mut blocks = 0u64;

    while buffer.fill_from(&fd)? > 0 {
        hasher.update(buffer.filled());
        bytes += buffer.len() as u64;
        blocks += 1;
    }
    buffer.clear();
    debug!("hashed {} in {} blocks", path.display(), blocks);

    Ok(HashReport {
        path: path.to_path_buf(),
        bytes,
        blocks,
        blake3: hasher.finalize().to_hex().to_string(),
    })
}

fn extend_report(path: &Path, len: Offset, sparse: bool) -> anyhow::Result<ExtendReport> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let fd = Descriptor::from_file(&file);

    let size_before = fd_size(&fd)?;
    let allocated_before = allocated_bytes(&fd)?;

    truncate(&fd, len, sparse)?;
    file.sync_all()
        .with_context(|| format!("syncing {}", path.display()))?;

    Ok(ExtendReport {
        path: path.to_path_buf(),
        sparse,
        size_before,
        size_after: fd_size(&fd)?,
        allocated_before,
        allocated_after: allocated_bytes(&fd)?,
    })
}

fn print_report<T: Serialize + std::fmt::Debug>(report: &T, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{report:#?}");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose { "debug" } else { "info" })
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Platform => {
            let report = platform_report();
            if !report.info.supported {
                info!("{} is not a validated platform", report.info.describe());
            }
            print_report(&report, cli.json)?;
        }
        Commands::Limits => print_report(&limits_report(), cli.json)?,
        Commands::Size { path } => print_report(&size_report(&path)?, cli.json)?,
        Commands::Hash { path } => print_report(&hash_report(&path)?, cli.json)?,
        Commands::Extend { path, len, sparse } => {
            print_report(&extend_report(&path, len, sparse)?, cli.json)?
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_cli_parses_extend() {
        let cli = Cli::try_parse_from(["mlnet-probe", "--json", "extend", "/tmp/x", "4096", "--sparse"])
            .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Extend { path, len, sparse } => {
                assert_eq!(path, PathBuf::from("/tmp/x"));
                assert_eq!(len, 4096);
                assert!(sparse);
            }
            _ => panic!("expected extend"),
        }
    }

    #[test]
    fn test_size_report() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&[0xAB; 3000]).unwrap();
        temp.flush().unwrap();

        let report = size_report(temp.path()).unwrap();
        assert_eq!(report.path_size, 3000);
        assert_eq!(report.fd_size, 3000);
    }

    #[test]
    fn test_size_report_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = size_report(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<mlnet_os::OsError>(),
            Some(mlnet_os::OsError::NotFound { .. })
        ));
    }

    #[test]
    fn test_hash_report_matches_blake3() {
        let data: Vec<u8> = (0..HASH_BUFFER_LEN * 2 + 17).map(|i| i as u8).collect();
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&data).unwrap();
        temp.flush().unwrap();

        let report = hash_report(temp.path()).unwrap();
        assert_eq!(report.bytes, data.len() as u64);
        assert_eq!(report.blake3, blake3::hash(&data).to_hex().to_string());
    }

    #[test]
    fn test_extend_report_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grown.part");

        let report = extend_report(&path, 10_000, true).unwrap();
        assert_eq!(report.size_before, 0);
        assert_eq!(report.size_after, 10_000);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 10_000);
    }

    #[test]
    fn test_platform_report_serializes() {
        let json = serde_json::to_value(platform_report()).unwrap();
        assert!(json.get("name").is_some());
        assert!(json.get("supported").is_some());
        assert!(json.get("sparse_files").is_some());
    }
}

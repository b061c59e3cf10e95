use rand::Rng;
use splitlink::allocation::{Allocation, NetInterface};
use splitlink::DownloaderBuilder;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

pub const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Installs a log subscriber honouring `RUST_LOG`. Safe to call from every
/// test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Creates a temporary directory for testing purposes
pub fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temporary directory")
}

/// Creates test file content of specified size
pub fn create_test_content(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

/// Creates `size` random bytes
pub fn random_content(size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    rand::rng().fill(&mut data[..]);
    data
}

/// The loopback interface, bound explicitly
pub fn loopback(name: &str) -> NetInterface {
    NetInterface::new(name, LOOPBACK)
}

/// Locked allocation with one fixed entry per share, stores in `dir`
pub fn fixed_allocation(dir: &Path, shares: &[f64]) -> Allocation {
    shares
        .iter()
        .fold(Allocation::in_dir(dir), |allocation, share| {
            allocation
                .add_fixed(loopback("lo"), *share, None)
                .expect("Failed to add entry")
        })
        .lock()
        .expect("Failed to lock allocation")
}

/// Locked allocation with `count` dynamic entries, stores in `dir`
pub fn dynamic_allocation(dir: &Path, count: usize) -> Allocation {
    (0..count)
        .fold(Allocation::in_dir(dir), |allocation, _| {
            allocation
                .add_dynamic(loopback("lo"), None)
                .expect("Failed to add entry")
        })
        .lock()
        .expect("Failed to lock allocation")
}

/// Paths of every temporary store of `allocation`
pub fn store_paths(allocation: &Allocation) -> Vec<PathBuf> {
    allocation
        .entries()
        .iter()
        .map(|entry| entry.store().path().to_path_buf())
        .collect()
}

/// Downloader builder with hidden bars and short timeouts
pub fn test_downloader_builder() -> DownloaderBuilder {
    init_tracing();
    DownloaderBuilder::hidden()
        .concurrency(8)
        .tick(Duration::from_millis(50))
        .connect_timeout(Duration::from_secs(5))
        .read_timeout(Duration::from_secs(5))
}

/// Asserts that a file exists at the given path
pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "File should exist at path: {:?}", path);
}

/// Asserts that no file exists at the given path
pub fn assert_file_missing(path: &Path) {
    assert!(!path.exists(), "File should not exist at path: {:?}", path);
}

/// Asserts that a file holds exactly `expected`
pub fn assert_file_content(path: &Path, expected: &[u8]) {
    let content = fs::read(path).expect("Failed to read file");
    assert_eq!(content.len(), expected.len(), "File size mismatch at path: {:?}", path);
    assert!(content == expected, "File content mismatch at path: {:?}", path);
}

//! Temporary per-segment stores.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::TempPath;
use tracing::debug;

/// A private temporary file holding one segment.
///
/// The file is created with a random name, so concurrent runs in the same
/// directory never collide. Removal is claim-once: whichever caller takes
/// the handle first deletes the file, every later caller gets `Ok(false)`.
/// A store that is dropped without being removed deletes its file.
#[derive(Debug)]
pub struct TempStore {
    path: PathBuf,
    handle: Mutex<Option<TempPath>>,
}

impl TempStore {
    /// Creates an empty store in `dir`, named after the segment `id`.
    pub fn create_in(dir: &Path, id: &str) -> io::Result<Self> {
        let prefix: String = id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let file = tempfile::Builder::new()
            .prefix(&format!("{}.chunk.", prefix))
            .suffix(".bin")
            .rand_bytes(16)
            .tempfile_in(dir)?;
        let handle = file.into_temp_path();
        let path = handle.to_path_buf();
        debug!("Created temporary store {:?}", path);

        Ok(Self {
            path,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` once the store has been removed.
    pub fn is_claimed(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Current size of the file on disk.
    pub fn len(&self) -> io::Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Deletes the file, returning `true` if this call removed it.
    pub fn remove(&self) -> io::Result<bool> {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return Ok(false);
        };
        match handle.close() {
            Ok(()) => {
                debug!("Removed temporary store {:?}", self.path);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

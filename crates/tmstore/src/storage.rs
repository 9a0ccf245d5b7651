//! Snapshot persistence
//!
//! File layout:
//! - `<path>`: pretty-printed JSON snapshot
//! - `<dir>/.tmp*`: short-lived temporary file renamed over `<path>` on save

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::snapshot::Snapshot;

/// Reads and writes snapshots at a single path
#[derive(Debug, Clone)]
pub struct PersistenceManager {
    path: PathBuf,
}

impl PersistenceManager {
    /// Create a manager for the snapshot file at `path`
    ///
    /// Nothing is touched on disk until `save` or `load` is called.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Snapshot file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a snapshot atomically
    ///
    /// The snapshot is written to a temporary file in the target directory,
    /// flushed, then renamed over the target. A crash mid-write leaves the
    /// previous snapshot intact.
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let bytes = serde_json::to_vec_pretty(snapshot)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        debug!(
            "Saved snapshot with {} entries to {:?} ({} bytes)",
            snapshot.entries.len(),
            self.path,
            bytes.len()
        );
        Ok(())
    }

    /// Read and validate the snapshot
    ///
    /// # Returns
    /// * `Ok(Snapshot::default())` if the file does not exist
    /// * `Err(Error::CorruptSnapshot)` if it cannot be parsed or fails validation
    /// * `Err(Error::Io)` for any other read failure
    pub fn load(&self) -> Result<Snapshot> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No snapshot found at {:?}, starting empty", self.path);
                return Ok(Snapshot::default());
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let snapshot: Snapshot = serde_json::from_slice(&bytes)
            .map_err(|e| Error::CorruptSnapshot(e.to_string()))?;
        snapshot.validate()?;

        info!(
            "Loaded snapshot with {} entries from {:?}",
            snapshot.entries.len(),
            self.path
        );
        Ok(snapshot)
    }

    /// True if a snapshot file currently exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

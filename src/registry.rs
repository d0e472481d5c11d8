//! Record of every process id spawned during the current run.
//!
//! The registry is append-only. Handles are cheap to clone and share one
//! underlying list, so the wait path and the kill sweep can read it while the
//! spawner is still appending. Each append is also mirrored as one line to a
//! side file in the working directory, which is truncated when a run starts.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{Context, Result};

/// File name of the pid record kept in the working directory.
pub const RECORD_FILE: &str = ".procrack.pids";

/// Shared, append-only list of spawned pids in spawn order.
///
/// `PidRegistry::default()` keeps the list in memory only.
#[derive(Debug, Clone, Default)]
pub struct PidRegistry {
    pids: Arc<RwLock<Vec<u32>>>,
    record: Option<Arc<Mutex<Record>>>,
}

#[derive(Debug)]
struct Record {
    path: PathBuf,
    file: File,
}

impl PidRegistry {
    /// A registry mirrored to `path`. The file is truncated.
    pub fn with_record(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to reset pid record {}", path.display()))?;
        Ok(Self {
            pids: Arc::default(),
            record: Some(Arc::new(Mutex::new(Record {
                path: path.to_path_buf(),
                file,
            }))),
        })
    }

    /// Appends a pid. A failing disk mirror is logged, never fatal.
    pub fn register(&self, pid: u32) {
        self.pids
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(pid);
        if let Some(record) = &self.record {
            let mut record = record.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Err(err) = writeln!(record.file, "{}", pid) {
                tracing::warn!(
                    path = %record.path.display(),
                    %err,
                    "failed to append to pid record"
                );
            }
        }
    }

    /// The pid at `index`, if that many have been registered.
    pub fn get(&self, index: usize) -> Option<u32> {
        self.read().get(index).copied()
    }

    /// Copy of every pid registered so far, in spawn order.
    pub fn snapshot(&self) -> Vec<u32> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<u32>> {
        self.pids
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_spawn_order_across_clones() {
        let registry = PidRegistry::default();
        let handle = registry.clone();
        registry.register(30);
        handle.register(10);
        registry.register(20);
        assert_eq!(handle.snapshot(), vec![30, 10, 20]);
        assert_eq!(registry.get(1), Some(10));
        assert_eq!(registry.get(3), None);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn record_file_is_truncated_then_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RECORD_FILE);
        std::fs::write(&path, "999\n").unwrap();

        let registry = PidRegistry::with_record(&path).unwrap();
        assert!(registry.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        registry.register(1);
        registry.register(2);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1\n2\n");
    }

    #[test]
    fn snapshot_is_readable_while_appending() {
        let registry = PidRegistry::default();
        let writer = registry.clone();
        let handle = std::thread::spawn(move || {
            for pid in 0..100 {
                writer.register(pid);
            }
        });
        let partial = registry.snapshot();
        handle.join().unwrap();
        assert!(partial.len() <= 100);
        assert_eq!(partial, registry.snapshot()[..partial.len()].to_vec());
        assert_eq!(registry.len(), 100);
    }
}

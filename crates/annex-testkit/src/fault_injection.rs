//! Fault injection for index file storage.
//!
//! [`FlakyFileManager`] wraps a real [`FileManager`] and fails chosen calls
//! with an I/O error. Faults are counted per operation, so a plan such as
//! "fail the third `add_file`" reproduces exactly on every run.

use annex_core::{FileManager, IndexError, Result};
use parking_lot::Mutex;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Which calls fail. Call numbers start at 0 and count per operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    pub fail_add_at: Option<usize>,
    pub fail_load_at: Option<usize>,
    /// Report every file as absent.
    pub hide_files: bool,
}

impl FaultPlan {
    pub fn fail_add_at(call: usize) -> Self {
        Self {
            fail_add_at: Some(call),
            ..Self::default()
        }
    }

    pub fn fail_load_at(call: usize) -> Self {
        Self {
            fail_load_at: Some(call),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct CallCounts {
    add: usize,
    load: usize,
    injected: usize,
}

/// File manager that fails on a [`FaultPlan`].
#[derive(Debug)]
pub struct FlakyFileManager {
    inner: Arc<dyn FileManager>,
    plan: FaultPlan,
    counts: Mutex<CallCounts>,
}

impl FlakyFileManager {
    pub fn new(inner: Arc<dyn FileManager>, plan: FaultPlan) -> Self {
        Self {
            inner,
            plan,
            counts: Mutex::new(CallCounts::default()),
        }
    }

    /// Number of faults injected so far.
    pub fn injected(&self) -> usize {
        self.counts.lock().injected
    }

    fn fault(&self, op: &str, path: &Path) -> IndexError {
        self.counts.lock().injected += 1;
        tracing::debug!(op, path = %path.display(), "injecting file manager fault");
        IndexError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("injected {} failure for {}", op, path.display()),
        ))
    }
}

impl FileManager for FlakyFileManager {
    fn add_file(&self, path: &Path) -> Result<()> {
        let call = {
            let mut counts = self.counts.lock();
            counts.add += 1;
            counts.add - 1
        };
        if self.plan.fail_add_at == Some(call) {
            return Err(self.fault("add_file", path));
        }
        self.inner.add_file(path)
    }

    fn load_file(&self, path: &Path) -> Result<()> {
        let call = {
            let mut counts = self.counts.lock();
            counts.load += 1;
            counts.load - 1
        };
        if self.plan.fail_load_at == Some(call) {
            return Err(self.fault("load_file", path));
        }
        self.inner.load_file(path)
    }

    fn is_existed(&self, path: &Path) -> Result<bool> {
        if self.plan.hide_files {
            return Ok(false);
        }
        self.inner.is_existed(path)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.inner.remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annex_core::LocalFileManager;
    use tempfile::tempdir;

    #[test]
    fn test_fails_only_the_planned_call() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"x").unwrap();

        let flaky = FlakyFileManager::new(Arc::new(LocalFileManager::new()), FaultPlan::fail_add_at(1));
        assert!(flaky.add_file(&path).is_ok());
        assert!(matches!(flaky.add_file(&path), Err(IndexError::Io(_))));
        assert!(flaky.add_file(&path).is_ok());
        assert_eq!(flaky.injected(), 1);
        assert!(flaky.load_file(&path).is_ok());
    }

    #[test]
    fn test_hidden_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"x").unwrap();

        let plan = FaultPlan {
            hide_files: true,
            ..FaultPlan::default()
        };
        let flaky = FlakyFileManager::new(Arc::new(LocalFileManager::new()), plan);
        assert!(!flaky.is_existed(&path).unwrap());
        assert_eq!(flaky.injected(), 0);
    }
}

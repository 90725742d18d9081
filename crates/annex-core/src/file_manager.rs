//! File-manager capability for disk-resident indexes.
//!
//! A disk-resident backend writes its files locally during build, then hands
//! each path to [`FileManager::add_file`] so the host can persist it. Before
//! loading, it calls [`FileManager::load_file`] so the host can bring the
//! file back to the same local path.

use crate::Result;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Host-provided persistence for index files.
pub trait FileManager: Send + Sync + fmt::Debug {
    /// Persist a file the index wrote at `path`.
    fn add_file(&self, path: &Path) -> Result<()>;

    /// Make a previously added file available at `path`.
    fn load_file(&self, path: &Path) -> Result<()>;

    /// Whether a file was added under `path`.
    fn is_existed(&self, path: &Path) -> Result<bool>;

    /// Forget a previously added file.
    fn remove_file(&self, path: &Path) -> Result<()>;
}

/// Files live on the local filesystem already; nothing is copied.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileManager;

impl LocalFileManager {
    pub fn new() -> Self {
        Self
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} does not exist", path.display()),
    )
}

impl FileManager for LocalFileManager {
    fn add_file(&self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(not_found(path).into());
        }
        Ok(())
    }

    fn load_file(&self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(not_found(path).into());
        }
        Ok(())
    }

    fn is_existed(&self, path: &Path) -> Result<bool> {
        Ok(path.is_file())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)?;
        Ok(())
    }
}

/// Mirrors added files into a root directory and restores them on load.
///
/// Stands in for a remote object store: the local copy may be deleted after
/// `add_file` and `load_file` will bring it back.
#[derive(Debug)]
pub struct DirectoryFileManager {
    root: PathBuf,
    staged: Mutex<BTreeSet<PathBuf>>,
}

impl DirectoryFileManager {
    /// Mirror into `root`, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            staged: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local paths added so far, in sorted order.
    pub fn staged(&self) -> Vec<PathBuf> {
        self.staged.lock().iter().cloned().collect()
    }

    fn mirror_path(&self, path: &Path) -> PathBuf {
        let relative: PathBuf = path
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        self.root.join(relative)
    }
}

impl FileManager for DirectoryFileManager {
    fn add_file(&self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(not_found(path).into());
        }
        let mirror = self.mirror_path(path);
        if let Some(parent) = mirror.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = fs::copy(path, &mirror)?;
        self.staged.lock().insert(path.to_path_buf());
        tracing::debug!(path = %path.display(), bytes, "staged index file");
        Ok(())
    }

    fn load_file(&self, path: &Path) -> Result<()> {
        let mirror = self.mirror_path(path);
        if !mirror.is_file() {
            return Err(not_found(path).into());
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::copy(&mirror, path)?;
        Ok(())
    }

    fn is_existed(&self, path: &Path) -> Result<bool> {
        Ok(self.mirror_path(path).is_file())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mirror = self.mirror_path(path);
        if mirror.is_file() {
            fs::remove_file(&mirror)?;
        }
        self.staged.lock().remove(path);
        Ok(())
    }
}

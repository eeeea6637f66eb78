//! Verified recursive deletion of a directory tree.
//!
//! Entries are removed depth-first, contents before the directory holding
//! them. Each removal is followed by an existence check, so a delete the OS
//! accepted but did not carry out (an open handle on some platforms) is
//! reported instead of passing as success. The first failure stops the walk;
//! whatever was not yet removed stays on disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Filesystem operations used by the tree delete.
pub trait TreeOps {
    /// Whether `path` is a directory. Symlinks are not followed.
    fn is_dir(&self, path: &Path) -> io::Result<bool>;

    fn entries(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn remove_dir(&self, path: &Path) -> io::Result<()>;

    /// Whether anything exists at `path`, dangling symlinks included.
    fn exists(&self, path: &Path) -> bool;
}

/// [`TreeOps`] on the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdTreeOps;

impl TreeOps for StdTreeOps {
    fn is_dir(&self, path: &Path) -> io::Result<bool> {
        Ok(fs::symlink_metadata(path)?.is_dir())
    }

    fn entries(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect()
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }
}

/// What a successful tree delete removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub files: usize,
    pub directories: usize,
}

/// Deletes `root` and everything below it.
///
/// A missing root is not an error.
pub fn delete_tree(root: &Path) -> Result<CleanReport> {
    delete_tree_with(&StdTreeOps, root)
}

/// Deletes `root` and everything below it through `ops`.
pub fn delete_tree_with<O: TreeOps + ?Sized>(ops: &O, root: &Path) -> Result<CleanReport> {
    let mut report = CleanReport::default();
    if ops.exists(root) {
        remove(ops, root, &mut report)?;
    }
    Ok(report)
}

fn remove<O: TreeOps + ?Sized>(ops: &O, path: &Path, report: &mut CleanReport) -> Result<()> {
    let failed = |source| Error::DeletionFailed {
        path: path.to_path_buf(),
        source,
    };

    if ops.is_dir(path).map_err(failed)? {
        for entry in ops.entries(path).map_err(failed)? {
            remove(ops, &entry, report)?;
        }
        ops.remove_dir(path).map_err(failed)?;
        verify_gone(ops, path)?;
        report.directories += 1;
    } else {
        ops.remove_file(path).map_err(failed)?;
        verify_gone(ops, path)?;
        report.files += 1;
    }

    Ok(())
}

fn verify_gone<O: TreeOps + ?Sized>(ops: &O, path: &Path) -> Result<()> {
    if ops.exists(path) {
        return Err(Error::DeletionVerificationFailed {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

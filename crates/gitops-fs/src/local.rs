use std::path::{Path, PathBuf};

use gitops_core::{Cancellation, Error, Result};
use walkdir::WalkDir;

use crate::{DirEntry, FileStat, Filesystem};

/// A `Filesystem` backed by the real local disk. Directories are created
/// with mode `0755`, files written with mode `0664` (§4.6); both are
/// `#[cfg(unix)]`-gated, since the abstraction does not make file mode
/// portable (§6).
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    pub fn new() -> Self {
        Self
    }
}

impl Filesystem for LocalFilesystem {
    fn mkdir_all(&self, path: &Path, cancel: &Cancellation) -> Result<()> {
        cancel.check()?;
        std::fs::create_dir_all(path)?;
        set_dir_mode(path)?;
        Ok(())
    }

    fn remove(&self, path: &Path, cancel: &Cancellation) -> Result<()> {
        cancel.check()?;
        if path.is_dir() {
            std::fs::remove_dir_all(path)?;
        } else {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn stat(&self, path: &Path, cancel: &Cancellation) -> Result<FileStat> {
        cancel.check()?;
        let meta = std::fs::metadata(path)?;
        Ok(FileStat {
            is_dir: meta.is_dir(),
            len: meta.len(),
            checksum: mtime_nanos(&meta),
        })
    }

    fn read_dir(&self, path: &Path, cancel: &Cancellation) -> Result<Vec<DirEntry>> {
        cancel.check()?;
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            entries.push(DirEntry {
                is_dir: entry.file_type()?.is_dir(),
                path: entry.path(),
            });
        }
        Ok(entries)
    }

    fn exists(&self, path: &Path, cancel: &Cancellation) -> Result<bool> {
        cancel.check()?;
        Ok(path.exists())
    }

    fn read_file(&self, path: &Path, cancel: &Cancellation) -> Result<Vec<u8>> {
        cancel.check()?;
        Ok(std::fs::read(path)?)
    }

    fn write_file(&self, path: &Path, content: &[u8], cancel: &Cancellation) -> Result<()> {
        cancel.check()?;
        if let Some(parent) = path.parent() {
            self.mkdir_all(parent, cancel)?;
        }
        std::fs::write(path, content)?;
        set_file_mode(path)?;
        Ok(())
    }

    fn walk(&self, root: &Path, cancel: &Cancellation) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(root).into_iter() {
            cancel.check()?;
            let entry = entry.map_err(|e| Error::other(e.to_string()))?;
            if entry.file_type().is_file() {
                paths.push(entry.path().to_path_buf());
            }
        }
        Ok(paths)
    }
}

#[cfg(unix)]
fn set_dir_mode(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_dir_mode(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_file_mode(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o664))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_file_mode(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn mtime_nanos(meta: &std::fs::Metadata) -> String {
    use std::os::unix::fs::MetadataExt;
    let nanos = meta.mtime() as i128 * 1_000_000_000 + meta.mtime_nsec() as i128;
    nanos.to_string()
}

#[cfg(not(unix))]
fn mtime_nanos(meta: &std::fs::Metadata) -> String {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_reads_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFilesystem::new();
        let cancel = Cancellation::new();
        let path = dir.path().join("a/b/c.yaml");
        fs.write_file(&path, b"hello", &cancel).unwrap();
        assert_eq!(fs.read_file(&path, &cancel).unwrap(), b"hello");
        assert!(fs.exists(&path, &cancel).unwrap());
    }

    #[test]
    fn stat_reports_length_and_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFilesystem::new();
        let cancel = Cancellation::new();
        let path = dir.path().join("a.yaml");
        fs.write_file(&path, b"hello", &cancel).unwrap();
        let stat = fs.stat(&path, &cancel).unwrap();
        assert_eq!(stat.len, 5);
        assert!(!stat.checksum.is_empty());
    }

    #[test]
    fn walk_finds_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFilesystem::new();
        let cancel = Cancellation::new();
        fs.write_file(&dir.path().join("a/one.yaml"), b"1", &cancel).unwrap();
        fs.write_file(&dir.path().join("b/two.yaml"), b"2", &cancel).unwrap();
        let mut found = fs.walk(dir.path(), &cancel).unwrap();
        found.sort();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn remove_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFilesystem::new();
        let cancel = Cancellation::new();
        let path = dir.path().join("a.yaml");
        fs.write_file(&path, b"1", &cancel).unwrap();
        fs.remove(&path, &cancel).unwrap();
        assert!(!fs.exists(&path, &cancel).unwrap());
    }

    #[test]
    fn operations_fail_fast_when_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFilesystem::new();
        let cancel = Cancellation::new();
        cancel.cancel();
        let err = fs.write_file(&dir.path().join("a.yaml"), b"1", &cancel).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}

// Tue Oct 13 2026 - Alex

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Per-run scratch directory.
///
/// Without a scratch area it is a plain directory. With one, the path is a
/// symlink to a fresh uniquely named folder inside the scratch area, so heavy
/// intermediate I/O lands on the faster storage.
#[derive(Debug)]
pub struct TmpDir {
    path: PathBuf,
    scratch_target: Option<PathBuf>,
}

impl TmpDir {
    pub fn prepare(path: PathBuf, scratch_dir: Option<&Path>) -> io::Result<Self> {
        remove_path(&path)?;

        match scratch_dir {
            Some(scratch) => {
                let target = fs::canonicalize(scratch)?.join(Uuid::new_v4().to_string());
                fs::create_dir_all(&target)?;
                symlink_dir(&target, &path)?;
                log::debug!("tmp {} -> {}", path.display(), target.display());
                Ok(Self {
                    path,
                    scratch_target: Some(target),
                })
            }
            None => {
                fs::create_dir_all(&path)?;
                log::debug!("tmp {}", path.display());
                Ok(Self {
                    path,
                    scratch_target: None,
                })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scratch_target(&self) -> Option<&Path> {
        self.scratch_target.as_deref()
    }

    pub fn cleanup(self) -> io::Result<()> {
        remove_path(&self.path)?;
        if let Some(target) = &self.scratch_target {
            remove_path(target)?;
        }
        Ok(())
    }
}

/// Removes a file, a directory tree, or a symlink (not its target).
/// A missing path is not an error.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    if meta.file_type().is_symlink() {
        fs::remove_file(path).or_else(|_| fs::remove_dir(path))
    } else if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_tmp_dir_lifecycle() {
        let out = tempfile::tempdir().unwrap();
        let path = out.path().join("tmp");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("stale.txt"), "old").unwrap();

        let tmp = TmpDir::prepare(path.clone(), None).unwrap();
        assert!(path.is_dir());
        assert!(!path.join("stale.txt").exists());
        assert!(tmp.scratch_target().is_none());

        tmp.cleanup().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_scratch_tmp_dir_is_symlink() {
        let out = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let path = out.path().join("tmp");

        let tmp = TmpDir::prepare(path.clone(), Some(scratch.path())).unwrap();
        let meta = fs::symlink_metadata(&path).unwrap();
        assert!(meta.file_type().is_symlink());

        let resolved = fs::canonicalize(&path).unwrap();
        assert!(resolved.starts_with(fs::canonicalize(scratch.path()).unwrap()));
        fs::write(path.join("data.bin"), b"x").unwrap();
        let target = tmp.scratch_target().unwrap().to_path_buf();
        assert!(target.join("data.bin").is_file());

        tmp.cleanup().unwrap();
        assert!(fs::symlink_metadata(&path).is_err());
        assert!(!target.exists());
    }

    #[test]
    fn test_remove_missing_path_is_ok() {
        let out = tempfile::tempdir().unwrap();
        remove_path(&out.path().join("nothing-here")).unwrap();
    }
}

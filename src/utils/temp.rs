use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use crate::error::Result;

/// Allocates and removes intermediate files under one directory.
///
/// With `keep` set nothing is ever deleted, which leaves every intermediate
/// stage on disk for inspection.
#[derive(Debug)]
pub struct TempFiles {
    dir: PathBuf,
    keep: bool,
    counter: AtomicU64,
}

impl TempFiles {
    pub fn new<P: AsRef<Path>>(dir: P, keep: bool) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(TempFiles { dir: dir.as_ref().to_path_buf(), keep, counter: AtomicU64::new(0) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn keeps_files(&self) -> bool {
        self.keep
    }

    /// A fresh path `<dir>/<prefix><pid>.<n>`. The file is not created.
    pub fn allocate(&self, prefix: &str) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!("{}{}.{}", prefix, std::process::id(), n))
    }

    /// Remove an intermediate file that is no longer needed.
    pub fn discard(&self, path: &Path) -> Result<()> {
        if self.keep {
            tracing::debug!(path = %path.display(), "keeping temporary file");
            return Ok(());
        }
        match fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "deleted temporary file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_distinct_paths_and_honours_keep() {
        let dir = tempfile::tempdir().unwrap();
        let temp = TempFiles::new(dir.path().join("scratch"), false).unwrap();
        let a = temp.allocate("cnt.ent.");
        let b = temp.allocate("cnt.ent.");
        assert_ne!(a, b);
        fs::write(&a, "x").unwrap();
        temp.discard(&a).unwrap();
        assert!(!a.exists());
        temp.discard(&b).unwrap();

        let keep = TempFiles::new(dir.path(), true).unwrap();
        let c = keep.allocate("srt.");
        fs::write(&c, "x").unwrap();
        keep.discard(&c).unwrap();
        assert!(c.exists());
    }
}

use std::{
    ffi::OsString,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

/// A temporary file next to its destination that is removed unless committed.
struct PendingFile {
    path: PathBuf,
    file: Option<File>,
}

impl PendingFile {
    fn create(dest: &Path) -> io::Result<Self> {
        let mut name = OsString::from(dest.as_os_str());
        name.push(".tmp");

        let path = PathBuf::from(name);
        let file = File::create(&path)?;

        Ok(Self {
            path,
            file: Some(file),
        })
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let file = self.file.as_mut().ok_or_else(closed)?;
        file.write_all(bytes)?;
        file.sync_all()
    }

    /// Closes the file and moves it over `dest`.
    fn commit(mut self, dest: &Path) -> io::Result<()> {
        drop(self.file.take());
        fs::rename(&self.path, dest)?;
        self.path = PathBuf::new();
        Ok(())
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        drop(self.file.take());

        if !self.path.as_os_str().is_empty() {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn closed() -> io::Error {
    io::Error::other("pending checkpoint file already closed")
}

/// Replaces `dest` with `bytes` so readers see either the old or the new content.
///
/// The bytes go to `<dest>.tmp`, are flushed to disk and then renamed over
/// `dest`. On any failure the temporary file is removed and `dest` is untouched.
pub(super) fn write(dest: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(dir) = dest.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let mut pending = PendingFile::create(dest)?;
    pending.write_all(bytes)?;
    pending.commit(dest)?;

    if let Some(dir) = dest.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        // Persist the rename itself. Not every platform lets a directory be opened.
        if let Ok(dir) = File::open(dir) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("run_last.safetensors");

        write(&dest, b"first").unwrap();
        write(&dest, b"second").unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"second");
        assert!(!dir.path().join("run_last.safetensors.tmp").exists());
    }

    #[test]
    fn failed_write_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("run_last.safetensors");
        write(&dest, b"good").unwrap();

        // A directory squatting on the temporary name makes the write fail.
        fs::create_dir(dir.path().join("run_last.safetensors.tmp")).unwrap();

        assert!(write(&dest, b"bad").is_err());
        assert_eq!(fs::read(&dest).unwrap(), b"good");
    }
}

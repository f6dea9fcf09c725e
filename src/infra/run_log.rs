// ============================================================
// Layer 6 — Run Log
// ============================================================
// Plain-text, append-only record of one or more training runs
// (`erc.log` by default). The handle is created once by the
// application layer and passed down by reference, so nothing in
// the training core reaches for a global logger.
//
// Every line written here is mirrored as a tracing event, so the
// console shows the same progress the file records.

use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::domain::error::{ErcError, ErcResult};

#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl RunLog {
    /// Open `path` for appending, creating it and its parent directories.
    pub fn open(path: impl Into<PathBuf>) -> ErcResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ErcError::persistence(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ErcError::persistence(&path, e))?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line(&self, message: impl AsRef<str>) -> ErcResult<()> {
        let message = message.as_ref();
        tracing::info!("{}", message);

        let mut file = self
            .file
            .lock()
            .map_err(|_| ErcError::persistence(&self.path, "log handle poisoned"))?;
        writeln!(file, "{message}").map_err(|e| ErcError::persistence(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_are_appended_across_handles() {
        let tmp  = tempfile::tempdir().unwrap();
        let path = tmp.path().join("logs").join("erc.log");

        RunLog::open(&path).unwrap().line("Dev W-avg F1: 0.5").unwrap();
        RunLog::open(&path).unwrap().line("Dev W-avg F1: 0.6").unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Dev W-avg F1: 0.5\nDev W-avg F1: 0.6\n");
    }
}

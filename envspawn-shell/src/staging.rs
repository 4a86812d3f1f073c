//! Temporary activation scripts.

use std::io::{self, Write};
use std::path::Path;
use tempfile::TempPath;

const PREFIX: &str = "envspawn-";

/// A uniquely named script file that is removed when released or dropped.
#[derive(Debug)]
pub struct StagedScript {
    path: Option<TempPath>,
}

impl StagedScript {
    /// Write `content` to a new temp file ending in `.<extension>`.
    ///
    /// The file handle is closed before returning so the shell can open the
    /// file on every platform.
    pub fn create(content: &str, extension: &str) -> io::Result<Self> {
        let suffix = format!(".{extension}");
        let mut file = tempfile::Builder::new()
            .prefix(PREFIX)
            .suffix(&suffix)
            .tempfile()?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        let path = file.into_temp_path();
        tracing::debug!(path = %path.display(), bytes = content.len(), "staged activation script");
        Ok(Self { path: Some(path) })
    }

    pub fn path(&self) -> &Path {
        match &self.path {
            Some(path) => path,
            None => Path::new(""),
        }
    }

    /// Delete the file now, reporting failure.
    pub fn release(mut self) -> io::Result<()> {
        match self.path.take() {
            Some(path) => {
                let shown = path.display().to_string();
                path.close()?;
                tracing::debug!(path = %shown, "removed staged script");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for StagedScript {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let shown = path.display().to_string();
            if let Err(e) = path.close() {
                tracing::warn!(path = %shown, "failed to remove staged script: {e}");
            }
        }
    }
}

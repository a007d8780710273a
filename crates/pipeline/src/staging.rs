//! Per-request staging of uploaded files
//!
//! Every upload gets a uniquely named temporary file that is removed when the
//! [`StagedUpload`] is dropped, whichever way the request ends.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};
use tracing::debug;

use crate::errors::Result;

const PREFIX: &str = "csvision-";
const SUFFIX: &str = ".csv";

/// An uploaded CSV held in a temporary file
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    len: u64,
}

impl StagedUpload {
    /// Stage `bytes` under `dir`, or the system temp directory when `None`
    pub fn create(dir: Option<&Path>, bytes: &[u8]) -> Result<Self> {
        let dir: PathBuf = dir.map_or_else(std::env::temp_dir, Path::to_path_buf);
        let mut file = Builder::new().prefix(PREFIX).suffix(SUFFIX).tempfile_in(&dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        debug!(path = %file.path().display(), bytes = bytes.len(), "staged upload");

        Ok(Self {
            file,
            len: bytes.len() as u64,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fresh read handle positioned at the start of the file
    pub fn reopen(&self) -> Result<File> {
        let mut file = self.file.reopen()?;
        file.seek(SeekFrom::Start(0))?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_staged_file_is_removed_on_drop() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = {
            let staged = StagedUpload::create(Some(dir.path()), b"a,b\n1,2\n")?;
            assert!(staged.path().exists());
            assert_eq!(staged.len(), 8);

            let mut text = String::new();
            staged.reopen()?.read_to_string(&mut text)?;
            assert_eq!(text, "a,b\n1,2\n");
            staged.path().to_path_buf()
        };
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_names_are_unique() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let first = StagedUpload::create(Some(dir.path()), b"x")?;
        let second = StagedUpload::create(Some(dir.path()), b"x")?;
        assert_ne!(first.path(), second.path());

        let name = first
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        assert!(name.starts_with(PREFIX) && name.ends_with(SUFFIX));
        Ok(())
    }
}

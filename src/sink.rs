//! Output boundary: where finished artifacts go.
//!
//! Every sink takes `&self` and is `Sync`, so parallel pair workers can hand
//! their artifacts over directly. Implementations serialize concurrent stores
//! internally.
//!
//! | Sink | Result |
//! |---|---|
//! | [`DirectorySink`] | Loose files in an output directory |
//! | [`ZipSink`] | One in-memory ZIP archive |
//! | [`MemorySink`] | `(name, bytes)` list for in-memory callers |

use crate::imaging::OutputFormat;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;
use thiserror::Error;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Destination for encoded artifacts.
pub trait ArtifactSink: Sync {
    /// Store `bytes` under `name`. Returns where the artifact ended up.
    fn store(&self, name: &str, bytes: &[u8]) -> Result<String, SinkError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Writes each artifact as a file in one directory.
///
/// Bytes go to a temp file next to the target and are renamed into place, so
/// a failed or interrupted write never leaves a partial artifact behind.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Use `dir` as the output directory, creating it if missing.
    pub fn create(dir: &Path) -> Result<Self, SinkError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }
}

impl ArtifactSink for DirectorySink {
    fn store(&self, name: &str, bytes: &[u8]) -> Result<String, SinkError> {
        let target = self.dir.join(name);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(target.display().to_string())
    }
}

/// Builds a ZIP archive in memory. Entries are stored without compression.
pub struct ZipSink {
    writer: Mutex<ZipWriter<Cursor<Vec<u8>>>>,
}

impl ZipSink {
    pub fn new() -> Self {
        Self {
            writer: Mutex::new(ZipWriter::new(Cursor::new(Vec::new()))),
        }
    }

    /// Finalize the archive and return its bytes.
    pub fn finish(self) -> Result<Vec<u8>, SinkError> {
        let writer = self
            .writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(writer.finish()?.into_inner())
    }
}

impl Default for ZipSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactSink for ZipSink {
    fn store(&self, name: &str, bytes: &[u8]) -> Result<String, SinkError> {
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        let mut writer = lock(&self.writer);
        writer.start_file(name, options)?;
        writer.write_all(bytes)?;
        Ok(format!("zip:{name}"))
    }
}

/// Keeps artifacts in memory, in store order.
#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_entries(self) -> Vec<(String, Vec<u8>)> {
        self.entries
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ArtifactSink for MemorySink {
    fn store(&self, name: &str, bytes: &[u8]) -> Result<String, SinkError> {
        lock(&self.entries).push((name.to_string(), bytes.to_vec()));
        Ok(format!("memory:{name}"))
    }
}

/// `data:<mime>;base64,<payload>` link for an artifact.
pub fn data_uri(format: OutputFormat, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", format.mime_type(), STANDARD.encode(bytes))
}

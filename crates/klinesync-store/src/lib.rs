//! # klinesync store
//!
//! Whole-document JSON persistence for the klinesync data directory.
//!
//! Every document is written to a temporary file in the same directory and
//! then renamed over the target, so a reader sees either the previous
//! document or the new one, never a partial write.
//!
//! ## Layout
//!
//! | File | Content |
//! |------|---------|
//! | `raw_<source>_<from>_<to>.json` | one exchange's fetched records |
//! | `validated.json` | merged days that passed every rule |
//! | `anomalies.json` | rule violations keyed by kind |
//! | `analysis.json` | statistics over the validated days |
//!
//! ```rust,no_run
//! use klinesync_store::{DocumentStore, StoreConfig};
//!
//! fn main() -> Result<(), klinesync_store::StoreError> {
//!     let store = DocumentStore::open(StoreConfig::default())?;
//!     let days: Option<Vec<serde_json::Value>> = store.read_json(klinesync_store::VALIDATED_FILE)?;
//!     println!("{} days persisted", days.map_or(0, |days| days.len()));
//!     Ok(())
//! }
//! ```

use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub const VALIDATED_FILE: &str = "validated.json";
pub const ANOMALIES_FILE: &str = "anomalies.json";
pub const ANALYSIS_FILE: &str = "analysis.json";

const RAW_PREFIX: &str = "raw_";

/// Errors from reading or writing store documents.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File system failure on the given path.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Document could not be encoded or decoded.
    #[error("malformed document {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Document names are plain file names inside the store root.
    #[error("invalid document name '{0}'")]
    InvalidName(String),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory holding all documents.
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: resolve_home(),
        }
    }
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// JSON document store rooted at one directory.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    /// Opens the store, creating the root directory if needed.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.root).map_err(|error| StoreError::io(&config.root, error))?;
        Ok(Self { root: config.root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    pub fn exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.path_for(name)?.is_file())
    }

    /// Replaces the document `name` with `value`.
    pub fn write_json<T>(&self, name: &str, value: &T) -> Result<PathBuf, StoreError>
    where
        T: Serialize + ?Sized,
    {
        let path = self.path_for(name)?;
        let mut staged = tempfile::Builder::new()
            .prefix(".staged-")
            .suffix(".json")
            .tempfile_in(&self.root)
            .map_err(|error| StoreError::io(&self.root, error))?;

        {
            let mut writer = BufWriter::new(staged.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, value)
                .map_err(|error| StoreError::json(&path, error))?;
            writer.flush().map_err(|error| StoreError::io(&path, error))?;
        }
        staged
            .as_file()
            .sync_all()
            .map_err(|error| StoreError::io(&path, error))?;
        staged
            .persist(&path)
            .map_err(|error| StoreError::io(&path, error.error))?;

        tracing::debug!(path = %path.display(), "document written");
        Ok(path)
    }

    /// Reads the document `name`; `Ok(None)` if it was never written.
    pub fn read_json<T>(&self, name: &str) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned,
    {
        let path = self.path_for(name)?;
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(StoreError::io(&path, error)),
        };

        serde_json::from_reader(BufReader::new(file))
            .map(Some)
            .map_err(|error| StoreError::json(&path, error))
    }

    /// Raw per-source document names, sorted.
    pub fn raw_documents(&self) -> Result<Vec<String>, StoreError> {
        let entries = fs::read_dir(&self.root).map_err(|error| StoreError::io(&self.root, error))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|error| StoreError::io(&self.root, error))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with(RAW_PREFIX) && name.ends_with(".json") {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

/// `raw_<source>_<from>_<to>.json`
pub fn raw_document_name(source: &str, from: &str, to: &str) -> String {
    format!("{RAW_PREFIX}{source}_{from}_{to}.json")
}

/// Resolve the klinesync home directory from the process environment.
pub fn resolve_home() -> PathBuf {
    resolve_home_with(|name| env::var_os(name))
}

/// Resolve the klinesync home directory through `lookup`.
///
/// `KLINESYNC_HOME` wins when set and non-empty, then `$HOME/.klinesync`,
/// then `.klinesync` relative to the working directory.
pub fn resolve_home_with<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<OsString>,
{
    if let Some(path) = lookup("KLINESYNC_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = lookup("HOME") {
        return PathBuf::from(home).join(".klinesync");
    }

    PathBuf::from(".klinesync")
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let plain = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().is_some_and(|file| file == name);
    if plain {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_owned()))
    }
}

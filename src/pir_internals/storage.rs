//! Storage backends artifacts are read from.
//!
//! Components never touch the filesystem directly. They receive a `&dyn StorageBackend` and a location string, so whether a
//! location lives on local disk, in memory or on a distributed filesystem is decided once, when the backend is constructed.
//! Every handle handed out is owned by the caller and released when dropped, on success and on error paths alike.

use super::error::PirEncodeError;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader, Cursor, Read},
    path::PathBuf,
};

pub trait StorageBackend: Send + Sync {
    /// Opens `location` for buffered reading.
    fn open(&self, location: &str) -> Result<Box<dyn BufRead + '_>, PirEncodeError>;

    fn exists(&self, location: &str) -> bool;

    fn read_to_string(&self, location: &str) -> Result<String, PirEncodeError> {
        let mut reader = self.open(location)?;

        let mut contents = String::new();
        reader
            .read_to_string(&mut contents)
            .map_err(|e| PirEncodeError::StorageUnavailable(location.to_string(), e.to_string()))?;

        Ok(contents)
    }
}

/// Runs `f` over a reader scoped to this call; the underlying handle is closed before returning.
pub fn with_reader<T>(
    storage: &dyn StorageBackend,
    location: &str,
    f: impl FnOnce(&mut dyn BufRead) -> Result<T, PirEncodeError>,
) -> Result<T, PirEncodeError> {
    let mut reader = storage.open(location)?;
    f(&mut reader)
}

/// Which backend a worker reads its artifacts from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    Local {
        #[serde(default)]
        root: Option<PathBuf>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Local { root: None }
    }
}

impl StorageConfig {
    pub fn build(&self) -> Box<dyn StorageBackend> {
        match self {
            Self::Local { root } => Box::new(LocalStorage::new(root.clone())),
        }
    }
}

/// Local filesystem; relative locations resolve against `root` when one is set.
#[derive(Clone, Debug, Default)]
pub struct LocalStorage {
    root: Option<PathBuf>,
}

impl LocalStorage {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    fn resolve(&self, location: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(location),
            None => PathBuf::from(location),
        }
    }
}

impl StorageBackend for LocalStorage {
    fn open(&self, location: &str) -> Result<Box<dyn BufRead + '_>, PirEncodeError> {
        let file = File::open(self.resolve(location)).map_err(|e| PirEncodeError::StorageUnavailable(location.to_string(), e.to_string()))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn exists(&self, location: &str) -> bool {
        self.resolve(location).is_file()
    }
}

/// In-memory files keyed by location.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, location: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.files.insert(location.into(), contents.into());
        self
    }
}

impl StorageBackend for MemoryStorage {
    fn open(&self, location: &str) -> Result<Box<dyn BufRead + '_>, PirEncodeError> {
        match self.files.get(location) {
            Some(contents) => Ok(Box::new(Cursor::new(contents.as_slice()))),
            None => Err(PirEncodeError::StorageUnavailable(location.to_string(), "no such file".to_string())),
        }
    }

    fn exists(&self, location: &str) -> bool {
        self.files.contains_key(location)
    }
}

use crate::pir_internals::{error::PirEncodeError, params, storage::StorageConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_string_bits() -> usize {
    params::DEFAULT_STRING_BITS
}

fn default_array_length() -> usize {
    params::DEFAULT_ARRAY_LENGTH
}

/// Everything a responder worker is configured with. Built once at startup, then only passed around by reference.
///
/// Artifact locations are resolved by the configured storage backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponderConfig {
    /// Persisted query artifact.
    pub query_location: String,
    /// JSON file holding one data schema, or a list of them.
    pub data_schema_location: String,
    /// JSON file holding one query schema, or a list of them.
    pub query_schema_location: String,
    /// Newline-delimited term file, read if the query schema names the stoplist filter.
    #[serde(default)]
    pub stoplist_location: Option<String>,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Fixed bit width of `string` fields.
    #[serde(default = "default_string_bits")]
    pub string_bits: usize,
    /// Elements kept for array fields the query schema gives no length for.
    #[serde(default = "default_array_length")]
    pub default_array_length: usize,
}

impl ResponderConfig {
    pub fn new(query_location: impl Into<String>, data_schema_location: impl Into<String>, query_schema_location: impl Into<String>) -> Self {
        Self {
            query_location: query_location.into(),
            data_schema_location: data_schema_location.into(),
            query_schema_location: query_schema_location.into(),
            stoplist_location: None,
            storage: StorageConfig::default(),
            string_bits: default_string_bits(),
            default_array_length: default_array_length(),
        }
    }

    pub fn from_json(text: &str, location: &str) -> Result<Self, PirEncodeError> {
        let config = serde_json::from_str::<Self>(text).map_err(|e| PirEncodeError::MalformedArtifact(location.to_string(), e.to_string()))?;
        config.validate()?;

        Ok(config)
    }

    /// Reads the configuration file from the local filesystem.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PirEncodeError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| PirEncodeError::StorageUnavailable(path.display().to_string(), e.to_string()))?;

        Self::from_json(&text, &path.display().to_string())
    }

    pub fn validate(&self) -> Result<(), PirEncodeError> {
        if self.string_bits == 0 || self.string_bits % 8 != 0 {
            return Err(PirEncodeError::InvalidConfiguration(format!("string_bits must be a positive multiple of 8, found {}", self.string_bits)));
        }
        if self.default_array_length == 0 {
            return Err(PirEncodeError::InvalidConfiguration("default_array_length must be positive".to_string()));
        }

        Ok(())
    }
}

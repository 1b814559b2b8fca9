use super::{
    error::PirEncodeError,
    field_value::{DataRecord, value_as_selector},
    schema::{DataSchema, FilterSpec},
    storage::{self, StorageBackend},
};
use serde_json::Value;
use std::{
    collections::{HashMap, HashSet},
    io::BufRead,
    sync::Arc,
};

/// Identifier of the built-in stoplist filter, as named by query schemas.
pub const STOPLIST_FILTER_NAME: &str = "stoplist";

/// Decides, before encoding, whether a record takes part in the response.
pub trait DataFilter: Send + Sync {
    /// Returns `true` if the record passes the filter and must be encoded.
    fn filter_data_element(&self, record: &DataRecord, data_schema: &DataSchema) -> bool;
}

/// Drops records whose filtered fields hold a blocklisted term, or a subdomain of one.
#[derive(Clone, Debug)]
pub struct StopListFilter {
    element_names: Vec<String>,
    stop_list: HashSet<String>,
}

impl StopListFilter {
    pub fn new(element_names: Vec<String>, stop_list: HashSet<String>) -> Self {
        Self { element_names, stop_list }
    }

    /// Reads a newline-delimited term file. Blank lines are ignored and terms are trimmed.
    pub fn load(storage: &dyn StorageBackend, location: &str, element_names: Vec<String>) -> Result<Self, PirEncodeError> {
        let stop_list = storage::with_reader(storage, location, |reader| {
            let mut terms = HashSet::new();

            for line in reader.lines() {
                let line = line.map_err(|e| PirEncodeError::StorageUnavailable(location.to_string(), e.to_string()))?;
                let term = line.trim();

                if !term.is_empty() {
                    terms.insert(term.to_string());
                }
            }

            Ok(terms)
        })?;

        Ok(Self::new(element_names, stop_list))
    }

    pub fn len(&self) -> usize {
        self.stop_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stop_list.is_empty()
    }

    /// `value` is stopped when it, or any dot-separated suffix of it, is on the list.
    pub fn is_stopped(&self, value: &str) -> bool {
        let mut candidate = value;

        loop {
            if self.stop_list.contains(candidate) {
                return true;
            }

            match candidate.split_once('.') {
                Some((_, parent)) if !parent.is_empty() => candidate = parent,
                _ => return false,
            }
        }
    }
}

impl DataFilter for StopListFilter {
    fn filter_data_element(&self, record: &DataRecord, data_schema: &DataSchema) -> bool {
        for name in &self.element_names {
            let Some(raw) = record.get(name) else {
                continue;
            };

            let is_array = data_schema.element(name).is_some_and(|e| e.is_array);
            let stopped = match raw {
                Value::Array(values) if is_array => values.iter().any(|v| self.is_stopped(&value_as_selector(v))),
                other => self.is_stopped(&value_as_selector(other)),
            };

            if stopped {
                return false;
            }
        }

        true
    }
}

/// Startup-time registry of filters a query schema may name: the built-in stoplist plus explicitly registered ones.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    custom: HashMap<String, Arc<dyn DataFilter>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, filter: Arc<dyn DataFilter>) -> Self {
        self.custom.insert(name.into(), filter);
        self
    }

    /// Instantiates the filter named by a query schema, if it names one.
    ///
    /// # Arguments
    ///
    /// * `spec` - Filter section of the query schema.
    /// * `stoplist_location` - Term file for the built-in stoplist filter.
    /// * `storage` - Backend the term file is read from.
    pub fn build(
        &self,
        spec: Option<&FilterSpec>,
        stoplist_location: Option<&str>,
        storage: &dyn StorageBackend,
    ) -> Result<Option<Arc<dyn DataFilter>>, PirEncodeError> {
        let Some(spec) = spec else {
            return Ok(None);
        };

        if let Some(filter) = self.custom.get(&spec.name) {
            return Ok(Some(filter.clone()));
        }

        match spec.name.to_ascii_lowercase().as_str() {
            STOPLIST_FILTER_NAME | "stop-list" | "stoplistfilter" => {
                let location = stoplist_location
                    .ok_or_else(|| PirEncodeError::InvalidConfiguration("stoplist filter requires a stoplist file location".to_string()))?;

                let filter = StopListFilter::load(storage, location, spec.element_names.clone())?;
                tracing::info!(terms = filter.len(), location, "loaded stoplist");

                Ok(Some(Arc::new(filter)))
            }
            _ => Err(PirEncodeError::UnknownFilter(spec.name.clone())),
        }
    }
}

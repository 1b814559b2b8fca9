use crate::{
    config::ResponderConfig,
    pir_internals::{
        branch_opt_util,
        engine::{EncodedRecord, HashAndPartitionEngine, RecordOutcome, RunReport},
        error::{ErrorKind, PirEncodeError},
        exp_table::{ExpTable, ModPow, SquareAndMultiply},
        field_value::DataRecord,
        filter::FilterRegistry,
        query::QueryContext,
        schema::{DataSchema, QuerySchema},
        storage::StorageBackend,
    },
};
use std::io::BufRead;

/// A responder worker, holding everything loaded at startup: the query, and the engine built for its query schema.
///
/// Both jobs only borrow the responder immutably, so one instance serves any number of threads.
pub struct Responder {
    query: QueryContext,
    engine: HashAndPartitionEngine,
}

impl Responder {
    /// Sets up a worker reading its artifacts from the storage backend named in `config`.
    pub fn setup(config: &ResponderConfig) -> Result<Self, PirEncodeError> {
        let storage = config.storage.build();
        Self::setup_with_storage(config, storage.as_ref())
    }

    /// Sets up a worker reading its artifacts from `storage`, with only the built-in filters available.
    pub fn setup_with_storage(config: &ResponderConfig, storage: &dyn StorageBackend) -> Result<Self, PirEncodeError> {
        Self::setup_with_filters(config, storage, &FilterRegistry::new())
    }

    /// Loads the query and every schema, selects the schemas the query was built for, and resolves its record layout.
    ///
    /// Any failure here is fatal for the worker: nothing can be encoded without a valid query and matching schemas.
    ///
    /// # Arguments
    ///
    /// * `config` - Artifact locations and encoding parameters.
    /// * `storage` - Backend every artifact location is resolved against.
    /// * `filters` - Filters the query schema may name, in addition to the built-in stoplist.
    pub fn setup_with_filters(config: &ResponderConfig, storage: &dyn StorageBackend, filters: &FilterRegistry) -> Result<Self, PirEncodeError> {
        config.validate()?;

        let query = QueryContext::load(storage, &config.query_location)?;
        let data_schemas = DataSchema::load_all(storage, &config.data_schema_location)?;
        let query_schemas = QuerySchema::load_all(storage, &config.query_schema_location)?;

        let query_schema = QuerySchema::find(&query_schemas, &query.info().query_type)?.clone();
        let data_schema = DataSchema::find(&data_schemas, &query_schema.data_schema_name)?.clone();

        let filter = filters.build(query_schema.filter.as_ref(), config.stoplist_location.as_deref(), storage)?;
        let engine = HashAndPartitionEngine::new(&query, data_schema, query_schema, filter, config.string_bits, config.default_array_length)?;

        tracing::info!(
            query = %query.info().identifier,
            query_type = %query.info().query_type,
            width = query.width(),
            data_partition_bit_size = query.info().data_partition_bit_size,
            num_partitions = engine.expected_num_partitions(),
            "responder ready"
        );

        Ok(Self { query, engine })
    }

    pub fn query(&self) -> &QueryContext {
        &self.query
    }

    pub fn engine(&self) -> &HashAndPartitionEngine {
        &self.engine
    }

    /// Exponentiation tables of the query elements at `indices`, using square-and-multiply.
    pub fn build_exp_table(&self, indices: &[usize]) -> Result<ExpTable, PirEncodeError> {
        self.build_exp_table_with(indices, &SquareAndMultiply)
    }

    /// Exponentiation tables of every element of the query vector.
    pub fn build_full_exp_table(&self) -> Result<ExpTable, PirEncodeError> {
        let indices = (0..self.query.width()).collect::<Vec<_>>();
        self.build_exp_table(&indices)
    }

    pub fn build_exp_table_with(&self, indices: &[usize], mod_pow: &dyn ModPow) -> Result<ExpTable, PirEncodeError> {
        if branch_opt_util::unlikely(indices.is_empty()) {
            return Err(PirEncodeError::InvalidConfiguration("no query indices to build exponentiation tables for".to_string()));
        }

        let table = ExpTable::build(&self.query, indices, mod_pow)?;
        tracing::info!(num_indices = table.indices().count(), max_value = table.max_value(), num_entries = table.len(), "exponentiation table built");

        Ok(table)
    }

    pub fn hash_and_partition(&self, records: &[DataRecord]) -> (Vec<EncodedRecord>, RunReport) {
        self.engine.process_batch(records)
    }

    /// Hashes and partitions JSON-lines input, one record object per line.
    ///
    /// Blank lines are ignored. Lines which aren't UTF-8 encoded JSON objects are counted as skipped schema violations. Only
    /// failing to read the input is an error.
    pub fn hash_and_partition_json_lines(
        &self,
        reader: &mut dyn BufRead,
        location: &str,
    ) -> Result<(Vec<EncodedRecord>, RunReport), PirEncodeError> {
        let mut records = Vec::new();
        let mut unparsable = RunReport::default();

        for (line_idx, line) in reader.split(b'\n').enumerate() {
            let line = line.map_err(|e| PirEncodeError::StorageUnavailable(location.to_string(), e.to_string()))?;
            let line = match String::from_utf8(line) {
                Ok(line) => line,
                Err(err) => {
                    tracing::warn!(line = line_idx + 1, error = %err, "skipping undecodable record");
                    unparsable.record(&RecordOutcome::Skipped(ErrorKind::RecordSchemaViolation));
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match DataRecord::from_json_str(&line) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(line = line_idx + 1, error = %err, "skipping unparsable record");
                    unparsable.record(&RecordOutcome::Skipped(err.kind()));
                }
            }
        }

        let (encoded, report) = self.hash_and_partition(&records);
        Ok((encoded, report.merge(unparsable)))
    }
}

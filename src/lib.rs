//! pir_encode: Responder-side encoding layer of a Paillier-style **P**rivate **I**nformation **R**etrieval (PIR) scheme.
//!
//! Before a responder can homomorphically combine an encrypted query with its dataset, two things have to be prepared.
//! This crate prepares both, without learning anything about which record the client asked for.
//!
//! ## Features
//!
//! * **Exponentiation tables:** For each encrypted query element `e`, precomputes `e^p mod N^2` for every value `p` a data partition can take, in parallel and deterministically.
//! * **Selector hashing:** Maps each record's selector onto a cell of the query hypercube, using TurboSHAKE128 keyed by the query's hash key, so client and responder agree on placement.
//! * **Fixed-width partitioning:** Splits every record into a sequence of fixed-width chunks whose length only depends on the query schema, padding absent fields and arrays.
//! * **Filtering:** Drops records before encoding, using the built-in stoplist filter or any registered `DataFilter`.
//! * **Error isolation:** Malformed records are skipped and counted in a `RunReport`, they never abort a run. Broken query artifacts or schemas fail at startup.
//!
//! ## Usage
//!
//! Add pir_encode as dependency to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! pir_encode = "=0.1.0"
//! ```
//!
//! Then, set up a responder from its query and schema artifacts and run both jobs:
//!
//! ```rust
//! use pir_encode::{DataRecord, MemoryStorage, Responder, ResponderConfig};
//!
//! let storage = MemoryStorage::new()
//!     .with_file(
//!         "query.json",
//!         r#"{ "query_info": { "identifier": "q-1", "query_type": "by-user", "data_partition_bit_size": 8, "hash_key": "k" },
//!              "n_squared": "143", "query_elements": ["2", "3", "5", "7"] }"#,
//!     )
//!     .with_file("data_schema.json", r#"{ "schema_name": "users", "elements": [{ "name": "user", "type": "string" }, { "name": "age", "type": "short" }] }"#)
//!     .with_file("query_schema.json", r#"{ "schema_name": "by-user", "data_schema_name": "users", "selector_name": "user", "element_names": ["age"] }"#);
//!
//! let config = ResponderConfig::new("query.json", "data_schema.json", "query_schema.json");
//! let responder = Responder::setup_with_storage(&config, &storage)?;
//!
//! // Every power an 8-bit chunk can take, for query elements 0 and 3
//! let table = responder.build_exp_table(&[0, 3])?;
//! assert_eq!(table.get(3, 2).map(|v| v.to_string()), Some("49".to_string()));
//!
//! // A hypercube cell and two 8-bit chunks per record
//! let records = vec![DataRecord::from_json_str(r#"{ "user": "user123", "age": 42 }"#)?];
//! let (encoded, report) = responder.hash_and_partition(&records);
//!
//! assert_eq!(encoded[0].partitions.len(), 2);
//! assert_eq!(report.emitted, 1);
//! # Ok::<(), pir_encode::PirEncodeError>(())
//! ```
//!
//! ## Modules
//!
//! * `config`: Contains `ResponderConfig`, the immutable worker configuration, loaded from a JSON file.
//! * `responder`: Contains the `Responder` struct, which loads the query and schemas at startup and runs both encoding jobs.
//!
//! Building blocks (codecs, hasher, table builder, filters, storage backends) are re-exported at the crate root.

pub use pir_internals::date_partitioner::{Iso8601DatePartitioner, format_iso8601_millis, parse_iso8601_millis};
pub use pir_internals::engine::{EncodedRecord, HashAndPartitionEngine, RecordOutcome, RunReport};
pub use pir_internals::error::{ErrorKind, PirEncodeError};
pub use pir_internals::exp_table::{ExpTable, ExpTableBuilder, ModPow, SquareAndMultiply};
pub use pir_internals::field_value::{DataRecord, FieldValue, PrimitiveType};
pub use pir_internals::filter::{DataFilter, FilterRegistry, STOPLIST_FILTER_NAME, StopListFilter};
pub use pir_internals::ip_partitioner::IpPartitioner;
pub use pir_internals::partitioner::{DataPartitioner, PartitionerKind, PartitionerRegistry};
pub use pir_internals::primitive_partitioner::PrimitivePartitioner;
pub use pir_internals::query::{QueryContext, QueryInfo};
pub use pir_internals::schema::{DataElement, DataSchema, FilterSpec, QuerySchema};
pub use pir_internals::selector_hash::{MAX_HYPERCUBE_WIDTH, SelectorHasher, embedded_selector_digest};
pub use pir_internals::storage::{LocalStorage, MemoryStorage, StorageBackend, StorageConfig};
pub mod config;
pub mod responder;

pub use config::ResponderConfig;
pub use responder::Responder;

mod pir_internals;

mod test_responder;

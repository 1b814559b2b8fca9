use super::{
    error::{ErrorKind, PirEncodeError},
    field_value::{DataRecord, FieldValue, PrimitiveType, value_as_selector},
    filter::DataFilter,
    partitioner::{PartitionerKind, PartitionerRegistry},
    query::QueryContext,
    schema::{DataElement, DataSchema, QuerySchema},
    selector_hash::{SelectorHasher, embedded_selector_digest},
};
use num_bigint::BigUint;
use rayon::prelude::*;
use serde_json::Value;
use std::{collections::BTreeMap, fmt::Display, sync::Arc};

/// One admitted record: the hypercube cell its selector hashes to, and its fixed-width partition sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedRecord {
    pub hash_index: u32,
    pub partitions: Vec<BigUint>,
}

impl EncodedRecord {
    /// Each partition as a minimal big-endian byte array. Zero serializes as a single zero byte.
    pub fn chunk_bytes(&self) -> Vec<Vec<u8>> {
        self.partitions.iter().map(BigUint::to_bytes_be).collect()
    }
}

/// What happened to a single record.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordOutcome {
    Emitted(EncodedRecord),
    /// Rejected by the query schema's filter.
    Filtered,
    Skipped(ErrorKind),
}

/// Counters of a hash-and-partition run. Reports of disjoint inputs are combined with [`RunReport::merge`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub total_records: u64,
    pub emitted: u64,
    pub filtered: u64,
    pub skipped: BTreeMap<ErrorKind, u64>,
}

impl RunReport {
    pub fn record(&mut self, outcome: &RecordOutcome) {
        self.total_records += 1;

        match outcome {
            RecordOutcome::Emitted(_) => self.emitted += 1,
            RecordOutcome::Filtered => self.filtered += 1,
            RecordOutcome::Skipped(kind) => *self.skipped.entry(*kind).or_default() += 1,
        }
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.total_records += other.total_records;
        self.emitted += other.emitted;
        self.filtered += other.filtered;
        for (kind, count) in other.skipped {
            *self.skipped.entry(kind).or_default() += count;
        }

        self
    }

    pub fn num_skipped(&self) -> u64 {
        self.skipped.values().sum()
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} records: {} emitted, {} filtered, {} skipped", self.total_records, self.emitted, self.filtered, self.num_skipped())?;

        if !self.skipped.is_empty() {
            let per_kind = self.skipped.iter().map(|(kind, count)| format!("{}={}", kind, count)).collect::<Vec<_>>();
            write!(f, " ({})", per_kind.join(", "))?;
        }

        Ok(())
    }
}

/// Position of one query schema field in the emitted partition sequence.
#[derive(Clone, Debug)]
struct FieldLayout {
    name: String,
    ty: PrimitiveType,
    partitioner: PartitionerKind,
    /// `Some(L)` for array fields, which always occupy exactly `L` elements.
    array_len: Option<usize>,
    required: bool,
    num_partitions: usize,
}

/// How the selector is prepended to the partitions, when the query asks for it.
#[derive(Clone, Debug)]
enum EmbeddedSelector {
    /// String selectors are replaced by a 32-bit digest, encoded as an `int`.
    Digest { num_partitions: usize },
    /// Everything else is partitioned with its own codec.
    Value { num_partitions: usize },
}

/// Turns records into `(hash index, partition sequence)` pairs for one query.
///
/// Holds only read-only state, so a single engine is shared by every thread of a worker.
pub struct HashAndPartitionEngine {
    hasher: SelectorHasher,
    partitioners: PartitionerRegistry,
    data_schema: DataSchema,
    query_schema: QuerySchema,
    filter: Option<Arc<dyn DataFilter>>,
    selector: DataElement,
    embedded_selector: Option<EmbeddedSelector>,
    fields: Vec<FieldLayout>,
    num_partitions: usize,
}

impl HashAndPartitionEngine {
    /// Resolves the record layout of a query schema.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Loaded query, provides the hash key, hypercube width and chunk width.
    /// * `data_schema` - Declared types of the input records.
    /// * `query_schema` - Selector and fields to encode; must refer to `data_schema`.
    /// * `filter` - Optional predicate applied before encoding.
    /// * `string_bits` - Fixed width of `string` fields.
    /// * `default_array_length` - Number of elements kept for array fields the query schema gives no length for.
    ///
    /// # Returns
    ///
    /// Fails with a configuration error if the schemas don't agree, or if the query's chunk width isn't usable.
    pub fn new(
        ctx: &QueryContext,
        data_schema: DataSchema,
        query_schema: QuerySchema,
        filter: Option<Arc<dyn DataFilter>>,
        string_bits: usize,
        default_array_length: usize,
    ) -> Result<Self, PirEncodeError> {
        query_schema.validate(&data_schema)?;

        let hasher = ctx.selector_hasher()?;
        let partitioners = PartitionerRegistry::new(ctx.info().data_partition_bit_size, string_bits)?;

        let selector = data_schema
            .element(&query_schema.selector_name)
            .cloned()
            .ok_or_else(|| PirEncodeError::InvalidConfiguration(format!("selector '{}' isn't declared", query_schema.selector_name)))?;

        let embedded_selector = ctx.info().embed_selector.then(|| {
            if selector.ty == PrimitiveType::String && selector.partitioner == PartitionerKind::Primitive {
                EmbeddedSelector::Digest {
                    num_partitions: partitioners.get(PartitionerKind::Primitive).num_partitions(PrimitiveType::Int),
                }
            } else {
                EmbeddedSelector::Value {
                    num_partitions: partitioners.get(selector.partitioner).num_partitions(selector.ty),
                }
            }
        });

        let mut fields = Vec::with_capacity(query_schema.element_names.len());
        for name in &query_schema.element_names {
            let element = data_schema
                .element(name)
                .ok_or_else(|| PirEncodeError::InvalidConfiguration(format!("element '{}' isn't declared", name)))?;

            let array_len = element.is_array.then(|| query_schema.array_length(name, default_array_length));
            let per_value = partitioners.get(element.partitioner).num_partitions(element.ty);

            fields.push(FieldLayout {
                name: name.clone(),
                ty: element.ty,
                partitioner: element.partitioner,
                array_len,
                required: query_schema.is_required(name),
                num_partitions: per_value * array_len.unwrap_or(1),
            });
        }

        let num_partitions = fields.iter().map(|f| f.num_partitions).sum::<usize>()
            + match embedded_selector {
                Some(EmbeddedSelector::Digest { num_partitions } | EmbeddedSelector::Value { num_partitions }) => num_partitions,
                None => 0,
            };

        tracing::debug!(query_schema = %query_schema.schema_name, num_fields = fields.len(), num_partitions, "resolved record layout");

        Ok(Self {
            hasher,
            partitioners,
            data_schema,
            query_schema,
            filter,
            selector,
            embedded_selector,
            fields,
            num_partitions,
        })
    }

    /// Length of every emitted partition sequence.
    pub fn expected_num_partitions(&self) -> usize {
        self.num_partitions
    }

    pub fn data_schema(&self) -> &DataSchema {
        &self.data_schema
    }

    pub fn query_schema(&self) -> &QuerySchema {
        &self.query_schema
    }

    /// Encodes a record, returning `None` if the filter rejects it. Only per-record errors are returned.
    pub fn encode_record(&self, record: &DataRecord) -> Result<Option<EncodedRecord>, PirEncodeError> {
        if let Some(filter) = &self.filter {
            if !filter.filter_data_element(record, &self.data_schema) {
                return Ok(None);
            }
        }

        let raw_selector = record
            .get(&self.selector.name)
            .ok_or_else(|| PirEncodeError::schema_violation(&self.selector.name, "selector is missing"))?;
        let selector_partitioner = self.partitioners.get(self.selector.partitioner);
        let selector_value = selector_partitioner.coerce(&self.selector.name, raw_selector, self.selector.ty)?;

        let selector = value_as_selector(raw_selector);
        let hash_index = self.hasher.hash(&selector);

        let mut partitions = Vec::with_capacity(self.num_partitions);
        match self.embedded_selector {
            Some(EmbeddedSelector::Digest { .. }) => {
                let digest = FieldValue::Int(embedded_selector_digest(&selector));
                partitions.extend(self.partitioners.get(PartitionerKind::Primitive).to_partitions(&self.selector.name, &digest, PrimitiveType::Int)?);
            }
            Some(EmbeddedSelector::Value { .. }) => {
                partitions.extend(selector_partitioner.to_partitions(&self.selector.name, &selector_value, self.selector.ty)?);
            }
            None => {}
        }

        for field in &self.fields {
            partitions.extend(self.encode_field(field, record)?);
        }

        debug_assert_eq!(partitions.len(), self.num_partitions);
        Ok(Some(EncodedRecord { hash_index, partitions }))
    }

    fn encode_field(&self, field: &FieldLayout, record: &DataRecord) -> Result<Vec<BigUint>, PirEncodeError> {
        let partitioner = self.partitioners.get(field.partitioner);

        let Some(raw) = record.get(&field.name) else {
            if field.required {
                return Err(PirEncodeError::schema_violation(&field.name, "required field is missing"));
            }

            return Ok(match field.array_len {
                Some(array_len) => partitioner.array_to_partitions(&field.name, &[], field.ty, array_len)?,
                None => partitioner.padded_partitions(field.ty),
            });
        };

        match field.array_len {
            Some(array_len) => {
                let elements = match raw {
                    Value::Array(values) => values.as_slice(),
                    scalar => std::slice::from_ref(scalar),
                };

                let mut parts = Vec::with_capacity(array_len * partitioner.num_partitions(field.ty));
                for element in elements.iter().take(array_len) {
                    // null elements are absent, same as null fields
                    if element.is_null() {
                        parts.extend(partitioner.padded_partitions(field.ty));
                    } else {
                        let value = partitioner.coerce(&field.name, element, field.ty)?;
                        parts.extend(partitioner.to_partitions(&field.name, &value, field.ty)?);
                    }
                }
                parts.extend(partitioner.array_to_partitions(&field.name, &[], field.ty, array_len.saturating_sub(elements.len()))?);

                Ok(parts)
            }
            None => {
                let value = partitioner.coerce(&field.name, raw, field.ty)?;
                partitioner.to_partitions(&field.name, &value, field.ty)
            }
        }
    }

    /// Encodes a record, turning per-record failures into a skip. Never fails the run.
    pub fn process_record(&self, record: &DataRecord) -> RecordOutcome {
        match self.encode_record(record) {
            Ok(Some(encoded)) => {
                tracing::debug!(hash_index = encoded.hash_index, "emitted record");
                RecordOutcome::Emitted(encoded)
            }
            Ok(None) => RecordOutcome::Filtered,
            Err(err) => {
                tracing::warn!(kind = %err.kind(), error = %err, "skipping record");
                RecordOutcome::Skipped(err.kind())
            }
        }
    }

    /// Encodes records in parallel. Emitted records keep the relative order of their inputs.
    pub fn process_batch(&self, records: &[DataRecord]) -> (Vec<EncodedRecord>, RunReport) {
        let (encoded, report) = records
            .par_iter()
            .map(|record| self.process_record(record))
            .fold(
                || (Vec::new(), RunReport::default()),
                |(mut encoded, mut report), outcome| {
                    report.record(&outcome);
                    if let RecordOutcome::Emitted(record) = outcome {
                        encoded.push(record);
                    }

                    (encoded, report)
                },
            )
            .reduce(
                || (Vec::new(), RunReport::default()),
                |(mut lhs_encoded, lhs_report), (rhs_encoded, rhs_report)| {
                    lhs_encoded.extend(rhs_encoded);
                    (lhs_encoded, lhs_report.merge(rhs_report))
                },
            );

        tracing::info!(
            total = report.total_records,
            emitted = report.emitted,
            filtered = report.filtered,
            skipped = report.num_skipped(),
            "hash and partition batch done"
        );

        (encoded, report)
    }

    /// Reads typed values back out of an emitted partition sequence, in the order they were encoded.
    ///
    /// An embedded selector comes first, under the selector's field name. Absent fields decode to the zero value of their type.
    pub fn decode_record(&self, parts: &[BigUint]) -> Result<Vec<(String, FieldValue)>, PirEncodeError> {
        if parts.len() != self.num_partitions {
            return Err(PirEncodeError::schema_violation(
                "<record>",
                format!("expected {} partitions, found {}", self.num_partitions, parts.len()),
            ));
        }

        let mut decoded = Vec::with_capacity(self.fields.len() + 1);
        let mut offset = 0;

        match self.embedded_selector {
            Some(EmbeddedSelector::Digest { num_partitions }) => {
                let digest = self.partitioners.get(PartitionerKind::Primitive).from_partitions(parts, offset, PrimitiveType::Int)?;
                decoded.push((self.selector.name.clone(), digest));
                offset += num_partitions;
            }
            Some(EmbeddedSelector::Value { num_partitions }) => {
                let value = self.partitioners.get(self.selector.partitioner).from_partitions(parts, offset, self.selector.ty)?;
                decoded.push((self.selector.name.clone(), value));
                offset += num_partitions;
            }
            None => {}
        }

        for field in &self.fields {
            let partitioner = self.partitioners.get(field.partitioner);

            let value = match field.array_len {
                Some(array_len) => FieldValue::Array(partitioner.array_from_partitions(parts, offset, field.ty, array_len)?),
                None => partitioner.from_partitions(parts, offset, field.ty)?,
            };

            decoded.push((field.name.clone(), value));
            offset += field.num_partitions;
        }

        Ok(decoded)
    }
}

#[cfg(test)]
mod test {
    use super::{EncodedRecord, HashAndPartitionEngine, RecordOutcome, RunReport};
    use crate::pir_internals::{
        error::ErrorKind,
        field_value::{DataRecord, FieldValue},
        filter::{DataFilter, StopListFilter},
        query::{QueryContext, QueryInfo},
        schema::{DataSchema, QuerySchema},
        selector_hash::{SelectorHasher, embedded_selector_digest},
    };
    use chrono::{DateTime, Utc};
    use num_bigint::BigUint;
    use serde_json::json;
    use std::{collections::HashSet, net::Ipv4Addr, sync::Arc};
    use test_case::test_case;

    const WIDTH: usize = 1024;
    const DATA_PARTITION_BIT_SIZE: usize = 8;
    const STRING_BITS: usize = 64;

    const DATA_SCHEMA: &str = r#"{
        "schema_name": "dns",
        "elements": [
            { "name": "qname", "type": "string" },
            { "name": "date", "type": "string", "partitioner": "iso8601-date" },
            { "name": "ips", "type": "string", "is_array": true, "partitioner": "ip" },
            { "name": "ttl", "type": "int" },
            { "name": "rcode", "type": "byte" }
        ]
    }"#;

    const QUERY_SCHEMA: &str = r#"{
        "schema_name": "dns-by-qname",
        "data_schema_name": "dns",
        "selector_name": "qname",
        "element_names": ["date", "ips", "ttl", "rcode"],
        "array_lengths": { "ips": 2 },
        "required_element_names": ["date"]
    }"#;

    fn query_context(embed_selector: bool) -> QueryContext {
        let info = QueryInfo {
            identifier: "q-1".to_string(),
            query_type: "dns-by-qname".to_string(),
            data_partition_bit_size: DATA_PARTITION_BIT_SIZE,
            hash_key: "secret".to_string(),
            embed_selector,
        };

        QueryContext::new(info, vec![BigUint::from(2u32); WIDTH], BigUint::from(143u32)).expect("valid query")
    }

    fn engine(embed_selector: bool, filter: Option<Arc<dyn DataFilter>>) -> HashAndPartitionEngine {
        let data_schema = DataSchema::from_json(DATA_SCHEMA, "data.json").expect("valid data schema").remove(0);
        let query_schema = QuerySchema::from_json(QUERY_SCHEMA, "query.json").expect("valid query schema").remove(0);

        HashAndPartitionEngine::new(&query_context(embed_selector), data_schema, query_schema, filter, STRING_BITS, 20).expect("valid engine")
    }

    fn full_record() -> DataRecord {
        DataRecord::from_iter([
            ("qname", json!("www.example.com")),
            ("date", json!("2016-02-20T23:29:05.123Z")),
            ("ips", json!(["10.0.0.1", "10.0.0.2", "10.0.0.3"])),
            ("ttl", json!(300)),
            ("rcode", json!(3)),
        ])
    }

    fn emitted(outcome: RecordOutcome) -> EncodedRecord {
        match outcome {
            RecordOutcome::Emitted(encoded) => encoded,
            other => panic!("expected an emitted record, found {:?}", other),
        }
    }

    #[test]
    fn layout_width_is_sum_of_field_widths() {
        // date 64 bits, 2 ips of 32 bits, int 32 bits, byte 8 bits; in 8-bit chunks
        assert_eq!(engine(false, None).expected_num_partitions(), 8 + 2 * 4 + 4 + 1);
        // digest of the string selector is an extra int
        assert_eq!(engine(true, None).expected_num_partitions(), 4 + 8 + 2 * 4 + 4 + 1);
    }

    #[test]
    fn record_is_hashed_and_decodes_back() {
        let engine = engine(false, None);
        let encoded = emitted(engine.process_record(&full_record()));

        let hasher = SelectorHasher::new("secret", WIDTH).expect("valid width");
        assert_eq!(encoded.hash_index, hasher.hash("www.example.com"));
        assert_eq!(encoded.partitions.len(), engine.expected_num_partitions());
        assert!(encoded.partitions.iter().all(|p| p.bits() <= DATA_PARTITION_BIT_SIZE as u64));

        let date = DateTime::parse_from_rfc3339("2016-02-20T23:29:05.123Z").expect("valid date").with_timezone(&Utc);
        let decoded = engine.decode_record(&encoded.partitions).expect("decodable");

        assert_eq!(
            decoded,
            vec![
                ("date".to_string(), FieldValue::Date(date)),
                (
                    "ips".to_string(),
                    FieldValue::Array(vec![FieldValue::Ip(Ipv4Addr::new(10, 0, 0, 1)), FieldValue::Ip(Ipv4Addr::new(10, 0, 0, 2))])
                ),
                ("ttl".to_string(), FieldValue::Int(300)),
                ("rcode".to_string(), FieldValue::Byte(3)),
            ]
        );
    }

    #[test]
    fn optional_fields_are_padded_to_fixed_width() {
        let engine = engine(false, None);

        let sparse = DataRecord::from_iter([("qname", json!("a.example.com")), ("date", json!("2020-01-01T00:00:00Z")), ("ips", json!("192.168.1.1"))]);
        let encoded = emitted(engine.process_record(&sparse));
        assert_eq!(encoded.partitions.len(), emitted(engine.process_record(&full_record())).partitions.len());

        let decoded = engine.decode_record(&encoded.partitions).expect("decodable");
        assert_eq!(decoded[1].1, FieldValue::Array(vec![FieldValue::Ip(Ipv4Addr::new(192, 168, 1, 1)), FieldValue::Ip(Ipv4Addr::UNSPECIFIED)]));
        assert_eq!(decoded[2].1, FieldValue::Int(0));
        assert_eq!(decoded[3].1, FieldValue::Byte(0));
    }

    #[test_case("qname" => ErrorKind::RecordSchemaViolation; "Selector is missing")]
    #[test_case("date" => ErrorKind::RecordSchemaViolation; "Required field is missing")]
    fn missing_required_fields_skip_the_record(dropped: &str) -> ErrorKind {
        let mut record = full_record();
        record.insert(dropped, serde_json::Value::Null);

        match engine(false, None).process_record(&record) {
            RecordOutcome::Skipped(kind) => kind,
            other => panic!("expected a skipped record, found {:?}", other),
        }
    }

    #[test_case("rcode", json!(300) => ErrorKind::CodecRange; "Byte field overflows")]
    #[test_case("ttl", json!("forever") => ErrorKind::RecordSchemaViolation; "Int field holds text")]
    #[test_case("ips", json!(["10.0.0.1", "not-an-ip"]) => ErrorKind::RecordSchemaViolation; "Array element isn't an address")]
    #[test_case("date", json!("yesterday") => ErrorKind::RecordSchemaViolation; "Date field isn't a date")]
    fn bad_values_skip_the_record(field: &str, value: serde_json::Value) -> ErrorKind {
        let mut record = full_record();
        record.insert(field, value);

        match engine(false, None).process_record(&record) {
            RecordOutcome::Skipped(kind) => kind,
            other => panic!("expected a skipped record, found {:?}", other),
        }
    }

    #[test]
    fn array_elements_beyond_declared_length_are_not_inspected() {
        let mut record = full_record();
        record.insert("ips", json!(["10.0.0.1", "10.0.0.2", "garbage"]));

        assert!(matches!(engine(false, None).process_record(&record), RecordOutcome::Emitted(_)));
    }

    const ARRAY_DATA_SCHEMA: &str = r#"{
        "schema_name": "tagged",
        "elements": [
            { "name": "host", "type": "string" },
            { "name": "tags", "type": "string", "is_array": true },
            { "name": "ttls", "type": "int", "is_array": true }
        ]
    }"#;

    const ARRAY_QUERY_SCHEMA: &str = r#"{
        "schema_name": "tagged-by-host",
        "data_schema_name": "tagged",
        "selector_name": "host",
        "element_names": ["tags", "ttls"],
        "array_lengths": { "tags": 2, "ttls": 2 }
    }"#;

    #[test_case(json!(["a", null]), json!([7, 5]) => (vec!["a".to_string(), String::new()], vec![7, 5]); "Null string element")]
    #[test_case(json!(["a", "b"]), json!([null, 5]) => (vec!["a".to_string(), "b".to_string()], vec![0, 5]); "Null int element")]
    #[test_case(json!([null, null]), json!([null]) => (vec![String::new(), String::new()], vec![0, 0]); "Only null elements")]
    fn null_array_elements_are_padded(tags: serde_json::Value, ttls: serde_json::Value) -> (Vec<String>, Vec<i32>) {
        let data_schema = DataSchema::from_json(ARRAY_DATA_SCHEMA, "data.json").expect("valid data schema").remove(0);
        let query_schema = QuerySchema::from_json(ARRAY_QUERY_SCHEMA, "query.json").expect("valid query schema").remove(0);
        let engine = HashAndPartitionEngine::new(&query_context(false), data_schema, query_schema, None, STRING_BITS, 20).expect("valid engine");

        let record = DataRecord::from_iter([("host", json!("h.example.com")), ("tags", tags), ("ttls", ttls)]);
        let encoded = emitted(engine.process_record(&record));
        assert_eq!(encoded.partitions.len(), engine.expected_num_partitions());

        let decoded = engine.decode_record(&encoded.partitions).expect("decodable");
        let (FieldValue::Array(tags), FieldValue::Array(ttls)) = (&decoded[0].1, &decoded[1].1) else {
            panic!("expected array fields, found {:?}", decoded);
        };

        let tags = tags
            .iter()
            .map(|v| match v {
                FieldValue::String(tag) => tag.clone(),
                other => panic!("unexpected tag {:?}", other),
            })
            .collect();
        let ttls = ttls
            .iter()
            .map(|v| match v {
                FieldValue::Int(ttl) => *ttl,
                other => panic!("unexpected ttl {:?}", other),
            })
            .collect();

        (tags, ttls)
    }

    #[test]
    fn embedded_string_selector_is_its_digest() {
        let engine = engine(true, None);
        let encoded = emitted(engine.process_record(&full_record()));

        let decoded = engine.decode_record(&encoded.partitions).expect("decodable");
        assert_eq!(decoded[0], ("qname".to_string(), FieldValue::Int(embedded_selector_digest("www.example.com"))));
        assert_eq!(decoded[4], ("rcode".to_string(), FieldValue::Byte(3)));
    }

    #[test]
    fn stopped_records_emit_nothing() {
        let stop_list = HashSet::from(["example.com".to_string()]);
        let filter = StopListFilter::new(vec!["qname".to_string()], stop_list);
        let engine = engine(false, Some(Arc::new(filter)));

        assert_eq!(engine.process_record(&full_record()), RecordOutcome::Filtered);

        let mut passing = full_record();
        passing.insert("qname", "www.example.org");
        assert!(matches!(engine.process_record(&passing), RecordOutcome::Emitted(_)));
    }

    #[test]
    fn batch_counts_every_outcome() {
        let stop_list = HashSet::from(["blocked.net".to_string()]);
        let filter = StopListFilter::new(vec!["qname".to_string()], stop_list);
        let engine = engine(false, Some(Arc::new(filter)));

        let mut records = Vec::new();
        for idx in 0..100 {
            let mut record = full_record();
            record.insert("qname", format!("host-{}.example.com", idx));
            records.push(record);
        }

        let mut blocked = full_record();
        blocked.insert("qname", "mx.blocked.net");
        records.push(blocked);

        let mut overflowing = full_record();
        overflowing.insert("rcode", 1000);
        records.push(overflowing);

        let mut undated = full_record();
        undated.insert("date", serde_json::Value::Null);
        records.push(undated);

        let (encoded, report) = engine.process_batch(&records);

        assert_eq!(encoded.len(), 100);
        assert!(encoded.iter().all(|e| e.partitions.len() == engine.expected_num_partitions()));

        // emitted records keep input order
        let hasher = SelectorHasher::new("secret", WIDTH).expect("valid width");
        assert!(encoded.iter().enumerate().all(|(idx, e)| e.hash_index == hasher.hash(&format!("host-{}.example.com", idx))));

        assert_eq!(report.total_records, 103);
        assert_eq!(report.emitted, 100);
        assert_eq!(report.filtered, 1);
        assert_eq!(report.skipped.get(&ErrorKind::CodecRange), Some(&1));
        assert_eq!(report.skipped.get(&ErrorKind::RecordSchemaViolation), Some(&1));
        assert_eq!(report.to_string(), "103 records: 100 emitted, 1 filtered, 2 skipped (record-schema-violation=1, codec-range=1)");
    }

    #[test]
    fn reports_merge_counters() {
        let mut lhs = RunReport::default();
        lhs.record(&RecordOutcome::Filtered);
        lhs.record(&RecordOutcome::Skipped(ErrorKind::CodecRange));

        let mut rhs = RunReport::default();
        rhs.record(&RecordOutcome::Skipped(ErrorKind::CodecRange));
        rhs.record(&RecordOutcome::Emitted(EncodedRecord {
            hash_index: 0,
            partitions: vec![],
        }));

        let merged = lhs.merge(rhs);
        assert_eq!((merged.total_records, merged.emitted, merged.filtered, merged.num_skipped()), (4, 1, 1, 2));
        assert_eq!(merged.skipped.get(&ErrorKind::CodecRange), Some(&2));
    }

    #[test]
    fn decoding_checks_sequence_length() {
        let engine = engine(false, None);
        assert!(engine.decode_record(&[BigUint::from(1u32)]).is_err());
    }

    #[test]
    fn chunk_bytes_are_minimal_big_endian() {
        let encoded = EncodedRecord {
            hash_index: 1,
            partitions: vec![BigUint::from(0u32), BigUint::from(255u32), BigUint::from(256u32)],
        };

        assert_eq!(encoded.chunk_bytes(), vec![vec![0], vec![255], vec![1, 0]]);
    }
}

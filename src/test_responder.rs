#![cfg(test)]

use crate::{
    DataFilter, DataRecord, DataSchema, ErrorKind, FieldValue, FilterRegistry, PirEncodeError, Responder, ResponderConfig, SelectorHasher, StorageConfig,
};
use num_bigint::BigUint;
use num_traits::One;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use std::{fs, io::Cursor, path::Path, sync::Arc};

const DATA_SCHEMAS: &str = r#"[
    {
        "schema_name": "dns",
        "elements": [
            { "name": "qname", "type": "string" },
            { "name": "date", "type": "string", "partitioner": "iso8601-date" },
            { "name": "src_ip", "type": "string", "partitioner": "ip" },
            { "name": "ttl", "type": "int", "is_array": true },
            { "name": "rcode", "type": "short" }
        ]
    },
    {
        "schema_name": "users",
        "elements": [{ "name": "user", "type": "string" }]
    }
]"#;

const QUERY_SCHEMAS: &str = r#"[
    {
        "schema_name": "dns-by-qname",
        "data_schema_name": "dns",
        "selector_name": "qname",
        "element_names": ["date", "src_ip", "ttl", "rcode"],
        "array_lengths": { "ttl": 3 },
        "filter": { "name": "stoplist", "element_names": ["qname"] }
    },
    {
        "schema_name": "dns-custom-filter",
        "data_schema_name": "dns",
        "selector_name": "qname",
        "element_names": ["rcode"],
        "filter": { "name": "only-errors" }
    }
]"#;

const STOPLIST: &str = "evil.com\nbad.example.org\n";

/// Writes a query artifact with random elements modulo a random `N^2`.
fn write_query(dir: &Path, query_type: &str, data_partition_bit_size: usize, width: usize) {
    let mut rng = ChaCha8Rng::from_os_rng();

    let mut n_bytes = [0u8; 32];
    rng.fill_bytes(&mut n_bytes);
    let n = BigUint::from_bytes_le(&n_bytes) | BigUint::one();
    let n_squared = &n * &n;

    let query_elements = (0..width)
        .map(|_| {
            let mut elem_bytes = [0u8; 48];
            rng.fill_bytes(&mut elem_bytes);
            (BigUint::from_bytes_le(&elem_bytes) % &n_squared).to_string()
        })
        .collect::<Vec<_>>();

    let artifact = json!({
        "query_info": {
            "identifier": "e2e",
            "query_type": query_type,
            "data_partition_bit_size": data_partition_bit_size,
            "hash_key": "e2e-key",
        },
        "n_squared": n_squared.to_string(),
        "query_elements": query_elements,
    });

    fs::write(dir.join("query.json"), artifact.to_string()).expect("writable");
}

fn setup_dir(query_type: &str, data_partition_bit_size: usize, width: usize) -> (tempfile::TempDir, ResponderConfig) {
    let dir = tempfile::tempdir().expect("temp dir");

    write_query(dir.path(), query_type, data_partition_bit_size, width);
    fs::write(dir.path().join("data_schemas.json"), DATA_SCHEMAS).expect("writable");
    fs::write(dir.path().join("query_schemas.json"), QUERY_SCHEMAS).expect("writable");
    fs::write(dir.path().join("stoplist.txt"), STOPLIST).expect("writable");

    let mut config = ResponderConfig::new("query.json", "data_schemas.json", "query_schemas.json");
    config.stoplist_location = Some("stoplist.txt".to_string());
    config.storage = StorageConfig::Local {
        root: Some(dir.path().to_path_buf()),
    };

    (dir, config)
}

fn random_record(rng: &mut ChaCha8Rng, idx: usize) -> DataRecord {
    let mut record = DataRecord::new();
    record.insert("qname", format!("host-{}.example.net", idx));

    // every optional field is present about half of the time
    if rng.random::<bool>() {
        let (month, day, hour, millis) = (rng.random_range(1..10), rng.random_range(0..10), rng.random_range(0..10), rng.random_range(0..1000));
        record.insert("date", format!("2024-0{}-1{}T0{}:00:00.{:03}Z", month, day, hour, millis));
    }
    if rng.random::<bool>() {
        record.insert("src_ip", format!("10.{}.{}.{}", rng.random::<u8>(), rng.random::<u8>(), rng.random::<u8>()));
    }
    if rng.random::<bool>() {
        let ttls = (0..rng.random_range(0..6usize)).map(|_| rng.random_range(0..86_400i32)).collect::<Vec<_>>();
        record.insert("ttl", ttls);
    }
    if rng.random::<bool>() {
        record.insert("rcode", rng.random_range(0..16i32));
    }

    record
}

#[test]
fn exp_table_and_partitions_from_on_disk_artifacts() {
    const DATA_PARTITION_BIT_SIZE: usize = 8;
    const WIDTH: usize = 64;
    const NUM_RECORDS: usize = 1_000;

    let (_dir, config) = setup_dir("dns-by-qname", DATA_PARTITION_BIT_SIZE, WIDTH);
    let responder = Responder::setup(&config).expect("responder setup must succeed");

    // offline phase: tables of a subset of the query vector
    let indices = [0, 7, 31, 63];
    let table = responder.build_exp_table(&indices).expect("table must build");

    assert_eq!(table.len(), indices.len() * (1 << DATA_PARTITION_BIT_SIZE));
    for &index in &indices {
        assert_eq!(table.get(index, 0), Some(&BigUint::one()));
        assert_eq!(table.get(index, 1), responder.query().query_element(index).ok());
    }
    assert_eq!(table, responder.build_exp_table(&indices).expect("table must build"));
    assert_eq!(
        responder.build_exp_table(&[WIDTH]),
        Err(PirEncodeError::InvalidQueryIndex { index: WIDTH, width: WIDTH })
    );

    // per-record phase: fixed width output, whatever fields are present
    let mut rng = ChaCha8Rng::from_os_rng();
    let mut records = (0..NUM_RECORDS).map(|idx| random_record(&mut rng, idx)).collect::<Vec<_>>();

    let mut stopped = random_record(&mut rng, NUM_RECORDS);
    stopped.insert("qname", "www.evil.com");
    records.push(stopped);

    let (encoded, report) = responder.hash_and_partition(&records);

    // date 8 chunks, ip 4 chunks, 3 ints of 4 chunks, short 2 chunks
    let expected_num_partitions = 8 + 4 + 3 * 4 + 2;
    assert_eq!(responder.engine().expected_num_partitions(), expected_num_partitions);

    assert_eq!(encoded.len(), NUM_RECORDS);
    assert_eq!((report.total_records, report.emitted, report.filtered, report.num_skipped()), (NUM_RECORDS as u64 + 1, NUM_RECORDS as u64, 1, 0));

    let hasher = SelectorHasher::new("e2e-key", WIDTH).expect("valid width");
    for (idx, record) in encoded.iter().enumerate() {
        assert_eq!(record.hash_index, hasher.hash(&format!("host-{}.example.net", idx)));
        assert_eq!(record.partitions.len(), expected_num_partitions);
        assert!(record.chunk_bytes().iter().all(|bytes| bytes.len() == 1));
    }
}

#[test]
fn decoded_records_match_their_inputs() {
    let (_dir, config) = setup_dir("dns-by-qname", 16, 32);
    let responder = Responder::setup(&config).expect("responder setup must succeed");

    let record = DataRecord::from_json_str(
        r#"{ "qname": "a.example.net", "date": "2016-02-20T23:29:05.123Z", "src_ip": "192.168.10.7", "ttl": [300, 60], "rcode": 3 }"#,
    )
    .expect("valid record");

    let (encoded, _) = responder.hash_and_partition(&[record]);
    let decoded = responder.engine().decode_record(&encoded[0].partitions).expect("decodable");

    let values = decoded.into_iter().map(|(_, value)| value).collect::<Vec<_>>();
    assert_eq!(crate::format_iso8601_millis(1_456_010_945_123).as_deref(), Some("2016-02-20T23:29:05.123Z"));
    assert!(matches!(&values[0], FieldValue::Date(dt) if dt.timestamp_millis() == 1_456_010_945_123));
    assert_eq!(values[1], FieldValue::Ip("192.168.10.7".parse().expect("valid address")));
    assert_eq!(values[2], FieldValue::Array(vec![FieldValue::Int(300), FieldValue::Int(60), FieldValue::Int(0)]));
    assert_eq!(values[3], FieldValue::Short(3));
}

#[test]
fn malformed_lines_are_counted_not_fatal() {
    let (_dir, config) = setup_dir("dns-by-qname", 8, 16);
    let responder = Responder::setup(&config).expect("responder setup must succeed");

    let input = [
        r#"{ "qname": "ok-1.example.net", "rcode": 1 }"#,
        "",
        "not json at all",
        r#"{ "qname": "ok-2.example.net", "rcode": 70000 }"#,
        r#"{ "rcode": 2 }"#,
        r#"{ "qname": "mail.evil.com" }"#,
        r#"{ "qname": "ok-3.example.net", "ttl": 5 }"#,
    ]
    .join("\n");

    let (encoded, report) = responder.hash_and_partition_json_lines(&mut Cursor::new(input), "input.jsonl").expect("input is readable");

    assert_eq!(encoded.len(), 2);
    assert_eq!(report.total_records, 6);
    assert_eq!(report.filtered, 1);
    assert_eq!(report.skipped.get(&ErrorKind::RecordSchemaViolation), Some(&2));
    assert_eq!(report.skipped.get(&ErrorKind::CodecRange), Some(&1));
}

#[test]
fn undecodable_lines_are_counted_not_fatal() {
    let (_dir, config) = setup_dir("dns-by-qname", 8, 16);
    let responder = Responder::setup(&config).expect("responder setup must succeed");

    let mut input = Vec::new();
    input.extend_from_slice(b"{ \"qname\": \"ok-1.example.net\" }\n");
    input.extend_from_slice(b"{ \"qname\": \"bad\xff\" }\n");
    input.extend_from_slice(b"{ \"qname\": \"ok-2.example.net\" }\r\n");

    let (encoded, report) = responder.hash_and_partition_json_lines(&mut Cursor::new(input), "input.jsonl").expect("input is readable");

    let hasher = responder.query().selector_hasher().expect("valid width");
    assert_eq!(encoded.len(), 2);
    assert_eq!(encoded[1].hash_index, hasher.hash("ok-2.example.net"));
    assert_eq!((report.total_records, report.emitted, report.num_skipped()), (3, 2, 1));
    assert_eq!(report.skipped.get(&ErrorKind::RecordSchemaViolation), Some(&1));
}

#[test]
fn startup_failures_are_fatal() {
    // query type names no query schema
    let (_dir, config) = setup_dir("unknown-query", 8, 16);
    assert!(matches!(Responder::setup(&config), Err(PirEncodeError::SchemaNotFound(_))));

    // stoplist filter without its term file
    let (_dir, mut config) = setup_dir("dns-by-qname", 8, 16);
    config.stoplist_location = Some("missing.txt".to_string());
    assert!(matches!(Responder::setup(&config), Err(PirEncodeError::StorageUnavailable(..))));

    // custom filter which was never registered
    let (_dir, config) = setup_dir("dns-custom-filter", 8, 16);
    assert!(matches!(Responder::setup(&config), Err(PirEncodeError::UnknownFilter(_))));

    // corrupted query artifact
    let (dir, config) = setup_dir("dns-by-qname", 8, 16);
    fs::write(dir.path().join("query.json"), "{ \"query_info\": 1 }").expect("writable");
    assert!(matches!(Responder::setup(&config), Err(PirEncodeError::MalformedArtifact(..))));
}

#[test]
fn exp_tables_reject_wide_partitions() {
    let (_dir, config) = setup_dir("dns-by-qname", 48, 4);
    let responder = Responder::setup(&config).expect("hash and partition works with wide chunks");

    assert_eq!(responder.build_exp_table(&[0]), Err(PirEncodeError::UnsupportedPartitionBitSize(48)));
}

struct OnlyErrors;

impl DataFilter for OnlyErrors {
    fn filter_data_element(&self, record: &DataRecord, _: &DataSchema) -> bool {
        record.get("rcode").and_then(|v| v.as_i64()).is_some_and(|rcode| rcode != 0)
    }
}

#[test]
fn registered_filters_are_resolved_by_name() {
    let (_dir, config) = setup_dir("dns-custom-filter", 8, 16);
    let storage = config.storage.build();
    let filters = FilterRegistry::new().register("only-errors", Arc::new(OnlyErrors));

    let responder = Responder::setup_with_filters(&config, storage.as_ref(), &filters).expect("responder setup must succeed");

    let records = [0, 2, 0, 3].map(|rcode| DataRecord::from_iter([("qname", json!(format!("h{}.example.net", rcode))), ("rcode", json!(rcode))]));
    let (encoded, report) = responder.hash_and_partition(&records);

    assert_eq!(encoded.len(), 2);
    assert_eq!(report.filtered, 2);
    assert_eq!(responder.engine().decode_record(&encoded[1].partitions), Ok(vec![("rcode".to_string(), FieldValue::Short(3))]));
}

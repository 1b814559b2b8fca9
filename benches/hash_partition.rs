use divan;
use num_bigint::BigUint;
use pir_encode::{DataRecord, DataSchema, HashAndPartitionEngine, QueryContext, QueryInfo, QuerySchema, SelectorHasher};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

fn main() {
    divan::main();
}

const DATA_SCHEMA: &str = r#"{
    "schema_name": "dns",
    "elements": [
        { "name": "qname", "type": "string" },
        { "name": "date", "type": "string", "partitioner": "iso8601-date" },
        { "name": "ips", "type": "string", "is_array": true, "partitioner": "ip" },
        { "name": "ttl", "type": "int" }
    ]
}"#;

const QUERY_SCHEMA: &str = r#"{
    "schema_name": "dns-by-qname",
    "data_schema_name": "dns",
    "selector_name": "qname",
    "element_names": ["date", "ips", "ttl"],
    "array_lengths": { "ips": 4 }
}"#;

fn generate_random_records(rng: &mut ChaCha8Rng, num_records: usize) -> Vec<DataRecord> {
    (0..num_records)
        .map(|idx| {
            let mut record = DataRecord::new();
            record.insert("qname", format!("host-{}.example.net", idx));
            record.insert("date", "2016-02-20T23:29:05.123Z");
            record.insert("ips", vec![format!("10.0.{}.{}", rng.random::<u8>(), rng.random::<u8>())]);
            record.insert("ttl", rng.random_range(0..86_400i32));

            record
        })
        .collect()
}

fn engine(data_partition_bit_size: usize) -> HashAndPartitionEngine {
    let info = QueryInfo {
        identifier: "bench".to_string(),
        query_type: "dns-by-qname".to_string(),
        data_partition_bit_size,
        hash_key: "bench-key".to_string(),
        embed_selector: true,
    };
    let ctx = QueryContext::new(info, vec![BigUint::from(2u32); 1 << 16], BigUint::from(143u32)).unwrap();

    let data_schema = DataSchema::from_json(DATA_SCHEMA, "data.json").unwrap().remove(0);
    let query_schema = QuerySchema::from_json(QUERY_SCHEMA, "query.json").unwrap().remove(0);

    HashAndPartitionEngine::new(&ctx, data_schema, query_schema, None, 64, 20).unwrap()
}

#[divan::bench(max_time = Duration::from_secs(30), skip_ext_time = true)]
fn hash_selector(bencher: divan::Bencher) {
    let hasher = SelectorHasher::new("bench-key", 1 << 16).unwrap();
    bencher.bench(|| hasher.hash(divan::black_box("host-12345.example.net")));
}

#[divan::bench(args = [8, 16, 32], max_time = Duration::from_secs(100), skip_ext_time = true)]
fn process_batch(bencher: divan::Bencher, data_partition_bit_size: usize) {
    const NUM_RECORDS: usize = 1usize << 12;

    let mut rng = ChaCha8Rng::from_os_rng();
    let records = generate_random_records(&mut rng, NUM_RECORDS);
    let engine = engine(data_partition_bit_size);

    bencher.bench(|| engine.process_batch(divan::black_box(&records)));
}

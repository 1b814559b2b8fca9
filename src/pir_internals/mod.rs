pub mod bit_packing;
pub mod branch_opt_util;
pub mod date_partitioner;
pub mod engine;
pub mod error;
pub mod exp_table;
pub mod field_value;
pub mod filter;
pub mod ip_partitioner;
pub mod params;
pub mod partitioner;
pub mod primitive_partitioner;
pub mod query;
pub mod schema;
pub mod selector_hash;
pub mod storage;

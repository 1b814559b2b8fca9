use super::{
    bit_packing,
    error::PirEncodeError,
    field_value::{FieldValue, PrimitiveType},
    params,
    partitioner::{self, DataPartitioner},
};
use num_bigint::BigUint;
use serde_json::Value;
use std::net::Ipv4Addr;

/// Partitions dotted-quad IPv4 addresses as their 32-bit integer value, last octet in the least significant chunk.
#[derive(Clone, Debug)]
pub struct IpPartitioner {
    chunk_bits: usize,
}

impl IpPartitioner {
    pub fn new(chunk_bits: usize) -> Self {
        Self { chunk_bits }
    }
}

impl DataPartitioner for IpPartitioner {
    fn chunk_bits(&self) -> usize {
        self.chunk_bits
    }

    fn bits(&self, _: PrimitiveType) -> usize {
        params::IPV4_BITS
    }

    fn coerce(&self, field: &str, raw: &Value, _: PrimitiveType) -> Result<FieldValue, PirEncodeError> {
        raw.as_str()
            .and_then(|s| s.trim().parse::<Ipv4Addr>().ok())
            .map(FieldValue::Ip)
            .ok_or_else(|| PirEncodeError::schema_violation(field, format!("'{}' is not an IPv4 address", raw)))
    }

    fn to_partitions(&self, field: &str, value: &FieldValue, _: PrimitiveType) -> Result<Vec<BigUint>, PirEncodeError> {
        match value {
            FieldValue::Ip(addr) => {
                let bytes = u32::from(*addr).to_le_bytes();
                let chunks = bit_packing::pack_le_bytes(&bytes, params::IPV4_BITS, self.chunk_bits);

                Ok(partitioner::chunks_to_partitions(chunks))
            }
            other => Err(PirEncodeError::schema_violation(field, format!("expected ip value, found {}", other.type_name()))),
        }
    }

    fn from_partitions(&self, parts: &[BigUint], offset: usize, _: PrimitiveType) -> Result<FieldValue, PirEncodeError> {
        let chunks = partitioner::partitions_to_chunks(parts, offset, params::IPV4_BITS, self.chunk_bits, "ip")?;
        let bytes = bit_packing::unpack_le_bytes(&chunks, params::IPV4_BITS, self.chunk_bits);

        Ok(FieldValue::Ip(Ipv4Addr::from(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))))
    }
}

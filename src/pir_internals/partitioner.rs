use super::{
    bit_packing, branch_opt_util,
    date_partitioner::Iso8601DatePartitioner,
    error::PirEncodeError,
    field_value::{FieldValue, PrimitiveType},
    ip_partitioner::IpPartitioner,
    params,
    primitive_partitioner::PrimitivePartitioner,
};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde_json::Value;
use std::{fmt::Display, str::FromStr};

/// Converts typed field values to and from fixed-length sequences of fixed-width, non-negative chunks.
///
/// For a given declared type every method agrees on the same number of chunks, so that concatenating the partitions of all
/// query schema fields yields a sequence whose length doesn't depend on the record being encoded.
pub trait DataPartitioner: Send + Sync {
    /// Width of each chunk, in bits. The last chunk of a value may carry fewer significant bits.
    fn chunk_bits(&self) -> usize;

    /// Bit width of a value of the declared type.
    fn bits(&self, ty: PrimitiveType) -> usize;

    /// Number of chunks a single value of the declared type occupies.
    fn num_partitions(&self, ty: PrimitiveType) -> usize {
        self.bits(ty).div_ceil(self.chunk_bits())
    }

    /// Turns a raw record value into the typed value this partitioner encodes.
    fn coerce(&self, field: &str, raw: &Value, ty: PrimitiveType) -> Result<FieldValue, PirEncodeError>;

    /// Encodes one value into exactly `num_partitions(ty)` chunks, each < 2^chunk_bits.
    fn to_partitions(&self, field: &str, value: &FieldValue, ty: PrimitiveType) -> Result<Vec<BigUint>, PirEncodeError>;

    /// Decodes one value from the `num_partitions(ty)` chunks starting at `offset`, ignoring everything outside that window.
    fn from_partitions(&self, parts: &[BigUint], offset: usize, ty: PrimitiveType) -> Result<FieldValue, PirEncodeError>;

    /// Stand-in for an absent value: `num_partitions(ty)` zero chunks.
    fn padded_partitions(&self, ty: PrimitiveType) -> Vec<BigUint> {
        vec![BigUint::zero(); self.num_partitions(ty)]
    }

    /// Encodes a multi-valued field as exactly `array_len` elements: extra elements are dropped, missing ones padded.
    fn array_to_partitions(&self, field: &str, values: &[FieldValue], ty: PrimitiveType, array_len: usize) -> Result<Vec<BigUint>, PirEncodeError> {
        let mut parts = Vec::with_capacity(array_len * self.num_partitions(ty));

        for value in values.iter().take(array_len) {
            parts.extend(self.to_partitions(field, value, ty)?);
        }
        for _ in values.len().min(array_len)..array_len {
            parts.extend(self.padded_partitions(ty));
        }

        Ok(parts)
    }

    /// Decodes `array_len` consecutive elements starting at `offset`.
    fn array_from_partitions(&self, parts: &[BigUint], offset: usize, ty: PrimitiveType, array_len: usize) -> Result<Vec<FieldValue>, PirEncodeError> {
        let stride = self.num_partitions(ty);
        (0..array_len)
            .map(|elem_idx| {
                let elem_offset = elem_idx.checked_mul(stride).and_then(|delta| offset.checked_add(delta)).ok_or_else(|| {
                    branch_opt_util::cold();
                    PirEncodeError::schema_violation(ty.name(), format!("element {} at offset {} is out of range", elem_idx, offset))
                })?;
                self.from_partitions(parts, elem_offset, ty)
            })
            .collect()
    }
}

/// Closed set of partitioners a data schema element may name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PartitionerKind {
    Primitive,
    Iso8601Date,
    Ip,
}

impl FromStr for PartitionerKind {
    type Err = PirEncodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "primitive" => Ok(Self::Primitive),
            "iso8601-date" | "iso8601date" | "date" => Ok(Self::Iso8601Date),
            "ip" | "ipv4" => Ok(Self::Ip),
            _ => Err(PirEncodeError::UnknownPartitioner(s.to_string())),
        }
    }
}

impl Display for PartitionerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primitive => write!(f, "primitive"),
            Self::Iso8601Date => write!(f, "iso8601-date"),
            Self::Ip => write!(f, "ip"),
        }
    }
}

/// One instance of every partitioner, configured for the chunk width of the running query. Built once per worker.
pub struct PartitionerRegistry {
    primitive: PrimitivePartitioner,
    date: Iso8601DatePartitioner,
    ip: IpPartitioner,
}

impl PartitionerRegistry {
    /// # Arguments
    ///
    /// * `chunk_bits` - The query's data partition bit size, must be in 1..=64.
    /// * `string_bits` - Fixed width of string fields, must be a positive multiple of 8.
    pub fn new(chunk_bits: usize, string_bits: usize) -> Result<Self, PirEncodeError> {
        if branch_opt_util::unlikely(!(1..=params::MAX_CHUNK_BITS).contains(&chunk_bits)) {
            return Err(PirEncodeError::UnsupportedPartitionBitSize(chunk_bits));
        }
        if branch_opt_util::unlikely(string_bits == 0 || string_bits % 8 != 0) {
            return Err(PirEncodeError::InvalidConfiguration(format!("string width must be a positive multiple of 8 bits, found {}", string_bits)));
        }

        let primitive = PrimitivePartitioner::new(chunk_bits, string_bits);
        Ok(Self {
            date: Iso8601DatePartitioner::new(primitive.clone()),
            ip: IpPartitioner::new(chunk_bits),
            primitive,
        })
    }

    pub fn get(&self, kind: PartitionerKind) -> &dyn DataPartitioner {
        match kind {
            PartitionerKind::Primitive => &self.primitive,
            PartitionerKind::Iso8601Date => &self.date,
            PartitionerKind::Ip => &self.ip,
        }
    }

    pub fn chunk_bits(&self) -> usize {
        self.primitive.chunk_bits()
    }
}

pub(crate) fn chunks_to_partitions(chunks: Vec<u64>) -> Vec<BigUint> {
    chunks.into_iter().map(BigUint::from).collect()
}

/// Reads the window of a `num_bits`-bit value out of a partition sequence, checking every chunk against its width.
pub(crate) fn partitions_to_chunks(
    parts: &[BigUint],
    offset: usize,
    num_bits: usize,
    chunk_bits: usize,
    ty: impl Display,
) -> Result<Vec<u64>, PirEncodeError> {
    let num_chunks = num_bits.div_ceil(chunk_bits);

    let window = offset.checked_add(num_chunks).and_then(|end| parts.get(offset..end)).ok_or_else(|| {
        branch_opt_util::cold();
        PirEncodeError::schema_violation(
            &ty.to_string(),
            format!("needs {} partitions at offset {}, but sequence has only {}", num_chunks, offset, parts.len()),
        )
    })?;

    window
        .iter()
        .enumerate()
        .map(|(chunk_idx, part)| {
            let width = bit_packing::chunk_width_at(chunk_idx, num_bits, chunk_bits);
            match part.to_u64() {
                Some(chunk) if part.bits() <= width as u64 => Ok(chunk),
                _ => Err(PirEncodeError::codec_range(&ty.to_string(), part, width)),
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::{PartitionerKind, PartitionerRegistry};
    use crate::pir_internals::{
        error::PirEncodeError,
        field_value::{FieldValue, PrimitiveType},
    };
    use num_bigint::BigUint;
    use num_traits::Zero;
    use test_case::test_case;

    #[test_case("primitive" => Ok(PartitionerKind::Primitive); "Primitive partitioner")]
    #[test_case("" => Ok(PartitionerKind::Primitive); "Default is primitive")]
    #[test_case("ISO8601-date" => Ok(PartitionerKind::Iso8601Date); "Date partitioner, case insensitive")]
    #[test_case("ip" => Ok(PartitionerKind::Ip); "IP partitioner")]
    #[test_case("org.example.Custom" => Err(PirEncodeError::UnknownPartitioner("org.example.Custom".to_string())); "Unknown partitioner is rejected")]
    fn partitioner_kind_from_identifier(id: &str) -> Result<PartitionerKind, PirEncodeError> {
        id.parse()
    }

    #[test_case(8, 64 => matches Ok(_); "Byte chunks")]
    #[test_case(64, 64 => matches Ok(_); "Widest chunks")]
    #[test_case(0, 64 => matches Err(PirEncodeError::UnsupportedPartitionBitSize(0)); "Zero width chunks")]
    #[test_case(65, 64 => matches Err(PirEncodeError::UnsupportedPartitionBitSize(65)); "Chunks wider than a word")]
    #[test_case(8, 60 => matches Err(PirEncodeError::InvalidConfiguration(_)); "String width must be whole bytes")]
    fn registry_validates_widths(chunk_bits: usize, string_bits: usize) -> Result<(), PirEncodeError> {
        PartitionerRegistry::new(chunk_bits, string_bits).map(|_| ())
    }

    #[test]
    fn padded_partitions_are_zero_and_of_canonical_length() {
        for chunk_bits in [1, 3, 8, 16, 24, 32, 64] {
            let registry = PartitionerRegistry::new(chunk_bits, 128).expect("valid widths");

            for kind in [PartitionerKind::Primitive, PartitionerKind::Iso8601Date, PartitionerKind::Ip] {
                let partitioner = registry.get(kind);

                for ty in [
                    PrimitiveType::Byte,
                    PrimitiveType::Short,
                    PrimitiveType::Int,
                    PrimitiveType::Long,
                    PrimitiveType::Float,
                    PrimitiveType::Double,
                    PrimitiveType::Char,
                    PrimitiveType::String,
                ] {
                    let padded = partitioner.padded_partitions(ty);

                    assert_eq!(padded.len(), partitioner.num_partitions(ty), "kind = {}, ty = {}, chunk_bits = {}", kind, ty, chunk_bits);
                    assert!(padded.iter().all(|p| p.is_zero()));
                }
            }
        }
    }

    #[test]
    fn arrays_are_truncated_and_padded_to_declared_length() {
        let registry = PartitionerRegistry::new(8, 64).expect("valid widths");
        let partitioner = registry.get(PartitionerKind::Primitive);

        let values = vec![FieldValue::Short(1), FieldValue::Short(2), FieldValue::Short(3)];

        let truncated = partitioner.array_to_partitions("f", &values, PrimitiveType::Short, 2).expect("encodable");
        assert_eq!(truncated, [1u32, 0, 2, 0].map(BigUint::from).to_vec());

        let padded = partitioner.array_to_partitions("f", &values, PrimitiveType::Short, 4).expect("encodable");
        assert_eq!(padded.len(), 8);
        assert!(padded[6..].iter().all(|p| p.is_zero()));

        let decoded = partitioner.array_from_partitions(&padded, 0, PrimitiveType::Short, 3).expect("decodable");
        assert_eq!(decoded, values);
    }

    #[test]
    fn offsets_past_the_sequence_are_rejected() {
        let registry = PartitionerRegistry::new(8, 64).expect("valid widths");
        let partitioner = registry.get(PartitionerKind::Primitive);
        let parts = partitioner.to_partitions("f", &FieldValue::Int(7), PrimitiveType::Int).expect("encodable");

        for offset in [parts.len(), usize::MAX - 1, usize::MAX] {
            assert!(matches!(partitioner.from_partitions(&parts, offset, PrimitiveType::Int), Err(PirEncodeError::RecordSchemaViolation { .. })));
            assert!(matches!(
                partitioner.array_from_partitions(&parts, offset, PrimitiveType::Int, 2),
                Err(PirEncodeError::RecordSchemaViolation { .. })
            ));
        }
    }
}

use super::{
    bit_packing,
    error::PirEncodeError,
    field_value::{self, FieldValue, PrimitiveType},
    partitioner::{self, DataPartitioner},
};
use num_bigint::BigUint;
use serde_json::Value;

/// Partitions Java-style primitives plus fixed-width strings.
///
/// Values are serialized little-endian (integers in two's complement, floats by their IEEE-754 bit pattern, chars as one
/// UTF-16 code unit, strings as UTF-8 zero-padded to the configured width) and then split into `chunk_bits`-bit chunks.
#[derive(Clone, Debug)]
pub struct PrimitivePartitioner {
    chunk_bits: usize,
    string_bits: usize,
}

impl PrimitivePartitioner {
    pub fn new(chunk_bits: usize, string_bits: usize) -> Self {
        Self { chunk_bits, string_bits }
    }

    fn to_le_bytes(&self, field: &str, value: &FieldValue, ty: PrimitiveType) -> Result<Vec<u8>, PirEncodeError> {
        let bytes = match (ty, value) {
            (PrimitiveType::Byte, FieldValue::Byte(v)) => v.to_le_bytes().to_vec(),
            (PrimitiveType::Short, FieldValue::Short(v)) => v.to_le_bytes().to_vec(),
            (PrimitiveType::Int, FieldValue::Int(v)) => v.to_le_bytes().to_vec(),
            (PrimitiveType::Long, FieldValue::Long(v)) => v.to_le_bytes().to_vec(),
            (PrimitiveType::Float, FieldValue::Float(v)) => v.to_bits().to_le_bytes().to_vec(),
            (PrimitiveType::Double, FieldValue::Double(v)) => v.to_bits().to_le_bytes().to_vec(),
            (PrimitiveType::Char, FieldValue::Char(c)) => {
                let mut units = [0u16; 2];
                match c.encode_utf16(&mut units) {
                    [unit] => unit.to_le_bytes().to_vec(),
                    _ => return Err(PirEncodeError::codec_range(field, c, self.bits(ty))),
                }
            }
            (PrimitiveType::String, FieldValue::String(s)) => self.fixed_width_string(s),
            _ => {
                return Err(PirEncodeError::schema_violation(field, format!("expected {} value, found {}", ty, value.type_name())));
            }
        };

        Ok(bytes)
    }

    /// UTF-8 bytes of `s`, cut at the last char boundary that fits and zero-padded to the string width.
    fn fixed_width_string(&self, s: &str) -> Vec<u8> {
        let max_num_bytes = self.string_bits / 8;

        let mut end = s.len().min(max_num_bytes);
        while !s.is_char_boundary(end) {
            end -= 1;
        }

        let mut bytes = s.as_bytes()[..end].to_vec();
        bytes.resize(max_num_bytes, 0);
        bytes
    }
}

impl DataPartitioner for PrimitivePartitioner {
    fn chunk_bits(&self) -> usize {
        self.chunk_bits
    }

    fn bits(&self, ty: PrimitiveType) -> usize {
        ty.bits(self.string_bits)
    }

    fn coerce(&self, field: &str, raw: &Value, ty: PrimitiveType) -> Result<FieldValue, PirEncodeError> {
        field_value::coerce_primitive(field, raw, ty)
    }

    fn to_partitions(&self, field: &str, value: &FieldValue, ty: PrimitiveType) -> Result<Vec<BigUint>, PirEncodeError> {
        let bytes = self.to_le_bytes(field, value, ty)?;
        let chunks = bit_packing::pack_le_bytes(&bytes, self.bits(ty), self.chunk_bits);

        Ok(partitioner::chunks_to_partitions(chunks))
    }

    fn from_partitions(&self, parts: &[BigUint], offset: usize, ty: PrimitiveType) -> Result<FieldValue, PirEncodeError> {
        let num_bits = self.bits(ty);
        let chunks = partitioner::partitions_to_chunks(parts, offset, num_bits, self.chunk_bits, ty)?;
        let bytes = bit_packing::unpack_le_bytes(&chunks, num_bits, self.chunk_bits);

        let value = match ty {
            PrimitiveType::Byte => FieldValue::Byte(i8::from_le_bytes([bytes[0]])),
            PrimitiveType::Short => FieldValue::Short(i16::from_le_bytes([bytes[0], bytes[1]])),
            PrimitiveType::Int => FieldValue::Int(i32::from_le_bytes(fixed_bytes(&bytes))),
            PrimitiveType::Long => FieldValue::Long(i64::from_le_bytes(fixed_bytes(&bytes))),
            PrimitiveType::Float => FieldValue::Float(f32::from_bits(u32::from_le_bytes(fixed_bytes(&bytes)))),
            PrimitiveType::Double => FieldValue::Double(f64::from_bits(u64::from_le_bytes(fixed_bytes(&bytes)))),
            PrimitiveType::Char => {
                let unit = u16::from_le_bytes([bytes[0], bytes[1]]);
                let c = char::from_u32(unit as u32).ok_or_else(|| PirEncodeError::schema_violation(ty.name(), format!("0x{:04x} is a lone surrogate", unit)))?;
                FieldValue::Char(c)
            }
            PrimitiveType::String => {
                let len = bytes.iter().rposition(|&b| b != 0).map_or(0, |idx| idx + 1);
                let s = String::from_utf8(bytes[..len].to_vec()).map_err(|e| PirEncodeError::schema_violation(ty.name(), e.to_string()))?;
                FieldValue::String(s)
            }
        };

        Ok(value)
    }
}

#[inline(always)]
fn fixed_bytes<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes[..N]);
    arr
}

use super::{
    error::PirEncodeError,
    field_value::{FieldValue, PrimitiveType},
    params,
    partitioner::DataPartitioner,
    primitive_partitioner::PrimitivePartitioner,
};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use num_bigint::BigUint;
use serde_json::Value;

/// Partitions ISO-8601 timestamps as signed 64-bit milliseconds since the Unix epoch, delegating to the `long` codec.
///
/// The declared element type is ignored. Sub-millisecond precision is truncated when a value is read, so a decoded value equals
/// its source at millisecond resolution.
#[derive(Clone, Debug)]
pub struct Iso8601DatePartitioner {
    primitive: PrimitivePartitioner,
}

impl Iso8601DatePartitioner {
    pub fn new(primitive: PrimitivePartitioner) -> Self {
        Self { primitive }
    }
}

/// Parses an ISO-8601 date-time into epoch milliseconds. Inputs without an offset are taken as UTC.
pub fn parse_iso8601_millis(s: &str) -> Option<i64> {
    let s = s.trim();

    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp_millis())
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.and_utc().timestamp_millis()))
        .ok()
}

/// Renders epoch milliseconds as `yyyy-MM-ddTHH:mm:ss.SSSZ`.
pub fn format_iso8601_millis(millis: i64) -> Option<String> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn instant_from_millis(field: &str, millis: i64) -> Result<DateTime<Utc>, PirEncodeError> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| PirEncodeError::codec_range(field, millis, params::DATE_BITS))
}

impl DataPartitioner for Iso8601DatePartitioner {
    fn chunk_bits(&self) -> usize {
        self.primitive.chunk_bits()
    }

    fn bits(&self, _: PrimitiveType) -> usize {
        params::DATE_BITS
    }

    fn coerce(&self, field: &str, raw: &Value, _: PrimitiveType) -> Result<FieldValue, PirEncodeError> {
        let millis = match raw {
            Value::String(s) => parse_iso8601_millis(s).ok_or_else(|| PirEncodeError::schema_violation(field, format!("'{}' is not an ISO-8601 date", s)))?,
            Value::Number(n) => n.as_i64().ok_or_else(|| PirEncodeError::schema_violation(field, format!("'{}' is not epoch milliseconds", n)))?,
            other => return Err(PirEncodeError::schema_violation(field, format!("'{}' is not an ISO-8601 date", other))),
        };

        instant_from_millis(field, millis).map(FieldValue::Date)
    }

    fn to_partitions(&self, field: &str, value: &FieldValue, _: PrimitiveType) -> Result<Vec<BigUint>, PirEncodeError> {
        match value {
            FieldValue::Date(dt) => self.primitive.to_partitions(field, &FieldValue::Long(dt.timestamp_millis()), PrimitiveType::Long),
            other => Err(PirEncodeError::schema_violation(field, format!("expected date value, found {}", other.type_name()))),
        }
    }

    fn from_partitions(&self, parts: &[BigUint], offset: usize, _: PrimitiveType) -> Result<FieldValue, PirEncodeError> {
        match self.primitive.from_partitions(parts, offset, PrimitiveType::Long)? {
            FieldValue::Long(millis) => instant_from_millis("date", millis).map(FieldValue::Date),
            other => Err(PirEncodeError::schema_violation("date", format!("expected long value, found {}", other.type_name()))),
        }
    }
}

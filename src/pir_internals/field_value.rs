use super::{error::PirEncodeError, params};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::{fmt::Display, net::Ipv4Addr, str::FromStr};

/// Primitive types a data schema can declare for an element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
    String,
}

impl PrimitiveType {
    /// Bit width of the type. Strings have no intrinsic width, their width is configured.
    pub const fn bits(self, string_bits: usize) -> usize {
        match self {
            Self::Byte => params::BYTE_BITS,
            Self::Short => params::SHORT_BITS,
            Self::Int => params::INT_BITS,
            Self::Long => params::LONG_BITS,
            Self::Float => params::FLOAT_BITS,
            Self::Double => params::DOUBLE_BITS,
            Self::Char => params::CHAR_BITS,
            Self::String => string_bits,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Char => "char",
            Self::String => "string",
        }
    }
}

impl FromStr for PrimitiveType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "byte" => Ok(Self::Byte),
            "short" => Ok(Self::Short),
            "int" | "integer" => Ok(Self::Int),
            "long" => Ok(Self::Long),
            "float" => Ok(Self::Float),
            "double" => Ok(Self::Double),
            "char" | "character" => Ok(Self::Char),
            "string" => Ok(Self::String),
            _ => Err(()),
        }
    }
}

impl Display for PrimitiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A record field value, after coercion to the type its data schema declares.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    String(String),
    /// Instant with millisecond resolution.
    Date(DateTime<Utc>),
    Ip(Ipv4Addr),
    Array(Vec<FieldValue>),
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Byte(_) => "byte",
            Self::Short(_) => "short",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Char(_) => "char",
            Self::String(_) => "string",
            Self::Date(_) => "date",
            Self::Ip(_) => "ip",
            Self::Array(_) => "array",
        }
    }
}

/// One input row: field name to raw (JSON) value. Values are coerced lazily, against the data schema, while partitioning.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataRecord {
    fields: Map<String, Value>,
}

impl DataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a record from a JSON object, as found on each line of a JSON-lines input.
    pub fn from_json_str(line: &str) -> Result<Self, PirEncodeError> {
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(fields)) => Ok(Self { fields }),
            Ok(other) => Err(PirEncodeError::schema_violation("<record>", format!("expected a JSON object, found '{}'", other))),
            Err(e) => Err(PirEncodeError::schema_violation("<record>", e.to_string())),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Looks up a field. JSON `null` counts as absent.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for DataRecord {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Renders a raw value the way selectors and stoplist terms are compared: strings verbatim, everything else as JSON text.
pub fn value_as_selector(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Coerces a raw value into a primitive typed [`FieldValue`].
///
/// Integral values which don't fit the declared width are range errors, values of the wrong shape are schema violations.
pub fn coerce_primitive(field: &str, raw: &Value, ty: PrimitiveType) -> Result<FieldValue, PirEncodeError> {
    match ty {
        PrimitiveType::Byte => coerce_integral(field, raw, ty)
            .and_then(|v| i8::try_from(v).map(FieldValue::Byte).map_err(|_| PirEncodeError::codec_range(field, v, ty.bits(0)))),
        PrimitiveType::Short => coerce_integral(field, raw, ty)
            .and_then(|v| i16::try_from(v).map(FieldValue::Short).map_err(|_| PirEncodeError::codec_range(field, v, ty.bits(0)))),
        PrimitiveType::Int => coerce_integral(field, raw, ty)
            .and_then(|v| i32::try_from(v).map(FieldValue::Int).map_err(|_| PirEncodeError::codec_range(field, v, ty.bits(0)))),
        PrimitiveType::Long => coerce_integral(field, raw, ty).map(FieldValue::Long),
        PrimitiveType::Float => {
            let v = coerce_floating(field, raw, ty)?;
            if v.is_finite() && !(v as f32).is_finite() {
                return Err(PirEncodeError::codec_range(field, v, ty.bits(0)));
            }
            Ok(FieldValue::Float(v as f32))
        }
        PrimitiveType::Double => coerce_floating(field, raw, ty).map(FieldValue::Double),
        PrimitiveType::Char => {
            let s = raw.as_str().ok_or_else(|| PirEncodeError::schema_violation(field, format!("expected a single character, found '{}'", raw)))?;

            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.len_utf16() == 1 => Ok(FieldValue::Char(c)),
                (Some(c), None) => Err(PirEncodeError::codec_range(field, c, ty.bits(0))),
                _ => Err(PirEncodeError::schema_violation(field, format!("expected a single character, found '{}'", s))),
            }
        }
        PrimitiveType::String => match raw {
            Value::Null | Value::Array(_) | Value::Object(_) => Err(PirEncodeError::schema_violation(field, "expected a scalar value for string field")),
            other => Ok(FieldValue::String(value_as_selector(other))),
        },
    }
}

fn coerce_integral(field: &str, raw: &Value, ty: PrimitiveType) -> Result<i64, PirEncodeError> {
    match raw {
        Value::Number(n) => match n.as_i64() {
            Some(v) => Ok(v),
            None if n.is_u64() => Err(PirEncodeError::codec_range(field, n, ty.bits(0))),
            None => Err(PirEncodeError::schema_violation(field, format!("'{}' is not an integral {}", n, ty))),
        },
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| PirEncodeError::schema_violation(field, format!("'{}' can't be read as {}", s, ty))),
        other => Err(PirEncodeError::schema_violation(field, format!("'{}' can't be read as {}", other, ty))),
    }
}

fn coerce_floating(field: &str, raw: &Value, ty: PrimitiveType) -> Result<f64, PirEncodeError> {
    match raw {
        Value::Number(n) => n.as_f64().ok_or_else(|| PirEncodeError::schema_violation(field, format!("'{}' can't be read as {}", n, ty))),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| PirEncodeError::schema_violation(field, format!("'{}' can't be read as {}", s, ty))),
        other => Err(PirEncodeError::schema_violation(field, format!("'{}' can't be read as {}", other, ty))),
    }
}

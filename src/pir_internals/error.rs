use std::fmt::Display;

/// Coarse classification of [`PirEncodeError`], used for skip accounting and for deciding whether an error aborts the worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    Configuration,
    CryptoComputation,
    InvalidIndex,
    RecordSchemaViolation,
    CodecRange,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::CryptoComputation => write!(f, "crypto-computation"),
            Self::InvalidIndex => write!(f, "invalid-index"),
            Self::RecordSchemaViolation => write!(f, "record-schema-violation"),
            Self::CodecRange => write!(f, "codec-range"),
        }
    }
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum PirEncodeError {
    // Configuration, fatal at startup
    #[error("Storage location '{0}' is unavailable: {1}")]
    StorageUnavailable(String, String),
    #[error("Artifact at '{0}' is malformed: {1}")]
    MalformedArtifact(String, String),
    #[error("No schema named '{0}' is loaded")]
    SchemaNotFound(String),
    #[error("Unknown partitioner '{0}'")]
    UnknownPartitioner(String),
    #[error("Field '{0}' declares unsupported type '{1}'")]
    UnsupportedDeclaredType(String, String),
    #[error("Unknown data filter '{0}'")]
    UnknownFilter(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // Query artifact arithmetic, fatal
    #[error("Modulus N^2 must be at least 2")]
    InvalidModulus,
    #[error("Query vector is malformed: {0}")]
    MalformedQueryVector(String),
    #[error("Data partition bit size '{0}' is not supported for this operation")]
    UnsupportedPartitionBitSize(usize),

    #[error("Query index {index} is out of range for a query vector of width {width}")]
    InvalidQueryIndex { index: usize, width: usize },

    // Per record, never abort the batch
    #[error("Record violates schema at field '{field}': {reason}")]
    RecordSchemaViolation { field: String, reason: String },
    #[error("Value '{value}' of field '{field}' does not fit in {bits} bits")]
    CodecRange { field: String, value: String, bits: usize },
}

impl PirEncodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StorageUnavailable(..)
            | Self::MalformedArtifact(..)
            | Self::SchemaNotFound(_)
            | Self::UnknownPartitioner(_)
            | Self::UnsupportedDeclaredType(..)
            | Self::UnknownFilter(_)
            | Self::InvalidConfiguration(_) => ErrorKind::Configuration,
            Self::InvalidModulus | Self::MalformedQueryVector(_) | Self::UnsupportedPartitionBitSize(_) => ErrorKind::CryptoComputation,
            Self::InvalidQueryIndex { .. } => ErrorKind::InvalidIndex,
            Self::RecordSchemaViolation { .. } => ErrorKind::RecordSchemaViolation,
            Self::CodecRange { .. } => ErrorKind::CodecRange,
        }
    }

    /// Per-record errors skip the offending record; every other error stops the worker.
    pub fn is_per_record(&self) -> bool {
        matches!(self.kind(), ErrorKind::RecordSchemaViolation | ErrorKind::CodecRange)
    }

    pub(crate) fn schema_violation(field: &str, reason: impl Into<String>) -> Self {
        Self::RecordSchemaViolation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn codec_range(field: &str, value: impl Display, bits: usize) -> Self {
        Self::CodecRange {
            field: field.to_string(),
            value: value.to_string(),
            bits,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{ErrorKind, PirEncodeError};
    use test_case::test_case;

    #[test_case(PirEncodeError::SchemaNotFound("q".into()) => ErrorKind::Configuration; "Missing schema is a configuration error")]
    #[test_case(PirEncodeError::InvalidModulus => ErrorKind::CryptoComputation; "Bad modulus is a crypto error")]
    #[test_case(PirEncodeError::InvalidQueryIndex { index: 9, width: 4 } => ErrorKind::InvalidIndex; "Out of range index")]
    #[test_case(PirEncodeError::schema_violation("f", "missing") => ErrorKind::RecordSchemaViolation; "Missing field is a per record violation")]
    #[test_case(PirEncodeError::codec_range("f", 300, 8) => ErrorKind::CodecRange; "Oversized value is a codec range error")]
    fn error_kind_classification(err: PirEncodeError) -> ErrorKind {
        err.kind()
    }

    #[test]
    fn only_record_level_errors_are_skippable() {
        assert!(PirEncodeError::schema_violation("f", "x").is_per_record());
        assert!(PirEncodeError::codec_range("f", 1, 1).is_per_record());
        assert!(!PirEncodeError::InvalidModulus.is_per_record());
        assert!(!PirEncodeError::InvalidConfiguration("x".into()).is_per_record());
    }
}

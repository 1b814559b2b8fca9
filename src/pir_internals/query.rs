use super::{
    branch_opt_util,
    error::PirEncodeError,
    params,
    selector_hash::{MAX_HYPERCUBE_WIDTH, SelectorHasher},
    storage::StorageBackend,
};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Public metadata of an encrypted query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryInfo {
    pub identifier: String,
    /// Name of the query schema this query was built against.
    pub query_type: String,
    /// Width of every partition chunk, in bits.
    pub data_partition_bit_size: usize,
    /// Key under which selectors are hashed into the hypercube.
    pub hash_key: String,
    /// Whether each record's selector is prepended to its partitions.
    #[serde(default)]
    pub embed_selector: bool,
}

/// On-disk form of a query: big integers as decimal strings.
#[derive(Serialize, Deserialize)]
struct QueryArtifact {
    query_info: QueryInfo,
    n_squared: String,
    query_elements: Vec<String>,
}

/// Everything a worker needs from the encrypted query. Loaded once at startup and read-only afterwards.
#[derive(Clone, Debug)]
pub struct QueryContext {
    info: QueryInfo,
    query_elements: Vec<BigUint>,
    n_squared: BigUint,
}

fn parse_decimal(s: &str, what: &str) -> Result<BigUint, PirEncodeError> {
    s.trim().parse::<BigUint>().map_err(|_| PirEncodeError::MalformedQueryVector(format!("{} '{}' is not a non-negative decimal integer", what, s)))
}

impl QueryContext {
    /// Checks the shape of the query: a non-empty vector addressable by 32-bit indices, and a usable chunk width.
    /// Arithmetic validity of the modulus and of each element is checked when exponentiation tables are built.
    pub fn new(info: QueryInfo, query_elements: Vec<BigUint>, n_squared: BigUint) -> Result<Self, PirEncodeError> {
        if branch_opt_util::unlikely(query_elements.is_empty() || query_elements.len() > MAX_HYPERCUBE_WIDTH) {
            return Err(PirEncodeError::MalformedQueryVector(format!("query vector must hold 1..=2^32 elements, found {}", query_elements.len())));
        }
        if branch_opt_util::unlikely(!(1..=params::MAX_CHUNK_BITS).contains(&info.data_partition_bit_size)) {
            return Err(PirEncodeError::UnsupportedPartitionBitSize(info.data_partition_bit_size));
        }

        Ok(Self {
            info,
            query_elements,
            n_squared,
        })
    }

    pub fn from_json(text: &str, location: &str) -> Result<Self, PirEncodeError> {
        let artifact = serde_json::from_str::<QueryArtifact>(text).map_err(|e| PirEncodeError::MalformedArtifact(location.to_string(), e.to_string()))?;

        let n_squared = parse_decimal(&artifact.n_squared, "modulus")?;
        let query_elements = artifact
            .query_elements
            .iter()
            .map(|e| parse_decimal(e, "query element"))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(artifact.query_info, query_elements, n_squared)
    }

    pub fn to_json(&self) -> Result<String, PirEncodeError> {
        let artifact = QueryArtifact {
            query_info: self.info.clone(),
            n_squared: self.n_squared.to_string(),
            query_elements: self.query_elements.iter().map(|e| e.to_string()).collect(),
        };

        serde_json::to_string_pretty(&artifact).map_err(|e| PirEncodeError::MalformedArtifact(self.info.identifier.clone(), e.to_string()))
    }

    pub fn load(storage: &dyn StorageBackend, location: &str) -> Result<Self, PirEncodeError> {
        Self::from_json(&storage.read_to_string(location)?, location)
    }

    pub fn info(&self) -> &QueryInfo {
        &self.info
    }

    pub fn n_squared(&self) -> &BigUint {
        &self.n_squared
    }

    pub fn query_elements(&self) -> &[BigUint] {
        &self.query_elements
    }

    /// Number of hypercube cells, i.e. length of the query vector.
    pub fn width(&self) -> usize {
        self.query_elements.len()
    }

    pub fn query_element(&self, index: usize) -> Result<&BigUint, PirEncodeError> {
        self.query_elements.get(index).ok_or(PirEncodeError::InvalidQueryIndex { index, width: self.width() })
    }

    pub fn selector_hasher(&self) -> Result<SelectorHasher, PirEncodeError> {
        SelectorHasher::new(self.info.hash_key.as_bytes(), self.width())
    }
}

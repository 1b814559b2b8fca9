use super::{error::PirEncodeError, field_value::PrimitiveType, partitioner::PartitionerKind, storage::StorageBackend};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A schema file holds either a single schema or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(v) => vec![v],
            Self::Many(v) => v,
        }
    }
}

fn parse_schema_file<T: for<'de> Deserialize<'de>>(text: &str, location: &str) -> Result<Vec<T>, PirEncodeError> {
    serde_json::from_str::<OneOrMany<T>>(text)
        .map(OneOrMany::into_vec)
        .map_err(|e| PirEncodeError::MalformedArtifact(location.to_string(), e.to_string()))
}

#[derive(Deserialize)]
struct RawDataElement {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    is_array: bool,
    #[serde(default)]
    partitioner: String,
}

#[derive(Deserialize)]
struct RawDataSchema {
    schema_name: String,
    elements: Vec<RawDataElement>,
}

/// One field of a data schema, with its declared type and partitioner already resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct DataElement {
    pub name: String,
    pub ty: PrimitiveType,
    pub is_array: bool,
    pub partitioner: PartitionerKind,
}

impl DataElement {
    pub fn new(name: impl Into<String>, ty: PrimitiveType, is_array: bool, partitioner: PartitionerKind) -> Self {
        Self {
            name: name.into(),
            ty,
            is_array,
            partitioner,
        }
    }
}

/// Field name to declared type, for one kind of input data.
#[derive(Clone, Debug)]
pub struct DataSchema {
    name: String,
    elements: Vec<DataElement>,
    index: HashMap<String, usize>,
}

impl DataSchema {
    pub fn new(name: impl Into<String>, elements: Vec<DataElement>) -> Result<Self, PirEncodeError> {
        let name = name.into();

        let mut index = HashMap::with_capacity(elements.len());
        for (idx, element) in elements.iter().enumerate() {
            if index.insert(element.name.clone(), idx).is_some() {
                return Err(PirEncodeError::InvalidConfiguration(format!("data schema '{}' declares element '{}' twice", name, element.name)));
            }
        }

        Ok(Self { name, elements, index })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elements(&self) -> &[DataElement] {
        &self.elements
    }

    pub fn element(&self, name: &str) -> Option<&DataElement> {
        self.index.get(name).map(|&idx| &self.elements[idx])
    }

    /// Parses every data schema in a JSON document, resolving type names and partitioner identifiers.
    pub fn from_json(text: &str, location: &str) -> Result<Vec<Self>, PirEncodeError> {
        parse_schema_file::<RawDataSchema>(text, location)?
            .into_iter()
            .map(|raw| {
                let elements = raw
                    .elements
                    .into_iter()
                    .map(|e| {
                        let ty = e
                            .type_name
                            .parse::<PrimitiveType>()
                            .map_err(|_| PirEncodeError::UnsupportedDeclaredType(e.name.clone(), e.type_name.clone()))?;
                        let partitioner = e.partitioner.parse::<PartitionerKind>()?;

                        Ok(DataElement::new(e.name, ty, e.is_array, partitioner))
                    })
                    .collect::<Result<Vec<_>, PirEncodeError>>()?;

                Self::new(raw.schema_name, elements)
            })
            .collect()
    }

    pub fn load_all(storage: &dyn StorageBackend, location: &str) -> Result<Vec<Self>, PirEncodeError> {
        Self::from_json(&storage.read_to_string(location)?, location)
    }

    pub fn find<'a>(schemas: &'a [Self], name: &str) -> Result<&'a Self, PirEncodeError> {
        schemas.iter().find(|s| s.name == name).ok_or_else(|| PirEncodeError::SchemaNotFound(name.to_string()))
    }
}

/// Names the filter a query schema applies, and the fields it inspects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub name: String,
    #[serde(default)]
    pub element_names: Vec<String>,
}

/// What a query extracts from each record of its data schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuerySchema {
    pub schema_name: String,
    pub data_schema_name: String,
    pub selector_name: String,
    /// Fields returned for each record, in the order their partitions are concatenated.
    pub element_names: Vec<String>,
    /// Number of elements kept for each array field, overriding the configured default.
    #[serde(default)]
    pub array_lengths: BTreeMap<String, usize>,
    /// Fields which must be present; other absent fields are padded.
    #[serde(default)]
    pub required_element_names: Vec<String>,
    #[serde(default)]
    pub filter: Option<FilterSpec>,
}

impl QuerySchema {
    pub fn from_json(text: &str, location: &str) -> Result<Vec<Self>, PirEncodeError> {
        parse_schema_file(text, location)
    }

    pub fn load_all(storage: &dyn StorageBackend, location: &str) -> Result<Vec<Self>, PirEncodeError> {
        Self::from_json(&storage.read_to_string(location)?, location)
    }

    pub fn find<'a>(schemas: &'a [Self], name: &str) -> Result<&'a Self, PirEncodeError> {
        schemas.iter().find(|s| s.schema_name == name).ok_or_else(|| PirEncodeError::SchemaNotFound(name.to_string()))
    }

    pub fn array_length(&self, element_name: &str, default_array_length: usize) -> usize {
        self.array_lengths.get(element_name).copied().unwrap_or(default_array_length)
    }

    pub fn is_required(&self, element_name: &str) -> bool {
        element_name == self.selector_name || self.required_element_names.iter().any(|n| n == element_name)
    }

    /// Checks that every field this query refers to exists in `data_schema`.
    pub fn validate(&self, data_schema: &DataSchema) -> Result<(), PirEncodeError> {
        if self.data_schema_name != data_schema.name() {
            return Err(PirEncodeError::InvalidConfiguration(format!(
                "query schema '{}' targets data schema '{}', not '{}'",
                self.schema_name,
                self.data_schema_name,
                data_schema.name()
            )));
        }

        let filter_element_names = self.filter.iter().flat_map(|f| f.element_names.iter());
        let referenced = std::iter::once(&self.selector_name)
            .chain(self.element_names.iter())
            .chain(self.required_element_names.iter())
            .chain(self.array_lengths.keys())
            .chain(filter_element_names);

        for name in referenced {
            if data_schema.element(name).is_none() {
                return Err(PirEncodeError::InvalidConfiguration(format!(
                    "query schema '{}' refers to '{}', which data schema '{}' doesn't declare",
                    self.schema_name,
                    name,
                    data_schema.name()
                )));
            }
        }

        if let Some(element) = data_schema.element(&self.selector_name) {
            if element.is_array {
                return Err(PirEncodeError::InvalidConfiguration(format!("selector '{}' can't be an array field", element.name)));
            }
        }

        Ok(())
    }
}

//! Schema types and metadata tags

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::codec::type_name;
use crate::error::{KsonError, Result};

/// Marks an array field or an array-mode schema reference.
pub const ARRAY_PREFIX: &str = "[]";

/// Split a schema reference into its array flag and plain id.
pub(crate) fn split_array_prefix(reference: &str) -> (bool, &str) {
    match reference.strip_prefix(ARRAY_PREFIX) {
        Some(id) => (true, id),
        None => (false, reference),
    }
}

/// A named positional layout: ordered field names paired one-to-one with
/// metadata tags. Field order is the wire order of encoded values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    /// Unique id within a registry
    pub id: String,
    /// Field names, in wire order
    pub fields: Vec<String>,
    /// Per-field tags, positionally paired with `fields`
    pub meta: Vec<MetaEntry>,
}

impl Schema {
    pub fn new(id: impl Into<String>, fields: Vec<String>, meta: Vec<MetaEntry>) -> Self {
        Self {
            id: id.into(),
            fields,
            meta,
        }
    }

    /// Build a schema from a decoded JSON value, validating the required
    /// `id`, `fields` and `meta` members.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            KsonError::InvalidSchema(format!("expected an object, got {}", type_name(value)))
        })?;

        let id = obj
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| KsonError::InvalidSchema("missing field 'id'".to_string()))?;

        let fields = obj
            .get("fields")
            .and_then(Value::as_array)
            .ok_or_else(|| KsonError::InvalidSchema("missing field 'fields'".to_string()))?
            .iter()
            .map(|field| {
                field.as_str().map(String::from).ok_or_else(|| {
                    KsonError::InvalidSchema(format!(
                        "field names must be strings, got {}",
                        type_name(field)
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let meta = obj
            .get("meta")
            .and_then(Value::as_array)
            .ok_or_else(|| KsonError::InvalidSchema("missing field 'meta'".to_string()))?
            .iter()
            .map(MetaEntry::from_value)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(id, fields, meta))
    }

    /// `fields` and `meta` must pair positionally.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.fields.len() != self.meta.len() {
            return Err(KsonError::InvalidSchema(format!(
                "schema '{}' has {} fields but {} meta entries",
                self.id,
                self.fields.len(),
                self.meta.len()
            )));
        }
        Ok(())
    }
}

/// The syntactic per-field tag as written in a schema definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaEntry {
    /// Plain passthrough, written as `0`, `null`, or an empty string
    Plain,
    /// A schema id or codec pipeline spec, optionally `"[]"`-prefixed
    Tag(String),
}

impl MetaEntry {
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::Plain),
            Value::Number(n) if n.as_f64() == Some(0.0) => Ok(Self::Plain),
            Value::String(s) if s.is_empty() => Ok(Self::Plain),
            Value::String(s) => Ok(Self::Tag(s.clone())),
            other => Err(KsonError::InvalidSchema(format!(
                "meta entries must be 0 or a string, got {}",
                other
            ))),
        }
    }

    /// True when the tag marks an array field.
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Tag(tag) if tag.starts_with(ARRAY_PREFIX))
    }

    /// The tag with any `"[]"` prefix removed; empty for plain entries.
    pub fn plain_tag(&self) -> &str {
        match self {
            Self::Plain => "",
            Self::Tag(tag) => tag.strip_prefix(ARRAY_PREFIX).unwrap_or(tag),
        }
    }
}

impl Serialize for MetaEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Plain => serializer.serialize_u64(0),
            Self::Tag(tag) => serializer.serialize_str(tag),
        }
    }
}

/// A meta entry resolved at registration time into the form the engine
/// walks. Schema references stay by-id and are looked up when walked, so
/// re-registration and forward references inside a batch behave
/// uniformly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaTag {
    /// Raw passthrough value
    Plain,
    /// Array of raw scalars (the literal `"[]"` tag)
    PlainArray,
    /// Nested record of the named schema
    NestedObject(String),
    /// Array of nested records of the named schema
    NestedArray(String),
    /// Compiled codec pipeline applied to the value
    Codec(String),
    /// Compiled codec pipeline applied to every element of the value
    CodecArray(String),
}

/// Pick the one schema in a batch that no other schema's meta references,
/// bare or `"[]"`-prefixed. Returns `None` when the batch is empty, fully
/// cyclic, or has more than one unreferenced schema.
pub fn find_top_schema(schemas: &[Schema]) -> Option<String> {
    let is_referenced = |candidate: &Schema| {
        schemas.iter().any(|schema| {
            schema
                .meta
                .iter()
                .any(|entry| entry.plain_tag() == candidate.id)
        })
    };

    let mut top = None;
    for schema in schemas {
        if is_referenced(schema) {
            continue;
        }
        if top.is_some() {
            return None;
        }
        top = Some(schema.id.clone());
    }
    top
}

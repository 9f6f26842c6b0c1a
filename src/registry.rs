//! The KSON context
//!
//! `Kson` replaces ambient global state with an explicit context object
//! owned by the caller: it holds the codec factories, the compiled
//! pipeline cache, and the schema registry. Registration takes
//! `&mut self`; encode, decode, and lookups take `&self`, so a fully
//! registered context can be shared read-only across threads.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::codec::{self, Codec, CodecFactory};
use crate::error::{KsonError, Result};
use crate::pipeline::{parse_spec, Pipeline};
use crate::schema::{MetaEntry, MetaTag, Schema};

/// The id of the self-describing bootstrap schema.
pub const SCHEMA_SCHEMA_ID: &str = "schema";

/// A registered schema plus its meta entries resolved into engine tags.
#[derive(Debug)]
pub struct CompiledSchema {
    pub(crate) schema: Schema,
    pub(crate) tags: Vec<MetaTag>,
}

impl CompiledSchema {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn tags(&self) -> &[MetaTag] {
        &self.tags
    }

    /// Rewrite every reference to `old_id` (bare or array-wrapped) to
    /// point at `new_id`, in both the raw meta and the resolved tags.
    pub(crate) fn replace_reference(&mut self, old_id: &str, new_id: &str) {
        for (entry, tag) in self.schema.meta.iter_mut().zip(self.tags.iter_mut()) {
            match tag {
                MetaTag::NestedObject(id) if id == old_id => {
                    *id = new_id.to_string();
                    *entry = MetaEntry::Tag(new_id.to_string());
                }
                MetaTag::NestedArray(id) if id == old_id => {
                    *id = new_id.to_string();
                    *entry = MetaEntry::Tag(format!("[]{}", new_id));
                }
                _ => {}
            }
        }
    }
}

/// Codec, pipeline, and schema registries behind one handle.
pub struct Kson {
    pub(crate) codecs: HashMap<String, CodecFactory>,
    pub(crate) pipelines: HashMap<String, Pipeline>,
    pub(crate) schemas: HashMap<String, CompiledSchema>,
}

impl Default for Kson {
    fn default() -> Self {
        Self::new()
    }
}

impl Kson {
    /// Create a context with the built-in codecs and the bootstrap
    /// `"schema"` schema registered.
    pub fn new() -> Self {
        let mut kson = Self {
            codecs: HashMap::new(),
            pipelines: HashMap::new(),
            schemas: HashMap::new(),
        };

        kson.register_codec("prefix", codec::prefix_codec);
        kson.register_codec("suffix", codec::suffix_codec);
        kson.register_codec("bool", codec::bool_codec);
        kson.register_codec("enum", codec::enum_codec);
        kson.register_codec("int36", codec::int36_codec);
        kson.register_codec("date", codec::date_codec);
        kson.register_codec("iso8601", codec::iso8601_codec);

        // The schema schema describes schema records themselves, so a
        // batch of schemas can ride the engine like any other data. Its
        // tags resolve without lookups, so it is inserted directly.
        let bootstrap = Schema::new(
            SCHEMA_SCHEMA_ID,
            vec!["id".to_string(), "fields".to_string(), "meta".to_string()],
            vec![
                MetaEntry::Plain,
                MetaEntry::Tag("[]".to_string()),
                MetaEntry::Tag("[]".to_string()),
            ],
        );
        kson.schemas.insert(
            SCHEMA_SCHEMA_ID.to_string(),
            CompiledSchema {
                schema: bootstrap,
                tags: vec![MetaTag::Plain, MetaTag::PlainArray, MetaTag::PlainArray],
            },
        );

        kson
    }

    /// Register a codec factory. Re-registration overwrites.
    pub fn register_codec<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&[String]) -> Result<Codec> + Send + Sync + 'static,
    {
        self.codecs.insert(name.into(), Box::new(factory));
    }

    /// Compile the pipeline for a raw spec string, memoized by the exact
    /// spec text.
    pub fn compile_pipeline(&mut self, spec: &str) -> Result<&Pipeline> {
        match self.pipelines.entry(spec.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let stages = parse_spec(spec)?;
                let mut compiled = Vec::with_capacity(stages.len());
                for stage in &stages {
                    let factory = self
                        .codecs
                        .get(&stage.name)
                        .ok_or_else(|| KsonError::UnknownCodec(stage.name.clone()))?;
                    compiled.push(factory(&stage.args)?);
                }
                Ok(entry.insert(Pipeline::new(spec, compiled)))
            }
        }
    }

    /// Look up an already-compiled pipeline.
    pub fn pipeline(&self, spec: &str) -> Option<&Pipeline> {
        self.pipelines.get(spec)
    }

    /// Validate, resolve, and store a schema definition. Re-registration
    /// overwrites the previous definition.
    ///
    /// Each meta tag is resolved here: an already-registered schema id
    /// wins, then a compilable codec pipeline; a tag whose leading stage
    /// names no known codec is kept as a schema reference and resolved
    /// when walked. A tag whose leading codec IS known but whose chain
    /// does not compile (unknown later stage, bad arguments, unbalanced
    /// escape) fails registration instead of silently passing values
    /// through.
    pub fn register_schema(&mut self, schema: Schema) -> Result<&Schema> {
        schema.validate()?;

        let mut tags = Vec::with_capacity(schema.meta.len());
        for entry in &schema.meta {
            tags.push(self.resolve_meta(entry)?);
        }

        debug!(id = %schema.id, fields = schema.fields.len(), "registering schema");
        let id = schema.id.clone();
        self.schemas.insert(id.clone(), CompiledSchema { schema, tags });
        Ok(self.schemas[&id].schema())
    }

    fn resolve_meta(&mut self, entry: &MetaEntry) -> Result<MetaTag> {
        let tag = entry.plain_tag();
        let array = entry.is_array();
        if tag.is_empty() {
            return Ok(if array {
                MetaTag::PlainArray
            } else {
                MetaTag::Plain
            });
        }

        let nested = |id: &str| {
            if array {
                MetaTag::NestedArray(id.to_string())
            } else {
                MetaTag::NestedObject(id.to_string())
            }
        };

        if self.schemas.contains_key(tag) {
            return Ok(nested(tag));
        }

        let stages = parse_spec(tag)?;
        let leading_codec = stages
            .first()
            .map(|stage| self.codecs.contains_key(&stage.name))
            .unwrap_or(false);
        if !leading_codec {
            return Ok(nested(tag));
        }

        self.compile_pipeline(tag)?;
        Ok(if array {
            MetaTag::CodecArray(tag.to_string())
        } else {
            MetaTag::Codec(tag.to_string())
        })
    }

    /// Register a schema given as a decoded JSON value.
    pub fn register_schema_value(&mut self, value: &Value) -> Result<&Schema> {
        let schema = Schema::from_value(value)?;
        self.register_schema(schema)
    }

    /// Register a schema given as text: either a plain JSON object or a
    /// KSON record of the bootstrap schema.
    pub fn register_schema_str(&mut self, text: &str) -> Result<&Schema> {
        let value = self.decode(text, None)?;
        self.register_schema_value(&value)
    }

    /// Register a batch: a JSON array of schema records or a single
    /// record. Returns the registered schemas in registration order.
    pub fn register_schemas(&mut self, batch: &Value) -> Result<Vec<Schema>> {
        let mut registered = Vec::new();
        match batch {
            Value::Array(entries) => {
                for entry in entries {
                    registered.push(self.register_schema_value(entry)?.clone());
                }
            }
            single => registered.push(self.register_schema_value(single)?.clone()),
        }
        Ok(registered)
    }

    /// Register every schema in a text batch: KSON-encoded against the
    /// bootstrap schema, or plain JSON.
    pub fn load_schemas_str(&mut self, text: &str) -> Result<Vec<Schema>> {
        let value = self.decode(text, None)?;
        self.register_schemas(&value)
    }

    /// Register every schema in a file.
    pub fn load_schemas_file(&mut self, path: impl AsRef<Path>) -> Result<Vec<Schema>> {
        let text = fs::read_to_string(path)?;
        self.load_schemas_str(&text)
    }

    /// Look up a registered schema by id.
    pub fn schema(&self, id: &str) -> Option<&Schema> {
        self.schemas.get(id).map(CompiledSchema::schema)
    }

    /// All registered schema ids, unordered.
    pub fn schema_ids(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub(crate) fn compiled(&self, id: &str) -> Result<&CompiledSchema> {
        self.schemas
            .get(id)
            .ok_or_else(|| KsonError::SchemaNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_bootstrap_schema_present() {
        let kson = Kson::new();
        let schema = kson.schema(SCHEMA_SCHEMA_ID).unwrap();
        assert_eq!(schema.fields, vec!["id", "fields", "meta"]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut kson = Kson::new();
        let result = kson.register_schema_value(&json!({
            "id": "broken",
            "fields": ["first", "second"],
            "meta": [0]
        }));
        assert!(matches!(result, Err(KsonError::InvalidSchema(_))));
    }

    #[test]
    fn test_reregistration_overwrites() {
        let mut kson = Kson::new();
        kson.register_schema_value(&json!({"id": "t", "fields": ["a"], "meta": [0]}))
            .unwrap();
        kson.register_schema_value(&json!({"id": "t", "fields": ["a", "b"], "meta": [0, 0]}))
            .unwrap();
        assert_eq!(kson.schema("t").unwrap().fields.len(), 2);
    }

    #[test]
    fn test_register_from_kson_text() {
        let mut kson = Kson::new();
        kson.register_schema_str(r#"["schema", "point", ["x", "y"], [0, 0]]"#)
            .unwrap();
        assert_eq!(kson.schema("point").unwrap().fields, vec!["x", "y"]);
    }

    #[test]
    fn test_register_from_json_text() {
        let mut kson = Kson::new();
        kson.register_schema_str(r#"{"id": "point", "fields": ["x", "y"], "meta": [0, 0]}"#)
            .unwrap();
        assert!(kson.schema("point").is_some());
    }

    #[test]
    fn test_broken_pipeline_fails_registration() {
        let mut kson = Kson::new();
        // leading codec is known, second stage is not
        let result = kson.register_schema_value(&json!({
            "id": "t",
            "fields": ["when"],
            "meta": ["date|nope"]
        }));
        assert!(matches!(result, Err(KsonError::UnknownCodec(name)) if name == "nope"));
    }

    #[test]
    fn test_unknown_tag_kept_as_schema_reference() {
        let mut kson = Kson::new();
        kson.register_schema_value(&json!({
            "id": "parent",
            "fields": ["kid"],
            "meta": ["child"]
        }))
        .unwrap();
        // the reference resolves once "child" arrives
        kson.register_schema_value(&json!({"id": "child", "fields": ["x"], "meta": [0]}))
            .unwrap();
        let encoded = kson
            .encode(&json!({"kid": {"x": 1}}), "parent")
            .unwrap();
        assert_eq!(encoded, r#"["parent",[1]]"#);
    }

    #[test]
    fn test_pipeline_memoized() {
        let mut kson = Kson::new();
        kson.compile_pipeline("date|int36").unwrap();
        kson.compile_pipeline("date|int36").unwrap();
        assert_eq!(kson.pipelines.len(), 1);
    }

    #[test]
    fn test_load_schemas_file() {
        let mut kson = Kson::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"["[]schema", "child", ["x"], [0], "parent", ["kid"], ["child"]]"#
        )
        .unwrap();

        let loaded = kson.load_schemas_file(file.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(kson.schema("parent").is_some());
        assert!(kson.schema("child").is_some());
    }
}

//! The positional codec engine
//!
//! Encoding walks a schema's fields in order and emits one flat JSON
//! array: a schema-id marker at the outermost level, then the field
//! values of every record back to back. Nested schema-tagged fields
//! splice in as inner arrays without a marker; codec-tagged fields pass
//! through their compiled pipeline. Decoding mirrors the walk, consuming
//! the stream in strides of the schema's field count.

use serde_json::{Map, Value};

use crate::codec::type_name;
use crate::error::{KsonError, Result};
use crate::pipeline::Pipeline;
use crate::registry::Kson;
use crate::schema::{split_array_prefix, MetaTag, ARRAY_PREFIX};

impl Kson {
    /// Encode `data` against a schema reference (`"id"` for one record,
    /// `"[]id"` for a sequence of records) into compact KSON text.
    pub fn encode(&self, data: &Value, schema_ref: &str) -> Result<String> {
        let flat = self.encode_value(data, schema_ref, false)?;
        Ok(serde_json::to_string(&Value::Array(flat))?)
    }

    /// Encode with indented output.
    pub fn encode_pretty(&self, data: &Value, schema_ref: &str) -> Result<String> {
        let flat = self.encode_value(data, schema_ref, false)?;
        Ok(serde_json::to_string_pretty(&Value::Array(flat))?)
    }

    fn encode_value(&self, data: &Value, schema_ref: &str, recursive: bool) -> Result<Vec<Value>> {
        let (is_array, schema_id) = split_array_prefix(schema_ref);
        let compiled = self.compiled(schema_id)?;
        let schema = compiled.schema();

        let shape_err = |expected: &'static str, actual: &Value| KsonError::ShapeMismatch {
            id: schema_id.to_string(),
            expected,
            actual: type_name(actual),
        };

        let records: Vec<&Map<String, Value>> = if is_array {
            data.as_array()
                .ok_or_else(|| shape_err("array", data))?
                .iter()
                .map(|item| item.as_object().ok_or_else(|| shape_err("object", item)))
                .collect::<Result<_>>()?
        } else {
            vec![data.as_object().ok_or_else(|| shape_err("object", data))?]
        };

        let mut out = Vec::with_capacity(records.len() * schema.fields.len() + 1);
        if !recursive {
            out.push(Value::String(if is_array {
                format!("{}{}", ARRAY_PREFIX, schema_id)
            } else {
                schema_id.to_string()
            }));
        }

        for record in records {
            for (field, tag) in schema.fields.iter().zip(compiled.tags()) {
                let raw = record.get(field).unwrap_or(&Value::Null);
                out.push(self.encode_field(raw, tag)?);
            }
        }
        Ok(out)
    }

    fn encode_field(&self, raw: &Value, tag: &MetaTag) -> Result<Value> {
        if raw.is_null() {
            return Ok(Value::Null);
        }
        match tag {
            MetaTag::Plain | MetaTag::PlainArray => Ok(raw.clone()),
            MetaTag::NestedObject(id) => Ok(Value::Array(self.encode_value(raw, id, true)?)),
            MetaTag::NestedArray(id) => {
                let reference = format!("{}{}", ARRAY_PREFIX, id);
                Ok(Value::Array(self.encode_value(raw, &reference, true)?))
            }
            MetaTag::Codec(spec) => self.lookup_pipeline(spec)?.encode(raw),
            MetaTag::CodecArray(spec) => {
                let pipeline = self.lookup_pipeline(spec)?;
                let items = raw.as_array().ok_or_else(|| {
                    KsonError::Codec(format!(
                        "codec '{}' applies element-wise, expected an array, got {}",
                        spec,
                        type_name(raw)
                    ))
                })?;
                // fresh vector, the caller's data stays untouched
                items
                    .iter()
                    .map(|item| pipeline.encode(item))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array)
            }
        }
    }

    /// Decode KSON text back into plain data. With no `schema_ref` the
    /// schema id is read from the stream's leading marker; an explicit
    /// reference overrides (and still consumes) the marker.
    ///
    /// Text that parses to anything other than a non-empty array, or to
    /// an array with neither a marker nor an explicit reference, is
    /// returned unchanged: plain JSON stays plain JSON.
    pub fn decode(&self, input: &str, schema_ref: Option<&str>) -> Result<Value> {
        let value: Value = serde_json::from_str(input)?;
        self.decode_value(value, schema_ref)
    }

    /// Decode an already-parsed JSON value.
    pub fn decode_value(&self, input: Value, schema_ref: Option<&str>) -> Result<Value> {
        self.decode_inner(input, schema_ref, false)
    }

    fn decode_inner(
        &self,
        input: Value,
        schema_ref: Option<&str>,
        recursive: bool,
    ) -> Result<Value> {
        // data that was never schema-encoded passes through untouched
        let elements = match input {
            Value::Array(items) if !items.is_empty() => items,
            other => return Ok(other),
        };

        let (reference, data_start) = match schema_ref {
            Some(reference) => (reference.to_string(), usize::from(!recursive)),
            None => match elements.first() {
                Some(Value::String(marker)) => (marker.clone(), 1),
                _ => return Ok(Value::Array(elements)),
            },
        };

        let (is_array, schema_id) = split_array_prefix(&reference);
        let compiled = self.compiled(schema_id)?;
        let schema = compiled.schema();
        let width = schema.fields.len();
        if width == 0 {
            return Ok(if is_array {
                Value::Array(Vec::new())
            } else {
                Value::Null
            });
        }

        let body: Vec<Value> = elements.into_iter().skip(data_start).collect();
        let mut records = Vec::with_capacity(body.len() / width + 1);
        for chunk in body.chunks(width) {
            let mut record = Map::new();
            for ((field, tag), element) in
                schema.fields.iter().zip(compiled.tags()).zip(chunk)
            {
                record.insert(field.clone(), self.decode_field(element, tag)?);
            }
            records.push(Value::Object(record));
        }

        if is_array {
            Ok(Value::Array(records))
        } else {
            Ok(records.pop().unwrap_or(Value::Null))
        }
    }

    fn decode_field(&self, raw: &Value, tag: &MetaTag) -> Result<Value> {
        if raw.is_null() {
            return Ok(Value::Null);
        }
        match tag {
            MetaTag::Plain | MetaTag::PlainArray => Ok(raw.clone()),
            MetaTag::NestedObject(id) => self.decode_inner(raw.clone(), Some(id), true),
            MetaTag::NestedArray(id) => {
                let reference = format!("{}{}", ARRAY_PREFIX, id);
                self.decode_inner(raw.clone(), Some(&reference), true)
            }
            MetaTag::Codec(spec) => self.lookup_pipeline(spec)?.decode(raw),
            MetaTag::CodecArray(spec) => {
                let pipeline = self.lookup_pipeline(spec)?;
                let items = raw.as_array().ok_or_else(|| {
                    KsonError::Codec(format!(
                        "codec '{}' applies element-wise, expected an array, got {}",
                        spec,
                        type_name(raw)
                    ))
                })?;
                items
                    .iter()
                    .map(|item| pipeline.decode(item))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array)
            }
        }
    }

    fn lookup_pipeline(&self, spec: &str) -> Result<&Pipeline> {
        self.pipeline(spec).ok_or_else(|| KsonError::InvalidPipeline {
            spec: spec.to_string(),
            reason: "pipeline was never compiled".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> Kson {
        let mut kson = Kson::new();
        kson.register_schema_str(r#"["schema", "basic", ["a", "b", "c"], [0, 0, "[]"]]"#)
            .unwrap();
        kson
    }

    #[test]
    fn test_encode_single_record() {
        let kson = context();
        let encoded = kson
            .encode(&json!({"a": "foo", "b": "bar", "c": [1, 2]}), "basic")
            .unwrap();
        assert_eq!(encoded, r#"["basic","foo","bar",[1,2]]"#);
    }

    #[test]
    fn test_missing_field_encodes_as_null() {
        let kson = context();
        let encoded = kson.encode(&json!({"a": "foo"}), "basic").unwrap();
        assert_eq!(encoded, r#"["basic","foo",null,null]"#);
    }

    #[test]
    fn test_unknown_keys_are_dropped() {
        let kson = context();
        let encoded = kson
            .encode(&json!({"a": "foo", "b": "bar", "c": [], "zz": 1}), "basic")
            .unwrap();
        assert_eq!(encoded, r#"["basic","foo","bar",[]]"#);
    }

    #[test]
    fn test_array_mode_requires_array() {
        let kson = context();
        let result = kson.encode(&json!({"a": "foo"}), "[]basic");
        match result {
            Err(KsonError::ShapeMismatch { id, expected, actual }) => {
                assert_eq!(id, "basic");
                assert_eq!(expected, "array");
                assert_eq!(actual, "object");
            }
            other => panic!("Expected ShapeMismatch, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_object_mode_requires_object() {
        let kson = context();
        assert!(matches!(
            kson.encode(&json!([1, 2]), "basic"),
            Err(KsonError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_unregistered_schema_fails() {
        let kson = Kson::new();
        assert!(matches!(
            kson.encode(&json!({}), "ghost"),
            Err(KsonError::SchemaNotFound(id)) if id == "ghost"
        ));
    }

    #[test]
    fn test_decode_reads_marker() {
        let kson = context();
        let decoded = kson
            .decode(r#"["basic","foo","bar",[1,2]]"#, None)
            .unwrap();
        assert_eq!(decoded, json!({"a": "foo", "b": "bar", "c": [1, 2]}));
    }

    #[test]
    fn test_explicit_ref_overrides_marker() {
        let mut kson = context();
        kson.register_schema_str(r#"["schema", "renamed", ["x", "y", "z"], [0, 0, "[]"]]"#)
            .unwrap();
        let decoded = kson
            .decode(r#"["basic","foo","bar",[1,2]]"#, Some("renamed"))
            .unwrap();
        assert_eq!(decoded, json!({"x": "foo", "y": "bar", "z": [1, 2]}));
    }

    #[test]
    fn test_plain_json_passes_through() {
        let kson = context();
        assert_eq!(kson.decode("42", None).unwrap(), json!(42));
        assert_eq!(kson.decode("[]", None).unwrap(), json!([]));
        assert_eq!(
            kson.decode(r#"{"a": 1}"#, None).unwrap(),
            json!({"a": 1})
        );
        // no marker, no explicit reference
        assert_eq!(kson.decode("[1, 2, 3]", None).unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn test_decode_null_field_stays_null() {
        let kson = context();
        let decoded = kson.decode(r#"["basic",null,"bar",null]"#, None).unwrap();
        assert_eq!(decoded, json!({"a": null, "b": "bar", "c": null}));
    }
}

//! Schema inference and canonicalization
//!
//! Inference derives a schema tree from example data: the union of keys
//! seen across an object (or every object element of an array), sorted
//! lexicographically, with container-valued fields described by
//! recursively inferred child schemas. Ids follow the pattern
//! `{prefix}-{level}-{index}[-{field}]`. Once the tree is registered,
//! canonicalization collapses structurally identical schemas under the
//! prefix to a fixed point, rewriting references to the discarded ids.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::codec::type_name;
use crate::error::{KsonError, Result};
use crate::registry::Kson;
use crate::schema::{MetaEntry, Schema, ARRAY_PREFIX};

/// What one inference step learned about a value.
enum Inferred {
    /// Scalar-bearing object with nothing to describe
    Scalar,
    /// Sequence with no object elements
    ScalarArray,
    /// Object described by a registered schema
    Object(String),
    /// Sequence of objects described by a registered schema
    Array(String),
}

impl Inferred {
    fn meta_entry(&self) -> MetaEntry {
        match self {
            Inferred::Scalar => MetaEntry::Plain,
            Inferred::ScalarArray => MetaEntry::Tag(ARRAY_PREFIX.to_string()),
            Inferred::Object(id) => MetaEntry::Tag(id.clone()),
            Inferred::Array(id) => MetaEntry::Tag(format!("{}{}", ARRAY_PREFIX, id)),
        }
    }
}

fn random_prefix() -> String {
    let suffix: String = (0..8).map(|_| fastrand::alphanumeric()).collect();
    format!("auto-schema-{}", suffix)
}

impl Kson {
    /// Infer and register schemas describing `data`, returning the root
    /// schema reference (array-prefixed when the input is a sequence)
    /// and every schema registered under the prefix, deepest id first.
    pub fn infer_schemas(
        &mut self,
        data: &Value,
        id_prefix: Option<&str>,
    ) -> Result<(String, Vec<Schema>)> {
        let prefix = id_prefix.map(String::from).unwrap_or_else(random_prefix);
        let root = self.infer_value(data, &prefix, 0, 0, None)?;
        self.canonicalize(&prefix);

        let root_ref = match root {
            Inferred::Scalar => "0".to_string(),
            Inferred::ScalarArray => ARRAY_PREFIX.to_string(),
            Inferred::Object(id) => id,
            Inferred::Array(id) => format!("{}{}", ARRAY_PREFIX, id),
        };

        let mut schemas: Vec<Schema> = self
            .schemas
            .values()
            .map(|compiled| compiled.schema().clone())
            .filter(|schema| schema.id.starts_with(&prefix))
            .collect();
        schemas.sort_by(|a, b| b.id.cmp(&a.id));

        Ok((root_ref, schemas))
    }

    /// Infer from a JSON text document.
    pub fn infer_schemas_str(
        &mut self,
        text: &str,
        id_prefix: Option<&str>,
    ) -> Result<(String, Vec<Schema>)> {
        let data: Value = serde_json::from_str(text)?;
        self.infer_schemas(&data, id_prefix)
    }

    fn infer_value(
        &mut self,
        data: &Value,
        prefix: &str,
        level: usize,
        index: usize,
        field_hint: Option<&str>,
    ) -> Result<Inferred> {
        let mut fields: BTreeSet<String> = BTreeSet::new();
        let mut meta_map: BTreeMap<String, MetaEntry> = BTreeMap::new();

        match data {
            Value::Object(map) => {
                fields.extend(map.keys().cloned());
                self.infer_fields(map, prefix, level, &mut meta_map)?;
            }
            Value::Array(items) => {
                for item in items {
                    if let Value::Object(map) = item {
                        fields.extend(map.keys().cloned());
                        self.infer_fields(map, prefix, level, &mut meta_map)?;
                    }
                }
            }
            other => {
                return Err(KsonError::Infer(format!(
                    "top level must be an object or array, got {}",
                    type_name(other)
                )))
            }
        }

        if fields.is_empty() {
            return Ok(if data.is_array() {
                Inferred::ScalarArray
            } else {
                Inferred::Scalar
            });
        }

        let mut schema_id = format!("{}-{}-{}", prefix, level, index);
        if let Some(hint) = field_hint {
            schema_id.push('-');
            schema_id.push_str(hint);
        }
        trace!(id = %schema_id, fields = fields.len(), "inferred schema");

        let fields: Vec<String> = fields.into_iter().collect();
        let meta = fields
            .iter()
            .map(|field| meta_map.get(field).cloned().unwrap_or(MetaEntry::Plain))
            .collect();
        self.register_schema(Schema::new(schema_id.clone(), fields, meta))?;

        Ok(if data.is_array() {
            Inferred::Array(schema_id)
        } else {
            Inferred::Object(schema_id)
        })
    }

    /// Infer child schemas for every container-valued field of one
    /// object, tracking a running per-object index.
    fn infer_fields(
        &mut self,
        map: &Map<String, Value>,
        prefix: &str,
        level: usize,
        meta_map: &mut BTreeMap<String, MetaEntry>,
    ) -> Result<()> {
        let mut index = 0;
        for (field, value) in map {
            if value.is_object() || value.is_array() {
                let child = self.infer_value(value, prefix, level + 1, index, Some(field))?;
                meta_map.insert(field.clone(), child.meta_entry());
                index += 1;
            }
        }
        Ok(())
    }

    /// Collapse structurally identical schemas under `prefix` to a fixed
    /// point. After every merge the scan restarts, since rewriting
    /// references can make previously distinct schemas identical; each
    /// merge strictly shrinks the schema set, so the loop terminates.
    fn canonicalize(&mut self, prefix: &str) {
        loop {
            let mut ids: Vec<String> = self
                .schemas
                .keys()
                .filter(|id| id.starts_with(prefix))
                .cloned()
                .collect();
            ids.sort();

            let mut merge = None;
            'scan: for (i, canonical) in ids.iter().enumerate() {
                for duplicate in &ids[i + 1..] {
                    if self.structurally_equal(canonical, duplicate) {
                        merge = Some((canonical.clone(), duplicate.clone()));
                        break 'scan;
                    }
                }
            }

            let Some((canonical, duplicate)) = merge else {
                break;
            };
            debug!(%canonical, %duplicate, "merging identical schemas");
            self.schemas.remove(&duplicate);
            for compiled in self.schemas.values_mut() {
                compiled.replace_reference(&duplicate, &canonical);
            }
        }
    }

    fn structurally_equal(&self, a: &str, b: &str) -> bool {
        match (self.schema(a), self.schema(b)) {
            (Some(a), Some(b)) => a.fields == b.fields && a.meta == b.meta,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fields_are_sorted_union() {
        let mut kson = Kson::new();
        let data = json!([
            {"b": 1, "a": 2},
            {"c": 3, "a": 4}
        ]);
        let (root, schemas) = kson.infer_schemas(&data, Some("t")).unwrap();
        assert_eq!(root, "[]t-0-0");
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].fields, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_scalar_array_and_empty_object() {
        let mut kson = Kson::new();
        let (root, schemas) = kson.infer_schemas(&json!([1, 2, 3]), Some("t")).unwrap();
        assert_eq!(root, "[]");
        assert!(schemas.is_empty());

        let (root, schemas) = kson.infer_schemas(&json!({}), Some("u")).unwrap();
        assert_eq!(root, "0");
        assert!(schemas.is_empty());
    }

    #[test]
    fn test_scalar_top_level_rejected() {
        let mut kson = Kson::new();
        assert!(matches!(
            kson.infer_schemas(&json!("scalar"), Some("t")),
            Err(KsonError::Infer(_))
        ));
    }

    #[test]
    fn test_nested_fields_get_child_schemas() {
        let mut kson = Kson::new();
        let data = json!({
            "name": "n",
            "inner": {"x": 1},
            "tags": ["a", "b"]
        });
        let (root, schemas) = kson.infer_schemas(&data, Some("t")).unwrap();
        assert_eq!(root, "t-0-0");
        // root plus the inferred child for "inner"; "tags" is a scalar array
        assert_eq!(schemas.len(), 2);

        let root_schema = kson.schema("t-0-0").unwrap();
        assert_eq!(root_schema.fields, vec!["inner", "name", "tags"]);
        assert_eq!(
            root_schema.meta,
            vec![
                MetaEntry::Tag("t-1-0-inner".to_string()),
                MetaEntry::Plain,
                MetaEntry::Tag("[]".to_string()),
            ]
        );
    }

    #[test]
    fn test_canonicalization_merges_identical_siblings() {
        let mut kson = Kson::new();
        let data = json!({
            "left": {"x": 1, "y": 2},
            "right": {"x": 3, "y": 4}
        });
        let (_, schemas) = kson.infer_schemas(&data, Some("t")).unwrap();
        // left and right collapse into one child schema
        assert_eq!(schemas.len(), 2);

        let root_schema = kson.schema("t-0-0").unwrap();
        assert_eq!(
            root_schema.meta,
            vec![
                MetaEntry::Tag("t-1-0-left".to_string()),
                MetaEntry::Tag("t-1-0-left".to_string()),
            ]
        );
        assert!(kson.schema("t-1-1-right").is_none());
    }

    #[test]
    fn test_canonicalization_fixed_point() {
        let mut kson = Kson::new();
        // identical grandchildren make the parents identical after one
        // merge; the restart catches the second-order duplicate
        let data = json!({
            "p1": {"kid": {"x": 1}},
            "p2": {"kid": {"x": 2}}
        });
        let (_, schemas) = kson.infer_schemas(&data, Some("t")).unwrap();
        assert_eq!(schemas.len(), 3);

        let ids: Vec<&str> = schemas.iter().map(|s| s.id.as_str()).collect();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                let (sa, sb) = (kson.schema(a).unwrap(), kson.schema(b).unwrap());
                assert!(
                    sa.fields != sb.fields || sa.meta != sb.meta,
                    "schemas {} and {} are still identical",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn test_inferred_schemas_round_trip() {
        let mut kson = Kson::new();
        let data = json!([
            {"title": "first", "hits": 10, "tags": ["x"]},
            {"title": "second", "tags": ["y", "z"]}
        ]);
        let (root, _) = kson.infer_schemas(&data, Some("t")).unwrap();
        let encoded = kson.encode(&data, &root).unwrap();
        let decoded = kson.decode(&encoded, None).unwrap();
        assert_eq!(
            decoded,
            json!([
                {"hits": 10, "tags": ["x"], "title": "first"},
                {"hits": null, "tags": ["y", "z"], "title": "second"}
            ])
        );
    }

    #[test]
    fn test_random_prefix_shape() {
        let prefix = random_prefix();
        assert!(prefix.starts_with("auto-schema-"));
        assert_eq!(prefix.len(), "auto-schema-".len() + 8);
    }
}

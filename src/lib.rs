//! KSON: Keystripped Schemafied Object Notation
//!
//! A compact, schema-driven re-encoding of JSON data. A schema names an
//! ordered list of fields plus a per-field metadata tag; encoding strips
//! object keys and lays the values out positionally, optionally running
//! leaves through chains of reversible value codecs (prefix/suffix
//! stripping, enum-to-index, date-to-epoch, base-36 integers).
//!
//! ## Features
//!
//! - **Positional Encoding**: keys live in the schema, not the stream
//! - **Codec Pipelines**: composable per-field value transforms
//! - **Nested Schemas**: objects and arrays of objects flatten recursively
//! - **Self-Describing Streams**: a leading marker names the schema
//! - **Schema Inference**: derive and deduplicate schemas from sample data
//!
//! ## Example
//!
//! ```
//! use kson::Kson;
//! use serde_json::json;
//!
//! let mut kson = Kson::new();
//! kson.register_schema_str(r#"["schema", "point", ["x", "y"], [0, 0]]"#)
//!     .unwrap();
//!
//! let text = kson.encode(&json!({"x": 1, "y": 2}), "point").unwrap();
//! assert_eq!(text, r#"["point",1,2]"#);
//!
//! let back = kson.decode(&text, None).unwrap();
//! assert_eq!(back, json!({"x": 1, "y": 2}));
//! ```
//!
//! The wire format is plain JSON array text: a schema-id marker (prefixed
//! `[]` for a sequence of records), then the field values of every record
//! back to back. The shape itself is not in the stream; a decoder needs
//! the same schema definitions the encoder used.

pub mod codec;
pub mod config;
mod engine;
pub mod error;
mod infer;
pub mod pipeline;
pub mod registry;
pub mod schema;

pub use codec::Codec;
pub use config::{KsonConfig, OutputFormat};
pub use error::{KsonError, Result};
pub use pipeline::Pipeline;
pub use registry::{CompiledSchema, Kson, SCHEMA_SCHEMA_ID};
pub use schema::{find_top_schema, MetaEntry, MetaTag, Schema};

//! Codec pipeline parsing and composition
//!
//! A pipeline spec is a `|`-separated chain of codec stages, each stage a
//! `:`-separated codec name plus arguments (`"date|int36"`,
//! `"enum:low:high"`). A backslash escapes the next character, so `\|`
//! and `\:` are literal inside arguments. Encode applies the stages first
//! to last; decode unwinds them last to first.

use serde_json::Value;

use crate::codec::Codec;
use crate::error::{KsonError, Result};

/// One parsed stage of a pipeline spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Stage {
    pub name: String,
    pub args: Vec<String>,
}

/// A compiled chain of codecs, cached under its originating spec string.
pub struct Pipeline {
    spec: String,
    stages: Vec<Codec>,
}

impl Pipeline {
    pub(crate) fn new(spec: impl Into<String>, stages: Vec<Codec>) -> Self {
        Self {
            spec: spec.into(),
            stages,
        }
    }

    /// The raw spec string this pipeline was compiled from.
    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// Apply every stage's encoder, first to last.
    pub fn encode(&self, val: &Value) -> Result<Value> {
        let mut out = val.clone();
        for stage in &self.stages {
            out = stage.encode(&out)?;
        }
        Ok(out)
    }

    /// Apply every stage's decoder, last to first.
    pub fn decode(&self, val: &Value) -> Result<Value> {
        let mut out = val.clone();
        for stage in self.stages.iter().rev() {
            out = stage.decode(&out)?;
        }
        Ok(out)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("spec", &self.spec)
            .field("stages", &self.stages.len())
            .finish()
    }
}

/// Parse a raw spec string into stages.
pub(crate) fn parse_spec(spec: &str) -> Result<Vec<Stage>> {
    let invalid = |reason: String| KsonError::InvalidPipeline {
        spec: spec.to_string(),
        reason,
    };

    let mut stages = Vec::new();
    for segment in split_unescaped(spec, '|').map_err(&invalid)? {
        if segment.is_empty() {
            continue;
        }
        let mut tokens = split_unescaped(&segment, ':')
            .map_err(&invalid)?
            .into_iter()
            .map(|token| unescape(&token));
        let name = match tokens.next() {
            Some(name) if !name.is_empty() => name,
            _ => return Err(invalid("missing codec name".to_string())),
        };
        stages.push(Stage {
            name,
            args: tokens.collect(),
        });
    }

    if stages.is_empty() {
        return Err(invalid("no codec stages".to_string()));
    }
    Ok(stages)
}

/// Split on an unescaped separator, keeping escape sequences intact so a
/// later pass can split on a different separator.
fn split_unescaped(input: &str, sep: char) -> std::result::Result<Vec<String>, String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(escaped) => {
                    current.push('\\');
                    current.push(escaped);
                }
                None => return Err("unbalanced escape at end of spec".to_string()),
            }
        } else if c == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    Ok(parts)
}

/// Strip escape markers from a token that already passed splitting.
fn unescape(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

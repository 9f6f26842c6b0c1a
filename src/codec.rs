//! Value codecs
//!
//! A codec is a reversible transform over JSON leaf values, built by a
//! factory function from the arguments written in its pipeline spec
//! (e.g. `enum:low:high` or `prefix:user-`). Encode and decode must be
//! inverses over the codec's domain so that pipelines stay lossless.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::error::{KsonError, Result};

/// A compiled encode/decode pair over JSON values.
pub struct Codec {
    encode: Box<dyn Fn(&Value) -> Result<Value> + Send + Sync>,
    decode: Box<dyn Fn(&Value) -> Result<Value> + Send + Sync>,
}

impl Codec {
    /// Build a codec from an encode and a decode closure.
    pub fn new<E, D>(encode: E, decode: D) -> Self
    where
        E: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
        D: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            encode: Box::new(encode),
            decode: Box::new(decode),
        }
    }

    pub fn encode(&self, val: &Value) -> Result<Value> {
        (self.encode)(val)
    }

    pub fn decode(&self, val: &Value) -> Result<Value> {
        (self.decode)(val)
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec").finish_non_exhaustive()
    }
}

/// Factory signature: pipeline-spec arguments in, codec out.
pub type CodecFactory = Box<dyn Fn(&[String]) -> Result<Codec> + Send + Sync>;

/// JSON type name, for error messages.
pub(crate) fn type_name(val: &Value) -> &'static str {
    match val {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn expect_str<'a>(codec: &str, val: &'a Value) -> Result<&'a str> {
    val.as_str().ok_or_else(|| {
        KsonError::Codec(format!(
            "{} codec expects a string, got {}",
            codec,
            type_name(val)
        ))
    })
}

fn expect_i64(codec: &str, val: &Value) -> Result<i64> {
    val.as_i64().ok_or_else(|| {
        KsonError::Codec(format!(
            "{} codec expects an integer, got {}",
            codec,
            type_name(val)
        ))
    })
}

/// JSON truthiness: false, null, 0, "" and empty containers are falsy.
fn is_truthy(val: &Value) -> bool {
    match val {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Render an integer in base 36, lowercase, with a leading `-` for
/// negative values.
pub(crate) fn to_base36(num: i64) -> String {
    if num == 0 {
        return "0".to_string();
    }
    let negative = num < 0;
    let mut n = (num as i128).unsigned_abs();
    let mut digits = String::new();
    while n > 0 {
        digits.push(BASE36_DIGITS[(n % 36) as usize] as char);
        n /= 36;
    }
    if negative {
        digits.push('-');
    }
    digits.chars().rev().collect()
}

/// `prefix:P`: strip a required leading `P` on encode, restore it on
/// decode.
pub(crate) fn prefix_codec(args: &[String]) -> Result<Codec> {
    let prefix = args
        .first()
        .cloned()
        .ok_or_else(|| KsonError::Codec("prefix codec requires a prefix argument".to_string()))?;
    let encode_prefix = prefix.clone();

    Ok(Codec::new(
        move |val| {
            let s = expect_str("prefix", val)?;
            match s.strip_prefix(&encode_prefix) {
                Some(rest) => Ok(Value::String(rest.to_string())),
                None => Err(KsonError::Codec(format!(
                    "expected '{}' to have prefix '{}'",
                    s, encode_prefix
                ))),
            }
        },
        move |raw| {
            let s = expect_str("prefix", raw)?;
            Ok(Value::String(format!("{}{}", prefix, s)))
        },
    ))
}

/// `suffix:S`: strip a required trailing `S` on encode, restore it on
/// decode.
pub(crate) fn suffix_codec(args: &[String]) -> Result<Codec> {
    let suffix = args
        .first()
        .cloned()
        .ok_or_else(|| KsonError::Codec("suffix codec requires a suffix argument".to_string()))?;
    let encode_suffix = suffix.clone();

    Ok(Codec::new(
        move |val| {
            let s = expect_str("suffix", val)?;
            match s.strip_suffix(&encode_suffix) {
                Some(rest) => Ok(Value::String(rest.to_string())),
                None => Err(KsonError::Codec(format!(
                    "expected '{}' to have suffix '{}'",
                    s, encode_suffix
                ))),
            }
        },
        move |raw| {
            let s = expect_str("suffix", raw)?;
            Ok(Value::String(format!("{}{}", s, suffix)))
        },
    ))
}

/// `bool`: truthiness to `1`/`0` on encode, back to a boolean on decode.
pub(crate) fn bool_codec(_args: &[String]) -> Result<Codec> {
    Ok(Codec::new(
        |val| Ok(Value::from(if is_truthy(val) { 1 } else { 0 })),
        |raw| Ok(Value::Bool(is_truthy(raw))),
    ))
}

/// `enum:v0:v1:...`: value to its index in `[0, v0, v1, ...]`; `0` is
/// implicitly the first member. Unknown values pass through unchanged on
/// encode, non-integer stored values pass through on decode.
pub(crate) fn enum_codec(args: &[String]) -> Result<Codec> {
    let mut table: Vec<Value> = Vec::with_capacity(args.len() + 1);
    table.push(Value::from(0));
    table.extend(args.iter().map(|arg| Value::String(arg.clone())));
    let decode_table = table.clone();

    Ok(Codec::new(
        move |val| match table.iter().position(|member| member == val) {
            Some(idx) => Ok(Value::from(idx)),
            None => Ok(val.clone()),
        },
        move |raw| {
            if let Some(idx) = raw.as_i64() {
                return usize::try_from(idx)
                    .ok()
                    .and_then(|i| decode_table.get(i))
                    .cloned()
                    .ok_or_else(|| KsonError::Codec(format!("enum index {} out of range", idx)));
            }
            Ok(raw.clone())
        },
    ))
}

/// `int36`: integer to a base-36 string and back.
pub(crate) fn int36_codec(_args: &[String]) -> Result<Codec> {
    Ok(Codec::new(
        |val| {
            let n = expect_i64("int36", val)?;
            Ok(Value::String(to_base36(n)))
        },
        |raw| {
            let s = expect_str("int36", raw)?;
            let n = i64::from_str_radix(s, 36).map_err(|_| {
                KsonError::Codec(format!("invalid base-36 integer '{}'", s))
            })?;
            Ok(Value::from(n))
        },
    ))
}

/// `date`: RFC 3339 timestamp string to Unix epoch seconds; decode
/// renders back in UTC with seconds precision.
pub(crate) fn date_codec(_args: &[String]) -> Result<Codec> {
    Ok(Codec::new(
        |val| {
            let s = expect_str("date", val)?;
            let ts = DateTime::parse_from_rfc3339(s).map_err(|e| {
                KsonError::Codec(format!("invalid timestamp '{}': {}", s, e))
            })?;
            Ok(Value::from(ts.timestamp()))
        },
        |raw| {
            let secs = expect_i64("date", raw)?;
            let ts = DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| {
                KsonError::Codec(format!("epoch seconds {} out of range", secs))
            })?;
            Ok(Value::String(ts.to_rfc3339_opts(SecondsFormat::Secs, true)))
        },
    ))
}

/// `iso8601`: the mirror of `date`, taking epoch seconds to an
/// RFC 3339 string on encode, parsed back to epoch seconds on decode.
pub(crate) fn iso8601_codec(_args: &[String]) -> Result<Codec> {
    Ok(Codec::new(
        |val| {
            let secs = expect_i64("iso8601", val)?;
            let ts = DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| {
                KsonError::Codec(format!("epoch seconds {} out of range", secs))
            })?;
            Ok(Value::String(ts.to_rfc3339_opts(SecondsFormat::Secs, true)))
        },
        |raw| {
            let s = expect_str("iso8601", raw)?;
            let ts = DateTime::parse_from_rfc3339(s).map_err(|e| {
                KsonError::Codec(format!("invalid timestamp '{}': {}", s, e))
            })?;
            Ok(Value::from(ts.timestamp()))
        },
    ))
}

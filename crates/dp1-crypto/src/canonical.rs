//! Deterministic JSON serialization used as the signing payload.
//!
//! Object keys are emitted in sorted order at every depth, arrays keep their
//! order, and the output ends with exactly one `\n`. Two values that differ
//! only in key insertion order produce identical bytes.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CanonicalizationError;

/// Deepest nesting the walker will follow before giving up.
pub const MAX_DEPTH: usize = 128;

/// Largest integer a double can represent exactly (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Canonicalize any serializable value.
pub fn canonicalize<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonicalizationError> {
    let value = serde_json::to_value(value)
        .map_err(|e| CanonicalizationError::NotSerializable(e.to_string()))?;
    canonicalize_value(&value)
}

/// Canonicalize an already-built JSON value.
pub fn canonicalize_value(value: &Value) -> Result<String, CanonicalizationError> {
    let mut out = String::new();
    write_value(&mut out, value, 0)?;
    out.push('\n');
    Ok(out)
}

/// Canonicalize a resource with its top-level `signature` field removed.
pub fn canonicalize_unsigned<T: Serialize + ?Sized>(
    resource: &T,
) -> Result<String, CanonicalizationError> {
    let mut value = serde_json::to_value(resource)
        .map_err(|e| CanonicalizationError::NotSerializable(e.to_string()))?;
    if let Value::Object(map) = &mut value {
        map.remove("signature");
    }
    canonicalize_value(&value)
}

fn write_value(out: &mut String, value: &Value, depth: usize) -> Result<(), CanonicalizationError> {
    if depth > MAX_DEPTH {
        return Err(CanonicalizationError::DepthExceeded { limit: MAX_DEPTH });
    }
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(out, n)?,
        Value::String(s) => write_string(out, s)?,
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item, depth + 1)?;
            }
            out.push(']');
        }
        Value::Object(map) => write_object(out, map, depth)?,
    }
    Ok(())
}

fn write_object(
    out: &mut String,
    map: &Map<String, Value>,
    depth: usize,
) -> Result<(), CanonicalizationError> {
    // Sort by UTF-16 code units so the order matches JavaScript's default
    // string sort, which other DP-1 implementations sign with.
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));

    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(out, key)?;
        out.push(':');
        write_value(out, &map[key], depth + 1)?;
    }
    out.push('}');
    Ok(())
}

fn write_string(out: &mut String, s: &str) -> Result<(), CanonicalizationError> {
    let quoted =
        serde_json::to_string(s).map_err(|e| CanonicalizationError::NotSerializable(e.to_string()))?;
    out.push_str(&quoted);
    Ok(())
}

fn write_number(out: &mut String, n: &serde_json::Number) -> Result<(), CanonicalizationError> {
    if n.is_i64() || n.is_u64() {
        out.push_str(&n.to_string());
        return Ok(());
    }
    let f = n
        .as_f64()
        .ok_or_else(|| CanonicalizationError::NotSerializable(format!("number {n}")))?;
    if !f.is_finite() {
        return Err(CanonicalizationError::NotSerializable(format!("non-finite number {f}")));
    }
    // Integral doubles print without a fraction, as JSON.stringify does.
    if f.fract() == 0.0 && f.abs() < MAX_SAFE_INTEGER {
        out.push_str(&(f as i64).to_string());
    } else {
        out.push_str(&n.to_string());
    }
    Ok(())
}

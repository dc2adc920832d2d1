// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical JSON serialization and canonical-key normalization.
//!
//! Everything in MACE that is hashed, signed, or compared byte-for-byte goes
//! through [`canonical_serialize`]. The rules are deliberately small:
//!
//! - mapping keys are NFKD-normalized, then sorted lexicographically;
//! - separators are exactly `,` and `:` (no whitespace);
//! - strings are NFKD-normalized and Unicode is not escaped;
//! - floats render with exactly 9 fractional digits, integers without a
//!   decimal point;
//! - `null`, booleans, and arrays follow standard JSON.
//!
//! [`canonical_key`] maps free-form text onto the `[a-z0-9_./:-]` key
//! alphabet used by semantic memory. The mapping is intentionally
//! many-to-one; colliding inputs resolve as last-write-wins downstream.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod key;

pub use key::canonical_key;

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use unicode_normalization::UnicodeNormalization;

/// Errors from canonical serialization.
#[derive(Debug, thiserror::Error)]
pub enum CanonError {
    /// The value could not be converted to a JSON tree.
    #[error("failed to convert value to JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Produce the canonical byte string for any serializable value.
///
/// The output is stable across processes and platforms, and idempotent:
/// parsing the output back to JSON and re-serializing yields the same bytes.
///
/// # Errors
///
/// Returns [`CanonError::Json`] if the value cannot be represented as JSON.
/// Non-finite floats become `null` during conversion, the same treatment
/// `serde_json` applies.
///
/// # Examples
///
/// ```
/// let v = serde_json::json!({"b": 1, "a": [true, null]});
/// assert_eq!(
///     mace_canon::canonical_serialize(&v).unwrap(),
///     r#"{"a":[true,null],"b":1}"#
/// );
/// ```
pub fn canonical_serialize<T: Serialize>(value: &T) -> Result<String, CanonError> {
    let v = serde_json::to_value(value)?;
    let mut out = String::new();
    write_value(&v, &mut out);
    Ok(out)
}

fn write_value(v: &serde_json::Value, out: &mut String) {
    match v {
        serde_json::Value::Null => out.push_str("null"),
        serde_json::Value::Bool(true) => out.push_str("true"),
        serde_json::Value::Bool(false) => out.push_str("false"),
        serde_json::Value::Number(n) => write_number(n, out),
        serde_json::Value::String(s) => write_string(s, out),
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        serde_json::Value::Object(map) => {
            // Normalize keys before sorting; a later duplicate under
            // normalization wins, matching last-write-wins everywhere else.
            let mut entries: BTreeMap<String, &serde_json::Value> = BTreeMap::new();
            for (k, val) in map {
                entries.insert(nfkd(k), val);
            }
            out.push('{');
            for (i, (k, val)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(k, out);
                out.push(':');
                write_value(val, out);
            }
            out.push('}');
        }
    }
}

fn write_number(n: &serde_json::Number, out: &mut String) {
    if let Some(i) = n.as_i64() {
        out.push_str(&i.to_string());
    } else if let Some(u) = n.as_u64() {
        out.push_str(&u.to_string());
    } else if let Some(f) = n.as_f64() {
        // Exactly 9 fractional digits, ties to even. This is the one
        // canonical float rendering used for hashing, signing, storage, and
        // replay comparison alike. serde_json numbers are always i64, u64,
        // or finite f64, so no other case exists.
        out.push_str(&format!("{f:.9}"));
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.nfkd() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn nfkd(s: &str) -> String {
    s.nfkd().collect()
}

/// Compute the hex-encoded SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

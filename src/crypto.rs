//! Hashing and canonical serialization for ProofChain
//!
//! Blocks are identified by the SHA-256 digest of their canonical JSON text.
//! The canonical form sorts object keys, separates items with `", "` and keys
//! from values with `": "`, and escapes every character outside printable
//! ASCII as `\uXXXX`. Integers are written exactly at any magnitude; floats
//! are written in their shortest round-trip form, switching to exponent
//! notation below `1e-4` and from `1e16` on. Nodes built independently
//! therefore agree on the hash of logically identical blocks.

use crate::error::Result;
use serde::Serialize;
use serde_json::{Number, Value};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    hex::encode(hasher.finalize())
}

/// Canonical JSON text of any serializable value.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    let mut out = String::new();
    write_canonical(&value, &mut out);
    Ok(out)
}

/// SHA-256 over the canonical JSON text of `value`, as lowercase hex.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<String> {
    Ok(sha256_hex(to_canonical_json(value)?))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(n, out),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Sort explicitly; the map's own order depends on serde_json features.
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_string(key, out);
                out.push_str(": ");
                write_canonical(item, out);
            }
            out.push('}');
        }
    }
}

fn write_number(n: &Number, out: &mut String) {
    // Numbers keep their source text, so an integer is whatever has no
    // fraction or exponent, regardless of size.
    let text = n.to_string();
    let digits = text.strip_prefix('-').unwrap_or(&text);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        if digits.bytes().all(|b| b == b'0') {
            out.push('0');
        } else {
            out.push_str(&text);
        }
        return;
    }
    match text.parse::<f64>() {
        Ok(f) => write_float(f, out),
        Err(_) => out.push_str(&text),
    }
}

fn write_float(f: f64, out: &mut String) {
    if f.is_nan() {
        out.push_str("NaN");
        return;
    }
    if f.is_infinite() {
        out.push_str(if f > 0.0 { "Infinity" } else { "-Infinity" });
        return;
    }

    // `{:e}` gives the shortest round-trip digits with a bare exponent.
    let scientific = format!("{:e}", f);
    if let Some((mantissa, exponent)) = scientific.split_once('e') {
        if let Ok(exponent) = exponent.parse::<i32>() {
            if !(-4..16).contains(&exponent) {
                let sign = if exponent < 0 { '-' } else { '+' };
                let _ = write!(out, "{}e{}{:02}", mantissa, sign, exponent.abs());
                return;
            }
        }
    }

    let positional = f.to_string();
    out.push_str(&positional);
    if !positional.contains('.') {
        out.push_str(".0");
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{:04x}", unit);
                }
            }
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_keys_are_sorted_at_every_level() {
        let value = json!({"b": 1, "a": {"z": true, "m": null}, "c": [2, "x"]});
        assert_eq!(
            to_canonical_json(&value).unwrap(),
            r#"{"a": {"m": null, "z": true}, "b": 1, "c": [2, "x"]}"#
        );
    }

    #[test]
    fn test_non_ascii_is_escaped() {
        let value = json!({"name": "café ☕ \u{1F600}", "ctl": "a\u{1}b\"c"});
        assert_eq!(
            to_canonical_json(&value).unwrap(),
            r#"{"ctl": "a\u0001b\"c", "name": "caf\u00e9 \u2615 \ud83d\ude00"}"#
        );
    }

    #[test]
    fn test_hash_ignores_field_declaration_order() {
        #[derive(Serialize)]
        struct Forward {
            alpha: u32,
            beta: &'static str,
        }
        #[derive(Serialize)]
        struct Reversed {
            beta: &'static str,
            alpha: u32,
        }

        let forward = canonical_hash(&Forward { alpha: 7, beta: "x" }).unwrap();
        let reversed = canonical_hash(&Reversed { beta: "x", alpha: 7 }).unwrap();
        assert_eq!(forward, reversed);
        assert_eq!(forward.len(), 64);
        assert!(forward.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_floats_and_integers_render_differently() {
        assert_eq!(to_canonical_json(&json!([1, 1.0, 1.5])).unwrap(), "[1, 1.0, 1.5]");
    }

    #[test]
    fn test_number_text_matches_reference_encoder() {
        let cases = [
            ("1e-05", "1e-05"),
            ("0.00001", "1e-05"),
            ("0.0001", "0.0001"),
            ("1e16", "1e+16"),
            ("1e+16", "1e+16"),
            ("1e15", "1000000000000000.0"),
            ("1.5e300", "1.5e+300"),
            ("2.50", "2.5"),
            ("1E2", "100.0"),
            ("-0.0", "-0.0"),
            ("-0", "0"),
            ("1700000000.25", "1700000000.25"),
            ("100000000000000000000", "100000000000000000000"),
            ("-100000000000000000000", "-100000000000000000000"),
        ];
        for (input, expected) in cases {
            let value: Value = serde_json::from_str(input).unwrap();
            assert_eq!(to_canonical_json(&value).unwrap(), expected, "input {}", input);
        }
    }

    #[test]
    fn test_floats_built_in_code_render_like_parsed_ones() {
        assert_eq!(to_canonical_json(&json!(0.00001)).unwrap(), "1e-05");
        assert_eq!(to_canonical_json(&json!(1e16)).unwrap(), "1e+16");
        assert_eq!(to_canonical_json(&json!(0.1)).unwrap(), "0.1");
    }
}

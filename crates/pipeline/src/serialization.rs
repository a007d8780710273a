//! Stable JSON output for training results.
//!
//! Results are written with fixed two-space indentation and the metric order
//! the evaluator emitted, so identical runs produce identical bytes and the
//! BLAKE3 digest can be compared across machines.

use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Serializer};
use std::io::Write;

/// Serialize a value as stable pretty JSON into `writer`.
pub fn write_stable_json<T, W>(writer: W, value: &T) -> Result<(), serde_json::Error>
where
    T: Serialize,
    W: Write,
{
    let formatter = PrettyFormatter::with_indent(b"  ");
    let mut serializer = Serializer::with_formatter(writer, formatter);
    value.serialize(&mut serializer)
}

/// Serialize a value as stable pretty JSON.
pub fn stable_json_string<T>(value: &T) -> Result<String, serde_json::Error>
where
    T: Serialize,
{
    let mut buffer = Vec::new();
    write_stable_json(&mut buffer, value)?;
    // serde_json only emits UTF-8
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Hex-encoded BLAKE3 digest of `bytes`.
pub fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

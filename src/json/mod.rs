//! JSON text encoding for response bodies.
//!
//! Bodies use the spaced separator style (`", "` between items and `": "`
//! between a key and its value), so a handler returning
//! `json!({"message": "Hello World"})` produces exactly
//! `{"message": "Hello World"}` on the wire. Output stays on one line.

use std::io;

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};

/// A [`Formatter`] emitting single-line JSON with a space after every `,` and `:`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Encodes `value` as spaced JSON text.
///
/// # Errors
///
/// Fails when `value`'s `Serialize` impl fails, e.g. a map with non-string
/// keys or a custom impl returning an error.
pub fn to_vec<T>(value: &T) -> serde_json::Result<Vec<u8>>
where
    T: ?Sized + Serialize,
{
    let mut out = Vec::with_capacity(128);
    let mut ser = Serializer::with_formatter(&mut out, SpacedFormatter);
    value.serialize(&mut ser)?;
    Ok(out)
}

/// Builds the `{"error": "<message>"}` body used by every failure response.
pub fn error_body(message: &str) -> Vec<u8> {
    to_vec(&serde_json::json!({ "error": message }))
        .unwrap_or_else(|_| br#"{"error": "Internal Server Error"}"#.to_vec())
}

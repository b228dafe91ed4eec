//! JSON output encoding
//!
//! Renders a [`SelectionResult`] as the single-line JSON object consumed by
//! callers of the CLI. The layout is fixed:
//!
//! ```text
//! {"success": true, "plate": "MH12DE1433", "raw_results": ["MH12DE1433"]}
//! {"success": false, "error": "No image path provided"}
//! ```
//!
//! Separators are `", "` / `": "` and every non-ASCII character is emitted as
//! a `\uXXXX` escape, so the output is pure ASCII.

use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use serde_json::ser::Formatter;
use std::io::{self, Write};

use super::SelectionResult;

#[derive(Serialize)]
#[serde(untagged)]
enum WireResult<'a> {
    Success {
        success: bool,
        plate: &'a str,
        raw_results: &'a [String],
    },
    Failure {
        success: bool,
        error: &'a str,
    },
}

impl Serialize for SelectionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            SelectionResult::Success {
                plate,
                raw_candidates,
            } => WireResult::Success {
                success: true,
                plate,
                raw_results: raw_candidates,
            },
            SelectionResult::Failure { error } => WireResult::Failure {
                success: false,
                error,
            },
        };
        wire.serialize(serializer)
    }
}

impl SelectionResult {
    /// Encode as one line of ASCII JSON (no trailing newline)
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        let mut buf = Vec::with_capacity(128);
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, AsciiFormatter);
        self.serialize(&mut serializer)?;
        String::from_utf8(buf).map_err(serde_json::Error::custom)
    }
}

/// Compact JSON with spaced separators and ASCII-only strings
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        // quotes, backslashes and C0 controls never reach this point
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if c.is_ascii() && c != '\x7f' {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

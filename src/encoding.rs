//! Text encodings applied at the byte/text boundary.
//!
//! Buffers and sockets only ever see bytes. Text is encoded when it is
//! appended to an outbound buffer and decoded when a chunk is received.

use crate::error::{Error, Result};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Supported text encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    Ascii,
    Latin1,
}

impl Encoding {
    /// Canonical name of the encoding.
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Ascii => "ascii",
            Encoding::Latin1 => "latin-1",
        }
    }

    /// Encode text into bytes.
    ///
    /// Fails when a character has no representation in this encoding.
    pub fn encode<'a>(self, text: &'a str) -> Result<Cow<'a, [u8]>> {
        match self {
            Encoding::Utf8 => Ok(Cow::Borrowed(text.as_bytes())),
            Encoding::Ascii => {
                if let Some((pos, ch)) = text.char_indices().find(|(_, c)| !c.is_ascii()) {
                    return Err(self.encode_error(ch, pos));
                }
                Ok(Cow::Borrowed(text.as_bytes()))
            }
            Encoding::Latin1 => {
                if text.is_ascii() {
                    return Ok(Cow::Borrowed(text.as_bytes()));
                }
                let mut out = Vec::with_capacity(text.len());
                for (pos, ch) in text.char_indices() {
                    let code = ch as u32;
                    if code > 0xFF {
                        return Err(self.encode_error(ch, pos));
                    }
                    out.push(code as u8);
                }
                Ok(Cow::Owned(out))
            }
        }
    }

    /// Decode bytes into text.
    ///
    /// Bytes that are invalid for the encoding become U+FFFD; a chunk split
    /// in the middle of a multi-byte sequence therefore decodes lossily.
    pub fn decode(self, bytes: &[u8]) -> Cow<'_, str> {
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(bytes),
            Encoding::Ascii => {
                if bytes.is_ascii() {
                    // ASCII is a subset of UTF-8
                    String::from_utf8_lossy(bytes)
                } else {
                    Cow::Owned(
                        bytes
                            .iter()
                            .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
                            .collect(),
                    )
                }
            }
            Encoding::Latin1 => {
                if bytes.is_ascii() {
                    String::from_utf8_lossy(bytes)
                } else {
                    Cow::Owned(bytes.iter().map(|&b| b as char).collect())
                }
            }
        }
    }

    fn encode_error(self, ch: char, pos: usize) -> Error {
        Error::Encode {
            encoding: self.name(),
            reason: format!("character {ch:?} at byte {pos} is out of range"),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned for an unknown encoding name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEncoding(pub String);

impl fmt::Display for UnknownEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown encoding '{}'", self.0)
    }
}

impl std::error::Error for UnknownEncoding {}

impl FromStr for Encoding {
    type Err = UnknownEncoding;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "ascii" | "us-ascii" => Ok(Encoding::Ascii),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Encoding::Latin1),
            _ => Err(UnknownEncoding(s.to_string())),
        }
    }
}

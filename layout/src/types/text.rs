//! String types with a caller-selected text encoding.

use super::ValueType;
use crate::{
    context::{DecodeContext, EncodeContext},
    value::Value,
    Error,
};
use tracing::trace;

/// Text encoding used by string types.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Encoding {
    /// 7-bit ASCII. The high bit of every byte is ignored on decode; characters outside ASCII
    /// encode as `?`.
    #[default]
    Ascii,
    /// ISO-8859-1. Characters outside Latin-1 encode as `?`.
    Latin1,
    /// UTF-8. Invalid sequences decode as U+FFFD.
    Utf8,
    /// UTF-16, little-endian code units. Unpaired surrogates decode as U+FFFD.
    Utf16Le,
}

impl Encoding {
    /// Width of one code unit in bytes (and of the terminator of a null-terminated string).
    pub fn unit(&self) -> usize {
        match self {
            Encoding::Utf16Le => 2,
            _ => 1,
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Encoding::Ascii => bytes.iter().map(|b| char::from(b & 0x7F)).collect(),
            Encoding::Latin1 => bytes.iter().map(|b| char::from(*b)).collect(),
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Encoding::Utf16Le => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            }
        }
    }

    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Encoding::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
            Encoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
            Encoding::Utf8 => text.as_bytes().to_vec(),
            Encoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
        }
    }
}

fn text_value<'a>(value: &'a Value, context: &'static str) -> Result<&'a str, Error> {
    value
        .as_str()
        .ok_or_else(|| Error::InvalidValue(context, format!("expected a string, got {value}")))
}

/// A string stored in exactly `len` bytes.
///
/// NUL characters are stripped on decode, so a value containing them does not survive a round
/// trip. On encode the text is truncated or zero-padded to `len` bytes.
#[derive(Clone, Copy, Debug)]
pub struct FixedString {
    len: usize,
    encoding: Encoding,
}

impl FixedString {
    pub fn new(len: usize, encoding: Encoding) -> Self {
        Self { len, encoding }
    }
}

impl ValueType for FixedString {
    fn fixed_size(&self) -> Option<usize> {
        Some(self.len)
    }

    fn read(&self, ctx: &mut DecodeContext<'_>, offset: usize) -> Result<Value, Error> {
        let bytes = ctx.window(offset, self.len)?;
        Ok(Value::Str(self.encoding.decode(bytes).replace('\0', "")))
    }

    fn write(&self, value: &Value, offset: usize, ctx: &mut EncodeContext) -> Result<(), Error> {
        let mut bytes = self.encoding.encode(text_value(value, "FixedString")?);
        bytes.resize(self.len, 0);
        ctx.slot(offset, self.len)?.copy_from_slice(&bytes);
        Ok(())
    }
}

/// A string terminated by a zero code unit.
///
/// Has no fixed size, so it can only be reached through a reference.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullTerminated {
    encoding: Encoding,
}

impl NullTerminated {
    pub fn new(encoding: Encoding) -> Self {
        Self { encoding }
    }
}

impl ValueType for NullTerminated {
    fn fixed_size(&self) -> Option<usize> {
        None
    }

    fn read(&self, ctx: &mut DecodeContext<'_>, offset: usize) -> Result<Value, Error> {
        let unit = self.encoding.unit();
        let mut len = 0;
        loop {
            let window = ctx
                .window(offset + len, unit)
                .map_err(|_| Error::Unterminated(offset))?;
            if window.iter().all(|b| *b == 0) {
                break;
            }
            len += unit;
        }

        // The terminator is part of the value's footprint
        ctx.mark_read(offset, len + unit);
        trace!(offset, len, "read null-terminated string");

        let bytes = ctx.window(offset, len)?;
        Ok(Value::Str(self.encoding.decode(bytes)))
    }

    fn write(&self, value: &Value, offset: usize, ctx: &mut EncodeContext) -> Result<(), Error> {
        let bytes = self.encoding.encode(text_value(value, "NullTerminated")?);
        let unit = self.encoding.unit();
        let slot = ctx.slot(offset, bytes.len() + unit)?;
        slot[..bytes.len()].copy_from_slice(&bytes);
        slot[bytes.len()..].fill(0);
        Ok(())
    }

    fn encode_size(&self, value: &Value) -> Result<usize, Error> {
        let bytes = self.encoding.encode(text_value(value, "NullTerminated")?);
        Ok(bytes.len() + self.encoding.unit())
    }
}

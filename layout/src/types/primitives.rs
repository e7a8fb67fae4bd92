//! Fixed-width numeric, character, and padding types.
//!
//! Every numeric type exists in a little-endian (`Le`) and a big-endian (`Be`) flavour. The byte
//! order is part of the type: there is no runtime negotiation.
//!
//! Integers decode to [Value::Int] and floats to [Value::Float]. On encode, integers must be in
//! range for the target width (no silent truncation) and floats accept any number.

use super::{int_value, ValueType};
use crate::{
    context::{DecodeContext, EncodeContext},
    value::Value,
    Error,
};
use bytes::{Buf, BufMut};
use std::mem::size_of;

// Integer implementation
macro_rules! impl_int {
    ($name:ident, $type:ty, $read_method:ident, $write_method:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Debug, Default)]
        pub struct $name;

        impl ValueType for $name {
            #[inline]
            fn fixed_size(&self) -> Option<usize> {
                Some(size_of::<$type>())
            }

            #[inline]
            fn read(&self, ctx: &mut DecodeContext<'_>, offset: usize) -> Result<Value, Error> {
                let mut buf = ctx.window(offset, size_of::<$type>())?;
                Ok(Value::from(buf.$read_method()))
            }

            #[inline]
            fn write(
                &self,
                value: &Value,
                offset: usize,
                ctx: &mut EncodeContext,
            ) -> Result<(), Error> {
                let v: $type = int_value(value, stringify!($name))?;
                let mut buf = ctx.slot(offset, size_of::<$type>())?;
                buf.$write_method(v);
                Ok(())
            }
        }
    };
}

impl_int!(I16Le, i16, get_i16_le, put_i16_le, "Signed 16-bit little-endian integer.");
impl_int!(I16Be, i16, get_i16, put_i16, "Signed 16-bit big-endian integer.");
impl_int!(U16Le, u16, get_u16_le, put_u16_le, "Unsigned 16-bit little-endian integer.");
impl_int!(U16Be, u16, get_u16, put_u16, "Unsigned 16-bit big-endian integer.");
impl_int!(I32Le, i32, get_i32_le, put_i32_le, "Signed 32-bit little-endian integer.");
impl_int!(I32Be, i32, get_i32, put_i32, "Signed 32-bit big-endian integer.");
impl_int!(U32Le, u32, get_u32_le, put_u32_le, "Unsigned 32-bit little-endian integer.");
impl_int!(U32Be, u32, get_u32, put_u32, "Unsigned 32-bit big-endian integer.");
impl_int!(Byte, u8, get_u8, put_u8, "Unsigned 8-bit integer.");

// Float implementation
macro_rules! impl_float {
    ($name:ident, $read_method:ident, $write_method:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Debug, Default)]
        pub struct $name;

        impl ValueType for $name {
            #[inline]
            fn fixed_size(&self) -> Option<usize> {
                Some(size_of::<f32>())
            }

            #[inline]
            fn read(&self, ctx: &mut DecodeContext<'_>, offset: usize) -> Result<Value, Error> {
                let mut buf = ctx.window(offset, size_of::<f32>())?;
                Ok(Value::from(buf.$read_method()))
            }

            #[inline]
            fn write(
                &self,
                value: &Value,
                offset: usize,
                ctx: &mut EncodeContext,
            ) -> Result<(), Error> {
                let v = value.as_float().ok_or_else(|| {
                    Error::InvalidValue(stringify!($name), format!("expected a number, got {value}"))
                })?;
                let mut buf = ctx.slot(offset, size_of::<f32>())?;
                buf.$write_method(v as f32);
                Ok(())
            }
        }
    };
}

impl_float!(F32Le, get_f32_le, put_f32_le, "32-bit little-endian IEEE 754 float.");
impl_float!(F32Be, get_f32, put_f32, "32-bit big-endian IEEE 754 float.");

/// A single Latin-1 character.
#[derive(Clone, Copy, Debug, Default)]
pub struct Char;

impl ValueType for Char {
    fn fixed_size(&self) -> Option<usize> {
        Some(1)
    }

    fn read(&self, ctx: &mut DecodeContext<'_>, offset: usize) -> Result<Value, Error> {
        let mut buf = ctx.window(offset, 1)?;
        Ok(Value::Char(char::from(buf.get_u8())))
    }

    fn write(&self, value: &Value, offset: usize, ctx: &mut EncodeContext) -> Result<(), Error> {
        let c = match value {
            Value::Char(c) => *c,
            Value::Str(s) if s.chars().count() == 1 => s.chars().next().unwrap_or_default(),
            Value::Int(_) => char::from(int_value::<u8>(value, "Char")?),
            _ => {
                return Err(Error::InvalidValue(
                    "Char",
                    format!("expected a character, got {value}"),
                ))
            }
        };
        let byte = u8::try_from(u32::from(c))
            .map_err(|_| Error::InvalidValue("Char", format!("{c} is not Latin-1")))?;
        let mut buf = ctx.slot(offset, 1)?;
        buf.put_u8(byte);
        Ok(())
    }
}

/// Padding of a fixed number of bytes.
///
/// Decodes to [Value::Null] (the bytes must exist but are not inspected) and encodes as zeros,
/// whatever the value.
#[derive(Clone, Copy, Debug)]
pub struct Skip {
    len: usize,
}

impl Skip {
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl ValueType for Skip {
    fn fixed_size(&self) -> Option<usize> {
        Some(self.len)
    }

    fn read(&self, ctx: &mut DecodeContext<'_>, offset: usize) -> Result<Value, Error> {
        ctx.window(offset, self.len)?;
        Ok(Value::Null)
    }

    fn write(&self, _: &Value, offset: usize, ctx: &mut EncodeContext) -> Result<(), Error> {
        ctx.slot(offset, self.len)?.fill(0);
        Ok(())
    }
}

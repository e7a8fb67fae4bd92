//! The contract every leaf and composite type satisfies, and the built-in leaf catalogue.
//!
//! # Fixed-size vs Variable-size
//!
//! Most types occupy a constant number of bytes and report it through
//! [ValueType::fixed_size]. Only fixed-size types can be laid out as members or array elements
//! of a [crate::Schema], since their offsets must be known without looking at the data.
//!
//! Variable-size types (e.g. [NullTerminated]) may only be reached through a reference. They
//! must implement [ValueType::encode_size] so the encoder can allocate exactly the bytes that
//! [ValueType::write] will produce.
//!
//! # Extending
//!
//! The catalogue is open: any type implementing [ValueType] can be used wherever a built-in one
//! can, including types that decode several fields at once or that wrap another type.

use crate::{
    context::{DecodeContext, EncodeContext},
    value::{RecordId, Tree, Value},
    Error,
};
use std::{collections::HashSet, sync::Arc};

pub mod primitives;
pub mod text;

pub use primitives::{
    Byte, Char, F32Be, F32Le, I16Be, I16Le, I32Be, I32Le, Skip, U16Be, U16Le, U32Be, U32Le,
};
pub use text::{Encoding, FixedString, NullTerminated};

/// A type that can be located in a buffer, decoded into a [Value], and encoded back.
pub trait ValueType: Send + Sync {
    /// The number of bytes an instance occupies, or `None` if it depends on the value.
    fn fixed_size(&self) -> Option<usize>;

    /// Decodes the value stored at the absolute `offset` of the context's buffer.
    ///
    /// Must not read outside the buffer: out-of-bounds access returns an error instead of a
    /// partial value.
    fn read(&self, ctx: &mut DecodeContext<'_>, offset: usize) -> Result<Value, Error>;

    /// Encodes `value` at the absolute `offset` of the context's buffer.
    ///
    /// Writes exactly [ValueType::encode_size] bytes.
    fn write(&self, value: &Value, offset: usize, ctx: &mut EncodeContext) -> Result<(), Error>;

    /// Returns the number of bytes [ValueType::write] will produce for `value`.
    ///
    /// Variable-size types MUST override this.
    fn encode_size(&self, _value: &Value) -> Result<usize, Error> {
        self.fixed_size().ok_or(Error::Unsized)
    }

    /// Returns the number of out-of-band bytes (arrays and referenced payloads) that encoding
    /// `value` will allocate beyond its own [ValueType::encode_size].
    ///
    /// The encoder sizes its buffer with this before allocating anything, so it must visit
    /// values in the same order (and skip the same already-placed records) as
    /// [ValueType::write] does.
    fn extent(&self, _value: &Value, _measure: &mut Measure<'_>) -> Result<usize, Error> {
        Ok(0)
    }
}

impl<T: ValueType + ?Sized> ValueType for Arc<T> {
    fn fixed_size(&self) -> Option<usize> {
        (**self).fixed_size()
    }

    fn read(&self, ctx: &mut DecodeContext<'_>, offset: usize) -> Result<Value, Error> {
        (**self).read(ctx, offset)
    }

    fn write(&self, value: &Value, offset: usize, ctx: &mut EncodeContext) -> Result<(), Error> {
        (**self).write(value, offset, ctx)
    }

    fn encode_size(&self, value: &Value) -> Result<usize, Error> {
        (**self).encode_size(value)
    }

    fn extent(&self, value: &Value, measure: &mut Measure<'_>) -> Result<usize, Error> {
        (**self).extent(value, measure)
    }
}

/// Walk state for [ValueType::extent].
///
/// Tracks which records have already been accounted for, so a record reachable through several
/// references (or through a cycle) is only sized once, mirroring the encoder which only places
/// it once.
pub struct Measure<'a> {
    tree: &'a Tree,
    visited: HashSet<RecordId>,
}

impl<'a> Measure<'a> {
    pub fn new(tree: &'a Tree) -> Self {
        Self {
            tree,
            visited: HashSet::new(),
        }
    }

    pub fn tree(&self) -> &'a Tree {
        self.tree
    }

    /// Marks `id` as sized. Returns false if it already was.
    pub fn visit(&mut self, id: RecordId) -> bool {
        self.visited.insert(id)
    }

    pub fn visited(&self, id: RecordId) -> bool {
        self.visited.contains(&id)
    }
}

/// Converts `value` to an integer of type `T`, failing if it is not an integer in range.
pub(crate) fn int_value<T: TryFrom<i64>>(value: &Value, context: &'static str) -> Result<T, Error> {
    let v = value
        .as_int()
        .ok_or_else(|| Error::InvalidValue(context, format!("expected an integer, got {value}")))?;
    T::try_from(v).map_err(|_| Error::InvalidValue(context, format!("{v} is out of range")))
}

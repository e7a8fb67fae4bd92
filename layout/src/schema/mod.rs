//! Describe the layout of a C-like struct.
//!
//! A [Schema] is assembled once with a [Builder] and then reused for any number of decode and
//! encode calls (it is immutable and can be shared across threads).
//!
//! # Layout
//!
//! ```text
//! base                                   base + size
//! +----------+----------+-----+----------+
//! | member 0 | member 1 | ... | member n |        (fixed footprint)
//! +----------+----------+-----+----------+
//!       |          |
//!       |          +--> array:     count elements somewhere else in the buffer
//!       +-------------> reference: one value somewhere else in the buffer
//! ```
//!
//! Members are laid out back to back in declaration order and must have a fixed size. Arrays and
//! references live outside the footprint: their location (and, for arrays, their length) is read
//! from a sibling member or static, or given as a literal. A location marked `relative` is an
//! offset from the start of the instance rather than from the start of the buffer.
//!
//! Statics annotate an instance with a constant. They occupy no bytes and are never read or
//! written, but can serve as the count or offset of an array or reference.
//!
//! # Example
//!
//! ```
//! use commonware_layout::{types::{Encoding, NullTerminated, I32Le, U16Le}, Schema, Value};
//!
//! let point = Schema::builder("point")
//!     .member(I32Le, "x")
//!     .member(I32Le, "y")
//!     .build()
//!     .unwrap();
//!
//! let path = Schema::builder("path")
//!     .member(U16Le, "count")
//!     .member(U16Le, "points")
//!     .member(U16Le, "label_at")
//!     .array(point.clone(), "coords", "count", "points", false)
//!     .reference(NullTerminated::new(Encoding::Ascii), "label", "label_at", false)
//!     .build()
//!     .unwrap();
//! assert_eq!(path.size(), 6);
//! assert_eq!(path.offset_of("label_at"), Some(4));
//!
//! let buf = [
//!     1, 0, 6, 0, 14, 0, // header
//!     3, 0, 0, 0, 4, 0, 0, 0, // point
//!     b'h', b'i', 0, // label
//! ];
//! let tree = path.decode(&buf, 0).unwrap();
//! assert_eq!(tree.walk(&["label"]), Some(&Value::Str("hi".into())));
//! ```

use crate::{
    context::{DecodeContext, EncodeContext},
    rules::Rule,
    types::{Measure, ValueType},
    value::Value,
    Error,
};
use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, OnceLock, Weak},
};

mod decode;
mod encode;

/// Where the count or offset of an array or reference comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// A constant.
    Literal(u64),
    /// The value of a member or static of the same schema.
    Field(String),
}

impl From<&str> for Source {
    fn from(name: &str) -> Self {
        Source::Field(name.to_string())
    }
}

impl From<String> for Source {
    fn from(name: String) -> Self {
        Source::Field(name)
    }
}

impl From<u64> for Source {
    fn from(v: u64) -> Self {
        Source::Literal(v)
    }
}

impl From<u32> for Source {
    fn from(v: u32) -> Self {
        Source::Literal(v as u64)
    }
}

impl From<usize> for Source {
    fn from(v: usize) -> Self {
        Source::Literal(v as u64)
    }
}

/// A [Source] resolved against the schema's fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Slot {
    /// A constant (given directly or through a static).
    Literal(u64),
    /// A member, by its position in decoded records (statics come first) and by name.
    Member { index: usize, name: String },
}

pub(crate) struct Member {
    pub(crate) name: String,
    pub(crate) ty: Arc<dyn ValueType>,
    pub(crate) offset: usize,
}

pub(crate) struct Array {
    pub(crate) name: String,
    pub(crate) ty: Arc<dyn ValueType>,
    pub(crate) stride: usize,
    pub(crate) count: Slot,
    pub(crate) offset: Slot,
    pub(crate) relative: bool,
}

pub(crate) struct Reference {
    pub(crate) name: String,
    pub(crate) ty: Arc<dyn ValueType>,
    pub(crate) offset: Slot,
    pub(crate) relative: bool,
}

pub(crate) struct Static {
    pub(crate) name: String,
    pub(crate) value: Value,
}

/// The composite type: an ordered description of a struct's members plus the arrays,
/// references, statics, and rules attached to it.
pub struct Schema {
    name: String,
    statics: Vec<Static>,
    members: Vec<Member>,
    arrays: Vec<Array>,
    references: Vec<Reference>,
    rules: Vec<Box<dyn Rule>>,
    size: usize,
    /// Fields that only locate arrays and references.
    pointers: Vec<String>,
}

impl Schema {
    /// Starts describing a schema. `name` is only used in diagnostics.
    pub fn builder(name: &str) -> Builder {
        Builder::new(name)
    }

    /// Builds a schema that refers to itself.
    ///
    /// `f` receives a handle to the schema under construction. The handle can be used as the
    /// type of a reference or of an array element (a struct cannot contain itself as a member).
    ///
    /// ```
    /// use commonware_layout::{types::Byte, Schema};
    ///
    /// let node = Schema::cyclic(|this| {
    ///     Schema::builder("node")
    ///         .member(Byte, "value")
    ///         .member(Byte, "next_at")
    ///         .reference(this, "next", "next_at", false)
    /// })
    /// .unwrap();
    ///
    /// // Two nodes pointing at each other
    /// let tree = node.decode(&[1, 2, 7, 0], 0).unwrap();
    /// assert_eq!(tree.walk(&["next", "next"]), Some(tree.root()));
    /// ```
    pub fn cyclic<F>(f: F) -> Result<Arc<Schema>, Error>
    where
        F: FnOnce(SelfRef) -> Builder,
    {
        let size = Arc::new(OnceLock::new());
        let mut failure = None;
        let schema = Arc::new_cyclic(|weak| {
            let builder = f(SelfRef {
                schema: weak.clone(),
                size: size.clone(),
            });
            let name = builder.name.clone();
            builder.finish(Some(&*size)).unwrap_or_else(|err| {
                failure = Some(err);
                Builder::new(&name).empty()
            })
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(schema),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The size of the schema's own footprint: the sum of its member sizes. Arrays and
    /// references are not included.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the offset of a member relative to the start of an instance.
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.members
            .iter()
            .find(|member| member.name == name)
            .map(|member| member.offset)
    }

    /// Returns the names of the members, in declaration order.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|member| member.name.as_str())
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("members", &self.members().collect::<Vec<_>>())
            .field(
                "arrays",
                &self.arrays.iter().map(|a| &a.name).collect::<Vec<_>>(),
            )
            .field(
                "references",
                &self.references.iter().map(|r| &r.name).collect::<Vec<_>>(),
            )
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl ValueType for Schema {
    fn fixed_size(&self) -> Option<usize> {
        Some(self.size)
    }

    fn read(&self, ctx: &mut DecodeContext<'_>, offset: usize) -> Result<Value, Error> {
        self.read_instance(ctx, offset)
    }

    fn write(&self, value: &Value, offset: usize, ctx: &mut EncodeContext) -> Result<(), Error> {
        self.write_instance(value, offset, ctx)
    }

    fn extent(&self, value: &Value, measure: &mut Measure<'_>) -> Result<usize, Error> {
        self.measure(value, measure)
    }
}

/// A handle to a schema that is still being built by [Schema::cyclic].
///
/// Reports no fixed size until the schema's members are known, so it is rejected as a member of
/// its own schema.
#[derive(Clone)]
pub struct SelfRef {
    schema: Weak<Schema>,
    size: Arc<OnceLock<usize>>,
}

impl SelfRef {
    fn schema(&self) -> Result<Arc<Schema>, Error> {
        self.schema.upgrade().ok_or(Error::Dangling)
    }
}

impl ValueType for SelfRef {
    fn fixed_size(&self) -> Option<usize> {
        self.size.get().copied()
    }

    fn read(&self, ctx: &mut DecodeContext<'_>, offset: usize) -> Result<Value, Error> {
        self.schema()?.read_instance(ctx, offset)
    }

    fn write(&self, value: &Value, offset: usize, ctx: &mut EncodeContext) -> Result<(), Error> {
        self.schema()?.write_instance(value, offset, ctx)
    }

    fn extent(&self, value: &Value, measure: &mut Measure<'_>) -> Result<usize, Error> {
        self.schema()?.measure(value, measure)
    }
}

type Entry = (String, Arc<dyn ValueType>);

/// Collects the parts of a [Schema]. Validation happens in [Builder::build].
pub struct Builder {
    name: String,
    statics: Vec<Static>,
    members: Vec<Entry>,
    arrays: Vec<(Entry, Source, Source, bool)>,
    references: Vec<(Entry, Source, bool)>,
    rules: Vec<Box<dyn Rule>>,
}

impl Builder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            statics: Vec::new(),
            members: Vec::new(),
            arrays: Vec::new(),
            references: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Appends a member. Its offset is the sum of the sizes of the members before it.
    pub fn member<T: ValueType + 'static>(mut self, ty: T, name: &str) -> Self {
        self.members.push((name.to_string(), Arc::new(ty)));
        self
    }

    /// Adds an array of `count` elements of type `ty` stored at `offset`.
    pub fn array<T: ValueType + 'static>(
        mut self,
        ty: T,
        name: &str,
        count: impl Into<Source>,
        offset: impl Into<Source>,
        relative: bool,
    ) -> Self {
        self.arrays.push((
            (name.to_string(), Arc::new(ty)),
            count.into(),
            offset.into(),
            relative,
        ));
        self
    }

    /// Adds a single value of type `ty` stored at `offset`.
    pub fn reference<T: ValueType + 'static>(
        mut self,
        ty: T,
        name: &str,
        offset: impl Into<Source>,
        relative: bool,
    ) -> Self {
        self.references
            .push(((name.to_string(), Arc::new(ty)), offset.into(), relative));
        self
    }

    /// Adds a constant field that occupies no bytes.
    pub fn constant(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.statics.push(Static {
            name: name.to_string(),
            value: value.into(),
        });
        self
    }

    /// Appends a validation rule, evaluated after the rest of the instance is decoded.
    pub fn rule(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Validates the description and produces the schema.
    pub fn build(self) -> Result<Arc<Schema>, Error> {
        Ok(Arc::new(self.finish(None)?))
    }

    fn empty(self) -> Schema {
        Schema {
            name: self.name,
            statics: Vec::new(),
            members: Vec::new(),
            arrays: Vec::new(),
            references: Vec::new(),
            rules: Vec::new(),
            size: 0,
            pointers: Vec::new(),
        }
    }

    fn finish(self, own_size: Option<&OnceLock<usize>>) -> Result<Schema, Error> {
        // Names must be unique across every kind of field
        let mut names = HashSet::new();
        let all = self
            .statics
            .iter()
            .map(|s| &s.name)
            .chain(self.members.iter().map(|(name, _)| name))
            .chain(self.arrays.iter().map(|((name, _), ..)| name))
            .chain(self.references.iter().map(|((name, _), ..)| name));
        for name in all {
            if !names.insert(name.as_str()) {
                return Err(Error::DuplicateField(name.clone()));
            }
        }

        // Lay out members
        let mut members = Vec::with_capacity(self.members.len());
        let mut size = 0;
        for (name, ty) in self.members {
            let width = ty.fixed_size().ok_or_else(|| Error::UnsizedMember(name.clone()))?;
            members.push(Member {
                name,
                ty,
                offset: size,
            });
            size += width;
        }

        // Arrays of the schema under construction need its size as their stride
        if let Some(cell) = own_size {
            let _ = cell.set(size);
        }

        let mut pointers = Vec::new();
        let mut resolve = |owner: &str, source: Source| -> Result<Slot, Error> {
            let name = match source {
                Source::Literal(v) => return Ok(Slot::Literal(v)),
                Source::Field(name) => name,
            };
            if !pointers.contains(&name) {
                pointers.push(name.clone());
            }
            if let Some(s) = self.statics.iter().find(|s| s.name == name) {
                let v = s
                    .value
                    .as_int()
                    .and_then(|v| u64::try_from(v).ok())
                    .ok_or_else(|| Error::InvalidSource {
                        field: owner.to_string(),
                        reason: format!("static {name} is not a non-negative integer"),
                    })?;
                return Ok(Slot::Literal(v));
            }
            match members.iter().position(|m| m.name == name) {
                Some(position) => Ok(Slot::Member {
                    index: self.statics.len() + position,
                    name,
                }),
                None => Err(Error::UnknownField {
                    owner: owner.to_string(),
                    field: name,
                }),
            }
        };

        let mut arrays = Vec::with_capacity(self.arrays.len());
        for ((name, ty), count, offset, relative) in self.arrays {
            let stride = ty
                .fixed_size()
                .filter(|stride| *stride > 0)
                .ok_or_else(|| Error::UnsizedElement(name.clone()))?;
            let count = resolve(&name, count)?;
            let offset = resolve(&name, offset)?;
            arrays.push(Array {
                name,
                ty,
                stride,
                count,
                offset,
                relative,
            });
        }

        let mut references = Vec::with_capacity(self.references.len());
        for ((name, ty), offset, relative) in self.references {
            let offset = resolve(&name, offset)?;
            references.push(Reference {
                name,
                ty,
                offset,
                relative,
            });
        }

        Ok(Schema {
            name: self.name,
            statics: self.statics,
            members,
            arrays,
            references,
            rules: self.rules,
            size,
            pointers,
        })
    }
}

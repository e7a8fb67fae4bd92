//! Decoded values and the arena that holds decoded records.
//!
//! A decoded buffer is a [Tree]: an arena of [Record]s plus a root [Value]. Records refer to each
//! other by [RecordId] rather than by ownership, so a reference that points back at an instance
//! that was already decoded (or is still being decoded) shares that instance's id. Object
//! identity at a cycle point is therefore id equality.

use std::fmt;

/// Index of a [Record] within a [Tree].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(usize);

impl RecordId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the position of the record in its arena.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A decoded (or to-be-encoded) value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
    List(Vec<Value>),
    Record(RecordId),
}

impl Value {
    /// Returns the integer held by this value, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns this value as a float. Integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<RecordId> {
        match self {
            Value::Record(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

macro_rules! impl_from_int {
    ($($type:ty),*) => {
        $(
            impl From<$type> for Value {
                fn from(v: $type) -> Self {
                    Value::Int(v as i64)
                }
            }
        )*
    };
}
impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Value::Char(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<RecordId> for Value {
    fn from(id: RecordId) -> Self {
        Value::Record(id)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Record(id) => write!(f, "{id}"),
        }
    }
}

/// Named fields of one struct instance, in declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a field, returning the record for chaining.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Returns the field at `index` (declaration order).
    pub fn field(&self, index: usize) -> Option<&Value> {
        self.fields.get(index).map(|(_, v)| v)
    }

    /// Inserts a field, replacing the value of an existing field with the same name.
    pub fn insert(&mut self, name: &str, value: Value) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let index = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Appends a field without checking for an existing one. Used by the decoder, whose schemas
    /// reject duplicate names at build time.
    pub(crate) fn push(&mut self, name: &str, value: Value) {
        self.fields.push((name.to_string(), value));
    }
}

/// An arena of [Record]s and the root value they hang off.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tree {
    records: Vec<Record>,
    root: Value,
}

impl Tree {
    /// Creates a tree whose root is `record`.
    pub fn from_record(record: Record) -> Self {
        let mut tree = Self::default();
        let id = tree.insert(record);
        tree.root = Value::Record(id);
        tree
    }

    pub(crate) fn from_parts(records: Vec<Record>, root: Value) -> Self {
        Self { records, root }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn set_root(&mut self, root: Value) {
        self.root = root;
    }

    /// Adds a record to the arena.
    pub fn insert(&mut self, record: Record) -> RecordId {
        self.records.push(record);
        RecordId(self.records.len() - 1)
    }

    pub fn record(&self, id: RecordId) -> Option<&Record> {
        self.records.get(id.0)
    }

    pub fn record_mut(&mut self, id: RecordId) -> Option<&mut Record> {
        self.records.get_mut(id.0)
    }

    /// Returns the record a value points at, if it is a record handle.
    pub fn follow(&self, value: &Value) -> Option<&Record> {
        self.record(value.as_record()?)
    }

    /// Walks named fields starting at the root, following record handles along the way.
    pub fn walk(&self, path: &[&str]) -> Option<&Value> {
        let mut current = &self.root;
        for name in path {
            current = self.follow(current)?.get(name)?;
        }
        Some(current)
    }

    /// Number of records in the arena.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_insert_replaces() {
        let mut record = Record::new().with("a", 1u8).with("b", "x");
        record.insert("a", Value::Int(2));
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("a"), Some(&Value::Int(2)));
        assert_eq!(record.field(1), Some(&Value::Str("x".into())));
        assert_eq!(record.remove("a"), Some(Value::Int(2)));
        assert!(record.get("a").is_none());
    }

    #[test]
    fn test_walk_follows_handles() {
        let mut tree = Tree::default();
        let inner = tree.insert(Record::new().with("width", 4i32));
        let outer = tree.insert(Record::new().with("size", inner));
        tree.set_root(Value::Record(outer));

        assert_eq!(tree.walk(&["size", "width"]), Some(&Value::Int(4)));
        assert_eq!(tree.walk(&["size", "height"]), None);
        assert_eq!(tree.walk(&[]), Some(&Value::Record(outer)));
    }

    #[test]
    fn test_display() {
        let value = Value::List(vec![Value::Int(1), Value::Str("a".into()), Value::Null]);
        assert_eq!(value.to_string(), "[1, a, null]");
        assert_eq!(Value::Record(RecordId(3)).to_string(), "#3");
    }
}

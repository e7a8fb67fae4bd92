//! Per-call state threaded through a decode or encode traversal.
//!
//! A context is created for a single top-level call and discarded afterwards (or surfaced as
//! the call's result). Nothing in a context is shared between calls: in particular the
//! dedup cache of a [DecodeContext] must never outlive the decode it was created for, or
//! unrelated decodes would be merged.

use crate::{
    report::ArrayRegion,
    value::{Record, RecordId, Tree, Value},
    Config, Diagnostic, Error,
};
use std::collections::HashMap;
use tracing::trace;

/// Maximum nesting of schema instances within a single decode.
pub const MAX_DEPTH: usize = 128;

/// Dotted/bracketed location of the value currently being processed.
#[derive(Clone, Debug)]
struct Path(String);

impl Path {
    fn root() -> Self {
        Self("root".to_string())
    }

    fn field(&mut self, name: &str) -> usize {
        let mark = self.0.len();
        self.0.push('.');
        self.0.push_str(name);
        mark
    }

    fn index(&mut self, index: usize) -> usize {
        let mark = self.0.len();
        self.0.push('[');
        self.0.push_str(&index.to_string());
        self.0.push(']');
        mark
    }

    fn restore(&mut self, mark: usize) {
        self.0.truncate(mark);
    }
}

/// State of an offset in the dedup cache.
#[derive(Clone, Debug)]
pub(crate) enum Cached {
    /// A reference decode targeting this offset has started but not yet produced a value.
    Pending,
    /// The value decoded at this offset.
    Done(Value),
}

/// State of a single decode call.
pub struct DecodeContext<'a> {
    buf: &'a [u8],
    cfg: Config,
    path: Path,
    errors: Vec<Diagnostic>,
    usage: Option<Vec<u8>>,
    arrays: Vec<ArrayRegion>,
    cache: HashMap<usize, Cached>,
    records: Vec<Record>,
    depth: usize,
}

impl<'a> DecodeContext<'a> {
    /// Creates a context over `buf` with the path rooted at `root` and an empty dedup cache.
    pub fn new(buf: &'a [u8], cfg: Config) -> Self {
        Self {
            buf,
            cfg,
            path: Path::root(),
            errors: Vec::new(),
            usage: cfg.monitor_usage.then(|| vec![0; buf.len()]),
            arrays: Vec::new(),
            cache: HashMap::new(),
            records: Vec::new(),
            depth: 0,
        }
    }

    pub fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Returns `len` bytes starting at `offset`, failing if any of them lie outside the buffer.
    pub fn window(&self, offset: usize, len: usize) -> Result<&'a [u8], Error> {
        offset
            .checked_add(len)
            .and_then(|end| self.buf.get(offset..end))
            .ok_or(Error::EndOfBuffer { offset, len })
    }

    pub fn path(&self) -> &str {
        &self.path.0
    }

    /// Descends into a named field. Returns a mark to pass to [Self::leave].
    pub fn enter_field(&mut self, name: &str) -> usize {
        self.path.field(name)
    }

    /// Descends into an array element. Returns a mark to pass to [Self::leave].
    pub fn enter_index(&mut self, index: usize) -> usize {
        self.path.index(index)
    }

    pub fn leave(&mut self, mark: usize) {
        self.path.restore(mark);
    }

    /// Records a diagnostic at the current path.
    pub fn report(&mut self, message: impl Into<String>) {
        let path = self.path.0.clone();
        self.report_at(path, message);
    }

    /// Records a diagnostic at an explicit path.
    pub fn report_at(&mut self, path: String, message: impl Into<String>) {
        self.errors.push(Diagnostic {
            path,
            message: message.into(),
        });
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    /// Marks `[start, start + len)` as read. Does nothing unless usage is monitored.
    pub fn mark_read(&mut self, start: usize, len: usize) {
        let Some(usage) = self.usage.as_mut() else {
            return;
        };
        let end = start.saturating_add(len).min(usage.len());
        if start >= end {
            return;
        }
        for count in &mut usage[start..end] {
            *count = count.saturating_add(1);
        }
    }

    /// Returns the number of bytes read at least once, or `None` if usage is not monitored.
    pub fn usage(&self) -> Option<usize> {
        self.usage
            .as_ref()
            .map(|usage| usage.iter().filter(|count| **count > 0).count())
    }

    pub fn arrays(&self) -> &[ArrayRegion] {
        &self.arrays
    }

    /// Adds a record to the tree being decoded.
    ///
    /// Lets a leaf type decode into several named fields. The record is addressed by the
    /// returned value and, on encode, can be looked up with [EncodeContext::tree].
    pub fn insert(&mut self, record: Record) -> Value {
        self.records.push(record);
        Value::Record(RecordId::new(self.records.len() - 1))
    }

    /// Enters a nested instance, failing past [MAX_DEPTH].
    pub(crate) fn descend(&mut self) -> Result<(), Error> {
        if self.depth >= MAX_DEPTH {
            return Err(Error::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn ascend(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub(crate) fn register(&mut self, region: ArrayRegion) {
        self.arrays.push(region);
    }

    pub(crate) fn cached(&self, offset: usize) -> Option<&Cached> {
        self.cache.get(&offset)
    }

    pub(crate) fn cache(&mut self, offset: usize, entry: Cached) {
        self.cache.insert(offset, entry);
    }

    pub(crate) fn evict(&mut self, offset: usize) {
        self.cache.remove(&offset);
    }

    /// Allocates a record for an instance decoded at `base`.
    ///
    /// If a reference decode marked `base` as pending, the new record becomes the cached value
    /// for `base` immediately, so references that loop back to this instance before it is
    /// finished resolve to it instead of recursing.
    pub(crate) fn claim(&mut self, base: usize) -> RecordId {
        self.records.push(Record::default());
        let id = RecordId::new(self.records.len() - 1);
        if matches!(self.cache.get(&base), Some(Cached::Pending)) {
            trace!(base, %id, "claimed pending offset");
            self.cache.insert(base, Cached::Done(Value::Record(id)));
        }
        id
    }

    pub(crate) fn store(&mut self, id: RecordId, record: Record) {
        if let Some(slot) = self.records.get_mut(id.index()) {
            *slot = record;
        }
    }

    pub(crate) fn into_parts(
        self,
        root: Value,
    ) -> (Tree, Vec<Diagnostic>, Option<Vec<u8>>, Vec<ArrayRegion>) {
        (
            Tree::from_parts(self.records, root),
            self.errors,
            self.usage,
            self.arrays,
        )
    }
}

/// State of a single encode call.
///
/// The context owns the tree being encoded: offset and count fields that locate arrays and
/// references are rewritten to match where the encoder placed them, so decoding the finished
/// buffer yields [EncodeContext::tree].
#[derive(Debug)]
pub struct EncodeContext {
    buf: Vec<u8>,
    cursor: usize,
    path: Path,
    errors: Vec<Diagnostic>,
    tree: Tree,
    placed: HashMap<RecordId, usize>,
    /// Every region handed out so far, as `[start, end)`.
    regions: Vec<(usize, usize)>,
}

impl EncodeContext {
    /// Creates a context with a zeroed buffer of `size` bytes and the cursor at 0.
    pub fn new(tree: Tree, size: usize) -> Self {
        Self {
            buf: vec![0; size],
            cursor: 0,
            path: Path::root(),
            errors: Vec::new(),
            tree,
            placed: HashMap::new(),
            regions: Vec::new(),
        }
    }

    /// Hands out the next `len` bytes. Regions are never reused.
    pub fn allocate(&mut self, len: usize) -> usize {
        let position = self.cursor;
        self.cursor += len;
        self.ensure(self.cursor);
        if len > 0 {
            self.regions.push((position, self.cursor));
        }
        trace!(position, len, "allocated");
        position
    }

    /// Claims `[start, start + len)` at a fixed address and moves the cursor past it, so later
    /// allocations never land on top of it.
    ///
    /// Returns false (claiming nothing) if the region intersects bytes already handed out.
    pub fn reserve(&mut self, start: usize, len: usize) -> bool {
        let Some(end) = start.checked_add(len) else {
            return false;
        };
        if len == 0 {
            return true;
        }
        if self.regions.iter().any(|(s, e)| start < *e && *s < end) {
            return false;
        }
        self.regions.push((start, end));
        self.cursor = self.cursor.max(end);
        self.ensure(end);
        trace!(start, len, "reserved");
        true
    }

    /// Grows the buffer (zero-filled) so that it is at least `end` bytes long.
    pub fn ensure(&mut self, end: usize) {
        if self.buf.len() < end {
            self.buf.resize(end, 0);
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Returns the `len` bytes at `offset` for writing.
    pub fn slot(&mut self, offset: usize, len: usize) -> Result<&mut [u8], Error> {
        offset
            .checked_add(len)
            .and_then(|end| self.buf.get_mut(offset..end))
            .ok_or(Error::EndOfBuffer { offset, len })
    }

    pub fn path(&self) -> &str {
        &self.path.0
    }

    pub fn enter_field(&mut self, name: &str) -> usize {
        self.path.field(name)
    }

    pub fn enter_index(&mut self, index: usize) -> usize {
        self.path.index(index)
    }

    pub fn leave(&mut self, mark: usize) {
        self.path.restore(mark);
    }

    /// Records a diagnostic at the current path.
    pub fn report(&mut self, message: impl Into<String>) {
        self.errors.push(Diagnostic {
            path: self.path.0.clone(),
            message: message.into(),
        });
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub(crate) fn placed(&self, id: RecordId) -> Option<usize> {
        self.placed.get(&id).copied()
    }

    pub(crate) fn place(&mut self, id: RecordId, offset: usize) {
        self.placed.entry(id).or_insert(offset);
    }

    /// Consumes the context, returning the buffer, the rewritten tree, and the diagnostics.
    pub fn into_parts(self) -> (Vec<u8>, Tree, Vec<Diagnostic>) {
        (self.buf, self.tree, self.errors)
    }
}

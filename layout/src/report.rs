//! Diagnostics gathered by [crate::Schema::report].
//!
//! # Usage
//!
//! With [crate::Config::monitor_usage] set, every byte of the buffer carries a saturating counter
//! (capped at 255) that is incremented each time the byte is read. Usage is the number of bytes
//! read at least once. A fully described buffer reports its entire length; bytes no member,
//! array, or reference covers are never counted.
//!
//! # Overlap
//!
//! Every array decoded is registered with its byte range. After decoding, each unordered pair of
//! registered arrays is checked for intersecting ranges. Pairs are skipped when either array is
//! empty, when both start at the same offset, or when the path of one is a prefix of the path of
//! the other (an array nested inside the elements of another is expected to lie within it). The
//! last rule also hides some genuine overlaps.

use crate::{value::Tree, Diagnostic};
use std::fmt;
use tracing::debug;

/// Byte range covered by a decoded array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrayRegion {
    pub name: String,
    pub start: usize,
    pub count: usize,
    /// Length of the region in bytes.
    pub length: usize,
    pub path: String,
}

impl ArrayRegion {
    fn end(&self) -> usize {
        self.start + self.length
    }

    fn nested(&self, other: &ArrayRegion) -> bool {
        within(&self.path, &other.path) || within(&other.path, &self.path)
    }
}

/// Returns true if `path` is `prefix` or lies below it (`root.a` contains `root.a[0].b` but not
/// `root.ab`).
fn within(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.') || rest.starts_with('['),
        None => false,
    }
}

/// Returns a diagnostic for every pair of arrays whose byte ranges intersect.
pub fn overlaps(arrays: &[ArrayRegion]) -> Vec<Diagnostic> {
    let mut found = Vec::new();
    for (i, a) in arrays.iter().enumerate() {
        for b in &arrays[i + 1..] {
            if a.length == 0 || b.length == 0 {
                continue;
            }
            if a.start == b.start {
                continue;
            }
            if a.nested(b) {
                continue;
            }
            if a.start < b.end() && b.start < a.end() {
                debug!(a = %a.path, b = %b.path, "arrays overlap");
                found.push(Diagnostic {
                    path: format!("{}/{}", a.path, b.path),
                    message: format!("array {} overlaps with {}", a.name, b.name),
                });
            }
        }
    }
    found
}

/// Result of a diagnostic decode.
#[derive(Clone, Debug)]
pub struct Report {
    /// The decoded data.
    pub tree: Tree,
    /// Diagnostics recorded while decoding (failed references and rules).
    pub errors: Vec<Diagnostic>,
    /// Diagnostics for overlapping arrays.
    pub overlaps: Vec<Diagnostic>,
    /// Every array decoded, in traversal order.
    pub arrays: Vec<ArrayRegion>,
    usage: Option<Vec<u8>>,
    size: usize,
}

impl Report {
    pub(crate) fn new(
        tree: Tree,
        errors: Vec<Diagnostic>,
        usage: Option<Vec<u8>>,
        arrays: Vec<ArrayRegion>,
        size: usize,
    ) -> Self {
        let overlaps = overlaps(&arrays);
        Self {
            tree,
            errors,
            overlaps,
            arrays,
            usage,
            size,
        }
    }

    /// Returns the number of bytes read at least once, or `None` if usage was not monitored.
    pub fn usage(&self) -> Option<usize> {
        self.usage
            .as_ref()
            .map(|usage| usage.iter().filter(|count| **count > 0).count())
    }

    /// Returns how many times each byte was read (saturating at 255), if usage was monitored.
    pub fn usage_counts(&self) -> Option<&[u8]> {
        self.usage.as_deref()
    }

    /// Iterates over every diagnostic: decode errors first, then overlaps.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.errors.iter().chain(self.overlaps.iter())
    }

    /// Returns true if no diagnostic was recorded.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.overlaps.is_empty()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== layout report ===")?;
        writeln!(f, " buffer size: {}", self.size)?;
        if let Some(read) = self.usage() {
            let percent = if self.size == 0 {
                100
            } else {
                read * 100 / self.size
            };
            writeln!(f, " bytes read: {read} ({percent}%)")?;
        }
        writeln!(f, " arrays: {}", self.arrays.len())?;
        let count = self.errors.len() + self.overlaps.len();
        if count == 0 {
            return writeln!(f, " no errors");
        }
        writeln!(f, " errors ({count}):")?;
        for diagnostic in self.diagnostics() {
            writeln!(f, "  {diagnostic}")?;
        }
        Ok(())
    }
}

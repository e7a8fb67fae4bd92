//! Encoding [Tree]s into buffers.
//!
//! The encoder lays out the root footprint at offset 0 and then hands out every array and
//! referenced payload from a bump allocator, in traversal order: arrays, then references, then
//! members (members are written last so they pick up the offsets and counts that placing the
//! arrays and references wrote back into the tree).
//!
//! Before allocating anything the total size is computed with [ValueType::extent], which walks
//! the tree in the same order and skips the same already-placed records, so the buffer is sized
//! exactly once. Regions at literal offsets are not part of that total: they are reserved where
//! they are declared, and the cursor skips past them so no later allocation overlaps them.

use super::{Array, Reference, Schema, Slot};
use crate::{
    context::EncodeContext,
    types::{Measure, ValueType},
    value::{RecordId, Tree, Value},
    Error,
};
use tracing::{debug, trace};

impl Schema {
    /// Encodes the tree's root as an instance of this schema.
    ///
    /// Returns the finished context: its buffer, the tree with every offset and count field
    /// rewritten to match the new layout, and any diagnostics.
    pub fn encode(&self, tree: Tree) -> Result<EncodeContext, Error> {
        let root = tree.root().clone();
        let size = self.size + self.measure(&root, &mut Measure::new(&tree))?;
        debug!(schema = %self.name, size, "encoding");

        let mut ctx = EncodeContext::new(tree, size);
        let base = ctx.allocate(self.size);
        self.encode_with(&root, &mut ctx, base)?;
        debug!(
            schema = %self.name,
            used = ctx.cursor(),
            errors = ctx.errors().len(),
            "encoded"
        );
        Ok(ctx)
    }

    /// Encodes `value` at `base` using a caller-supplied context.
    ///
    /// The footprint at `base` must already be reserved; arrays and references are allocated
    /// from the context's cursor.
    pub fn encode_with(
        &self,
        value: &Value,
        ctx: &mut EncodeContext,
        base: usize,
    ) -> Result<(), Error> {
        self.write_instance(value, base, ctx)
    }

    pub(crate) fn write_instance(
        &self,
        value: &Value,
        base: usize,
        ctx: &mut EncodeContext,
    ) -> Result<(), Error> {
        let id = value
            .as_record()
            .filter(|id| ctx.tree().record(*id).is_some())
            .ok_or_else(|| Error::NotARecord(self.name.clone()))?;
        ctx.place(id, base);

        for array in &self.arrays {
            let mark = ctx.enter_field(&array.name);
            self.write_array(ctx, array, id, base);
            ctx.leave(mark);
        }

        for reference in &self.references {
            let mark = ctx.enter_field(&reference.name);
            self.write_reference(ctx, reference, id, base);
            ctx.leave(mark);
        }

        for member in &self.members {
            let mark = ctx.enter_field(&member.name);
            match field(ctx, id, &member.name) {
                Some(value) => {
                    if let Err(err) = member.ty.write(&value, base + member.offset, ctx) {
                        ctx.report(err.to_string());
                    }
                }
                None => ctx.report("missing member"),
            }
            ctx.leave(mark);
        }
        Ok(())
    }

    fn write_array(&self, ctx: &mut EncodeContext, array: &Array, id: RecordId, base: usize) {
        let items = match field(ctx, id, &array.name) {
            Some(Value::List(items)) => items,
            Some(other) => {
                ctx.report(format!("expected a list, got {other}"));
                return;
            }
            None => {
                ctx.report("missing array");
                return;
            }
        };
        let count = items.len();
        if let Slot::Literal(expected) = array.count {
            if expected != count as u64 {
                ctx.report(format!("expected {expected} elements, got {count}"));
                return;
            }
        }

        let length = count * array.stride;
        let Some(start) = self.place(ctx, &array.offset, array.relative, id, base, length) else {
            return;
        };
        if let Slot::Member { name, .. } = &array.count {
            write_back(ctx, id, name, count);
        }

        for (i, item) in items.iter().enumerate() {
            let mark = ctx.enter_index(i);
            if let Err(err) = array.ty.write(item, start + i * array.stride, ctx) {
                ctx.report(err.to_string());
            }
            ctx.leave(mark);
        }
    }

    fn write_reference(
        &self,
        ctx: &mut EncodeContext,
        reference: &Reference,
        id: RecordId,
        base: usize,
    ) {
        let Some(value) = field(ctx, id, &reference.name) else {
            ctx.report("missing reference");
            return;
        };

        // Shared (or cyclic) records are emitted once and pointed at from everywhere else
        if let Some(existing) = value.as_record().and_then(|target| ctx.placed(target)) {
            trace!(path = ctx.path(), existing, "pointing at placed record");
            if let Slot::Member { name, .. } = &reference.offset {
                if let Some(pointer) = pointer(ctx, reference.relative, base, existing) {
                    write_back(ctx, id, name, pointer);
                }
            }
            return;
        }

        let size = match reference.ty.encode_size(&value) {
            Ok(size) => size,
            Err(err) => {
                ctx.report(err.to_string());
                return;
            }
        };
        let Some(start) = self.place(ctx, &reference.offset, reference.relative, id, base, size)
        else {
            return;
        };
        if let Err(err) = reference.ty.write(&value, start, ctx) {
            ctx.report(err.to_string());
        }
    }

    /// Finds room for `length` bytes located by `offset` and records where they went.
    ///
    /// Regions located by a member are allocated and the member is rewritten to point at them.
    /// Regions at a literal offset are reserved there (growing the buffer and moving the cursor
    /// past them if needed). A literal region that collides with bytes already handed out is
    /// reported and skipped.
    fn place(
        &self,
        ctx: &mut EncodeContext,
        offset: &Slot,
        relative: bool,
        id: RecordId,
        base: usize,
        length: usize,
    ) -> Option<usize> {
        match offset {
            Slot::Literal(v) => {
                let start = usize::try_from(*v)
                    .ok()
                    .and_then(|v| if relative { v.checked_add(base) } else { Some(v) });
                let Some(start) = start else {
                    ctx.report(format!("offset {v} is out of range"));
                    return None;
                };
                if !ctx.reserve(start, length) {
                    ctx.report(format!(
                        "{length} bytes at {start} overlap a region already written"
                    ));
                    return None;
                }
                Some(start)
            }
            Slot::Member { name, .. } => {
                let start = ctx.allocate(length);
                let pointer = pointer(ctx, relative, base, start)?;
                write_back(ctx, id, name, pointer);
                Some(start)
            }
        }
    }

    /// Returns the number of out-of-band bytes [Schema::write_instance] will allocate for
    /// `value`.
    pub(crate) fn measure(&self, value: &Value, measure: &mut Measure<'_>) -> Result<usize, Error> {
        let Some(id) = value.as_record() else {
            return Ok(0);
        };
        measure.visit(id);
        let tree = measure.tree();
        let Some(record) = tree.record(id) else {
            return Ok(0);
        };

        let mut total = 0;
        for array in &self.arrays {
            let Some(Value::List(items)) = record.get(&array.name) else {
                continue;
            };
            if let Slot::Literal(expected) = array.count {
                if expected != items.len() as u64 {
                    continue;
                }
            }
            if matches!(array.offset, Slot::Member { .. }) {
                total += items.len() * array.stride;
            }
            for item in items {
                total += array.ty.extent(item, measure)?;
            }
        }

        for reference in &self.references {
            let Some(value) = record.get(&reference.name) else {
                continue;
            };
            if value.as_record().is_some_and(|target| measure.visited(target)) {
                continue;
            }
            let Ok(size) = reference.ty.encode_size(value) else {
                continue;
            };
            if matches!(reference.offset, Slot::Member { .. }) {
                total += size;
            }
            total += reference.ty.extent(value, measure)?;
        }

        for member in &self.members {
            if let Some(value) = record.get(&member.name) {
                total += member.ty.extent(value, measure)?;
            }
        }
        Ok(total)
    }
}

fn field(ctx: &EncodeContext, id: RecordId, name: &str) -> Option<Value> {
    ctx.tree().record(id)?.get(name).cloned()
}

/// Converts an absolute offset into the value stored in a pointer field.
fn pointer(ctx: &mut EncodeContext, relative: bool, base: usize, start: usize) -> Option<usize> {
    if !relative {
        return Some(start);
    }
    let pointer = start.checked_sub(base);
    if pointer.is_none() {
        ctx.report(format!("offset {start} precedes instance at {base}"));
    }
    pointer
}

fn write_back(ctx: &mut EncodeContext, id: RecordId, name: &str, v: usize) {
    if let Some(record) = ctx.tree_mut().record_mut(id) {
        record.insert(name, Value::Int(v as i64));
    }
}

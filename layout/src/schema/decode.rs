//! Decoding buffers into [Tree]s.

use super::{Array, Reference, Schema, Slot};
use crate::{
    context::{Cached, DecodeContext},
    report::{ArrayRegion, Report},
    value::{Record, Tree, Value},
    Config, Error,
};
use tracing::{debug, trace, warn};

impl Schema {
    /// Decodes the instance at `offset`.
    ///
    /// Fails on structural errors (e.g. an out-of-bounds member). Failed references and rules do
    /// not fail the call; use [Schema::report] to see them.
    pub fn decode(&self, buf: &[u8], offset: usize) -> Result<Tree, Error> {
        let mut ctx = DecodeContext::new(buf, Config::default());
        let root = self.decode_with(&mut ctx, offset)?;
        let (tree, ..) = ctx.into_parts(root);
        Ok(tree)
    }

    /// Decodes the instance at `offset`, collecting diagnostics.
    pub fn report(&self, buf: &[u8], offset: usize, cfg: Config) -> Result<Report, Error> {
        let mut ctx = DecodeContext::new(buf, cfg);
        let root = self.decode_with(&mut ctx, offset)?;
        let (tree, errors, usage, arrays) = ctx.into_parts(root);
        let report = Report::new(tree, errors, usage, arrays, buf.len());
        debug!(
            schema = %self.name,
            errors = report.errors.len(),
            overlaps = report.overlaps.len(),
            "decoded with diagnostics"
        );
        Ok(report)
    }

    /// Returns true if the instance at `offset` decodes without a structural error.
    ///
    /// Diagnostics (failed references, rules, overlaps) do not make a buffer invalid.
    pub fn validate(&self, buf: &[u8], offset: usize) -> bool {
        match self.decode(buf, offset) {
            Ok(_) => true,
            Err(err) => {
                debug!(schema = %self.name, ?err, "invalid buffer");
                false
            }
        }
    }

    /// Decodes the instance at `offset` into a caller-supplied context.
    ///
    /// The instance is registered in the context's dedup cache so references that point back at
    /// it resolve to its record.
    pub fn decode_with(&self, ctx: &mut DecodeContext<'_>, offset: usize) -> Result<Value, Error> {
        trace!(schema = %self.name, offset, "decoding");
        let fresh = ctx.cached(offset).is_none();
        if fresh {
            ctx.cache(offset, Cached::Pending);
        }
        let result = self.read_instance(ctx, offset);
        if fresh && result.is_err() {
            ctx.evict(offset);
        }
        result
    }

    pub(crate) fn read_instance(
        &self,
        ctx: &mut DecodeContext<'_>,
        base: usize,
    ) -> Result<Value, Error> {
        ctx.descend()?;
        let result = self.read_fields(ctx, base);
        ctx.ascend();
        result
    }

    fn read_fields(&self, ctx: &mut DecodeContext<'_>, base: usize) -> Result<Value, Error> {
        let id = ctx.claim(base);
        let mut record = Record::new();

        for s in &self.statics {
            record.push(&s.name, s.value.clone());
        }

        for member in &self.members {
            let mark = ctx.enter_field(&member.name);
            let value = member.ty.read(ctx, base + member.offset);
            ctx.leave(mark);
            record.push(&member.name, value?);
        }

        for array in &self.arrays {
            let mark = ctx.enter_field(&array.name);
            let items = self.read_array(ctx, array, &record, base);
            ctx.leave(mark);
            record.push(&array.name, Value::List(items?));
        }

        for reference in &self.references {
            let mark = ctx.enter_field(&reference.name);
            let value = match self.read_reference(ctx, reference, &record, base) {
                Ok(value) => value,
                Err(err) => {
                    warn!(path = ctx.path(), ?err, "failed to follow reference");
                    ctx.report(err.to_string());
                    Value::Null
                }
            };
            ctx.leave(mark);
            record.push(&reference.name, value);
        }

        for (i, rule) in self.rules.iter().enumerate() {
            if let Some(message) = rule.check(&record, ctx.buffer()) {
                let path = format!("{}:rule[{}]", ctx.path(), i);
                ctx.report_at(path, message);
            }
        }

        ctx.mark_read(base, self.size);

        if ctx.config().hide_pointer_fields {
            for name in &self.pointers {
                record.remove(name);
            }
        }

        ctx.store(id, record);
        Ok(Value::Record(id))
    }

    fn read_array(
        &self,
        ctx: &mut DecodeContext<'_>,
        array: &Array,
        record: &Record,
        base: usize,
    ) -> Result<Vec<Value>, Error> {
        let count = locate(record, &array.count, &array.name)?;
        let mut start = locate(record, &array.offset, &array.name)?;
        if array.relative {
            start = relative(base, start, &array.name)?;
        }
        let length = count
            .checked_mul(array.stride)
            .ok_or(Error::EndOfBuffer { offset: start, len: usize::MAX })?;

        // Reject counts that cannot fit before allocating anything
        if length > 0 {
            ctx.window(start, length)?;
        }

        let mut items = Vec::with_capacity(count);
        for i in 0..count {
            let mark = ctx.enter_index(i);
            let item = array.ty.read(ctx, start + i * array.stride);
            ctx.leave(mark);
            items.push(item?);
        }

        // Elements mark their own bytes too: counters may exceed one, usage is unaffected
        ctx.mark_read(start, length);
        ctx.register(ArrayRegion {
            name: array.name.clone(),
            start,
            count,
            length,
            path: ctx.path().to_string(),
        });
        Ok(items)
    }

    fn read_reference(
        &self,
        ctx: &mut DecodeContext<'_>,
        reference: &Reference,
        record: &Record,
        base: usize,
    ) -> Result<Value, Error> {
        let mut target = locate(record, &reference.offset, &reference.name)?;
        if reference.relative {
            target = relative(base, target, &reference.name)?;
        }

        match ctx.cached(target) {
            Some(Cached::Done(value)) => {
                trace!(target, "reusing decoded value");
                return Ok(value.clone());
            }
            Some(Cached::Pending) => {
                return Err(Error::InvalidSource {
                    field: reference.name.clone(),
                    reason: format!("offset {target} is still being decoded"),
                });
            }
            None => {}
        }

        ctx.cache(target, Cached::Pending);
        match reference.ty.read(ctx, target) {
            Ok(value) => {
                if let Some(size) = reference.ty.fixed_size() {
                    ctx.mark_read(target, size);
                }
                ctx.cache(target, Cached::Done(value.clone()));
                Ok(value)
            }
            Err(err) => {
                ctx.evict(target);
                Err(err)
            }
        }
    }
}

/// Resolves a count or offset against the members decoded so far.
fn locate(record: &Record, slot: &Slot, field: &str) -> Result<usize, Error> {
    let invalid = |reason: String| Error::InvalidSource {
        field: field.to_string(),
        reason,
    };
    match slot {
        Slot::Literal(v) => usize::try_from(*v).map_err(|_| invalid(format!("{v} is too large"))),
        Slot::Member { index, name } => {
            let value = record
                .field(*index)
                .ok_or_else(|| invalid(format!("{name} was not decoded")))?;
            let v = value
                .as_int()
                .ok_or_else(|| invalid(format!("{name} is not an integer: {value}")))?;
            usize::try_from(v).map_err(|_| invalid(format!("{name} is negative: {v}")))
        }
    }
}

fn relative(base: usize, offset: usize, field: &str) -> Result<usize, Error> {
    base.checked_add(offset).ok_or_else(|| Error::InvalidSource {
        field: field.to_string(),
        reason: format!("{base} + {offset} overflows"),
    })
}

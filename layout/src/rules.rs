//! Cross-field validation of decoded records.
//!
//! A [Rule] runs after every member, array, and reference of a record has been decoded. A
//! failing rule does not stop decoding: its message is recorded as a diagnostic at
//! `<path>:rule[<index>]`.

use crate::value::{Record, Value};

/// A predicate over a fully decoded record.
pub trait Rule: Send + Sync {
    /// Returns `None` if the record satisfies the rule, or a message describing the violation.
    fn check(&self, record: &Record, buf: &[u8]) -> Option<String>;
}

impl<F> Rule for F
where
    F: Fn(&Record, &[u8]) -> Option<String> + Send + Sync,
{
    fn check(&self, record: &Record, buf: &[u8]) -> Option<String> {
        self(record, buf)
    }
}

/// One side of a comparison: a constant or the name of a field of the record.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Literal(Value),
    Field(String),
}

impl Operand {
    fn resolve(&self, record: &Record) -> Value {
        match self {
            Operand::Literal(value) => value.clone(),
            Operand::Field(name) => record.get(name).cloned().unwrap_or_default(),
        }
    }
}

/// Strings name fields. Use [Operand::Literal] to compare against a constant string.
impl From<&str> for Operand {
    fn from(name: &str) -> Self {
        Operand::Field(name.to_string())
    }
}

macro_rules! impl_literal {
    ($($type:ty),*) => {
        $(
            impl From<$type> for Operand {
                fn from(v: $type) -> Self {
                    Operand::Literal(Value::from(v))
                }
            }
        )*
    };
}
impl_literal!(i8, i16, i32, i64, u8, u16, u32, f32, f64, char);

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Literal(value)
    }
}

/// Rule requiring two operands to be equal.
#[derive(Clone, Debug)]
pub struct Equal {
    a: Operand,
    b: Operand,
}

impl Rule for Equal {
    fn check(&self, record: &Record, _: &[u8]) -> Option<String> {
        let a = self.a.resolve(record);
        let b = self.b.resolve(record);
        if same(&a, &b) {
            return None;
        }
        Some(format!("\"{a}\" is not equal to \"{b}\""))
    }
}

/// Numbers compare by value whatever their representation (`Int(1)` equals `Float(1.0)`).
fn same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            a.as_float() == b.as_float()
        }
        _ => a == b,
    }
}

/// Creates a rule requiring `a` and `b` to be equal.
///
/// # Example
///
/// ```
/// use commonware_layout::{rules, types::U32Le, Schema};
///
/// let header = Schema::builder("header")
///     .member(U32Le, "magic")
///     .rule(rules::equal("magic", 0x1265_7832u32))
///     .build()
///     .unwrap();
/// let report = header.report(&0x1265_7832u32.to_le_bytes(), 0, Default::default()).unwrap();
/// assert!(report.is_clean());
/// ```
pub fn equal(a: impl Into<Operand>, b: impl Into<Operand>) -> Equal {
    Equal {
        a: a.into(),
        b: b.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_literal() {
        let record = Record::new().with("magic", 42u32);
        assert_eq!(equal("magic", 42u32).check(&record, &[]), None);
        assert_eq!(
            equal("magic", 7u32).check(&record, &[]),
            Some("\"42\" is not equal to \"7\"".to_string())
        );
    }

    #[test]
    fn test_equal_mixed_numbers() {
        let record = Record::new().with("ratio", 1.0f32).with("count", 1u8);
        assert_eq!(equal("ratio", 1u8).check(&record, &[]), None);
        assert_eq!(equal("ratio", "count").check(&record, &[]), None);
        assert_eq!(
            equal("ratio", 2u8).check(&record, &[]),
            Some("\"1\" is not equal to \"2\"".to_string())
        );

        // Only numbers are coerced
        assert!(equal("count", '1').check(&record, &[]).is_some());
    }

    #[test]
    fn test_equal_fields() {
        let record = Record::new().with("a", 1u8).with("b", 1u8).with("c", 2u8);
        assert_eq!(equal("a", "b").check(&record, &[]), None);
        assert!(equal("a", "c").check(&record, &[]).is_some());
    }

    #[test]
    fn test_missing_field_is_null() {
        let record = Record::new();
        assert_eq!(
            equal("missing", 1u8).check(&record, &[]),
            Some("\"null\" is not equal to \"1\"".to_string())
        );
    }

    #[test]
    fn test_closure_rule() {
        let rule = |record: &Record, buf: &[u8]| {
            (record.len() != buf.len()).then(|| "length mismatch".to_string())
        };
        assert_eq!(rule.check(&Record::new().with("a", 1u8), &[0]), None);
        assert!(rule.check(&Record::new(), &[0]).is_some());
    }
}

//! Usage accounting, overlap detection, rules, and recoverable decode failures.

use commonware_layout::{
    rules,
    types::{Byte, Encoding, F32Le, NullTerminated, U32Le},
    Config, Diagnostic, Error, Record, Schema, Value,
};
use std::sync::Arc;

fn init() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn two_arrays() -> Arc<Schema> {
    Schema::builder("pair")
        .member(Byte, "a_pos")
        .member(Byte, "a_len")
        .member(Byte, "b_pos")
        .member(Byte, "b_len")
        .array(Byte, "a", "a_len", "a_pos", false)
        .array(Byte, "b", "b_len", "b_pos", false)
        .build()
        .unwrap()
}

#[test]
fn test_overlapping_arrays() {
    init();
    let mut buf = [0u8; 64];
    buf[..4].copy_from_slice(&[16, 48, 32, 16]);

    let report = two_arrays().report(&buf, 0, Config::monitored()).unwrap();
    assert!(report.errors.is_empty());
    assert_eq!(
        report.overlaps,
        vec![Diagnostic {
            path: "root.a/root.b".into(),
            message: "array a overlaps with b".into(),
        }]
    );
    assert_eq!(report.diagnostics().count(), 1);

    // Footprint plus [16, 64) (b lies inside a)
    assert_eq!(report.usage(), Some(52));
    let counts = report.usage_counts().unwrap();
    assert_eq!(counts[20], 1);
    assert_eq!(counts[40], 2);
    assert_eq!(counts[10], 0);
}

#[test]
fn test_disjoint_arrays() {
    init();
    let mut buf = [0u8; 64];
    buf[..4].copy_from_slice(&[4, 8, 12, 8]);

    let report = two_arrays().report(&buf, 0, Config::monitored()).unwrap();
    assert!(report.is_clean(), "{report}");
    assert_eq!(report.usage(), Some(20));
}

#[test]
fn test_usage_not_monitored() {
    let buf = [0u8; 8];
    let report = two_arrays().report(&buf, 0, Config::default()).unwrap();
    assert_eq!(report.usage(), None);
    assert!(report.usage_counts().is_none());
    assert!(!report.to_string().contains("bytes read"));
}

#[test]
fn test_nested_arrays_not_flagged() {
    init();
    let row = Schema::builder("row")
        .member(Byte, "len")
        .member(Byte, "at")
        .array(Byte, "cells", "len", "at", false)
        .build()
        .unwrap();
    let grid = Schema::builder("grid")
        .member(Byte, "rows")
        .array(row, "row", "rows", 1u64, false)
        .build()
        .unwrap();

    // One row at 1 whose cells are stored inside the row array itself
    let buf = [1u8, 1, 2];
    let report = grid.report(&buf, 0, Config::monitored()).unwrap();
    assert_eq!(report.arrays.len(), 2);
    assert_eq!(report.arrays[0].path, "root.row[0].cells");
    assert_eq!(report.arrays[1].path, "root.row");
    assert!(report.overlaps.is_empty());
}

#[test]
fn test_rule_equal() {
    init();
    let mut buf = [0u8; 64];
    buf[..4].copy_from_slice(&0x1265_7832u32.to_le_bytes());

    let schema = Schema::builder("magic")
        .member(U32Le, "magic")
        .rule(rules::equal("magic", 308_639_794u32))
        .rule(rules::equal("magic", 42u32))
        .build()
        .unwrap();
    let report = schema.report(&buf, 0, Config::default()).unwrap();
    assert_eq!(
        report.errors,
        vec![Diagnostic {
            path: "root:rule[1]".into(),
            message: "\"308639794\" is not equal to \"42\"".into(),
        }]
    );

    // Rules never fail a plain decode
    assert!(schema.validate(&buf, 0));
}

#[test]
fn test_rule_equal_float_against_integer() {
    init();
    let schema = Schema::builder("scale")
        .member(F32Le, "ratio")
        .rule(rules::equal("ratio", 1u8))
        .rule(rules::equal("ratio", 2u8))
        .build()
        .unwrap();

    let report = schema
        .report(&1.0f32.to_le_bytes(), 0, Config::default())
        .unwrap();
    assert_eq!(
        report.errors,
        vec![Diagnostic {
            path: "root:rule[1]".into(),
            message: "\"1\" is not equal to \"2\"".into(),
        }]
    );
}

#[test]
fn test_rule_path_in_array() {
    init();
    let item = Schema::builder("item")
        .member(Byte, "v")
        .rule(|record: &Record, _: &[u8]| {
            (record.get("v") != Some(&Value::Int(1))).then(|| "not one".to_string())
        })
        .build()
        .unwrap();
    let list = Schema::builder("list")
        .member(Byte, "n")
        .array(item, "items", "n", 1u64, false)
        .build()
        .unwrap();

    let report = list.report(&[3, 1, 2, 1], 0, Config::default()).unwrap();
    let paths: Vec<_> = report.errors.iter().map(|d| d.to_string()).collect();
    assert_eq!(paths, vec!["root.items[1]:rule[0]: not one"]);
}

#[test]
fn test_failed_reference_is_diagnostic() {
    init();
    let schema = Schema::builder("named")
        .member(Byte, "name_at")
        .member(Byte, "tag")
        .reference(NullTerminated::new(Encoding::Ascii), "name", "name_at", false)
        .build()
        .unwrap();

    // No terminator
    let buf = [2u8, 9, b'a', b'b'];
    let report = schema.report(&buf, 0, Config::default()).unwrap();
    assert_eq!(
        report.errors,
        vec![Diagnostic {
            path: "root.name".into(),
            message: Error::Unterminated(2).to_string(),
        }]
    );
    assert_eq!(report.tree.walk(&["name"]), Some(&Value::Null));
    assert_eq!(report.tree.walk(&["tag"]), Some(&Value::Int(9)));
    assert!(schema.validate(&buf, 0));

    // Out of bounds target
    let report = schema.report(&[200, 9], 0, Config::default()).unwrap();
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].path, "root.name");
}

#[test]
fn test_structural_errors() {
    init();
    let schema = Schema::builder("header")
        .member(U32Le, "magic")
        .member(Byte, "count")
        .array(U32Le, "items", "count", 5u64, false)
        .build()
        .unwrap();

    // Member out of bounds
    assert_eq!(
        schema.decode(&[0, 0], 0),
        Err(Error::EndOfBuffer { offset: 0, len: 4 })
    );
    assert!(!schema.validate(&[0, 0], 0));

    // Count larger than the buffer can hold is rejected before allocating
    let buf = [0, 0, 0, 0, 255, 1, 2, 3];
    assert_eq!(
        schema.decode(&buf, 0),
        Err(Error::EndOfBuffer {
            offset: 5,
            len: 255 * 4
        })
    );

    // Empty arrays never touch the buffer
    let tree = schema.decode(&[0, 0, 0, 0, 0], 0).unwrap();
    assert_eq!(tree.walk(&["items"]), Some(&Value::List(Vec::new())));
}

#[test]
fn test_hide_pointer_fields() {
    init();
    let schema = Schema::builder("blob")
        .constant("version", 3u8)
        .member(Byte, "len")
        .member(Byte, "at")
        .member(Byte, "flags")
        .array(Byte, "data", "len", "at", false)
        .build()
        .unwrap();
    let buf = [2u8, 3, 7, 0xAA, 0xBB];

    let cfg = Config {
        hide_pointer_fields: true,
        ..Default::default()
    };
    let report = schema.report(&buf, 0, cfg).unwrap();
    let root = report.tree.follow(report.tree.root()).unwrap();
    let names: Vec<_> = root.iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["version", "flags", "data"]);
    assert_eq!(
        root.get("data"),
        Some(&Value::List(vec![Value::Int(0xAA), Value::Int(0xBB)]))
    );

    // Visible by default
    let tree = schema.decode(&buf, 0).unwrap();
    assert_eq!(tree.walk(&["len"]), Some(&Value::Int(2)));
    assert_eq!(tree.walk(&["version"]), Some(&Value::Int(3)));
}

#[test]
fn test_relative_and_nonzero_base() {
    init();
    let schema = Schema::builder("chunk")
        .member(Byte, "count")
        .member(Byte, "at")
        .array(Byte, "items", "count", "at", true)
        .build()
        .unwrap();

    let buf = [9u8, 9, 2, 2, 0xA, 0xB];
    let tree = schema.decode(&buf, 2).unwrap();
    assert_eq!(
        tree.walk(&["items"]),
        Some(&Value::List(vec![Value::Int(0xA), Value::Int(0xB)]))
    );
}

#[test]
fn test_static_sources() {
    init();
    let schema = Schema::builder("fixed")
        .constant("count", 3u8)
        .constant("at", 1u8)
        .member(Byte, "tag")
        .array(Byte, "items", "count", "at", false)
        .build()
        .unwrap();

    let report = schema
        .report(&[7, 1, 2, 3], 0, Config::monitored())
        .unwrap();
    assert_eq!(report.usage(), Some(4));
    assert_eq!(report.tree.walk(&["count"]), Some(&Value::Int(3)));
    assert_eq!(
        report.tree.walk(&["items"]),
        Some(&Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
    );
}

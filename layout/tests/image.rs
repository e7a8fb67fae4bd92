//! A small image format: a header with nested dimensions, padding, a name stored elsewhere in the
//! buffer, and an array of pixels using a caller-defined color type.

use bytes::{Buf, BufMut};
use commonware_layout::{
    types::{Byte, Encoding, I32Le, NullTerminated, Skip},
    Config, DecodeContext, EncodeContext, Error, Record, Schema, Tree, Value, ValueType,
};
use std::sync::Arc;

fn init() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// 16-bit color with 5 bits of red, 6 of green, and 5 of blue.
struct Rgb565;

impl ValueType for Rgb565 {
    fn fixed_size(&self) -> Option<usize> {
        Some(2)
    }

    fn read(&self, ctx: &mut DecodeContext<'_>, offset: usize) -> Result<Value, Error> {
        let v = ctx.window(offset, 2)?.get_u16_le();
        let color = Record::new()
            .with("r", v >> 11)
            .with("g", (v >> 5) & 0x3f)
            .with("b", v & 0x1f);
        Ok(ctx.insert(color))
    }

    fn write(&self, value: &Value, offset: usize, ctx: &mut EncodeContext) -> Result<(), Error> {
        let record = ctx.tree().follow(value).ok_or_else(|| {
            Error::InvalidValue("Rgb565", format!("expected a color, got {value}"))
        })?;
        let channel = |name: &str| record.get(name).and_then(Value::as_int).unwrap_or(0) as u16;
        let v = (channel("r") << 11) | (channel("g") << 5) | channel("b");
        ctx.slot(offset, 2)?.put_u16_le(v);
        Ok(())
    }
}

fn image() -> Arc<Schema> {
    let dimensions = Schema::builder("dimensions")
        .member(I32Le, "width")
        .member(I32Le, "height")
        .build()
        .unwrap();
    let pixel = Schema::builder("pixel")
        .member(Rgb565, "color")
        .member(Byte, "alpha")
        .build()
        .unwrap();
    Schema::builder("image")
        .member(I32Le, "magic")
        .member(dimensions, "size")
        .member(I32Le, "pixel_offset")
        .member(I32Le, "pixel_count")
        .member(I32Le, "name_index")
        .member(Skip::new(8), "unused")
        .reference(NullTerminated::new(Encoding::Ascii), "name", "name_index", false)
        .array(pixel, "pixels", "pixel_count", "pixel_offset", false)
        .build()
        .unwrap()
}

fn image_buffer() -> Vec<u8> {
    let mut buf = vec![0u8; 85];
    buf[0..4].copy_from_slice(&0x2401_1999i32.to_le_bytes());
    buf[4..8].copy_from_slice(&4i32.to_le_bytes());
    buf[8..12].copy_from_slice(&4i32.to_le_bytes());
    buf[12..16].copy_from_slice(&32i32.to_le_bytes());
    buf[16..20].copy_from_slice(&16i32.to_le_bytes());
    buf[20..24].copy_from_slice(&80i32.to_le_bytes());
    for (i, byte) in buf.iter_mut().enumerate().take(80).skip(32) {
        *byte = (i * 9 % 255) as u8;
    }
    buf[80..84].copy_from_slice(b"Tina");
    buf
}

fn channel(tree: &Tree, pixel: &Value, name: &str) -> i64 {
    let color = tree.follow(pixel).unwrap().get("color").unwrap();
    tree.follow(color).unwrap().get(name).unwrap().as_int().unwrap()
}

#[test]
fn test_decode_image() {
    init();
    let schema = image();
    assert_eq!(schema.size(), 32);

    let tree = schema.decode(&image_buffer(), 0).unwrap();
    assert_eq!(tree.walk(&["magic"]), Some(&Value::Int(604_051_865)));
    assert_eq!(tree.walk(&["size", "width"]), Some(&Value::Int(4)));
    assert_eq!(tree.walk(&["size", "height"]), Some(&Value::Int(4)));
    assert_eq!(tree.walk(&["pixel_offset"]), Some(&Value::Int(32)));
    assert_eq!(tree.walk(&["pixel_count"]), Some(&Value::Int(16)));
    assert_eq!(tree.walk(&["name_index"]), Some(&Value::Int(80)));
    assert_eq!(tree.walk(&["unused"]), Some(&Value::Null));
    assert_eq!(tree.walk(&["name"]), Some(&Value::Str("Tina".into())));

    let pixels = tree.walk(&["pixels"]).unwrap().as_list().unwrap();
    assert_eq!(pixels.len(), 16);

    // First pixel is stored as [33, 42, 51]
    let first = &pixels[0];
    assert_eq!(channel(&tree, first, "r"), 5);
    assert_eq!(channel(&tree, first, "g"), 17);
    assert_eq!(channel(&tree, first, "b"), 1);
    let alphas: Vec<_> = pixels
        .iter()
        .map(|pixel| tree.follow(pixel).unwrap().get("alpha").unwrap().as_int().unwrap())
        .collect();
    assert_eq!(
        alphas,
        vec![51, 78, 105, 132, 159, 186, 213, 240, 12, 39, 66, 93, 120, 147, 174, 201]
    );
}

#[test]
fn test_image_report() {
    init();
    let buf = image_buffer();
    let report = image().report(&buf, 0, Config::monitored()).unwrap();
    assert!(report.is_clean(), "{report}");

    // Header, every pixel, and the name with its terminator
    assert_eq!(report.usage(), Some(32 + 48 + 5));
    assert!(report.usage_counts().unwrap().iter().all(|count| *count > 0));
    assert_eq!(report.arrays.len(), 1);
    assert_eq!(report.arrays[0].path, "root.pixels");
    assert_eq!(report.arrays[0].start, 32);
    assert_eq!(report.arrays[0].length, 48);

    let printed = report.to_string();
    assert!(printed.contains("buffer size: 85"));
    assert!(printed.contains("no errors"));
}

#[test]
fn test_image_round_trip() {
    init();
    let schema = image();
    let buf = image_buffer();
    let tree = schema.decode(&buf, 0).unwrap();

    let ctx = schema.encode(tree.clone()).unwrap();
    assert!(ctx.errors().is_empty(), "{:?}", ctx.errors());
    assert_eq!(ctx.buffer(), &buf[..]);
    assert_eq!(ctx.tree(), &tree);
}

//! Describe, decode, and encode the binary layout of C-like structs.
//!
//! # Overview
//!
//! A [Schema] declares the layout of a struct as it appears in a buffer:
//! - Members: fixed-size fields laid out back to back
//! - Arrays: runs of elements stored elsewhere in the buffer, located by a count and an offset
//!   held in sibling fields (or given as literals)
//! - References: single values stored elsewhere in the buffer, located by an offset
//! - Statics: constants that occupy no bytes
//! - Rules: predicates checked against each decoded instance
//!
//! Schemas nest (a schema is itself a [ValueType]) and may refer to themselves (see
//! [Schema::cyclic]), which makes linked and graph-shaped formats expressible.
//!
//! Decoding produces a [Tree]: an arena of [Record]s addressed by [RecordId]. A reference that
//! points at an offset that was already decoded resolves to the same record, so cyclic data
//! decodes to a cyclic tree instead of recursing forever. Encoding does the reverse: it computes
//! the size of everything reachable from the root, then bump-allocates a region for every array
//! and reference while rewriting the tree's offset and count fields to match.
//!
//! # Failures
//!
//! Structural problems (an out-of-bounds read, an unterminated string, a schema that cannot be
//! laid out) are returned as [Error]s and abort the call. Everything else is recorded as a
//! [Diagnostic] with the path of the offending value and the call continues: references that
//! fail to decode, rules that do not hold, arrays that overlap, fields missing from a tree being
//! encoded.
//!
//! # Example
//!
//! ```
//! use commonware_layout::{rules, types::{Byte, I32Le}, Config, Schema, Value};
//!
//! let header = Schema::builder("header")
//!     .member(I32Le, "magic")
//!     .member(Byte, "offset")
//!     .member(Byte, "count")
//!     .array(Byte, "data", "count", "offset", false)
//!     .rule(rules::equal("magic", 0x2401_1999))
//!     .build()
//!     .unwrap();
//!
//! let mut buf = vec![0u8; 8];
//! buf[..4].copy_from_slice(&0x2401_1999i32.to_le_bytes());
//! buf[4] = 6; // offset
//! buf[5] = 2; // count
//! buf[6] = 0xAA;
//! buf[7] = 0xBB;
//!
//! let report = header.report(&buf, 0, Config::monitored()).unwrap();
//! assert!(report.is_clean());
//! assert_eq!(report.usage(), Some(8));
//! assert_eq!(
//!     report.tree.walk(&["data"]),
//!     Some(&Value::List(vec![Value::Int(0xAA), Value::Int(0xBB)]))
//! );
//!
//! // Encode it again
//! let encoded = header.encode(report.tree).unwrap();
//! assert_eq!(encoded.buffer(), &buf[..]);
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod report;
pub mod rules;
pub mod schema;
pub mod types;
pub mod value;

pub use config::Config;
pub use context::{DecodeContext, EncodeContext};
pub use error::{Diagnostic, Error};
pub use report::Report;
pub use schema::{Builder, Schema, SelfRef, Source};
pub use types::ValueType;
pub use value::{Record, RecordId, Tree, Value};

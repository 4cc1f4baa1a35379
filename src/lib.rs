//! Declarative binary payload codec for constrained-network telemetry
//! schemas (spec §1): a schema tree, pre-parsed by an external collaborator,
//! fully specifies how to translate between raw payload bytes and named,
//! typed field values. This crate is the interpreter core — the cursor,
//! environment, field and composite drivers, computed-value engine, and
//! the encoder that mirrors it — not a schema-source parser.

#![forbid(unsafe_code)]

pub mod binary_schema;
pub mod compact_format;
pub mod compute;
pub mod cursor;
pub mod decode;
pub mod encode;
pub mod env;
pub mod error;
pub mod formula;
pub mod ieee754;
pub mod modifiers;
pub mod rawformat;
pub mod schema;
pub mod value;

#[cfg(test)]
mod test;

pub use cursor::ByteOrder;
pub use decode::{decode, decode_with_port};
pub use encode::{encode, encode_with_port};
pub use error::{CodecError, Result};
pub use schema::Schema;
pub use value::Value;

//! The encode half of the interpreter: named values → bytes (spec §4.6), a
//! mirror traversal of [`crate::decode`] over the same schema tree.
//!
//! Resolved ambiguities not spelled out field-by-field in spec §4.6 (see
//! `DESIGN.md` §"Encoder" for the full rationale):
//! - A field absent from the input map contributes zero bytes rather than a
//!   placeholder, matching spec step 3 ("skip silently"). This only produces
//!   a byte-identical round trip for schemas where every field present at
//!   decode time round-trips back into the input map unchanged.
//! - `bool` fields sharing one byte across several `consumes_byte: false`
//!   siblings are OR-packed into a pending byte, mirroring the peek-without-
//!   advance behavior the decoder uses for the same layout.
//! - `match`/`TLV` case selection for encoding infers the case from which
//!   case's field names are present in the input map, since the encoder has
//!   no decoded selector byte to re-read.

mod composite;
mod field;

use indexmap::IndexMap;

use crate::cursor::ByteOrder;
use crate::env::Environment;
use crate::error::{CodecError, Result};
use crate::schema::Schema;
use crate::value::Value;

/// Per-traversal state for an encode pass: one output buffer, one
/// environment, and a pending-bit-byte accumulator for consecutive
/// non-consuming `bool` fields (spec §5 "Shared resources: None").
pub(crate) struct EncodeCtx {
    pub buf: Vec<u8>,
    pub env: Environment,
    pub default_order: ByteOrder,
    pub pending_bit_byte: u8,
}

impl EncodeCtx {
    fn new(default_order: ByteOrder) -> Self {
        EncodeCtx {
            buf: Vec::new(),
            env: Environment::new(),
            default_order,
            pending_bit_byte: 0,
        }
    }

    pub fn effective_order(&self, field_order: Option<ByteOrder>) -> ByteOrder {
        field_order.unwrap_or(self.default_order)
    }

    /// Write `value` as `width` bytes honoring `order` (the write-side
    /// mirror of [`crate::cursor::fold_uint`]).
    pub fn write_uint(&mut self, value: u64, width: usize, order: ByteOrder) {
        let mut bytes = vec![0u8; width];
        let mut v = value;
        for i in 0..width {
            let idx = match order {
                ByteOrder::Big => width - 1 - i,
                ByteOrder::Little => i,
            };
            bytes[idx] = (v & 0xFF) as u8;
            v >>= 8;
        }
        self.buf.extend_from_slice(&bytes);
    }
}

fn root_map(input: &Value) -> Result<&IndexMap<String, Value>> {
    input.as_object().ok_or_else(|| {
        CodecError::Other(anyhow::anyhow!(
            "encode input must be an object mapping, got {}",
            input.describe()
        ))
    })
}

/// Encode `input` against `schema`'s main field sequence (header first,
/// same as decode).
pub fn encode(schema: &Schema, input: &Value) -> Result<Vec<u8>> {
    encode_sequence(schema, input, None)
}

/// Encode `input`, selecting the port table entry for `fport` (falls back
/// to `"default"`, else `port-not-found`), symmetric with
/// [`crate::decode::decode_with_port`].
pub fn encode_with_port(schema: &Schema, input: &Value, fport: u32) -> Result<Vec<u8>> {
    encode_sequence(schema, input, Some(fport))
}

fn encode_sequence(schema: &Schema, input: &Value, port: Option<u32>) -> Result<Vec<u8>> {
    let fields = schema.sequence_for_port(port)?;
    let map = root_map(input)?;
    let mut ctx = EncodeCtx::new(schema.byte_order);

    field::encode_fields(&mut ctx, &schema.header, map)?;
    field::encode_fields(&mut ctx, fields, map)?;

    Ok(ctx.buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::ByteOrder;
    use crate::decode::decode;
    use crate::schema::field::{Field, FieldKind, ModStage, Modifiers};
    use crate::schema::Schema;

    #[test]
    fn basic_scaled_sensor_round_trips() {
        let schema = Schema::new(vec![
            Field::new("version", FieldKind::UInt { width: 1 }),
            Field::new("temperature", FieldKind::Int { width: 2 })
                .with_modifiers(Modifiers::from_transform(vec![ModStage::mult(0.1)])),
            Field::new("humidity", FieldKind::UInt { width: 1 })
                .with_modifiers(Modifiers::from_transform(vec![ModStage::mult(0.5)])),
        ])
        .with_byte_order(ByteOrder::Big);

        let bytes = [0x02, 0x00, 0xFA, 0x64];
        let decoded = decode(&schema, &bytes).unwrap();
        let encoded = encode(&schema, &decoded).unwrap();
        assert_eq!(encoded, bytes);
    }

    #[test]
    fn missing_field_is_skipped() {
        let schema = Schema::new(vec![
            Field::new("a", FieldKind::UInt { width: 1 }),
            Field::new("b", FieldKind::UInt { width: 1 }),
        ]);
        let mut map = indexmap::IndexMap::new();
        map.insert("a".to_string(), Value::Integer(7));
        let input = Value::Object(map);
        let encoded = encode(&schema, &input).unwrap();
        assert_eq!(encoded, vec![7]);
    }
}

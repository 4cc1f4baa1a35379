//! The decode half of the interpreter: bytes → named values (spec §2, §4).

mod composite;
mod field;

use indexmap::IndexMap;

use crate::cursor::{ByteOrder, Cursor};
use crate::env::Environment;
use crate::error::{CodecError, Result};
use crate::schema::Schema;
use crate::value::Value;

/// Per-traversal state threaded through every recursive call: one cursor,
/// one environment, no nested scopes (spec §4.2, §5 "Shared resources:
/// None... an interpreter invocation allocates its own cursor, environment,
/// and output mapping").
pub(crate) struct DecodeCtx<'a> {
    pub cursor: Cursor<'a>,
    pub env: Environment,
    pub default_order: ByteOrder,
    /// field name -> "good" | "out_of_range", surfaced as a `_quality`
    /// sibling on the root output map (spec §4.3 step 7).
    pub quality: IndexMap<String, &'static str>,
}

impl<'a> DecodeCtx<'a> {
    fn new(buf: &'a [u8], default_order: ByteOrder) -> Self {
        DecodeCtx {
            cursor: Cursor::new(buf),
            env: Environment::new(),
            default_order,
            quality: IndexMap::new(),
        }
    }

    pub fn effective_order(&self, field_order: Option<ByteOrder>) -> ByteOrder {
        field_order.unwrap_or(self.default_order)
    }
}

/// Insert `value` under `key`, promoting a pre-existing entry to an array
/// and appending on a repeated key (spec §4.4 TLV "Merging").
pub(crate) fn insert_promoting(map: &mut IndexMap<String, Value>, key: String, value: Value) {
    match map.shift_remove(&key) {
        None => {
            map.insert(key, value);
        }
        Some(Value::Array(mut existing)) => {
            existing.push(value);
            map.insert(key, Value::Array(existing));
        }
        Some(prior) => {
            map.insert(key, Value::Array(vec![prior, value]));
        }
    }
}

fn finish(ctx: DecodeCtx, mut root: IndexMap<String, Value>) -> Value {
    if !ctx.quality.is_empty() {
        let quality_map: IndexMap<String, Value> = ctx
            .quality
            .into_iter()
            .map(|(k, v)| (k, Value::String(v.to_string())))
            .collect();
        root.insert("_quality".to_string(), Value::Object(quality_map));
    }
    Value::Object(root)
}

/// Decode `bytes` against `schema`'s main field sequence (header applies
/// first, per spec §3).
pub fn decode(schema: &Schema, bytes: &[u8]) -> Result<Value> {
    decode_sequence(schema, bytes, None)
}

/// Decode `bytes`, selecting the port table entry for `fport` if the
/// schema declares one; falls back to `"default"`, else errors
/// (spec §6, §7 `port-not-found`).
pub fn decode_with_port(schema: &Schema, bytes: &[u8], fport: u32) -> Result<Value> {
    decode_sequence(schema, bytes, Some(fport))
}

fn decode_sequence(schema: &Schema, bytes: &[u8], port: Option<u32>) -> Result<Value> {
    let main_fields = schema.sequence_for_port(port)?;
    let mut ctx = DecodeCtx::new(bytes, schema.byte_order);

    let mut root = IndexMap::new();
    field::decode_fields_into(&mut ctx, &schema.header, &mut root)?;
    field::decode_fields_into(&mut ctx, main_fields, &mut root)?;

    Ok(finish(ctx, root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::ByteOrder;
    use crate::schema::field::{Field, FieldKind, ModStage, Modifiers};
    use crate::schema::Schema;

    #[test]
    fn basic_scaled_sensor() {
        let schema = Schema::new(vec![
            Field::new("version", FieldKind::UInt { width: 1 }),
            Field::new("temperature", FieldKind::Int { width: 2 })
                .with_modifiers(Modifiers::from_transform(vec![ModStage::mult(0.1)])),
            Field::new("humidity", FieldKind::UInt { width: 1 })
                .with_modifiers(Modifiers::from_transform(vec![ModStage::mult(0.5)])),
        ])
        .with_byte_order(ByteOrder::Big);

        let bytes = [0x02, 0x00, 0xFA, 0x64];
        let result = decode(&schema, &bytes).unwrap();
        let obj = result.as_object().unwrap();
        assert_eq!(obj["version"], Value::Integer(2));
        assert_eq!(obj["temperature"], Value::Float(25.0));
        assert_eq!(obj["humidity"], Value::Float(50.0));
    }

    #[test]
    fn empty_payload_empty_schema() {
        let schema = Schema::new(vec![]);
        let result = decode(&schema, &[]).unwrap();
        assert_eq!(result.as_object().unwrap().len(), 0);
    }

    #[test]
    fn underflow_on_primitive() {
        let schema = Schema::new(vec![Field::new("x", FieldKind::UInt { width: 4 })]);
        let err = decode(&schema, &[0, 0]).unwrap_err();
        assert!(matches!(err, CodecError::BufferUnderflow { .. }));
    }

    #[test]
    fn valid_range_emits_quality_map() {
        let schema = Schema::new(vec![
            Field::new("t", FieldKind::Int { width: 1 }).with_valid_range(-10.0, 10.0)
        ]);
        let good = decode(&schema, &[5]).unwrap();
        let good_obj = good.as_object().unwrap();
        assert_eq!(
            good_obj["_quality"].as_object().unwrap()["t"],
            Value::String("good".to_string())
        );

        let bad = decode(&schema, &[100]).unwrap();
        let bad_obj = bad.as_object().unwrap();
        assert_eq!(
            bad_obj["_quality"].as_object().unwrap()["t"],
            Value::String("out_of_range".to_string())
        );
    }

    #[test]
    fn port_table_selects_alternate_sequence_with_fallback() {
        use crate::schema::{Direction, PortEntry, PortKey, PortTable};

        let mut entries = IndexMap::new();
        entries.insert(
            PortKey::Port(5),
            PortEntry {
                fields: vec![Field::new("uplink_only", FieldKind::UInt { width: 1 })],
                direction: Direction::Uplink,
            },
        );
        entries.insert(
            PortKey::Default,
            PortEntry {
                fields: vec![Field::new("fallback", FieldKind::UInt { width: 1 })],
                direction: Direction::Bidirectional,
            },
        );
        let schema = Schema::new(vec![Field::new("main", FieldKind::UInt { width: 1 })])
            .with_ports(PortTable { entries });

        let via_port5 = decode_with_port(&schema, &[9], 5).unwrap();
        assert_eq!(via_port5.as_object().unwrap()["uplink_only"], Value::Integer(9));

        let via_unknown_port = decode_with_port(&schema, &[9], 99).unwrap();
        assert_eq!(via_unknown_port.as_object().unwrap()["fallback"], Value::Integer(9));
    }

    #[test]
    fn port_not_found_without_default() {
        use crate::schema::{Direction, PortEntry, PortKey, PortTable};
        let mut entries = IndexMap::new();
        entries.insert(
            PortKey::Port(5),
            PortEntry {
                fields: vec![],
                direction: Direction::Uplink,
            },
        );
        let schema = Schema::new(vec![]).with_ports(PortTable { entries });
        let err = decode_with_port(&schema, &[], 7).unwrap_err();
        assert!(matches!(err, CodecError::PortNotFound(7)));
    }
}

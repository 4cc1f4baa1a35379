//! Field encoder: resolve each field's value from the input map, invert the
//! modifier phase, and emit bytes (spec §4.6).

use std::collections::HashMap;

use indexmap::IndexMap;

use super::{composite, EncodeCtx};
use crate::error::{CodecError, Result};
use crate::ieee754::f64_to_f16;
use crate::modifiers::invert_stages;
use crate::rawformat;
use crate::schema::field::{Field, FieldKind, FlaggedGroupSpec, NumBase};
use crate::value::Value;

/// Overrides for fields whose true on-wire value cannot be read back from
/// the input map directly — currently just flagged-group backing variables,
/// whose bit pattern is derived from which group fields are present rather
/// than authored by the caller (spec §4.6 step 1).
pub(crate) type FlagOverrides = HashMap<String, i64>;

pub(crate) fn group_fields_present(fields: &[Field], input: &IndexMap<String, Value>) -> bool {
    fields.iter().any(|f| match f.name.as_deref() {
        Some(name) => input.contains_key(name),
        None => false,
    })
}

pub(crate) fn flag_bits(spec: &FlaggedGroupSpec, input: &IndexMap<String, Value>) -> i64 {
    let mut bits = 0i64;
    for group in &spec.groups {
        if group_fields_present(&group.fields, input) {
            bits |= 1 << group.bit;
        }
    }
    bits
}

/// Pre-scan `fields` for `FlaggedGroup`s and compute the flag word each of
/// their backing variables must carry, keyed by variable name (spec §4.6
/// step 1: "pre-scan the groups to compute the flag-word value... and patch
/// that value into the input map before the flag field is emitted").
fn collect_flag_overrides(fields: &[Field], input: &IndexMap<String, Value>) -> FlagOverrides {
    let mut overrides = FlagOverrides::new();
    for f in fields {
        if let FieldKind::FlaggedGroup(spec) = &f.kind {
            overrides.insert(spec.flag_var.clone(), flag_bits(spec, input));
        }
    }
    overrides
}

pub(crate) fn encode_fields(
    ctx: &mut EncodeCtx,
    fields: &[Field],
    input: &IndexMap<String, Value>,
) -> Result<()> {
    let overrides = collect_flag_overrides(fields, input);
    for field in fields {
        encode_field(ctx, field, input, &overrides)?;
    }
    Ok(())
}

/// Resolve the numeric value to write for a primitive/bit field: the
/// input-map value under `name` (reverse-looked-up if the field has a
/// `lookup`), or a flag override keyed by `name`/`var`, in that order. This
/// is the value domain the decoder would have produced just after its
/// modifier phase but before storing (spec §4.3 steps 4-6, mirrored).
fn resolve_numeric(
    field: &Field,
    input: &IndexMap<String, Value>,
    overrides: &FlagOverrides,
) -> Option<f64> {
    if let Some(name) = &field.name {
        if let Some(v) = input.get(name) {
            return Some(match (&field.lookup, v) {
                (Some(lookup), Value::String(label)) => {
                    lookup.reverse(label).map(|n| n as f64).unwrap_or(0.0)
                }
                _ => v.to_f64().unwrap_or(0.0),
            });
        }
        if let Some(bits) = overrides.get(name) {
            return Some(*bits as f64);
        }
    }
    if let Some(var) = &field.var {
        if let Some(bits) = overrides.get(var) {
            return Some(*bits as f64);
        }
    }
    None
}

/// Store into the environment the same value [`crate::decode::field`]
/// would have stored for this field, so later `ref`/guard/match/repeat
/// references resolve identically during encode (spec §4.2).
fn store_env(ctx: &mut EncodeCtx, field: &Field, numeric: f64, final_value: &Value) {
    if let Some(var) = &field.var {
        ctx.env.set(var, Value::Float(numeric));
    } else if let Some(name) = &field.name {
        ctx.env.set(name, final_value.clone());
    }
}

fn invert_and_round(field: &Field, numeric: f64) -> Result<i64> {
    let raw = if field.legacy_formula.is_some() {
        // The legacy formula is frozen and not generally invertible (spec
        // §9); encode takes the decoded value at face value.
        numeric
    } else {
        invert_stages(numeric, &field.modifiers.0, field.name.as_deref().unwrap_or("<field>"))?
    };
    Ok(raw.round() as i64)
}

fn encode_field(
    ctx: &mut EncodeCtx,
    field: &Field,
    input: &IndexMap<String, Value>,
    overrides: &FlagOverrides,
) -> Result<()> {
    let order = ctx.effective_order(field.byte_order);

    match &field.kind {
        FieldKind::UInt { width } => {
            let Some(numeric) = resolve_numeric(field, input, overrides) else {
                return Ok(());
            };
            let raw = invert_and_round(field, numeric)?;
            store_env(ctx, field, numeric, &Value::Integer(raw));
            ctx.write_uint(raw as u64, *width as usize, order);
            Ok(())
        }
        FieldKind::Int { width } => {
            let Some(numeric) = resolve_numeric(field, input, overrides) else {
                return Ok(());
            };
            let raw = invert_and_round(field, numeric)?;
            store_env(ctx, field, numeric, &Value::Integer(raw));
            let bits = (raw as u64) & width_mask(*width as usize);
            ctx.write_uint(bits, *width as usize, order);
            Ok(())
        }
        FieldKind::Float { width } => {
            let Some(numeric) = resolve_numeric(field, input, overrides) else {
                return Ok(());
            };
            let value = if field.legacy_formula.is_some() {
                numeric
            } else {
                invert_stages(numeric, &field.modifiers.0, field.name.as_deref().unwrap_or("<field>"))?
            };
            store_env(ctx, field, numeric, &Value::Float(value));
            match width {
                2 => ctx.write_uint(f64_to_f16(value) as u64, 2, order),
                4 => ctx.write_uint((value as f32).to_bits() as u64, 4, order),
                8 => ctx.write_uint(value.to_bits(), 8, order),
                other => return Err(CodecError::UnknownType(format!("float width {other}"))),
            }
            Ok(())
        }
        FieldKind::BoolBit { bit, consumes_byte } => {
            let value = field
                .name
                .as_deref()
                .and_then(|n| input.get(n))
                .and_then(|v| v.to_f64())
                .map(|v| v != 0.0)
                .unwrap_or(false);
            if let Some(name) = &field.name {
                ctx.env.set(name, Value::Bool(value));
            }
            if value {
                ctx.pending_bit_byte |= 1 << bit;
            }
            if *consumes_byte {
                let byte = ctx.pending_bit_byte;
                ctx.pending_bit_byte = 0;
                ctx.buf.push(byte);
            }
            Ok(())
        }
        FieldKind::BitSlice { offset, width } => {
            let Some(numeric) = resolve_numeric(field, input, overrides) else {
                return Ok(());
            };
            let raw = invert_and_round(field, numeric)?;
            store_env(ctx, field, numeric, &Value::Integer(raw));
            let mask: u8 = if *width >= 8 { 0xFF } else { (1u8 << width) - 1 };
            let byte = ((raw as u8) & mask) << offset;
            ctx.buf.push(byte);
            Ok(())
        }
        FieldKind::Skip { len } => {
            ctx.buf.extend(std::iter::repeat(0u8).take(*len));
            Ok(())
        }
        FieldKind::RawBytes(spec) => {
            let Some(name) = &field.name else { return Ok(()) };
            let Some(v) = input.get(name) else { return Ok(()) };
            let text = v.as_str().ok_or_else(|| CodecError::InvalidOperand {
                op: "raw_bytes".to_string(),
                value: v.describe(),
            })?;
            let bytes = rawformat::parse(text, spec.format, spec.separator.as_deref())?;
            ctx.env.set(name, v.clone());
            ctx.buf.extend_from_slice(&bytes);
            Ok(())
        }
        FieldKind::Ascii { len } => {
            let Some(name) = &field.name else { return Ok(()) };
            let Some(v) = input.get(name) else { return Ok(()) };
            let text = v.as_str().unwrap_or_default();
            ctx.env.set(name, v.clone());
            let mut bytes = text.as_bytes().to_vec();
            bytes.resize(*len, 0);
            bytes.truncate(*len);
            ctx.buf.extend_from_slice(&bytes);
            Ok(())
        }
        FieldKind::HexIn { len } => {
            let Some(name) = &field.name else { return Ok(()) };
            let Some(v) = input.get(name) else { return Ok(()) };
            let text = v.as_str().unwrap_or_default();
            let bytes = rawformat::parse(text, crate::schema::field::RawFormat::HexLower, None)?;
            ctx.env.set(name, v.clone());
            let mut bytes = bytes;
            bytes.resize(*len, 0);
            ctx.buf.extend_from_slice(&bytes);
            Ok(())
        }
        FieldKind::BitfieldString(spec) => {
            let Some(name) = &field.name else { return Ok(()) };
            let Some(v) = input.get(name) else { return Ok(()) };
            let text = v.as_str().ok_or_else(|| CodecError::InvalidOperand {
                op: "bitfield_string".to_string(),
                value: v.describe(),
            })?;
            ctx.env.set(name, v.clone());
            let stripped = match &spec.prefix {
                Some(prefix) => text.strip_prefix(prefix.as_str()).unwrap_or(text),
                None => text,
            };
            let parts: Vec<&str> = stripped.split(spec.delimiter.as_str()).collect();
            let mut packed: u64 = 0;
            for (part, spec_part) in parts.iter().zip(spec.parts.iter()) {
                let raw = match spec_part.base {
                    NumBase::Hex => u64::from_str_radix(part, 16),
                    NumBase::Decimal => part.parse::<u64>(),
                }
                .map_err(|e| CodecError::InvalidOperand {
                    op: "bitfield_string".to_string(),
                    value: format!("part {part:?}: {e}"),
                })?;
                let mask: u64 = if spec_part.width >= 64 {
                    u64::MAX
                } else {
                    (1u64 << spec_part.width) - 1
                };
                packed |= (raw & mask) << spec_part.offset;
            }
            ctx.write_uint(packed, spec.int_width, spec.byte_order.unwrap_or(order));
            Ok(())
        }
        FieldKind::NibbleDecimal { signed } => {
            let Some(name) = &field.name else { return Ok(()) };
            let Some(v) = input.get(name) else { return Ok(()) };
            let value = v.to_f64().unwrap_or(0.0);
            ctx.env.set(name, v.clone());
            ctx.buf.push(nibble_encode(value, *signed));
            Ok(())
        }
        // Computed-only; derived from other fields, never stored by the
        // caller, never emits bytes (spec §4.6 step 2).
        FieldKind::Number(_) => Ok(()),
        FieldKind::Object { fields } => match &field.name {
            Some(name) => {
                let sub = input
                    .get(name)
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                encode_fields(ctx, fields, &sub)
            }
            None => encode_fields(ctx, fields, input),
        },
        FieldKind::Match(spec) => composite::encode_match(ctx, spec, input),
        FieldKind::Repeat(spec) => composite::encode_repeat(ctx, field, spec, input),
        FieldKind::Tlv(spec) => composite::encode_tlv(ctx, field, spec, input),
        FieldKind::FlaggedGroup(spec) => composite::encode_flagged_group(ctx, spec, input),
        FieldKind::ByteGroup(spec) => composite::encode_byte_group(ctx, spec, order, input),
    }
}

fn width_mask(width: usize) -> u64 {
    if width * 8 >= 64 {
        u64::MAX
    } else {
        (1u64 << (width * 8)) - 1
    }
}

/// Inverse of the decoder's nibble-decimal unpacking (spec §3).
fn nibble_encode(value: f64, signed: bool) -> u8 {
    let whole = value.trunc();
    let tenths = ((value - whole).abs() * 10.0).round() as u8 & 0xF;
    let whole_nibble = if signed {
        (whole as i32 as u8) & 0xF
    } else {
        (whole as u8) & 0xF
    };
    (whole_nibble << 4) | tenths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;
    use crate::encode::encode;
    use crate::schema::field::{Field, FieldKind};
    use crate::schema::Schema;

    #[test]
    fn nibble_decimal_round_trips() {
        let schema = Schema::new(vec![Field::new(
            "t",
            FieldKind::NibbleDecimal { signed: false },
        )]);
        let bytes = [0x23];
        let decoded = decode(&schema, &bytes).unwrap();
        let encoded = encode(&schema, &decoded).unwrap();
        assert_eq!(encoded, bytes);
    }

    #[test]
    fn ascii_round_trips_with_padding() {
        let schema = Schema::new(vec![Field::new("s", FieldKind::Ascii { len: 5 })]);
        let bytes = [b'h', b'i', 0, 0, 0];
        let decoded = decode(&schema, &bytes).unwrap();
        let encoded = encode(&schema, &decoded).unwrap();
        assert_eq!(encoded, bytes);
    }
}

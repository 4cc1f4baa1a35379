//! Field interpreter: dispatch on field kind, the modifier/lookup/store
//! phases common to every numeric leaf, and the five-step pipeline from
//! spec §4.3.

use indexmap::IndexMap;

use super::{composite, insert_promoting, DecodeCtx};
use crate::compute;
use crate::error::{CodecError, Result};
use crate::formula;
use crate::ieee754::f16_to_f64;
use crate::modifiers::apply_stages;
use crate::rawformat;
use crate::schema::field::{Field, FieldKind, NumBase};
use crate::value::Value;

/// What a decoded field contributes to its enclosing mapping.
pub(crate) enum FieldOutcome {
    /// Nothing to insert (e.g. `skip`, or a `var`-only field with no `name`).
    None,
    /// Insert `value` at `key` in the enclosing map.
    Named(String, Value),
    /// Hoist every entry into the enclosing map, with repeated-key
    /// promotion to an array (flagged groups, match, merged TLV records,
    /// byte-groups — spec §3, §4.4).
    Merge(IndexMap<String, Value>),
}

/// Decode every field in `fields` in order, applying each one's outcome
/// into `out`.
pub(crate) fn decode_fields_into(
    ctx: &mut DecodeCtx,
    fields: &[Field],
    out: &mut IndexMap<String, Value>,
) -> Result<()> {
    for field in fields {
        match decode_field(ctx, field)? {
            FieldOutcome::None => {}
            FieldOutcome::Named(key, value) => {
                out.insert(key, value);
            }
            FieldOutcome::Merge(entries) => {
                for (key, value) in entries {
                    insert_promoting(out, key, value);
                }
            }
        }
    }
    Ok(())
}

/// Like [`decode_fields_into`] but returns a fresh map, for composites that
/// nest or hoist their own sub-sequence (object, match cases, repeat
/// elements, flagged groups, TLV records).
pub(crate) fn decode_fields(ctx: &mut DecodeCtx, fields: &[Field]) -> Result<IndexMap<String, Value>> {
    let mut out = IndexMap::new();
    decode_fields_into(ctx, fields, &mut out)?;
    Ok(out)
}

/// Run the shared modifier/lookup/store/quality phases (spec §4.3 steps
/// 4-7) over a numeric raw value and produce this field's outcome.
fn store_and_emit(ctx: &mut DecodeCtx, field: &Field, raw_pre_lookup: Value) -> Result<FieldOutcome> {
    let final_value = match (&field.lookup, raw_pre_lookup.to_i64()) {
        (Some(lookup), Some(key)) => lookup
            .forward(key)
            .map(|label| Value::String(label.to_string()))
            .unwrap_or_else(|| raw_pre_lookup.clone()),
        _ => raw_pre_lookup.clone(),
    };

    // spec §4.3 step 6 / §4.2: `var` stores the pre-lookup value as the
    // reference-visible environment entry; otherwise the field's own name
    // (if any) is both the env key and stores the final value.
    match (&field.var, &field.name) {
        (Some(var), _) => ctx.env.set(var, raw_pre_lookup),
        (None, Some(name)) => ctx.env.set(name, final_value.clone()),
        (None, None) => {}
    }

    if let Some((lo, hi)) = field.metadata.valid_range {
        if let (Some(name), Some(v)) = (&field.name, final_value.to_f64()) {
            let verdict = if v >= lo && v <= hi { "good" } else { "out_of_range" };
            ctx.quality.insert(name.clone(), verdict);
        }
    }

    Ok(match &field.name {
        Some(name) => FieldOutcome::Named(name.clone(), final_value),
        None => FieldOutcome::None,
    })
}

/// Numeric value produced before the lookup phase: whole-valued reads with
/// no modifier/formula pipeline stay exact integers; anything that passed
/// through a pipeline (which works in floating point) stays a float, even
/// if the result happens to be a whole number (spec worked examples keep
/// e.g. `temperature: 25.0` as a float).
fn numeric_result(field: &Field, ctx: &DecodeCtx, raw: i64) -> Result<Value> {
    if field.legacy_formula.is_none() && field.modifiers.is_empty() {
        return Ok(Value::Integer(raw));
    }
    let value = match &field.legacy_formula {
        Some(expr) => formula::evaluate(expr, raw as f64, &ctx.env)?,
        None => apply_stages(raw as f64, &field.modifiers.0),
    };
    Ok(Value::Float(value))
}

fn float_result(field: &Field, ctx: &DecodeCtx, raw: f64) -> Result<Value> {
    let value = match &field.legacy_formula {
        Some(expr) => formula::evaluate(expr, raw, &ctx.env)?,
        None => apply_stages(raw, &field.modifiers.0),
    };
    Ok(Value::Float(value))
}

pub(crate) fn decode_field(ctx: &mut DecodeCtx, field: &Field) -> Result<FieldOutcome> {
    let order = ctx.effective_order(field.byte_order);

    match &field.kind {
        FieldKind::UInt { width } => {
            let raw = ctx.cursor.read_uint(*width as usize, order)? as i64;
            let value = numeric_result(field, ctx, raw)?;
            store_and_emit(ctx, field, value)
        }
        FieldKind::Int { width } => {
            let raw = ctx.cursor.read_int(*width as usize, order)?;
            let value = numeric_result(field, ctx, raw)?;
            store_and_emit(ctx, field, value)
        }
        FieldKind::Float { width } => {
            let raw_value = match width {
                2 => {
                    let bits = ctx.cursor.read_uint(2, order)? as u16;
                    f16_to_f64(bits)
                }
                4 => {
                    let bits = ctx.cursor.read_uint(4, order)? as u32;
                    f64::from(f32::from_bits(bits))
                }
                8 => {
                    let bits = ctx.cursor.read_uint(8, order)?;
                    f64::from_bits(bits)
                }
                other => return Err(CodecError::UnknownType(format!("float width {other}"))),
            };
            let value = float_result(field, ctx, raw_value)?;
            store_and_emit(ctx, field, value)
        }
        FieldKind::BoolBit { bit, consumes_byte } => {
            let byte = ctx.cursor.peek(1, 0)?[0];
            if *consumes_byte {
                ctx.cursor.advance(1)?;
            }
            let value = (byte >> bit) & 1 == 1;
            store_and_emit(ctx, field, Value::Bool(value))
        }
        FieldKind::BitSlice { offset, width } => {
            let byte = ctx.cursor.read(1)?[0];
            let mask: u8 = if *width >= 8 { 0xFF } else { (1u8 << width) - 1 };
            let raw = i64::from((byte >> offset) & mask);
            let value = numeric_result(field, ctx, raw)?;
            store_and_emit(ctx, field, value)
        }
        FieldKind::Skip { len } => {
            ctx.cursor.advance(*len)?;
            Ok(FieldOutcome::None)
        }
        FieldKind::RawBytes(spec) => {
            let bytes = ctx.cursor.read(spec.len)?.to_vec();
            let text = rawformat::render(&bytes, spec.format, spec.separator.as_deref());
            store_and_emit(ctx, field, Value::String(text))
        }
        FieldKind::Ascii { len } => {
            let bytes = ctx.cursor.read(*len)?;
            let trimmed: &[u8] = match bytes.iter().position(|&b| b == 0) {
                Some(pos) => &bytes[..pos],
                None => bytes,
            };
            let text = String::from_utf8_lossy(trimmed).into_owned();
            store_and_emit(ctx, field, Value::String(text))
        }
        FieldKind::HexIn { len } => {
            let bytes = ctx.cursor.read(*len)?;
            let text = rawformat::render(bytes, crate::schema::field::RawFormat::HexLower, None);
            store_and_emit(ctx, field, Value::String(text))
        }
        FieldKind::BitfieldString(spec) => {
            let packed = ctx
                .cursor
                .read_uint(spec.int_width, spec.byte_order.unwrap_or(order))?;
            let mut parts = Vec::with_capacity(spec.parts.len());
            for part in &spec.parts {
                let mask: u64 = if part.width >= 64 {
                    u64::MAX
                } else {
                    (1u64 << part.width) - 1
                };
                let bits = (packed >> part.offset) & mask;
                parts.push(match part.base {
                    NumBase::Hex => format!("{bits:X}"),
                    NumBase::Decimal => bits.to_string(),
                });
            }
            let joined = parts.join(&spec.delimiter);
            let text = match &spec.prefix {
                Some(prefix) => format!("{prefix}{joined}"),
                None => joined,
            };
            store_and_emit(ctx, field, Value::String(text))
        }
        FieldKind::NibbleDecimal { signed } => {
            let byte = ctx.cursor.read(1)?[0];
            let value = nibble_decimal(byte, *signed);
            let value = float_result(field, ctx, value)?;
            store_and_emit(ctx, field, value)
        }
        FieldKind::Number(num) => {
            let name = field.name.as_deref().unwrap_or("<number>");
            let value = compute::evaluate(num, &ctx.env, name)?;
            store_and_emit(ctx, field, Value::Float(value))
        }
        FieldKind::Object { fields } => {
            let sub = decode_fields(ctx, fields)?;
            match &field.name {
                Some(name) => Ok(FieldOutcome::Named(name.clone(), Value::Object(sub))),
                None => Ok(FieldOutcome::Merge(sub)),
            }
        }
        FieldKind::Match(spec) => composite::decode_match(ctx, spec),
        FieldKind::Repeat(spec) => composite::decode_repeat(ctx, field, spec),
        FieldKind::Tlv(spec) => composite::decode_tlv(ctx, field, spec),
        FieldKind::FlaggedGroup(spec) => composite::decode_flagged_group(ctx, spec),
        FieldKind::ByteGroup(spec) => composite::decode_byte_group(ctx, spec),
    }
}

/// Upper nibble = whole part, lower nibble = tenths; the signed variant
/// sign-extends the upper nibble (spec §3).
fn nibble_decimal(byte: u8, signed: bool) -> f64 {
    let whole_nibble = (byte >> 4) & 0xF;
    let tenths = f64::from(byte & 0xF);
    if !signed {
        return f64::from(whole_nibble) + tenths / 10.0;
    }
    let whole = if whole_nibble & 0x8 != 0 {
        i32::from(whole_nibble) - 16
    } else {
        i32::from(whole_nibble)
    };
    let sign = if whole < 0 { -1.0 } else { 1.0 };
    f64::from(whole) + sign * tenths / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;
    use crate::schema::field::ModStage;
    use crate::schema::Schema;

    #[test]
    fn nibble_decimal_unsigned() {
        // 0x23 -> whole=2, tenths=3 -> 2.3
        assert_eq!(nibble_decimal(0x23, false), 2.3);
    }

    #[test]
    fn nibble_decimal_signed_negative() {
        // upper nibble 0xE = -2 (sign-extended 4 bit), lower nibble 5 -> -2.5
        assert_eq!(nibble_decimal(0xE5, true), -2.5);
    }

    #[test]
    fn plain_int_stays_integer_with_no_modifiers() {
        let schema = Schema::new(vec![crate::schema::field::Field::new(
            "n",
            FieldKind::UInt { width: 1 },
        )]);
        let result = decode(&schema, &[42]).unwrap();
        assert_eq!(result.as_object().unwrap()["n"], Value::Integer(42));
    }

    #[test]
    fn modifier_pipeline_yields_float() {
        let schema = Schema::new(vec![crate::schema::field::Field::new(
            "n",
            FieldKind::UInt { width: 1 },
        )
        .with_modifiers(crate::schema::field::Modifiers::from_transform(vec![
            ModStage::mult(0.5),
        ]))]);
        let result = decode(&schema, &[10]).unwrap();
        assert_eq!(result.as_object().unwrap()["n"], Value::Float(5.0));
    }
}

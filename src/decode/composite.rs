//! Composite drivers: flagged group, match, repeat, TLV, byte-group (spec
//! §4.4). Each recurses into [`field::decode_fields`] for its nested
//! sequence(s); none introduce a new environment scope.

use indexmap::IndexMap;

use super::field::{decode_fields, FieldOutcome};
use super::{insert_promoting, DecodeCtx};
use crate::error::{CodecError, Result};
use crate::schema::field::{
    ByteGroupSpec, CountSource, Field, FlaggedGroupSpec, MatchSpec, RepeatSpec, Selector,
    TagShape, Termination, TlvSpec, UnknownPolicy,
};
use crate::value::Value;

pub(crate) fn decode_match(ctx: &mut DecodeCtx, spec: &MatchSpec) -> Result<FieldOutcome> {
    let selector_value = match &spec.selector {
        Selector::Var(name) => ctx.env.resolve(name)?.clone(),
        Selector::Inline { len, byte_order } => {
            let order = ctx.effective_order(*byte_order);
            let raw = ctx.cursor.read_uint(*len, order)?;
            Value::Integer(raw as i64)
        }
    };

    let chosen = spec
        .cases
        .iter()
        .find(|c| !c.matcher.is_default() && c.matcher.matches(&selector_value))
        .or_else(|| spec.cases.iter().find(|c| c.matcher.is_default()));

    // No match and no default yields an empty sub-map rather than an error
    // (spec §9 open question i, kept as specified).
    match chosen {
        Some(case) => Ok(FieldOutcome::Merge(decode_fields(ctx, &case.fields)?)),
        None => Ok(FieldOutcome::Merge(IndexMap::new())),
    }
}

fn resolve_count(ctx: &DecodeCtx, src: &CountSource) -> Result<usize> {
    match src {
        CountSource::Literal(n) => Ok(*n),
        CountSource::Var(name) => {
            let value = ctx.env.resolve(name)?;
            value.to_i64().map(|n| n.max(0) as usize).ok_or_else(|| {
                CodecError::InvalidOperand {
                    op: "repeat count".to_string(),
                    value: value.describe(),
                }
            })
        }
    }
}

pub(crate) fn decode_repeat(ctx: &mut DecodeCtx, field: &Field, spec: &RepeatSpec) -> Result<FieldOutcome> {
    let mut elements = Vec::new();

    match &spec.termination {
        Termination::Count(src) => {
            let count = resolve_count(ctx, src)?.min(spec.max);
            for _ in 0..count {
                elements.push(Value::Object(decode_fields(ctx, &spec.fields)?));
            }
        }
        Termination::ByteLength(src) => {
            let window = resolve_count(ctx, src)?;
            let start = ctx.cursor.offset();
            let end = start + window;
            let mut iterations = 0;
            while ctx.cursor.offset() < end && iterations < spec.max {
                elements.push(Value::Object(decode_fields(ctx, &spec.fields)?));
                iterations += 1;
            }
            if ctx.cursor.offset() != end {
                return Err(CodecError::RepeatByteLengthMismatch {
                    expected: end,
                    ended_at: ctx.cursor.offset(),
                });
            }
        }
        Termination::UntilEnd => {
            let mut iterations = 0;
            while ctx.cursor.remaining() > 0 && iterations < spec.max {
                elements.push(Value::Object(decode_fields(ctx, &spec.fields)?));
                iterations += 1;
            }
        }
    }

    if let Some(min) = spec.min {
        if elements.len() < min {
            return Err(CodecError::RepeatMinUnmet {
                min,
                got: elements.len(),
            });
        }
    }

    match &field.name {
        Some(name) => Ok(FieldOutcome::Named(name.clone(), Value::Array(elements))),
        None => Ok(FieldOutcome::None),
    }
}

pub(crate) fn decode_tlv(ctx: &mut DecodeCtx, field: &Field, spec: &TlvSpec) -> Result<FieldOutcome> {
    let mut merged = IndexMap::new();
    let mut records = Vec::new();

    while ctx.cursor.remaining() > 0 {
        let (key, tag_fields) = match &spec.tag {
            TagShape::Simple(simple) => {
                let order = ctx.effective_order(simple.byte_order);
                let raw = ctx.cursor.read_uint(simple.size, order)? as i64;
                (vec![raw], IndexMap::new())
            }
            TagShape::Composite(composite) => {
                let sub = decode_fields(ctx, &composite.fields)?;
                let key = composite
                    .tag_key
                    .iter()
                    .map(|k| {
                        sub.get(k)
                            .and_then(Value::to_i64)
                            .ok_or_else(|| CodecError::MissingVariable(k.clone()))
                    })
                    .collect::<Result<Vec<_>>>()?;
                (key, sub)
            }
        };

        let declared_length = if spec.length_size > 0 {
            let order = ctx.effective_order(None);
            Some(ctx.cursor.read_uint(spec.length_size, order)? as usize)
        } else {
            None
        };

        match spec.cases.iter().find(|c| c.key == key) {
            Some(case) => {
                let case_fields = decode_fields(ctx, &case.fields)?;
                if spec.merge {
                    // Tag sub-fields are dispatch key material, consumed
                    // for matching but not hoisted into the merged result
                    // (spec §8 "TLV composite": the tag_key fields
                    // themselves must not appear in the output).
                    for (k, v) in case_fields {
                        insert_promoting(&mut merged, k, v);
                    }
                } else {
                    let mut record = tag_fields;
                    record.extend(case_fields);
                    records.push(Value::Object(record));
                }
            }
            None => match spec.unknown {
                UnknownPolicy::Skip => match declared_length {
                    Some(len) => ctx.cursor.advance(len)?,
                    None => return Err(CodecError::TlvUnknownTag(format!("{key:?}"))),
                },
                UnknownPolicy::Error => return Err(CodecError::TlvUnknownTag(format!("{key:?}"))),
            },
        }
    }

    if spec.merge {
        Ok(FieldOutcome::Merge(merged))
    } else {
        let key = field.name.clone().unwrap_or_else(|| "channels".to_string());
        Ok(FieldOutcome::Named(key, Value::Array(records)))
    }
}

pub(crate) fn decode_flagged_group(ctx: &mut DecodeCtx, spec: &FlaggedGroupSpec) -> Result<FieldOutcome> {
    let flags = ctx
        .env
        .resolve(&spec.flag_var)?
        .to_i64()
        .ok_or_else(|| CodecError::InvalidOperand {
            op: "flagged group".to_string(),
            value: spec.flag_var.clone(),
        })?;

    let mut merged = IndexMap::new();
    for group in &spec.groups {
        if (flags >> group.bit) & 1 == 1 {
            for (k, v) in decode_fields(ctx, &group.fields)? {
                insert_promoting(&mut merged, k, v);
            }
        }
    }
    Ok(FieldOutcome::Merge(merged))
}

pub(crate) fn decode_byte_group(ctx: &mut DecodeCtx, spec: &ByteGroupSpec) -> Result<FieldOutcome> {
    let order = ctx.effective_order(spec.byte_order);
    let packed = ctx.cursor.read_uint(spec.width, order)?;

    let mut merged = IndexMap::new();
    for sub in &spec.subfields {
        let value = (packed >> sub.start) & sub.mask();
        let value = Value::Integer(value as i64);
        ctx.env.set(&sub.name, value.clone());
        merged.insert(sub.name.clone(), value);
    }
    Ok(FieldOutcome::Merge(merged))
}

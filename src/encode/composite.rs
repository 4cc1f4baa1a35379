//! Composite encoders mirroring [`crate::decode::composite`]: flagged
//! group, match, repeat, TLV, byte-group (spec §4.6).

use indexmap::IndexMap;

use super::field::{encode_fields, group_fields_present};
use super::EncodeCtx;
use crate::cursor::ByteOrder;
use crate::error::Result;
use crate::schema::field::{
    ByteGroupSpec, CaseMatch, Field, FlaggedGroupSpec, MatchCase, MatchSpec, RepeatSpec, Selector,
    TagShape, TlvCase, TlvSpec,
};
use crate::value::Value;

/// A representative integer for writing an inline match selector when the
/// case was chosen by field-presence rather than by re-reading a selector
/// byte (spec §4.6 has no prescribed rule here; see `DESIGN.md`).
fn representative_int(matcher: &CaseMatch) -> i64 {
    match matcher {
        CaseMatch::Literal(v) => v.to_i64().unwrap_or(0),
        CaseMatch::List(vs) => vs.first().and_then(Value::to_i64).unwrap_or(0),
        CaseMatch::Range { min, .. } => *min,
        CaseMatch::Default => 0,
    }
}

fn choose_case<'a>(
    spec: &'a MatchSpec,
    ctx: &EncodeCtx,
    input: &IndexMap<String, Value>,
) -> Option<&'a MatchCase> {
    match &spec.selector {
        Selector::Var(name) => {
            let value = ctx.env.get(crate::env::strip_sigil(name))?;
            spec.cases
                .iter()
                .find(|c| !c.matcher.is_default() && c.matcher.matches(value))
                .or_else(|| spec.cases.iter().find(|c| c.matcher.is_default()))
        }
        Selector::Inline { .. } => spec
            .cases
            .iter()
            .find(|c| !c.matcher.is_default() && group_fields_present(&c.fields, input))
            .or_else(|| spec.cases.iter().find(|c| c.matcher.is_default())),
    }
}

pub(crate) fn encode_match(
    ctx: &mut EncodeCtx,
    spec: &MatchSpec,
    input: &IndexMap<String, Value>,
) -> Result<()> {
    let Some(case) = choose_case(spec, ctx, input) else {
        return Ok(());
    };
    if let Selector::Inline { len, byte_order } = &spec.selector {
        let order = ctx.effective_order(*byte_order);
        ctx.write_uint(representative_int(&case.matcher) as u64, *len, order);
    }
    encode_fields(ctx, &case.fields, input)
}

pub(crate) fn encode_repeat(
    ctx: &mut EncodeCtx,
    field: &Field,
    spec: &RepeatSpec,
    input: &IndexMap<String, Value>,
) -> Result<()> {
    let Some(name) = &field.name else { return Ok(()) };
    let Some(elements) = input.get(name).and_then(Value::as_array) else {
        return Ok(());
    };
    for element in elements {
        let sub = element.as_object().cloned().unwrap_or_default();
        encode_fields(ctx, &spec.fields, &sub)?;
    }
    Ok(())
}

pub(crate) fn encode_flagged_group(
    ctx: &mut EncodeCtx,
    spec: &FlaggedGroupSpec,
    input: &IndexMap<String, Value>,
) -> Result<()> {
    for group in &spec.groups {
        if group_fields_present(&group.fields, input) {
            encode_fields(ctx, &group.fields, input)?;
        }
    }
    Ok(())
}

pub(crate) fn encode_byte_group(
    ctx: &mut EncodeCtx,
    spec: &ByteGroupSpec,
    order: ByteOrder,
    input: &IndexMap<String, Value>,
) -> Result<()> {
    let mut packed: u64 = 0;
    for sub in &spec.subfields {
        let value = input.get(&sub.name).and_then(Value::to_i64).unwrap_or(0) as u64;
        packed |= (value & sub.mask()) << sub.start;
        ctx.env.set(&sub.name, Value::Integer(value as i64));
    }
    ctx.write_uint(packed, spec.width, spec.byte_order.unwrap_or(order));
    Ok(())
}

/// Emit one TLV record: tag, optional length (computed by encoding the
/// record into a scratch buffer first so the length prefix can precede
/// it), then the record's own fields.
fn emit_tlv_record(
    ctx: &mut EncodeCtx,
    spec: &TlvSpec,
    case: &TlvCase,
    record: &IndexMap<String, Value>,
) -> Result<()> {
    match &spec.tag {
        TagShape::Simple(simple) => {
            let order = ctx.effective_order(simple.byte_order);
            let tag = case.key.first().copied().unwrap_or(0);
            ctx.write_uint(tag as u64, simple.size, order);
        }
        TagShape::Composite(composite) => {
            encode_fields(ctx, &composite.fields, record)?;
        }
    }

    if spec.length_size > 0 {
        let mut scratch = EncodeCtx::new(ctx.default_order);
        encode_fields(&mut scratch, &case.fields, record)?;
        let order = ctx.effective_order(None);
        ctx.write_uint(scratch.buf.len() as u64, spec.length_size, order);
        ctx.buf.extend_from_slice(&scratch.buf);
    } else {
        encode_fields(ctx, &case.fields, record)?;
    }
    Ok(())
}

/// Build one zipped record per index when a case's fields were promoted to
/// arrays by repeated decode (spec §4.4 TLV "Merging"), or a single record
/// otherwise. A composite tag's own sub-fields are not hoisted into the
/// merged decode output (spec §8 "TLV composite": the dispatch-key fields
/// themselves must not appear in the result), so any tag sub-field that is
/// part of `tag_key` is reconstructed here from `case.key` — the literal
/// values that selected this case in the first place — rather than read
/// back from `input`. A composite tag sub-field *not* listed in `tag_key`
/// has no such fixed value and falls back to `input`, same as before.
fn records_for_case<'a>(
    tag: &TagShape,
    case: &TlvCase,
    input: &'a IndexMap<String, Value>,
) -> Vec<IndexMap<String, Value>> {
    let mut names: Vec<&str> = Vec::new();
    let mut tag_key_values: IndexMap<&str, i64> = IndexMap::new();
    if let TagShape::Composite(composite) = tag {
        names.extend(composite.fields.iter().filter_map(|f| f.name.as_deref()));
        for (key_name, value) in composite.tag_key.iter().zip(case.key.iter()) {
            tag_key_values.insert(key_name.as_str(), *value);
        }
    }
    names.extend(case.fields.iter().filter_map(|f| f.name.as_deref()));
    let case_names: Vec<&str> = case.fields.iter().filter_map(|f| f.name.as_deref()).collect();
    if case_names.is_empty() || !case_names.iter().all(|n| input.contains_key(*n)) {
        return Vec::new();
    }
    let array_len = names
        .iter()
        .filter(|n| !tag_key_values.contains_key(*n))
        .filter_map(|n| input.get(*n).and_then(Value::as_array).map(<[Value]>::len))
        .max();

    match array_len {
        None => {
            let mut record = IndexMap::new();
            for name in &names {
                if let Some(lit) = tag_key_values.get(name) {
                    record.insert((*name).to_string(), Value::Integer(*lit));
                } else if let Some(v) = input.get(*name) {
                    record.insert((*name).to_string(), v.clone());
                }
            }
            vec![record]
        }
        Some(n) => (0..n)
            .map(|i| {
                let mut record = IndexMap::new();
                for name in &names {
                    let value = if let Some(lit) = tag_key_values.get(name) {
                        Value::Integer(*lit)
                    } else {
                        match input.get(*name) {
                            Some(Value::Array(a)) => a.get(i).cloned().unwrap_or(Value::Integer(0)),
                            Some(v) => v.clone(),
                            None => Value::Integer(0),
                        }
                    };
                    record.insert((*name).to_string(), value);
                }
                record
            })
            .collect(),
    }
}

pub(crate) fn encode_tlv(
    ctx: &mut EncodeCtx,
    field: &Field,
    spec: &TlvSpec,
    input: &IndexMap<String, Value>,
) -> Result<()> {
    if spec.merge {
        for case in &spec.cases {
            for record in records_for_case(&spec.tag, case, input) {
                emit_tlv_record(ctx, spec, case, &record)?;
            }
        }
        return Ok(());
    }

    let key = field.name.clone().unwrap_or_else(|| "channels".to_string());
    let Some(channels) = input.get(&key).and_then(Value::as_array) else {
        return Ok(());
    };
    for channel in channels {
        let record = channel.as_object().cloned().unwrap_or_default();
        let case = spec.cases.iter().find(|c| {
            c.fields
                .iter()
                .all(|f| f.name.as_deref().map(|n| record.contains_key(n)).unwrap_or(true))
        });
        if let Some(case) = case {
            emit_tlv_record(ctx, spec, case, &record)?;
        }
    }
    Ok(())
}

//! The printf-struct-style compact format decoder (spec §6): a secondary
//! convenience that turns a format string like `">B:a H:b B:c"` into an
//! equivalent field sequence and decodes with it, for callers migrating
//! from a Python `struct`-shaped payload description.

use crate::cursor::ByteOrder;
use crate::decode::decode;
use crate::error::{CodecError, Result};
use crate::schema::field::{CountSource, Field, FieldKind, RepeatSpec, Termination};
use crate::schema::Schema;
use crate::value::Value;

/// Parse the format string into (default byte order, field sequence). `=`
/// and `@` ("native") are not meaningfully native on this core — which has
/// no host-endianness concept (spec §4.1) — so both resolve to little
/// endian, the common case among the embedded payloads this format
/// targets.
pub fn parse_format(fmt: &str) -> Result<(ByteOrder, Vec<Field>)> {
    let mut chars = fmt.chars().peekable();
    let mut order = ByteOrder::Big;

    match chars.peek() {
        Some('>') | Some('!') => {
            chars.next();
            order = ByteOrder::Big;
        }
        Some('<') | Some('=') | Some('@') => {
            chars.next();
            order = ByteOrder::Little;
        }
        _ => {}
    }

    let mut fields = Vec::new();
    let mut auto_index = 0usize;
    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut digits = String::new();
        while matches!(chars.peek(), Some(c) if c.is_ascii_digit()) {
            digits.push(chars.next().unwrap());
        }
        let count: usize = if digits.is_empty() {
            1
        } else {
            digits.parse().map_err(|_| {
                CodecError::Other(anyhow::anyhow!("bad repeat count {digits:?} in format string"))
            })?
        };

        let Some(type_char) = chars.next() else {
            return Err(CodecError::Other(anyhow::anyhow!(
                "format string ended mid-token"
            )));
        };

        let mut name = None;
        if chars.peek() == Some(&':') {
            chars.next();
            let mut n = String::new();
            while matches!(chars.peek(), Some(c) if !c.is_whitespace()) {
                n.push(chars.next().unwrap());
            }
            name = Some(n);
        }

        if type_char == 'x' {
            fields.push(Field::new(format!("_pad{auto_index}"), FieldKind::Skip { len: count }));
            auto_index += 1;
            continue;
        }

        let field_name = name.unwrap_or_else(|| {
            let n = format!("_field{auto_index}");
            auto_index += 1;
            n
        });

        if type_char == 's' {
            fields.push(Field::new(field_name, FieldKind::Ascii { len: count }));
            continue;
        }
        if type_char == 'p' {
            // Pascal string: first byte is the length, remainder is text;
            // approximated here as a fixed-length ASCII read of `count`
            // bytes (the leading length byte is not separately surfaced).
            fields.push(Field::new(field_name, FieldKind::Ascii { len: count }));
            continue;
        }

        let element_kind = primitive_kind(type_char)?;
        if count == 1 {
            fields.push(Field::new(field_name, element_kind));
        } else {
            let element = Field::new("value", element_kind);
            fields.push(Field::new(
                field_name,
                FieldKind::Repeat(RepeatSpec {
                    fields: vec![element],
                    termination: Termination::Count(CountSource::Literal(count)),
                    min: None,
                    max: crate::schema::field::DEFAULT_REPEAT_MAX,
                }),
            ));
        }
    }

    Ok((order, fields))
}

fn primitive_kind(type_char: char) -> Result<FieldKind> {
    Ok(match type_char {
        'b' => FieldKind::Int { width: 1 },
        'B' => FieldKind::UInt { width: 1 },
        'h' => FieldKind::Int { width: 2 },
        'H' => FieldKind::UInt { width: 2 },
        'i' | 'l' => FieldKind::Int { width: 4 },
        'I' | 'L' => FieldKind::UInt { width: 4 },
        'q' => FieldKind::Int { width: 8 },
        'Q' => FieldKind::UInt { width: 8 },
        'e' => FieldKind::Float { width: 2 },
        'f' => FieldKind::Float { width: 4 },
        'd' => FieldKind::Float { width: 8 },
        '?' => FieldKind::BoolBit { bit: 0, consumes_byte: true },
        'c' => FieldKind::RawBytes(crate::schema::field::RawBytesSpec {
            len: 1,
            format: crate::schema::field::RawFormat::HexLower,
            separator: None,
        }),
        other => return Err(CodecError::UnknownType(format!("compact format type `{other}`"))),
    })
}

/// Parse `fmt` and decode `bytes` against the resulting field sequence in
/// one step (spec §6).
pub fn decode_compact(fmt: &str, bytes: &[u8]) -> Result<Value> {
    let (order, fields) = parse_format(fmt)?;
    let schema = Schema::new(fields).with_byte_order(order);
    decode(&schema, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokens_decode_named_fields() {
        let result = decode_compact(">B:a H:b B:c", &[0x01, 0x00, 0x02, 0x03]).unwrap();
        let obj = result.as_object().unwrap();
        assert_eq!(obj["a"], Value::Integer(1));
        assert_eq!(obj["b"], Value::Integer(2));
        assert_eq!(obj["c"], Value::Integer(3));
    }

    #[test]
    fn pad_bytes_are_skipped() {
        let result = decode_compact(">B x B", &[0x09, 0xFF, 0x0A]).unwrap();
        let obj = result.as_object().unwrap();
        assert_eq!(obj.len(), 2);
    }

    #[test]
    fn repeated_primitive_becomes_array() {
        let result = decode_compact(">3B:vals", &[1, 2, 3]).unwrap();
        let arr = result.as_object().unwrap()["vals"].as_array().unwrap();
        assert_eq!(arr.len(), 3);
    }

    #[test]
    fn little_endian_prefix() {
        let result = decode_compact("<H:v", &[0x01, 0x02]).unwrap();
        assert_eq!(result.as_object().unwrap()["v"], Value::Integer(0x0201));
    }
}

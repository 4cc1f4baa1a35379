//! End-to-end worked examples exercising the whole tree-walk in one pass:
//! several field kinds, a composite, and the computed-value engine
//! together, the way a schema author's integration fixture would.

use indexmap::IndexMap;

use crate::cursor::ByteOrder;
use crate::decode::decode;
use crate::encode::encode;
use crate::schema::field::{
    BitSubfield, BitfieldStringPart, BitfieldStringSpec, ByteGroupSpec, ComputeMode, ComputedNumber,
    Field, FieldKind, FlagGroup, FlaggedGroupSpec, Guard, GuardCheck, GuardWhen, ModStage, Modifiers,
    NumBase, RepeatSpec, TagShape, TagSimple, Termination, TlvCase, TlvSpec, UnknownPolicy,
};
use crate::schema::Schema;
use crate::value::Value;

#[test]
fn flagged_group_with_one_group_absent() {
    // flags = 0b01: battery group present, dielectric group absent.
    let schema = Schema::new(vec![
        Field::new("flags", FieldKind::UInt { width: 1 }),
        Field::new(
            "_groups",
            FieldKind::FlaggedGroup(FlaggedGroupSpec {
                flag_var: "flags".to_string(),
                groups: vec![
                    FlagGroup {
                        bit: 0,
                        fields: vec![Field::new("battery", FieldKind::UInt { width: 1 })],
                    },
                    FlagGroup {
                        bit: 1,
                        fields: vec![Field::new(
                            "dielectric_permittivity",
                            FieldKind::UInt { width: 1 },
                        )],
                    },
                ],
            }),
        ),
    ]);

    let bytes = [0x01, 0x64];
    let decoded = decode(&schema, &bytes).unwrap();
    let obj = decoded.as_object().unwrap();
    assert_eq!(obj["battery"], Value::Integer(0x64));
    assert!(!obj.contains_key("dielectric_permittivity"));

    let encoded = encode(&schema, &decoded).unwrap();
    assert_eq!(encoded, bytes);
}

#[test]
fn bitfield_string_joins_version_nibbles() {
    let schema = Schema::new(vec![Field::new(
        "version",
        FieldKind::BitfieldString(BitfieldStringSpec {
            int_width: 1,
            byte_order: None,
            parts: vec![
                BitfieldStringPart {
                    offset: 4,
                    width: 4,
                    base: NumBase::Decimal,
                },
                BitfieldStringPart {
                    offset: 0,
                    width: 4,
                    base: NumBase::Hex,
                },
            ],
            delimiter: ".".to_string(),
            prefix: Some("v".to_string()),
        }),
    )]);

    let decoded = decode(&schema, &[0x2A]).unwrap();
    assert_eq!(
        decoded.as_object().unwrap()["version"],
        Value::String("v2.A".to_string())
    );
}

#[test]
fn half_precision_float_special_values() {
    let schema = Schema::new(vec![Field::new("x", FieldKind::Float { width: 2 })]);

    let one = decode(&schema, &[0x3C, 0x00]).unwrap();
    assert_eq!(one.as_object().unwrap()["x"], Value::Float(1.0));

    let infinity = decode(&schema, &[0x7C, 0x00]).unwrap();
    match infinity.as_object().unwrap()["x"] {
        Value::Float(f) => assert!(f.is_infinite() && f > 0.0),
        _ => panic!("expected float"),
    }

    let smallest_subnormal = decode(&schema, &[0x00, 0x01]).unwrap();
    match smallest_subnormal.as_object().unwrap()["x"] {
        Value::Float(f) => assert!(f > 0.0 && f < 1e-6),
        _ => panic!("expected float"),
    }
}

/// The canonical spec §8 "TLV composite" worked example: Milesight-style
/// little-endian stream with `tag_key = [channel_id, channel_type]`. The
/// dispatch key fully determines `channel_id`/`channel_type`, so neither
/// appears in the decoded result — only the per-case value fields do.
#[test]
fn tlv_composite_example_from_spec() {
    let tag_fields = vec![
        Field::new("channel_id", FieldKind::UInt { width: 1 }),
        Field::new("channel_type", FieldKind::UInt { width: 1 }),
    ];
    let tag_key = vec!["channel_id".to_string(), "channel_type".to_string()];
    let schema = Schema::new(vec![Field::new(
        "channels",
        FieldKind::Tlv(TlvSpec {
            tag: TagShape::Composite(crate::schema::field::TagComposite {
                fields: tag_fields,
                tag_key,
            }),
            length_size: 0,
            cases: vec![
                TlvCase {
                    key: vec![1, 117],
                    fields: vec![Field::new("battery", FieldKind::UInt { width: 1 })],
                },
                TlvCase {
                    key: vec![3, 103],
                    fields: vec![Field::new("temperature", FieldKind::Int { width: 2 })
                        .with_byte_order(ByteOrder::Little)
                        .with_modifiers(Modifiers::from_transform(vec![ModStage::mult(0.1)]))],
                },
                TlvCase {
                    key: vec![4, 104],
                    fields: vec![Field::new("humidity", FieldKind::UInt { width: 1 })
                        .with_modifiers(Modifiers::from_transform(vec![ModStage::mult(0.5)]))],
                },
            ],
            unknown: UnknownPolicy::Skip,
            merge: true,
        }),
    )]);

    let bytes = [0x01, 0x75, 0x64, 0x03, 0x67, 0x10, 0x01, 0x04, 0x68, 0x5A];
    let decoded = decode(&schema, &bytes).unwrap();
    let obj = decoded.as_object().unwrap();

    assert_eq!(obj.len(), 3);
    assert_eq!(obj["battery"], Value::Integer(100));
    match obj["temperature"] {
        Value::Float(f) => assert!((f - 27.2).abs() < 1e-9),
        _ => panic!("expected float"),
    }
    assert_eq!(obj["humidity"], Value::Float(45.0));
    assert!(!obj.contains_key("channel_id"));
    assert!(!obj.contains_key("channel_type"));

    let encoded = encode(&schema, &decoded).unwrap();
    assert_eq!(encoded, bytes);
}

#[test]
fn tlv_merge_promotes_duplicate_channel_type_to_arrays() {
    // Milesight-style stream: two humidity channels (type 0x67) carrying
    // different channel ids, merged by repeated key into parallel arrays.
    // `channel_id` is not part of `tag_key` here, so it is dispatch-only
    // and (like `channel_type`) does not appear in the decoded result.
    let schema = Schema::new(vec![Field::new(
        "channels",
        FieldKind::Tlv(TlvSpec {
            tag: TagShape::Composite(crate::schema::field::TagComposite {
                fields: vec![
                    Field::new("channel_id", FieldKind::UInt { width: 1 }),
                    Field::new("channel_type", FieldKind::UInt { width: 1 }),
                ],
                tag_key: vec!["channel_type".to_string()],
            }),
            length_size: 0,
            cases: vec![TlvCase {
                key: vec![0x67],
                fields: vec![Field::new("humidity", FieldKind::UInt { width: 1 })],
            }],
            unknown: UnknownPolicy::Skip,
            merge: true,
        }),
    )]);

    let bytes = [0x01, 0x67, 50, 0x02, 0x67, 55];
    let decoded = decode(&schema, &bytes).unwrap();
    let obj = decoded.as_object().unwrap();

    assert!(!obj.contains_key("channel_id"));
    assert!(!obj.contains_key("channel_type"));
    let humidity = obj["humidity"].as_array().unwrap().to_vec();
    assert_eq!(humidity, vec![Value::Integer(50), Value::Integer(55)]);
}

#[test]
fn byte_group_packs_and_unpacks_subfields() {
    let schema = Schema::new(vec![Field::new(
        "status",
        FieldKind::ByteGroup(ByteGroupSpec {
            width: 1,
            byte_order: None,
            subfields: vec![
                BitSubfield {
                    name: "relay_state".to_string(),
                    start: 0,
                    end: 0,
                },
                BitSubfield {
                    name: "error_code".to_string(),
                    start: 1,
                    end: 4,
                },
            ],
        }),
    )]);

    // relay_state=1, error_code=0b1010=10 -> byte = 0b0010101 = 0x15
    let decoded = decode(&schema, &[0x15]).unwrap();
    let obj = decoded.as_object().unwrap();
    assert_eq!(obj["relay_state"], Value::Integer(1));
    assert_eq!(obj["error_code"], Value::Integer(10));

    let encoded = encode(&schema, &decoded).unwrap();
    assert_eq!(encoded, vec![0x15]);
}

#[test]
fn computed_number_with_polynomial_and_guard_else() {
    let number_field = Field::new(
        "capacitance_pf",
        FieldKind::Number(ComputedNumber {
            mode: ComputeMode::Ref {
                reference: "raw".to_string(),
                polynomial: Some(vec![0.1, -4.0, 30.0]),
                transform: vec![],
            },
            guard: Some(Guard {
                when: vec![GuardWhen {
                    reference: "raw".to_string(),
                    checks: vec![GuardCheck::Eq(0.0)],
                }],
                else_value: -999.0,
            }),
        }),
    );
    let schema = Schema::new(vec![
        Field::new("raw", FieldKind::UInt { width: 2 }).with_var("raw"),
        number_field,
    ]);

    // raw = 100 -> 0.1*100^2 - 4*100 + 30 = 1000 - 400 + 30 = 630
    let normal = decode(&schema, &[0x00, 100]).unwrap();
    assert_eq!(
        normal.as_object().unwrap()["capacitance_pf"],
        Value::Float(630.0)
    );

    // raw = 0 triggers the guard's else branch.
    let zeroed = decode(&schema, &[0x00, 0x00]).unwrap();
    assert_eq!(
        zeroed.as_object().unwrap()["capacitance_pf"],
        Value::Float(-999.0)
    );
}

#[test]
fn legacy_formula_tolerates_unknown_variable_and_division_by_zero() {
    let schema = Schema::new(vec![
        Field::new("divisor", FieldKind::UInt { width: 1 }),
        Field::new("x", FieldKind::UInt { width: 1 })
            .with_legacy_formula("x / $divisor + $missing"),
    ]);

    let result = decode(&schema, &[0, 10]).unwrap();
    assert_eq!(result.as_object().unwrap()["x"], Value::Float(0.0));
}

#[test]
fn repeat_until_end_is_capped_at_the_default_safety_limit() {
    let schema = Schema::new(vec![Field::new(
        "samples",
        FieldKind::Repeat(RepeatSpec {
            fields: vec![Field::new("b", FieldKind::UInt { width: 1 })],
            termination: Termination::UntilEnd,
            min: None,
            max: crate::schema::field::DEFAULT_REPEAT_MAX,
        }),
    )]);

    let bytes = vec![0xAAu8; 10_000];
    let decoded = decode(&schema, &bytes).unwrap();
    let samples = decoded.as_object().unwrap()["samples"].as_array().unwrap();
    assert_eq!(samples.len(), crate::schema::field::DEFAULT_REPEAT_MAX);
}

#[test]
fn compact_format_decodes_a_mixed_token_stream() {
    let decoded = crate::compact_format::decode_compact("<H:reading B:flag", &[0xE8, 0x03, 0x01]).unwrap();
    let obj = decoded.as_object().unwrap();
    assert_eq!(obj["reading"], Value::Integer(1000));
    assert_eq!(obj["flag"], Value::Integer(1));
}

#[test]
fn binary_schema_round_trips_through_the_compact_wire_format() {
    use crate::binary_schema::{decode_binary_schema, encode_binary_schema};

    let schema = Schema::new(vec![
        Field::new("battery", FieldKind::UInt { width: 1 }),
        Field::new("temperature", FieldKind::Int { width: 2 })
            .with_modifiers(Modifiers::from_transform(vec![ModStage::mult(0.1)])),
    ])
    .with_byte_order(ByteOrder::Big);

    let encoded_schema = encode_binary_schema(&schema).unwrap();
    let recovered = decode_binary_schema(&encoded_schema).unwrap();

    let bytes = [0x64, 0x00, 0xFA];
    let original_decode = decode(&schema, &bytes).unwrap();
    let recovered_decode = decode(&recovered, &bytes).unwrap();
    assert_eq!(original_decode, recovered_decode);
}

#[test]
fn empty_object_round_trips_with_no_fields() {
    let schema = Schema::new(vec![]);
    let decoded = decode(&schema, &[]).unwrap();
    assert_eq!(decoded, Value::Object(IndexMap::new()));
    let encoded = encode(&schema, &decoded).unwrap();
    assert!(encoded.is_empty());
}

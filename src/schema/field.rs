//! The schema tree: a tagged variant over field kinds, each carrying only
//! the attributes relevant to it (spec §9 design note — not a class
//! hierarchy).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::cursor::ByteOrder;
use crate::value::Value;

/// A single step in a numeric modifier pipeline.
///
/// Authors may write the shorthand `add`/`mult`/`div` keys or the
/// unambiguous `transform` list (spec §3); a schema author-time collaborator
/// normalizes the shorthand form into this ordered list, since authoring
/// key-order is semantically load-bearing (spec §9 "Key-order capture") and
/// the in-memory tree this core consumes already carries that order
/// explicitly rather than as a hash-keyed map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModOp {
    Add,
    Sub,
    Mult,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModStage {
    pub op: ModOp,
    pub operand: f64,
}

impl ModStage {
    pub fn add(v: f64) -> Self {
        ModStage {
            op: ModOp::Add,
            operand: v,
        }
    }
    pub fn sub(v: f64) -> Self {
        ModStage {
            op: ModOp::Sub,
            operand: v,
        }
    }
    pub fn mult(v: f64) -> Self {
        ModStage {
            op: ModOp::Mult,
            operand: v,
        }
    }
    pub fn div(v: f64) -> Self {
        ModStage {
            op: ModOp::Div,
            operand: v,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Modifiers(pub Vec<ModStage>);

impl Modifiers {
    pub fn none() -> Self {
        Modifiers(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build a modifier pipeline from the shorthand `add`/`mult`/`div` keys,
    /// preserving the authoring order the caller supplies (spec §3, §9).
    /// `sub` is not a shorthand key (spec §3: "`sub` is `add` with a negated
    /// operand"); callers wanting subtraction in shorthand form negate the
    /// operand and use `add`.
    pub fn from_shorthand(stages: Vec<(ModOp, f64)>) -> Self {
        Modifiers(
            stages
                .into_iter()
                .map(|(op, operand)| ModStage { op, operand })
                .collect(),
        )
    }

    pub fn from_transform(stages: Vec<ModStage>) -> Self {
        Modifiers(stages)
    }
}

/// Integer → string substitution applied after the modifier phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Lookup {
    Map(IndexMap<i64, String>),
    Array(Vec<String>),
}

impl Lookup {
    pub fn forward(&self, key: i64) -> Option<&str> {
        match self {
            Lookup::Map(m) => m.get(&key).map(String::as_str),
            Lookup::Array(a) => usize::try_from(key)
                .ok()
                .and_then(|i| a.get(i))
                .map(String::as_str),
        }
    }

    /// Reverse lookup for encoding: first matching string wins.
    pub fn reverse(&self, label: &str) -> Option<i64> {
        match self {
            Lookup::Map(m) => m
                .iter()
                .find(|(_, v)| v.as_str() == label)
                .map(|(k, _)| *k),
            Lookup::Array(a) => a.iter().position(|v| v == label).map(|i| i as i64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawFormat {
    HexLower,
    HexUpper,
    Base64,
    DecimalArray,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBytesSpec {
    pub len: usize,
    pub format: RawFormat,
    pub separator: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumBase {
    Hex,
    Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitfieldStringPart {
    pub offset: u8,
    pub width: u8,
    pub base: NumBase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitfieldStringSpec {
    pub int_width: usize,
    pub byte_order: Option<ByteOrder>,
    pub parts: Vec<BitfieldStringPart>,
    pub delimiter: String,
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ByteGroupSpec {
    pub width: usize,
    pub byte_order: Option<ByteOrder>,
    pub subfields: Vec<BitSubfield>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitSubfield {
    pub name: String,
    /// Inclusive bit range, least-significant bit numbered 0.
    pub start: u8,
    pub end: u8,
}

impl BitSubfield {
    pub fn width(&self) -> u32 {
        u32::from(self.end - self.start + 1)
    }

    pub fn mask(&self) -> u64 {
        if self.width() >= 64 {
            u64::MAX
        } else {
            (1u64 << self.width()) - 1
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GuardCheck {
    Gt(f64),
    Gte(f64),
    Lt(f64),
    Lte(f64),
    Eq(f64),
}

impl GuardCheck {
    pub fn passes(&self, value: f64) -> bool {
        match *self {
            GuardCheck::Gt(x) => value > x,
            GuardCheck::Gte(x) => value >= x,
            GuardCheck::Lt(x) => value < x,
            GuardCheck::Lte(x) => value <= x,
            GuardCheck::Eq(x) => value == x,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardWhen {
    pub reference: String,
    pub checks: Vec<GuardCheck>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guard {
    pub when: Vec<GuardWhen>,
    pub else_value: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Var(String),
    Literal(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ComputeMode {
    /// `ref` (+ optional `polynomial`, + optional `transform`).
    Ref {
        reference: String,
        /// Horner-form coefficients, highest power first.
        polynomial: Option<Vec<f64>>,
        transform: Vec<ModStage>,
    },
    Compute {
        op: BinOp,
        a: Operand,
        b: Operand,
    },
    /// The frozen legacy infix sublanguage (spec §4.5, §9). Sealed: new
    /// schemas should use `Ref`/`Compute`/`Guard` instead.
    Formula(String),
    Value(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputedNumber {
    pub mode: ComputeMode,
    pub guard: Option<Guard>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selector {
    Var(String),
    Inline {
        len: usize,
        byte_order: Option<ByteOrder>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CaseMatch {
    Literal(Value),
    List(Vec<Value>),
    Range { min: i64, max: i64 },
    Default,
}

impl CaseMatch {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            CaseMatch::Literal(v) => v == value,
            CaseMatch::List(vs) => vs.contains(value),
            CaseMatch::Range { min, max } => value
                .to_i64()
                .map(|v| v >= *min && v <= *max)
                .unwrap_or(false),
            CaseMatch::Default => false,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, CaseMatch::Default)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCase {
    pub matcher: CaseMatch,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSpec {
    pub selector: Selector,
    pub cases: Vec<MatchCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CountSource {
    Literal(usize),
    Var(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Termination {
    Count(CountSource),
    ByteLength(CountSource),
    UntilEnd,
}

pub const DEFAULT_REPEAT_MAX: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatSpec {
    pub fields: Vec<Field>,
    pub termination: Termination,
    pub min: Option<usize>,
    #[serde(default = "default_repeat_max")]
    pub max: usize,
}

fn default_repeat_max() -> usize {
    DEFAULT_REPEAT_MAX
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagSimple {
    pub size: usize,
    pub byte_order: Option<ByteOrder>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagComposite {
    pub fields: Vec<Field>,
    pub tag_key: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TagShape {
    Simple(TagSimple),
    Composite(TagComposite),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownPolicy {
    Skip,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlvCase {
    /// The tag-key sequence to match: a single element for a simple integer
    /// tag, or one element per `tag_key` field for a composite tag.
    pub key: Vec<i64>,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlvSpec {
    pub tag: TagShape,
    /// 0 means no declared length sub-field.
    pub length_size: usize,
    pub cases: Vec<TlvCase>,
    pub unknown: UnknownPolicy,
    #[serde(default = "default_merge")]
    pub merge: bool,
}

fn default_merge() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagGroup {
    pub bit: u8,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlaggedGroupSpec {
    pub flag_var: String,
    pub groups: Vec<FlagGroup>,
}

/// Tagged variant over every field kind the interpreter can dispatch on.
/// Each variant carries only the attributes it needs (spec §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldKind {
    UInt { width: u8 },
    Int { width: u8 },
    /// `width` is 2 (half), 4 (single), or 8 (double) bytes.
    Float { width: u8 },
    BoolBit { bit: u8, consumes_byte: bool },
    BitSlice { offset: u8, width: u8 },
    Skip { len: usize },
    RawBytes(RawBytesSpec),
    Ascii { len: usize },
    HexIn { len: usize },
    BitfieldString(BitfieldStringSpec),
    NibbleDecimal { signed: bool },
    Number(ComputedNumber),
    Object { fields: Vec<Field> },
    Match(MatchSpec),
    Repeat(RepeatSpec),
    Tlv(TlvSpec),
    FlaggedGroup(FlaggedGroupSpec),
    ByteGroup(ByteGroupSpec),
}

/// Semantic metadata carried alongside a field. Only `valid_range` is
/// codec-observable (spec §4.3 step 7); the rest is surfaced unchanged for
/// external collaborators and enforced no further by this core (spec §1
/// Non-goals).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub unit: Option<String>,
    pub valid_range: Option<(f64, f64)>,
    pub resolution: Option<f64>,
    pub unece: Option<String>,
    pub ipso: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub kind: FieldKind,
    pub name: Option<String>,
    pub var: Option<String>,
    pub byte_order: Option<ByteOrder>,
    #[serde(default)]
    pub modifiers: Modifiers,
    /// A legacy infix formula (spec §4.5 mode 3) standing in for the whole
    /// modifier pipeline, with `x` bound to this field's raw read value.
    /// Mutually exclusive with `modifiers`; present only for backward
    /// compatibility with pre-`compute`/`guard` schemas (spec §9).
    pub legacy_formula: Option<String>,
    pub lookup: Option<Lookup>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Field {
    /// Minimal constructor for the common case: a leaf field with a name
    /// and no modifiers/lookup/metadata.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Field {
            kind,
            name: Some(name.into()),
            var: None,
            byte_order: None,
            modifiers: Modifiers::none(),
            legacy_formula: None,
            lookup: None,
            metadata: Metadata::default(),
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_lookup(mut self, lookup: Lookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_var(mut self, var: impl Into<String>) -> Self {
        self.var = Some(var.into());
        self
    }

    pub fn with_valid_range(mut self, lo: f64, hi: f64) -> Self {
        self.metadata.valid_range = Some((lo, hi));
        self
    }

    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = Some(order);
        self
    }

    pub fn with_legacy_formula(mut self, formula: impl Into<String>) -> Self {
        self.legacy_formula = Some(formula.into());
        self
    }
}

//! Error taxonomy surfaced at the public decode/encode boundary.
//!
//! Internal traversal code favors `anyhow::Result` the way a single pass
//! over a byte cursor naturally does (see [`crate::decode`]); [`CodecError`]
//! is the closed, matchable shape callers outside this crate see.

use thiserror::Error;

/// All ways a decode or encode traversal can fail.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A read or peek would advance the cursor past the end of the payload.
    #[error("buffer underflow: tried to read {requested} byte(s) at offset {offset}, only {available} available")]
    BufferUnderflow {
        offset: usize,
        requested: usize,
        available: usize,
    },

    /// A field or schema node named a kind the interpreter does not recognize.
    #[error("unknown field type `{0}`")]
    UnknownType(String),

    /// `$name` failed to resolve in a non-legacy evaluation path.
    #[error("missing variable `{0}`")]
    MissingVariable(String),

    /// A `match` selector matched no case and no default was declared.
    ///
    /// Not fatal: per spec, this yields an empty sub-map rather than
    /// aborting the traversal. Kept as a named variant so callers that want
    /// stricter behavior can detect it via [`crate::decode::Diagnostics`].
    #[error("match on `{0}` selected no case (value {1:?}) and no default exists")]
    MatchNoCase(String, String),

    /// A TLV record's tag had no matching case and the unknown policy is "error".
    #[error("unrecognized TLV tag {0:?}")]
    TlvUnknownTag(String),

    /// A `repeat` produced fewer elements than its `min` bound requires.
    #[error("repeat produced {got} element(s), fewer than the required minimum {min}")]
    RepeatMinUnmet { min: usize, got: usize },

    /// A `byte_length`-bounded repeat did not end exactly on its window boundary.
    #[error("repeat element decode ended at offset {ended_at}, expected exactly {expected}")]
    RepeatByteLengthMismatch { expected: usize, ended_at: usize },

    /// Division by zero in `compute: div` (hard error; the legacy formula
    /// sublanguage instead silently yields 0, per spec).
    #[error("division by zero in compute op for field `{0}`")]
    DivideByZero(String),

    /// A non-numeric operand was supplied where a numeric operation required one.
    #[error("invalid operand for `{op}`: {value:?}")]
    InvalidOperand { op: String, value: String },

    /// `decode_with_port`/`encode_with_port` was given a port with no entry
    /// and the schema has no `"default"` fallback.
    #[error("no port table entry for port {0} and no default fallback")]
    PortNotFound(u32),

    /// The compact binary schema format was truncated or carries an
    /// unsupported version byte.
    #[error("invalid binary schema: {0}")]
    BadBinarySchema(String),

    /// Catch-all for traversal failures that don't fit a more specific
    /// variant (schema authoring errors caught late, internal invariant
    /// violations surfaced by `anyhow` during traversal).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CodecError>;

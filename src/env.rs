//! The variable environment populated during a single decode or encode
//! traversal (spec §4.2).
//!
//! Last-write-wins, flat (flagged/match/TLV sub-fields write into the same
//! parent environment — there is no nested scope), and always starts empty
//! at the top of a traversal.

use indexmap::IndexMap;

use crate::error::CodecError;
use crate::value::Value;

#[derive(Debug, Default)]
pub struct Environment {
    vars: IndexMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Resolve a `$name` reference: the sigil is stripped before lookup.
    /// Absence is an error everywhere except the legacy formula sublanguage,
    /// which treats unknown `$var`s as zero (spec §3, §4.5).
    pub fn resolve(&self, reference: &str) -> Result<&Value, CodecError> {
        let key = strip_sigil(reference);
        self.vars
            .get(key)
            .ok_or_else(|| CodecError::MissingVariable(key.to_string()))
    }

    /// Same as [`Environment::resolve`] but returns `0.0` for unknown names,
    /// used only by the legacy infix evaluator (spec §4.5, §9 open question ii).
    pub fn resolve_legacy(&self, reference: &str) -> f64 {
        let key = strip_sigil(reference);
        self.vars.get(key).and_then(Value::to_f64).unwrap_or(0.0)
    }
}

pub fn strip_sigil(reference: &str) -> &str {
    reference.strip_prefix('$').unwrap_or(reference)
}

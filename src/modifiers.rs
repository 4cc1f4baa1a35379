//! Numeric modifier pipeline shared by the field interpreter's modifier
//! phase (spec §4.3 step 4), the `ref` field's transform list (spec §4.5
//! mode 1), and the encoder's inverse pass (spec §4.6 step 5).

use crate::error::CodecError;
use crate::schema::field::{ModOp, ModStage};

/// Apply modifier stages left to right, as authored (spec §3 "Ordering and
/// modifiers"). Division by zero short-circuits to the value unchanged
/// rather than erroring — this is the legacy modifier-pipeline behavior the
/// spec contrasts with `compute: div`'s hard error (spec §3, §7).
pub fn apply_stages(mut value: f64, stages: &[ModStage]) -> f64 {
    for stage in stages {
        value = match stage.op {
            ModOp::Add => value + stage.operand,
            ModOp::Sub => value - stage.operand,
            ModOp::Mult => value * stage.operand,
            ModOp::Div => {
                if stage.operand == 0.0 {
                    value
                } else {
                    value / stage.operand
                }
            }
        };
    }
    value
}

/// Invert a modifier pipeline for encoding (spec §4.6 step 5): walk stages
/// in reverse, inverting each op (`+a` ↔ `-a`, `·m` ↔ `/m`, `/d` ↔ `·d`).
pub fn invert_stages(mut value: f64, stages: &[ModStage], field: &str) -> Result<f64, CodecError> {
    for stage in stages.iter().rev() {
        value = match stage.op {
            ModOp::Add => value - stage.operand,
            ModOp::Sub => value + stage.operand,
            ModOp::Mult => {
                if stage.operand == 0.0 {
                    return Err(CodecError::DivideByZero(field.to_string()));
                }
                value / stage.operand
            }
            ModOp::Div => value * stage.operand,
        };
    }
    Ok(value)
}

/// Horner's method: coefficients supplied highest-power-first (spec §4.5
/// mode 1, GLOSSARY).
pub fn horner(coefficients: &[f64], x: f64) -> f64 {
    coefficients
        .iter()
        .fold(0.0, |acc, &coeff| acc * x + coeff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field::ModStage;

    #[test]
    fn key_order_is_load_bearing() {
        // {add: -400, div: 10} on 625 -> 22.5
        let forward = [ModStage::add(-400.0), ModStage::div(10.0)];
        assert_eq!(apply_stages(625.0, &forward), 22.5);

        // {div: 10, add: -400} on 625 -> -337.5
        let reversed = [ModStage::div(10.0), ModStage::add(-400.0)];
        assert_eq!(apply_stages(625.0, &reversed), -337.5);
    }

    #[test]
    fn transform_list_matches_shorthand() {
        let transform = [ModStage::sub(400.0), ModStage::div(10.0)];
        let shorthand = [ModStage::add(-400.0), ModStage::div(10.0)];
        assert_eq!(apply_stages(625.0, &transform), apply_stages(625.0, &shorthand));
    }

    #[test]
    fn horner_evaluates_in_decreasing_power_order() {
        // [0.1, -4, 30] at x=100 -> 630
        assert_eq!(horner(&[0.1, -4.0, 30.0], 100.0), 630.0);
    }

    #[test]
    fn div_by_zero_short_circuits() {
        let stages = [ModStage::div(0.0)];
        assert_eq!(apply_stages(42.0, &stages), 42.0);
    }

    #[test]
    fn invert_round_trips() {
        let stages = [ModStage::add(-400.0), ModStage::div(10.0)];
        let encoded = apply_stages(625.0, &stages);
        let decoded = invert_stages(encoded, &stages, "f").unwrap();
        assert_eq!(decoded, 625.0);
    }
}

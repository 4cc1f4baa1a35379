//! Computed-value engine (spec §4.5): applies only to the `number` field
//! kind, which reads no bytes. Evaluation modes in precedence order are
//! represented directly by [`ComputeMode`]'s variants; `guard` wraps the
//! result of whichever mode is selected.

use crate::env::{strip_sigil, Environment};
use crate::error::CodecError;
use crate::formula;
use crate::modifiers::{apply_stages, horner};
use crate::schema::field::{BinOp, ComputeMode, ComputedNumber, Guard, Operand};

fn resolve_operand(operand: &Operand, env: &Environment, op_name: &str) -> Result<f64, CodecError> {
    match operand {
        Operand::Literal(v) => Ok(*v),
        Operand::Var(name) => env.resolve(name)?.numeric_or(op_name),
    }
}

fn eval_mode(mode: &ComputeMode, env: &Environment, field_name: &str) -> Result<f64, CodecError> {
    match mode {
        ComputeMode::Ref {
            reference,
            polynomial,
            transform,
        } => {
            let mut value = env.resolve(reference)?.numeric_or("ref")?;
            if let Some(coeffs) = polynomial {
                value = horner(coeffs, value);
            }
            Ok(apply_stages(value, transform))
        }
        ComputeMode::Compute { op, a, b } => {
            let a = resolve_operand(a, env, "compute")?;
            let b = resolve_operand(b, env, "compute")?;
            match op {
                BinOp::Add => Ok(a + b),
                BinOp::Sub => Ok(a - b),
                BinOp::Mul => Ok(a * b),
                BinOp::Div => {
                    if b == 0.0 {
                        Err(CodecError::DivideByZero(field_name.to_string()))
                    } else {
                        Ok(a / b)
                    }
                }
            }
        }
        ComputeMode::Formula(expr) => formula::evaluate(expr, 0.0, env).map_err(Into::into),
        ComputeMode::Value(v) => Ok(*v),
    }
}

/// A guard's `when` conditions all pass only if every referenced variable
/// resolves and is numeric and every check on it passes (spec §4.5 "Guard").
/// A missing or non-numeric reference counts as a failing condition rather
/// than a hard error, per spec.
fn guard_passes(guard: &Guard, env: &Environment) -> bool {
    guard.when.iter().all(|when| {
        env.get(strip_sigil(&when.reference))
            .and_then(|v| v.to_f64())
            .map(|value| when.checks.iter().all(|check| check.passes(value)))
            .unwrap_or(false)
    })
}

/// Evaluate a `number` field's computed value end to end: mode, then guard.
pub fn evaluate(num: &ComputedNumber, env: &Environment, field_name: &str) -> Result<f64, CodecError> {
    let value = eval_mode(&num.mode, env, field_name)?;
    match &num.guard {
        Some(guard) if !guard_passes(guard, env) => Ok(guard.else_value),
        _ => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field::{GuardCheck, GuardWhen, ModStage};
    use crate::value::Value;

    #[test]
    fn ref_polynomial_and_guard() {
        let mut env = Environment::new();
        env.set("raw", Value::Integer(650));
        let num = ComputedNumber {
            mode: ComputeMode::Ref {
                reference: "$raw".to_string(),
                polynomial: None,
                transform: vec![ModStage::sub(400.0), ModStage::div(10.0)],
            },
            guard: Some(Guard {
                when: vec![GuardWhen {
                    reference: "$raw".to_string(),
                    checks: vec![GuardCheck::Gt(0.0), GuardCheck::Lt(2000.0)],
                }],
                else_value: -999.0,
            }),
        };
        assert_eq!(evaluate(&num, &env, "temp").unwrap(), 25.0);

        env.set("raw", Value::Integer(0));
        assert_eq!(evaluate(&num, &env, "temp").unwrap(), -999.0);
    }

    #[test]
    fn compute_div_by_zero_is_hard_error() {
        let env = Environment::new();
        let num = ComputedNumber {
            mode: ComputeMode::Compute {
                op: BinOp::Div,
                a: Operand::Literal(1.0),
                b: Operand::Literal(0.0),
            },
            guard: None,
        };
        assert!(matches!(
            evaluate(&num, &env, "x").unwrap_err(),
            CodecError::DivideByZero(_)
        ));
    }

    #[test]
    fn guard_else_on_missing_reference() {
        let env = Environment::new();
        let num = ComputedNumber {
            mode: ComputeMode::Value(42.0),
            guard: Some(Guard {
                when: vec![GuardWhen {
                    reference: "$absent".to_string(),
                    checks: vec![GuardCheck::Gte(0.0)],
                }],
                else_value: -1.0,
            }),
        };
        assert_eq!(evaluate(&num, &env, "x").unwrap(), -1.0);
    }
}

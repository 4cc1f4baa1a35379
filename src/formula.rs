//! The legacy infix expression sublanguage (spec §4.5 mode 3, §9).
//!
//! Frozen: kept only for backward compatibility with schemas already in the
//! catalog. New schemas add constructs to `ref`/`compute`/`guard`/
//! `polynomial` instead (spec §9 "Legacy formula sublanguage"). Nothing in
//! this module should grow new operators or functions.
//!
//! Grammar (lowest to highest precedence):
//! `ternary := or ('?' ternary ':' ternary)?`
//! `or := and (("||"|"or") and)*`
//! `and := equality (("&&"|"and") equality)*`
//! `equality := comparison (("=="|"!=") comparison)*`
//! `comparison := additive (("<"|"<="|">"|">=") additive)*`
//! `additive := multiplicative (("+"|"-") multiplicative)*`
//! `multiplicative := unary (("*"|"/") unary)*`
//! `unary := '-' unary | primary`
//! `primary := number | '$' ident | 'x' | ident '(' args ')' | '(' ternary ')'`

use crate::env::Environment;
use crate::error::CodecError;

#[derive(Debug, Clone)]
enum Expr {
    Number(f64),
    Var(String),
    CurrentValue,
    Neg(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    _src: &'a str,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Parser {
            chars: src.chars().collect(),
            pos: 0,
            _src: src,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, s: &str) -> bool {
        self.skip_ws();
        let s_chars: Vec<char> = s.chars().collect();
        if self.chars[self.pos..].starts_with(&s_chars[..]) {
            // avoid `and`/`or` matching inside a longer identifier
            let next_is_ident = self
                .chars
                .get(self.pos + s_chars.len())
                .is_some_and(|c| c.is_alphanumeric() || *c == '_');
            if s.chars().next().is_some_and(|c| c.is_alphabetic()) && next_is_ident {
                return false;
            }
            self.pos += s_chars.len();
            true
        } else {
            false
        }
    }

    fn parse_expr(&mut self) -> anyhow::Result<Expr> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> anyhow::Result<Expr> {
        let cond = self.parse_or()?;
        self.skip_ws();
        if self.eat("?") {
            let then_branch = self.parse_ternary()?;
            self.skip_ws();
            anyhow::ensure!(self.eat(":"), "expected ':' in ternary expression");
            let else_branch = self.parse_ternary()?;
            Ok(Expr::Ternary(
                Box::new(cond),
                Box::new(then_branch),
                Box::new(else_branch),
            ))
        } else {
            Ok(cond)
        }
    }

    fn parse_or(&mut self) -> anyhow::Result<Expr> {
        let mut lhs = self.parse_and()?;
        loop {
            self.skip_ws();
            if self.eat("||") || self.eat("or") {
                let rhs = self.parse_and()?;
                lhs = Expr::Bin(BinOp::Or, Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> anyhow::Result<Expr> {
        let mut lhs = self.parse_equality()?;
        loop {
            self.skip_ws();
            if self.eat("&&") || self.eat("and") {
                let rhs = self.parse_equality()?;
                lhs = Expr::Bin(BinOp::And, Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> anyhow::Result<Expr> {
        let mut lhs = self.parse_comparison()?;
        loop {
            self.skip_ws();
            if self.eat("==") {
                lhs = Expr::Bin(BinOp::Eq, Box::new(lhs), Box::new(self.parse_comparison()?));
            } else if self.eat("!=") {
                lhs = Expr::Bin(BinOp::Ne, Box::new(lhs), Box::new(self.parse_comparison()?));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> anyhow::Result<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            self.skip_ws();
            // order matters: check two-char ops before their one-char prefix
            if self.eat("<=") {
                lhs = Expr::Bin(BinOp::Le, Box::new(lhs), Box::new(self.parse_additive()?));
            } else if self.eat(">=") {
                lhs = Expr::Bin(BinOp::Ge, Box::new(lhs), Box::new(self.parse_additive()?));
            } else if self.eat("<") {
                lhs = Expr::Bin(BinOp::Lt, Box::new(lhs), Box::new(self.parse_additive()?));
            } else if self.eat(">") {
                lhs = Expr::Bin(BinOp::Gt, Box::new(lhs), Box::new(self.parse_additive()?));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> anyhow::Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            self.skip_ws();
            if self.eat("+") {
                lhs = Expr::Bin(
                    BinOp::Add,
                    Box::new(lhs),
                    Box::new(self.parse_multiplicative()?),
                );
            } else if self.eat("-") {
                lhs = Expr::Bin(
                    BinOp::Sub,
                    Box::new(lhs),
                    Box::new(self.parse_multiplicative()?),
                );
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> anyhow::Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            self.skip_ws();
            if self.eat("*") {
                lhs = Expr::Bin(BinOp::Mul, Box::new(lhs), Box::new(self.parse_unary()?));
            } else if self.eat("/") {
                lhs = Expr::Bin(BinOp::Div, Box::new(lhs), Box::new(self.parse_unary()?));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> anyhow::Result<Expr> {
        self.skip_ws();
        if self.eat("-") {
            Ok(Expr::Neg(Box::new(self.parse_unary()?)))
        } else {
            self.parse_primary()
        }
    }

    fn parse_primary(&mut self) -> anyhow::Result<Expr> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let inner = self.parse_ternary()?;
                self.skip_ws();
                anyhow::ensure!(self.eat(")"), "unbalanced parentheses in formula");
                Ok(inner)
            }
            Some('$') => {
                self.pos += 1;
                let name = self.parse_ident()?;
                Ok(Expr::Var(name))
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.parse_number(),
            Some(c) if c.is_alphabetic() || c == '_' => {
                let ident = self.parse_ident()?;
                self.skip_ws();
                if ident == "x" && self.peek() != Some('(') {
                    return Ok(Expr::CurrentValue);
                }
                anyhow::ensure!(self.eat("("), "expected '(' after function name `{ident}`");
                let mut args = Vec::new();
                self.skip_ws();
                if self.peek() != Some(')') {
                    loop {
                        args.push(self.parse_ternary()?);
                        self.skip_ws();
                        if self.eat(",") {
                            continue;
                        }
                        break;
                    }
                }
                self.skip_ws();
                anyhow::ensure!(self.eat(")"), "unbalanced parentheses in call to `{ident}`");
                Ok(Expr::Call(ident, args))
            }
            other => anyhow::bail!("unexpected character in formula: {other:?}"),
        }
    }

    fn parse_ident(&mut self) -> anyhow::Result<String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        anyhow::ensure!(self.pos > start, "expected identifier in formula");
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_number(&mut self) -> anyhow::Result<Expr> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        Ok(Expr::Number(text.parse()?))
    }
}

fn truthy(v: f64) -> bool {
    v != 0.0
}

fn eval_expr(expr: &Expr, x: f64, env: &Environment) -> f64 {
    match expr {
        Expr::Number(n) => *n,
        Expr::CurrentValue => x,
        // Unknown `$var` evaluates to 0 in the legacy sublanguage (spec §3, §9).
        Expr::Var(name) => env.resolve_legacy(name),
        Expr::Neg(inner) => -eval_expr(inner, x, env),
        Expr::Ternary(cond, then_branch, else_branch) => {
            if truthy(eval_expr(cond, x, env)) {
                eval_expr(then_branch, x, env)
            } else {
                eval_expr(else_branch, x, env)
            }
        }
        Expr::Call(name, args) => {
            let a: Vec<f64> = args.iter().map(|a| eval_expr(a, x, env)).collect();
            match (name.as_str(), a.as_slice()) {
                ("abs", [v]) => v.abs(),
                ("sqrt", [v]) => v.sqrt(),
                ("pow", [base, exp]) => base.powf(*exp),
                ("min", [a, b]) => a.min(*b),
                ("max", [a, b]) => a.max(*b),
                _ => 0.0,
            }
        }
        Expr::Bin(op, l, r) => {
            let lv = eval_expr(l, x, env);
            // short-circuit logical operators
            match op {
                BinOp::And => return if truthy(lv) { truthy(eval_expr(r, x, env)) as i32 as f64 } else { 0.0 },
                BinOp::Or => return if truthy(lv) { 1.0 } else { truthy(eval_expr(r, x, env)) as i32 as f64 },
                _ => {}
            }
            let rv = eval_expr(r, x, env);
            match op {
                BinOp::Add => lv + rv,
                BinOp::Sub => lv - rv,
                BinOp::Mul => lv * rv,
                // Division by zero evaluates to 0 (spec §4.5, §9 open question ii).
                BinOp::Div => {
                    if rv == 0.0 {
                        0.0
                    } else {
                        lv / rv
                    }
                }
                BinOp::Lt => (lv < rv) as i32 as f64,
                BinOp::Le => (lv <= rv) as i32 as f64,
                BinOp::Gt => (lv > rv) as i32 as f64,
                BinOp::Ge => (lv >= rv) as i32 as f64,
                BinOp::Eq => (lv == rv) as i32 as f64,
                BinOp::Ne => (lv != rv) as i32 as f64,
                BinOp::And | BinOp::Or => unreachable!("handled above"),
            }
        }
    }
}

/// Parse and evaluate `formula` against the current field's raw value `x`
/// and the variable environment. Parse errors surface as `CodecError::Other`
/// (malformed formulas are a schema-authoring bug, not a runtime condition
/// this taxonomy names a dedicated variant for).
pub fn evaluate(formula: &str, x: f64, env: &Environment) -> Result<f64, CodecError> {
    let mut parser = Parser::new(formula);
    let expr = parser.parse_expr().map_err(CodecError::Other)?;
    parser.skip_ws();
    if parser.pos != parser.chars.len() {
        return Err(CodecError::Other(anyhow::anyhow!(
            "trailing characters in formula at position {}",
            parser.pos
        )));
    }
    Ok(eval_expr(&expr, x, env))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_and_precedence() {
        let env = Environment::new();
        assert_eq!(evaluate("2 + 3 * 4", 0.0, &env).unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4", 0.0, &env).unwrap(), 20.0);
    }

    #[test]
    fn current_value_and_vars() {
        let mut env = Environment::new();
        env.set("scale", 2.0.into());
        assert_eq!(evaluate("x * $scale", 21.0, &env).unwrap(), 42.0);
    }

    #[test]
    fn unknown_var_and_div_zero_are_zero() {
        let env = Environment::new();
        assert_eq!(evaluate("$nope + 1", 0.0, &env).unwrap(), 1.0);
        assert_eq!(evaluate("5 / 0", 0.0, &env).unwrap(), 0.0);
    }

    #[test]
    fn ternary_and_logic() {
        let env = Environment::new();
        assert_eq!(evaluate("x > 0 && x < 2000 ? x : -999", 650.0, &env).unwrap(), 650.0);
        assert_eq!(evaluate("x > 0 and x < 2000 ? x : -999", 3000.0, &env).unwrap(), -999.0);
    }

    #[test]
    fn functions() {
        let env = Environment::new();
        assert_eq!(evaluate("abs(-5)", 0.0, &env).unwrap(), 5.0);
        assert_eq!(evaluate("max(3, 7)", 0.0, &env).unwrap(), 7.0);
        assert_eq!(evaluate("pow(2, 10)", 0.0, &env).unwrap(), 1024.0);
    }
}

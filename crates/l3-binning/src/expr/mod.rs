//! Band-maths expressions for validity masks and derived variables.
//!
//! Expressions are parsed once with the `pest` grammar in `grammar.pest`
//! into an [`Expr`] over variable *names*, then bound to variable *indices*
//! of a [`VariableContext`](crate::variable::VariableContext) before the
//! scan. Evaluation is in `f64`; comparisons and logical operators yield
//! `1.0` / `0.0`, and any NaN operand of a comparison yields false.

use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;

use crate::error::{BinningError, Result};

#[derive(Parser)]
#[grammar = "expr/grammar.pest"]
struct ExprParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

/// Built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    Sqrt,
    Exp,
    Log,
    Min,
    Max,
    /// `nan(x)` is true when `x` is NaN.
    IsNan,
}

impl Function {
    fn lookup(name: &str) -> Option<(Self, usize)> {
        let f = match name.to_ascii_lowercase().as_str() {
            "abs" => (Self::Abs, 1),
            "sqrt" => (Self::Sqrt, 1),
            "exp" => (Self::Exp, 1),
            "log" => (Self::Log, 1),
            "min" => (Self::Min, 2),
            "max" => (Self::Max, 2),
            "nan" => (Self::IsNan, 1),
            _ => return None,
        };
        Some(f)
    }
}

/// Expression tree, generic over how variables are referenced.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr<V> {
    Number(f64),
    Var(V),
    Unary(UnaryOp, Box<Expr<V>>),
    Binary(BinaryOp, Box<Expr<V>>, Box<Expr<V>>),
    Call(Function, Vec<Expr<V>>),
}

/// Expression as parsed, variables by name.
pub type ParsedExpr = Expr<String>;

/// Expression bound to variable indices, ready to evaluate.
pub type CompiledExpr = Expr<usize>;

#[inline]
fn truthy(v: f64) -> bool {
    v != 0.0 && !v.is_nan()
}

#[inline]
fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

fn pratt() -> PrattParser<Rule> {
    PrattParser::new()
        .op(Op::infix(Rule::or, Assoc::Left))
        .op(Op::infix(Rule::and, Assoc::Left))
        .op(Op::infix(Rule::eq, Assoc::Left) | Op::infix(Rule::ne, Assoc::Left))
        .op(Op::infix(Rule::lt, Assoc::Left)
            | Op::infix(Rule::le, Assoc::Left)
            | Op::infix(Rule::gt, Assoc::Left)
            | Op::infix(Rule::ge, Assoc::Left))
        .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
        .op(Op::infix(Rule::mul, Assoc::Left) | Op::infix(Rule::div, Assoc::Left))
        .op(Op::prefix(Rule::neg) | Op::prefix(Rule::not))
}

fn build_expr(pairs: Pairs<Rule>, pratt: &PrattParser<Rule>) -> std::result::Result<ParsedExpr, String> {
    pratt
        .map_primary(|p| build_primary(p, pratt))
        .map_prefix(|op, rhs| {
            let op = match op.as_rule() {
                Rule::neg => UnaryOp::Neg,
                _ => UnaryOp::Not,
            };
            Ok(Expr::Unary(op, Box::new(rhs?)))
        })
        .map_infix(|lhs, op, rhs| {
            let op = match op.as_rule() {
                Rule::or => BinaryOp::Or,
                Rule::and => BinaryOp::And,
                Rule::eq => BinaryOp::Eq,
                Rule::ne => BinaryOp::Ne,
                Rule::lt => BinaryOp::Lt,
                Rule::le => BinaryOp::Le,
                Rule::gt => BinaryOp::Gt,
                Rule::ge => BinaryOp::Ge,
                Rule::add => BinaryOp::Add,
                Rule::sub => BinaryOp::Sub,
                Rule::mul => BinaryOp::Mul,
                Rule::div => BinaryOp::Div,
                other => return Err(format!("unexpected operator {:?}", other)),
            };
            Ok(Expr::Binary(op, Box::new(lhs?), Box::new(rhs?)))
        })
        .parse(pairs)
}

fn build_primary(pair: Pair<Rule>, pratt: &PrattParser<Rule>) -> std::result::Result<ParsedExpr, String> {
    match pair.as_rule() {
        Rule::number => pair
            .as_str()
            .parse::<f64>()
            .map(Expr::Number)
            .map_err(|e| format!("bad number '{}': {}", pair.as_str(), e)),
        Rule::boolean => Ok(Expr::Number(flag(pair.as_str().eq_ignore_ascii_case("true")))),
        Rule::ident => Ok(Expr::Var(pair.as_str().to_string())),
        Rule::expr => build_expr(pair.into_inner(), pratt),
        Rule::call => {
            let mut inner = pair.into_inner();
            let name = inner
                .next()
                .map(|p| p.as_str().to_string())
                .unwrap_or_default();
            let (function, arity) =
                Function::lookup(&name).ok_or_else(|| format!("unknown function '{}'", name))?;
            let args = inner
                .map(|p| build_expr(p.into_inner(), pratt))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            if args.len() != arity {
                return Err(format!(
                    "function '{}' takes {} argument(s), got {}",
                    name,
                    arity,
                    args.len()
                ));
            }
            Ok(Expr::Call(function, args))
        }
        other => Err(format!("unexpected token {:?}", other)),
    }
}

impl ParsedExpr {
    /// Parse an expression string.
    pub fn parse(src: &str) -> Result<Self> {
        let mut pairs = ExprParser::parse(Rule::expression, src)
            .map_err(|e| BinningError::expression(src, e.to_string()))?;
        let expr = pairs
            .next()
            .and_then(|p| p.into_inner().next())
            .ok_or_else(|| BinningError::expression(src, "empty expression"))?;
        build_expr(expr.into_inner(), &pratt()).map_err(|msg| BinningError::expression(src, msg))
    }

    /// Distinct variable names in order of first appearance.
    pub fn variable_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.visit_vars(&mut |name: &String| {
            if !names.contains(name) {
                names.push(name.clone());
            }
        });
        names
    }

    /// Bind every variable name to an index.
    pub fn bind<F>(&self, lookup: &F) -> std::result::Result<CompiledExpr, String>
    where
        F: Fn(&str) -> Option<usize>,
    {
        Ok(match self {
            Expr::Number(v) => Expr::Number(*v),
            Expr::Var(name) => {
                Expr::Var(lookup(name).ok_or_else(|| format!("unknown variable '{}'", name))?)
            }
            Expr::Unary(op, e) => Expr::Unary(*op, Box::new(e.bind(lookup)?)),
            Expr::Binary(op, l, r) => {
                Expr::Binary(*op, Box::new(l.bind(lookup)?), Box::new(r.bind(lookup)?))
            }
            Expr::Call(f, args) => Expr::Call(
                *f,
                args.iter()
                    .map(|a| a.bind(lookup))
                    .collect::<std::result::Result<Vec<_>, _>>()?,
            ),
        })
    }
}

impl<V> Expr<V> {
    fn visit_vars<F: FnMut(&V)>(&self, f: &mut F) {
        match self {
            Expr::Number(_) => {}
            Expr::Var(v) => f(v),
            Expr::Unary(_, e) => e.visit_vars(f),
            Expr::Binary(_, l, r) => {
                l.visit_vars(f);
                r.visit_vars(f);
            }
            Expr::Call(_, args) => args.iter().for_each(|a| a.visit_vars(f)),
        }
    }
}

impl CompiledExpr {
    /// Evaluate against one pixel's variable values.
    pub fn eval(&self, values: &[f32]) -> f64 {
        match self {
            Expr::Number(v) => *v,
            Expr::Var(i) => values.get(*i).map(|v| *v as f64).unwrap_or(f64::NAN),
            Expr::Unary(UnaryOp::Neg, e) => -e.eval(values),
            Expr::Unary(UnaryOp::Not, e) => flag(!truthy(e.eval(values))),
            Expr::Binary(op, l, r) => {
                let a = l.eval(values);
                // Short-circuit the logical operators.
                match op {
                    BinaryOp::And if !truthy(a) => return 0.0,
                    BinaryOp::Or if truthy(a) => return 1.0,
                    _ => {}
                }
                let b = r.eval(values);
                match op {
                    BinaryOp::Or | BinaryOp::And => flag(truthy(b)),
                    BinaryOp::Eq => flag(a == b),
                    BinaryOp::Ne => flag(!a.is_nan() && !b.is_nan() && a != b),
                    BinaryOp::Lt => flag(a < b),
                    BinaryOp::Le => flag(a <= b),
                    BinaryOp::Gt => flag(a > b),
                    BinaryOp::Ge => flag(a >= b),
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                }
            }
            Expr::Call(f, args) => {
                let x = args.first().map(|a| a.eval(values)).unwrap_or(f64::NAN);
                match f {
                    Function::Abs => x.abs(),
                    Function::Sqrt => x.sqrt(),
                    Function::Exp => x.exp(),
                    Function::Log => x.ln(),
                    Function::IsNan => flag(x.is_nan()),
                    Function::Min | Function::Max => {
                        let y = args.get(1).map(|a| a.eval(values)).unwrap_or(f64::NAN);
                        if *f == Function::Min {
                            x.min(y)
                        } else {
                            x.max(y)
                        }
                    }
                }
            }
        }
    }

    /// Evaluate as a validity flag: non-zero and not NaN.
    pub fn eval_bool(&self, values: &[f32]) -> bool {
        truthy(self.eval(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(src: &str, names: &[&str]) -> CompiledExpr {
        ParsedExpr::parse(src)
            .unwrap()
            .bind(&|n: &str| names.iter().position(|x| *x == n))
            .unwrap()
    }

    #[test]
    fn test_precedence() {
        let e = compile("1 + 2 * 3 - -4", &[]);
        assert_eq!(e.eval(&[]), 11.0);
        let e = compile("(1 + 2) * 3", &[]);
        assert_eq!(e.eval(&[]), 9.0);
    }

    #[test]
    fn test_comparisons_and_logic() {
        let e = compile("chl > 0.0 && chl < 10 || flag == 1", &["chl", "flag"]);
        assert!(e.eval_bool(&[5.0, 0.0]));
        assert!(!e.eval_bool(&[20.0, 0.0]));
        assert!(e.eval_bool(&[20.0, 1.0]));
    }

    #[test]
    fn test_keyword_operators() {
        let e = compile("not (a > 1 and b > 1) or nan(a)", &["a", "b"]);
        assert!(e.eval_bool(&[0.0, 5.0]));
        assert!(!e.eval_bool(&[2.0, 2.0]));
        assert!(e.eval_bool(&[f32::NAN, 2.0]));
    }

    #[test]
    fn test_identifiers_starting_with_keywords() {
        let e = compile("notable + orange + android", &["notable", "orange", "android"]);
        assert_eq!(e.eval(&[1.0, 2.0, 3.0]), 6.0);
    }

    #[test]
    fn test_functions() {
        let e = compile("max(abs(a), sqrt(16)) + min(1, 2e0)", &["a"]);
        assert_eq!(e.eval(&[-7.0]), 8.0);
        assert_eq!(e.eval(&[1.0]), 5.0);
    }

    #[test]
    fn test_nan_comparisons_are_false() {
        let e = compile("a >= 0", &["a"]);
        assert!(!e.eval_bool(&[f32::NAN]));
        let e = compile("a != 0", &["a"]);
        assert!(!e.eval_bool(&[f32::NAN]));
    }

    #[test]
    fn test_variable_names() {
        let e = ParsedExpr::parse("b1 > 0 && b2 > b1 && true").unwrap();
        assert_eq!(e.variable_names(), vec!["b1".to_string(), "b2".to_string()]);
    }

    #[test]
    fn test_errors() {
        assert!(ParsedExpr::parse("1 +").is_err());
        assert!(ParsedExpr::parse("foo(1)").is_err());
        assert!(ParsedExpr::parse("min(1)").is_err());
        let unbound = ParsedExpr::parse("x + 1").unwrap().bind(&|_: &str| None);
        assert!(unbound.is_err());
    }
}

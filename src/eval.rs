//! The expression interpreter.
//!
//! Evaluation is two-pass: the caller pre-resolves every component reference
//! an expression mentions (collected with
//! [`crate::syntax::visitor::ComponentRefCollector`]) into an
//! [`Environment`], then [`evaluate`] folds the tree into a [`Value`].
//! References are only required to be bound when they are actually reached,
//! so unused branches of an if-expression may mention unknown names.

use crate::errors::{Error, Result};
use crate::syntax::ast::{
    BinaryOp, ComponentReference, Expression, FunctionArgument, Subscript, UnaryOp,
};
use serde::Serialize;
use std::collections::HashMap;

/// An evaluated expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(String),
    /// A literal of an enumeration type.
    Enumeration {
        type_name: String,
        name: String,
        ordinal: i64,
    },
    Array(Vec<Value>),
}

impl Value {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// The `i`-th of `n` slices along the first axis.
    pub fn split(&self, n: usize, i: usize) -> Value {
        match self {
            Value::Array(elements) if elements.len() == n => elements[i].clone(),
            _ => self.clone(),
        }
    }
}

/// Bindings from component references to values for one evaluation.
#[derive(Debug, Default, Clone)]
pub struct Environment {
    scope_name: String,
    bindings: HashMap<ComponentReference, Value>,
}

impl Environment {
    pub fn new(scope_name: impl Into<String>) -> Self {
        Environment {
            scope_name: scope_name.into(),
            bindings: HashMap::new(),
        }
    }

    pub fn bind(&mut self, cref: ComponentReference, value: Value) {
        self.bindings.insert(cref, value);
    }

    pub fn lookup(&self, cref: &ComponentReference) -> Option<&Value> {
        self.bindings.get(cref)
    }

    fn missing(&self, cref: &ComponentReference) -> Error {
        Error::NameNotFound {
            name: cref.as_dotted(),
            scope: self.scope_name.clone(),
        }
    }
}

fn type_error(name: &str, expected: &'static str, found: &Value) -> Error {
    Error::TypeMismatch {
        name: name.to_string(),
        expected,
        found: format!("{:?}", found),
    }
}

//-----------------------------------------------------------------------------
// numeric helpers
//-----------------------------------------------------------------------------

fn numeric_binary(
    op: &BinaryOp,
    lhs: Value,
    rhs: Value,
    f_int: fn(i64, i64) -> Option<Value>,
    f_real: fn(f64, f64) -> Value,
) -> Result<Value> {
    match (&lhs, &rhs) {
        (Value::Integer(a), Value::Integer(b)) => {
            if let Some(value) = f_int(*a, *b) {
                return Ok(value);
            }
            Ok(f_real(*a as f64, *b as f64))
        }
        (Value::Array(a), Value::Array(b)) => {
            if a.len() != b.len() {
                return Err(type_error(&op.to_string(), "arrays of equal length", &rhs));
            }
            let elements = a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| numeric_binary(op, x.clone(), y.clone(), f_int, f_real))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(elements))
        }
        (Value::Array(a), _) => {
            let elements = a
                .iter()
                .map(|x| numeric_binary(op, x.clone(), rhs.clone(), f_int, f_real))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(elements))
        }
        (_, Value::Array(b)) => {
            let elements = b
                .iter()
                .map(|y| numeric_binary(op, lhs.clone(), y.clone(), f_int, f_real))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(elements))
        }
        _ => {
            let (Some(a), Some(b)) = (lhs.as_real(), rhs.as_real()) else {
                return Err(type_error(&op.to_string(), "numeric operands", &lhs));
            };
            Ok(f_real(a, b))
        }
    }
}

fn compare(op: &BinaryOp, lhs: &Value, rhs: &Value) -> Result<bool> {
    let result = match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => match op {
            BinaryOp::Eq => a == b,
            BinaryOp::Ne => a != b,
            BinaryOp::Lt => a < b,
            BinaryOp::Le => a <= b,
            BinaryOp::Gt => a > b,
            BinaryOp::Ge => a >= b,
            _ => unreachable!(),
        },
        (Value::Boolean(a), Value::Boolean(b)) => match op {
            BinaryOp::Eq => a == b,
            BinaryOp::Ne => a != b,
            _ => return Err(type_error(&op.to_string(), "comparable operands", lhs)),
        },
        (
            Value::Enumeration { ordinal: a, .. },
            Value::Enumeration { ordinal: b, .. },
        ) => match op {
            BinaryOp::Eq => a == b,
            BinaryOp::Ne => a != b,
            BinaryOp::Lt => a < b,
            BinaryOp::Le => a <= b,
            BinaryOp::Gt => a > b,
            BinaryOp::Ge => a >= b,
            _ => unreachable!(),
        },
        _ => {
            let (Some(a), Some(b)) = (lhs.as_real(), rhs.as_real()) else {
                return Err(type_error(&op.to_string(), "comparable operands", lhs));
            };
            match op {
                BinaryOp::Eq => a == b,
                BinaryOp::Ne => a != b,
                BinaryOp::Lt => a < b,
                BinaryOp::Le => a <= b,
                BinaryOp::Gt => a > b,
                BinaryOp::Ge => a >= b,
                _ => unreachable!(),
            }
        }
    };
    Ok(result)
}

fn evaluate_unary(op: &UnaryOp, operand: Value) -> Result<Value> {
    match op {
        UnaryOp::Not => match operand {
            Value::Boolean(v) => Ok(Value::Boolean(!v)),
            other => Err(type_error("not", "a Boolean operand", &other)),
        },
        UnaryOp::Plus | UnaryOp::ElemPlus => Ok(operand),
        UnaryOp::Minus | UnaryOp::ElemMinus => match operand {
            Value::Integer(v) => Ok(Value::Integer(-v)),
            Value::Real(v) => Ok(Value::Real(-v)),
            Value::Array(elements) => {
                let negated = elements
                    .into_iter()
                    .map(|e| evaluate_unary(op, e))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Array(negated))
            }
            other => Err(type_error("-", "a numeric operand", &other)),
        },
    }
}

fn evaluate_range(start: Value, step: Option<Value>, end: Value) -> Result<Value> {
    match (&start, &end) {
        (Value::Integer(a), Value::Integer(b)) => {
            let step = match &step {
                Some(value) => value
                    .as_integer()
                    .ok_or_else(|| type_error(":", "an Integer step", value))?,
                None => 1,
            };
            if step == 0 {
                return Err(type_error(":", "a nonzero step", &Value::Integer(0)));
            }
            let mut elements = Vec::new();
            let mut v = *a;
            while (step > 0 && v <= *b) || (step < 0 && v >= *b) {
                elements.push(Value::Integer(v));
                v += step;
            }
            Ok(Value::Array(elements))
        }
        _ => {
            let (Some(a), Some(b)) = (start.as_real(), end.as_real()) else {
                return Err(type_error(":", "numeric bounds", &start));
            };
            let step = match &step {
                Some(value) => value
                    .as_real()
                    .ok_or_else(|| type_error(":", "a numeric step", value))?,
                None => 1.0,
            };
            if step == 0.0 {
                return Err(type_error(":", "a nonzero step", &Value::Real(0.0)));
            }
            let n = ((b - a) / step).floor() as i64;
            let elements = (0..=n.max(-1))
                .map(|i| Value::Real(a + step * i as f64))
                .collect();
            Ok(Value::Array(elements))
        }
    }
}

//-----------------------------------------------------------------------------
// builtin functions
//-----------------------------------------------------------------------------

fn real_builtin(name: &str, f: fn(f64) -> f64, args: &[Value]) -> Result<Value> {
    let [arg] = args else {
        return Err(type_error(name, "exactly one argument", &Value::Integer(0)));
    };
    let v = arg
        .as_real()
        .ok_or_else(|| type_error(name, "a numeric argument", arg))?;
    Ok(Value::Real(f(v)))
}

fn evaluate_call(name: &str, args: &[Value]) -> Result<Value> {
    match name {
        "abs" => match args {
            [Value::Integer(v)] => Ok(Value::Integer(v.abs())),
            [Value::Real(v)] => Ok(Value::Real(v.abs())),
            _ => Err(type_error("abs", "one numeric argument", &Value::Integer(0))),
        },
        "sqrt" => real_builtin("sqrt", f64::sqrt, args),
        "exp" => real_builtin("exp", f64::exp, args),
        "log" => real_builtin("log", f64::ln, args),
        "sin" => real_builtin("sin", f64::sin, args),
        "cos" => real_builtin("cos", f64::cos, args),
        "tan" => real_builtin("tan", f64::tan, args),
        "min" | "max" => {
            let pick = |a: f64, b: f64| {
                if name == "min" { a.min(b) } else { a.max(b) }
            };
            let values: Vec<f64> = match args {
                [Value::Array(elements)] => elements
                    .iter()
                    .map(|e| e.as_real())
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| type_error(name, "a numeric array", &args[0]))?,
                [a, b] => {
                    // preserve integer typing for the common two-argument form
                    if let (Value::Integer(x), Value::Integer(y)) = (a, b) {
                        let v = if name == "min" {
                            *x.min(y)
                        } else {
                            *x.max(y)
                        };
                        return Ok(Value::Integer(v));
                    }
                    vec![
                        a.as_real()
                            .ok_or_else(|| type_error(name, "numeric arguments", a))?,
                        b.as_real()
                            .ok_or_else(|| type_error(name, "numeric arguments", b))?,
                    ]
                }
                _ => {
                    return Err(type_error(
                        name,
                        "an array or two numeric arguments",
                        &Value::Integer(0),
                    ));
                }
            };
            let mut it = values.into_iter();
            let first = it
                .next()
                .ok_or_else(|| type_error(name, "a non-empty array", &Value::Integer(0)))?;
            Ok(Value::Real(it.fold(first, pick)))
        }
        "sum" => match args {
            [Value::Array(elements)] => {
                if elements.iter().all(|e| matches!(e, Value::Integer(_))) {
                    let total = elements.iter().filter_map(Value::as_integer).sum();
                    Ok(Value::Integer(total))
                } else {
                    let total: f64 = elements
                        .iter()
                        .map(|e| e.as_real())
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| type_error("sum", "a numeric array", &args[0]))?
                        .into_iter()
                        .sum();
                    Ok(Value::Real(total))
                }
            }
            _ => Err(type_error("sum", "one array argument", &Value::Integer(0))),
        },
        "fill" => {
            let [value, dims @ ..] = args else {
                return Err(type_error("fill", "a value and dimensions", &Value::Integer(0)));
            };
            let mut result = value.clone();
            for dim in dims.iter().rev() {
                let n = dim
                    .as_integer()
                    .ok_or_else(|| type_error("fill", "Integer dimensions", dim))?;
                result = Value::Array(vec![result; n.max(0) as usize]);
            }
            Ok(result)
        }
        "size" => match args {
            [Value::Array(elements)] => {
                let mut dims = vec![Value::Integer(elements.len() as i64)];
                let mut inner = elements.first();
                while let Some(Value::Array(next)) = inner {
                    dims.push(Value::Integer(next.len() as i64));
                    inner = next.first();
                }
                Ok(Value::Array(dims))
            }
            [Value::Array(elements), Value::Integer(1)] => {
                Ok(Value::Integer(elements.len() as i64))
            }
            _ => Err(type_error("size", "an array argument", &Value::Integer(0))),
        },
        "String" => match args {
            [Value::Integer(v)] => Ok(Value::String(v.to_string())),
            [Value::Real(v)] => Ok(Value::String(v.to_string())),
            [Value::Boolean(v)] => Ok(Value::String(v.to_string())),
            [Value::String(v)] => Ok(Value::String(v.clone())),
            _ => Err(type_error("String", "one scalar argument", &Value::Integer(0))),
        },
        _ => Err(Error::TypeMismatch {
            name: name.to_string(),
            expected: "a builtin function",
            found: "an unknown function".to_string(),
        }),
    }
}

//-----------------------------------------------------------------------------
// the evaluator
//-----------------------------------------------------------------------------

fn index_value(value: &Value, subscripts: &[Subscript], env: &Environment) -> Result<Value> {
    let mut current = value.clone();
    for subscript in subscripts {
        let Subscript::Expression { expression } = subscript else {
            // a flexible subscript selects the whole axis
            continue;
        };
        let index = evaluate(expression, env)?;
        let i = index
            .as_integer()
            .ok_or_else(|| type_error("[]", "an Integer subscript", &index))?;
        let Value::Array(elements) = &current else {
            return Err(type_error("[]", "an array", &current));
        };
        if i < 1 || i as usize > elements.len() {
            return Err(type_error("[]", "a subscript in range", &index));
        }
        current = elements[i as usize - 1].clone();
    }
    Ok(current)
}

/// Evaluates `expression` against pre-resolved bindings.
pub fn evaluate(expression: &Expression, env: &Environment) -> Result<Value> {
    match expression {
        Expression::Integer { token } => token
            .text
            .parse()
            .map(Value::Integer)
            .map_err(|_| type_error("integer literal", "a valid integer", &Value::Integer(0))),
        Expression::Real { token } => token
            .text
            .parse()
            .map(Value::Real)
            .map_err(|_| type_error("real literal", "a valid real", &Value::Real(0.0))),
        Expression::Str { token } => Ok(Value::String(token.text.clone())),
        Expression::Boolean { token } => Ok(Value::Boolean(token.text == "true")),
        Expression::End => Err(Error::TypeMismatch {
            name: "end".to_string(),
            expected: "a subscript context",
            found: "a bare end expression".to_string(),
        }),
        Expression::Ref(cref) => {
            if let Some(value) = env.lookup(cref) {
                return Ok(value.clone());
            }
            // fall back to the unsubscripted binding plus literal indexing
            if cref.parts.iter().any(|p| !p.subscripts.is_empty()) {
                let mut base = cref.clone();
                for part in &mut base.parts {
                    part.subscripts.clear();
                }
                if let Some(value) = env.lookup(&base) {
                    let subscripts: Vec<Subscript> = cref
                        .parts
                        .iter()
                        .flat_map(|p| p.subscripts.iter().cloned())
                        .collect();
                    return index_value(value, &subscripts, env);
                }
            }
            Err(env.missing(cref))
        }
        Expression::Unary { op, operand } => {
            let value = evaluate(operand, env)?;
            evaluate_unary(op, value)
        }
        Expression::Binary { op, lhs, rhs } => {
            match op {
                BinaryOp::And => {
                    let a = evaluate(lhs, env)?;
                    if a.as_boolean() == Some(false) {
                        return Ok(Value::Boolean(false));
                    }
                    let b = evaluate(rhs, env)?;
                    match (a.as_boolean(), b.as_boolean()) {
                        (Some(a), Some(b)) => Ok(Value::Boolean(a && b)),
                        _ => Err(type_error("and", "Boolean operands", &b)),
                    }
                }
                BinaryOp::Or => {
                    let a = evaluate(lhs, env)?;
                    if a.as_boolean() == Some(true) {
                        return Ok(Value::Boolean(true));
                    }
                    let b = evaluate(rhs, env)?;
                    match (a.as_boolean(), b.as_boolean()) {
                        (Some(a), Some(b)) => Ok(Value::Boolean(a || b)),
                        _ => Err(type_error("or", "Boolean operands", &b)),
                    }
                }
                BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge => {
                    let a = evaluate(lhs, env)?;
                    let b = evaluate(rhs, env)?;
                    Ok(Value::Boolean(compare(op, &a, &b)?))
                }
                BinaryOp::Add | BinaryOp::ElemAdd => {
                    let a = evaluate(lhs, env)?;
                    let b = evaluate(rhs, env)?;
                    if let (Value::String(x), Value::String(y)) = (&a, &b) {
                        return Ok(Value::String(format!("{}{}", x, y)));
                    }
                    numeric_binary(
                        op,
                        a,
                        b,
                        |x, y| x.checked_add(y).map(Value::Integer),
                        |x, y| Value::Real(x + y),
                    )
                }
                BinaryOp::Sub | BinaryOp::ElemSub => {
                    let a = evaluate(lhs, env)?;
                    let b = evaluate(rhs, env)?;
                    numeric_binary(
                        op,
                        a,
                        b,
                        |x, y| x.checked_sub(y).map(Value::Integer),
                        |x, y| Value::Real(x - y),
                    )
                }
                BinaryOp::Mul | BinaryOp::ElemMul => {
                    let a = evaluate(lhs, env)?;
                    let b = evaluate(rhs, env)?;
                    numeric_binary(
                        op,
                        a,
                        b,
                        |x, y| x.checked_mul(y).map(Value::Integer),
                        |x, y| Value::Real(x * y),
                    )
                }
                BinaryOp::Div | BinaryOp::ElemDiv => {
                    let a = evaluate(lhs, env)?;
                    let b = evaluate(rhs, env)?;
                    numeric_binary(op, a, b, |_, _| None, |x, y| Value::Real(x / y))
                }
                BinaryOp::Pow | BinaryOp::ElemPow => {
                    let a = evaluate(lhs, env)?;
                    let b = evaluate(rhs, env)?;
                    numeric_binary(op, a, b, |_, _| None, |x, y| Value::Real(x.powf(y)))
                }
            }
        }
        Expression::Range { start, step, end } => {
            let start = evaluate(start, env)?;
            let step = step.as_ref().map(|s| evaluate(s, env)).transpose()?;
            let end = evaluate(end, env)?;
            evaluate_range(start, step, end)
        }
        Expression::If {
            branches,
            else_expression,
        } => {
            for branch in branches {
                let condition = evaluate(&branch.condition, env)?;
                match condition.as_boolean() {
                    Some(true) => return evaluate(&branch.then, env),
                    Some(false) => continue,
                    None => {
                        return Err(type_error("if", "a Boolean condition", &condition));
                    }
                }
            }
            evaluate(else_expression, env)
        }
        Expression::Array { elements } => {
            let values = elements
                .iter()
                .map(|e| evaluate(e, env))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(values))
        }
        Expression::Matrix { rows } => {
            let values = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|e| evaluate(e, env))
                        .collect::<Result<Vec<_>>>()
                        .map(Value::Array)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(values))
        }
        Expression::Call { callee, args } => {
            let values = evaluate_args(args, env)?;
            evaluate_call(&callee.as_dotted(), &values)
        }
    }
}

fn evaluate_args(args: &[FunctionArgument], env: &Environment) -> Result<Vec<Value>> {
    args.iter().map(|arg| evaluate(&arg.value, env)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression_text;
    use crate::syntax::ast::ComponentReference;

    fn eval(text: &str) -> Value {
        let expr = parse_expression_text(text, "t.mo").unwrap();
        evaluate(&expr, &Environment::new("test")).unwrap()
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3"), Value::Integer(7));
        assert_eq!(eval("(1 + 2) * 3"), Value::Integer(9));
        assert_eq!(eval("1 / 2"), Value::Real(0.5));
        assert_eq!(eval("2 ^ 3"), Value::Real(8.0));
        assert_eq!(eval("-2 + 1"), Value::Integer(-1));
        assert_eq!(eval("1.5 + 1"), Value::Real(2.5));
    }

    #[test]
    fn test_logic_and_comparison() {
        assert_eq!(eval("1 < 2 and 2 <= 2"), Value::Boolean(true));
        assert_eq!(eval("not (1 == 2)"), Value::Boolean(true));
        assert_eq!(eval("1 <> 2 or false"), Value::Boolean(true));
        assert_eq!(eval("\"a\" + \"b\" == \"ab\""), Value::Boolean(true));
    }

    #[test]
    fn test_ranges() {
        assert_eq!(
            eval("1:3"),
            Value::Array(vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(3)
            ])
        );
        assert_eq!(
            eval("3:-1:1"),
            Value::Array(vec![
                Value::Integer(3),
                Value::Integer(2),
                Value::Integer(1)
            ])
        );
    }

    #[test]
    fn test_if_expression() {
        assert_eq!(eval("if 1 < 2 then 10 else 20"), Value::Integer(10));
        assert_eq!(
            eval("if false then 1 elseif true then 2 else 3"),
            Value::Integer(2)
        );
    }

    #[test]
    fn test_arrays_and_builtins() {
        assert_eq!(eval("sum({1, 2, 3})"), Value::Integer(6));
        assert_eq!(eval("abs(-3)"), Value::Integer(3));
        assert_eq!(eval("sqrt(4)"), Value::Real(2.0));
        assert_eq!(eval("min(2, 3)"), Value::Integer(2));
        assert_eq!(
            eval("fill(0, 2)"),
            Value::Array(vec![Value::Integer(0), Value::Integer(0)])
        );
        assert_eq!(
            eval("{1, 2} + {3, 4}"),
            Value::Array(vec![Value::Integer(4), Value::Integer(6)])
        );
        assert_eq!(eval("2 * {1, 2}"), Value::Array(vec![
            Value::Integer(2),
            Value::Integer(4)
        ]));
    }

    #[test]
    fn test_environment_lookup() {
        let expr = parse_expression_text("k * 2", "t.mo").unwrap();
        let mut env = Environment::new("test");
        env.bind(ComponentReference::from_parts(["k"]), Value::Integer(21));
        assert_eq!(evaluate(&expr, &env).unwrap(), Value::Integer(42));
    }

    #[test]
    fn test_indexed_lookup() {
        let expr = parse_expression_text("v[2]", "t.mo").unwrap();
        let mut env = Environment::new("test");
        env.bind(
            ComponentReference::from_parts(["v"]),
            Value::Array(vec![Value::Integer(5), Value::Integer(6)]),
        );
        assert_eq!(evaluate(&expr, &env).unwrap(), Value::Integer(6));
    }

    #[test]
    fn test_unbound_reference() {
        let expr = parse_expression_text("missing + 1", "t.mo").unwrap();
        let err = evaluate(&expr, &Environment::new("M")).unwrap_err();
        assert!(matches!(err, Error::NameNotFound { .. }));
    }

    #[test]
    fn test_unused_branch_may_be_unbound() {
        let expr = parse_expression_text("if true then 1 else missing", "t.mo").unwrap();
        assert_eq!(
            evaluate(&expr, &Environment::new("t")).unwrap(),
            Value::Integer(1)
        );
    }

    #[test]
    fn test_value_split() {
        let v = Value::Array(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(v.split(2, 1), Value::Integer(2));
        assert_eq!(Value::Integer(9).split(4, 2), Value::Integer(9));
    }

    #[test]
    fn test_json_shape() {
        let v = Value::Array(vec![Value::Integer(1), Value::Real(2.5)]);
        assert_eq!(serde_json::to_string(&v).unwrap(), "[1,2.5]");
    }
}

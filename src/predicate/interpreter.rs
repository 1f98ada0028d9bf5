//! Tree-walking evaluation of predicate expressions

use super::parser::{ArithOp, CompareOp, Expr};
use super::value::{Scope, Value};
use super::PredicateError;
use regex::Regex;
use std::cmp::Ordering;

pub(crate) fn eval(expr: &Expr, scope: &Scope) -> Result<Value, PredicateError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Name(name) => scope
            .get(name)
            .cloned()
            .ok_or_else(|| PredicateError::UnboundVariable(name.clone())),
        Expr::Neg(inner) => match eval(inner, scope)? {
            Value::Int(n) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| PredicateError::Type("integer overflow".to_string())),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Bool(b) => Ok(Value::Int(-i64::from(b))),
            other => Err(PredicateError::Type(format!(
                "bad operand type for unary -: '{}'",
                other.type_name()
            ))),
        },
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, scope)?.truthy())),
        // `and`/`or` yield one of their operands, not a coerced bool
        Expr::And(left, right) => {
            let left = eval(left, scope)?;
            if left.truthy() {
                eval(right, scope)
            } else {
                Ok(left)
            }
        }
        Expr::Or(left, right) => {
            let left = eval(left, scope)?;
            if left.truthy() {
                Ok(left)
            } else {
                eval(right, scope)
            }
        }
        Expr::Arith(op, left, right) => {
            let left = eval(left, scope)?;
            let right = eval(right, scope)?;
            arith(*op, &left, &right)
        }
        Expr::Compare { first, rest } => {
            let mut left = eval(first, scope)?;
            for (op, operand) in rest {
                let right = eval(operand, scope)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
        Expr::Index(target, index) => {
            let target = eval(target, scope)?;
            let index = eval(index, scope)?;
            subscript(&target, &index)
        }
        Expr::Call { function, args } => {
            let args = args
                .iter()
                .map(|a| eval(a, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call(function, &args)
        }
        Expr::Method {
            receiver,
            method,
            args,
        } => {
            let receiver = eval(receiver, scope)?;
            let args = args
                .iter()
                .map(|a| eval(a, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call_method(&receiver, method, &args)
        }
    }
}

fn type_error(op: &str, left: &Value, right: &Value) -> PredicateError {
    PredicateError::Type(format!(
        "unsupported operand types for {}: '{}' and '{}'",
        op,
        left.type_name(),
        right.type_name()
    ))
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(n) => Some(*n),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn overflow() -> PredicateError {
    PredicateError::Type("integer overflow".to_string())
}

fn arith(op: ArithOp, left: &Value, right: &Value) -> Result<Value, PredicateError> {
    let symbol = match op {
        ArithOp::Add => "+",
        ArithOp::Sub => "-",
        ArithOp::Mul => "*",
        ArithOp::Div => "/",
        ArithOp::FloorDiv => "//",
        ArithOp::Mod => "%",
    };

    if let (ArithOp::Add, Value::Str(a), Value::Str(b)) = (op, left, right) {
        return Ok(Value::Str(format!("{}{}", a, b)));
    }

    if let (Some(a), Some(b)) = (as_int(left), as_int(right)) {
        return match op {
            ArithOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
            ArithOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
            ArithOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
            ArithOp::Div => {
                if b == 0 {
                    Err(PredicateError::DivisionByZero)
                } else {
                    Ok(Value::Float(a as f64 / b as f64))
                }
            }
            ArithOp::FloorDiv => floor_div(a, b).map(Value::Int),
            ArithOp::Mod => floor_mod(a, b).map(Value::Int),
        };
    }

    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Err(type_error(symbol, left, right));
    };
    match op {
        ArithOp::Add => Ok(Value::Float(a + b)),
        ArithOp::Sub => Ok(Value::Float(a - b)),
        ArithOp::Mul => Ok(Value::Float(a * b)),
        _ if b == 0.0 => Err(PredicateError::DivisionByZero),
        ArithOp::Div => Ok(Value::Float(a / b)),
        ArithOp::FloorDiv => Ok(Value::Float((a / b).floor())),
        ArithOp::Mod => Ok(Value::Float(a - b * (a / b).floor())),
    }
}

/// Integer division rounding toward negative infinity
fn floor_div(a: i64, b: i64) -> Result<i64, PredicateError> {
    if b == 0 {
        return Err(PredicateError::DivisionByZero);
    }
    let q = a.checked_div(b).ok_or_else(overflow)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

/// Remainder taking the sign of the divisor
fn floor_mod(a: i64, b: i64) -> Result<i64, PredicateError> {
    if b == 0 {
        return Err(PredicateError::DivisionByZero);
    }
    let r = a.checked_rem(b).ok_or_else(overflow)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Map(a), Value::Map(b)) => a == b,
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn ordering(op: &str, left: &Value, right: &Value) -> Result<Ordering, PredicateError> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a
                .partial_cmp(&b)
                .ok_or_else(|| PredicateError::Type("comparison with NaN".to_string())),
            _ => Err(type_error(op, left, right)),
        },
    }
}

fn contains(needle: &Value, haystack: &Value) -> Result<bool, PredicateError> {
    match (needle, haystack) {
        (Value::Str(n), Value::Str(h)) => Ok(h.contains(n.as_str())),
        (Value::Str(n), Value::Map(m)) => Ok(m.contains_key(n)),
        _ => Err(type_error("in", needle, haystack)),
    }
}

fn compile(pattern: &str) -> Result<Regex, PredicateError> {
    Regex::new(pattern).map_err(|e| PredicateError::InvalidRegex {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, PredicateError> {
    match op {
        CompareOp::Eq => Ok(values_equal(left, right)),
        CompareOp::NotEq => Ok(!values_equal(left, right)),
        CompareOp::Lt => Ok(ordering("<", left, right)? == Ordering::Less),
        CompareOp::Le => Ok(ordering("<=", left, right)? != Ordering::Greater),
        CompareOp::Gt => Ok(ordering(">", left, right)? == Ordering::Greater),
        CompareOp::Ge => Ok(ordering(">=", left, right)? != Ordering::Less),
        CompareOp::In => contains(left, right),
        CompareOp::NotIn => contains(left, right).map(|found| !found),
        CompareOp::Matches => match (left, right) {
            (Value::Str(text), Value::Str(pattern)) => Ok(compile(pattern)?.is_match(text)),
            _ => Err(type_error("=~", left, right)),
        },
    }
}

fn subscript(target: &Value, index: &Value) -> Result<Value, PredicateError> {
    match (target, index) {
        (Value::Map(map), Value::Str(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| PredicateError::UnboundVariable(key.clone())),
        (Value::Str(s), _) => {
            let Some(i) = as_int(index) else {
                return Err(type_error("[]", target, index));
            };
            let len = s.chars().count() as i64;
            let position = if i < 0 { len + i } else { i };
            if position < 0 {
                return Err(PredicateError::Type("string index out of range".to_string()));
            }
            s.chars()
                .nth(position as usize)
                .map(|c| Value::Str(c.to_string()))
                .ok_or_else(|| PredicateError::Type("string index out of range".to_string()))
        }
        _ => Err(type_error("[]", target, index)),
    }
}

fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), PredicateError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(PredicateError::Type(format!(
            "{}() takes {} argument(s) but {} were given",
            name,
            expected,
            args.len()
        )))
    }
}

fn call(function: &str, args: &[Value]) -> Result<Value, PredicateError> {
    match function {
        "int" => {
            arity(function, args, 1)?;
            match &args[0] {
                Value::Int(n) => Ok(Value::Int(*n)),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
                Value::Str(s) => s
                    .trim()
                    .replace('_', "")
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| {
                        PredicateError::Type(format!("invalid literal for int(): '{}'", s))
                    }),
                other => Err(PredicateError::Type(format!(
                    "cannot convert {} to int",
                    other.type_name()
                ))),
            }
        }
        "float" => {
            arity(function, args, 1)?;
            match &args[0] {
                Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                    PredicateError::Type(format!("could not convert string to float: '{}'", s))
                }),
                other => other.as_f64().map(Value::Float).ok_or_else(|| {
                    PredicateError::Type(format!("cannot convert {} to float", other.type_name()))
                }),
            }
        }
        "str" => {
            arity(function, args, 1)?;
            Ok(Value::Str(args[0].to_string()))
        }
        "bool" => {
            arity(function, args, 1)?;
            Ok(Value::Bool(args[0].truthy()))
        }
        "len" => {
            arity(function, args, 1)?;
            match &args[0] {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::Map(m) => Ok(Value::Int(m.len() as i64)),
                other => Err(PredicateError::Type(format!(
                    "object of type '{}' has no len()",
                    other.type_name()
                ))),
            }
        }
        "matches" => {
            arity(function, args, 2)?;
            match (&args[0], &args[1]) {
                // anchored at the start, like re.match
                (Value::Str(text), Value::Str(pattern)) => {
                    let anchored = compile(&format!(r"\A(?:{})", pattern))?;
                    Ok(Value::Bool(anchored.is_match(text)))
                }
                (a, b) => Err(type_error("matches()", a, b)),
            }
        }
        _ => Err(PredicateError::UnknownFunction(function.to_string())),
    }
}

fn string_arg<'a>(name: &str, args: &'a [Value]) -> Result<&'a str, PredicateError> {
    arity(name, args, 1)?;
    args[0]
        .as_str()
        .ok_or_else(|| PredicateError::Type(format!("{}() argument must be str", name)))
}

fn call_method(receiver: &Value, method: &str, args: &[Value]) -> Result<Value, PredicateError> {
    let Value::Str(s) = receiver else {
        return Err(PredicateError::UnknownFunction(format!(
            "{}.{}",
            receiver.type_name(),
            method
        )));
    };
    match method {
        "startswith" => Ok(Value::Bool(s.starts_with(string_arg(method, args)?))),
        "endswith" => Ok(Value::Bool(s.ends_with(string_arg(method, args)?))),
        "lower" => {
            arity(method, args, 0)?;
            Ok(Value::Str(s.to_lowercase()))
        }
        "upper" => {
            arity(method, args, 0)?;
            Ok(Value::Str(s.to_uppercase()))
        }
        "strip" => {
            arity(method, args, 0)?;
            Ok(Value::Str(s.trim().to_string()))
        }
        _ => Err(PredicateError::UnknownFunction(format!("str.{}", method))),
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;
    use std::collections::BTreeMap;

    fn run(source: &str, scope: &Scope) -> Result<Value, PredicateError> {
        eval(&parse(source).unwrap(), scope)
    }

    fn scope() -> Scope {
        let mut vars = BTreeMap::new();
        vars.insert("$X".to_string(), Value::from("foo"));
        vars.insert("$N".to_string(), Value::from("42"));
        Scope::new()
            .with("$X", Value::from("foo"))
            .with("$N", Value::from("42"))
            .with("vars", Value::Map(vars))
    }

    #[test]
    fn test_comparisons() {
        let s = scope();
        assert_eq!(run("int($N) > 40", &s).unwrap(), Value::Bool(true));
        assert_eq!(run("1 < int($N) < 42", &s).unwrap(), Value::Bool(false));
        assert_eq!(run("$X == 'foo'", &s).unwrap(), Value::Bool(true));
        assert_eq!(run("$X != 1", &s).unwrap(), Value::Bool(true));
        assert_eq!(run("1 == 1.0", &s).unwrap(), Value::Bool(true));
        assert_eq!(run("'o' in $X and 'z' not in $X", &s).unwrap(), Value::Bool(true));
        assert_eq!(run("$X =~ 'o+'", &s).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_boolean_ops_return_operands() {
        let s = scope();
        assert_eq!(run("0 or 'x'", &s).unwrap(), Value::from("x"));
        assert_eq!(run("'' and 1", &s).unwrap(), Value::from(""));
        assert_eq!(run("not ''", &s).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_short_circuit_skips_errors() {
        let s = scope();
        assert_eq!(run("False and $MISSING", &s).unwrap(), Value::Bool(false));
        assert_eq!(run("True or 1 / 0", &s).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_arithmetic() {
        let s = scope();
        assert_eq!(run("7 // 2", &s).unwrap(), Value::Int(3));
        assert_eq!(run("-7 // 2", &s).unwrap(), Value::Int(-4));
        assert_eq!(run("7 // -2", &s).unwrap(), Value::Int(-4));
        assert_eq!(run("-7 % 3", &s).unwrap(), Value::Int(2));
        assert_eq!(run("7 / 2", &s).unwrap(), Value::Float(3.5));
        assert_eq!(run("2 * 3 + 1.5", &s).unwrap(), Value::Float(7.5));
        assert_eq!(run("$X + 'bar'", &s).unwrap(), Value::from("foobar"));
        assert_eq!(run("1 / 0", &s), Err(PredicateError::DivisionByZero));
        assert!(matches!(run("$X - 1", &s), Err(PredicateError::Type(_))));
    }

    #[test]
    fn test_functions_and_methods() {
        let s = scope();
        assert_eq!(run(r#"vars["$X"].upper()"#, &s).unwrap(), Value::from("FOO"));
        assert_eq!(run("len($X)", &s).unwrap(), Value::Int(3));
        assert_eq!(run("str(2.0)", &s).unwrap(), Value::from("2.0"));
        assert_eq!(run("float('1.5') * 2", &s).unwrap(), Value::Float(3.0));
        assert_eq!(run("$X.startswith('f')", &s).unwrap(), Value::Bool(true));
        assert_eq!(run("matches($X, 'o')", &s).unwrap(), Value::Bool(false));
        assert_eq!(run("matches($X, 'f.o')", &s).unwrap(), Value::Bool(true));
        assert_eq!(run("$X[-1]", &s).unwrap(), Value::from("o"));
    }

    #[test]
    fn test_runtime_errors() {
        let s = scope();
        assert_eq!(
            run("$Y == 1", &s),
            Err(PredicateError::UnboundVariable("$Y".to_string()))
        );
        assert_eq!(
            run("open('x')", &s),
            Err(PredicateError::UnknownFunction("open".to_string()))
        );
        assert!(matches!(run("int($X)", &s), Err(PredicateError::Type(_))));
        assert!(matches!(run("$X < 1", &s), Err(PredicateError::Type(_))));
        assert!(matches!(
            run("$X =~ '('", &s),
            Err(PredicateError::InvalidRegex { .. })
        ));
    }
}

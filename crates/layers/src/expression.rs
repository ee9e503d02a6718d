//! Data-driven style expressions.
//!
//! Expressions are kept in their JSON wire form (`["op", arg, ...]`) so they can
//! be handed to the rendering engine untouched. The evaluator covers the subset
//! this workspace builds and filters on; anything else is reported as an
//! unknown operator rather than guessed at.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Feature properties an expression is evaluated against.
pub type Properties = serde_json::Map<String, Value>;

/// Fallback colour used by choropleth `match` expressions: fully transparent.
pub const TRANSPARENT: &str = "rgba(0,0,0,0)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expression(pub Value);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    NotAnExpression(String),
    UnknownOperator(String),
    Arity {
        op: String,
        expected: &'static str,
        got: usize,
    },
    Type {
        op: String,
        message: String,
    },
}

impl std::fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpressionError::NotAnExpression(msg) => write!(f, "not an expression: {msg}"),
            ExpressionError::UnknownOperator(op) => write!(f, "unknown expression operator: {op}"),
            ExpressionError::Arity { op, expected, got } => {
                write!(f, "{op}: expected {expected} arguments, got {got}")
            }
            ExpressionError::Type { op, message } => write!(f, "{op}: {message}"),
        }
    }
}

impl std::error::Error for ExpressionError {}

impl Expression {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// `["get", property]`
    pub fn get(property: &str) -> Self {
        Self(json!(["get", property]))
    }

    /// Selects features whose `property` is *not* one of `values`:
    /// `["!", ["in", ["get", property], ["literal", values]]]`.
    pub fn not_in<S: AsRef<str>>(property: &str, values: &[S]) -> Self {
        let values: Vec<&str> = values.iter().map(AsRef::as_ref).collect();
        Self(json!(["!", ["in", ["get", property], ["literal", values]]]))
    }

    /// Maps each `(code, color)` pair onto features whose `property` equals
    /// `code`; everything else gets `fallback`.
    pub fn match_colors<I, K, C>(property: &str, entries: I, fallback: &str) -> Self
    where
        I: IntoIterator<Item = (K, C)>,
        K: Into<String>,
        C: Into<String>,
    {
        let mut items = vec![json!("match"), json!(["get", property])];
        for (code, color) in entries {
            items.push(Value::String(code.into()));
            items.push(Value::String(color.into()));
        }
        items.push(Value::String(fallback.to_string()));
        Self(Value::Array(items))
    }

    /// Structural check: operators are known and argument counts are right.
    pub fn validate(&self) -> Result<(), ExpressionError> {
        check(&self.0, true)
    }

    /// Like [`Expression::validate`], but operators outside the evaluated
    /// subset (and the legacy `["in", key, v1, v2, ...]` form) are passed
    /// through unchecked, the way a full style engine would accept them.
    pub fn validate_known(&self) -> Result<(), ExpressionError> {
        check(&self.0, false)
    }

    pub fn evaluate(&self, props: &Properties) -> Result<Value, ExpressionError> {
        eval(&self.0, props)
    }

    /// Filter semantics: a feature passes only when the expression yields `true`.
    pub fn matches(&self, props: &Properties) -> Result<bool, ExpressionError> {
        Ok(self.evaluate(props)? == Value::Bool(true))
    }
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

fn split_op(items: &[Value]) -> Result<(&str, &[Value]), ExpressionError> {
    let Some((head, args)) = items.split_first() else {
        return Err(ExpressionError::NotAnExpression("empty array".to_string()));
    };
    let Value::String(op) = head else {
        return Err(ExpressionError::NotAnExpression(format!(
            "expected operator name, found {head}"
        )));
    };
    check_arity(op, args.len())?;
    Ok((op.as_str(), args))
}

fn check_arity(op: &str, n: usize) -> Result<(), ExpressionError> {
    let (ok, expected) = match op {
        "literal" | "get" | "has" | "!" => (n == 1, "1"),
        "==" | "!=" | "<" | "<=" | ">" | ">=" | "in" => (n == 2, "2"),
        "all" | "any" => (true, "any number of"),
        "coalesce" => (n >= 1, "at least 1"),
        "match" => (n >= 4 && n % 2 == 0, "input, label/output pairs and a fallback as"),
        "case" => (n >= 3 && n % 2 == 1, "condition/output pairs and a fallback as"),
        _ => return Err(ExpressionError::UnknownOperator(op.to_string())),
    };
    if ok {
        Ok(())
    } else {
        Err(ExpressionError::Arity {
            op: op.to_string(),
            expected,
            got: n,
        })
    }
}

fn is_known(op: &str) -> bool {
    !matches!(check_arity(op, 0), Err(ExpressionError::UnknownOperator(_)))
}

fn check(v: &Value, strict: bool) -> Result<(), ExpressionError> {
    let Value::Array(items) = v else {
        return Ok(());
    };
    if !strict {
        if let Some(Value::String(op)) = items.first() {
            if !is_known(op) || (op == "in" && items.len() > 3) {
                return Ok(());
            }
        }
    }
    let (op, args) = split_op(items)?;
    match op {
        "literal" => Ok(()),
        "match" => {
            check(&args[0], strict)?;
            // Labels are literals, never evaluated.
            for pair in args[1..args.len() - 1].chunks(2) {
                check(&pair[1], strict)?;
            }
            check(&args[args.len() - 1], strict)
        }
        _ => args.iter().try_for_each(|arg| check(arg, strict)),
    }
}

fn eval(v: &Value, props: &Properties) -> Result<Value, ExpressionError> {
    let Value::Array(items) = v else {
        return Ok(v.clone());
    };
    let (op, args) = split_op(items)?;

    match op {
        "literal" => Ok(args[0].clone()),
        "get" => {
            let key = expect_string(op, eval(&args[0], props)?)?;
            Ok(props.get(&key).cloned().unwrap_or(Value::Null))
        }
        "has" => {
            let key = expect_string(op, eval(&args[0], props)?)?;
            Ok(Value::Bool(props.contains_key(&key)))
        }
        "!" => Ok(Value::Bool(!expect_bool(op, eval(&args[0], props)?)?)),
        "==" => Ok(Value::Bool(values_equal(
            &eval(&args[0], props)?,
            &eval(&args[1], props)?,
        ))),
        "!=" => Ok(Value::Bool(!values_equal(
            &eval(&args[0], props)?,
            &eval(&args[1], props)?,
        ))),
        "<" | "<=" | ">" | ">=" => {
            let ord = compare(op, &eval(&args[0], props)?, &eval(&args[1], props)?)?;
            let out = match op {
                "<" => ord.is_lt(),
                "<=" => ord.is_le(),
                ">" => ord.is_gt(),
                _ => ord.is_ge(),
            };
            Ok(Value::Bool(out))
        }
        "all" => {
            for a in args {
                if !expect_bool(op, eval(a, props)?)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        "any" => {
            for a in args {
                if expect_bool(op, eval(a, props)?)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "in" => {
            let needle = eval(&args[0], props)?;
            match eval(&args[1], props)? {
                Value::Array(haystack) => Ok(Value::Bool(
                    haystack.iter().any(|h| values_equal(h, &needle)),
                )),
                Value::String(haystack) => match needle {
                    Value::String(n) => Ok(Value::Bool(haystack.contains(n.as_str()))),
                    other => Err(type_error(op, format!("cannot search a string for {other}"))),
                },
                other => Err(type_error(op, format!("expected array or string, found {other}"))),
            }
        }
        "match" => {
            let input = eval(&args[0], props)?;
            let fallback = &args[args.len() - 1];
            for pair in args[1..args.len() - 1].chunks(2) {
                if label_matches(&pair[0], &input) {
                    return eval(&pair[1], props);
                }
            }
            eval(fallback, props)
        }
        "case" => {
            let fallback = &args[args.len() - 1];
            for pair in args[..args.len() - 1].chunks(2) {
                if expect_bool(op, eval(&pair[0], props)?)? {
                    return eval(&pair[1], props);
                }
            }
            eval(fallback, props)
        }
        "coalesce" => {
            for a in args {
                let v = eval(a, props)?;
                if !v.is_null() {
                    return Ok(v);
                }
            }
            Ok(Value::Null)
        }
        _ => Err(ExpressionError::UnknownOperator(op.to_string())),
    }
}

fn label_matches(label: &Value, input: &Value) -> bool {
    match label {
        Value::Array(labels) => labels.iter().any(|l| values_equal(l, input)),
        l => values_equal(l, input),
    }
}

// Numbers compare by value so `1` and `1.0` are equal, as they are in the engine.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(op: &str, a: &Value, b: &Value) -> Result<std::cmp::Ordering, ExpressionError> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            x.partial_cmp(&y)
                .ok_or_else(|| type_error(op, "numbers are not comparable".to_string()))
        }
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => Err(type_error(
            op,
            format!("expected two numbers or two strings, found {a} and {b}"),
        )),
    }
}

fn expect_bool(op: &str, v: Value) -> Result<bool, ExpressionError> {
    match v {
        Value::Bool(b) => Ok(b),
        other => Err(type_error(op, format!("expected boolean, found {other}"))),
    }
}

fn expect_string(op: &str, v: Value) -> Result<String, ExpressionError> {
    match v {
        Value::String(s) => Ok(s),
        other => Err(type_error(op, format!("expected string, found {other}"))),
    }
}

fn type_error(op: &str, message: String) -> ExpressionError {
    ExpressionError::Type {
        op: op.to_string(),
        message,
    }
}

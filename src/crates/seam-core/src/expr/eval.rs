//! Expression evaluation
//!
//! Side-effect free: an evaluation reads the scope and produces a value.
//! Type discipline is strict - truthiness is never inferred from `0` or
//! the empty string, `&&`/`||` accept only booleans, and the only implicit
//! coercion is numeric string comparison on `==`/`!=`.

use super::parser::{BinOp, Expr, Func, PathSeg, RefRoot, UnOp};
use regex::Regex;
use seam_node::error::{FlowError, Result};
use serde_json::{Number, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

/// What an expression can see: the result map, a variables snapshot, the
/// execution's contextual constants, and the evaluating node's sole input
/// (backing the shorthand forms).
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub results: BTreeMap<String, Value>,
    pub variables: BTreeMap<String, Value>,
    pub context: BTreeMap<String, Value>,
    pub input: Option<Value>,
    /// Wall-clock budget for one `matches()` call.
    pub regex_timeout: Duration,
}

impl Scope {
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }
}

/// Evaluate a parsed expression against a scope.
pub fn evaluate(expr: &Expr, scope: &Scope) -> Result<Value> {
    match expr {
        Expr::Number(n) => Ok(number(*n)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Input => Ok(scope.input.clone().unwrap_or(Value::Null)),
        Expr::Ref(root, path) => resolve_ref(root, path, scope),
        Expr::Unary(op, inner) => {
            let value = evaluate(inner, scope)?;
            match op {
                UnOp::Not => match value {
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    other => Err(FlowError::Type(format!(
                        "'!' requires a boolean, got {}",
                        type_name(&other)
                    ))),
                },
                UnOp::Neg => match as_number(&value) {
                    Some(n) => Ok(number(-n)),
                    None => Err(FlowError::Type(format!(
                        "unary '-' requires a number, got {}",
                        type_name(&value)
                    ))),
                },
            }
        }
        Expr::Binary(op, lhs, rhs) => binary(*op, lhs, rhs, scope),
        Expr::Call(func, args) => call(*func, args, scope),
    }
}

fn binary(op: BinOp, lhs: &Expr, rhs: &Expr, scope: &Scope) -> Result<Value> {
    // Boolean operators short-circuit; everything else evaluates both sides.
    if matches!(op, BinOp::And | BinOp::Or) {
        let left = expect_bool(evaluate(lhs, scope)?, op)?;
        return match (op, left) {
            (BinOp::And, false) => Ok(Value::Bool(false)),
            (BinOp::Or, true) => Ok(Value::Bool(true)),
            _ => {
                let right = expect_bool(evaluate(rhs, scope)?, op)?;
                Ok(Value::Bool(right))
            }
        };
    }

    let left = evaluate(lhs, scope)?;
    let right = evaluate(rhs, scope)?;
    match op {
        BinOp::Mul | BinOp::Div | BinOp::Rem | BinOp::Add | BinOp::Sub => {
            let (a, b) = match (as_number(&left), as_number(&right)) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(FlowError::Type(format!(
                        "arithmetic requires numbers, got {} and {}",
                        type_name(&left),
                        type_name(&right)
                    )))
                }
            };
            let result = match op {
                BinOp::Mul => a * b,
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Div => {
                    if b == 0.0 {
                        return Err(FlowError::Domain("division by zero in expression".into()));
                    }
                    a / b
                }
                BinOp::Rem => {
                    if b == 0.0 {
                        return Err(FlowError::Domain("remainder by zero in expression".into()));
                    }
                    a % b
                }
                _ => unreachable!(),
            };
            Ok(number(result))
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = compare(&left, &right)?;
            let pass = match op {
                BinOp::Lt => ordering == std::cmp::Ordering::Less,
                BinOp::Le => ordering != std::cmp::Ordering::Greater,
                BinOp::Gt => ordering == std::cmp::Ordering::Greater,
                BinOp::Ge => ordering != std::cmp::Ordering::Less,
                _ => unreachable!(),
            };
            Ok(Value::Bool(pass))
        }
        BinOp::Eq => Ok(Value::Bool(loose_eq(&left, &right)?)),
        BinOp::Ne => Ok(Value::Bool(!loose_eq(&left, &right)?)),
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    }
}

/// Ordering comparison: numbers with numbers, strings with strings.
fn compare(left: &Value, right: &Value) -> Result<std::cmp::Ordering> {
    if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
        return a.partial_cmp(&b).ok_or_else(|| {
            FlowError::Type("comparison of NaN is undefined".into())
        });
    }
    if let (Value::String(a), Value::String(b)) = (left, right) {
        return Ok(a.cmp(b));
    }
    Err(FlowError::Type(format!(
        "cannot order {} against {}",
        type_name(left),
        type_name(right)
    )))
}

/// Equality with the single sanctioned coercion: a string operand compared
/// against a number is parsed numerically when it parses cleanly.
fn loose_eq(left: &Value, right: &Value) -> Result<bool> {
    match (left, right) {
        (Value::Null, Value::Null) => Ok(true),
        (Value::Null, _) | (_, Value::Null) => Ok(false),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Number(_), Value::Number(_)) => {
            Ok(as_number(left) == as_number(right))
        }
        (Value::String(a), Value::String(b)) => Ok(a == b),
        (Value::Number(_), Value::String(s)) | (Value::String(s), Value::Number(_)) => {
            match s.trim().parse::<f64>() {
                Ok(parsed) => {
                    let n = as_number(if left.is_number() { left } else { right })
                        .expect("operand checked as number");
                    Ok(parsed == n)
                }
                Err(_) => Err(FlowError::Type(format!(
                    "cannot compare number against non-numeric string '{s}'"
                ))),
            }
        }
        (Value::Array(a), Value::Array(b)) => Ok(a == b),
        (Value::Object(a), Value::Object(b)) => Ok(a == b),
        _ => Err(FlowError::Type(format!(
            "cannot compare {} against {}",
            type_name(left),
            type_name(right)
        ))),
    }
}

fn call(func: Func, args: &[Expr], scope: &Scope) -> Result<Value> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(evaluate(arg, scope)?);
    }
    match func {
        Func::Len => {
            let len = match &values[0] {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                other => {
                    return Err(FlowError::Type(format!(
                        "len() requires a string, list, or mapping, got {}",
                        type_name(other)
                    )))
                }
            };
            Ok(number(len as f64))
        }
        Func::Contains => {
            let (s, sub) = two_strings("contains", &values)?;
            Ok(Value::Bool(s.contains(sub)))
        }
        Func::StartsWith => {
            let (s, prefix) = two_strings("startsWith", &values)?;
            Ok(Value::Bool(s.starts_with(prefix)))
        }
        Func::EndsWith => {
            let (s, suffix) = two_strings("endsWith", &values)?;
            Ok(Value::Bool(s.ends_with(suffix)))
        }
        Func::Lower => Ok(Value::String(one_string("lower", &values)?.to_lowercase())),
        Func::Upper => Ok(Value::String(one_string("upper", &values)?.to_uppercase())),
        Func::Trim => Ok(Value::String(one_string("trim", &values)?.trim().to_string())),
        Func::Matches => {
            let (s, pattern) = two_strings("matches", &values)?;
            matches_with_budget(s, pattern, scope.regex_timeout)
        }
        Func::ParseInt => {
            let parsed = match &values[0] {
                Value::String(s) => s.trim().parse::<i64>().map_err(|_| {
                    FlowError::Type(format!("parseInt() cannot parse '{s}'"))
                })?,
                Value::Number(_) => as_number(&values[0]).expect("checked number") as i64,
                other => {
                    return Err(FlowError::Type(format!(
                        "parseInt() requires a string, got {}",
                        type_name(other)
                    )))
                }
            };
            Ok(number(parsed as f64))
        }
        Func::ParseFloat => {
            let parsed = match &values[0] {
                Value::String(s) => s.trim().parse::<f64>().map_err(|_| {
                    FlowError::Type(format!("parseFloat() cannot parse '{s}'"))
                })?,
                Value::Number(_) => as_number(&values[0]).expect("checked number"),
                other => {
                    return Err(FlowError::Type(format!(
                        "parseFloat() requires a string, got {}",
                        type_name(other)
                    )))
                }
            };
            Ok(number(parsed))
        }
        Func::ToString => Ok(Value::String(stringify(&values[0]))),
        Func::Now => Ok(number(chrono::Utc::now().timestamp_millis() as f64)),
    }
}

fn resolve_ref(root: &RefRoot, path: &[PathSeg], scope: &Scope) -> Result<Value> {
    let base = match root {
        RefRoot::Node(id) => scope.results.get(id).cloned().unwrap_or(Value::Null),
        RefRoot::Variable(name) => scope.variables.get(name).cloned().unwrap_or(Value::Null),
        RefRoot::Context(name) => scope.context.get(name).cloned().unwrap_or(Value::Null),
    };
    walk_path(base, path, root)
}

fn walk_path(mut current: Value, path: &[PathSeg], root: &RefRoot) -> Result<Value> {
    for (i, seg) in path.iter().enumerate() {
        current = match (seg, &current) {
            (PathSeg::Key(key), Value::Object(map)) => match map.get(key) {
                Some(v) => v.clone(),
                None => return Err(undefined_path(root, path)),
            },
            // `node.a.value` reads the whole result when the node produced
            // a bare (non-mapping) value; the front-end emits this form for
            // literal nodes.
            (PathSeg::Key(key), _) if key == "value" && i == 0 => current,
            (PathSeg::Index(idx), Value::Array(items)) => match items.get(*idx) {
                Some(v) => v.clone(),
                None => return Err(undefined_path(root, path)),
            },
            _ => return Err(undefined_path(root, path)),
        };
    }
    Ok(current)
}

fn undefined_path(root: &RefRoot, path: &[PathSeg]) -> FlowError {
    let root_text = match root {
        RefRoot::Node(id) => format!("node.{id}"),
        RefRoot::Variable(name) => format!("variables.{name}"),
        RefRoot::Context(name) => format!("context.{name}"),
    };
    let mut token = root_text;
    for seg in path {
        match seg {
            PathSeg::Key(key) => {
                token.push('.');
                token.push_str(key);
            }
            PathSeg::Index(idx) => {
                token.push_str(&format!("[{idx}]"));
            }
        }
    }
    FlowError::UndefinedReference { token }
}

// ---------------------------------------------------------------------------
// regex support
// ---------------------------------------------------------------------------

fn pattern_cache() -> &'static Mutex<HashMap<String, Arc<Regex>>> {
    static CACHE: OnceLock<Mutex<HashMap<String, Arc<Regex>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn matches_with_budget(s: &str, pattern: &str, budget: Duration) -> Result<Value> {
    let regex = {
        let mut cache = pattern_cache().lock().expect("pattern cache poisoned");
        match cache.get(pattern) {
            Some(regex) => Arc::clone(regex),
            None => {
                let compiled = Regex::new(pattern).map_err(|e| {
                    FlowError::Type(format!("invalid regex pattern '{pattern}': {e}"))
                })?;
                let regex = Arc::new(compiled);
                cache.insert(pattern.to_string(), Arc::clone(&regex));
                regex
            }
        }
    };

    let start = Instant::now();
    let matched = regex.is_match(s);
    if budget != Duration::ZERO && start.elapsed() > budget {
        return Err(FlowError::RegexTimeout {
            pattern: pattern.to_string(),
        });
    }
    Ok(Value::Bool(matched))
}

// ---------------------------------------------------------------------------
// value helpers
// ---------------------------------------------------------------------------

pub(crate) fn number(n: f64) -> Value {
    // Prefer integer JSON numbers when the value is integral.
    if n.fract() == 0.0 && n.abs() < (i64::MAX as f64) {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

pub(crate) fn as_number(value: &Value) -> Option<f64> {
    value.as_f64()
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

/// Render a value as text the way `toString()` and templates do.
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn expect_bool(value: Value, op: BinOp) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        other => {
            let symbol = if op == BinOp::And { "&&" } else { "||" };
            Err(FlowError::Type(format!(
                "'{symbol}' requires boolean operands, got {}",
                type_name(&other)
            )))
        }
    }
}

fn one_string<'a>(name: &str, values: &'a [Value]) -> Result<&'a str> {
    values[0].as_str().ok_or_else(|| {
        FlowError::Type(format!(
            "{name}() requires a string, got {}",
            type_name(&values[0])
        ))
    })
}

fn two_strings<'a>(name: &str, values: &'a [Value]) -> Result<(&'a str, &'a str)> {
    match (values[0].as_str(), values[1].as_str()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(FlowError::Type(format!(
            "{name}() requires two strings, got {} and {}",
            type_name(&values[0]),
            type_name(&values[1])
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse;
    use serde_json::json;

    fn eval(source: &str, scope: &Scope) -> Result<Value> {
        evaluate(&parse(source, 64).unwrap(), scope)
    }

    fn scope() -> Scope {
        Scope {
            results: BTreeMap::from([
                ("a".to_string(), json!(10)),
                ("fetch".to_string(), json!({"body": {"items": [1, 2, 3]}})),
            ]),
            variables: BTreeMap::from([("name".to_string(), json!("seam"))]),
            context: BTreeMap::from([("execution_id".to_string(), json!("x-1"))]),
            input: Some(json!(42)),
            regex_timeout: Duration::from_millis(100),
        }
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval("1 + 2 * 3", &scope()).unwrap(), json!(7));
        assert_eq!(eval("(1 + 2) * 3", &scope()).unwrap(), json!(9));
        assert_eq!(eval("10 % 3", &scope()).unwrap(), json!(1));
        assert_eq!(eval("7 / 2", &scope()).unwrap(), json!(3.5));
    }

    #[test]
    fn division_by_zero_is_a_domain_error() {
        assert!(matches!(
            eval("1 / 0", &scope()).unwrap_err(),
            FlowError::Domain(_)
        ));
    }

    #[test]
    fn truthiness_is_strict() {
        // 0 and "" are not false
        assert!(matches!(
            eval("0 && true", &scope()).unwrap_err(),
            FlowError::Type(_)
        ));
        assert!(matches!(
            eval("!1", &scope()).unwrap_err(),
            FlowError::Type(_)
        ));
        assert_eq!(eval("true && !false", &scope()).unwrap(), json!(true));
    }

    #[test]
    fn logic_short_circuits() {
        // the right side would be a type error if evaluated
        assert_eq!(eval("false && (1 && 2)", &scope()).unwrap(), json!(false));
        assert_eq!(eval("true || (1 && 2)", &scope()).unwrap(), json!(true));
    }

    #[test]
    fn equality_coerces_numeric_strings_only() {
        assert_eq!(eval("'5' == 5", &scope()).unwrap(), json!(true));
        assert_eq!(eval("5 != '6'", &scope()).unwrap(), json!(true));
        assert!(matches!(
            eval("'five' == 5", &scope()).unwrap_err(),
            FlowError::Type(_)
        ));
        assert!(matches!(
            eval("true == 1", &scope()).unwrap_err(),
            FlowError::Type(_)
        ));
    }

    #[test]
    fn null_equality_is_not_an_error() {
        assert_eq!(eval("null == null", &scope()).unwrap(), json!(true));
        assert_eq!(eval("null == 5", &scope()).unwrap(), json!(false));
    }

    #[test]
    fn incompatible_ordering_is_a_type_error() {
        assert!(matches!(
            eval("'a' < 1", &scope()).unwrap_err(),
            FlowError::Type(_)
        ));
        assert_eq!(eval("'a' < 'b'", &scope()).unwrap(), json!(true));
    }

    #[test]
    fn node_references_walk_paths() {
        assert_eq!(
            eval("node.fetch.body.items[1]", &scope()).unwrap(),
            json!(2)
        );
        assert_eq!(eval("node.a.value", &scope()).unwrap(), json!(10));
        assert_eq!(eval("node.a.value > 5", &scope()).unwrap(), json!(true));
    }

    #[test]
    fn missing_path_is_undefined_reference() {
        let err = eval("node.fetch.body.missing", &scope()).unwrap_err();
        assert_eq!(
            err,
            FlowError::UndefinedReference {
                token: "node.fetch.body.missing".into()
            }
        );
    }

    #[test]
    fn variables_and_context_resolve() {
        assert_eq!(eval("variables.name", &scope()).unwrap(), json!("seam"));
        assert_eq!(eval("variables.absent", &scope()).unwrap(), Value::Null);
        assert_eq!(eval("context.execution_id", &scope()).unwrap(), json!("x-1"));
    }

    #[test]
    fn builtin_functions() {
        assert_eq!(eval("len('hello')", &scope()).unwrap(), json!(5));
        assert_eq!(eval("len(node.fetch.body.items)", &scope()).unwrap(), json!(3));
        assert_eq!(eval("contains('workflow', 'flow')", &scope()).unwrap(), json!(true));
        assert_eq!(eval("startsWith('seam', 'se')", &scope()).unwrap(), json!(true));
        assert_eq!(eval("endsWith('seam', 'am')", &scope()).unwrap(), json!(true));
        assert_eq!(eval("upper(trim('  hi '))", &scope()).unwrap(), json!("HI"));
        assert_eq!(eval("lower('HI')", &scope()).unwrap(), json!("hi"));
        assert_eq!(eval("parseInt('12')", &scope()).unwrap(), json!(12));
        assert_eq!(eval("parseFloat('1.5')", &scope()).unwrap(), json!(1.5));
        assert_eq!(eval("toString(12)", &scope()).unwrap(), json!("12"));
        assert_eq!(eval("matches('abc123', '[a-z]+\\d+')", &scope()).unwrap(), json!(true));
    }

    #[test]
    fn now_is_monotonic_enough() {
        let before = chrono::Utc::now().timestamp_millis() as f64;
        let value = eval("now()", &scope()).unwrap();
        assert!(value.as_f64().unwrap() >= before - 1000.0);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let parsed = parse("node.a.value * 2 + len(variables.name)", 64).unwrap();
        let s = scope();
        let first = evaluate(&parsed, &s).unwrap();
        let second = evaluate(&parsed, &s).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, json!(24));
    }

    #[test]
    fn invalid_regex_is_a_type_error() {
        assert!(matches!(
            eval("matches('a', '[')", &scope()).unwrap_err(),
            FlowError::Type(_)
        ));
    }
}

use indexmap::IndexMap;
use swc_core::ecma::ast::Expr;

use crate::error::{EvalError, EvalResult};
use crate::runtime::Vnode;

// -----------------------------------------------------------------------------
// Evaluator values
// -----------------------------------------------------------------------------

/// What a placeholder stands for. The evaluator only knows the kind, never the
/// content, so anything that would need the content fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpaqueKind {
    Str,
    Num,
    Component,
    /// An attrs object of unknown shape (`Object.assign({...}, ...)`).
    Attrs,
    Any,
}

#[derive(Debug, Clone)]
pub struct Opaque {
    pub kind: OpaqueKind,
    /// Placeholder token this value came from (for diagnostics).
    pub token: String,
    /// Expression emitted in place of the value. Usually the bare token.
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone)]
pub enum FnBody {
    Expr(Box<Expr>),
    Undefined,
    Unsupported,
}

#[derive(Debug, Clone)]
pub struct Closure {
    /// The function expression as written.
    pub source: Box<Expr>,
    pub params: Vec<String>,
    pub body: FnBody,
    /// Locals visible when the function was created.
    pub env: Vec<(String, Value)>,
}

#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
    Node(Box<Vnode>),
    Func(Box<Closure>),
    Opaque(Opaque),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Undefined | Value::Null | Value::Bool(_) | Value::Num(_) | Value::Str(_)
        )
    }

    pub fn is_nullish(&self) -> EvalResult<bool> {
        match self {
            Value::Undefined | Value::Null => Ok(true),
            Value::Opaque(o) if o.kind == OpaqueKind::Any => {
                Err(EvalError::Opaque(o.token.clone()))
            }
            _ => Ok(false),
        }
    }

    pub fn type_of(&self) -> EvalResult<&'static str> {
        Ok(match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) | Value::Object(_) | Value::Node(_) => "object",
            Value::Func(_) => "function",
            Value::Opaque(o) => match o.kind {
                OpaqueKind::Str => "string",
                OpaqueKind::Num => "number",
                OpaqueKind::Component => "function",
                OpaqueKind::Attrs => "object",
                OpaqueKind::Any => return Err(EvalError::Opaque(o.token.clone())),
            },
        })
    }

    pub fn truthy(&self) -> EvalResult<bool> {
        Ok(match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Node(_) | Value::Func(_) => true,
            Value::Opaque(o) => match o.kind {
                OpaqueKind::Component | OpaqueKind::Attrs => true,
                _ => return Err(EvalError::Opaque(o.token.clone())),
            },
        })
    }

    pub fn to_js_string(&self) -> EvalResult<String> {
        Ok(match self {
            Value::Undefined => "undefined".into(),
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Num(n) => number_to_string(*n),
            Value::Str(s) => s.clone(),
            Value::Array(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    parts.push(match item {
                        Value::Undefined | Value::Null => String::new(),
                        other => other.to_js_string()?,
                    });
                }
                parts.join(",")
            }
            Value::Object(_) | Value::Node(_) => "[object Object]".into(),
            Value::Func(_) => {
                return Err(EvalError::Unsupported("function to string".into()))
            }
            Value::Opaque(o) => return Err(EvalError::Opaque(o.token.clone())),
        })
    }

    pub fn to_number(&self) -> EvalResult<f64> {
        Ok(match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Num(n) => *n,
            Value::Str(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            Value::Array(_) => return Value::Str(self.to_js_string()?).to_number(),
            Value::Object(_) | Value::Node(_) | Value::Func(_) => f64::NAN,
            Value::Opaque(o) => return Err(EvalError::Opaque(o.token.clone())),
        })
    }

    pub fn strict_eq(&self, other: &Value) -> EvalResult<bool> {
        if let Value::Opaque(o) = self {
            return Err(EvalError::Opaque(o.token.clone()));
        }
        if let Value::Opaque(o) = other {
            return Err(EvalError::Opaque(o.token.clone()));
        }
        Ok(match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            // distinct compound values are never identical
            _ => false,
        })
    }

    pub fn loose_eq(&self, other: &Value) -> EvalResult<bool> {
        match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => Ok(true),
            (Value::Undefined | Value::Null, b) | (b, Value::Undefined | Value::Null) => {
                // only null and undefined are loosely equal to each other
                b.is_nullish().map(|_| false)
            }
            (Value::Num(_), Value::Str(_) | Value::Bool(_))
            | (Value::Str(_) | Value::Bool(_), Value::Num(_))
            | (Value::Bool(_), Value::Str(_))
            | (Value::Str(_), Value::Bool(_)) => Ok(self.to_number()? == other.to_number()?),
            _ => self.strict_eq(other),
        }
    }

    /// Property read, `value[key]`.
    pub fn get(&self, key: &str) -> EvalResult<Value> {
        match self {
            Value::Undefined | Value::Null => Err(EvalError::Unsupported(format!(
                "reading `{key}` of {}",
                self.to_js_string()?
            ))),
            Value::Array(items) => {
                if key == "length" {
                    return Ok(Value::Num(items.len() as f64));
                }
                Ok(index_of_key(key)
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or(Value::Undefined))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                if key == "length" {
                    return Ok(Value::Num(chars.len() as f64));
                }
                Ok(index_of_key(key)
                    .and_then(|i| chars.get(i))
                    .map(|c| Value::Str(c.to_string()))
                    .unwrap_or(Value::Undefined))
            }
            Value::Object(map) => Ok(map.get(key).cloned().unwrap_or(Value::Undefined)),
            Value::Node(node) => Ok(node.field(key)),
            Value::Opaque(o) => Err(EvalError::Opaque(o.token.clone())),
            Value::Bool(_) | Value::Num(_) | Value::Func(_) => Ok(Value::Undefined),
        }
    }

    // ---------- JSON bridge ----------

    /// `None` means the value is dropped by `JSON.stringify` (undefined, functions).
    pub fn to_json(&self) -> EvalResult<Option<serde_json::Value>> {
        use serde_json::Value as J;
        Ok(Some(match self {
            Value::Undefined | Value::Func(_) => return Ok(None),
            Value::Null => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::Num(n) => number_to_json(*n),
            Value::Str(s) => J::String(s.clone()),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.to_json()?.unwrap_or(J::Null));
                }
                J::Array(out)
            }
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    if let Some(v) = v.to_json()? {
                        out.insert(k.clone(), v);
                    }
                }
                J::Object(out)
            }
            Value::Node(node) => return Value::Object(node.to_object()).to_json(),
            Value::Opaque(o) => return Err(EvalError::Opaque(o.token.clone())),
        }))
    }

    pub fn from_json(json: serde_json::Value) -> Value {
        use serde_json::Value as J;
        match json {
            J::Null => Value::Null,
            J::Bool(b) => Value::Bool(b),
            J::Number(n) => Value::Num(n.as_f64().unwrap_or(f64::NAN)),
            J::String(s) => Value::Str(s),
            J::Array(items) => Value::Array(items.into_iter().map(Value::from_json).collect()),
            J::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Structural equality used by tests and the round-trip checks. Opaque
    /// values compare by token.
    pub fn deep_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.deep_eq(y))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).map(|w| v.deep_eq(w)).unwrap_or(false))
            }
            (Value::Node(a), Value::Node(b)) => a.deep_eq(b),
            (Value::Node(a), Value::Object(_)) => Value::Object(a.to_object()).deep_eq(other),
            (Value::Object(_), Value::Node(b)) => self.deep_eq(&Value::Object(b.to_object())),
            (Value::Opaque(a), Value::Opaque(b)) => a.token == b.token,
            // functions are compared by their source shape elsewhere
            (Value::Func(_), Value::Func(_)) => true,
            _ => false,
        }
    }
}

fn index_of_key(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse::<usize>().ok()
}

fn number_to_json(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// `Number.prototype.toString()` for the ranges that show up in markup.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.into();
    }
    if n == 0.0 {
        return "0".into();
    }
    let abs = n.abs();
    if n.fract() == 0.0 && abs < 1e21 {
        return format!("{}", n as i128);
    }
    if !(1e-6..1e21).contains(&abs) {
        let s = format!("{:e}", n);
        return match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => s,
        };
    }
    format!("{}", n)
}

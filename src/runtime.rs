use indexmap::IndexMap;

use crate::attrs;
use crate::error::{EvalError, EvalResult};
use crate::literal::{ident_expr, member_expr};
use crate::selector::{self, Selector};
use crate::value::{Opaque, OpaqueKind, Value};

// -----------------------------------------------------------------------------
// Vnode (the objectified shape)
// -----------------------------------------------------------------------------

pub const TEXT_TAG: &str = "#";
pub const TRUST_TAG: &str = "<";
pub const FRAGMENT_TAG: &str = "[";

/// Field order of a serialized vnode. `dom`, `domSize`, `events` and
/// `instance` are only filled in at render time.
pub const VNODE_FIELDS: [&str; 11] = [
    "tag", "key", "attrs", "children", "text", "dom", "domSize", "state", "events", "instance",
    "skip",
];

#[derive(Debug, Clone)]
pub struct Vnode {
    pub tag: Value,
    pub key: Value,
    pub attrs: Value,
    pub children: Value,
    pub text: Value,
}

impl Vnode {
    pub fn new(tag: Value, key: Value, attrs: Value, children: Value, text: Value) -> Self {
        Self {
            tag,
            key,
            attrs,
            children,
            text,
        }
    }

    fn text(children: Value) -> Self {
        Self::new(
            Value::str(TEXT_TAG),
            Value::Undefined,
            Value::Undefined,
            children,
            Value::Undefined,
        )
    }

    pub fn is_text(&self) -> bool {
        matches!(&self.tag, Value::Str(t) if t == TEXT_TAG)
    }

    pub fn field(&self, name: &str) -> Value {
        match name {
            "tag" => self.tag.clone(),
            "key" => self.key.clone(),
            "attrs" => self.attrs.clone(),
            "children" => self.children.clone(),
            "text" => self.text.clone(),
            "state" => Value::Object(IndexMap::new()),
            "skip" => Value::Bool(false),
            _ => Value::Undefined,
        }
    }

    pub fn to_object(&self) -> IndexMap<String, Value> {
        VNODE_FIELDS
            .iter()
            .map(|name| (name.to_string(), self.field(name)))
            .collect()
    }

    pub fn deep_eq(&self, other: &Vnode) -> bool {
        self.tag.deep_eq(&other.tag)
            && self.key.deep_eq(&other.key)
            && self.attrs.deep_eq(&other.attrs)
            && self.children.deep_eq(&other.children)
            && self.text.deep_eq(&other.text)
    }
}

// -----------------------------------------------------------------------------
// Hyperscript
// -----------------------------------------------------------------------------

/// Selector attributes that could not be merged into an attrs object of unknown
/// shape; they are appended to the `Object.assign` call when splicing.
#[derive(Debug, Clone)]
pub struct AttrsBinding {
    pub token: String,
    pub extra: IndexMap<String, Value>,
}

enum Tag {
    Selector(Selector),
    Component(Value),
}

enum AttrsArg {
    Object(IndexMap<String, Value>),
    Bound(Opaque),
}

pub struct Runtime {
    class_key: String,
    pub bindings: Vec<AttrsBinding>,
}

impl Runtime {
    pub fn new(class_key: impl Into<String>) -> Self {
        Self {
            class_key: class_key.into(),
            bindings: vec![],
        }
    }

    /// `m(selector, attrs?, ...children)`
    pub fn hyperscript(&mut self, args: Vec<Value>) -> EvalResult<Value> {
        let tag = match args.first() {
            Some(Value::Str(s)) => Tag::Selector(selector::parse(s)),
            Some(v @ Value::Opaque(o)) if o.kind == OpaqueKind::Component => {
                Tag::Component(v.clone())
            }
            Some(v @ Value::Func(_)) => Tag::Component(v.clone()),
            Some(v @ Value::Object(map)) if matches!(map.get("view"), Some(Value::Func(_))) => {
                Tag::Component(v.clone())
            }
            _ => return Err(EvalError::InvalidSelector),
        };

        let mut start = 2;
        let attrs = match args.get(1) {
            None | Some(Value::Undefined) | Some(Value::Null) => AttrsArg::Object(IndexMap::new()),
            Some(Value::Object(map)) if !tag_is_set(map)? => AttrsArg::Object(map.clone()),
            Some(Value::Opaque(o)) if o.kind == OpaqueKind::Attrs => AttrsArg::Bound(o.clone()),
            Some(Value::Opaque(o)) if o.kind == OpaqueKind::Any => {
                return Err(EvalError::Opaque(o.token.clone()))
            }
            Some(_) => {
                start = 1;
                AttrsArg::Object(IndexMap::new())
            }
        };

        let children = if args.len() == start + 1 {
            match &args[start] {
                Value::Array(items) => items.clone(),
                other => vec![other.clone()],
            }
        } else {
            args.iter().skip(start).cloned().collect()
        };
        let children = normalize_children(children)?;

        let node = match (tag, attrs) {
            (Tag::Selector(sel), AttrsArg::Object(explicit)) => {
                let class_key = attrs::class_key_for(Some(&explicit), &self.class_key);
                let merged = attrs::merge(&sel, &explicit, &class_key)?;
                let key = explicit.get("key").cloned().unwrap_or(Value::Undefined);
                let has_attrs = merged.keys().any(|k| k != "key");
                let (children, text) = split_text(children);
                Vnode::new(
                    Value::Str(sel.tag),
                    key,
                    if has_attrs {
                        Value::Object(merged)
                    } else {
                        Value::Undefined
                    },
                    children,
                    text,
                )
            }
            (Tag::Selector(sel), AttrsArg::Bound(opaque)) => {
                self.bindings.push(AttrsBinding {
                    token: opaque.token.clone(),
                    extra: sel.to_attrs(&self.class_key),
                });
                let (children, text) = split_text(children);
                Vnode::new(
                    Value::Str(sel.tag),
                    bound_key(&opaque),
                    Value::Opaque(opaque),
                    children,
                    text,
                )
            }
            (Tag::Component(component), AttrsArg::Object(explicit)) => {
                let key = explicit.get("key").cloned().unwrap_or(Value::Undefined);
                Vnode::new(
                    component,
                    key,
                    Value::Object(explicit),
                    Value::Array(children),
                    Value::Undefined,
                )
            }
            (Tag::Component(component), AttrsArg::Bound(opaque)) => Vnode::new(
                component,
                bound_key(&opaque),
                Value::Opaque(opaque),
                Value::Array(children),
                Value::Undefined,
            ),
        };

        Ok(Value::Node(Box::new(node)))
    }

    /// `m.trust(html)`
    pub fn trust(&mut self, html: Value) -> EvalResult<Value> {
        let html = match html {
            Value::Undefined | Value::Null => Value::str(""),
            other => other,
        };
        Ok(Value::Node(Box::new(Vnode::new(
            Value::str(TRUST_TAG),
            Value::Undefined,
            Value::Undefined,
            html,
            Value::Undefined,
        ))))
    }

    /// `m.fragment(attrs, children)`
    pub fn fragment(&mut self, attrs: Value, children: Value) -> EvalResult<Value> {
        let key = match &attrs {
            Value::Object(map) => map.get("key").cloned().unwrap_or(Value::Undefined),
            _ => {
                return Err(EvalError::Unsupported(
                    "m.fragment expects an attrs object".into(),
                ))
            }
        };
        let children = match children {
            Value::Array(items) => normalize_children(items)?,
            _ => {
                return Err(EvalError::Unsupported(
                    "m.fragment expects a children array".into(),
                ))
            }
        };
        Ok(Value::Node(Box::new(Vnode::new(
            Value::str(FRAGMENT_TAG),
            key,
            attrs,
            Value::Array(children),
            Value::Undefined,
        ))))
    }
}

fn tag_is_set(map: &IndexMap<String, Value>) -> EvalResult<bool> {
    match map.get("tag") {
        Some(v) => Ok(!v.is_nullish()?),
        None => Ok(false),
    }
}

fn bound_key(opaque: &Opaque) -> Value {
    Value::Opaque(Opaque {
        kind: OpaqueKind::Any,
        token: opaque.token.clone(),
        expr: member_expr(ident_expr(&opaque.token), "key"),
    })
}

/// A lone text child is hoisted into `text`.
fn split_text(mut children: Vec<Value>) -> (Value, Value) {
    if children.len() == 1 && matches!(&children[0], Value::Node(n) if n.is_text()) {
        if let Some(Value::Node(node)) = children.pop() {
            return (Value::Undefined, node.children);
        }
    }
    (Value::Array(children), Value::Undefined)
}

pub fn normalize_children(children: Vec<Value>) -> EvalResult<Vec<Value>> {
    children.into_iter().map(normalize).collect()
}

pub fn normalize(node: Value) -> EvalResult<Value> {
    Ok(match node {
        Value::Array(items) => Value::Node(Box::new(Vnode::new(
            Value::str(FRAGMENT_TAG),
            Value::Undefined,
            Value::Undefined,
            Value::Array(normalize_children(items)?),
            Value::Undefined,
        ))),
        Value::Undefined | Value::Null => node,
        Value::Bool(false) => Value::Node(Box::new(Vnode::text(Value::str("")))),
        Value::Bool(_) | Value::Num(_) | Value::Str(_) | Value::Func(_) => {
            Value::Node(Box::new(Vnode::text(node)))
        }
        Value::Object(_) | Value::Node(_) => node,
        Value::Opaque(ref o) => match o.kind {
            OpaqueKind::Str | OpaqueKind::Num | OpaqueKind::Component => {
                Value::Node(Box::new(Vnode::text(node)))
            }
            OpaqueKind::Attrs => node,
            OpaqueKind::Any => return Err(EvalError::Opaque(o.token.clone())),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(args: Vec<Value>) -> Vnode {
        match Runtime::new("className").hyperscript(args).unwrap() {
            Value::Node(node) => *node,
            other => panic!("expected vnode, got {other:?}"),
        }
    }

    fn obj(pairs: Vec<(&str, Value)>) -> Value {
        Value::Object(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn bare_selector() {
        let node = m(vec![Value::str("div")]);
        assert!(node.tag.deep_eq(&Value::str("div")));
        assert!(node.attrs.is_undefined());
        assert!(node.children.deep_eq(&Value::Array(vec![])));
        assert!(node.text.is_undefined());
    }

    #[test]
    fn id_goes_into_attrs() {
        let node = m(vec![Value::str("#fooga")]);
        assert!(node.attrs.deep_eq(&obj(vec![("id", Value::str("fooga"))])));
    }

    #[test]
    fn single_string_child_becomes_text() {
        let node = m(vec![Value::str("div"), Value::str("fooga")]);
        assert!(node.children.is_undefined());
        assert!(node.text.deep_eq(&Value::str("fooga")));
    }

    #[test]
    fn array_argument_is_the_child_list() {
        let node = m(vec![
            Value::str("div"),
            Value::Array(vec![Value::Num(1.0), Value::Num(2.0)]),
        ]);
        let Value::Array(children) = &node.children else {
            panic!("children should be an array")
        };
        assert_eq!(children.len(), 2);
        assert!(matches!(&children[0], Value::Node(n) if n.is_text()));
    }

    #[test]
    fn nested_arrays_become_fragments() {
        let node = m(vec![
            Value::str("div"),
            Value::Array(vec![Value::Num(1.0)]),
            Value::Array(vec![Value::Num(2.0)]),
        ]);
        let Value::Array(children) = &node.children else {
            panic!("children should be an array")
        };
        assert!(matches!(&children[0], Value::Node(n) if n.tag.deep_eq(&Value::str("["))));
    }

    #[test]
    fn vnode_second_argument_is_a_child() {
        let child = Value::Node(Box::new(m(vec![Value::str("span")])));
        let node = m(vec![Value::str("div"), child]);
        assert!(node.attrs.is_undefined());
        assert!(matches!(&node.children, Value::Array(c) if c.len() == 1));
    }

    #[test]
    fn key_only_attrs_are_dropped() {
        let node = m(vec![Value::str("li"), obj(vec![("key", Value::Num(3.0))])]);
        assert!(node.key.deep_eq(&Value::Num(3.0)));
        assert!(node.attrs.is_undefined());
    }

    #[test]
    fn false_child_is_empty_text() {
        let node = m(vec![Value::str("div"), Value::Bool(false)]);
        assert!(node.text.deep_eq(&Value::str("")));
    }

    #[test]
    fn component_keeps_attrs_object() {
        let component = Value::Opaque(Opaque {
            kind: OpaqueKind::Component,
            token: "C".into(),
            expr: ident_expr("C"),
        });
        let node = m(vec![component, obj(vec![("x", Value::Num(1.0))])]);
        assert!(node.attrs.deep_eq(&obj(vec![("x", Value::Num(1.0))])));
        assert!(node.children.deep_eq(&Value::Array(vec![])));
        assert!(node.text.is_undefined());
    }

    #[test]
    fn non_string_selector_throws() {
        let err = Runtime::new("className").hyperscript(vec![Value::Num(6.0)]);
        assert!(matches!(err, Err(EvalError::InvalidSelector)));
    }

    #[test]
    fn trust_defaults_to_empty_string() {
        let Value::Node(node) = Runtime::new("className").trust(Value::Null).unwrap() else {
            panic!("expected vnode")
        };
        assert!(node.tag.deep_eq(&Value::str("<")));
        assert!(node.children.deep_eq(&Value::str("")));
    }

    #[test]
    fn bound_attrs_record_selector_extras() {
        let bound = Value::Opaque(Opaque {
            kind: OpaqueKind::Attrs,
            token: "A".into(),
            expr: ident_expr("A"),
        });
        let mut runtime = Runtime::new("className");
        runtime
            .hyperscript(vec![Value::str("span[x=y]"), bound, Value::str("a")])
            .unwrap();
        assert_eq!(runtime.bindings.len(), 1);
        assert!(runtime.bindings[0].extra["x"].deep_eq(&Value::str("y")));
    }
}

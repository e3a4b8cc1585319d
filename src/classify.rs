use swc_core::ecma::ast::*;

use crate::literal::prop_name_str;
use crate::value::{number_to_string, Value};

/// Array methods whose result is always a new array.
const ARRAY_RETURNING: &[&str] = &[
    "map", "filter", "sort", "slice", "concat", "reverse", "flat", "flatMap", "fill",
];

/// Everything the evaluator knows how to run on an array receiver.
const ARRAY_METHODS: &[&str] = &[
    "map", "filter", "forEach", "some", "every", "find", "findIndex", "indexOf", "includes",
    "join", "slice", "concat", "reverse", "sort", "flat", "flatMap", "fill",
];

const STRING_METHODS: &[&str] = &[
    "replace", "toUpperCase", "toLowerCase", "trim", "slice", "substring", "split", "concat",
    "indexOf", "includes", "startsWith", "endsWith", "repeat", "charAt",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Str,
    Num,
}

// -----------------------------------------------------------------------------
// Literals
// -----------------------------------------------------------------------------

fn unparen(expr: &Expr) -> &Expr {
    match expr {
        Expr::Paren(p) => unparen(&p.expr),
        other => other,
    }
}

pub fn is_literal_scalar(expr: &Expr) -> bool {
    match unparen(expr) {
        Expr::Lit(Lit::Str(_) | Lit::Num(_) | Lit::Bool(_) | Lit::Null(_)) => true,
        Expr::Ident(i) => &*i.sym == "undefined",
        Expr::Tpl(t) => t.exprs.is_empty(),
        Expr::Unary(u) => {
            matches!(u.op, UnaryOp::Minus | UnaryOp::Plus)
                && matches!(unparen(&u.arg), Expr::Lit(Lit::Num(_)))
        }
        _ => false,
    }
}

pub fn literal_kind(expr: &Expr) -> Option<LiteralKind> {
    match unparen(expr) {
        Expr::Lit(Lit::Str(_)) => Some(LiteralKind::Str),
        Expr::Tpl(t) if t.exprs.is_empty() => Some(LiteralKind::Str),
        Expr::Lit(Lit::Num(_)) => Some(LiteralKind::Num),
        Expr::Unary(u)
            if matches!(u.op, UnaryOp::Minus | UnaryOp::Plus)
                && matches!(unparen(&u.arg), Expr::Lit(Lit::Num(_))) =>
        {
            Some(LiteralKind::Num)
        }
        _ => None,
    }
}

/// Scalar literal, or arrays/objects built only from them.
pub fn is_static_literal(expr: &Expr) -> bool {
    match unparen(expr) {
        Expr::Array(a) => a.elems.iter().all(|el| match el {
            Some(ExprOrSpread { spread: None, expr }) => is_static_literal(expr),
            Some(_) => false,
            None => true,
        }),
        Expr::Object(o) => o.props.iter().all(|p| match p {
            PropOrSpread::Prop(p) => match &**p {
                Prop::KeyValue(kv) => {
                    !matches!(kv.key, PropName::Computed(_)) && is_static_literal(&kv.value)
                }
                _ => false,
            },
            PropOrSpread::Spread(_) => false,
        }),
        other => is_literal_scalar(other),
    }
}

/// Value of a literal scalar, if `expr` is one.
pub fn literal_value(expr: &Expr) -> Option<Value> {
    Some(match unparen(expr) {
        Expr::Lit(Lit::Str(s)) => Value::Str(s.value.to_string()),
        Expr::Lit(Lit::Num(n)) => Value::Num(n.value),
        Expr::Lit(Lit::Bool(b)) => Value::Bool(b.value),
        Expr::Lit(Lit::Null(_)) => Value::Null,
        Expr::Ident(i) if &*i.sym == "undefined" => Value::Undefined,
        Expr::Tpl(t) if t.exprs.is_empty() => Value::Str(
            t.quasis
                .iter()
                .map(|q| {
                    q.cooked
                        .as_ref()
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| q.raw.to_string())
                })
                .collect(),
        ),
        Expr::Unary(u) if u.op == UnaryOp::Minus => match unparen(&u.arg) {
            Expr::Lit(Lit::Num(n)) => Value::Num(-n.value),
            _ => return None,
        },
        Expr::Unary(u) if u.op == UnaryOp::Plus => match unparen(&u.arg) {
            Expr::Lit(Lit::Num(n)) => Value::Num(n.value),
            _ => return None,
        },
        _ => return None,
    })
}

// -----------------------------------------------------------------------------
// Known calls
// -----------------------------------------------------------------------------

/// Name of a member written as `.name` or `["name"]`.
pub fn method_name(prop: &MemberProp) -> Option<&str> {
    match prop {
        MemberProp::Ident(i) => Some(i.sym.as_ref()),
        MemberProp::Computed(c) => match unparen(&c.expr) {
            Expr::Lit(Lit::Str(s)) => Some(s.value.as_ref()),
            _ => None,
        },
        MemberProp::PrivateName(_) => None,
    }
}

fn member_call<'a>(call: &'a CallExpr) -> Option<(&'a Expr, &'a str)> {
    let Callee::Expr(callee) = &call.callee else {
        return None;
    };
    match unparen(callee) {
        Expr::Member(MemberExpr { obj, prop, .. }) => Some((unparen(obj), method_name(prop)?)),
        _ => None,
    }
}

fn is_global_method(call: &CallExpr, object: &str, method: &str) -> bool {
    matches!(
        member_call(call),
        Some((Expr::Ident(obj), name)) if &*obj.sym == object && name == method
    )
}

pub fn is_json_stringify(call: &CallExpr) -> bool {
    is_global_method(call, "JSON", "stringify")
}

pub fn is_json_parse(call: &CallExpr) -> bool {
    is_global_method(call, "JSON", "parse")
}

/// `Object.assign({...}, ...)` over an object-literal base.
pub fn is_object_assign(call: &CallExpr) -> bool {
    is_global_method(call, "Object", "assign")
        && matches!(
            call.args.first(),
            Some(ExprOrSpread { spread: None, expr }) if matches!(unparen(expr), Expr::Object(_))
        )
}

pub fn array_method(name: &str) -> bool {
    ARRAY_METHODS.contains(&name)
}

pub fn string_method(name: &str) -> bool {
    STRING_METHODS.contains(&name)
}

/// Array-returning method call on an array literal (or on another such call).
pub fn is_array_returning(expr: &Expr) -> bool {
    let Expr::Call(call) = unparen(expr) else {
        return false;
    };
    match member_call(call) {
        Some((receiver, method)) if ARRAY_RETURNING.contains(&method) => {
            matches!(receiver, Expr::Array(_)) || is_array_returning(receiver)
        }
        _ => false,
    }
}

// -----------------------------------------------------------------------------
// Call sites
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalleeKind {
    /// `m(...)`
    Plain,
    /// `m.trust(...)`
    Trusted,
    /// `m.fragment(...)`
    Fragment,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectorArg {
    /// A string literal or a `+` chain of literals, already resolved.
    Static(String),
    /// Concatenation involving something unknown.
    Dynamic,
    /// Capitalized identifier used as the tag.
    Component(String),
    /// Trusted and fragment calls carry no selector.
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    pub kind: CalleeKind,
    pub selector: SelectorArg,
}

/// Recognize `pragma(...)`, `pragma.trust(...)` and `pragma.fragment(...)`.
pub fn call_site(call: &CallExpr, pragma: &str) -> Option<CallSite> {
    let Callee::Expr(callee) = &call.callee else {
        return None;
    };
    if call.args.iter().any(|a| a.spread.is_some()) {
        return None;
    }

    match unparen(callee) {
        Expr::Ident(i) if &*i.sym == pragma => {
            let first = call.args.first()?;
            let selector = match unparen(&first.expr) {
                Expr::Ident(id) if starts_uppercase(&id.sym) => {
                    SelectorArg::Component(id.sym.to_string())
                }
                e @ (Expr::Lit(Lit::Str(_)) | Expr::Tpl(_) | Expr::Bin(_)) => {
                    match concat_literals(e) {
                        Some(Value::Str(s)) => SelectorArg::Static(s),
                        Some(_) => return None,
                        None if matches!(e, Expr::Bin(BinExpr { op: BinaryOp::Add, .. })) => {
                            SelectorArg::Dynamic
                        }
                        None if matches!(e, Expr::Tpl(_)) => SelectorArg::Dynamic,
                        None => return None,
                    }
                }
                _ => return None,
            };
            Some(CallSite {
                kind: CalleeKind::Plain,
                selector,
            })
        }
        Expr::Member(MemberExpr {
            obj,
            prop: MemberProp::Ident(prop),
            ..
        }) if matches!(unparen(obj), Expr::Ident(i) if &*i.sym == pragma) => {
            let kind = match prop.sym.as_ref() {
                "trust" => CalleeKind::Trusted,
                "fragment" => CalleeKind::Fragment,
                _ => return None,
            };
            Some(CallSite {
                kind,
                selector: SelectorArg::None,
            })
        }
        _ => None,
    }
}

fn starts_uppercase(sym: &str) -> bool {
    sym.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

/// Fold a `+` chain of literal operands the way JS would.
pub fn concat_literals(expr: &Expr) -> Option<Value> {
    match unparen(expr) {
        Expr::Bin(BinExpr {
            op: BinaryOp::Add,
            left,
            right,
            ..
        }) => {
            let l = concat_literals(left)?;
            let r = concat_literals(right)?;
            match (&l, &r) {
                (Value::Num(a), Value::Num(b)) => Some(Value::Num(a + b)),
                _ if matches!(l, Value::Str(_)) || matches!(r, Value::Str(_)) => {
                    let (l, r) = (l.to_js_string().ok()?, r.to_js_string().ok()?);
                    Some(Value::Str(format!("{l}{r}")))
                }
                _ => None,
            }
        }
        other => literal_value(other),
    }
}

// -----------------------------------------------------------------------------
// Static gate
// -----------------------------------------------------------------------------

/// Whether `expr` can be evaluated from its literal content alone: no free
/// identifiers, only calls the evaluator knows.
pub fn is_static_expr(expr: &Expr, pragma: &str) -> bool {
    StaticGate {
        pragma,
        bound: vec![],
    }
    .check(expr)
}

struct StaticGate<'a> {
    pragma: &'a str,
    bound: Vec<String>,
}

impl StaticGate<'_> {
    fn check(&mut self, expr: &Expr) -> bool {
        match expr {
            Expr::Lit(Lit::Str(_) | Lit::Num(_) | Lit::Bool(_) | Lit::Null(_)) => true,
            Expr::Lit(_) => false,
            Expr::Ident(i) => {
                matches!(i.sym.as_ref(), "undefined" | "NaN" | "Infinity")
                    || self.bound.iter().any(|b| *b == *i.sym)
            }
            Expr::Tpl(t) => t.exprs.iter().all(|e| self.check(e)),
            Expr::Array(a) => a
                .elems
                .iter()
                .all(|el| el.as_ref().map(|el| self.check(&el.expr)).unwrap_or(true)),
            Expr::Object(o) => o.props.iter().all(|p| match p {
                PropOrSpread::Spread(s) => self.check(&s.expr),
                PropOrSpread::Prop(p) => match &**p {
                    Prop::KeyValue(kv) => {
                        let key_ok = match &kv.key {
                            PropName::Computed(c) => self.check(&c.expr),
                            other => prop_name_str(other).is_some(),
                        };
                        key_ok && self.check(&kv.value)
                    }
                    Prop::Shorthand(i) => self.bound.iter().any(|b| *b == *i.sym),
                    _ => false,
                },
            }),
            Expr::Unary(u) => u.op != UnaryOp::Delete && self.check(&u.arg),
            Expr::Bin(b) => {
                !matches!(b.op, BinaryOp::In | BinaryOp::InstanceOf)
                    && self.check(&b.left)
                    && self.check(&b.right)
            }
            Expr::Cond(c) => self.check(&c.test) && self.check(&c.cons) && self.check(&c.alt),
            Expr::Seq(s) => s.exprs.iter().all(|e| self.check(e)),
            Expr::Paren(p) => self.check(&p.expr),
            Expr::Member(m) => {
                self.check(&m.obj)
                    && match &m.prop {
                        MemberProp::Ident(_) => true,
                        MemberProp::Computed(c) => self.check(&c.expr),
                        MemberProp::PrivateName(_) => false,
                    }
            }
            Expr::Call(call) => self.check_call(call),
            Expr::Arrow(arrow) => {
                let Some(params) = simple_params(arrow.params.iter()) else {
                    return false;
                };
                if arrow.is_async || arrow.is_generator {
                    return false;
                }
                self.with_bound(params, |gate| match &*arrow.body {
                    BlockStmtOrExpr::Expr(e) => gate.check(e),
                    BlockStmtOrExpr::BlockStmt(b) => gate.check_block(b),
                })
            }
            Expr::Fn(f) => {
                let function = &f.function;
                let Some(params) = simple_params(function.params.iter().map(|p| &p.pat)) else {
                    return false;
                };
                if function.is_async || function.is_generator {
                    return false;
                }
                self.with_bound(params, |gate| {
                    function
                        .body
                        .as_ref()
                        .map(|b| gate.check_block(b))
                        .unwrap_or(true)
                })
            }
            _ => false,
        }
    }

    fn check_call(&mut self, call: &CallExpr) -> bool {
        let args_ok = |gate: &mut Self| {
            call.args
                .iter()
                .all(|a| a.spread.is_none() && gate.check(&a.expr))
        };
        let Callee::Expr(callee) = &call.callee else {
            return false;
        };
        match unparen(callee) {
            Expr::Ident(i) if *i.sym == *self.pragma => args_ok(self),
            Expr::Member(MemberExpr { obj, prop, .. }) => {
                let Some(method) = method_name(prop) else {
                    return self.check(unparen(callee)) && args_ok(self);
                };
                match unparen(obj) {
                    Expr::Ident(o) if *o.sym == *self.pragma => {
                        matches!(method, "trust" | "fragment") && args_ok(self)
                    }
                    Expr::Ident(o) if &*o.sym == "JSON" => {
                        matches!(method, "stringify" | "parse") && args_ok(self)
                    }
                    Expr::Ident(o) if &*o.sym == "Object" && !self.is_bound("Object") => {
                        method == "assign" && args_ok(self)
                    }
                    receiver => {
                        let array_ok = array_method(method) && self.array_receiver(receiver);
                        (array_ok || string_method(method)) && self.check(receiver) && args_ok(self)
                    }
                }
            }
            callee => self.check(callee) && args_ok(self),
        }
    }

    /// Receivers known to be arrays before anything runs. Callback
    /// parameters are left to the evaluator.
    fn array_receiver(&self, receiver: &Expr) -> bool {
        match receiver {
            Expr::Array(_) => true,
            Expr::Ident(i) => self.is_bound(&i.sym),
            Expr::Call(call) => {
                is_array_returning(receiver)
                    || matches!(member_call(call), Some((_, "split")))
            }
            _ => false,
        }
    }

    fn check_block(&mut self, block: &BlockStmt) -> bool {
        match block.stmts.as_slice() {
            [] => true,
            [Stmt::Return(ReturnStmt { arg, .. })] => {
                arg.as_ref().map(|a| self.check(a)).unwrap_or(true)
            }
            _ => false,
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        self.bound.iter().any(|b| b == name)
    }

    fn with_bound(&mut self, names: Vec<String>, f: impl FnOnce(&mut Self) -> bool) -> bool {
        let depth = self.bound.len();
        self.bound.extend(names);
        let ok = f(self);
        self.bound.truncate(depth);
        ok
    }
}

/// Parameter names when every parameter is a plain identifier.
pub fn simple_params<'a>(params: impl Iterator<Item = &'a Pat>) -> Option<Vec<String>> {
    params
        .map(|p| match p {
            Pat::Ident(b) => Some(b.id.sym.to_string()),
            _ => None,
        })
        .collect()
}

/// JS property key for a computed member/prop value.
pub fn property_key(value: &Value) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.clone()),
        Value::Num(n) => Some(number_to_string(*n)),
        Value::Bool(_) | Value::Null | Value::Undefined => value.to_js_string().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::parse_expr;

    fn expr(src: &str) -> Box<Expr> {
        parse_expr(src).unwrap()
    }

    fn call(src: &str) -> CallExpr {
        match *expr(src) {
            Expr::Call(c) => c,
            other => panic!("not a call: {other:?}"),
        }
    }

    #[test]
    fn literal_scalars() {
        for src in ["'a'", "1", "-1", "true", "null", "undefined", "`x`"] {
            assert!(is_literal_scalar(&expr(src)), "{src}");
        }
        for src in ["a", "`${a}`", "[1]", "-a"] {
            assert!(!is_literal_scalar(&expr(src)), "{src}");
        }
    }

    #[test]
    fn literal_kinds() {
        assert_eq!(literal_kind(&expr("'a'")), Some(LiteralKind::Str));
        assert_eq!(literal_kind(&expr("-2")), Some(LiteralKind::Num));
        assert_eq!(literal_kind(&expr("true")), None);
    }

    #[test]
    fn static_literals_nest() {
        assert!(is_static_literal(&expr("({a: [1, 'b', {c: null}]})")));
        assert!(!is_static_literal(&expr("({a: [1, b]})")));
        assert!(!is_static_literal(&expr("({[a]: 1})")));
    }

    #[test]
    fn array_returning_calls() {
        assert!(is_array_returning(&expr("[1, 2].filter(v => v)")));
        assert!(is_array_returning(&expr("[1, 2].map(v => v).reverse()")));
        assert!(!is_array_returning(&expr("[1, 2].some(v => v)")));
        assert!(!is_array_returning(&expr("[1, 2].forEach(v => v)")));
        assert!(!is_array_returning(&expr("a.map(v => v)")));
    }

    #[test]
    fn known_global_calls() {
        assert!(is_json_stringify(&call("JSON.stringify(a)")));
        assert!(is_json_parse(&call("JSON.parse('{}')")));
        assert!(is_object_assign(&call("Object.assign({}, a)")));
        assert!(!is_object_assign(&call("Object.assign(a, b)")));
    }

    #[test]
    fn call_site_shapes() {
        let site = call_site(&call("m('input' + '.pure-u')"), "m").unwrap();
        assert_eq!(site.selector, SelectorArg::Static("input.pure-u".into()));

        let site = call_site(&call("m('.fooga' + x)"), "m").unwrap();
        assert_eq!(site.selector, SelectorArg::Dynamic);

        let site = call_site(&call("m(Component, {x: 1})"), "m").unwrap();
        assert_eq!(site.selector, SelectorArg::Component("Component".into()));

        assert_eq!(call_site(&call("m.trust('<b>')"), "m").unwrap().kind, CalleeKind::Trusted);
        assert_eq!(
            call_site(&call("m.fragment({}, [])"), "m").unwrap().kind,
            CalleeKind::Fragment
        );

        assert!(call_site(&call("m(tag)"), "m").is_none());
        assert!(call_site(&call("m(...args)"), "m").is_none());
        assert!(call_site(&call("h('div')"), "m").is_none());
        assert!(call_site(&call("h('div')"), "h").is_some());
    }

    #[test]
    fn static_gate() {
        assert!(is_static_expr(&expr("m('div', [1, 2].filter(v => v === 1))"), "m"));
        assert!(is_static_expr(&expr("m('div', JSON.stringify({a: 1}))"), "m"));
        assert!(is_static_expr(&expr("m('div', 'a'.toUpperCase())"), "m"));
        assert!(!is_static_expr(&expr("m('div', {fooga: unknownIdentifier})"), "m"));
        assert!(!is_static_expr(&expr("m('div', [1, x].sort())"), "m"));
        assert!(!is_static_expr(&expr("m('div', foo())"), "m"));
    }

    #[test]
    fn computed_method_keys() {
        assert!(is_static_expr(&expr("m('div', 'fooga'['replace']('f', 'g'))"), "m"));
        assert!(is_static_expr(&expr("m('div', [1, 2]['join'](''))"), "m"));
        assert!(!is_static_expr(&expr("m('div', [x, 2]['join'](''))"), "m"));
        assert!(!is_static_expr(&expr("m('div', [1, 2][name](''))"), "m"));
        assert!(is_json_stringify(&call("JSON['stringify'](a)")));
        assert!(is_array_returning(&expr("[2, 1]['sort']()")));
    }

    #[test]
    fn array_methods_need_array_receivers() {
        assert!(is_static_expr(&expr("m('ul', [[1], [2]].map(a => a.map(v => v)))"), "m"));
        assert!(is_static_expr(&expr("m('ul', 'a,b'.split(',').map(v => v))"), "m"));
        assert!(is_static_expr(&expr("m('ul', [3, 1].sort().join(''))"), "m"));
        assert!(!is_static_expr(&expr("m('ul', 'ab'.map(v => v))"), "m"));
        assert!(!is_static_expr(&expr("m('ul', ({a: 1}).filter(v => v))"), "m"));
    }
}

use regex::Regex;
use std::sync::LazyLock;
use swc_core::{
    common::{SyntaxContext, DUMMY_SP},
    ecma::ast::*,
};

use crate::error::{EvalError, EvalResult};
use crate::runtime::VNODE_FIELDS;
use crate::value::{FnBody, Value};

static IDENT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier regex"));

// -----------------------------------------------------------------------------
// Node builders
// -----------------------------------------------------------------------------

pub fn ident(sym: &str) -> Ident {
    Ident::new(sym.into(), DUMMY_SP, SyntaxContext::empty())
}

pub fn ident_expr(sym: &str) -> Box<Expr> {
    Box::new(Expr::Ident(ident(sym)))
}

pub fn str_expr(value: &str) -> Box<Expr> {
    Box::new(Expr::Lit(Lit::Str(Str {
        span: DUMMY_SP,
        value: value.into(),
        raw: None,
    })))
}

pub fn num_expr(value: f64) -> Box<Expr> {
    let lit = Box::new(Expr::Lit(Lit::Num(Number {
        span: DUMMY_SP,
        value: value.abs(),
        raw: None,
    })));
    if value.is_sign_negative() && value != 0.0 {
        Box::new(Expr::Unary(UnaryExpr {
            span: DUMMY_SP,
            op: UnaryOp::Minus,
            arg: lit,
        }))
    } else {
        lit
    }
}

pub fn member_expr(obj: Box<Expr>, prop: &str) -> Box<Expr> {
    Box::new(Expr::Member(MemberExpr {
        span: DUMMY_SP,
        obj,
        prop: MemberProp::Ident(IdentName::new(prop.into(), DUMMY_SP)),
    }))
}

pub fn paren_expr(expr: Box<Expr>) -> Box<Expr> {
    Box::new(Expr::Paren(ParenExpr {
        span: DUMMY_SP,
        expr,
    }))
}

/// `left + right`, parenthesizing a right operand that binds looser than `+`.
pub fn concat_expr(left: Box<Expr>, right: Box<Expr>) -> Box<Expr> {
    let right = match *right {
        Expr::Cond(_)
        | Expr::Bin(_)
        | Expr::Seq(_)
        | Expr::Assign(_)
        | Expr::Arrow(_)
        | Expr::Yield(_) => paren_expr(right),
        _ => right,
    };
    Box::new(Expr::Bin(BinExpr {
        span: DUMMY_SP,
        op: BinaryOp::Add,
        left,
        right,
    }))
}

pub fn prop_name(key: &str) -> PropName {
    if IDENT_NAME.is_match(key) {
        PropName::Ident(IdentName::new(key.into(), DUMMY_SP))
    } else {
        PropName::Str(Str {
            span: DUMMY_SP,
            value: key.into(),
            raw: None,
        })
    }
}

pub fn key_value(key: &str, value: Box<Expr>) -> PropOrSpread {
    PropOrSpread::Prop(Box::new(Prop::KeyValue(KeyValueProp {
        key: prop_name(key),
        value,
    })))
}

pub fn object_expr(props: Vec<PropOrSpread>) -> Box<Expr> {
    Box::new(Expr::Object(ObjectLit {
        span: DUMMY_SP,
        props,
    }))
}

/// Static name of a property key, if it has one.
pub fn prop_name_str(name: &PropName) -> Option<String> {
    match name {
        PropName::Ident(i) => Some(i.sym.to_string()),
        PropName::Str(s) => Some(s.value.to_string()),
        PropName::Num(n) => Some(crate::value::number_to_string(n.value)),
        PropName::Computed(_) | PropName::BigInt(_) => None,
    }
}

// -----------------------------------------------------------------------------
// Value -> literal expression
// -----------------------------------------------------------------------------

pub fn value_to_expr(value: &Value) -> EvalResult<Box<Expr>> {
    Ok(match value {
        Value::Undefined => ident_expr("undefined"),
        Value::Null => Box::new(Expr::Lit(Lit::Null(Null { span: DUMMY_SP }))),
        Value::Bool(b) => Box::new(Expr::Lit(Lit::Bool(Bool {
            span: DUMMY_SP,
            value: *b,
        }))),
        Value::Num(n) if n.is_nan() => ident_expr("NaN"),
        Value::Num(n) if n.is_infinite() => {
            if *n > 0.0 {
                ident_expr("Infinity")
            } else {
                Box::new(Expr::Unary(UnaryExpr {
                    span: DUMMY_SP,
                    op: UnaryOp::Minus,
                    arg: ident_expr("Infinity"),
                }))
            }
        }
        Value::Num(n) => num_expr(*n),
        Value::Str(s) => str_expr(s),
        Value::Array(items) => {
            let mut elems = Vec::with_capacity(items.len());
            for item in items {
                elems.push(Some(ExprOrSpread {
                    spread: None,
                    expr: value_to_expr(item)?,
                }));
            }
            Box::new(Expr::Array(ArrayLit {
                span: DUMMY_SP,
                elems,
            }))
        }
        Value::Object(map) => {
            let mut props = Vec::with_capacity(map.len());
            for (k, v) in map {
                props.push(key_value(k, value_to_expr(v)?));
            }
            object_expr(props)
        }
        Value::Node(node) => {
            let mut props = Vec::with_capacity(VNODE_FIELDS.len());
            for name in VNODE_FIELDS {
                props.push(key_value(name, value_to_expr(&node.field(name))?));
            }
            object_expr(props)
        }
        Value::Func(closure) => {
            if !closure.env.is_empty() {
                return Err(EvalError::Unsupported(
                    "function closing over evaluated locals".into(),
                ));
            }
            if matches!(closure.body, FnBody::Unsupported) {
                log::trace!("emitting uninterpreted function verbatim");
            }
            closure.source.clone()
        }
        Value::Opaque(o) => o.expr.clone(),
    })
}

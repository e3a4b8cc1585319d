use swc_core::{
    common::{SyntaxContext, DUMMY_SP},
    ecma::{
        ast::*,
        visit::{VisitMut, VisitMutWith},
    },
};

use crate::classify::{self, LiteralKind};
use crate::config::Config;
use crate::context::{Context, PlaceholderMatch};
use crate::error::ObjectifyError;
use crate::literal::{ident, ident_expr, paren_expr};
use crate::value::OpaqueKind;

// -----------------------------------------------------------------------------
// Rule pipeline
// -----------------------------------------------------------------------------

/// A substitution step and its inverse.
///
/// `substitute` swaps sub-expressions of one call for placeholder nodes and
/// records the originals in the context; `splice` puts them back into the
/// evaluated literal.
pub trait Rule {
    fn name(&self) -> &'static str;

    /// Applied once, to the call node itself, before the traversal rules.
    fn top_level_only(&self) -> bool {
        false
    }

    /// Returns the number of placeholders introduced.
    fn substitute(&self, call: &mut CallExpr, cx: &mut Context, config: &Config) -> usize;

    fn splice(&self, expr: &mut Box<Expr>, cx: &mut Context) -> Result<(), ObjectifyError> {
        splice_tokens(self.name(), expr, cx);
        Ok(())
    }
}

/// The fixed rule order: top-level rules first, then the traversal rules.
pub fn pipeline(config: &Config) -> Vec<Box<dyn Rule>> {
    let mut rules: Vec<Box<dyn Rule>> = vec![Box::new(ComponentTag)];
    if config.assign_never_component {
        rules.push(Box::new(ObjectAssignAttrs));
    }
    rules.push(Box::new(JsonStringify));
    rules.push(Box::new(AttrsObject));
    rules.push(Box::new(LiteralConditional));
    rules
}

fn is_pragma(callee: &Callee, pragma: &str) -> bool {
    matches!(callee, Callee::Expr(e) if matches!(&**e, Expr::Ident(i) if *i.sym == *pragma))
}

fn is_pragma_member(callee: &Callee, pragma: &str, member: &str) -> bool {
    let Callee::Expr(e) = callee else {
        return false;
    };
    matches!(
        &**e,
        Expr::Member(MemberExpr { obj, prop: MemberProp::Ident(p), .. })
            if matches!(&**obj, Expr::Ident(i) if *i.sym == *pragma) && &*p.sym == member
    )
}

// -----------------------------------------------------------------------------
// (d) component tag
// -----------------------------------------------------------------------------

pub struct ComponentTag;

impl Rule for ComponentTag {
    fn name(&self) -> &'static str {
        "component"
    }

    fn top_level_only(&self) -> bool {
        true
    }

    fn substitute(&self, call: &mut CallExpr, cx: &mut Context, config: &Config) -> usize {
        if !is_pragma(&call.callee, &config.pragma) {
            return 0;
        }
        let Some(first) = call.args.first_mut() else {
            return 0;
        };
        let is_component = matches!(
            &*first.expr,
            Expr::Ident(i) if i.sym.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        );
        if !is_component {
            return 0;
        }
        let original = std::mem::replace(&mut first.expr, ident_expr("undefined"));
        first.expr = cx.fresh(self.name(), OpaqueKind::Component, original);
        1
    }
}

// -----------------------------------------------------------------------------
// (e) Object.assign attrs
// -----------------------------------------------------------------------------

pub struct ObjectAssignAttrs;

impl Rule for ObjectAssignAttrs {
    fn name(&self) -> &'static str {
        "object-assign"
    }

    fn top_level_only(&self) -> bool {
        true
    }

    fn substitute(&self, call: &mut CallExpr, cx: &mut Context, config: &Config) -> usize {
        if !is_pragma(&call.callee, &config.pragma) {
            return 0;
        }
        let Some(attrs) = call.args.get_mut(1) else {
            return 0;
        };
        match &*attrs.expr {
            Expr::Call(assign) if classify::is_object_assign(assign) => {}
            _ => return 0,
        }
        let original = std::mem::replace(&mut attrs.expr, ident_expr("undefined"));
        attrs.expr = cx.fresh(self.name(), OpaqueKind::Attrs, original);
        1
    }

    /// `(function(binding){return <vnode>;})(Object.assign(..., <selector attrs>))`
    fn splice(&self, expr: &mut Box<Expr>, cx: &mut Context) -> Result<(), ObjectifyError> {
        for m in cx.pending(self.name()) {
            let Expr::Object(vnode) = &**expr else {
                return Err(ObjectifyError::splice(self.name(), "result is not a vnode literal"));
            };
            let bound_as_attrs = vnode.props.iter().any(|p| match p {
                PropOrSpread::Prop(p) => matches!(
                    &**p,
                    Prop::KeyValue(KeyValueProp { key: PropName::Ident(k), value })
                        if &*k.sym == "attrs"
                            && matches!(&**value, Expr::Ident(i) if *i.sym == *m.token)
                ),
                PropOrSpread::Spread(_) => false,
            });
            if !bound_as_attrs {
                return Err(ObjectifyError::splice(
                    self.name(),
                    format!("{} is not the attrs of the vnode", m.token),
                ));
            }

            let binding = cx.binding_name();
            expr.visit_mut_with(&mut Rename {
                from: &m.token,
                to: &binding,
            });

            let mut assign = m.original.clone();
            if let (Expr::Call(call), Some(aux)) = (&mut *assign, m.aux.clone()) {
                if !matches!(&*aux, Expr::Object(o) if o.props.is_empty()) {
                    call.args.push(ExprOrSpread {
                        spread: None,
                        expr: aux,
                    });
                }
            }

            let body = std::mem::replace(expr, ident_expr("undefined"));
            *expr = iife(&binding, body, assign);
            cx.consume(&m.token);
        }
        Ok(())
    }
}

fn iife(param: &str, body: Box<Expr>, arg: Box<Expr>) -> Box<Expr> {
    let function = Function {
        params: vec![Param {
            span: DUMMY_SP,
            decorators: vec![],
            pat: Pat::Ident(BindingIdent {
                id: ident(param),
                type_ann: None,
            }),
        }],
        decorators: vec![],
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        body: Some(BlockStmt {
            span: DUMMY_SP,
            ctxt: SyntaxContext::empty(),
            stmts: vec![Stmt::Return(ReturnStmt {
                span: DUMMY_SP,
                arg: Some(body),
            })],
        }),
        is_generator: false,
        is_async: false,
        type_params: None,
        return_type: None,
    };
    Box::new(Expr::Call(CallExpr {
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        callee: Callee::Expr(paren_expr(Box::new(Expr::Fn(FnExpr {
            ident: None,
            function: Box::new(function),
        })))),
        args: vec![ExprOrSpread {
            spread: None,
            expr: arg,
        }],
        type_args: None,
    }))
}

struct Rename<'a> {
    from: &'a str,
    to: &'a str,
}

impl VisitMut for Rename<'_> {
    fn visit_mut_ident(&mut self, i: &mut Ident) {
        if *i.sym == *self.from {
            i.sym = self.to.into();
        }
    }
}

// -----------------------------------------------------------------------------
// (a) JSON.stringify
// -----------------------------------------------------------------------------

pub struct JsonStringify;

impl Rule for JsonStringify {
    fn name(&self) -> &'static str {
        "json-stringify"
    }

    fn substitute(&self, call: &mut CallExpr, cx: &mut Context, _config: &Config) -> usize {
        let mut v = Substitute {
            cx,
            count: 0,
            rule: self.name(),
            pick: |e: &Expr| match e {
                Expr::Call(c) if classify::is_json_stringify(c) => Some(OpaqueKind::Str),
                _ => None,
            },
        };
        call.visit_mut_children_with(&mut v);
        v.count
    }
}

// -----------------------------------------------------------------------------
// (c) conditional between literals of one kind
// -----------------------------------------------------------------------------

pub struct LiteralConditional;

impl Rule for LiteralConditional {
    fn name(&self) -> &'static str {
        "literal-conditional"
    }

    fn substitute(&self, call: &mut CallExpr, cx: &mut Context, _config: &Config) -> usize {
        let mut v = Substitute {
            cx,
            count: 0,
            rule: self.name(),
            pick: |e: &Expr| match e {
                Expr::Cond(c) => {
                    match (classify::literal_kind(&c.cons), classify::literal_kind(&c.alt)) {
                        (Some(LiteralKind::Str), Some(LiteralKind::Str)) => Some(OpaqueKind::Str),
                        (Some(LiteralKind::Num), Some(LiteralKind::Num)) => Some(OpaqueKind::Num),
                        _ => None,
                    }
                }
                _ => None,
            },
        };
        call.visit_mut_children_with(&mut v);
        v.count
    }
}

/// Replaces every expression `pick` accepts. Does not enter functions, whose
/// bodies may refer to their own parameters.
struct Substitute<'a, F> {
    cx: &'a mut Context,
    count: usize,
    rule: &'static str,
    pick: F,
}

impl<F: Fn(&Expr) -> Option<OpaqueKind>> VisitMut for Substitute<'_, F> {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        if let Some(kind) = (self.pick)(expr) {
            let hole = Expr::Invalid(Invalid { span: DUMMY_SP });
            let original = Box::new(std::mem::replace(expr, hole));
            *expr = *self.cx.fresh(self.rule, kind, original);
            self.count += 1;
            return;
        }
        expr.visit_mut_children_with(self);
    }

    fn visit_mut_function(&mut self, _: &mut Function) {}

    fn visit_mut_arrow_expr(&mut self, _: &mut ArrowExpr) {}
}

// -----------------------------------------------------------------------------
// (b) attrs object
// -----------------------------------------------------------------------------

pub struct AttrsObject;

impl Rule for AttrsObject {
    fn name(&self) -> &'static str {
        "attrs-object"
    }

    fn substitute(&self, call: &mut CallExpr, cx: &mut Context, config: &Config) -> usize {
        let mut v = AttrsValues {
            cx,
            pragma: &config.pragma,
            count: 0,
        };
        call.visit_mut_with(&mut v);
        v.count
    }
}

struct AttrsValues<'a> {
    cx: &'a mut Context,
    pragma: &'a str,
    count: usize,
}

impl AttrsValues<'_> {
    fn neutralize(&mut self, obj: &mut ObjectLit) {
        // computed keys, spreads and methods hide the object's shape
        let shape_known = obj.props.iter().all(|p| match p {
            PropOrSpread::Prop(p) => match &**p {
                Prop::KeyValue(kv) => !matches!(kv.key, PropName::Computed(_)),
                Prop::Shorthand(_) => true,
                _ => false,
            },
            PropOrSpread::Spread(_) => false,
        });
        if !shape_known {
            return;
        }

        for prop in obj.props.iter_mut() {
            let PropOrSpread::Prop(p) = prop else {
                continue;
            };
            if let Prop::Shorthand(i) = &**p {
                let key = IdentName::new(i.sym.clone(), i.span);
                let original = Box::new(Expr::Ident(i.clone()));
                let value = self.cx.fresh("attrs-object", OpaqueKind::Any, original);
                **p = Prop::KeyValue(KeyValueProp {
                    key: PropName::Ident(key),
                    value,
                });
                self.count += 1;
                continue;
            }
            let Prop::KeyValue(kv) = &mut **p else {
                continue;
            };
            if classify::is_static_literal(&kv.value) {
                continue;
            }
            if matches!(&*kv.value, Expr::Ident(i) if self.cx.is_token(&i.sym)) {
                continue;
            }
            let original = std::mem::replace(&mut kv.value, ident_expr("undefined"));
            kv.value = self.cx.fresh("attrs-object", OpaqueKind::Any, original);
            self.count += 1;
        }
    }
}

impl VisitMut for AttrsValues<'_> {
    fn visit_mut_call_expr(&mut self, call: &mut CallExpr) {
        let attrs_at = if is_pragma(&call.callee, self.pragma) {
            Some(1)
        } else if is_pragma_member(&call.callee, self.pragma, "fragment") {
            Some(0)
        } else {
            None
        };
        if let Some(at) = attrs_at {
            if let Some(ExprOrSpread { spread: None, expr }) = call.args.get_mut(at) {
                if let Expr::Object(obj) = &mut **expr {
                    self.neutralize(obj);
                }
            }
        }
        call.visit_mut_children_with(self);
    }

    fn visit_mut_function(&mut self, _: &mut Function) {}

    fn visit_mut_arrow_expr(&mut self, _: &mut ArrowExpr) {}
}

// -----------------------------------------------------------------------------
// Splicing
// -----------------------------------------------------------------------------

/// Replace the pending placeholders of `rule` with their originals. Tokens
/// of any rule found inside a restored original are restored with it.
pub fn splice_tokens(rule: &'static str, expr: &mut Box<Expr>, cx: &mut Context) {
    let pending = cx.pending(rule);
    if pending.is_empty() {
        return;
    }
    let nested: Vec<PlaceholderMatch> = cx
        .matches()
        .iter()
        .filter(|m| !m.consumed)
        .cloned()
        .collect();
    let mut v = Restore {
        pending: &pending,
        nested: &nested,
        restored: vec![],
        safe_slot: true,
    };
    expr.visit_mut_with(&mut v);
    for token in v.restored {
        cx.consume(&token);
    }
}

struct Restore<'a> {
    pending: &'a [PlaceholderMatch],
    /// Every unconsumed match, for tokens inside a restored original.
    nested: &'a [PlaceholderMatch],
    restored: Vec<String>,
    /// Whether the current expression sits where any expression may go
    /// without parentheses (property value, element, argument).
    safe_slot: bool,
}

impl VisitMut for Restore<'_> {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        if let Expr::Ident(i) = expr {
            if let Some(m) = self.pending.iter().find(|m| *m.token == *i.sym) {
                let mut original = m.original.clone();
                let mut inner = Restore {
                    pending: self.nested,
                    nested: self.nested,
                    restored: vec![],
                    safe_slot: true,
                };
                original.visit_mut_with(&mut inner);
                for token in inner.restored {
                    if !self.restored.contains(&token) {
                        self.restored.push(token);
                    }
                }
                let wrap = match &*original {
                    Expr::Seq(_) => true,
                    e => !self.safe_slot && needs_parens(e),
                };
                *expr = if wrap { *paren_expr(original) } else { *original };
                if !self.restored.contains(&m.token) {
                    self.restored.push(m.token.clone());
                }
                return;
            }
        }
        let outer = std::mem::replace(&mut self.safe_slot, false);
        expr.visit_mut_children_with(self);
        self.safe_slot = outer;
    }

    fn visit_mut_key_value_prop(&mut self, kv: &mut KeyValueProp) {
        kv.key.visit_mut_with(self);
        let outer = std::mem::replace(&mut self.safe_slot, true);
        kv.value.visit_mut_with(self);
        self.safe_slot = outer;
    }

    fn visit_mut_expr_or_spread(&mut self, e: &mut ExprOrSpread) {
        let outer = std::mem::replace(&mut self.safe_slot, e.spread.is_none());
        e.expr.visit_mut_with(self);
        self.safe_slot = outer;
    }

    fn visit_mut_return_stmt(&mut self, r: &mut ReturnStmt) {
        let outer = std::mem::replace(&mut self.safe_slot, true);
        r.arg.visit_mut_with(self);
        self.safe_slot = outer;
    }
}

fn needs_parens(expr: &Expr) -> bool {
    !matches!(
        expr,
        Expr::Ident(_)
            | Expr::Lit(_)
            | Expr::Call(_)
            | Expr::Member(_)
            | Expr::Array(_)
            | Expr::Object(_)
            | Expr::Paren(_)
            | Expr::Tpl(_)
            | Expr::This(_)
    )
}

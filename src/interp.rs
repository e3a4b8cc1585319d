use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;
use swc_core::ecma::ast::*;

use crate::classify::{array_method, method_name, property_key, simple_params, string_method};
use crate::config::Config;
use crate::context::Context;
use crate::error::{EvalError, EvalResult};
use crate::literal::{concat_expr, prop_name_str, str_expr};
use crate::runtime::{AttrsBinding, Runtime};
use crate::value::{Closure, FnBody, Opaque, OpaqueKind, Value};

/// Longest string the evaluator will build.
const MAX_STRING_LEN: usize = 1 << 20;
const BYTES_PER_STEP: usize = 64;

// -----------------------------------------------------------------------------
// Interpreter
// -----------------------------------------------------------------------------

/// Evaluates the pure subset of JS that hyperscript arguments are written in.
///
/// There is no global object: every identifier is a local of a callback, an
/// explicit binding, a placeholder of the current attempt, or an error.
pub struct Interpreter<'a> {
    config: &'a Config,
    context: Option<&'a Context>,
    globals: HashMap<String, Value>,
    scopes: Vec<Vec<(String, Value)>>,
    steps: u64,
    runtime: Runtime,
}

impl<'a> Interpreter<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            context: None,
            globals: HashMap::new(),
            scopes: vec![],
            steps: 0,
            runtime: Runtime::new(config.class_key.clone()),
        }
    }

    /// Resolve placeholder tokens of `context` to opaque values.
    pub fn with_context(mut self, context: &'a Context) -> Self {
        self.context = Some(context);
        self
    }

    /// Free-variable bindings, used to compare a call with its rewrite.
    pub fn with_globals(mut self, globals: HashMap<String, Value>) -> Self {
        self.globals = globals;
        self
    }

    pub fn into_bindings(self) -> Vec<AttrsBinding> {
        self.runtime.bindings
    }

    fn step(&mut self) -> EvalResult<()> {
        self.charge(1)
    }

    fn charge(&mut self, steps: u64) -> EvalResult<()> {
        self.steps = self.steps.saturating_add(steps);
        if self.steps > self.config.eval_budget {
            return Err(EvalError::BudgetExceeded(self.config.eval_budget));
        }
        Ok(())
    }

    /// Strings cost steps in proportion to their length and may not outgrow
    /// what is sensible to inline.
    fn sized(&mut self, s: String) -> EvalResult<Value> {
        if s.len() > MAX_STRING_LEN {
            return Err(EvalError::UnsupportedCall("string result too long".into()));
        }
        self.charge((s.len() / BYTES_PER_STEP) as u64)?;
        Ok(Value::Str(s))
    }

    fn lookup(&self, name: &str) -> EvalResult<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some((_, v)) = scope.iter().rev().find(|(n, _)| n == name) {
                return Ok(v.clone());
            }
        }
        if let Some(v) = self.globals.get(name) {
            return Ok(v.clone());
        }
        match name {
            "undefined" => return Ok(Value::Undefined),
            "NaN" => return Ok(Value::Num(f64::NAN)),
            "Infinity" => return Ok(Value::Num(f64::INFINITY)),
            _ => {}
        }
        if let Some(m) = self.context.and_then(|cx| cx.lookup(name)) {
            return Ok(Value::Opaque(Opaque {
                kind: m.kind,
                token: m.token.clone(),
                expr: crate::literal::ident_expr(&m.token),
            }));
        }
        Err(EvalError::FreeIdentifier(name.to_string()))
    }

    fn is_local(&self, name: &str) -> bool {
        self.scopes
            .iter()
            .any(|scope| scope.iter().any(|(n, _)| n == name))
            || self.globals.contains_key(name)
    }

    // ---------- expressions ----------

    pub fn eval(&mut self, expr: &Expr) -> EvalResult<Value> {
        self.step()?;
        match expr {
            Expr::Lit(lit) => match lit {
                Lit::Str(s) => Ok(Value::Str(s.value.to_string())),
                Lit::Num(n) => Ok(Value::Num(n.value)),
                Lit::Bool(b) => Ok(Value::Bool(b.value)),
                Lit::Null(_) => Ok(Value::Null),
                _ => Err(EvalError::Unsupported("literal kind".into())),
            },
            Expr::Tpl(tpl) => self.eval_tpl(tpl),
            Expr::Ident(i) => self.lookup(&i.sym),
            Expr::Array(a) => {
                let mut out = Vec::with_capacity(a.elems.len());
                for el in &a.elems {
                    match el {
                        None => out.push(Value::Undefined),
                        Some(ExprOrSpread {
                            spread: Some(_),
                            expr,
                        }) => out.extend(self.spread_items(expr)?),
                        Some(ExprOrSpread { spread: None, expr }) => out.push(self.eval(expr)?),
                    }
                }
                Ok(Value::Array(out))
            }
            Expr::Object(o) => self.eval_object(o),
            Expr::Unary(u) => self.eval_unary(u),
            Expr::Bin(b) => self.eval_bin(b),
            Expr::Cond(c) => {
                if self.eval(&c.test)?.truthy()? {
                    self.eval(&c.cons)
                } else {
                    self.eval(&c.alt)
                }
            }
            Expr::Seq(s) => {
                let mut last = Value::Undefined;
                for e in &s.exprs {
                    last = self.eval(e)?;
                }
                Ok(last)
            }
            Expr::Paren(p) => self.eval(&p.expr),
            Expr::Member(m) => {
                let obj = self.eval(&m.obj)?;
                let key = self.member_key(&m.prop)?;
                self.get(&obj, &key)
            }
            Expr::Call(call) => self.eval_call(call),
            Expr::Arrow(arrow) => self.make_arrow(expr, arrow),
            Expr::Fn(f) => self.make_fn(expr, &f.function),
            _ => Err(EvalError::Unsupported(expr_kind(expr).into())),
        }
    }

    fn eval_tpl(&mut self, tpl: &Tpl) -> EvalResult<Value> {
        let mut out = String::new();
        let mut dynamic: Option<Box<Expr>> = None;
        for (i, quasi) in tpl.quasis.iter().enumerate() {
            let cooked = quasi
                .cooked
                .as_ref()
                .map(|c| c.to_string())
                .unwrap_or_else(|| quasi.raw.to_string());
            out.push_str(&cooked);
            if let Some(e) = tpl.exprs.get(i) {
                match self.eval(e)? {
                    Value::Opaque(o) if o.kind == OpaqueKind::Str => {
                        let left = match dynamic.take() {
                            Some(d) => concat_expr(d, str_expr(&out)),
                            None => str_expr(&out),
                        };
                        dynamic = Some(concat_expr(left, o.expr));
                        out.clear();
                    }
                    v => out.push_str(&v.to_js_string()?),
                }
            }
        }
        match dynamic {
            None => Ok(Value::Str(out)),
            Some(d) => Ok(Value::Opaque(Opaque {
                kind: OpaqueKind::Str,
                token: opaque_token(&d),
                expr: if out.is_empty() {
                    d
                } else {
                    concat_expr(d, str_expr(&out))
                },
            })),
        }
    }

    fn eval_object(&mut self, o: &ObjectLit) -> EvalResult<Value> {
        let mut out = IndexMap::new();
        for prop in &o.props {
            match prop {
                PropOrSpread::Spread(s) => match self.eval(&s.expr)? {
                    Value::Object(map) => out.extend(map),
                    Value::Node(node) => out.extend(node.to_object()),
                    Value::Array(items) => {
                        for (i, v) in items.into_iter().enumerate() {
                            out.insert(i.to_string(), v);
                        }
                    }
                    Value::Str(s) => {
                        for (i, c) in s.chars().enumerate() {
                            out.insert(i.to_string(), Value::Str(c.to_string()));
                        }
                    }
                    Value::Opaque(o) => return Err(EvalError::Opaque(o.token)),
                    _ => {}
                },
                PropOrSpread::Prop(p) => match &**p {
                    Prop::KeyValue(kv) => {
                        let key = match &kv.key {
                            PropName::Computed(c) => {
                                let v = self.eval(&c.expr)?;
                                property_key(&v)
                                    .ok_or_else(|| EvalError::Unsupported("computed key".into()))?
                            }
                            other => prop_name_str(other)
                                .ok_or_else(|| EvalError::Unsupported("property key".into()))?,
                        };
                        let value = self.eval(&kv.value)?;
                        out.insert(key, value);
                    }
                    Prop::Shorthand(i) => {
                        let value = self.lookup(&i.sym)?;
                        out.insert(i.sym.to_string(), value);
                    }
                    _ => return Err(EvalError::Unsupported("object method or accessor".into())),
                },
            }
        }
        Ok(Value::Object(out))
    }

    fn eval_unary(&mut self, u: &UnaryExpr) -> EvalResult<Value> {
        let arg = self.eval(&u.arg)?;
        Ok(match u.op {
            UnaryOp::Bang => Value::Bool(!arg.truthy()?),
            UnaryOp::Minus => Value::Num(-arg.to_number()?),
            UnaryOp::Plus => Value::Num(arg.to_number()?),
            UnaryOp::Tilde => Value::Num(!to_int32(arg.to_number()?) as f64),
            UnaryOp::TypeOf => Value::str(arg.type_of()?),
            UnaryOp::Void => Value::Undefined,
            UnaryOp::Delete => return Err(EvalError::Unsupported("delete".into())),
        })
    }

    fn eval_bin(&mut self, b: &BinExpr) -> EvalResult<Value> {
        match b.op {
            BinaryOp::LogicalAnd => {
                let l = self.eval(&b.left)?;
                return if l.truthy()? { self.eval(&b.right) } else { Ok(l) };
            }
            BinaryOp::LogicalOr => {
                let l = self.eval(&b.left)?;
                return if l.truthy()? { Ok(l) } else { self.eval(&b.right) };
            }
            BinaryOp::NullishCoalescing => {
                let l = self.eval(&b.left)?;
                return if l.is_nullish()? { self.eval(&b.right) } else { Ok(l) };
            }
            _ => {}
        }

        let l = self.eval(&b.left)?;
        let r = self.eval(&b.right)?;
        Ok(match b.op {
            BinaryOp::Add => match add(l, r)? {
                Value::Str(s) => self.sized(s)?,
                v => v,
            },
            BinaryOp::Sub => Value::Num(l.to_number()? - r.to_number()?),
            BinaryOp::Mul => Value::Num(l.to_number()? * r.to_number()?),
            BinaryOp::Div => Value::Num(l.to_number()? / r.to_number()?),
            BinaryOp::Mod => Value::Num(l.to_number()? % r.to_number()?),
            BinaryOp::Exp => Value::Num(l.to_number()?.powf(r.to_number()?)),
            BinaryOp::EqEqEq => Value::Bool(l.strict_eq(&r)?),
            BinaryOp::NotEqEq => Value::Bool(!l.strict_eq(&r)?),
            BinaryOp::EqEq => Value::Bool(l.loose_eq(&r)?),
            BinaryOp::NotEq => Value::Bool(!l.loose_eq(&r)?),
            BinaryOp::Lt => compare(&l, &r, |o| o.is_lt())?,
            BinaryOp::LtEq => compare(&l, &r, |o| o.is_le())?,
            BinaryOp::Gt => compare(&l, &r, |o| o.is_gt())?,
            BinaryOp::GtEq => compare(&l, &r, |o| o.is_ge())?,
            BinaryOp::BitAnd => {
                Value::Num((to_int32(l.to_number()?) & to_int32(r.to_number()?)) as f64)
            }
            BinaryOp::BitOr => {
                Value::Num((to_int32(l.to_number()?) | to_int32(r.to_number()?)) as f64)
            }
            BinaryOp::BitXor => {
                Value::Num((to_int32(l.to_number()?) ^ to_int32(r.to_number()?)) as f64)
            }
            BinaryOp::LShift => Value::Num(
                to_int32(l.to_number()?).wrapping_shl(to_int32(r.to_number()?) as u32 & 31) as f64,
            ),
            BinaryOp::RShift => Value::Num(
                to_int32(l.to_number()?).wrapping_shr(to_int32(r.to_number()?) as u32 & 31) as f64,
            ),
            BinaryOp::ZeroFillRShift => Value::Num(
                (to_int32(l.to_number()?) as u32).wrapping_shr(to_int32(r.to_number()?) as u32 & 31)
                    as f64,
            ),
            op => return Err(EvalError::Unsupported(format!("operator {op:?}"))),
        })
    }

    fn member_key(&mut self, prop: &MemberProp) -> EvalResult<String> {
        match prop {
            MemberProp::Ident(i) => Ok(i.sym.to_string()),
            MemberProp::Computed(c) => {
                let v = self.eval(&c.expr)?;
                property_key(&v).ok_or_else(|| EvalError::Unsupported("computed member".into()))
            }
            MemberProp::PrivateName(_) => Err(EvalError::Unsupported("private name".into())),
        }
    }

    fn get(&self, obj: &Value, key: &str) -> EvalResult<Value> {
        match obj {
            // the one field of an unknown attrs object the vnode needs
            Value::Opaque(o) if o.kind == OpaqueKind::Attrs && key == "key" => {
                Ok(Value::Opaque(Opaque {
                    kind: OpaqueKind::Any,
                    token: o.token.clone(),
                    expr: crate::literal::member_expr(o.expr.clone(), "key"),
                }))
            }
            other => other.get(key),
        }
    }

    fn spread_items(&mut self, expr: &Expr) -> EvalResult<Vec<Value>> {
        match self.eval(expr)? {
            Value::Array(items) => Ok(items),
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            Value::Opaque(o) => Err(EvalError::Opaque(o.token)),
            other => Err(EvalError::Unsupported(format!(
                "spreading a {}",
                other.type_of()?
            ))),
        }
    }

    // ---------- functions ----------

    fn captured_env(&self) -> Vec<(String, Value)> {
        self.scopes.iter().flatten().cloned().collect()
    }

    fn make_arrow(&mut self, source: &Expr, arrow: &ArrowExpr) -> EvalResult<Value> {
        let params = simple_params(arrow.params.iter())
            .ok_or_else(|| EvalError::Unsupported("destructuring parameters".into()))?;
        let body = if arrow.is_async || arrow.is_generator {
            FnBody::Unsupported
        } else {
            match &*arrow.body {
                BlockStmtOrExpr::Expr(e) => FnBody::Expr(e.clone()),
                BlockStmtOrExpr::BlockStmt(b) => block_body(b),
            }
        };
        Ok(Value::Func(Box::new(Closure {
            source: Box::new(source.clone()),
            params,
            body,
            env: self.captured_env(),
        })))
    }

    fn make_fn(&mut self, source: &Expr, function: &Function) -> EvalResult<Value> {
        let params = simple_params(function.params.iter().map(|p| &p.pat))
            .ok_or_else(|| EvalError::Unsupported("destructuring parameters".into()))?;
        let body = match &function.body {
            _ if function.is_async || function.is_generator => FnBody::Unsupported,
            Some(b) => block_body(b),
            None => FnBody::Undefined,
        };
        Ok(Value::Func(Box::new(Closure {
            source: Box::new(source.clone()),
            params,
            body,
            env: self.captured_env(),
        })))
    }

    pub fn call(&mut self, f: &Closure, args: Vec<Value>) -> EvalResult<Value> {
        self.step()?;
        let expr = match &f.body {
            FnBody::Expr(e) => e.clone(),
            FnBody::Undefined => return Ok(Value::Undefined),
            FnBody::Unsupported => {
                return Err(EvalError::UnsupportedCall("function with statements".into()))
            }
        };
        let mut scope = f.env.clone();
        let mut args = args.into_iter();
        for name in &f.params {
            scope.push((name.clone(), args.next().unwrap_or(Value::Undefined)));
        }
        self.scopes.push(scope);
        let out = self.eval(&expr);
        self.scopes.pop();
        out
    }

    fn call_value(&mut self, f: &Value, args: Vec<Value>) -> EvalResult<Value> {
        match f {
            Value::Func(closure) => self.call(closure, args),
            Value::Opaque(o) => Err(EvalError::Opaque(o.token.clone())),
            other => Err(EvalError::UnsupportedCall(format!(
                "{} is not a function",
                other.type_of()?
            ))),
        }
    }

    // ---------- calls ----------

    fn eval_args(&mut self, args: &[ExprOrSpread]) -> EvalResult<Vec<Value>> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            if arg.spread.is_some() {
                out.extend(self.spread_items(&arg.expr)?);
            } else {
                out.push(self.eval(&arg.expr)?);
            }
        }
        Ok(out)
    }

    fn eval_call(&mut self, call: &CallExpr) -> EvalResult<Value> {
        let Callee::Expr(callee) = &call.callee else {
            return Err(EvalError::UnsupportedCall("super or import".into()));
        };
        let config = self.config;
        let pragma = config.pragma.as_str();

        let method = match &**callee {
            Expr::Member(member) => method_name(&member.prop),
            _ => None,
        };

        match (&**callee, method) {
            (Expr::Ident(i), _) if *i.sym == *pragma && !self.is_local(pragma) => {
                let args = self.eval_args(&call.args)?;
                self.runtime.hyperscript(args)
            }
            (Expr::Member(MemberExpr { obj, .. }), Some(method)) => {
                if let Expr::Ident(o) = &**obj {
                    let name = o.sym.as_ref();
                    if !self.is_local(name) {
                        if name == pragma {
                            let mut args = self.eval_args(&call.args)?.into_iter();
                            let mut next = || args.next().unwrap_or(Value::Undefined);
                            return match method {
                                "trust" => self.runtime.trust(next()),
                                "fragment" => {
                                    let attrs = next();
                                    self.runtime.fragment(attrs, next())
                                }
                                _ => Err(EvalError::UnsupportedCall(format!("{pragma}.{method}"))),
                            };
                        }
                        if name == "JSON" {
                            let args = self.eval_args(&call.args)?;
                            return json_call(method, args);
                        }
                        if name == "Object" && method == "assign" {
                            let args = self.eval_args(&call.args)?;
                            return object_assign(args);
                        }
                    }
                }

                let receiver = self.eval(obj)?;
                let args = self.eval_args(&call.args)?;
                match receiver {
                    Value::Array(items) if array_method(method) => {
                        self.array_call(items, method, args)
                    }
                    Value::Str(s) if string_method(method) => self.string_call(&s, method, args),
                    Value::Opaque(o) => Err(EvalError::Opaque(o.token)),
                    other => Err(EvalError::UnsupportedCall(format!(
                        "{}.{method}",
                        other.type_of()?
                    ))),
                }
            }
            (other, _) => {
                let f = self.eval(other)?;
                let args = self.eval_args(&call.args)?;
                self.call_value(&f, args)
            }
        }
    }

    fn array_call(
        &mut self,
        items: Vec<Value>,
        method: &str,
        args: Vec<Value>,
    ) -> EvalResult<Value> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);
        let this = Value::Array(items.clone());
        let len = items.len();

        Ok(match method {
            "map" | "flatMap" => {
                let f = arg(0);
                let mut out = Vec::with_capacity(len);
                for (i, item) in items.into_iter().enumerate() {
                    out.push(self.call_value(&f, vec![item, Value::Num(i as f64), this.clone()])?);
                }
                if method == "flatMap" {
                    Value::Array(flatten(out, 1))
                } else {
                    Value::Array(out)
                }
            }
            "filter" => {
                let f = arg(0);
                let mut out = vec![];
                for (i, item) in items.into_iter().enumerate() {
                    let keep = self
                        .call_value(&f, vec![item.clone(), Value::Num(i as f64), this.clone()])?
                        .truthy()?;
                    if keep {
                        out.push(item);
                    }
                }
                Value::Array(out)
            }
            "forEach" => {
                let f = arg(0);
                for (i, item) in items.into_iter().enumerate() {
                    self.call_value(&f, vec![item, Value::Num(i as f64), this.clone()])?;
                }
                Value::Undefined
            }
            "some" | "every" | "find" | "findIndex" => {
                let f = arg(0);
                let want = method != "every";
                for (i, item) in items.into_iter().enumerate() {
                    let hit = self
                        .call_value(&f, vec![item.clone(), Value::Num(i as f64), this.clone()])?
                        .truthy()?;
                    if hit == want {
                        return Ok(match method {
                            "some" => Value::Bool(true),
                            "every" => Value::Bool(false),
                            "find" => item,
                            _ => Value::Num(i as f64),
                        });
                    }
                }
                match method {
                    "some" => Value::Bool(false),
                    "every" => Value::Bool(true),
                    "find" => Value::Undefined,
                    _ => Value::Num(-1.0),
                }
            }
            "indexOf" => {
                let needle = arg(0);
                let (from, _) = slice_bounds(len, &arg(1), &Value::Undefined)?;
                let mut found = -1.0;
                for (i, item) in items.iter().enumerate().skip(from) {
                    if item.strict_eq(&needle)? {
                        found = i as f64;
                        break;
                    }
                }
                Value::Num(found)
            }
            "includes" => {
                let needle = arg(0);
                let (from, _) = slice_bounds(len, &arg(1), &Value::Undefined)?;
                let mut found = false;
                for item in items.iter().skip(from) {
                    let nan_pair = matches!(
                        (item, &needle),
                        (Value::Num(a), Value::Num(b)) if a.is_nan() && b.is_nan()
                    );
                    if nan_pair || item.strict_eq(&needle)? {
                        found = true;
                        break;
                    }
                }
                Value::Bool(found)
            }
            "join" => {
                let sep = match arg(0) {
                    Value::Undefined => ",".to_string(),
                    v => v.to_js_string()?,
                };
                let mut parts = Vec::with_capacity(len);
                for item in &items {
                    parts.push(match item {
                        Value::Undefined | Value::Null => String::new(),
                        v => v.to_js_string()?,
                    });
                }
                self.sized(parts.join(&sep))?
            }
            "slice" => {
                let (start, end) = slice_bounds(len, &arg(0), &arg(1))?;
                Value::Array(items[start..end.max(start)].to_vec())
            }
            "concat" => {
                let mut out = items;
                for a in args.iter().cloned() {
                    match a {
                        Value::Array(more) => out.extend(more),
                        other => out.push(other),
                    }
                }
                Value::Array(out)
            }
            "reverse" => Value::Array(items.into_iter().rev().collect()),
            "sort" => Value::Array(self.sort(items, arg(0))?),
            "flat" => {
                let depth = match arg(0) {
                    Value::Undefined => 1.0,
                    v => v.to_number()?,
                };
                Value::Array(flatten(items, depth.max(0.0) as usize))
            }
            "fill" => {
                let (start, end) = slice_bounds(len, &arg(1), &arg(2))?;
                let value = arg(0);
                let mut out = items;
                for slot in out.iter_mut().take(end).skip(start) {
                    *slot = value.clone();
                }
                Value::Array(out)
            }
            _ => return Err(EvalError::UnsupportedCall(format!("Array.{method}"))),
        })
    }

    /// Stable insertion sort, calling back into JS comparators.
    fn sort(&mut self, items: Vec<Value>, compare: Value) -> EvalResult<Vec<Value>> {
        let mut out: Vec<Value> = Vec::with_capacity(items.len());
        let mut undefined = 0;
        for item in items {
            if item.is_undefined() {
                undefined += 1;
                continue;
            }
            let mut at = out.len();
            while at > 0 {
                let before = match &compare {
                    Value::Undefined => {
                        item.to_js_string()? < out[at - 1].to_js_string()?
                    }
                    f => {
                        self.call_value(f, vec![item.clone(), out[at - 1].clone()])?
                            .to_number()?
                            < 0.0
                    }
                };
                if !before {
                    break;
                }
                at -= 1;
            }
            out.insert(at, item);
        }
        out.extend(std::iter::repeat_n(Value::Undefined, undefined));
        Ok(out)
    }

    fn string_call(&mut self, s: &str, method: &str, args: Vec<Value>) -> EvalResult<Value> {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);
        let text = |i: usize| -> EvalResult<String> { arg(i).to_js_string() };
        let len = s.chars().count();

        Ok(match method {
            "toUpperCase" => Value::Str(s.to_uppercase()),
            "toLowerCase" => Value::Str(s.to_lowercase()),
            "trim" => Value::str(s.trim()),
            "replace" => {
                let pattern = text(0)?;
                let Some(at) = s.find(&pattern) else {
                    return Ok(Value::str(s));
                };
                let (before, after) = (&s[..at], &s[at + pattern.len()..]);
                let with = match arg(1) {
                    f @ Value::Func(_) => {
                        let position = Value::Num(before.chars().count() as f64);
                        self.call_value(&f, vec![Value::str(&pattern), position, Value::str(s)])?
                            .to_js_string()?
                    }
                    v => substitute(&v.to_js_string()?, &pattern, before, after),
                };
                self.sized(format!("{before}{with}{after}"))?
            }
            "slice" => {
                let chars: Vec<char> = s.chars().collect();
                let (start, end) = slice_bounds(len, &arg(0), &arg(1))?;
                Value::Str(chars[start..end.max(start)].iter().collect())
            }
            "substring" => {
                let start = clamp_position(&arg(0), 0, len)?;
                let end = clamp_position(&arg(1), len, len)?;
                let (a, b) = if start <= end { (start, end) } else { (end, start) };
                Value::Str(s.chars().skip(a).take(b - a).collect())
            }
            "split" => {
                let limit = match arg(1) {
                    Value::Undefined => u32::MAX,
                    v => to_int32(v.to_number()?) as u32,
                } as usize;
                let parts: Vec<Value> = match arg(0) {
                    Value::Undefined => vec![Value::str(s)],
                    sep => {
                        let sep = sep.to_js_string()?;
                        if sep.is_empty() {
                            s.chars().map(|c| Value::Str(c.to_string())).collect()
                        } else {
                            s.split(sep.as_str()).map(Value::str).collect()
                        }
                    }
                };
                Value::Array(parts.into_iter().take(limit).collect())
            }
            "concat" => {
                let mut out = s.to_string();
                for a in &args {
                    out.push_str(&a.to_js_string()?);
                }
                self.sized(out)?
            }
            "indexOf" => {
                let needle = text(0)?;
                let from = clamp_position(&arg(1), 0, len)?;
                let rest = &s[char_offset(s, from)..];
                Value::Num(match rest.find(&needle) {
                    Some(byte) => (from + rest[..byte].chars().count()) as f64,
                    None => -1.0,
                })
            }
            "includes" => {
                let from = clamp_position(&arg(1), 0, len)?;
                Value::Bool(s[char_offset(s, from)..].contains(&text(0)?))
            }
            "startsWith" => {
                let from = clamp_position(&arg(1), 0, len)?;
                Value::Bool(s[char_offset(s, from)..].starts_with(&text(0)?))
            }
            "endsWith" => {
                let end = clamp_position(&arg(1), len, len)?;
                Value::Bool(s[..char_offset(s, end)].ends_with(&text(0)?))
            }
            "repeat" => {
                let n = match arg(0).to_number()? {
                    n if n.is_nan() => 0.0,
                    n => n.trunc(),
                };
                if n < 0.0 || n.is_infinite() {
                    return Err(EvalError::UnsupportedCall("String.repeat count".into()));
                }
                if s.len() as f64 * n > MAX_STRING_LEN as f64 {
                    return Err(EvalError::UnsupportedCall("String.repeat result too long".into()));
                }
                self.sized(s.repeat(n as usize))?
            }
            "charAt" => {
                let i = match arg(0) {
                    Value::Undefined => 0.0,
                    v => v.to_number()?,
                };
                Value::Str(
                    s.chars()
                        .nth(i as usize)
                        .filter(|_| i >= 0.0)
                        .map(|c| c.to_string())
                        .unwrap_or_default(),
                )
            }
            _ => return Err(EvalError::UnsupportedCall(format!("String.{method}"))),
        })
    }
}

// -----------------------------------------------------------------------------
// Builtins
// -----------------------------------------------------------------------------

fn json_call(method: &str, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = args.into_iter();
    let value = args.next().unwrap_or(Value::Undefined);
    match method {
        "stringify" => {
            match args.next() {
                None | Some(Value::Undefined) | Some(Value::Null) => {}
                Some(_) => return Err(EvalError::UnsupportedCall("JSON.stringify replacer".into())),
            }
            let indent = match args.next() {
                Some(Value::Num(n)) => " ".repeat(n.clamp(0.0, 10.0) as usize),
                Some(Value::Str(s)) => s.chars().take(10).collect(),
                _ => String::new(),
            };
            let Some(json) = value.to_json()? else {
                return Ok(Value::Undefined);
            };
            if indent.is_empty() {
                return Ok(Value::Str(serde_json::to_string(&json)?));
            }
            let mut buf = Vec::new();
            let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
            let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
            json.serialize(&mut ser)?;
            Ok(Value::Str(String::from_utf8_lossy(&buf).into_owned()))
        }
        "parse" => {
            let text = value.to_js_string()?;
            Ok(Value::from_json(serde_json::from_str(&text)?))
        }
        _ => Err(EvalError::UnsupportedCall(format!("JSON.{method}"))),
    }
}

fn object_assign(args: Vec<Value>) -> EvalResult<Value> {
    let mut args = args.into_iter();
    let Some(Value::Object(mut target)) = args.next() else {
        return Err(EvalError::UnsupportedCall("Object.assign on a non-object".into()));
    };
    for source in args {
        match source {
            Value::Object(map) => target.extend(map),
            Value::Node(node) => target.extend(node.to_object()),
            Value::Undefined | Value::Null => {}
            Value::Opaque(o) => return Err(EvalError::Opaque(o.token)),
            _ => return Err(EvalError::UnsupportedCall("Object.assign source".into())),
        }
    }
    Ok(Value::Object(target))
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

fn add(l: Value, r: Value) -> EvalResult<Value> {
    let stringy = |v: &Value| {
        matches!(
            v,
            Value::Str(_) | Value::Array(_) | Value::Object(_) | Value::Node(_)
        ) || matches!(v, Value::Opaque(o) if o.kind == OpaqueKind::Str)
    };
    if !stringy(&l) && !stringy(&r) {
        return Ok(Value::Num(l.to_number()? + r.to_number()?));
    }
    match (l, r) {
        (Value::Opaque(a), Value::Opaque(b)) => Ok(Value::Opaque(Opaque {
            kind: OpaqueKind::Str,
            token: a.token,
            expr: concat_expr(a.expr, b.expr),
        })),
        (Value::Opaque(o), other) => Ok(Value::Opaque(Opaque {
            kind: OpaqueKind::Str,
            token: o.token,
            expr: concat_expr(o.expr, str_expr(&other.to_js_string()?)),
        })),
        (other, Value::Opaque(o)) => Ok(Value::Opaque(Opaque {
            kind: OpaqueKind::Str,
            token: o.token,
            expr: concat_expr(str_expr(&other.to_js_string()?), o.expr),
        })),
        (l, r) => {
            let (l, r) = (l.to_js_string()?, r.to_js_string()?);
            Ok(Value::Str(format!("{l}{r}")))
        }
    }
}

fn compare(
    l: &Value,
    r: &Value,
    test: impl Fn(std::cmp::Ordering) -> bool,
) -> EvalResult<Value> {
    if let (Value::Str(a), Value::Str(b)) = (l, r) {
        return Ok(Value::Bool(test(a.cmp(b))));
    }
    let (a, b) = (l.to_number()?, r.to_number()?);
    Ok(Value::Bool(a.partial_cmp(&b).map(test).unwrap_or(false)))
}

/// `$$`, `` $` ``, `$&` and `$'` in a replacement string. A string pattern
/// has no groups, so every other `$` is literal.
fn substitute(template: &str, matched: &str, before: &str, after: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => out.push('$'),
            Some('&') => out.push_str(matched),
            Some('`') => out.push_str(before),
            Some('\'') => out.push_str(after),
            _ => {
                out.push('$');
                continue;
            }
        }
        chars.next();
    }
    out
}

/// Byte offset of the `n`th char, or the end of `s`.
fn char_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(at, _)| at).unwrap_or(s.len())
}

/// String position argument, clamped to `0..=len`.
fn clamp_position(v: &Value, default: usize, len: usize) -> EvalResult<usize> {
    if v.is_undefined() {
        return Ok(default);
    }
    let n = v.to_number()?;
    Ok(if n.is_nan() {
        0
    } else {
        n.clamp(0.0, len as f64) as usize
    })
}

fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    (n.trunc() as i64) as i32
}

fn slice_bounds(len: usize, start: &Value, end: &Value) -> EvalResult<(usize, usize)> {
    let resolve = |v: &Value, default: usize| -> EvalResult<usize> {
        if v.is_undefined() {
            return Ok(default);
        }
        let n = v.to_number()?;
        let n = if n.is_nan() { 0.0 } else { n.trunc() };
        Ok(if n < 0.0 {
            (len as f64 + n).max(0.0) as usize
        } else {
            n.min(len as f64) as usize
        })
    };
    Ok((resolve(start, 0)?, resolve(end, len)?))
}

fn flatten(items: Vec<Value>, depth: usize) -> Vec<Value> {
    let mut out = vec![];
    for item in items {
        match item {
            Value::Array(inner) if depth > 0 => out.extend(flatten(inner, depth - 1)),
            other => out.push(other),
        }
    }
    out
}

fn block_body(block: &BlockStmt) -> FnBody {
    match block.stmts.as_slice() {
        [] => FnBody::Undefined,
        [Stmt::Return(ReturnStmt { arg: None, .. })] => FnBody::Undefined,
        [Stmt::Return(ReturnStmt { arg: Some(e), .. })] => FnBody::Expr(e.clone()),
        _ => FnBody::Unsupported,
    }
}

fn opaque_token(expr: &Expr) -> String {
    match expr {
        Expr::Ident(i) => i.sym.to_string(),
        Expr::Bin(b) => opaque_token(&b.right),
        Expr::Paren(p) => opaque_token(&p.expr),
        _ => String::new(),
    }
}

fn expr_kind(expr: &Expr) -> &'static str {
    match expr {
        Expr::This(_) => "this",
        Expr::Assign(_) => "assignment",
        Expr::Update(_) => "update",
        Expr::New(_) => "new",
        Expr::Class(_) => "class",
        Expr::Await(_) => "await",
        Expr::Yield(_) => "yield",
        Expr::OptChain(_) => "optional chaining",
        Expr::TaggedTpl(_) => "tagged template",
        Expr::JSXElement(_) | Expr::JSXFragment(_) => "jsx",
        _ => "expression",
    }
}

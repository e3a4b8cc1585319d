use std::collections::{HashMap, HashSet};
use swc_core::{
    common::{Span, Spanned},
    ecma::{
        ast::*,
        visit::{VisitMut, VisitMutWith},
    },
    plugin::{plugin_transform, proxies::TransformPluginProgramMetadata},
};

pub mod attrs;
pub mod classify;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod evaluate;
pub mod interp;
pub mod literal;
pub mod rules;
pub mod runtime;
pub mod selector;
pub mod source;
pub mod value;

pub use config::Config;
pub use error::{EvalError, ObjectifyError};
pub use source::transform_source;

use classify::SelectorArg;
use context::Context;
use engine::Engine;
use evaluate::DirectEvaluator;
use literal::paren_expr;
use rules::Rule;

// -----------------------------------------------------------------------------
// Transform state
// -----------------------------------------------------------------------------

/// Rewrites hyperscript calls into the vnode literals they evaluate to.
///
/// Call sites that cannot be rewritten are left as they are. Nothing in here
/// fails the whole program.
pub struct ObjectifyTransform {
    config: Config,
    rules: Vec<Box<dyn Rule>>,
    context: Context,
    // call sites with a final decision
    processed: HashSet<Span>,
}

impl ObjectifyTransform {
    pub fn new(config: Config) -> Self {
        Self {
            rules: rules::pipeline(&config),
            config,
            context: Context::default(),
            processed: HashSet::new(),
        }
    }

    pub fn from_map(config: HashMap<String, serde_json::Value>) -> Self {
        Self::new(Config::from_map(config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn mark(&mut self, span: Span) {
        if !span.is_dummy() {
            self.processed.insert(span);
        }
    }

    fn is_processed(&self, span: Span) -> bool {
        !span.is_dummy() && self.processed.contains(&span)
    }

    // ---------- per call site ----------

    fn try_call(&mut self, call: &CallExpr) -> Option<Box<Expr>> {
        if self.is_processed(call.span) {
            return None;
        }
        let result = self.objectify(call);
        if matches!(result, Err(ObjectifyError::NotApplicable)) {
            return None;
        }
        self.mark(call.span);
        match result {
            Ok(out) => {
                log::debug!("objectified call at {:?}", call.span);
                Some(out)
            }
            Err(err) => {
                log::debug!("left call at {:?} untouched: {err}", call.span);
                None
            }
        }
    }

    fn objectify(&mut self, call: &CallExpr) -> Result<Box<Expr>, ObjectifyError> {
        let site = classify::call_site(call, &self.config.pragma)
            .ok_or(ObjectifyError::NotApplicable)?;
        log::trace!("{:?} call site at {:?}", site.kind, call.span);
        if site.selector == SelectorArg::Dynamic {
            return Err(ObjectifyError::NotStatic(
                "selector concatenates unknown values".into(),
            ));
        }

        let expr = Expr::Call(call.clone());
        match DirectEvaluator::new(&self.config).evaluate(&expr) {
            Ok(out) => return Ok(out),
            Err(err) => log::trace!("direct evaluation failed: {err}"),
        }

        Engine::new(&self.config, &self.rules).run(call, &mut self.context)
    }
}

// -----------------------------------------------------------------------------
// Statement-position fixups
// -----------------------------------------------------------------------------

/// Whether printing `expr` would begin with `{`.
fn starts_with_object(expr: &Expr) -> bool {
    match expr {
        Expr::Object(_) => true,
        Expr::Member(m) => starts_with_object(&m.obj),
        Expr::Call(CallExpr {
            callee: Callee::Expr(callee),
            ..
        }) => starts_with_object(callee),
        Expr::Bin(b) => starts_with_object(&b.left),
        Expr::Cond(c) => starts_with_object(&c.test),
        Expr::Seq(s) => s.exprs.first().is_some_and(|e| starts_with_object(e)),
        Expr::TaggedTpl(t) => starts_with_object(&t.tag),
        _ => false,
    }
}

fn wrap_leading_object(expr: &mut Box<Expr>) {
    if starts_with_object(expr) {
        let span = expr.span();
        let inner = std::mem::replace(expr, Box::new(Expr::Invalid(Invalid { span })));
        *expr = paren_expr(inner);
    }
}

// -----------------------------------------------------------------------------
// Visitor
// -----------------------------------------------------------------------------

impl VisitMut for ObjectifyTransform {
    fn visit_mut_program(&mut self, program: &mut Program) {
        self.context = Context::for_program(program);
        self.processed.clear();
        program.visit_mut_children_with(self);
    }

    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        if let Expr::Call(call) = &*expr {
            if let Some(out) = self.try_call(call) {
                *expr = *out;
            }
        }
        // spliced-back sub-expressions may hold calls of their own
        expr.visit_mut_children_with(self);
    }

    fn visit_mut_expr_stmt(&mut self, stmt: &mut ExprStmt) {
        stmt.visit_mut_children_with(self);
        wrap_leading_object(&mut stmt.expr);
    }

    fn visit_mut_arrow_expr(&mut self, arrow: &mut ArrowExpr) {
        arrow.visit_mut_children_with(self);
        if let BlockStmtOrExpr::Expr(body) = &mut *arrow.body {
            wrap_leading_object(body);
        }
    }
}

// -----------------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------------

#[plugin_transform]
pub fn process_transform(mut program: Program, metadata: TransformPluginProgramMetadata) -> Program {
    let config = metadata
        .get_transform_plugin_config()
        .map(|s| serde_json::from_str(&s).unwrap_or_default())
        .unwrap_or_default();

    let mut transform = ObjectifyTransform::from_map(config);
    program.visit_mut_with(&mut transform);

    program
}

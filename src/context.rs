use std::collections::HashSet;

use swc_core::ecma::{
    ast::{Expr, Ident, Program},
    visit::{Visit, VisitWith},
};

use crate::literal::ident_expr;
use crate::value::OpaqueKind;

pub const DEFAULT_PREFIX: &str = "__mobj_";

/// One substituted sub-expression.
#[derive(Debug, Clone)]
pub struct PlaceholderMatch {
    pub token: String,
    /// Name of the rule that owns the placeholder.
    pub rule: &'static str,
    pub kind: OpaqueKind,
    pub original: Box<Expr>,
    /// Extra expression a rule attaches during evaluation.
    pub aux: Option<Box<Expr>>,
    pub consumed: bool,
}

/// Per-transform state: the placeholder counter and the match table of the
/// current speculative attempt.
#[derive(Debug)]
pub struct Context {
    prefix: String,
    next_id: u64,
    matches: Vec<PlaceholderMatch>,
}

impl Default for Context {
    fn default() -> Self {
        Self::with_prefix(DEFAULT_PREFIX)
    }
}

impl Context {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next_id: 0,
            matches: vec![],
        }
    }

    /// A context whose tokens cannot collide with any identifier of `program`.
    pub fn for_program(program: &Program) -> Self {
        let mut collector = IdentCollector::default();
        program.visit_with(&mut collector);

        let mut prefix = DEFAULT_PREFIX.to_string();
        while collector.names.iter().any(|n| n.starts_with(&prefix)) {
            prefix.push('_');
        }
        Self::with_prefix(prefix)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Parameter name for the `Object.assign` binding function.
    pub fn binding_name(&self) -> String {
        format!("{}attrs__", self.prefix)
    }

    /// Record `original` and return the placeholder node standing in for it.
    pub fn fresh(
        &mut self,
        rule: &'static str,
        kind: OpaqueKind,
        original: Box<Expr>,
    ) -> Box<Expr> {
        let token = format!("{}{}__", self.prefix, self.next_id);
        self.next_id += 1;
        log::trace!("{rule}: {token} ({kind:?})");
        self.matches.push(PlaceholderMatch {
            token: token.clone(),
            rule,
            kind,
            original,
            aux: None,
            consumed: false,
        });
        ident_expr(&token)
    }

    /// Start a new attempt. The counter keeps going so tokens stay unique
    /// across attempts.
    pub fn clear(&mut self) {
        self.matches.clear();
    }

    pub fn lookup(&self, name: &str) -> Option<&PlaceholderMatch> {
        if !name.starts_with(&self.prefix) {
            return None;
        }
        self.matches.iter().find(|m| m.token == name)
    }

    pub fn is_token(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn set_aux(&mut self, token: &str, aux: Box<Expr>) {
        if let Some(m) = self.matches.iter_mut().find(|m| m.token == token) {
            m.aux = Some(aux);
        }
    }

    pub fn matches(&self) -> &[PlaceholderMatch] {
        &self.matches
    }

    /// Unconsumed matches of one rule.
    pub fn pending(&self, rule: &str) -> Vec<PlaceholderMatch> {
        self.matches
            .iter()
            .filter(|m| m.rule == rule && !m.consumed)
            .cloned()
            .collect()
    }

    pub fn consume(&mut self, token: &str) {
        if let Some(m) = self.matches.iter_mut().find(|m| m.token == token) {
            m.consumed = true;
        }
    }

    /// Placeholder tokens still present in `expr`.
    pub fn leftovers(&self, expr: &Expr) -> Vec<String> {
        let mut collector = IdentCollector::default();
        expr.visit_with(&mut collector);
        let mut out: Vec<String> = collector
            .names
            .into_iter()
            .filter(|n| self.is_token(n))
            .collect();
        out.sort();
        out
    }
}

#[derive(Default)]
struct IdentCollector {
    names: HashSet<String>,
}

impl Visit for IdentCollector {
    fn visit_ident(&mut self, i: &Ident) {
        self.names.insert(i.sym.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{parse_expr, parse_program};

    #[test]
    fn tokens_are_unique_across_attempts() {
        let mut cx = Context::default();
        let a = cx.fresh("a", OpaqueKind::Any, ident_expr("x"));
        cx.clear();
        let b = cx.fresh("a", OpaqueKind::Any, ident_expr("x"));
        let (Expr::Ident(a), Expr::Ident(b)) = (*a, *b) else {
            panic!("placeholders are identifiers")
        };
        assert_ne!(a.sym, b.sym);
        assert!(cx.lookup(&a.sym).is_none());
        assert!(cx.lookup(&b.sym).is_some());
    }

    #[test]
    fn prefix_avoids_program_identifiers() {
        let program = parse_program("var __mobj_0__ = 1;").unwrap();
        let cx = Context::for_program(&program);
        assert_eq!(cx.prefix(), "__mobj__");
        assert!(!"__mobj_0__".starts_with(cx.prefix()));
    }

    #[test]
    fn finds_leftover_tokens() {
        let mut cx = Context::default();
        let token = cx.fresh("a", OpaqueKind::Str, ident_expr("y"));
        let Expr::Ident(token) = *token else {
            panic!("placeholder is an identifier")
        };
        let expr = parse_expr(&format!("{{ a: {}, b: other }}", token.sym)).unwrap();
        assert_eq!(cx.leftovers(&expr), vec![token.sym.to_string()]);
        cx.consume(&token.sym);
        assert!(cx.pending("a").is_empty());
    }
}

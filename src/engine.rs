use swc_core::ecma::ast::{CallExpr, Expr};

use crate::config::Config;
use crate::context::Context;
use crate::error::ObjectifyError;
use crate::interp::Interpreter;
use crate::literal::{key_value, object_expr, value_to_expr};
use crate::rules::Rule;

/// Where a speculative attempt is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Fresh,
    Substituted,
    Evaluated,
    Spliced,
    Stable,
    Retry,
    Failed,
}

/// Placeholder substitution, evaluation and splicing for call sites the
/// direct evaluator rejected.
pub struct Engine<'a> {
    config: &'a Config,
    rules: &'a [Box<dyn Rule>],
}

impl<'a> Engine<'a> {
    pub fn new(config: &'a Config, rules: &'a [Box<dyn Rule>]) -> Self {
        Self { config, rules }
    }

    pub fn run(&self, call: &CallExpr, cx: &mut Context) -> Result<Box<Expr>, ObjectifyError> {
        let mut state = State::Fresh;
        let result = self.attempt(call, cx, &mut state);
        if result.is_err() {
            state = State::Failed;
        }
        log::trace!("speculative attempt ended in {state:?}");
        cx.clear();
        result
    }

    fn attempt(
        &self,
        call: &CallExpr,
        cx: &mut Context,
        state: &mut State,
    ) -> Result<Box<Expr>, ObjectifyError> {
        cx.clear();
        let mut call = call.clone();

        let (top, traversal): (Vec<_>, Vec<_>) =
            self.rules.iter().partition(|r| r.top_level_only());
        let mut substituted = 0;
        for rule in top.iter().chain(traversal.iter()) {
            let n = rule.substitute(&mut call, cx, self.config);
            if n > 0 {
                log::trace!("{}: {n} placeholder(s)", rule.name());
            }
            substituted += n;
        }
        *state = State::Substituted;
        log::trace!("{substituted} placeholder(s) in total");

        let mut interp = Interpreter::new(self.config).with_context(cx);
        let value = interp.eval(&Expr::Call(call))?;
        let bindings = interp.into_bindings();
        *state = State::Evaluated;

        for binding in bindings {
            let extra = binding
                .extra
                .iter()
                .map(|(k, v)| Ok(key_value(k, value_to_expr(v)?)))
                .collect::<Result<Vec<_>, ObjectifyError>>()?;
            cx.set_aux(&binding.token, object_expr(extra));
        }

        let mut out = value_to_expr(&value)?;
        for pass in 1..=self.config.repeat_limit {
            for rule in self.rules {
                rule.splice(&mut out, cx)?;
            }
            *state = State::Spliced;

            let leftovers = cx.leftovers(&out);
            if leftovers.is_empty() {
                *state = State::Stable;
                return Ok(out);
            }
            *state = State::Retry;
            log::trace!("pass {pass}: placeholders left: {}", leftovers.join(", "));
        }

        Err(ObjectifyError::splice(
            "engine",
            format!(
                "placeholders left after {} splice pass(es)",
                self.config.repeat_limit
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::pipeline;
    use crate::source::{parse_expr, print_expr};

    fn run(src: &str, config: &Config) -> Result<String, ObjectifyError> {
        let Expr::Call(call) = *parse_expr(src).unwrap() else {
            panic!("not a call")
        };
        let rules = pipeline(config);
        let mut cx = Context::default();
        Engine::new(config, &rules)
            .run(&call, &mut cx)
            .map(|e| print_expr(&e))
    }

    #[test]
    fn dynamic_attr_value_is_spliced_back() {
        let out = run("m('div', {fooga: unknownIdentifier})", &Config::default()).unwrap();
        assert!(out.contains("fooga:unknownIdentifier"), "{out}");
        assert!(out.starts_with(r#"{tag:"div""#), "{out}");
    }

    #[test]
    fn free_identifier_in_children_fails() {
        assert!(matches!(
            run("m('div', identifier)", &Config::default()),
            Err(ObjectifyError::Evaluation(_))
        ));
    }

    #[test]
    fn nested_placeholder_is_restored_in_one_pass() {
        let src = "m('div', {title: 'x' + JSON.stringify(y)})";
        let out = run(src, &Config::default()).unwrap();
        assert!(out.contains(r#"title:"x"+JSON.stringify(y)"#), "{out}");

        let src = "m('div', {title: c ? JSON.stringify(y) : 'n'})";
        let out = run(src, &Config::default()).unwrap();
        assert!(out.contains(r#"title:c?JSON.stringify(y):"n""#), "{out}");
    }

    #[test]
    fn replay_is_byte_identical() {
        let src = "m('a.b', {href: url, class: c ? 'on' : 'off'}, JSON.stringify(d))";
        let first = run(src, &Config::default()).unwrap();
        let second = run(src, &Config::default()).unwrap();
        assert_eq!(first, second);
    }
}

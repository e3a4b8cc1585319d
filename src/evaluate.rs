use swc_core::ecma::ast::Expr;

use crate::classify::is_static_expr;
use crate::config::Config;
use crate::error::ObjectifyError;
use crate::interp::Interpreter;
use crate::literal::value_to_expr;
use crate::source::parse_expr;

/// Evaluates fully static call sites and turns the result into a literal.
pub struct DirectEvaluator<'a> {
    config: &'a Config,
}

impl<'a> DirectEvaluator<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, expr: &Expr) -> Result<Box<Expr>, ObjectifyError> {
        if !is_static_expr(expr, &self.config.pragma) {
            return Err(ObjectifyError::NotStatic(
                "arguments reference unknown values".into(),
            ));
        }
        let value = Interpreter::new(self.config).eval(expr)?;
        Ok(value_to_expr(&value)?)
    }

    /// Same as [`evaluate`](Self::evaluate), for the source text of one expression.
    pub fn evaluate_source(&self, src: &str) -> Result<Box<Expr>, ObjectifyError> {
        let expr = parse_expr(src).map_err(|e| ObjectifyError::Parse(e.to_string()))?;
        self.evaluate(&expr)
    }
}

use thiserror::Error;

pub type EvalResult<T> = Result<T, EvalError>;

/// Why a single call site could not be rewritten.
///
/// None of these ever escape the whole-program transform: the driver logs
/// them on the trace channel and leaves the call site untouched.
#[derive(Error, Debug)]
pub enum ObjectifyError {
    #[error("call does not match the hyperscript shape")]
    NotApplicable,

    #[error("not statically known: {0}")]
    NotStatic(String),

    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvalError),

    #[error("could not parse call site: {0}")]
    Parse(String),

    #[error("rule `{rule}` could not splice its placeholder back: {reason}")]
    Splice { rule: &'static str, reason: String },
}

impl ObjectifyError {
    pub fn splice(rule: &'static str, reason: impl Into<String>) -> Self {
        ObjectifyError::Splice {
            rule,
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("free identifier `{0}`")]
    FreeIdentifier(String),

    #[error("unsupported expression: {0}")]
    Unsupported(String),

    #[error("unsupported call: {0}")]
    UnsupportedCall(String),

    #[error("cannot inspect placeholder `{0}` at compile time")]
    Opaque(String),

    #[error("the selector must be either a string or a component")]
    InvalidSelector,

    #[error("evaluation budget of {0} steps exceeded")]
    BudgetExceeded(u64),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

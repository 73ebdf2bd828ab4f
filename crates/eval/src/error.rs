use rips_core::{Position, ValueFault};

/// Conditions that stop an evaluation pass.
///
/// Recoverable failures (a failed script, a missing file, a bad pattern)
/// never surface here; they make the builtin return false.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("{pos}: {fault}")]
    Fault { pos: Position, fault: ValueFault },
    #[error("crash: {0}")]
    Crash(String),
    #[error("no implementation for builtin {0}")]
    MissingBuiltin(String),
    #[error("builtin {expected} bound as {found}")]
    BuiltinMismatch { expected: String, found: String },
    #[error("{func}: argument {index} has the wrong type")]
    BadArgument { func: String, index: usize },
    #[error("{pos}: {name} is not declared")]
    Undeclared { pos: Position, name: String },
    #[error("{pos}: internal: {message}")]
    Internal { pos: Position, message: String },
}

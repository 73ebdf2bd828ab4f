use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of diagnostics accumulated before compilation is abandoned.
pub const DEFAULT_MAX_ERRORS: usize = 10;

/// Compilation stage that produced a diagnostic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Lex,
    Parse,
    Type,
    Fold,
    Levels,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Lex => "lex",
            Stage::Parse => "parse",
            Stage::Type => "type",
            Stage::Fold => "fold",
            Stage::Levels => "levels",
        };
        f.write_str(s)
    }
}

/// A source position: file name and 1-based line.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Position {
    pub file: String,
    pub line: u32,
}

impl Position {
    pub fn new(file: &str, line: u32) -> Self {
        Position {
            file: file.to_owned(),
            line,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A compilation diagnostic attributed to a source position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, thiserror::Error)]
#[error("{file}:{line}: {message}")]
pub struct CompileError {
    pub stage: Stage,
    pub file: String,
    pub line: u32,
    pub message: String,
}

impl CompileError {
    pub fn new(stage: Stage, pos: &Position, message: impl Into<String>) -> Self {
        CompileError {
            stage,
            file: pos.file.clone(),
            line: pos.line,
            message: message.into(),
        }
    }

    pub fn lex(pos: &Position, message: impl Into<String>) -> Self {
        CompileError::new(Stage::Lex, pos, message)
    }

    pub fn parse(pos: &Position, message: impl Into<String>) -> Self {
        CompileError::new(Stage::Parse, pos, message)
    }

    pub fn typing(pos: &Position, message: impl Into<String>) -> Self {
        CompileError::new(Stage::Type, pos, message)
    }

    pub fn fold(pos: &Position, message: impl Into<String>) -> Self {
        CompileError::new(Stage::Fold, pos, message)
    }

    pub fn levels(pos: &Position, message: impl Into<String>) -> Self {
        CompileError::new(Stage::Levels, pos, message)
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "stage":   self.stage,
            "file":    self.file,
            "line":    self.line,
            "message": self.message,
        })
    }
}

/// Raised when the error budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("too many errors")]
pub struct TooManyErrors;

/// Accumulates diagnostics across every compilation stage.
///
/// Recording an error returns `Err(TooManyErrors)` once the cap is reached,
/// which the recursive passes propagate with `?` to abandon compilation.
#[derive(Debug, Clone)]
pub struct ErrorBudget {
    errors: Vec<CompileError>,
    max: usize,
    exhausted: bool,
}

impl ErrorBudget {
    pub fn new(max: usize) -> Self {
        ErrorBudget {
            errors: Vec::new(),
            max,
            exhausted: false,
        }
    }

    pub fn record(&mut self, err: CompileError) -> Result<(), TooManyErrors> {
        tracing::debug!(stage = %err.stage, "{}", err);
        self.errors.push(err);
        if self.errors.len() >= self.max {
            self.exhausted = true;
            return Err(TooManyErrors);
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    pub fn into_failure(self) -> CompileFailure {
        CompileFailure {
            errors: self.errors,
            too_many: self.exhausted,
        }
    }
}

impl Default for ErrorBudget {
    fn default() -> Self {
        ErrorBudget::new(DEFAULT_MAX_ERRORS)
    }
}

/// Every diagnostic collected by a failed compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileFailure {
    pub errors: Vec<CompileError>,
    pub too_many: bool,
}

impl fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in &self.errors {
            writeln!(f, "{}", e)?;
        }
        if self.too_many {
            write!(f, "too many errors")
        } else {
            write!(f, "{} errors", self.errors.len())
        }
    }
}

impl std::error::Error for CompileFailure {}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_exhausts_at_cap() {
        let pos = Position::new("a.rul", 1);
        let mut budget = ErrorBudget::new(3);
        assert!(budget.record(CompileError::parse(&pos, "one")).is_ok());
        assert!(budget.record(CompileError::parse(&pos, "two")).is_ok());
        assert_eq!(
            budget.record(CompileError::parse(&pos, "three")),
            Err(TooManyErrors)
        );
        let failure = budget.into_failure();
        assert!(failure.too_many);
        assert_eq!(failure.errors.len(), 3);
    }

    #[test]
    fn display_is_file_line_prefixed() {
        let e = CompileError::typing(&Position::new("x.rul", 7), "bad");
        assert_eq!(e.to_string(), "x.rul:7: bad");
        assert_eq!(e.to_json_value()["stage"], "type");
    }
}

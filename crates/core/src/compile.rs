//! The compile pipeline: parse, check, fold, then level reachability.
//!
//! Every stage reports into one shared [`ErrorBudget`]. A stage runs only
//! if all earlier stages were clean.

use std::fs;
use std::path::Path;
use std::time::Instant;

use crate::ast::Program;
use crate::builtins::Registry;
use crate::error::{CompileError, CompileFailure, ErrorBudget, Position, DEFAULT_MAX_ERRORS};
use crate::fold::fold;
use crate::levels::check_reachable;
use crate::parser::parse;
use crate::pattern::PatternCache;
use crate::typecheck::check;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub registry: Registry,
    pub max_errors: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            registry: Registry::standard(),
            max_errors: DEFAULT_MAX_ERRORS,
        }
    }
}

/// Compile rule source text with the standard builtins.
pub fn compile(src: &str, filename: &str) -> Result<Program, CompileFailure> {
    compile_with(src, filename, &CompileOptions::default())
}

pub fn compile_with(src: &str, filename: &str, opts: &CompileOptions) -> Result<Program, CompileFailure> {
    let mut budget = ErrorBudget::new(opts.max_errors);
    let mut patterns = PatternCache::new();
    match run_stages(src, filename, opts, &mut budget, &mut patterns) {
        Some(program) if budget.is_empty() => {
            tracing::debug!(file = filename, patterns = patterns.len(), "compiled");
            Ok(program)
        }
        _ => Err(budget.into_failure()),
    }
}

fn run_stages(
    src: &str,
    filename: &str,
    opts: &CompileOptions,
    budget: &mut ErrorBudget,
    patterns: &mut PatternCache,
) -> Option<Program> {
    let registry = &opts.registry;

    let start = Instant::now();
    let mut program = parse(src, filename, registry, budget).ok()?;
    tracing::debug!(elapsed = ?start.elapsed(), errors = budget.count(), "parse");
    if !budget.is_empty() {
        return None;
    }

    let start = Instant::now();
    check(&mut program, registry, patterns, budget).ok()?;
    tracing::debug!(elapsed = ?start.elapsed(), errors = budget.count(), "type check");
    if !budget.is_empty() {
        return None;
    }

    let start = Instant::now();
    fold(&mut program, registry, budget).ok()?;
    tracing::debug!(elapsed = ?start.elapsed(), rules = program.rule_count(), "fold");
    if !budget.is_empty() {
        return None;
    }

    check_reachable(&mut program, budget).ok()?;
    Some(program)
}

/// Read and compile a rule file.
pub fn compile_file(path: &Path) -> Result<Program, CompileFailure> {
    let filename = path.display().to_string();
    match fs::read_to_string(path) {
        Ok(src) => compile(&src, &filename),
        Err(e) => {
            let err = CompileError::parse(&Position::new(&filename, 0), format!("cannot read file: {}", e));
            Err(CompileFailure {
                errors: vec![err],
                too_many: false,
            })
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

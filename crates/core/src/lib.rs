//! rips-core: compiler for the rips rule language.
//!
//! Turns `.rul` source into a checked, folded [`Program`] that the
//! evaluator runs against message, graph and external events.
//!
//! # Public API
//!
//! - [`compile()`] / [`compile_file()`] -- run the full pipeline
//! - [`Program`] and the AST types in [`ast`]
//! - [`Registry`] -- builtin signatures shared with the evaluator
//! - [`Value`] -- runtime values and their operation tables
//! - [`CompileError`] / [`CompileFailure`] -- diagnostics
//!
//! Individual stages are public for tools and tests that need to stop
//! part way through.

pub mod ast;
pub mod builtins;
pub mod compile;
pub mod env;
pub mod error;
pub mod fold;
pub mod levels;
pub mod lexer;
pub mod parser;
pub mod pattern;
pub mod printer;
pub mod typecheck;
pub mod types;
pub mod value;

// ── Convenience re-exports: key types ────────────────────────────────

pub use ast::{Action, Call, Connector, Decl, DeclKind, Level, Program, Rule, RuleSection, Sym, SymKind};
pub use builtins::{BuiltinSpec, Registry};
pub use env::{EnvError, EnvStack};
pub use error::{CompileError, CompileFailure, ErrorBudget, Position, Stage};
pub use types::{CtxType, Type, ValType};
pub use value::{Value, ValueFault};

// ── Convenience re-exports: pipeline entry points ────────────────────

pub use compile::{compile, compile_file, compile_with, CompileOptions};
pub use levels::{check_transition, gravity, Transition, TransitionError};
pub use parser::{parse, parse_expr};

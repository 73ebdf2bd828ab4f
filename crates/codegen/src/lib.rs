//! rips-codegen: exports a compiled rips program as Rust source.
//!
//! The generated module holds a `Rules` struct with one field per
//! variable and a `run` method evaluating one pass. It links against
//! `rips-core` for value operations and `rips-eval` for builtins, so a
//! rendered program behaves like the interpreted one.
//!
//! # Public API
//!
//! - [`render()`] -- the whole module as a string
//! - [`RenderModel`] -- the identifiers and dispatch table the emitter uses

pub mod emit;
pub mod model;

use rips_core::{Position, Program};

pub use model::RenderModel;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("{pos}: var {name} has no constant initial value")]
    NotConstant { pos: Position, name: String },
    #[error("{pos}: {ident} is used by two fields")]
    NameClash { pos: Position, ident: String },
    #[error("{pos}: {name} is not declared")]
    Unresolved { pos: Position, name: String },
    #[error("{pos}: set needs a declared variable and a value")]
    BadSet { pos: Position },
    #[error("{pos}: unresolved expression left in the program")]
    Placeholder { pos: Position },
}

/// Render `program` as a standalone Rust module.
pub fn render(program: &Program) -> Result<String, RenderError> {
    let model = RenderModel::from_program(program)?;
    emit::module(&model)
}

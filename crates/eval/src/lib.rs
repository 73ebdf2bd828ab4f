//! rips-eval: runs compiled rips programs against a live event stream.
//!
//! Events arrive as YAML documents describing ROS messages and graph
//! changes. Each one is evaluated against the matching rule section of a
//! [`Program`](rips_core::Program); rules fire builtins that alert, run
//! programs and move the system between security levels.
//!
//! # Public API
//!
//! - [`Decoder`] -- splits the input stream into [`RosMessage`]s
//! - [`Interpreter`] -- evaluates one pass over a section
//! - [`Context`] -- run-time state shared with builtins
//! - [`Dispatcher`] -- the run loop over messages, signals, IDS files and ticks
//! - [`Builtins`] -- implementations bound to the compiler's registry
//! - [`watcher::watch`] -- IDS directory notifications

pub mod builtins;
pub mod context;
pub mod decoder;
pub mod dispatcher;
pub mod error;
pub mod interp;
pub mod levels;
pub mod message;
pub mod stats;
pub mod watcher;

// ── Convenience re-exports: key types ────────────────────────────────

pub use builtins::{Arg, Args, BuiltinFn, Builtins};
pub use context::{Context, FaultPolicy, SignalKind};
pub use decoder::{DecodeError, Decoder};
pub use error::EvalError;
pub use message::{EventKind, MessageView, RosContext, RosMessage, RosNode, RosService, RosTopic};
pub use stats::Stats;

// ── Convenience re-exports: run loop ─────────────────────────────────

pub use dispatcher::{feed, Delivery, Dispatcher, Exit, Sources, DEFAULT_POLL, PATH_BACKLOG};
pub use interp::{ExecEnv, Interpreter, PassReport};
pub use watcher::{watch, IdsWatcher};

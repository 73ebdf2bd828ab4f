//! Rendered rule modules, compiled alongside the interpreter they must
//! agree with.
//!
//! `build.rs` runs `rips_codegen::render` over the rule fixtures; each
//! fixture becomes a module here exposing its generated `Rules` struct.
//! The tests under `tests/` replay the same events through both engines.

include!(concat!(env!("OUT_DIR"), "/rendered.rs"));

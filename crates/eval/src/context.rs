//! State shared by the builtins across evaluation passes.
//!
//! The context owns everything a pass can observe or change outside the
//! variable environment: the active level, pending signal deliveries,
//! IDS files touched since the last tick, the current event and the
//! output channel to the connected peer.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use rips_core::Level;
use tokio::sync::mpsc::UnboundedSender;

use crate::message::{EventKind, MessageView};
use crate::stats::Stats;

/// What a value fault during evaluation does to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Stop the run
    #[default]
    Terminate,
    /// Log it, skip the rest of the rule and carry on
    Continue,
}

/// A delivered process signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    User1,
    User2,
    Interrupt,
    Terminate,
}

impl SignalKind {
    pub fn name(self) -> &'static str {
        match self {
            SignalKind::User1 => "SIGUSR1",
            SignalKind::User2 => "SIGUSR2",
            SignalKind::Interrupt => "SIGINT",
            SignalKind::Terminate => "SIGTERM",
        }
    }
}

pub struct Context {
    levels: Vec<Level>,
    /// Index of the active level
    pub current_level: usize,
    /// Set by the first transition of the run
    pub initialized: bool,
    pub usr1: u32,
    pub usr2: u32,
    /// IDS files changed since the last tick
    pub paths: HashSet<PathBuf>,
    message: Option<Box<dyn MessageView>>,
    pub scripts_dir: Option<PathBuf>,
    peer: Option<UnboundedSender<String>>,
    pub started: Instant,
    pub stats: Stats,
    pub fault_policy: FaultPolicy,
}

impl Context {
    pub fn new(levels: Vec<Level>) -> Self {
        Context {
            levels,
            current_level: 0,
            initialized: false,
            usr1: 0,
            usr2: 0,
            paths: HashSet::new(),
            message: None,
            scripts_dir: None,
            peer: None,
            started: Instant::now(),
            stats: Stats::default(),
            fault_policy: FaultPolicy::default(),
        }
    }

    pub fn with_scripts(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scripts_dir = Some(dir.into());
        self
    }

    /// Send status and alert blocks to `peer`.
    pub fn with_peer(mut self, peer: UnboundedSender<String>) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn level_name(&self, index: usize) -> Option<&str> {
        self.levels.get(index).map(|l| l.name.as_str())
    }

    pub fn current_level_name(&self) -> &str {
        self.level_name(self.current_level).unwrap_or("")
    }

    // ── Current event ────────────────────────────

    pub fn set_message(&mut self, message: Option<Box<dyn MessageView>>) {
        self.message = message;
    }

    pub fn message(&self) -> Option<&dyn MessageView> {
        self.message.as_deref()
    }

    /// Kind of the current event; `External` when there is none.
    pub fn event_kind(&self) -> EventKind {
        self.message
            .as_ref()
            .map_or(EventKind::External, |m| m.kind())
    }

    // ── Signals ──────────────────────────────────

    /// Count one delivery of a user signal.
    pub fn deliver(&mut self, signal: SignalKind) {
        match signal {
            SignalKind::User1 => self.usr1 = self.usr1.saturating_add(1),
            SignalKind::User2 => self.usr2 = self.usr2.saturating_add(1),
            SignalKind::Interrupt | SignalKind::Terminate => {}
        }
    }

    /// Consume one pending delivery of the named signal.
    pub fn take_signal(&mut self, name: &str) -> bool {
        let counter = match name {
            "SIGUSR1" => &mut self.usr1,
            "SIGUSR2" => &mut self.usr2,
            _ => return false,
        };
        if *counter == 0 {
            return false;
        }
        *counter -= 1;
        true
    }

    // ── Peer output ──────────────────────────────

    /// Write raw text to the peer.
    pub fn emit(&self, text: String) {
        match &self.peer {
            Some(peer) => {
                if peer.send(text).is_err() {
                    tracing::warn!("peer output closed, dropping line");
                }
            }
            None => tracing::info!(target: "rips::peer", "{}", text.trim_end()),
        }
    }

    /// Write a one-key YAML document to the peer.
    pub fn emit_doc(&self, key: &str, value: &str) {
        self.emit(format!("---\n{}: '{}'\n...\n", key, value.replace('\'', "''")));
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

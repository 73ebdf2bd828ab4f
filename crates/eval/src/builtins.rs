//! Builtin implementations, bound by name to the signature registry.
//!
//! Every entry has the same shape: it takes the context and the evaluated
//! argument list and returns a value. Predicates and actions return
//! `Bool`; a recoverable failure is logged and reported as `false`.
//! `set` is not here: it needs the variable itself, not its value, and
//! the interpreter handles it.

use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use regex::Regex;
use rips_core::ast::FuncId;
use rips_core::pattern::{Pattern, PayloadRules};
use rips_core::{Registry, Value};

use crate::context::Context;
use crate::error::EvalError;
use crate::levels;
use crate::message::MessageView;

pub type BuiltinFn = fn(&mut Context, &Args<'_>) -> Result<Value, EvalError>;

// ──────────────────────────────────────────────
// Arguments
// ──────────────────────────────────────────────

/// One evaluated argument. Literal patterns are passed precompiled.
#[derive(Debug, Clone)]
pub enum Arg<'a> {
    Value(Value),
    Pattern(&'a Pattern),
}

#[derive(Debug, Clone)]
pub struct Args<'a> {
    func: &'a str,
    items: Vec<Arg<'a>>,
}

impl<'a> Args<'a> {
    pub fn new(func: &'a str, items: Vec<Arg<'a>>) -> Self {
        Args { func, items }
    }

    pub fn from_values(func: &'a str, values: Vec<Value>) -> Self {
        Args::new(func, values.into_iter().map(Arg::Value).collect())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn bad(&self, index: usize) -> EvalError {
        EvalError::BadArgument {
            func: self.func.to_owned(),
            index,
        }
    }

    pub fn value(&self, i: usize) -> Result<&Value, EvalError> {
        match self.items.get(i) {
            Some(Arg::Value(v)) => Ok(v),
            _ => Err(self.bad(i)),
        }
    }

    /// String argument; a pattern yields its literal text.
    pub fn str(&self, i: usize) -> Result<&str, EvalError> {
        match self.items.get(i) {
            Some(Arg::Value(Value::Str(s))) => Ok(s),
            Some(Arg::Pattern(p)) => Ok(&p.source),
            _ => Err(self.bad(i)),
        }
    }

    pub fn int(&self, i: usize) -> Result<i64, EvalError> {
        self.value(i)?.as_int().ok_or_else(|| self.bad(i))
    }

    pub fn level(&self, i: usize) -> Result<usize, EvalError> {
        let v = self.int(i)?;
        usize::try_from(v).map_err(|_| self.bad(i))
    }

    /// String arguments from `from` on.
    pub fn strs(&self, from: usize) -> Result<Vec<&str>, EvalError> {
        (from..self.items.len()).map(|i| self.str(i)).collect()
    }

    pub fn pattern(&self, i: usize) -> Option<&'a Pattern> {
        match self.items.get(i) {
            Some(Arg::Pattern(p)) => Some(*p),
            _ => None,
        }
    }
}

// ──────────────────────────────────────────────
// Table
// ──────────────────────────────────────────────

/// Implementations indexed like the registry the program was compiled
/// against.
#[derive(Clone)]
pub struct Builtins {
    table: Vec<(&'static str, Option<BuiltinFn>)>,
}

impl fmt::Debug for Builtins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.table.iter().map(|(name, _)| name)).finish()
    }
}

impl Builtins {
    /// Bind every registry entry to its implementation.
    pub fn bind(registry: &Registry) -> Result<Self, EvalError> {
        let mut table = Vec::with_capacity(registry.len());
        for (_, spec) in registry.iter() {
            let f = match spec.name {
                "set" => None,
                name => Some(lookup(name).ok_or_else(|| EvalError::MissingBuiltin(name.to_owned()))?),
            };
            table.push((spec.name, f));
        }
        Ok(Builtins { table })
    }

    pub fn standard() -> Result<Self, EvalError> {
        Builtins::bind(&Registry::standard())
    }

    /// Entry for `id`, checked against the name the call site used.
    pub fn get(&self, id: FuncId, name: &str) -> Result<BuiltinFn, EvalError> {
        match self.table.get(id) {
            Some((bound, Some(f))) if *bound == name => Ok(*f),
            Some((bound, _)) if *bound != name => Err(EvalError::BuiltinMismatch {
                expected: name.to_owned(),
                found: (*bound).to_owned(),
            }),
            _ => Err(EvalError::MissingBuiltin(name.to_owned())),
        }
    }
}

/// Implementation of a builtin by name.
pub fn lookup(name: &str) -> Option<BuiltinFn> {
    let f: BuiltinFn = match name {
        "trigger" => trigger,
        "alert" => alert,
        "exec" => exec,
        "True" => debug_true,
        "False" => debug_false,
        "crash" => crash,
        "msgsubtype" => msgsubtype,
        "msgtypein" => msgtypein,
        "payload" => payload,
        "plugin" => plugin,
        "publishercount" => publishercount,
        "publishers" => publishers,
        "publishersinclude" => publishersinclude,
        "subscribercount" => subscribercount,
        "subscribers" => subscribers,
        "subscribersinclude" => subscribersinclude,
        "topicin" => topicin,
        "topicmatches" => topicmatches,
        "nodecount" => nodecount,
        "nodes" => nodes,
        "nodesinclude" => nodesinclude,
        "service" => service,
        "servicecount" => servicecount,
        "services" => services,
        "servicesinclude" => servicesinclude,
        "topiccount" => topiccount,
        "topicpublishercount" => topicpublishercount,
        "topicpublishers" => topicpublishers,
        "topicpublishersinclude" => topicpublishersinclude,
        "topics" => topics,
        "topicsinclude" => topicsinclude,
        "topicsubscribercount" => topicsubscribercount,
        "topicsubscribers" => topicsubscribers,
        "topicsubscribersinclude" => topicsubscribersinclude,
        "signal" => signal,
        "idsalert" => idsalert,
        "levelname" => levelname,
        "string" => string,
        _ => return None,
    };
    Some(f)
}

// ──────────────────────────────────────────────
// Set helpers
// ──────────────────────────────────────────────

/// A list holding one empty string is an empty list.
fn normalize<S: AsRef<str>>(xs: &[S]) -> Vec<&str> {
    match xs {
        [only] if only.as_ref().is_empty() => Vec::new(),
        _ => xs.iter().map(|x| x.as_ref()).collect(),
    }
}

/// Every element of `want` is in `have`.
pub fn includes<S: AsRef<str>, T: AsRef<str>>(have: &[S], want: &[T]) -> bool {
    let have = normalize(have);
    normalize(want).iter().all(|w| have.contains(w))
}

/// `have` and `want` hold the same elements, ignoring order and repeats.
pub fn same_set<S: AsRef<str>, T: AsRef<str>>(have: &[S], want: &[T]) -> bool {
    includes(have, want) && includes(want, have)
}

fn in_range(n: usize, min: i64, max: i64) -> bool {
    let n = i64::try_from(n).unwrap_or(i64::MAX);
    min <= n && n <= max
}

fn yes(b: bool) -> Result<Value, EvalError> {
    Ok(Value::Bool(b))
}

/// Current event, or a logged `false` result.
fn current<'c>(ctx: &'c Context, func: &str) -> Option<&'c dyn MessageView> {
    let m = ctx.message();
    if m.is_none() {
        tracing::warn!(func, "no current event");
    }
    m
}

// ──────────────────────────────────────────────
// Actions
// ──────────────────────────────────────────────

fn trigger(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let from = args.level(0)?;
    let to = args.level(1)?;
    yes(levels::trigger(ctx, from, to))
}

fn alert(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let msg = args.str(0)?;
    tracing::info!(alert = msg, level = ctx.current_level_name(), "alert");
    ctx.emit_doc("alert", msg);
    yes(true)
}

/// Run `path` with `args`; true on exit status 0.
pub fn run_program(path: &str, args: &[&str], stdin: Option<&[u8]>) -> bool {
    let mut cmd = Command::new(path);
    cmd.args(args);
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    }
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(program = path, error = %e, "cannot start program");
            return false;
        }
    };
    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        // the program may exit without reading
        if let Err(e) = pipe.write_all(input) {
            tracing::debug!(program = path, error = %e, "stdin write");
        }
    }
    match child.wait() {
        Ok(status) if status.success() => true,
        Ok(status) => {
            tracing::warn!(program = path, %status, "program failed");
            false
        }
        Err(e) => {
            tracing::warn!(program = path, error = %e, "cannot wait for program");
            false
        }
    }
}

fn exec(_ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let path = args.str(0)?;
    let rest = args.strs(1)?;
    yes(run_program(path, &rest, None))
}

fn log_args(args: &Args<'_>) -> String {
    args.items
        .iter()
        .map(|a| match a {
            Arg::Value(v) => v.to_string(),
            Arg::Pattern(p) => p.source.clone(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn debug_true(_ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    tracing::info!(args = %log_args(args), "True");
    yes(true)
}

fn debug_false(_ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    tracing::info!(args = %log_args(args), "False");
    yes(false)
}

fn crash(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let msg = args.str(0)?;
    tracing::error!(msg, "crash");
    ctx.emit_doc("crashing", msg);
    Err(EvalError::Crash(msg.to_owned()))
}

// ──────────────────────────────────────────────
// Message predicates
// ──────────────────────────────────────────────

fn msgsubtype(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let (pkg, ty) = (args.str(0)?, args.str(1)?);
    let Some(m) = current(ctx, "msgsubtype") else {
        return yes(false);
    };
    yes(m.message_type(m.source_topic()) == Some((pkg, ty)))
}

fn msgtypein(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let wanted = args.strs(0)?;
    if wanted.is_empty() {
        return yes(true);
    }
    let Some(m) = current(ctx, "msgtypein") else {
        return yes(false);
    };
    let pkg = m.message_type(m.source_topic()).map(|(pkg, _)| pkg);
    yes(pkg.is_some_and(|p| wanted.contains(&p)))
}

fn payload(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let Some(m) = current(ctx, "payload") else {
        return yes(false);
    };
    let bytes = match m.raw_payload() {
        Ok(b) => b,
        Err(e) => {
            // an undecodable payload is suspicious in itself
            tracing::warn!(error = %e, "payload: decode error");
            return yes(true);
        }
    };
    let loaded;
    let rules = match args.pattern(0).and_then(Pattern::payload) {
        Some(r) => r,
        None => {
            let path = args.str(0)?;
            loaded = match fs::read_to_string(path).map(|t| PayloadRules::parse(&t)) {
                Ok(Ok(r)) => r,
                Ok(Err(e)) => {
                    tracing::warn!(path, error = %e, "payload: bad pattern file");
                    return yes(false);
                }
                Err(e) => {
                    tracing::warn!(path, error = %e, "payload: cannot read pattern file");
                    return yes(false);
                }
            };
            &loaded
        }
    };
    let hits = rules.matches(&bytes);
    if !hits.is_empty() {
        tracing::warn!(file = args.str(0)?, rules = ?hits, "payload: positive");
    }
    yes(!hits.is_empty())
}

fn plugin(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let path = args.str(0)?;
    let Some(m) = current(ctx, "plugin") else {
        return yes(false);
    };
    match m.raw_payload() {
        Ok(bytes) => yes(run_program(path, &[], Some(&bytes))),
        Err(e) => {
            tracing::warn!(error = %e, "plugin: decode error");
            yes(false)
        }
    }
}

/// Apply `f` to the publisher or subscriber list of the event's topic.
fn source_topic_list(
    ctx: &Context,
    func: &str,
    subscribers: bool,
    f: impl FnOnce(&[String]) -> bool,
) -> Result<Value, EvalError> {
    let Some(m) = current(ctx, func) else {
        return yes(false);
    };
    let topic = m.source_topic();
    let list = if subscribers {
        m.subscribers_of(topic)
    } else {
        m.publishers_of(topic)
    };
    yes(f(list))
}

fn publishercount(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let (min, max) = (args.int(0)?, args.int(1)?);
    source_topic_list(ctx, "publishercount", false, |l| in_range(normalize(l).len(), min, max))
}

fn publishers(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let want = args.strs(0)?;
    source_topic_list(ctx, "publishers", false, |l| same_set(l, &want))
}

fn publishersinclude(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let want = args.strs(0)?;
    source_topic_list(ctx, "publishersinclude", false, |l| includes(l, &want))
}

fn subscribercount(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let (min, max) = (args.int(0)?, args.int(1)?);
    source_topic_list(ctx, "subscribercount", true, |l| in_range(normalize(l).len(), min, max))
}

fn subscribers(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let want = args.strs(0)?;
    source_topic_list(ctx, "subscribers", true, |l| same_set(l, &want))
}

fn subscribersinclude(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let want = args.strs(0)?;
    source_topic_list(ctx, "subscribersinclude", true, |l| includes(l, &want))
}

fn topicin(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let topics = args.strs(0)?;
    let Some(m) = current(ctx, "topicin") else {
        return yes(false);
    };
    yes(topics.contains(&m.source_topic()))
}

fn topicmatches(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let Some(m) = current(ctx, "topicmatches") else {
        return yes(false);
    };
    let topic = m.source_topic();
    if let Some(re) = args.pattern(0).and_then(Pattern::regex) {
        return yes(re.is_match(topic));
    }
    let source = args.str(0)?;
    match Regex::new(source) {
        Ok(re) => yes(re.is_match(topic)),
        Err(e) => {
            tracing::warn!(pattern = source, error = %e, "topicmatches: bad regex");
            yes(false)
        }
    }
}

// ──────────────────────────────────────────────
// Graph predicates
// ──────────────────────────────────────────────

fn nodecount(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let (min, max) = (args.int(0)?, args.int(1)?);
    let Some(m) = current(ctx, "nodecount") else {
        return yes(false);
    };
    yes(in_range(m.nodes().len(), min, max))
}

fn nodes(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let want = args.strs(0)?;
    let Some(m) = current(ctx, "nodes") else {
        return yes(false);
    };
    yes(same_set(&m.node_names(), &want))
}

fn nodesinclude(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let want = args.strs(0)?;
    let Some(m) = current(ctx, "nodesinclude") else {
        return yes(false);
    };
    yes(includes(&m.node_names(), &want))
}

/// Apply `f` to the service names of `node`; false if the node is absent.
fn node_services(ctx: &Context, func: &str, node: &str, f: impl FnOnce(&[&str]) -> bool) -> Result<Value, EvalError> {
    let Some(m) = current(ctx, func) else {
        return yes(false);
    };
    match m.node(node) {
        Some(n) => yes(f(&n.service_names())),
        None => {
            tracing::debug!(func, node, "node not in graph");
            yes(false)
        }
    }
}

fn service(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let (node, svc) = (args.str(0)?, args.str(1)?);
    node_services(ctx, "service", node, |names| names.contains(&svc))
}

fn servicecount(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let node = args.str(0)?;
    let (min, max) = (args.int(1)?, args.int(2)?);
    node_services(ctx, "servicecount", node, |names| in_range(names.len(), min, max))
}

fn services(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let node = args.str(0)?;
    let want = args.strs(1)?;
    node_services(ctx, "services", node, |names| same_set(names, &want))
}

fn servicesinclude(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let node = args.str(0)?;
    let want = args.strs(1)?;
    node_services(ctx, "servicesinclude", node, |names| includes(names, &want))
}

fn topiccount(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let (min, max) = (args.int(0)?, args.int(1)?);
    let Some(m) = current(ctx, "topiccount") else {
        return yes(false);
    };
    yes(in_range(m.topic_names().len(), min, max))
}

fn topics(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let want = args.strs(0)?;
    let Some(m) = current(ctx, "topics") else {
        return yes(false);
    };
    yes(same_set(&m.topic_names(), &want))
}

fn topicsinclude(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let want = args.strs(0)?;
    let Some(m) = current(ctx, "topicsinclude") else {
        return yes(false);
    };
    yes(includes(&m.topic_names(), &want))
}

/// Apply `f` to the publisher or subscriber list of a named topic.
fn named_topic_list(
    ctx: &Context,
    func: &str,
    topic: &str,
    subscribers: bool,
    f: impl FnOnce(&[String]) -> bool,
) -> Result<Value, EvalError> {
    let Some(m) = current(ctx, func) else {
        return yes(false);
    };
    let list = if subscribers {
        m.subscribers_of(topic)
    } else {
        m.publishers_of(topic)
    };
    yes(f(list))
}

fn topicpublishercount(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let topic = args.str(0)?;
    let (min, max) = (args.int(1)?, args.int(2)?);
    named_topic_list(ctx, "topicpublishercount", topic, false, |l| {
        in_range(normalize(l).len(), min, max)
    })
}

fn topicpublishers(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let topic = args.str(0)?;
    let want = args.strs(1)?;
    named_topic_list(ctx, "topicpublishers", topic, false, |l| same_set(l, &want))
}

fn topicpublishersinclude(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let topic = args.str(0)?;
    let want = args.strs(1)?;
    named_topic_list(ctx, "topicpublishersinclude", topic, false, |l| includes(l, &want))
}

fn topicsubscribercount(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let topic = args.str(0)?;
    let (min, max) = (args.int(1)?, args.int(2)?);
    named_topic_list(ctx, "topicsubscribercount", topic, true, |l| {
        in_range(normalize(l).len(), min, max)
    })
}

fn topicsubscribers(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let topic = args.str(0)?;
    let want = args.strs(1)?;
    named_topic_list(ctx, "topicsubscribers", topic, true, |l| same_set(l, &want))
}

fn topicsubscribersinclude(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let topic = args.str(0)?;
    let want = args.strs(1)?;
    named_topic_list(ctx, "topicsubscribersinclude", topic, true, |l| includes(l, &want))
}

// ──────────────────────────────────────────────
// External predicates
// ──────────────────────────────────────────────

fn signal(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let name = args.str(0)?;
    yes(ctx.take_signal(name))
}

/// Some line of the file at `path` contains `needle`.
pub fn file_contains(path: &Path, needle: &str) -> bool {
    let Ok(file) = fs::File::open(path) else {
        return false;
    };
    let needle = needle.as_bytes();
    BufReader::new(file)
        .split(b'\n')
        .map_while(Result::ok)
        .any(|line| needle.is_empty() || line.windows(needle.len()).any(|w| w == needle))
}

fn idsalert(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let needle = args.str(0)?;
    yes(ctx.paths.iter().any(|p| file_contains(p, needle)))
}

// ──────────────────────────────────────────────
// Pure
// ──────────────────────────────────────────────

fn levelname(ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    let index = args.level(0)?;
    match ctx.level_name(index) {
        Some(name) => Ok(Value::Str(name.to_owned())),
        None => Err(EvalError::BadArgument {
            func: "levelname".to_owned(),
            index: 0,
        }),
    }
}

fn string(_ctx: &mut Context, args: &Args<'_>) -> Result<Value, EvalError> {
    Ok(Value::Str(args.value(0)?.to_string()))
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RosMessage;
    use rips_core::{Level, Position};

    fn context(event: &str) -> Context {
        let levels = vec![Level {
            name: "calm".into(),
            index: 0,
            soft: false,
            reachable: true,
            pos: Position::new("t.rul", 1),
        }];
        let msg: RosMessage = serde_yaml::from_str(event).unwrap();
        let mut ctx = Context::new(levels);
        ctx.set_message(Some(Box::new(msg)));
        ctx
    }

    const EVENT: &str = r#"
event: message
fromtopic: /cmd_vel
rawmsg: c3RvcA==
context:
  nodes:
    - node: /teleop
      services: [{service: /teleop/reset}, {service: /teleop/get_loggers}]
    - node: /base
  topics:
    - topic: /cmd_vel
      parameters: [geometry_msgs/msg/Twist]
      publishers: [/teleop]
      subscribers: [/base, /recorder]
"#;

    fn call(ctx: &mut Context, name: &str, values: Vec<Value>) -> Value {
        let f = lookup(name).unwrap();
        f(ctx, &Args::from_values(name, values)).unwrap()
    }

    fn s(v: &str) -> Value {
        Value::Str(v.to_owned())
    }

    #[test]
    fn every_registry_entry_has_an_implementation() {
        let b = Builtins::standard().unwrap();
        let reg = Registry::standard();
        for (id, spec) in reg.iter() {
            let bound = b.get(id, spec.name);
            if spec.name == "set" {
                assert!(bound.is_err());
            } else {
                assert!(bound.is_ok(), "{}", spec.name);
            }
        }
        let id = reg.find("alert").unwrap();
        assert!(matches!(b.get(id, "crash"), Err(EvalError::BuiltinMismatch { .. })));
    }

    #[test]
    fn set_semantics() {
        assert!(includes(&["a", "b"], &["b"]));
        assert!(includes(&["a"], &[] as &[&str]));
        assert!(!includes(&["a"], &["c"]));
        assert!(same_set(&["a", "b"], &["b", "a", "a"]));
        assert!(!same_set(&["a", "b"], &["a"]));
        assert!(same_set(&[""], &[] as &[&str]));
    }

    #[test]
    fn message_predicates() {
        let mut ctx = context(EVENT);
        assert_eq!(call(&mut ctx, "topicin", vec![s("/odom"), s("/cmd_vel")]), Value::Bool(true));
        assert_eq!(call(&mut ctx, "topicin", vec![s("/odom")]), Value::Bool(false));
        assert_eq!(call(&mut ctx, "msgtypein", vec![s("geometry_msgs")]), Value::Bool(true));
        assert_eq!(call(&mut ctx, "msgtypein", vec![]), Value::Bool(true));
        assert_eq!(
            call(&mut ctx, "msgsubtype", vec![s("geometry_msgs"), s("Twist")]),
            Value::Bool(true)
        );
        assert_eq!(call(&mut ctx, "publishers", vec![s("/teleop")]), Value::Bool(true));
        assert_eq!(call(&mut ctx, "subscribersinclude", vec![s("/base")]), Value::Bool(true));
        assert_eq!(call(&mut ctx, "subscribers", vec![s("/base")]), Value::Bool(false));
        assert_eq!(
            call(&mut ctx, "subscribercount", vec![Value::Int(2), Value::Int(2)]),
            Value::Bool(true)
        );
        assert_eq!(
            call(&mut ctx, "publishercount", vec![Value::Int(2), Value::Int(5)]),
            Value::Bool(false)
        );
    }

    #[test]
    fn topicmatches_compiles_unprepared_patterns() {
        let mut ctx = context(EVENT);
        assert_eq!(call(&mut ctx, "topicmatches", vec![s("^/cmd_")]), Value::Bool(true));
        assert_eq!(call(&mut ctx, "topicmatches", vec![s("(")]), Value::Bool(false));
    }

    #[test]
    fn graph_predicates() {
        let mut ctx = context(EVENT);
        assert_eq!(call(&mut ctx, "nodes", vec![s("/base"), s("/teleop")]), Value::Bool(true));
        assert_eq!(call(&mut ctx, "nodesinclude", vec![s("/teleop")]), Value::Bool(true));
        assert_eq!(call(&mut ctx, "nodecount", vec![Value::Int(1), Value::Int(1)]), Value::Bool(false));
        assert_eq!(call(&mut ctx, "service", vec![s("/teleop"), s("/teleop/reset")]), Value::Bool(true));
        assert_eq!(call(&mut ctx, "service", vec![s("/ghost"), s("/teleop/reset")]), Value::Bool(false));
        assert_eq!(
            call(&mut ctx, "servicecount", vec![s("/base"), Value::Int(0), Value::Int(0)]),
            Value::Bool(true)
        );
        assert_eq!(call(&mut ctx, "services", vec![s("/ghost")]), Value::Bool(false));
        assert_eq!(call(&mut ctx, "topics", vec![s("/cmd_vel")]), Value::Bool(true));
        assert_eq!(
            call(&mut ctx, "topicsubscribersinclude", vec![s("/cmd_vel"), s("/recorder")]),
            Value::Bool(true)
        );
        assert_eq!(
            call(&mut ctx, "topicpublishercount", vec![s("/nope"), Value::Int(0), Value::Int(0)]),
            Value::Bool(true)
        );
    }

    #[test]
    fn missing_event_is_false() {
        let mut ctx = context(EVENT);
        ctx.set_message(None);
        assert_eq!(call(&mut ctx, "topicin", vec![s("/cmd_vel")]), Value::Bool(false));
        assert_eq!(call(&mut ctx, "nodecount", vec![Value::Int(0), Value::Int(9)]), Value::Bool(false));
    }

    #[test]
    fn idsalert_greps_changed_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rips.alert");
        fs::write(&path, "first line\n[**] Portscan detected [**]").unwrap();
        let mut ctx = context(EVENT);
        assert_eq!(call(&mut ctx, "idsalert", vec![s("Portscan")]), Value::Bool(false));
        ctx.paths.insert(path);
        assert_eq!(call(&mut ctx, "idsalert", vec![s("Portscan")]), Value::Bool(true));
        assert_eq!(call(&mut ctx, "idsalert", vec![s("Worm")]), Value::Bool(false));
    }

    #[test]
    fn payload_reads_pattern_files_at_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let rules = dir.path().join("stop.pat");
        fs::write(&rules, "# halt commands\nst[o0]p\n").unwrap();
        let mut ctx = context(EVENT);
        let path = rules.display().to_string();
        assert_eq!(call(&mut ctx, "payload", vec![s(&path)]), Value::Bool(true));
        assert_eq!(call(&mut ctx, "payload", vec![s("/nonexistent.pat")]), Value::Bool(false));
    }

    #[test]
    fn crash_stops_the_pass() {
        let mut ctx = context(EVENT);
        let f = lookup("crash").unwrap();
        let err = f(&mut ctx, &Args::from_values("crash", vec![s("bye")])).unwrap_err();
        assert_eq!(err, EvalError::Crash("bye".into()));
    }

    #[test]
    fn exec_reports_exit_status() {
        let mut ctx = context(EVENT);
        assert_eq!(call(&mut ctx, "exec", vec![s("/bin/sh"), s("-c"), s("exit 0")]), Value::Bool(true));
        assert_eq!(call(&mut ctx, "exec", vec![s("/bin/sh"), s("-c"), s("exit 3")]), Value::Bool(false));
        assert_eq!(call(&mut ctx, "exec", vec![s("/nonexistent/prog")]), Value::Bool(false));
    }

    #[test]
    fn string_and_levelname() {
        let mut ctx = context(EVENT);
        assert_eq!(call(&mut ctx, "string", vec![Value::Int(16)]), s("16"));
        assert_eq!(call(&mut ctx, "levelname", vec![Value::Level(0)]), s("calm"));
    }
}

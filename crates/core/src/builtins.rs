//! Builtin function signatures.
//!
//! The registry carries only what the parser and checkers need; entry
//! points live in the evaluator, which binds them by name.

use crate::ast::FuncId;
use crate::types::{CtxType, Type, ValType};

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltinSpec {
    pub name: &'static str,
    pub ret: ValType,
    /// Section context the call is restricted to
    pub ctx: CtxType,
    pub args: Vec<ValType>,
    /// The last argument type repeats zero or more times
    pub variadic: bool,
    pub action: bool,
}

impl BuiltinSpec {
    pub fn min_args(&self) -> usize {
        if self.variadic {
            self.args.len().saturating_sub(1)
        } else {
            self.args.len()
        }
    }

    pub fn accepts(&self, n: usize) -> bool {
        if self.variadic {
            n >= self.min_args()
        } else {
            n == self.args.len()
        }
    }

    /// Declared type of argument `i`, repeating the last one for variadics.
    pub fn arg_type(&self, i: usize) -> Option<ValType> {
        match self.args.get(i) {
            Some(t) => Some(*t),
            None if self.variadic => self.args.last().copied(),
            None => None,
        }
    }

    pub fn ret_type(&self) -> Type {
        Type::new(self.ret, self.ctx)
    }
}

/// Builtins visible to a compilation, in declaration order.
#[derive(Debug, Clone)]
pub struct Registry {
    specs: Vec<BuiltinSpec>,
}

fn spec(
    name: &'static str,
    ret: ValType,
    ctx: CtxType,
    args: &[ValType],
    variadic: bool,
    action: bool,
) -> BuiltinSpec {
    BuiltinSpec {
        name,
        ret,
        ctx,
        args: args.to_vec(),
        variadic,
        action,
    }
}

impl Registry {
    pub fn new(specs: Vec<BuiltinSpec>) -> Self {
        Registry { specs }
    }

    /// The full builtin library.
    pub fn standard() -> Self {
        use CtxType::{Expr, External, Graph, Msg};
        use ValType::{Bool, Int, Str, Univ};

        let act = |name, args: &[ValType], variadic| spec(name, Bool, Expr, args, variadic, true);
        let msg = |name, args: &[ValType], variadic| spec(name, Bool, Msg, args, variadic, false);
        let graph = |name, args: &[ValType], variadic| spec(name, Bool, Graph, args, variadic, false);
        let ext = |name, args: &[ValType]| spec(name, Bool, External, args, false, false);

        Registry::new(vec![
            // actions
            act("set", &[Univ, Univ], false),
            act("trigger", &[Int], false),
            act("alert", &[Str], false),
            act("exec", &[Str, Str], true),
            act("True", &[Univ], true),
            act("False", &[Univ], true),
            act("crash", &[Str], false),
            // message events
            msg("msgsubtype", &[Str, Str], false),
            msg("msgtypein", &[Str], true),
            msg("payload", &[Str], false),
            msg("plugin", &[Str], false),
            msg("publishercount", &[Int, Int], false),
            msg("publishers", &[Str], true),
            msg("publishersinclude", &[Str], true),
            msg("subscribercount", &[Int, Int], false),
            msg("subscribers", &[Str], true),
            msg("subscribersinclude", &[Str], true),
            msg("topicin", &[Str], true),
            msg("topicmatches", &[Str], false),
            // graph events
            graph("nodecount", &[Int, Int], false),
            graph("nodes", &[Str], true),
            graph("nodesinclude", &[Str], true),
            graph("service", &[Str, Str], false),
            graph("servicecount", &[Str, Int, Int], false),
            graph("services", &[Str, Str], true),
            graph("servicesinclude", &[Str, Str], true),
            graph("topiccount", &[Int, Int], false),
            graph("topicpublishercount", &[Str, Int, Int], false),
            graph("topicpublishers", &[Str, Str], true),
            graph("topicpublishersinclude", &[Str, Str], true),
            graph("topics", &[Str], true),
            graph("topicsinclude", &[Str], true),
            graph("topicsubscribercount", &[Str, Int, Int], false),
            graph("topicsubscribers", &[Str, Str], true),
            graph("topicsubscribersinclude", &[Str, Str], true),
            // external events
            ext("signal", &[Str]),
            ext("idsalert", &[Str]),
            // pure
            spec("levelname", Str, Expr, &[Int], false, false),
            spec("string", Str, Expr, &[Univ], false, false),
        ])
    }

    pub fn get(&self, id: FuncId) -> Option<&BuiltinSpec> {
        self.specs.get(id)
    }

    pub fn find(&self, name: &str) -> Option<FuncId> {
        self.specs.iter().position(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FuncId, &BuiltinSpec)> {
        self.specs.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::standard()
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

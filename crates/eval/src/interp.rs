//! Tree-walking evaluation of a compiled program.
//!
//! The compiled [`Program`] is never mutated. Variable values live in an
//! [`ExecEnv`] built once per run from the program's declarations, so
//! consecutive passes see each other's assignments.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rips_core::ast::{BinOp, Call, DeclKind, Rule, RuleSection, Sym, SymKind};
use rips_core::parser::PREDEFINED_VARS;
use rips_core::{Connector, EnvStack, Program, Value, ValueFault};

use crate::builtins::{Arg, Args, Builtins};
use crate::context::{Context, FaultPolicy};
use crate::error::EvalError;
use crate::message::EventKind;

// ──────────────────────────────────────────────
// Exec environment
// ──────────────────────────────────────────────

/// Current values of every variable and constant of a program.
#[derive(Debug, Clone)]
pub struct ExecEnv {
    env: EnvStack<Value>,
}

impl ExecEnv {
    /// Predefined variables in the base scope, program declarations in a
    /// scope above it.
    pub fn new(program: &Program) -> Self {
        let mut env = EnvStack::new();
        for name in PREDEFINED_VARS {
            let initial = if name == "CurrLevel" {
                Value::Level(0)
            } else {
                Value::Int(0)
            };
            // names are distinct, so declaring cannot fail
            let _ = env.declare(name, initial);
        }
        env.push();
        for decl in &program.decls {
            let Some(value) = decl.value.const_value() else {
                tracing::warn!(name = %decl.name, "declaration did not fold to a constant");
                continue;
            };
            if env.declare(&decl.name, value).is_err() {
                tracing::warn!(name = %decl.name, kind = ?decl.kind, "duplicate declaration");
            }
        }
        ExecEnv { env }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.env.lookup(name)
    }

    /// Assign an existing name. Returns false if it was never declared.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        match self.env.lookup_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Refresh `CurrLevel`, `Time` and `Uptime` before a pass.
    pub fn set_predef_vars(&mut self, ctx: &Context) {
        for name in PREDEFINED_VARS {
            if let Some(value) = predef_value(name, ctx) {
                self.set(name, value);
            }
        }
    }
}

/// Current value of a predefined variable. `Time` is nanoseconds since
/// the epoch and `Uptime` nanoseconds since the run started.
pub fn predef_value(name: &str, ctx: &Context) -> Option<Value> {
    let nanos = |d: std::time::Duration| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX);
    match name {
        "CurrLevel" => Some(Value::Level(ctx.current_level)),
        "Time" => Some(Value::Int(
            SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, nanos),
        )),
        "Uptime" => Some(Value::Int(nanos(ctx.started.elapsed()))),
        _ => None,
    }
}

// ──────────────────────────────────────────────
// Reports
// ──────────────────────────────────────────────

/// What one evaluation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Section that ran, if any matched the event
    pub section: Option<String>,
    /// Rules whose guard held
    pub fired: usize,
    /// Actions executed across all rules
    pub actions: usize,
    /// Rules abandoned after a value fault
    pub faults: usize,
}

// ──────────────────────────────────────────────
// Interpreter
// ──────────────────────────────────────────────

pub struct Interpreter {
    program: Arc<Program>,
    builtins: Builtins,
    env: ExecEnv,
}

impl Interpreter {
    pub fn new(program: Arc<Program>, builtins: Builtins) -> Self {
        let env = ExecEnv::new(&program);
        Interpreter {
            program,
            builtins,
            env,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn env(&self) -> &ExecEnv {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut ExecEnv {
        &mut self.env
    }

    /// Run the section matching the current event.
    pub fn run(&mut self, ctx: &mut Context) -> Result<PassReport, EvalError> {
        self.env.set_predef_vars(ctx);
        let program = Arc::clone(&self.program);
        let mut report = PassReport::default();
        let Some(section) = select_section(&program, ctx.event_kind()) else {
            return Ok(report);
        };
        report.section = Some(section.name.clone());
        tracing::debug!(section = %section.name, rules = section.rules.len(), "pass");

        for rule in &section.rules {
            match self.run_rule(rule, ctx) {
                Ok(None) => {}
                Ok(Some(actions)) => {
                    report.fired += 1;
                    report.actions += actions;
                }
                Err(EvalError::Fault { pos, fault }) if ctx.fault_policy == FaultPolicy::Continue => {
                    tracing::error!(rule = %rule.id, %pos, %fault, "value fault, rule abandoned");
                    report.faults += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Evaluate one rule. `None` if the guard did not hold, otherwise the
    /// number of actions executed.
    pub fn run_rule(&mut self, rule: &Rule, ctx: &mut Context) -> Result<Option<usize>, EvalError> {
        if !self.eval(&rule.guard, ctx)?.is_true() {
            return Ok(None);
        }
        let mut succeeded = true;
        let mut executed = 0;
        for (i, action) in rule.actions.iter().enumerate() {
            let run = i == 0
                || match action.connector {
                    Connector::Comma => true,
                    Connector::Then => succeeded,
                    Connector::NotThen => !succeeded,
                };
            if !run {
                break;
            }
            succeeded = self.eval(&action.call, ctx)?.is_true();
            executed += 1;
            tracing::debug!(rule = %rule.id, action = %action.call, succeeded, "action");
        }
        Ok(Some(executed))
    }

    pub fn eval(&mut self, sym: &Sym, ctx: &mut Context) -> Result<Value, EvalError> {
        let fault = |fault: ValueFault| EvalError::Fault {
            pos: sym.pos.clone(),
            fault,
        };
        match &sym.kind {
            SymKind::Const(v) => Ok(v.clone()),
            SymKind::Level(l) => Ok(Value::Level(l.index)),
            SymKind::Pattern(p) => Ok(Value::Str(p.source.clone())),
            SymKind::ConstRef(name) => self.lookup(name, sym),
            SymKind::Var(v) => self.lookup(&v.name, sym),
            SymKind::Unary(op, e) => {
                let v = self.eval(e, ctx)?;
                v.unary(*op).map_err(fault)
            }
            SymKind::Binary(BinOp::And, l, r) => {
                if !self.eval(l, ctx)?.is_true() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(r, ctx)?.is_true()))
            }
            SymKind::Binary(BinOp::Or, l, r) => {
                if self.eval(l, ctx)?.is_true() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(r, ctx)?.is_true()))
            }
            SymKind::Binary(op, l, r) => {
                let lv = self.eval(l, ctx)?;
                let rv = self.eval(r, ctx)?;
                lv.binary(*op, &rv).map_err(fault)
            }
            SymKind::Call(call) => self.call(call, sym, ctx),
            SymKind::None => Err(EvalError::Internal {
                pos: sym.pos.clone(),
                message: "error placeholder reached the interpreter".to_owned(),
            }),
        }
    }

    fn lookup(&self, name: &str, sym: &Sym) -> Result<Value, EvalError> {
        self.env.get(name).cloned().ok_or_else(|| EvalError::Undeclared {
            pos: sym.pos.clone(),
            name: name.to_owned(),
        })
    }

    fn call(&mut self, call: &Call, sym: &Sym, ctx: &mut Context) -> Result<Value, EvalError> {
        if call.name == "set" {
            return self.assign(call, sym, ctx);
        }
        let f = self.builtins.get(call.func, &call.name)?;
        let mut items = Vec::with_capacity(call.args.len() + 1);
        if call.name == "trigger" {
            items.push(Arg::Value(Value::Level(ctx.current_level)));
        }
        for arg in &call.args {
            match &arg.kind {
                SymKind::Pattern(p) => items.push(Arg::Pattern(p)),
                _ => items.push(Arg::Value(self.eval(arg, ctx)?)),
            }
        }
        f(ctx, &Args::new(&call.name, items))
    }

    /// `set(var, value)`: the first argument names the slot to write.
    fn assign(&mut self, call: &Call, sym: &Sym, ctx: &mut Context) -> Result<Value, EvalError> {
        let (Some(target), Some(rhs)) = (call.args.first(), call.args.get(1)) else {
            return Err(EvalError::BadArgument {
                func: "set".to_owned(),
                index: call.args.len(),
            });
        };
        let Some(var) = target.as_var() else {
            return Err(EvalError::Internal {
                pos: sym.pos.clone(),
                message: format!("set: {} is not a variable", target),
            });
        };
        let value = self.eval(rhs, ctx)?;
        if !self.env.set(&var.name, value) {
            return Err(EvalError::Undeclared {
                pos: target.pos.clone(),
                name: var.name.clone(),
            });
        }
        Ok(Value::Bool(true))
    }
}

/// The section an event of `kind` runs: the one named after the kind.
/// Sections with any other name never run.
pub fn select_section(program: &Program, kind: EventKind) -> Option<&RuleSection> {
    program.section(kind.section_name())
}

/// Names declared as variables, in declaration order.
pub fn var_names(program: &Program) -> Vec<&str> {
    program
        .decls
        .iter()
        .filter(|d| d.kind == DeclKind::Var)
        .map(|d| d.name.as_str())
        .collect()
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

//! Type annotation and checking.
//!
//! [`Checker::annotate`] computes every node's type bottom-up and records
//! variable usage. [`Checker::type_check`] then
//! walks top-down against the section context and reports errors. A node
//! whose children already failed does not report again.

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::ast::{Call, DeclKind, Program, Sym, SymKind};
use crate::builtins::{BuiltinSpec, Registry};
use crate::error::{CompileError, ErrorBudget, TooManyErrors};
use crate::parser::PREDEFINED_VARS;
use crate::pattern::PatternCache;
use crate::types::{CtxType, Type, ValType};
use crate::value::Value;

#[derive(Debug, Default, Clone, Copy)]
struct VarUsage {
    set: bool,
    used: bool,
}

pub struct Checker<'a> {
    registry: &'a Registry,
    patterns: &'a mut PatternCache,
    budget: &'a mut ErrorBudget,
    usage: HashMap<String, VarUsage>,
}

/// Check a parsed program in place. Errors go to `budget`.
pub fn check(
    program: &mut Program,
    registry: &Registry,
    patterns: &mut PatternCache,
    budget: &mut ErrorBudget,
) -> Result<(), TooManyErrors> {
    let mut checker = Checker::new(registry, patterns, budget);
    checker.check_program(program)
}

pub fn is_executable(path: impl AsRef<Path>) -> bool {
    match path.as_ref().metadata() {
        Ok(md) => md.is_file() && md.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

fn describe(sym: &Sym) -> String {
    match &sym.kind {
        SymKind::Const(Value::Str(s)) => format!("{:?}", s),
        SymKind::Const(v) => v.to_string(),
        SymKind::ConstRef(n) => n.clone(),
        SymKind::Var(v) => v.name.clone(),
        SymKind::Level(l) => l.name.clone(),
        SymKind::Call(c) => format!("{}()", c.name),
        SymKind::Unary(op, _) => format!("unary '{}' expression", op.symbol()),
        SymKind::Binary(op, _, _) => format!("'{}' expression", op.symbol()),
        SymKind::Pattern(p) => format!("{:?}", p.source),
        SymKind::None => "<none>".to_owned(),
    }
}

impl<'a> Checker<'a> {
    pub fn new(
        registry: &'a Registry,
        patterns: &'a mut PatternCache,
        budget: &'a mut ErrorBudget,
    ) -> Self {
        Checker {
            registry,
            patterns,
            budget,
            usage: HashMap::new(),
        }
    }

    fn error(&mut self, sym: &Sym, msg: impl Into<String>) -> Result<bool, TooManyErrors> {
        self.budget.record(CompileError::typing(&sym.pos, msg))?;
        Ok(false)
    }

    fn spec(&self, call: &Call) -> Option<&'a BuiltinSpec> {
        self.registry.get(call.func)
    }

    pub fn check_program(&mut self, program: &mut Program) -> Result<(), TooManyErrors> {
        for decl in program.vars() {
            self.usage.insert(decl.name.clone(), VarUsage::default());
        }

        for decl in &mut program.decls {
            self.annotate(&mut decl.value);
            if !self.type_check(&mut decl.value, CtxType::Expr, false)? {
                continue;
            }
            let declared = Type::new(decl.ty, CtxType::Expr);
            if decl.value.ty.is_undef() || !declared.compatible(&decl.value.ty) {
                let msg = format!(
                    "incompatible initializer for {} {}: {} is {}",
                    match decl.kind {
                        DeclKind::Const => "const",
                        DeclKind::Var => "var",
                    },
                    decl.name,
                    describe(&decl.value),
                    decl.value.ty.val.name()
                );
                self.error(&decl.value, msg)?;
            }
        }

        for sect in &mut program.sections {
            let ctx = sect.ctx;
            if ctx == CtxType::Undef {
                let msg = format!("unknown section type {}", sect.name);
                self.budget.record(CompileError::typing(&sect.pos, msg))?;
                continue;
            }
            for rule in &mut sect.rules {
                self.annotate(&mut rule.guard);
                if self.type_check(&mut rule.guard, ctx, false)?
                    && rule.guard.ty.val != ValType::Bool
                {
                    let msg = format!(
                        "incorrect trigger expression should be boolean, {} is {}",
                        describe(&rule.guard),
                        rule.guard.ty.val.name()
                    );
                    self.error(&rule.guard, msg)?;
                }
                for action in &mut rule.actions {
                    self.annotate(&mut action.call);
                    let is_action = match action.call.as_call() {
                        None => {
                            let msg = format!(
                                "incorrect action {}, can only be a function call",
                                describe(&action.call)
                            );
                            self.error(&action.call, msg)?;
                            continue;
                        }
                        Some(call) => self.spec(call).is_some_and(|s| s.action),
                    };
                    if !is_action {
                        let msg = format!("{}: an expression cannot be an action", describe(&action.call));
                        self.error(&action.call, msg)?;
                        continue;
                    }
                    self.type_check(&mut action.call, ctx, true)?;
                }
            }
        }

        for decl in program.vars() {
            let u = self.usage.get(&decl.name).copied().unwrap_or_default();
            let msg = match (u.set, u.used) {
                (true, true) => continue,
                (false, true) => format!("var {} used but not set (should be constant)", decl.name),
                (true, false) => format!("var {} set and not used", decl.name),
                (false, false) => format!("var {} unused and unset", decl.name),
            };
            self.budget.record(CompileError::typing(&decl.pos, msg))?;
        }
        Ok(())
    }

    // -- Bottom-up annotation --------------------------------------

    /// Compute `sym.ty` from its children. Problems leave an undefined
    /// type for [`Self::type_check`] to report.
    pub fn annotate(&mut self, sym: &mut Sym) {
        match &mut sym.kind {
            SymKind::Const(v) => sym.ty = Type::new(v.val_type(), CtxType::Expr),
            SymKind::Level(_) => sym.ty = Type::INT,
            SymKind::Pattern(_) => sym.ty = Type::STR,
            SymKind::None => sym.ty = Type::UNDEF,
            SymKind::ConstRef(_) => {}
            SymKind::Var(v) => {
                if let Some(u) = self.usage.get_mut(&v.name) {
                    u.used = true;
                }
            }
            SymKind::Unary(op, e) => {
                self.annotate(e);
                sym.ty = e.ty;
                if !e.ty.val.allows_unary(*op) {
                    sym.ty.val = ValType::Undef;
                }
            }
            SymKind::Binary(op, l, r) => {
                self.annotate(l);
                self.annotate(r);
                sym.ty = Type::new(l.ty.val, join_ctx(l.ty.ctx, r.ty.ctx));
                if !l.ty.val.compatible(r.ty.val) || !l.ty.val.allows_binary(*op) {
                    sym.ty.val = ValType::Undef;
                } else if op.is_comparison() {
                    sym.ty.val = ValType::Bool;
                }
            }
            SymKind::Call(call) => {
                let ty = self.annotate_call(call);
                sym.ty = ty;
            }
        }
    }

    fn annotate_call(&mut self, call: &mut Call) -> Type {
        let spec = match self.spec(call) {
            Some(s) => s,
            None => return Type::UNDEF,
        };
        let mut ty = spec.ret_type();
        if !spec.accepts(call.args.len()) {
            ty.ctx = CtxType::Undef;
        }
        let is_set = call.name == "set";
        for (i, arg) in call.args.iter_mut().enumerate() {
            if is_set && i == 0 && arg.as_var().is_some() {
                // an assignment target is not a read
            } else {
                self.annotate(arg);
            }
            if let Some(at) = spec.arg_type(i) {
                if !arg.ty.val.compatible(at) {
                    ty.ctx = CtxType::Undef;
                }
            }
        }
        if is_set {
            let target = call.args.first().and_then(|a| a.as_var()).cloned();
            match (target, call.args.get(1)) {
                (Some(v), Some(rval)) if call.args[0].ty.compatible(&rval.ty) => {
                    if let Some(u) = self.usage.get_mut(&v.name) {
                        u.set = true;
                    }
                }
                _ => ty.ctx = CtxType::Undef,
            }
        }
        ty
    }

    // -- Top-down checking -----------------------------------------

    /// Report errors under section context `sect`. Returns whether the
    /// subtree is well typed.
    pub fn type_check(&mut self, sym: &mut Sym, sect: CtxType, action_root: bool) -> Result<bool, TooManyErrors> {
        let in_section = !sym.ty.is_undef() && sect.compatible(sym.ty.ctx);
        match &mut sym.kind {
            SymKind::None => Ok(false),
            SymKind::Const(_) | SymKind::ConstRef(_) | SymKind::Var(_) | SymKind::Level(_) | SymKind::Pattern(_) => {
                if in_section {
                    return Ok(true);
                }
                let msg = format!("{} (incorrect) in section type {}", describe(sym), sect.name());
                self.error(sym, msg)
            }
            SymKind::Unary(op, e) => {
                let op = *op;
                if !self.type_check(e, sect, false)? {
                    return Ok(false);
                }
                if sym.ty.val == ValType::Undef {
                    let msg = format!("no unary operator '{}' for {}", op.symbol(), sym_val_name(sym));
                    return self.error(sym, msg);
                }
                Ok(true)
            }
            SymKind::Binary(op, l, r) => {
                let op = *op;
                let lok = self.type_check(l, sect, false)?;
                let rok = self.type_check(r, sect, false)?;
                if !(lok && rok) {
                    return Ok(false);
                }
                if sym.ty.ctx == CtxType::Undef {
                    let (lc, rc) = (l.ty.ctx.name(), r.ty.ctx.name());
                    let msg = format!("'{}' mixes {} and {} expressions", op.symbol(), lc, rc);
                    return self.error(sym, msg);
                }
                if sym.ty.val == ValType::Undef {
                    let (lt, rt) = (l.ty.val.name(), r.ty.val.name());
                    let msg = format!("incompatible operands {} {} {}", lt, op.symbol(), rt);
                    return self.error(sym, msg);
                }
                if !in_section {
                    let msg = format!("{} in section type {}", describe(sym), sect.name());
                    return self.error(sym, msg);
                }
                Ok(true)
            }
            SymKind::Call(_) => self.check_call(sym, sect, action_root),
        }
    }

    fn check_call(&mut self, sym: &mut Sym, sect: CtxType, action_root: bool) -> Result<bool, TooManyErrors> {
        let in_section = sect.compatible(sym.ty.ctx);
        let pos = sym.pos.clone();
        let call = match &mut sym.kind {
            SymKind::Call(c) => c,
            _ => return Ok(false),
        };
        let spec = match self.registry.get(call.func) {
            Some(s) => s,
            None => {
                let msg = format!("{}: bad function call", call.name);
                self.budget.record(CompileError::typing(&pos, msg))?;
                return Ok(false);
            }
        };
        let mut errs: Vec<String> = Vec::new();

        if spec.action && !action_root {
            errs.push(format!("{}() expected expression, not an action", call.name));
        }
        if !spec.accepts(call.args.len()) {
            if spec.variadic {
                errs.push(format!(
                    "not enough args to variadic function {}, min {}",
                    call.name,
                    spec.min_args()
                ));
            } else {
                errs.push(format!(
                    "bad number of args for function {}, expected {}, got {}",
                    call.name,
                    spec.args.len(),
                    call.args.len()
                ));
            }
        }
        if let Some(e) = errs.into_iter().next() {
            self.budget.record(CompileError::typing(&pos, e))?;
            return Ok(false);
        }

        let mut ok = true;
        for (i, arg) in call.args.iter_mut().enumerate() {
            if call.name == "set" && i == 0 {
                continue;
            }
            if !self.type_check(arg, sect, false)? {
                ok = false;
                continue;
            }
            if let Some(at) = spec.arg_type(i) {
                if !arg.ty.val.compatible(at) {
                    let msg = format!(
                        "arg {} of {} of incorrect type {}, expected {}",
                        i,
                        call.name,
                        arg.ty.val.name(),
                        at.name()
                    );
                    self.budget.record(CompileError::typing(&arg.pos, msg))?;
                    ok = false;
                }
            }
        }
        if !ok {
            return Ok(false);
        }

        match call.name.as_str() {
            "set" => {
                let (lval, rval) = (&call.args[0], &call.args[1]);
                let msg = match &lval.kind {
                    SymKind::Var(v) if v.builtin => Some(format!("cannot set builtin var {}", v.name)),
                    SymKind::Var(v) if !lval.ty.compatible(&rval.ty) => Some(format!(
                        "set: lval {} ({}) incompatible with rval {} ({})",
                        v.name,
                        lval.ty.val.name(),
                        describe(rval),
                        rval.ty.val.name()
                    )),
                    SymKind::Var(_) => None,
                    _ => Some(format!("set: lval {} is not a variable", describe(lval))),
                };
                if let Some(msg) = msg {
                    self.budget.record(CompileError::typing(&pos, msg))?;
                    return Ok(false);
                }
            }
            "trigger" | "levelname" => {
                let arg = &call.args[0];
                let is_level = match &arg.kind {
                    SymKind::Level(_) => true,
                    SymKind::Var(v) => v.builtin && v.name == PREDEFINED_VARS[0],
                    _ => false,
                };
                if !is_level {
                    let msg = format!("{}: {} is not a level", call.name, describe(arg));
                    self.budget.record(CompileError::typing(&pos, msg))?;
                    return Ok(false);
                }
            }
            "exec" | "plugin" => {
                let arg = &call.args[0];
                let valid = matches!(&arg.kind, SymKind::Const(Value::Str(p)) if is_executable(p));
                if !valid {
                    let msg = format!(
                        "{}: {} is not a valid unnamed constant string path for executable",
                        call.name,
                        describe(arg)
                    );
                    self.budget.record(CompileError::typing(&pos, msg))?;
                    return Ok(false);
                }
            }
            "payload" | "topicmatches" => {
                let arg = &mut call.args[0];
                let compiled = match &arg.kind {
                    SymKind::Const(Value::Str(text)) if call.name == "payload" => self.patterns.payload(text),
                    SymKind::Const(Value::Str(text)) => self.patterns.regex(text),
                    SymKind::Pattern(_) => return Ok(in_section),
                    _ => Err("argument must be an unnamed constant string".to_owned()),
                };
                match compiled {
                    Ok(p) => arg.kind = SymKind::Pattern(p),
                    Err(e) => {
                        let msg = format!("{}: {}: {}", call.name, describe(arg), e);
                        self.budget.record(CompileError::typing(&pos, msg))?;
                        return Ok(false);
                    }
                }
            }
            _ => {}
        }

        if !in_section {
            let msg = format!("{}() (incorrect) in section type {}", call.name, sect.name());
            self.budget.record(CompileError::typing(&pos, msg))?;
            return Ok(false);
        }
        Ok(true)
    }
}

/// Context of an expression combining two operands.
fn join_ctx(a: CtxType, b: CtxType) -> CtxType {
    use CtxType::*;
    match (a, b) {
        (Undef, _) | (_, Undef) => Undef,
        (Expr, c) | (c, Expr) => c,
        (a, b) if a == b => a,
        (Msg | Graph | MsgGraph, Msg | Graph | MsgGraph) => MsgGraph,
        _ => Undef,
    }
}

fn sym_val_name(sym: &Sym) -> &'static str {
    match &sym.kind {
        SymKind::Unary(_, e) => e.ty.val.name(),
        _ => sym.ty.val.name(),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

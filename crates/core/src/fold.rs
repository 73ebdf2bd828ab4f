//! Constant folding and dead-code elimination.
//!
//! Runs on a type-checked program. Declarations must fold to constants;
//! rule guards and actions are simplified, rules whose guard is constant
//! `false` are dropped, and action chains are pruned until nothing
//! changes.

use std::collections::HashMap;

use crate::ast::{Action, BinOp, Connector, Program, Rule, Sym, SymKind};
use crate::builtins::Registry;
use crate::error::{CompileError, ErrorBudget, Position, TooManyErrors};
use crate::types::{Type, ValType};
use crate::value::{Value, ValueFault};

pub fn fold(program: &mut Program, registry: &Registry, budget: &mut ErrorBudget) -> Result<(), TooManyErrors> {
    let levels = program.level_names();
    let mut folder = Folder {
        registry,
        budget,
        consts: HashMap::new(),
        levels,
    };
    folder.fold_program(program)
}

struct Folder<'a> {
    registry: &'a Registry,
    budget: &'a mut ErrorBudget,
    /// Folded values of named constants
    consts: HashMap<String, Value>,
    levels: Vec<String>,
}

fn true_sym(sym: &Sym) -> Sym {
    Sym::constant(Value::Bool(true), sym.pos.clone())
}

impl<'a> Folder<'a> {
    fn error(&mut self, sym: &Sym, msg: impl Into<String>) -> Result<(), TooManyErrors> {
        self.budget.record(CompileError::fold(&sym.pos, msg))
    }

    fn fold_program(&mut self, program: &mut Program) -> Result<(), TooManyErrors> {
        for decl in &mut program.decls {
            let value = std::mem::replace(&mut decl.value, Sym::none(decl.pos.clone()));
            let value = self.fold_expr(value)?;
            match value.const_value() {
                Some(v) => {
                    self.consts.insert(decl.name.clone(), v);
                }
                None => {
                    let msg = format!("{}: initializer is not a constant expression", decl.name);
                    self.error(&value, msg)?;
                }
            }
            decl.value = value;
        }
        for sect in &mut program.sections {
            let rules = std::mem::take(&mut sect.rules);
            for rule in rules {
                if let Some(rule) = self.fold_rule(rule)? {
                    sect.rules.push(rule);
                }
            }
        }
        Ok(())
    }

    fn fold_rule(&mut self, rule: Rule) -> Result<Option<Rule>, TooManyErrors> {
        let Rule {
            id,
            guard,
            actions,
            pos,
        } = rule;
        let guard = self.fold_expr(guard)?;
        if matches!(guard.kind, SymKind::Const(Value::Bool(false))) {
            tracing::debug!(rule = %id, "dropping rule with constant false guard");
            return Ok(None);
        }

        let mut folded = Vec::with_capacity(actions.len());
        for action in actions {
            let call = self.fold_expr(action.call)?;
            self.check_no_nested_actions(&call)?;
            folded.push(Action {
                connector: action.connector,
                call,
            });
        }
        while kill_dead_stores(&mut folded) || prune_constant_actions(&mut folded) {}

        if folded.is_empty() {
            tracing::debug!(rule = %id, "dropping rule without actions");
            return Ok(None);
        }
        Ok(Some(Rule {
            id,
            guard,
            actions: folded,
            pos,
        }))
    }

    /// Dead-store elimination relies on arguments being free of side effects.
    fn check_no_nested_actions(&mut self, call: &Sym) -> Result<(), TooManyErrors> {
        let args = match &call.kind {
            SymKind::Call(c) => &c.args,
            _ => return Ok(()),
        };
        let mut nested = Vec::new();
        for arg in args {
            arg.walk(&mut |s| {
                if let SymKind::Call(c) = &s.kind {
                    if self.registry.get(c.func).is_some_and(|spec| spec.action) {
                        nested.push((c.name.clone(), s.pos.clone()));
                    }
                }
            });
        }
        for (name, pos) in nested {
            let msg = format!("internal: action {} nested in an argument list", name);
            self.budget.record(CompileError::fold(&pos, msg))?;
        }
        Ok(())
    }

    // -- Expressions -----------------------------------------------

    fn fold_expr(&mut self, sym: Sym) -> Result<Sym, TooManyErrors> {
        let Sym { kind, ty, pos } = sym;
        match kind {
            SymKind::ConstRef(name) => match self.consts.get(&name) {
                Some(v) => Ok(Sym::constant(v.clone(), pos)),
                None => Ok(Sym::new(SymKind::ConstRef(name), ty, pos)),
            },
            SymKind::Unary(op, e) => {
                let e = self.fold_expr(*e)?;
                if let Some(v) = e.const_value() {
                    match v.unary(op) {
                        Ok(r) => return Ok(Sym::constant(r, pos)),
                        Err(fault) => {
                            let node = Sym::new(SymKind::Unary(op, Box::new(e)), ty, pos);
                            self.error(&node, fault.to_string())?;
                            return Ok(node);
                        }
                    }
                }
                Ok(Sym::new(SymKind::Unary(op, Box::new(e)), ty, pos))
            }
            SymKind::Binary(op, l, r) => {
                let l = self.fold_expr(*l)?;
                let r = self.fold_expr(*r)?;
                self.fold_binary(op, l, r, ty, pos)
            }
            SymKind::Call(mut call) => {
                let args = std::mem::take(&mut call.args);
                for arg in args {
                    call.args.push(self.fold_expr(arg)?);
                }
                let node = Sym::new(SymKind::Call(call), ty, pos);
                Ok(self.fold_call(node))
            }
            kind => Ok(Sym::new(kind, ty, pos)),
        }
    }

    fn fold_binary(
        &mut self,
        op: BinOp,
        l: Sym,
        r: Sym,
        ty: Type,
        pos: Position,
    ) -> Result<Sym, TooManyErrors> {
        let (lv, rv) = (l.const_value(), r.const_value());

        if matches!(op, BinOp::Div | BinOp::Mod) && rv.as_ref().is_some_and(Value::is_zero) {
            let node = Sym::new(SymKind::Binary(op, Box::new(l), Box::new(r)), ty, pos);
            self.error(&node, ValueFault::DivisionByZero.to_string())?;
            return Ok(node);
        }

        if let (Some(a), Some(b)) = (&lv, &rv) {
            return match a.binary(op, b) {
                Ok(v) => Ok(Sym::constant(v, pos)),
                Err(fault) => {
                    let node = Sym::new(SymKind::Binary(op, Box::new(l), Box::new(r)), ty, pos);
                    self.error(&node, fault.to_string())?;
                    Ok(node)
                }
            };
        }

        let is_zero = |v: &Option<Value>| {
            matches!(v, Some(Value::Int(0))) || matches!(v, Some(Value::Float(f)) if *f == 0.0)
        };
        // -0.0 + 0.0 is +0.0, so only -0.0 is an additive identity for floats
        let adds_nothing = |v: &Option<Value>| {
            matches!(v, Some(Value::Int(0)))
                || matches!(v, Some(Value::Float(f)) if *f == 0.0 && f.is_sign_negative())
        };
        let subtracts_nothing = |v: &Option<Value>| {
            matches!(v, Some(Value::Int(0)))
                || matches!(v, Some(Value::Float(f)) if *f == 0.0 && f.is_sign_positive())
        };
        let all_ones = |v: &Option<Value>| matches!(v, Some(Value::Int(-1)));
        match op {
            BinOp::Or => match lv {
                Some(Value::Bool(true)) => return Ok(l),
                Some(Value::Bool(false)) => return Ok(r),
                _ => {}
            },
            BinOp::And => match lv {
                Some(Value::Bool(false)) => return Ok(l),
                Some(Value::Bool(true)) => return Ok(r),
                _ => {}
            },
            BinOp::Add => {
                if adds_nothing(&rv) {
                    return Ok(l);
                }
                if adds_nothing(&lv) {
                    return Ok(r);
                }
            }
            BinOp::BitOr => {
                if is_zero(&rv) {
                    return Ok(l);
                }
                if is_zero(&lv) {
                    return Ok(r);
                }
            }
            BinOp::Sub if subtracts_nothing(&rv) => return Ok(l),
            BinOp::BitAnd => {
                if all_ones(&rv) {
                    return Ok(l);
                }
                if all_ones(&lv) {
                    return Ok(r);
                }
            }
            BinOp::Eq | BinOp::Ne => {
                if let (Some(a), Some(b)) = (l.as_var(), r.as_var()) {
                    // NaN is not equal to itself
                    if a.name == b.name && l.ty.val != ValType::Float {
                        return Ok(Sym::constant(Value::Bool(op == BinOp::Eq), pos));
                    }
                }
            }
            _ => {}
        }
        Ok(Sym::new(SymKind::Binary(op, Box::new(l), Box::new(r)), ty, pos))
    }

    fn fold_call(&self, node: Sym) -> Sym {
        let call = match &node.kind {
            SymKind::Call(c) => c,
            _ => return node,
        };
        match call.name.as_str() {
            "set" => {
                if let (Some(a), Some(b)) = (call.args[0].as_var(), call.args.get(1).and_then(Sym::as_var)) {
                    if a.name == b.name {
                        return true_sym(&node);
                    }
                }
            }
            "string" => {
                if let Some(v) = call.args.first().and_then(Sym::const_value) {
                    let text = match (&call.args[0].kind, &v) {
                        (SymKind::Level(l), _) => l.index.to_string(),
                        (_, v) => v.to_string(),
                    };
                    return Sym::constant(Value::Str(text), node.pos.clone());
                }
            }
            "levelname" => {
                if let Some(SymKind::Level(l)) = call.args.first().map(|a| &a.kind) {
                    if let Some(name) = self.levels.get(l.index) {
                        return Sym::constant(Value::Str(name.clone()), node.pos.clone());
                    }
                }
            }
            name if call.args.is_empty()
                && name != "plugin"
                && (name.ends_with("in") || name.ends_with("include")) =>
            {
                return true_sym(&node);
            }
            _ => {}
        }
        node
    }
}

// ──────────────────────────────────────────────
// Action chains
// ──────────────────────────────────────────────

fn set_target(action: &Action) -> Option<&str> {
    let call = action.call.as_call()?;
    if call.name != "set" {
        return None;
    }
    call.args.first()?.as_var().map(|v| v.name.as_str())
}

fn reads_var(sym: &Sym, name: &str) -> bool {
    let mut found = false;
    sym.walk(&mut |s| {
        if s.as_var().is_some_and(|v| v.name == name) {
            found = true;
        }
    });
    found
}

/// Replace a `set` with `true` when the same variable is set again later in
/// the chain, unconditionally and before any read.
fn kill_dead_stores(actions: &mut [Action]) -> bool {
    for i in 0..actions.len() {
        let name = match set_target(&actions[i]) {
            Some(n) => n.to_owned(),
            None => continue,
        };
        let mut prev_is_set = true;
        for j in i + 1..actions.len() {
            let action = &actions[j];
            let executes = match action.connector {
                Connector::Comma => true,
                Connector::Then => prev_is_set,
                Connector::NotThen => false,
            };
            if !executes {
                break;
            }
            let call = match action.call.as_call() {
                Some(c) => c,
                None => break,
            };
            let is_set = call.name == "set";
            let redefines = set_target(action) == Some(name.as_str());
            let reads = call
                .args
                .iter()
                .enumerate()
                .any(|(k, a)| !(is_set && k == 0) && reads_var(a, &name));
            if reads {
                break;
            }
            if redefines {
                tracing::debug!(var = %name, "removing dead store");
                actions[i].call = true_sym(&actions[i].call);
                return true;
            }
            prev_is_set = is_set;
        }
    }
    false
}

/// Drop actions that folded to constants, cutting the chain where a
/// constant result stops it.
fn prune_constant_actions(actions: &mut Vec<Action>) -> bool {
    for i in 0..actions.len() {
        let value = match &actions[i].call.kind {
            SymKind::Const(Value::Bool(b)) => *b,
            _ => continue,
        };
        let stops = actions.get(i + 1).is_some_and(|next| {
            matches!(
                (value, next.connector),
                (true, Connector::NotThen) | (false, Connector::Then)
            )
        });
        if stops {
            actions.truncate(i + 1);
        }
        let removed = actions.remove(i);
        if let Some(next) = actions.get_mut(i) {
            next.connector = removed.connector;
        }
        return true;
    }
    false
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::pattern::PatternCache;
    use crate::typecheck::check;

    fn fold_src(src: &str) -> (Program, Vec<String>) {
        let reg = Registry::standard();
        let mut budget = ErrorBudget::default();
        let mut program = parse(src, "fold.rul", &reg, &mut budget).unwrap();
        let mut patterns = PatternCache::new();
        check(&mut program, &reg, &mut patterns, &mut budget).unwrap();
        assert!(budget.is_empty(), "{:?}", budget.errors());
        let _ = fold(&mut program, &reg, &mut budget);
        let msgs = budget.errors().iter().map(|e| e.message.clone()).collect();
        (program, msgs)
    }

    fn const_of(sym: &Sym) -> Value {
        sym.const_value()
            .unwrap_or_else(|| panic!("not constant: {:?}", sym.kind))
    }

    #[test]
    fn declarations_fold_to_constants() {
        let (program, msgs) = fold_src(
            "levels: a; consts: c int = 3 * (4 + 5); f float = 1.0 + 2.0 * 3.0; d int = c - 7;",
        );
        assert!(msgs.is_empty(), "{:?}", msgs);
        assert_eq!(const_of(&program.decls[0].value), Value::Int(27));
        assert_eq!(const_of(&program.decls[1].value), Value::Float(7.0));
        assert_eq!(const_of(&program.decls[2].value), Value::Int(20));
    }

    #[test]
    fn division_by_literal_zero_is_rejected() {
        let (_, msgs) = fold_src("levels: a; consts: c int = 5 / 0; m int = 5 % 0; f float = 1.0 / 0.0;");
        assert_eq!(msgs.len(), 6, "{:?}", msgs);
        assert_eq!(msgs[0], "division by zero");
        assert!(msgs[1].contains("not a constant"));
    }

    #[test]
    fn division_by_zero_with_variable_dividend() {
        let (_, msgs) = fold_src("levels: a; vars: v int = 1; rules External: v / 0 > 1 ? set(v, v + 1);");
        assert_eq!(msgs, vec!["division by zero".to_string()]);
    }

    #[test]
    fn identities_and_short_circuits() {
        let (program, msgs) = fold_src(
            r#"levels: a; vars: v int = 1; b bool = false;
rules External:
    false || v + 0 > 0 - 0 ? set(v, (v | 0) - 0 + (0 + v & -1)), set(b, !b);
    true && b ? set(b, b);
    v == v ? set(v, 1);
"#,
        );
        assert!(msgs.is_empty(), "{:?}", msgs);
        let rules = &program.sections[0].rules;
        assert_eq!(rules.len(), 2, "set(b, b) folds to true and its rule goes");
        match &rules[0].guard.kind {
            SymKind::Binary(BinOp::Gt, l, r) => {
                assert!(l.as_var().is_some());
                assert_eq!(const_of(r), Value::Int(0));
            }
            other => panic!("{:?}", other),
        }
        assert!(rules[1].guard.is_const());
    }

    #[test]
    fn positive_zero_is_not_a_float_additive_identity() {
        let (program, msgs) = fold_src(
            r#"levels: a; vars: f float = 0.0;
rules External:
    f + 0.0 > 1.0 ? set(f, 1.0);
    0.0 + f > 1.0 ? set(f, 2.0);
    f - 0.0 > 1.0 ? set(f, 3.0);
"#,
        );
        assert!(msgs.is_empty(), "{:?}", msgs);
        let lhs: Vec<&Sym> = program.sections[0]
            .rules
            .iter()
            .map(|rule| match &rule.guard.kind {
                SymKind::Binary(BinOp::Gt, l, _) => l.as_ref(),
                other => panic!("{:?}", other),
            })
            .collect();
        // f may hold -0.0, and -0.0 + 0.0 is +0.0
        assert!(matches!(lhs[0].kind, SymKind::Binary(BinOp::Add, _, _)));
        assert!(matches!(lhs[1].kind, SymKind::Binary(BinOp::Add, _, _)));
        assert!(lhs[2].as_var().is_some());
    }

    #[test]
    fn float_self_comparison_is_kept() {
        let (program, _) = fold_src(
            "levels: a; vars: f float = 0.0; rules External: f == f ? set(f, f + 1.0);",
        );
        assert!(!program.sections[0].rules[0].guard.is_const());
    }

    #[test]
    fn false_guards_drop_rules_in_order() {
        let (program, msgs) = fold_src(
            r#"levels: a; vars: n int = 0;
rules External:
    false ? set(n, n + 1);
    true ? set(n, n + 2);
    n > 3 ? set(n, n + 3);
"#,
        );
        assert!(msgs.is_empty(), "{:?}", msgs);
        let rules = &program.sections[0].rules;
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].id, "sect_00000:rule_00001");
        assert_eq!(rules[1].id, "sect_00000:rule_00002");
    }

    #[test]
    fn dead_stores_are_removed() {
        let (program, _) = fold_src(
            r#"levels: a; vars: n int = 0; m int = 0;
rules External:
    true ? set(n, 1), set(m, n), set(n, 2), set(n, 3), alert(string(n + m));
"#,
        );
        let actions = &program.sections[0].rules[0].actions;
        let shown: Vec<String> = actions
            .iter()
            .map(|a| {
                let c = a.call.as_call().unwrap();
                match c.args.get(1) {
                    Some(v) if c.name == "set" => format!("set {}", v.const_value().map_or("expr".into(), |v| v.to_string())),
                    _ => c.name.clone(),
                }
            })
            .collect();
        assert_eq!(shown, vec!["set 1", "set expr", "set 3", "alert"]);
    }

    #[test]
    fn dead_store_kept_when_redefinition_may_not_run() {
        let (program, _) = fold_src(
            r#"levels: a; vars: n int = 0;
rules External:
    n < 5 ? set(n, 1), alert("x") => set(n, 2), alert(string(n));
"#,
        );
        assert_eq!(program.sections[0].rules[0].actions.len(), 4);
    }

    #[test]
    fn constant_actions_cut_the_chain() {
        let (program, msgs) = fold_src(
            r#"levels: a; vars: n int = 0;
rules External:
    true ? alert("a"), set(n, n) !> alert("never"), alert("b");
    true ? set(n, n), alert("d") => alert("e");
    true ? alert("f") => set(n, n), alert("g");
"#,
        );
        assert!(msgs.is_empty(), "{:?}", msgs);
        let rules = &program.sections[0].rules;
        let names = |r: &Rule| {
            r.actions
                .iter()
                .map(|a| a.call.as_call().unwrap().name.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&rules[0]), vec!["alert"]);
        assert_eq!(names(&rules[1]), vec!["alert", "alert"]);
        assert_eq!(rules[1].actions[0].connector, Connector::Comma);
        assert_eq!(rules[1].actions[1].connector, Connector::Then);
        assert_eq!(names(&rules[2]), vec!["alert", "alert"]);
        assert_eq!(rules[2].actions[1].connector, Connector::Then);
    }

    #[test]
    fn empty_list_predicates_fold_true() {
        let (program, _) = fold_src(
            r#"levels: a; rules Msg: topicin() && msgtypein("x") ? alert(levelname(a));"#,
        );
        let rule = &program.sections[0].rules[0];
        assert_eq!(rule.guard.as_call().unwrap().name, "msgtypein");
        let alert = rule.actions[0].call.as_call().unwrap();
        assert_eq!(const_of(&alert.args[0]), Value::Str("a".into()));
    }
}

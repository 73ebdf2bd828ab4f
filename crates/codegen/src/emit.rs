//! Rust source emission for a [`RenderModel`].
//!
//! Expressions become Rust expressions of type `Value` that may use `?`;
//! every rule becomes a method returning `Result<(), EvalError>`.

use rips_core::ast::{BinOp, Call};
use rips_core::{Connector, Rule, Sym, SymKind, Value};

use crate::model::{rule_fn, RenderModel, SectionModel};
use crate::RenderError;

const RUNTIME_HELPERS: &str = r#"
#[allow(dead_code)]
fn fault(line: u32) -> impl Fn(ValueFault) -> EvalError {
    move |fault| EvalError::Fault {
        pos: Position::new(SOURCE, line),
        fault,
    }
}

#[allow(dead_code)]
fn call(
    builtins: &Builtins,
    ctx: &mut Context,
    id: usize,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, EvalError> {
    let f = builtins.get(id, name)?;
    f(ctx, &Args::from_values(name, args))
}

/// Value faults abandon the rule when the context asks to continue.
fn settle(ctx: &Context, result: Result<(), EvalError>) -> Result<(), EvalError> {
    match result {
        Err(EvalError::Fault { .. }) if ctx.fault_policy == FaultPolicy::Continue => Ok(()),
        other => other,
    }
}
"#;

/// Indenting line writer.
struct Out {
    text: String,
    depth: usize,
}

impl Out {
    fn line(&mut self, s: &str) {
        if !s.is_empty() {
            for _ in 0..self.depth {
                self.text.push_str("    ");
            }
            self.text.push_str(s);
        }
        self.text.push('\n');
    }

    fn open(&mut self, s: &str) {
        self.line(s);
        self.depth += 1;
    }

    fn close(&mut self, s: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.line(s);
    }
}

pub fn module(model: &RenderModel<'_>) -> Result<String, RenderError> {
    let mut out = Out {
        text: String::new(),
        depth: 0,
    };
    out.line(&format!("//! Rules exported from `{}` by `rips render`.", model.source));
    out.line("//!");
    out.line("//! Regenerate instead of editing.");
    out.line("");
    out.line("#[allow(unused_imports)]");
    out.line("use rips_core::ast::{BinOp, UnOp};");
    out.line("use rips_core::{Position, Value, ValueFault};");
    out.line("use rips_eval::interp::predef_value;");
    out.line("#[allow(unused_imports)]");
    out.line("use rips_eval::{Args, Builtins, Context, EvalError, EventKind, FaultPolicy};");
    out.line("");
    out.line(&format!("pub const SOURCE: &str = {:?};", model.source));
    let levels: Vec<String> = model.levels.iter().map(|l| format!("{:?}", l)).collect();
    out.line(&format!("pub const LEVELS: &[&str] = &[{}];", levels.join(", ")));
    out.line("");

    emit_struct(model, &mut out);
    out.line("");
    out.line("#[allow(non_snake_case, dead_code, unused_assignments, unused_mut, unused_parens, unused_variables, clippy::all)]");
    out.open("impl Rules {");
    emit_new(model, &mut out);
    out.line("");
    emit_run(model, &mut out);
    for section in &model.sections {
        out.line("");
        emit_section(section, &mut out);
        for (i, rule) in section.rules.iter().enumerate() {
            out.line("");
            emit_rule(model, &section.name, i, rule, &mut out)?;
        }
    }
    out.close("}");
    out.line("");
    out.open("impl Default for Rules {");
    out.open("fn default() -> Self {");
    out.line("Self::new()");
    out.close("}");
    out.close("}");
    out.text.push_str(RUNTIME_HELPERS);
    Ok(out.text)
}

fn emit_struct(model: &RenderModel<'_>, out: &mut Out) {
    out.line("/// Variable state of the rule file, one field per variable.");
    out.line("#[allow(non_snake_case)]");
    out.line("#[derive(Debug, Clone, PartialEq)]");
    out.open("pub struct Rules {");
    for field in &model.fields {
        if field.predefined {
            out.line(&format!("{}: Value,", field.ident));
        } else {
            out.line(&format!("pub {}: Value,", field.ident));
        }
    }
    out.close("}");
}

fn emit_new(model: &RenderModel<'_>, out: &mut Out) {
    out.open("pub fn new() -> Self {");
    out.open("Rules {");
    for field in &model.fields {
        out.line(&format!("{}: {},", field.ident, literal(&field.init)));
    }
    out.close("}");
    out.close("}");
}

fn emit_run(model: &RenderModel<'_>, out: &mut Out) {
    out.line("/// One pass for the event in `ctx`.");
    out.open("pub fn run(&mut self, ctx: &mut Context, builtins: &Builtins) -> Result<(), EvalError> {");
    for field in model.fields.iter().filter(|f| f.predefined) {
        out.open(&format!("if let Some(v) = predef_value({:?}, ctx) {{", field.name));
        out.line(&format!("self.{} = v;", field.ident));
        out.close("}");
    }
    out.open("match ctx.event_kind() {");
    for (kind, fn_name) in &model.dispatch {
        out.line(&format!("EventKind::{:?} => self.{}(ctx, builtins),", kind, fn_name));
    }
    out.line("_ => Ok(()),");
    out.close("}");
    out.close("}");
}

fn emit_section(section: &SectionModel<'_>, out: &mut Out) {
    out.line(&format!("/// `rules {}:`", section.name));
    out.open(&format!(
        "fn {}(&mut self, ctx: &mut Context, builtins: &Builtins) -> Result<(), EvalError> {{",
        section.fn_name
    ));
    for i in 0..section.rules.len() {
        out.line(&format!(
            "let result = self.{}(ctx, builtins);",
            rule_fn(&section.name, i)
        ));
        out.line("settle(ctx, result)?;");
    }
    out.line("Ok(())");
    out.close("}");
}

fn emit_rule(
    model: &RenderModel<'_>,
    section: &str,
    index: usize,
    rule: &Rule,
    out: &mut Out,
) -> Result<(), RenderError> {
    out.line(&format!("// {} ({})", rule.pos, rule.id));
    out.open(&format!(
        "fn {}(&mut self, ctx: &mut Context, builtins: &Builtins) -> Result<(), EvalError> {{",
        rule_fn(section, index)
    ));
    out.open(&format!("if !({}).is_true() {{", expr(model, &rule.guard)?));
    out.line("return Ok(());");
    out.close("}");
    for (i, action) in rule.actions.iter().enumerate() {
        let call = expr(model, &action.call)?;
        if i == 0 {
            out.line(&format!("let mut ok = ({}).is_true();", call));
            continue;
        }
        match action.connector {
            Connector::Comma => {}
            Connector::Then => out.line("if !ok { return Ok(()); }"),
            Connector::NotThen => out.line("if ok { return Ok(()); }"),
        }
        out.line(&format!("ok = ({}).is_true();", call));
    }
    out.line("Ok(())");
    out.close("}");
    Ok(())
}

/// Rust expression for a constant.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Int(i64::MIN) => "Value::Int(i64::MIN)".to_owned(),
        Value::Int(i) => format!("Value::Int({})", i),
        Value::Float(f) if f.is_nan() => "Value::Float(f64::NAN)".to_owned(),
        Value::Float(f) if f.is_infinite() && *f > 0.0 => "Value::Float(f64::INFINITY)".to_owned(),
        Value::Float(f) if f.is_infinite() => "Value::Float(f64::NEG_INFINITY)".to_owned(),
        Value::Float(f) => format!("Value::Float({:?})", f),
        Value::Bool(b) => format!("Value::Bool({})", b),
        Value::Str(s) => format!("Value::Str({:?}.to_owned())", s),
        Value::Level(i) => format!("Value::Level({})", i),
    }
}

/// Rust expression evaluating `sym` to a `Value`.
pub fn expr(model: &RenderModel<'_>, sym: &Sym) -> Result<String, RenderError> {
    let line = sym.pos.line;
    Ok(match &sym.kind {
        SymKind::Const(v) => literal(v),
        SymKind::Level(l) => format!("Value::Level({})", l.index),
        SymKind::Pattern(p) => literal(&Value::Str(p.source.clone())),
        SymKind::ConstRef(name) => {
            let value = model.constant(name).ok_or_else(|| RenderError::Unresolved {
                pos: sym.pos.clone(),
                name: name.clone(),
            })?;
            expr(model, value)?
        }
        SymKind::Var(v) => {
            let field = model.field(&v.name).ok_or_else(|| RenderError::Unresolved {
                pos: sym.pos.clone(),
                name: v.name.clone(),
            })?;
            format!("self.{}.clone()", field.ident)
        }
        SymKind::Unary(op, e) => format!(
            "({}).unary(UnOp::{:?}).map_err(fault({}))?",
            expr(model, e)?,
            op,
            line
        ),
        SymKind::Binary(BinOp::And, l, r) => format!(
            "Value::Bool(({}).is_true() && ({}).is_true())",
            expr(model, l)?,
            expr(model, r)?
        ),
        SymKind::Binary(BinOp::Or, l, r) => format!(
            "Value::Bool(({}).is_true() || ({}).is_true())",
            expr(model, l)?,
            expr(model, r)?
        ),
        SymKind::Binary(op, l, r) => format!(
            "{{ let l = {}; let r = {}; l.binary(BinOp::{:?}, &r).map_err(fault({}))? }}",
            expr(model, l)?,
            expr(model, r)?,
            op,
            line
        ),
        SymKind::Call(call) => call_expr(model, call, sym)?,
        SymKind::None => {
            return Err(RenderError::Placeholder {
                pos: sym.pos.clone(),
            })
        }
    })
}

fn call_expr(model: &RenderModel<'_>, call: &Call, sym: &Sym) -> Result<String, RenderError> {
    if call.name == "set" {
        let (Some(target), Some(rhs)) = (call.args.first(), call.args.get(1)) else {
            return Err(RenderError::BadSet { pos: sym.pos.clone() });
        };
        let field = target
            .as_var()
            .and_then(|v| model.field(&v.name))
            .filter(|f| !f.predefined)
            .ok_or_else(|| RenderError::BadSet { pos: sym.pos.clone() })?;
        return Ok(format!(
            "{{ let v = {}; self.{} = v; Value::Bool(true) }}",
            expr(model, rhs)?,
            field.ident
        ));
    }

    let mut args = Vec::with_capacity(call.args.len() + 1);
    if call.name == "trigger" {
        args.push("Value::Level(ctx.current_level)".to_owned());
    }
    for arg in &call.args {
        args.push(expr(model, arg)?);
    }
    Ok(format!(
        "{{ let args = vec![{}]; call(builtins, ctx, {}, {:?}, args)? }}",
        args.join(", "),
        call.func,
        call.name
    ))
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rips_core::compile;

    fn model_of(src: &str) -> (rips_core::Program, String) {
        let program = compile(src, "e.rul").unwrap_or_else(|e| panic!("{}", e));
        let text = {
            let model = RenderModel::from_program(&program).unwrap();
            module(&model).unwrap()
        };
        (program, text)
    }

    #[test]
    fn literals_are_valid_rust() {
        assert_eq!(literal(&Value::Int(-3)), "Value::Int(-3)");
        assert_eq!(literal(&Value::Int(i64::MIN)), "Value::Int(i64::MIN)");
        assert_eq!(literal(&Value::Float(2.0)), "Value::Float(2.0)");
        assert_eq!(literal(&Value::Float(f64::NEG_INFINITY)), "Value::Float(f64::NEG_INFINITY)");
        assert_eq!(literal(&Value::Str("a\"b\n".into())), "Value::Str(\"a\\\"b\\n\".to_owned())");
        assert_eq!(literal(&Value::Level(2)), "Value::Level(2)");
    }

    #[test]
    fn connectors_become_early_returns() {
        let (_, text) = model_of(
            "levels: calm;\n\
             vars: n int = 0;\n\
             rules Msg: topicin(\"/a\") ? set(n, n + 1) => alert(\"one\") !> alert(\"two\"), alert(string(n));\n",
        );
        let rule = &text[text.find("fn rule_msg_0").unwrap()..];
        let body = &rule[..rule.find("\n    }\n").unwrap()];
        let then = body.find("if !ok { return Ok(()); }").unwrap();
        let not_then = body.find("if ok { return Ok(()); }").unwrap();
        assert!(then < not_then);
        assert_eq!(body.matches("ok = (").count(), 4);
        assert!(body.contains("self.n = v; Value::Bool(true)"));
        assert!(body.contains("l.binary(BinOp::Add, &r).map_err(fault(3))?"));
    }

    #[test]
    fn rule_methods_tolerate_the_trailing_ok_store() {
        let (_, text) = model_of(
            "levels: calm;\n\
             vars: n int = 0;\n\
             rules Msg: topicin(\"/a\") ? set(n, n + 1), alert(string(n));\n",
        );
        let attr = text
            .lines()
            .take_while(|l| *l != "impl Rules {")
            .last()
            .unwrap();
        // the last `ok = ...` in a chain is never read
        assert!(attr.contains("unused_assignments"), "{}", attr);
        // sections no event kind reaches are still emitted
        assert!(attr.contains("dead_code"), "{}", attr);
    }

    #[test]
    fn calls_carry_their_registry_slot() {
        let (program, text) = model_of(
            "levels: low; high;\n\
             rules External: signal(\"SIGUSR1\") ? trigger(high);\n",
        );
        let rule = &program.sections[0].rules[0];
        let SymKind::Call(trigger) = &rule.actions[0].call.kind else {
            panic!("expected a call");
        };
        assert!(text.contains(&format!(
            "{{ let args = vec![Value::Level(ctx.current_level), Value::Level(1)]; call(builtins, ctx, {}, \"trigger\", args)? }}",
            trigger.func
        )));
        assert!(text.contains("EventKind::External => self.section_external(ctx, builtins),"));
        assert!(!text.contains("EventKind::Msg =>"));
    }

    #[test]
    fn predefined_vars_are_refreshed_each_pass() {
        let (_, text) = model_of("levels: a; b;\nrules External: CurrLevel == a && Uptime > 5 ? trigger(b);\n");
        assert!(text.contains("if let Some(v) = predef_value(\"CurrLevel\", ctx) {"));
        assert!(text.contains("self.Uptime.clone()"));
        assert!(text.contains("CurrLevel: Value,\n"));
        assert!(text.contains("Value::Bool(("));
    }
}

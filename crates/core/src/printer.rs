//! Prints programs and expressions back in rule syntax.

use std::fmt;

use crate::ast::{DeclKind, Program, Sym, SymKind};
use crate::value::{format_float, Value};

/// Quote a string literal the way the lexer reads it back.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Float literal that reads back as a float.
fn float_literal(v: f64) -> String {
    if v.is_infinite() {
        return if v > 0.0 { "1e999" } else { "-1e999" }.to_owned();
    }
    let s = format_float(v);
    if v.is_finite() && !s.contains(['.', 'e']) {
        format!("{}.0", s)
    } else {
        s
    }
}

fn binding_power(sym: &Sym) -> i32 {
    match &sym.kind {
        SymKind::Binary(op, _, _) => op.binding_power(),
        SymKind::Unary(op, _) => op.binding_power(),
        _ => i32::MAX,
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, sym: &Sym, parens: bool) -> fmt::Result {
    if parens {
        write!(f, "({})", sym)
    } else {
        write!(f, "{}", sym)
    }
}

impl fmt::Display for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SymKind::Const(Value::Str(s)) => f.write_str(&quote(s)),
            SymKind::Const(Value::Float(v)) => f.write_str(&float_literal(*v)),
            SymKind::Const(v) => write!(f, "{}", v),
            SymKind::ConstRef(name) => f.write_str(name),
            SymKind::Var(v) => f.write_str(&v.name),
            SymKind::Level(l) => f.write_str(&l.name),
            SymKind::Pattern(p) => f.write_str(&quote(&p.source)),
            SymKind::None => f.write_str("<error>"),
            SymKind::Call(c) => {
                write!(f, "{}(", c.name)?;
                for (i, a) in c.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                f.write_str(")")
            }
            SymKind::Unary(op, e) => {
                f.write_str(op.symbol())?;
                write_operand(f, e, binding_power(e) < op.binding_power())
            }
            SymKind::Binary(op, l, r) => {
                let bp = op.binding_power();
                write_operand(f, l, binding_power(l) < bp)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, r, binding_power(r) <= bp)
            }
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "levels:")?;
        for l in &self.levels {
            if l.soft {
                writeln!(f, "\t{} soft;", l.name)?;
            } else {
                writeln!(f, "\t{};", l.name)?;
            }
        }
        for (kind, header) in [(DeclKind::Const, "consts:"), (DeclKind::Var, "vars:")] {
            let mut decls = self.decls.iter().filter(|d| d.kind == kind).peekable();
            if decls.peek().is_none() {
                continue;
            }
            writeln!(f, "{}", header)?;
            for d in decls {
                writeln!(f, "\t{} {} = {};", d.name, d.ty.name(), d.value)?;
            }
        }
        for sect in &self.sections {
            writeln!(f, "rules {}:", sect.name)?;
            for rule in &sect.rules {
                write!(f, "\t{} ? ", rule.guard)?;
                for (i, a) in rule.actions.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", a.connector.symbol())?;
                    }
                    write!(f, "{}", a.call)?;
                }
                writeln!(f, ";")?;
            }
        }
        Ok(())
    }
}

impl Program {
    pub fn to_source(&self) -> String {
        self.to_string()
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

//! Render model: the parts of a compiled [`Program`] the emitter needs,
//! with Rust identifiers already chosen.

use std::collections::HashSet;

use rips_core::parser::PREDEFINED_VARS;
use rips_core::{DeclKind, Program, Rule, Sym, Value};
use rips_eval::interp::select_section;
use rips_eval::EventKind;

use crate::RenderError;

/// Rust keywords that cannot be used as field names.
const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum", "extern",
    "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub",
    "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true", "type", "unsafe",
    "use", "where", "while", "abstract", "become", "box", "do", "final", "macro", "override",
    "priv", "try", "typeof", "unsized", "virtual", "yield",
];

/// Keywords that have no raw identifier form.
const NOT_RAW: &[&str] = &["crate", "self", "Self", "super"];

/// A struct field holding one variable.
#[derive(Debug, Clone)]
pub struct Field {
    /// Name in the rule file
    pub name: String,
    pub ident: String,
    pub init: Value,
    /// Refreshed from the context before each pass
    pub predefined: bool,
}

#[derive(Debug, Clone)]
pub struct SectionModel<'p> {
    pub name: String,
    pub fn_name: String,
    pub rules: Vec<&'p Rule>,
}

/// Everything [`crate::emit`] walks to produce the module.
#[derive(Debug, Clone)]
pub struct RenderModel<'p> {
    pub program: &'p Program,
    pub source: String,
    pub levels: Vec<String>,
    pub fields: Vec<Field>,
    pub sections: Vec<SectionModel<'p>>,
    /// Section function run for each event kind
    pub dispatch: Vec<(EventKind, String)>,
}

impl<'p> RenderModel<'p> {
    pub fn from_program(program: &'p Program) -> Result<Self, RenderError> {
        let mut fields: Vec<Field> = PREDEFINED_VARS
            .iter()
            .map(|name| Field {
                name: name.to_string(),
                ident: name.to_string(),
                init: if *name == "CurrLevel" {
                    Value::Level(0)
                } else {
                    Value::Int(0)
                },
                predefined: true,
            })
            .collect();

        let mut taken: HashSet<String> = fields.iter().map(|f| f.ident.clone()).collect();
        for decl in program.vars() {
            let init = decl.value.const_value().ok_or_else(|| RenderError::NotConstant {
                pos: decl.pos.clone(),
                name: decl.name.clone(),
            })?;
            let ident = field_ident(&decl.name);
            if !taken.insert(ident.clone()) {
                return Err(RenderError::NameClash {
                    pos: decl.pos.clone(),
                    ident,
                });
            }
            fields.push(Field {
                name: decl.name.clone(),
                ident,
                init,
                predefined: false,
            });
        }

        let sections: Vec<SectionModel<'p>> = program
            .sections
            .iter()
            .map(|s| SectionModel {
                name: s.name.clone(),
                fn_name: section_fn(&s.name),
                rules: s.rules.iter().collect(),
            })
            .collect();

        let dispatch = [EventKind::Msg, EventKind::Graph, EventKind::External]
            .into_iter()
            .filter_map(|kind| select_section(program, kind).map(|s| (kind, section_fn(&s.name))))
            .collect();

        Ok(RenderModel {
            program,
            source: program.file.clone(),
            levels: program.levels.iter().map(|l| l.name.clone()).collect(),
            fields,
            sections,
            dispatch,
        })
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Folded value of constant `name`.
    pub fn constant(&self, name: &str) -> Option<&'p Sym> {
        self.program
            .decls
            .iter()
            .find(|d| d.kind == DeclKind::Const && d.name == name)
            .map(|d| &d.value)
    }
}

/// Field identifier for variable `name`.
pub fn field_ident(name: &str) -> String {
    if NOT_RAW.contains(&name) {
        format!("{}_", name)
    } else if KEYWORDS.contains(&name) {
        format!("r#{}", name)
    } else {
        name.to_owned()
    }
}

pub fn section_fn(section: &str) -> String {
    format!("section_{}", section.to_lowercase())
}

pub fn rule_fn(section: &str, index: usize) -> String {
    format!("rule_{}_{}", section.to_lowercase(), index)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rips_core::compile;

    const SRC: &str = "levels: low; high;\n\
        consts: limit int = 3;\n\
        vars: hits int = 1; seen bool = false;\n\
        rules Message: topicin(\"/a\") ? set(hits, hits + 1);\n\
        rules External: hits > limit && !seen ? set(seen, true) => trigger(high);\n";

    #[test]
    fn fields_follow_the_predefined_vars() {
        let program = compile(SRC, "m.rul").unwrap_or_else(|e| panic!("{}", e));
        let model = RenderModel::from_program(&program).unwrap();
        let names: Vec<&str> = model.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["CurrLevel", "Time", "Uptime", "hits", "seen"]);
        assert_eq!(model.field("hits").unwrap().init, Value::Int(1));
        assert!(model.field("Time").unwrap().predefined);
        assert!(!model.field("seen").unwrap().predefined);
        assert_eq!(model.levels, vec!["low", "high"]);
        assert!(model.constant("limit").is_some());
        assert!(model.constant("hits").is_none());
    }

    #[test]
    fn dispatch_follows_section_names() {
        let program = compile(SRC, "m.rul").unwrap_or_else(|e| panic!("{}", e));
        let model = RenderModel::from_program(&program).unwrap();
        // a `Message` section is rendered but no event kind reaches it
        assert!(model.sections.iter().any(|s| s.fn_name == "section_message"));
        assert_eq!(
            model.dispatch,
            vec![(EventKind::External, "section_external".to_string())]
        );
    }

    #[test]
    fn keywords_are_escaped() {
        assert_eq!(field_ident("count"), "count");
        assert_eq!(field_ident("type"), "r#type");
        assert_eq!(field_ident("self"), "self_");
        assert_eq!(rule_fn("Msg", 2), "rule_msg_2");
    }
}

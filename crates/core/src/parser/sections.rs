use super::{Halt, PResult, Parser, CURR_RULE, DEFAULT_RBP};
use crate::ast::{Action, Connector, Decl, DeclKind, Level, Rule, RuleSection, Sym};
use crate::env::Symbol;
use crate::error::CompileError;
use crate::lexer::Token;
use crate::types::{CtxType, ValType};
use crate::value::Value;

fn no_extra(_: &Token) -> bool {
    false
}

impl<'r, 'b> Parser<'r, 'b> {
    // -- Program ---------------------------------------------------

    pub(super) fn parse_program(&mut self) -> PResult<()> {
        loop {
            let tok = self.peek()?.clone();
            match tok {
                Token::Eof => break,
                Token::Levels => {
                    self.lx.lex();
                    self.section_header(&tok)?;
                    self.level_decls()?;
                }
                Token::Consts => {
                    self.lx.lex();
                    self.section_header(&tok)?;
                    self.decls(DeclKind::Const)?;
                }
                Token::Vars => {
                    self.lx.lex();
                    self.section_header(&tok)?;
                    self.decls(DeclKind::Var)?;
                }
                Token::Rules => {
                    self.lx.lex();
                    self.rule_section()?;
                }
                other => {
                    let e = CompileError::parse(
                        &self.pos(),
                        format!("found '{}' at start of section", other),
                    );
                    self.record(e)?;
                    self.lx.lex();
                    self.lx.lex_while_not(Token::is_section_keyword);
                }
            }
        }
        if self.program.levels.is_empty() {
            let e = CompileError::parse(&self.pos(), "no levels declared");
            self.record(e)?;
        }
        Ok(())
    }

    fn section_header(&mut self, keyword: &Token) -> PResult<()> {
        if let Err(h) = self.expect(Token::Colon) {
            self.recover(h)?;
            tracing::debug!(section = %keyword, "missing ':' after section keyword");
        }
        Ok(())
    }

    // -- levels: ID [soft] ; ---------------------------------------

    fn level_decls(&mut self) -> PResult<()> {
        while matches!(self.peek()?, Token::Id(_)) {
            if let Err(h) = self.level_decl() {
                self.recover(h)?;
                self.sync(no_extra);
            }
        }
        Ok(())
    }

    fn level_decl(&mut self) -> PResult<()> {
        let (name, pos) = self.take_id("level name")?;
        let soft = self.at(&Token::Soft)?;
        if soft {
            self.lx.lex();
        }
        self.expect(Token::Semi)?;
        let index = self.program.levels.len();
        if self.declare(&name, Symbol::Level { index, soft }, &pos)? {
            self.program.levels.push(Level {
                name,
                index,
                soft,
                reachable: false,
                pos,
            });
        }
        Ok(())
    }

    // -- consts: / vars: ID type = EXPR ; --------------------------

    fn decls(&mut self, kind: DeclKind) -> PResult<()> {
        while matches!(self.peek()?, Token::Id(_)) {
            if let Err(h) = self.decl(kind) {
                self.recover(h)?;
                self.sync(no_extra);
            }
        }
        Ok(())
    }

    fn decl(&mut self, kind: DeclKind) -> PResult<()> {
        let (name, pos) = self.take_id("declaration name")?;
        let (tname, tpos) = self.take_id("type name")?;
        let ty = match ValType::from_name(&tname) {
            Some(t) => t,
            None => {
                self.declare(&name, Symbol::Placeholder, &pos)?;
                return Err(Halt::Syntax(CompileError::parse(
                    &tpos,
                    format!("{} is not a type", tname),
                )));
            }
        };
        self.expect(Token::Assign)?;
        let value = self.expr(DEFAULT_RBP)?;
        self.expect(Token::Semi)?;
        let sym = match kind {
            DeclKind::Const => Symbol::Const { ty, value: None },
            DeclKind::Var => Symbol::Var { ty, builtin: false },
        };
        if self.declare(&name, sym, &pos)? {
            self.program.decls.push(Decl {
                kind,
                name,
                ty,
                value,
                pos,
            });
        }
        Ok(())
    }

    // -- rules ID : (EXPR ? RULER ;)* ------------------------------

    fn rule_section(&mut self) -> PResult<()> {
        let (name, pos) = match self.take_id("section name") {
            Ok(v) => v,
            Err(h) => {
                self.recover(h)?;
                self.lx.lex_while_not(Token::is_section_keyword);
                return Ok(());
            }
        };
        self.section_header(&Token::Rules)?;
        self.declare(&name, Symbol::Section, &pos)?;
        self.program.sections.push(RuleSection {
            ctx: CtxType::from_section(&name).unwrap_or(CtxType::Undef),
            name,
            rules: Vec::new(),
            pos,
        });
        let sect_idx = self.program.sections.len() - 1;

        loop {
            let tok = self.peek()?;
            if *tok == Token::Eof || tok.is_section_keyword() {
                break;
            }
            let rule_idx = self.program.sections[sect_idx].rules.len();
            let id = format!("sect_{:05}:rule_{:05}", sect_idx, rule_idx);
            self.env.push();
            let result = match self.env.declare(CURR_RULE, Self::predefined_const(Value::Str(id.clone()))) {
                Ok(()) => self.rule(id),
                Err(e) => Err(self.err(e.to_string())),
            };
            // the rule scope was pushed above
            let _ = self.env.pop();
            match result {
                Ok(rule) => self.program.sections[sect_idx].rules.push(rule),
                Err(h) => {
                    self.recover(h)?;
                    self.sync(no_extra);
                }
            }
        }
        Ok(())
    }

    fn rule(&mut self, id: String) -> PResult<Rule> {
        let pos = self.pos();
        let guard = self.expr(DEFAULT_RBP)?;
        self.expect(Token::Question)?;
        let actions = self.action_chain()?;
        self.expect(Token::Semi)?;
        Ok(Rule {
            id,
            guard,
            actions,
            pos,
        })
    }

    fn action_chain(&mut self) -> PResult<Vec<Action>> {
        let mut actions = Vec::new();
        let mut connector = Connector::Comma;
        loop {
            if !self.peek()?.is_expr_token() {
                if actions.is_empty() {
                    return Err(self.err("no action for rule"));
                }
                return Err(self.err(format!(
                    "missing action after '{}'",
                    connector.symbol()
                )));
            }
            let call: Sym = self.expr(DEFAULT_RBP)?;
            actions.push(Action { connector, call });
            connector = match self.peek()? {
                Token::Then => Connector::Then,
                Token::NotThen => Connector::NotThen,
                Token::Comma => Connector::Comma,
                _ => break,
            };
            self.lx.lex();
        }
        Ok(actions)
    }
}

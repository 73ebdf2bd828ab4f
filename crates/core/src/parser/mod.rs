//! Recursive-descent parser for rule files, with a Pratt parser for
//! expressions. Names are resolved against the environment stack while
//! parsing; types are left for the checker.
use crate::ast::{Program, Sym};
use crate::builtins::Registry;
use crate::env::{EnvStack, Symbol};
use crate::error::{CompileError, ErrorBudget, Position, TooManyErrors};
use crate::lexer::{Lexer, Spanned, Token};
use crate::types::ValType;
use crate::value::Value;

mod expressions;
mod sections;

/// Variables the runtime maintains. All are ints.
pub const PREDEFINED_VARS: [&str; 3] = ["CurrLevel", "Time", "Uptime"];

/// Per-rule constant holding the rule identifier.
pub const CURR_RULE: &str = "CurrRule";

/// Lowest binding power; top-level expressions parse at this floor.
pub(crate) const DEFAULT_RBP: i32 = -1;

// ──────────────────────────────────────────────
// Parser
// ──────────────────────────────────────────────

/// Why a production stopped.
#[derive(Debug)]
pub(crate) enum Halt {
    /// A diagnostic to record before resynchronizing
    Syntax(CompileError),
    /// The error budget ran out; unwind to the top
    TooMany,
}

impl From<TooManyErrors> for Halt {
    fn from(_: TooManyErrors) -> Self {
        Halt::TooMany
    }
}

pub(crate) type PResult<T> = Result<T, Halt>;

pub(crate) struct Parser<'r, 'b> {
    lx: Lexer,
    env: EnvStack<Symbol>,
    registry: &'r Registry,
    budget: &'b mut ErrorBudget,
    program: Program,
}

impl<'r, 'b> Parser<'r, 'b> {
    fn new(src: &str, filename: &str, registry: &'r Registry, budget: &'b mut ErrorBudget) -> Self {
        let mut env = EnvStack::new();
        env.push();
        for (id, spec) in registry.iter() {
            // names in the registry are unique, the scope starts empty
            let _ = env.declare(spec.name, Symbol::Func(id));
        }
        for name in PREDEFINED_VARS {
            let _ = env.declare(
                name,
                Symbol::Var {
                    ty: ValType::Int,
                    builtin: true,
                },
            );
        }
        env.push();
        Parser {
            lx: Lexer::new(src, filename),
            env,
            registry,
            budget,
            program: Program {
                file: filename.to_owned(),
                ..Program::default()
            },
        }
    }

    fn pos(&self) -> Position {
        self.lx.position()
    }

    fn err(&self, msg: impl Into<String>) -> Halt {
        Halt::Syntax(CompileError::parse(&self.pos(), msg))
    }

    fn record(&mut self, err: CompileError) -> Result<(), TooManyErrors> {
        self.budget.record(err)
    }

    /// Record a syntax error, or pass the abort signal through.
    fn recover(&mut self, halt: Halt) -> Result<(), TooManyErrors> {
        match halt {
            Halt::Syntax(e) => self.record(e),
            Halt::TooMany => Err(TooManyErrors),
        }
    }

    /// Next token, reporting and skipping lexical errors.
    fn peek(&mut self) -> PResult<&Token> {
        loop {
            let bad = match &self.lx.peek().token {
                Token::Bad(msg) => Some(msg.clone()),
                _ => None,
            };
            match bad {
                Some(msg) => {
                    let pos = self.lx.position();
                    self.lx.lex();
                    self.record(CompileError::lex(&pos, msg))?;
                }
                None => break,
            }
        }
        Ok(&self.lx.peek().token)
    }

    fn next(&mut self) -> PResult<Spanned> {
        self.peek()?;
        Ok(self.lx.lex())
    }

    fn at(&mut self, tok: &Token) -> PResult<bool> {
        Ok(self.peek()? == tok)
    }

    fn expect(&mut self, tok: Token) -> PResult<()> {
        let found = self.peek()?.clone();
        if found == tok {
            self.lx.lex();
            Ok(())
        } else {
            Err(self.err(format!("missing '{}', found '{}'", tok, found)))
        }
    }

    fn take_id(&mut self, what: &str) -> PResult<(String, Position)> {
        let pos = self.pos();
        match self.peek()?.clone() {
            Token::Id(name) => {
                self.lx.lex();
                Ok((name, pos))
            }
            other => Err(self.err(format!("expected {}, found '{}'", what, other))),
        }
    }

    /// Skip to the next `;`, section keyword, or token accepted by `extra`.
    fn sync_no_semi(&mut self, extra: fn(&Token) -> bool) {
        self.lx
            .lex_while_not(|t| extra(t) || t.is_section_keyword() || *t == Token::Semi);
    }

    /// Like [`Self::sync_no_semi`], also consuming a `;` stop token.
    fn sync(&mut self, extra: fn(&Token) -> bool) {
        self.sync_no_semi(extra);
        if self.lx.peek().token == Token::Semi {
            self.lx.lex();
        }
    }

    fn declare(&mut self, name: &str, sym: Symbol, pos: &Position) -> Result<bool, TooManyErrors> {
        match self.env.declare(name, sym) {
            Ok(()) => Ok(true),
            Err(e) => {
                self.record(CompileError::parse(pos, format!("declaring {}: {}", name, e)))?;
                Ok(false)
            }
        }
    }

    fn predefined_const(value: Value) -> Symbol {
        Symbol::Const {
            ty: value.val_type(),
            value: Some(value),
        }
    }
}

/// Parse a rule file. Syntax errors are recorded in `budget`; the returned
/// program is only meaningful when the budget is still empty.
pub fn parse(
    src: &str,
    filename: &str,
    registry: &Registry,
    budget: &mut ErrorBudget,
) -> Result<Program, TooManyErrors> {
    let mut p = Parser::new(src, filename, registry, budget);
    match p.parse_program() {
        Ok(()) => {}
        Err(halt) => p.recover(halt)?,
    }
    Ok(p.program)
}

/// Parse a single expression against the predefined scope. Used by tests
/// and tooling.
pub fn parse_expr(src: &str, filename: &str, registry: &Registry) -> Result<Sym, CompileError> {
    let mut budget = ErrorBudget::default();
    let mut p = Parser::new(src, filename, registry, &mut budget);
    let result = p.expr(DEFAULT_RBP);
    let trailing = matches!(p.peek(), Ok(t) if *t != Token::Eof);
    let result = match result {
        Ok(_) if trailing => Err(p.err("unexpected token after expression")),
        other => other,
    };
    let first = budget.errors().first().cloned();
    match (result, first) {
        (_, Some(e)) => Err(e),
        (Ok(sym), None) => Ok(sym),
        (Err(Halt::Syntax(e)), None) => Err(e),
        (Err(Halt::TooMany), None) => Err(CompileError::parse(
            &Position::new(filename, 0),
            TooManyErrors.to_string(),
        )),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

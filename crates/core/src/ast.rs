//! AST types shared by the parser, the checking passes, the interpreter
//! and the renderer.
//!
//! Every expression is a [`Sym`]: a [`SymKind`] variant plus its annotated
//! [`Type`] and source position. Declarations and sections are separate
//! structs owned by [`Program`].

use crate::error::Position;
use crate::lexer::Token;
use crate::pattern::Pattern;
use crate::types::{CtxType, Type, ValType};
use crate::value::Value;

// ──────────────────────────────────────────────
// Operators
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Or,
    And,
    BitAnd,
    BitXor,
    BitOr,
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Plus,
    Neg,
    BitNot,
    Not,
}

impl BinOp {
    pub fn from_token(tok: &Token) -> Option<BinOp> {
        Some(match tok {
            Token::OrOr => BinOp::Or,
            Token::AndAnd => BinOp::And,
            Token::Amp => BinOp::BitAnd,
            Token::Caret => BinOp::BitXor,
            Token::Pipe => BinOp::BitOr,
            Token::EqEq => BinOp::Eq,
            Token::NotEq => BinOp::Ne,
            Token::GtEq => BinOp::Ge,
            Token::LtEq => BinOp::Le,
            Token::Gt => BinOp::Gt,
            Token::Lt => BinOp::Lt,
            Token::Plus => BinOp::Add,
            Token::Minus => BinOp::Sub,
            Token::Star => BinOp::Mul,
            Token::Slash => BinOp::Div,
            Token::Percent => BinOp::Mod,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Or => "||",
            BinOp::And => "&&",
            BinOp::BitAnd => "&",
            BinOp::BitXor => "^",
            BinOp::BitOr => "|",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Ge => ">=",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Lt => "<",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
        }
    }

    /// Left binding power in the Pratt parser.
    pub fn binding_power(self) -> i32 {
        match self {
            BinOp::Or => 4000,
            BinOp::And => 5000,
            BinOp::BitAnd => 6000,
            BinOp::BitXor => 7000,
            BinOp::BitOr => 8000,
            BinOp::Eq | BinOp::Ne => 9000,
            BinOp::Ge | BinOp::Le | BinOp::Gt | BinOp::Lt => 10000,
            BinOp::Add | BinOp::Sub => 13000,
            BinOp::Mul | BinOp::Div | BinOp::Mod => 14000,
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Ge | BinOp::Le | BinOp::Gt | BinOp::Lt
        )
    }
}

impl UnOp {
    pub fn from_token(tok: &Token) -> Option<UnOp> {
        Some(match tok {
            Token::Plus => UnOp::Plus,
            Token::Minus => UnOp::Neg,
            Token::Tilde => UnOp::BitNot,
            Token::Bang => UnOp::Not,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            UnOp::Plus => "+",
            UnOp::Neg => "-",
            UnOp::BitNot => "~",
            UnOp::Not => "!",
        }
    }

    pub fn binding_power(self) -> i32 {
        match self {
            UnOp::Plus | UnOp::Neg => 16000,
            UnOp::BitNot | UnOp::Not => 17000,
        }
    }
}

// ──────────────────────────────────────────────
// Expressions
// ──────────────────────────────────────────────

/// Index of a builtin in the [`crate::builtins::Registry`].
pub type FuncId = usize;

#[derive(Debug, Clone)]
pub struct Sym {
    pub kind: SymKind,
    pub ty: Type,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub enum SymKind {
    /// Literal or folded value
    Const(Value),
    /// Named constant whose value is known only after its declaration folds
    ConstRef(String),
    Var(VarRef),
    Level(LevelRef),
    Call(Call),
    Unary(UnOp, Box<Sym>),
    Binary(BinOp, Box<Sym>, Box<Sym>),
    /// Pre-compiled literal argument of a matching builtin
    Pattern(Pattern),
    /// Placeholder left behind by an error
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarRef {
    pub name: String,
    /// Predefined by the runtime (`CurrLevel`, `Time`, `Uptime`)
    pub builtin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelRef {
    pub name: String,
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub name: String,
    pub func: FuncId,
    pub args: Vec<Sym>,
}

impl Sym {
    pub fn new(kind: SymKind, ty: Type, pos: Position) -> Self {
        Sym { kind, ty, pos }
    }

    pub fn constant(value: Value, pos: Position) -> Self {
        let ty = Type::new(value.val_type(), CtxType::Expr);
        Sym::new(SymKind::Const(value), ty, pos)
    }

    pub fn none(pos: Position) -> Self {
        Sym::new(SymKind::None, Type::UNDEF, pos)
    }

    /// Value of a constant node. Levels count as constants.
    pub fn const_value(&self) -> Option<Value> {
        match &self.kind {
            SymKind::Const(v) => Some(v.clone()),
            SymKind::Level(l) => Some(Value::Level(l.index)),
            _ => None,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self.kind, SymKind::Const(_) | SymKind::Level(_))
    }

    pub fn as_call(&self) -> Option<&Call> {
        match &self.kind {
            SymKind::Call(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_var(&self) -> Option<&VarRef> {
        match &self.kind {
            SymKind::Var(v) => Some(v),
            _ => None,
        }
    }

    /// Visit this node and every descendant, parents first.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Sym)) {
        f(self);
        match &self.kind {
            SymKind::Call(c) => {
                for a in &c.args {
                    a.walk(f);
                }
            }
            SymKind::Unary(_, e) => e.walk(f),
            SymKind::Binary(_, l, r) => {
                l.walk(f);
                r.walk(f);
            }
            _ => {}
        }
    }
}

// ──────────────────────────────────────────────
// Declarations and sections
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Level {
    pub name: String,
    pub index: usize,
    pub soft: bool,
    pub reachable: bool,
    pub pos: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Const,
    Var,
}

/// `name type = value ;` in a `consts:` or `vars:` section.
#[derive(Debug, Clone)]
pub struct Decl {
    pub kind: DeclKind,
    pub name: String,
    pub ty: ValType,
    pub value: Sym,
    pub pos: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    /// `,` always runs
    Comma,
    /// `=>` runs if the previous action succeeded
    Then,
    /// `!>` runs if the previous action failed
    NotThen,
}

impl Connector {
    pub fn symbol(self) -> &'static str {
        match self {
            Connector::Comma => ",",
            Connector::Then => "=>",
            Connector::NotThen => "!>",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Action {
    pub connector: Connector,
    pub call: Sym,
}

#[derive(Debug, Clone)]
pub struct Rule {
    /// Value of `CurrRule` inside this rule
    pub id: String,
    pub guard: Sym,
    pub actions: Vec<Action>,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub struct RuleSection {
    pub name: String,
    pub ctx: CtxType,
    pub rules: Vec<Rule>,
    pub pos: Position,
}

/// A compiled rule file.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub file: String,
    pub levels: Vec<Level>,
    pub decls: Vec<Decl>,
    pub sections: Vec<RuleSection>,
}

impl Program {
    pub fn level(&self, name: &str) -> Option<&Level> {
        self.levels.iter().find(|l| l.name == name)
    }

    pub fn level_names(&self) -> Vec<String> {
        self.levels.iter().map(|l| l.name.clone()).collect()
    }

    pub fn section(&self, name: &str) -> Option<&RuleSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn vars(&self) -> impl Iterator<Item = &Decl> {
        self.decls.iter().filter(|d| d.kind == DeclKind::Var)
    }

    pub fn rule_count(&self) -> usize {
        self.sections.iter().map(|s| s.rules.len()).sum()
    }
}

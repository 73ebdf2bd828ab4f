//! Two-axis types: a value type and a context type.
//!
//! The value axis is the usual int/float/bool/string. The context axis
//! records which kind of rule section an expression may be evaluated in,
//! so event-scoped builtins are rejected outside matching sections.

use serde::Serialize;
use std::fmt;

use crate::ast::{BinOp, UnOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValType {
    Undef,
    Univ,
    Int,
    Float,
    Bool,
    Str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CtxType {
    Undef,
    /// Pure expression, valid everywhere
    Expr,
    External,
    Msg,
    Graph,
    /// Either message or graph events
    MsgGraph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Type {
    pub val: ValType,
    pub ctx: CtxType,
}

impl ValType {
    /// Look up a type name as written in a declaration.
    pub fn from_name(name: &str) -> Option<ValType> {
        match name {
            "int" => Some(ValType::Int),
            "float" => Some(ValType::Float),
            "bool" => Some(ValType::Bool),
            "string" => Some(ValType::Str),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValType::Undef => "undef",
            ValType::Univ => "univ",
            ValType::Int => "int",
            ValType::Float => "float",
            ValType::Bool => "bool",
            ValType::Str => "string",
        }
    }

    pub fn compatible(self, other: ValType) -> bool {
        matches!(self, ValType::Undef | ValType::Univ)
            || matches!(other, ValType::Undef | ValType::Univ)
            || self == other
    }

    /// Whether a binary operator is defined on this value type.
    pub fn allows_binary(self, op: BinOp) -> bool {
        if op.is_comparison() {
            return true;
        }
        match self {
            ValType::Undef | ValType::Univ => true,
            ValType::Int => matches!(
                op,
                BinOp::Add
                    | BinOp::Sub
                    | BinOp::Mul
                    | BinOp::Div
                    | BinOp::Mod
                    | BinOp::BitAnd
                    | BinOp::BitOr
                    | BinOp::BitXor
            ),
            ValType::Float => matches!(op, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div),
            ValType::Bool => matches!(op, BinOp::And | BinOp::Or),
            ValType::Str => op == BinOp::Add,
        }
    }

    pub fn allows_unary(self, op: UnOp) -> bool {
        match self {
            ValType::Undef | ValType::Univ => true,
            ValType::Int => matches!(op, UnOp::Plus | UnOp::Neg | UnOp::BitNot),
            ValType::Float => matches!(op, UnOp::Plus | UnOp::Neg),
            ValType::Bool => op == UnOp::Not,
            ValType::Str => false,
        }
    }
}

impl CtxType {
    /// Map a rule section name to the context it evaluates in.
    pub fn from_section(name: &str) -> Option<CtxType> {
        match name {
            "Msg" => Some(CtxType::Msg),
            "Graph" => Some(CtxType::Graph),
            "MsgGraph" | "Message" => Some(CtxType::MsgGraph),
            "External" => Some(CtxType::External),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CtxType::Undef => "undef",
            CtxType::Expr => "expr",
            CtxType::External => "external",
            CtxType::Msg => "msg",
            CtxType::Graph => "graph",
            CtxType::MsgGraph => "msggraph",
        }
    }

    pub fn compatible(self, other: CtxType) -> bool {
        use CtxType::*;
        match (self, other) {
            (Undef | Expr, _) | (_, Undef | Expr) => true,
            (MsgGraph, Msg | Graph) | (Msg | Graph, MsgGraph) => true,
            (a, b) => a == b,
        }
    }
}

impl Type {
    pub const UNDEF: Type = Type::new(ValType::Undef, CtxType::Undef);
    pub const UNIV: Type = Type::new(ValType::Univ, CtxType::Expr);
    pub const INT: Type = Type::new(ValType::Int, CtxType::Expr);
    pub const FLOAT: Type = Type::new(ValType::Float, CtxType::Expr);
    pub const BOOL: Type = Type::new(ValType::Bool, CtxType::Expr);
    pub const STR: Type = Type::new(ValType::Str, CtxType::Expr);

    pub const fn new(val: ValType, ctx: CtxType) -> Self {
        Type { val, ctx }
    }

    pub const fn in_ctx(self, ctx: CtxType) -> Self {
        Type { val: self.val, ctx }
    }

    pub fn is_undef(&self) -> bool {
        self.val == ValType::Undef || self.ctx == CtxType::Undef
    }

    pub fn compatible(&self, other: &Type) -> bool {
        self.val.compatible(other.val) && self.ctx.compatible(other.ctx)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.val.name(), self.ctx.name())
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

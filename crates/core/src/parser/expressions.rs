use super::{Halt, PResult, Parser, DEFAULT_RBP};
use crate::ast::{BinOp, Call, LevelRef, Sym, SymKind, UnOp, VarRef};
use crate::env::Symbol;
use crate::error::{CompileError, Position};
use crate::lexer::Token;
use crate::types::{CtxType, Type};
use crate::value::Value;

/// Binding power of `(` used as a left operator.
const CALL_BP: i32 = 18000;

fn left_bp(tok: &Token) -> i32 {
    match tok {
        Token::RParen => 1,
        Token::LParen => CALL_BP,
        other => BinOp::from_token(other).map_or(0, BinOp::binding_power),
    }
}

impl<'r, 'b> Parser<'r, 'b> {
    // -- Pratt core ------------------------------------------------

    /// Parse an expression whose operators bind tighter than `rbp`.
    pub(super) fn expr(&mut self, rbp: i32) -> PResult<Sym> {
        if !self.peek()?.is_expr_token() {
            let found = self.peek()?.clone();
            return Err(self.err(format!("bad expression, found '{}'", found)));
        }
        let mut left = self.nud()?;
        loop {
            let tok = self.peek()?.clone();
            if !tok.is_expr_token() || tok == Token::RParen {
                return Ok(left);
            }
            let bp = left_bp(&tok);
            if bp == 0 {
                return Err(self.err(format!("no operator between expressions at '{}'", tok)));
            }
            if bp <= rbp {
                return Ok(left);
            }
            left = self.led(left)?;
        }
    }

    fn nud(&mut self) -> PResult<Sym> {
        let pos = self.pos();
        let tok = self.next()?.token;
        match tok {
            Token::Int(v) => Ok(Sym::constant(Value::Int(v), pos)),
            Token::Float(v) => Ok(Sym::constant(Value::Float(v), pos)),
            Token::Str(s) => Ok(Sym::constant(Value::Str(s), pos)),
            Token::Bool(b) => Ok(Sym::constant(Value::Bool(b), pos)),
            Token::LParen => {
                let inner = self.expr(0)?;
                if !self.at(&Token::RParen)? {
                    return Err(self.err("unmatched parenthesis"));
                }
                self.lx.lex();
                Ok(inner)
            }
            Token::Id(name) => self.ident(name, pos),
            other => match UnOp::from_token(&other) {
                Some(op) => {
                    if !self.peek()?.is_expr_token() || self.at(&Token::RParen)? {
                        return Err(self.err(format!(
                            "unary operator without operand '{}'",
                            op.symbol()
                        )));
                    }
                    let operand = self.expr(op.binding_power())?;
                    Ok(Sym::new(
                        SymKind::Unary(op, Box::new(operand)),
                        Type::UNDEF,
                        pos,
                    ))
                }
                None => Err(Halt::Syntax(CompileError::parse(
                    &pos,
                    format!("'{}' is not unary", other),
                ))),
            },
        }
    }

    fn led(&mut self, left: Sym) -> PResult<Sym> {
        let pos = self.pos();
        let tok = self.next()?.token;
        if tok == Token::LParen {
            return Err(Halt::Syntax(CompileError::parse(
                &pos,
                format!("cannot call a {}", describe(&left)),
            )));
        }
        let op = match BinOp::from_token(&tok) {
            Some(op) => op,
            None => return Err(self.err(format!("'{}' is not an operator", tok))),
        };
        if !self.peek()?.is_expr_token() || self.at(&Token::RParen)? {
            return Err(self.err(format!("missing operand for {}", op.symbol())));
        }
        let right = self.expr(op.binding_power())?;
        Ok(Sym::new(
            SymKind::Binary(op, Box::new(left), Box::new(right)),
            Type::UNDEF,
            pos,
        ))
    }

    // -- Names and calls -------------------------------------------

    fn ident(&mut self, name: String, pos: Position) -> PResult<Sym> {
        let is_call = self.at(&Token::LParen)?;
        let sym = match self.env.lookup(&name).cloned() {
            Some(sym) => sym,
            None => {
                self.record(CompileError::parse(
                    &pos,
                    format!("undeclared symbol '{}'", name),
                ))?;
                let _ = self.env.declare(&name, Symbol::Placeholder);
                Symbol::Placeholder
            }
        };
        if is_call {
            self.lx.lex();
            let args = self.args()?;
            return match sym {
                Symbol::Func(func) => {
                    let ty = self
                        .registry
                        .get(func)
                        .map_or(Type::UNDEF, |spec| spec.ret_type());
                    Ok(Sym::new(SymKind::Call(Call { name, func, args }), ty, pos))
                }
                Symbol::Placeholder => Ok(Sym::none(pos)),
                _ => Err(Halt::Syntax(CompileError::parse(
                    &pos,
                    format!("cannot call a {}", name),
                ))),
            };
        }
        let node = match sym {
            Symbol::Level { index, .. } => Sym::new(
                SymKind::Level(LevelRef { name, index }),
                Type::INT,
                pos,
            ),
            Symbol::Const {
                value: Some(value), ..
            } => Sym::constant(value, pos),
            Symbol::Const { ty, value: None } => Sym::new(
                SymKind::ConstRef(name),
                Type::new(ty, CtxType::Expr),
                pos,
            ),
            Symbol::Var { ty, builtin } => Sym::new(
                SymKind::Var(VarRef { name, builtin }),
                Type::new(ty, CtxType::Expr),
                pos,
            ),
            Symbol::Func(_) => {
                return Err(Halt::Syntax(CompileError::parse(
                    &pos,
                    format!("function {} used without a call", name),
                )))
            }
            Symbol::Section => {
                return Err(Halt::Syntax(CompileError::parse(
                    &pos,
                    format!("section {} is not a value", name),
                )))
            }
            Symbol::Placeholder => Sym::none(pos),
        };
        Ok(node)
    }

    /// Arguments after `(`, consuming the closing `)`.
    fn args(&mut self) -> PResult<Vec<Sym>> {
        let mut args = Vec::new();
        if !self.at(&Token::RParen)? && self.peek()?.is_expr_token() {
            loop {
                args.push(self.expr(DEFAULT_RBP - 1)?);
                if !self.at(&Token::Comma)? {
                    break;
                }
                self.lx.lex();
                if !self.peek()?.is_expr_token() || self.at(&Token::RParen)? {
                    return Err(self.err("empty parameter"));
                }
            }
        }
        if !self.at(&Token::RParen)? {
            return Err(self.err("missing ')' at end of params"));
        }
        self.lx.lex();
        Ok(args)
    }
}

fn describe(sym: &Sym) -> String {
    match &sym.kind {
        SymKind::Const(v) => format!("constant {}", v),
        SymKind::Call(c) => format!("call result of {}", c.name),
        SymKind::Unary(..) | SymKind::Binary(..) => "expression".to_owned(),
        SymKind::Var(v) => v.name.clone(),
        SymKind::ConstRef(name) => name.clone(),
        SymKind::Level(l) => l.name.clone(),
        SymKind::Pattern(p) => p.source.clone(),
        SymKind::None => "undeclared symbol".to_owned(),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::ast::{BinOp, Sym, SymKind, UnOp};
    use crate::builtins::Registry;
    use crate::parser::parse_expr;
    use crate::value::Value;

    fn parse(src: &str) -> Sym {
        parse_expr(src, "expr.rul", &Registry::standard())
            .unwrap_or_else(|e| panic!("{}: {}", src, e))
    }

    fn parse_err(src: &str) -> String {
        match parse_expr(src, "expr.rul", &Registry::standard()) {
            Ok(sym) => panic!("{} should fail, got {:?}", src, sym),
            Err(e) => e.message,
        }
    }

    /// Fully parenthesized rendering to check tree shape.
    fn shape(sym: &Sym) -> String {
        match &sym.kind {
            SymKind::Const(Value::Int(v)) => v.to_string(),
            SymKind::Const(v) => format!("{:?}", v),
            SymKind::Var(v) => v.name.clone(),
            SymKind::Binary(op, l, r) => format!("({} {} {})", shape(l), op.symbol(), shape(r)),
            SymKind::Unary(op, e) => format!("({}{})", op.symbol(), shape(e)),
            SymKind::Call(c) => format!(
                "{}({})",
                c.name,
                c.args.iter().map(shape).collect::<Vec<_>>().join(", ")
            ),
            other => format!("{:?}", other),
        }
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(shape(&parse("1 + 2 * 3")), "(1 + (2 * 3))");
        assert_eq!(shape(&parse("1 - 2 - 3")), "((1 - 2) - 3)");
        assert_eq!(shape(&parse("3 * (4 + 5)")), "(3 * (4 + 5))");
        assert_eq!(
            shape(&parse("1 < 2 && 3 == 3 || false")),
            "(((1 < 2) && (3 == 3)) || Bool(false))"
        );
        assert_eq!(shape(&parse("1 | 2 ^ 3 & 4")), "(((1 | 2) ^ 3) & 4)");
        assert_eq!(shape(&parse("1 & 2 | 3")), "(1 & (2 | 3))");
        assert_eq!(shape(&parse("-2 * 3")), "((-2) * 3)");
        assert_eq!(shape(&parse("!true && false")), "((!Bool(true)) && Bool(false))");
        assert_eq!(shape(&parse("Time % 7 + 1")), "((Time % 7) + 1)");
    }

    #[test]
    fn calls_and_nested_args() {
        assert_eq!(
            shape(&parse("exec(\"a\", string(1 + 2), levelname(CurrLevel))")),
            "exec(Str(\"a\"), string((1 + 2)), levelname(CurrLevel))"
        );
        assert_eq!(shape(&parse("topicin()")), "topicin()");
        match &parse("exec(\"a\")").kind {
            SymKind::Call(c) => assert_eq!(c.args.len(), 1),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn unary_ops_parse() {
        match &parse("~5").kind {
            SymKind::Unary(UnOp::BitNot, _) => {}
            other => panic!("{:?}", other),
        }
        match &parse("1 >= 2").kind {
            SymKind::Binary(BinOp::Ge, _, _) => {}
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn syntax_errors() {
        assert!(parse_err("(1 + 2").contains("unmatched parenthesis"));
        assert!(parse_err("1 +").contains("missing operand"));
        assert!(parse_err("-").contains("unary operator without operand"));
        assert!(parse_err("* 3").contains("is not unary"));
        assert!(parse_err("3(4)").contains("cannot call a constant 3"));
        assert!(parse_err("Time(1)").contains("cannot call a Time"));
        assert!(parse_err("nothere + 1").contains("undeclared symbol 'nothere'"));
        assert!(parse_err("exec(\"a\",)").contains("empty parameter"));
        assert!(parse_err("exec(\"a\" ;").contains("missing ')'"));
        assert!(parse_err("1 2").contains("no operator"));
        assert!(parse_err(";").contains("bad expression"));
    }
}

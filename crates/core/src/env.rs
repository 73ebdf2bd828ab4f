//! Scoped name tables.
//!
//! The same stack is used by the parser, holding [`Symbol`]s, and by the
//! interpreter, holding current values.

use std::collections::HashMap;

use crate::ast::FuncId;
use crate::types::ValType;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnvError {
    #[error("already declared sym: no shadowing '{0}'")]
    AlreadyDeclared(String),
    #[error("cannot pop the base scope")]
    BaseScope,
}

/// What a name means while parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    Level { index: usize, soft: bool },
    /// `value` is known for predefined constants only
    Const { ty: ValType, value: Option<Value> },
    Var { ty: ValType, builtin: bool },
    Func(FuncId),
    Section,
    /// Declared after an "undeclared symbol" error to silence repeats
    Placeholder,
}

/// Ordered scopes, innermost last. The base scope is never popped.
#[derive(Debug, Clone)]
pub struct EnvStack<T> {
    scopes: Vec<HashMap<String, T>>,
}

impl<T> EnvStack<T> {
    pub fn new() -> Self {
        EnvStack {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop(&mut self) -> Result<HashMap<String, T>, EnvError> {
        if self.scopes.len() <= 1 {
            return Err(EnvError::BaseScope);
        }
        self.scopes.pop().ok_or(EnvError::BaseScope)
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn lookup(&self, name: &str) -> Option<&T> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut T> {
        self.scopes.iter_mut().rev().find_map(|s| s.get_mut(name))
    }

    /// Declare in the innermost scope. Fails if the name is visible in any
    /// scope.
    pub fn declare(&mut self, name: &str, value: T) -> Result<(), EnvError> {
        if self.lookup(name).is_some() {
            return Err(EnvError::AlreadyDeclared(name.to_owned()));
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_owned(), value);
        }
        Ok(())
    }

    /// Innermost scope.
    pub fn current(&self) -> &HashMap<String, T> {
        &self.scopes[self.scopes.len() - 1]
    }
}

impl<T> Default for EnvStack<T> {
    fn default() -> Self {
        EnvStack::new()
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_scans_innermost_first() {
        let mut env: EnvStack<i32> = EnvStack::new();
        env.declare("a", 1).unwrap();
        env.push();
        env.declare("b", 2).unwrap();
        assert_eq!(env.lookup("a"), Some(&1));
        assert_eq!(env.lookup("b"), Some(&2));
        env.pop().unwrap();
        assert_eq!(env.lookup("b"), None);
    }

    #[test]
    fn no_shadowing_at_any_depth() {
        let mut env: EnvStack<i32> = EnvStack::new();
        env.declare("x", 1).unwrap();
        for _ in 0..4 {
            env.push();
        }
        assert_eq!(
            env.declare("x", 2),
            Err(EnvError::AlreadyDeclared("x".into()))
        );
        assert_eq!(env.declare("y", 2), Ok(()));
        assert_eq!(env.declare("y", 3), Err(EnvError::AlreadyDeclared("y".into())));
    }

    #[test]
    fn base_scope_is_never_popped() {
        let mut env: EnvStack<i32> = EnvStack::new();
        assert_eq!(env.pop(), Err(EnvError::BaseScope));
        env.push();
        assert!(env.pop().is_ok());
        assert_eq!(env.depth(), 1);
    }

    #[test]
    fn lookup_mut_updates_in_place() {
        let mut env: EnvStack<i32> = EnvStack::new();
        env.declare("n", 5).unwrap();
        env.push();
        if let Some(v) = env.lookup_mut("n") {
            *v += 1;
        }
        assert_eq!(env.lookup("n"), Some(&6));
    }
}

//! Lexical scope stack
//!
//! Shared machinery of the scoping and typing passes: a stack of
//! name-to-type maps. The outermost scope is always present; passes
//! enter a scope at every function, loop and if/else body and must
//! leave it again on every exit path.

use crate::types::Type;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug)]
pub struct ScopeStack {
    scopes: Vec<HashMap<String, Rc<Type>>>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    /// A stack holding only the (empty) outer scope
    pub fn new() -> Self {
        ScopeStack {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn enter(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn leave(&mut self) {
        assert!(
            self.scopes.len() > 1,
            "internal compiler error, trying to leave the outermost scope!"
        );
        self.scopes.pop();
    }

    /// Number of open scopes, including the outermost one
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Add a name to the innermost scope; fails when the innermost scope
    /// already holds it
    pub fn declare(&mut self, name: &str, type_: Rc<Type>) -> Result<(), String> {
        let innermost = self
            .scopes
            .last_mut()
            .unwrap_or_else(|| unreachable!("internal compiler error, no scopes left!"));
        if innermost.contains_key(name) {
            return Err(format!("identifier '{name}' already exists!"));
        }
        innermost.insert(name.to_string(), type_);
        Ok(())
    }

    /// Look a name up through all live scopes, innermost first
    pub fn lookup(&self, name: &str) -> Option<Rc<Type>> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
    }
}

//! Class-name resolution
//!
//! First linear pass over the token stream: every identifier directly
//! following the `class` keyword names a new class type and is recorded
//! in the type registry. The stream itself is not modified; rewriting
//! identifiers into type tokens is the type applier's job.

use crate::stream::Stream;
use crate::tokens::Token;
use crate::tokens::TokenKind;
use crate::types::Types;

pub struct TypeResolver;

impl TypeResolver {
    /// Build the type registry for a token stream: built-ins plus every
    /// declared class name
    pub fn resolve(tokens: &Stream<Token>) -> Types {
        let mut types = Types::new();
        for index in 0..tokens.len() {
            let Some(token) = tokens.get(index) else { break };
            if !matches!(token.kind, TokenKind::Class) {
                continue;
            }
            if let Some(name) = tokens.get(index + 1).and_then(Token::identifier) {
                types.add_class(name);
            }
        }
        types
    }
}

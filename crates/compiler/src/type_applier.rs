//! Type application
//!
//! Second rewrite stage over the token stream, after class names have
//! been resolved. Two in-place rewrites using the stream's replace
//! window:
//!
//! 1. every identifier whose lexeme names a registered type (by keyword
//!    or alias) becomes a `Type` token;
//! 2. every `list [ Type ]` run collapses into a single `Type` token
//!    whose referent is the interned list type.
//!
//! The list rewrite sweeps until a fixpoint so that nested shapes like
//! `list[list[u8]]` resolve inner-first. Afterwards no surviving
//! identifier token spells a type name.

use crate::errors::CompileError;
use crate::source_location::SourceLocation;
use crate::stream::Stream;
use crate::tokens::Token;
use crate::tokens::TokenKind;
use crate::types::Types;
use std::path::Path;
use std::path::PathBuf;
use std::rc::Rc;

pub struct TypeApplier<'a> {
    filename: PathBuf,
    source: &'a str,
    types: &'a mut Types,
}

impl<'a> TypeApplier<'a> {
    pub fn new(filename: &Path, source: &'a str, types: &'a mut Types) -> Self {
        TypeApplier {
            filename: filename.to_path_buf(),
            source,
            types,
        }
    }

    /// Rewrite the token stream in place; returns the diagnostics for
    /// malformed `list[...]` shapes
    pub fn apply(&mut self, tokens: &mut Stream<Token>) -> Result<(), Vec<CompileError>> {
        self.apply_identifiers(tokens);
        let errors = self.apply_list_types(tokens);
        tokens.reset();
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Replace every type-naming identifier with a type token
    fn apply_identifiers(&mut self, tokens: &mut Stream<Token>) {
        tokens.reset();
        while let Some(token) = tokens.next() {
            let Some(name) = token.identifier() else { continue };
            if let Some(type_) = self.types.get(name) {
                let replacement = Token::new(TokenKind::Type(Rc::clone(type_)), token.location);
                tokens.replace(1, replacement);
            }
        }
    }

    /// Collapse `list [ Type ]` runs into single type tokens, sweeping
    /// until no further shape can be rewritten
    fn apply_list_types(&mut self, tokens: &mut Stream<Token>) -> Vec<CompileError> {
        let mut errors = Vec::new();
        loop {
            // diagnostics from earlier sweeps may describe shapes that a
            // later sweep resolved, so only the last sweep's survive
            errors.clear();
            let mut replaced_any = false;

            tokens.reset();
            while let Some(token) = tokens.next() {
                if !matches!(token.kind, TokenKind::List) {
                    continue;
                }

                // a list should have a type token between brackets
                if let Err(error) = self.expect(tokens, 0, &TokenKind::BracketOpen) {
                    errors.push(error);
                    continue;
                }
                let element = match tokens.peek(1).map(|t| t.kind.clone()) {
                    Some(TokenKind::Type(element)) => element,
                    // an inner `list [ ... ]` still needs its own sweep
                    Some(TokenKind::List) => continue,
                    _ => {
                        errors.push(self.expectation_error(tokens, 1, &TokenKind::Type(
                            self.types.builtin("void"),
                        )));
                        continue;
                    }
                };
                let bracket_close = match self.expect(tokens, 2, &TokenKind::BracketClose) {
                    Ok(token) => token,
                    Err(error) => {
                        errors.push(error);
                        continue;
                    }
                };

                // add (if not already existing) the list type with this element type
                let list_type = self.types.add_list_type(&element);

                // the new token covers `list` through the closing bracket
                let location = token.location + bracket_close.location;
                tokens.replace(4, Token::new(TokenKind::Type(list_type), location));
                replaced_any = true;
            }

            if !replaced_any {
                break;
            }
        }
        errors
    }

    /// Expect the token at the lookahead offset to be of the given kind
    fn expect(
        &self,
        tokens: &Stream<Token>,
        offset: usize,
        expected: &TokenKind,
    ) -> Result<Token, CompileError> {
        match tokens.peek(offset) {
            Some(token) if token.kind.same_kind(expected) => Ok(token.clone()),
            _ => Err(self.expectation_error(tokens, offset, expected)),
        }
    }

    fn expectation_error(
        &self,
        tokens: &Stream<Token>,
        offset: usize,
        expected: &TokenKind,
    ) -> CompileError {
        let (found, location) = match tokens.peek(offset) {
            Some(token) => (token.kind.to_string(), token.location),
            None => ("end of file".to_string(), SourceLocation::new(self.source.len(), 0)),
        };
        let expected = match expected {
            TokenKind::Type(_) => "type".to_string(),
            other => other.to_string(),
        };
        CompileError::at(
            format!("expected '{expected}' but found '{found}'!"),
            &self.filename,
            self.source,
            location,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Tokenizer;
    use crate::type_resolver::TypeResolver;

    fn apply(source: &str) -> (Stream<Token>, Types, Result<(), Vec<CompileError>>) {
        let result = Tokenizer::new(source, Path::new("test.tapl")).tokenize();
        assert!(result.errors.is_empty());
        let mut tokens = result.tokens;
        let mut types = TypeResolver::resolve(&tokens);
        let applied = TypeApplier::new(Path::new("test.tapl"), source, &mut types).apply(&mut tokens);
        (tokens, types, applied)
    }

    fn type_keywords(tokens: &mut Stream<Token>) -> Vec<String> {
        let mut keywords = Vec::new();
        tokens.reset();
        while let Some(token) = tokens.next() {
            if let Some(type_) = token.type_ref() {
                keywords.push(type_.keyword.clone());
            }
        }
        keywords
    }

    #[test]
    fn test_builtin_identifier_becomes_type_token() {
        let (mut tokens, _, applied) = apply("u16 var = 10\n");
        applied.unwrap();
        assert_eq!(type_keywords(&mut tokens), vec!["u16"]);
    }

    #[test]
    fn test_alias_becomes_canonical_type() {
        let (mut tokens, _, applied) = apply("bool flag = true\n");
        applied.unwrap();
        assert_eq!(type_keywords(&mut tokens), vec!["u1"]);
    }

    #[test]
    fn test_class_name_becomes_type_token() {
        let (mut tokens, _, applied) = apply("class Point:\n    u8 x\nPoint p\n");
        applied.unwrap();
        assert_eq!(type_keywords(&mut tokens), vec!["Point", "u8", "Point"]);
    }

    #[test]
    fn test_list_shape_collapses_to_one_token() {
        let (mut tokens, types, applied) = apply("list[u32] xs\n");
        applied.unwrap();
        assert_eq!(type_keywords(&mut tokens), vec!["list[u32]"]);
        assert!(types.get("list[u32]").is_some());

        // the collapsed token spans `list` through `]`
        tokens.reset();
        let first = tokens.next().unwrap();
        assert_eq!(first.location, SourceLocation::new(0, 9));
    }

    #[test]
    fn test_list_types_are_interned() {
        let (_, types, applied) = apply("list[u8] a\nlist[u8] b\n");
        applied.unwrap();
        assert_eq!(types.list_types().len(), 1);
    }

    #[test]
    fn test_nested_list_resolves_inner_first() {
        let (mut tokens, types, applied) = apply("list[list[u8]] grid\n");
        applied.unwrap();
        assert_eq!(type_keywords(&mut tokens), vec!["list[list[u8]]"]);
        let interned: Vec<_> = types.list_types().iter().map(|t| t.keyword.clone()).collect();
        assert_eq!(interned, vec!["list[u8]", "list[list[u8]]"]);
    }

    #[test]
    fn test_malformed_list_shape_is_diagnosed() {
        let (_, _, applied) = apply("list u8 xs\n");
        let errors = applied.unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("expected '['"));
    }

    #[test]
    fn test_unknown_element_type_is_diagnosed() {
        let (_, _, applied) = apply("list[wat] xs\n");
        let errors = applied.unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("expected 'type'"));
    }

    #[test]
    fn test_no_type_naming_identifiers_survive() {
        let source = "class Point:\n    u8 x\nu16 var = 10\nbool flag = false\nlist[u8] xs\n";
        let (mut tokens, types, applied) = apply(source);
        applied.unwrap();
        tokens.reset();
        while let Some(token) = tokens.next() {
            if let Some(name) = token.identifier() {
                assert!(types.get(name).is_none(), "identifier '{name}' names a type");
            }
        }
    }
}

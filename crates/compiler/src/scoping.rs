//! Scoping pass
//!
//! First AST check: walks every statement with a stack of lexical
//! scopes, reporting duplicate declarations in the innermost scope and
//! references to names no live scope holds. Function names are declared
//! in the surrounding scope before their body opens, so a function can
//! refer to itself. Loop-control statements are validated to sit inside
//! a loop here as well.
//!
//! Errors are collected across the whole tree; the pass fails at the
//! end when any were found.

use crate::ast::Ast;
use crate::ast::Expression;
use crate::ast::ExpressionKind;
use crate::ast::Function;
use crate::ast::Statement;
use crate::ast::StatementKind;
use crate::ast::StringPart;
use crate::errors::CompileError;
use crate::scope::ScopeStack;
use crate::source_location::SourceLocation;
use crate::types::Type;
use std::path::PathBuf;
use std::rc::Rc;

pub struct ScopingPass<'a> {
    filename: PathBuf,
    source: &'a str,
    scopes: ScopeStack,
    errors: Vec<CompileError>,
    loop_depth: usize,
    /// Scoping only tracks names; the slot every declaration maps to
    placeholder: Rc<Type>,
}

type CheckResult = Result<(), CompileError>;

impl<'a> ScopingPass<'a> {
    pub fn new(ast: &Ast, source: &'a str) -> Self {
        ScopingPass {
            filename: ast.filename.clone(),
            source,
            scopes: ScopeStack::new(),
            errors: Vec::new(),
            loop_depth: 0,
            placeholder: ast.types.builtin("base"),
        }
    }

    /// Run the pass over the whole AST, collecting every error
    pub fn run(mut self, ast: &Ast) -> Result<(), Vec<CompileError>> {
        for statement in &ast.statements {
            self.check_statement(statement);
        }

        // ensure that we have only the global scope left
        assert_eq!(
            self.scopes.depth(),
            1,
            "internal compiler error, more scopes than the global scope left!"
        );

        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    /// Wrapper that turns a failed check into a collected error
    fn check_statement(&mut self, statement: &Statement) {
        if let Err(error) = self.statement(statement) {
            self.errors.push(error);
        }
    }

    fn statement(&mut self, statement: &Statement) -> CheckResult {
        match &statement.kind {
            StatementKind::VarDecl(decl) => {
                // the initial value may not refer to the name it declares
                if let Some(initial_value) = &decl.initial_value {
                    self.expression(initial_value)?;
                }
                self.declare(&decl.name, decl.name_location)
            }
            StatementKind::Assignment { target, value } => {
                self.expression(target)?;
                self.expression(value)
            }
            StatementKind::Expression { expression } => self.expression(expression),
            StatementKind::If(if_statement) => {
                self.scoped_block(Some(&if_statement.condition), &if_statement.statements);
                for (condition, block) in &if_statement.else_if_blocks {
                    self.scoped_block(Some(condition), block);
                }
                if let Some(block) = &if_statement.else_statements {
                    self.scoped_block(None, block);
                }
                Ok(())
            }
            StatementKind::ForLoop(for_loop) => {
                self.scopes.enter();
                if let Some(init) = &for_loop.init {
                    self.check_statement(init);
                }
                if let Some(check) = &for_loop.check
                    && let Err(error) = self.expression(check)
                {
                    self.errors.push(error);
                }
                if let Some(step) = &for_loop.step
                    && let Err(error) = self.expression(step)
                {
                    self.errors.push(error);
                }
                self.loop_depth += 1;
                for body_statement in &for_loop.statements {
                    self.check_statement(body_statement);
                }
                self.loop_depth -= 1;
                self.scopes.leave();
                Ok(())
            }
            StatementKind::Function(function) => self.function(function),
            StatementKind::Class(class) => {
                self.scopes.enter();
                for field in &class.fields {
                    self.check_statement(field);
                }
                for method in &class.methods {
                    if let Err(error) = self.function(method) {
                        self.errors.push(error);
                    }
                }
                for lifecycle in class.constructor.iter().chain(class.destructor.iter()) {
                    self.scopes.enter();
                    for param in &lifecycle.params {
                        if let Err(error) = self.declare(&param.name, param.location) {
                            self.errors.push(error);
                        }
                    }
                    for body_statement in &lifecycle.statements {
                        self.check_statement(body_statement);
                    }
                    self.scopes.leave();
                }
                self.scopes.leave();
                Ok(())
            }
            StatementKind::Return { value } => match value {
                Some(value) => self.expression(value),
                None => Ok(()),
            },
            StatementKind::Print { value, .. } => self.expression(value),
            StatementKind::Break => self.require_loop("break", statement.location),
            StatementKind::Continue => self.require_loop("continue", statement.location),
            StatementKind::Breakall { .. } => self.require_loop("breakall", statement.location),
            StatementKind::List(list) => self.declare(&list.name, list.name_location),
        }
    }

    /// A function or method: name in the surrounding scope, parameters
    /// and body in a fresh one
    fn function(&mut self, function: &Function) -> CheckResult {
        // the function name lives in the surrounding scope, so the body
        // can recurse into it
        self.declare(&function.name, function.name_location)?;
        self.scopes.enter();
        for param in &function.params {
            if let Err(error) = self.declare(&param.name, param.location) {
                self.errors.push(error);
            }
        }
        for body_statement in &function.statements {
            self.check_statement(body_statement);
        }
        self.scopes.leave();
        Ok(())
    }

    /// A scope covering an optional condition and a statement block
    fn scoped_block(&mut self, condition: Option<&Expression>, statements: &[Statement]) {
        self.scopes.enter();
        if let Some(condition) = condition
            && let Err(error) = self.expression(condition)
        {
            self.errors.push(error);
        }
        for statement in statements {
            self.check_statement(statement);
        }
        self.scopes.leave();
    }

    fn expression(&mut self, expression: &Expression) -> CheckResult {
        match &expression.kind {
            ExpressionKind::Binary { left, right, .. } => {
                self.expression(left)?;
                self.expression(right)
            }
            ExpressionKind::Unary { operand, .. } => self.expression(operand),
            ExpressionKind::TokenValue { token } => match token.identifier() {
                Some(name) => self.ensure_exists(name, token.location),
                None => Ok(()),
            },
            ExpressionKind::Identifier { name, inner } => {
                // only the chain head is a plain name; members need type
                // information and are resolved by the typing pass
                self.ensure_exists(name, expression.location)?;
                match inner {
                    Some(inner) => self.chain_arguments(inner),
                    None => Ok(()),
                }
            }
            ExpressionKind::Call {
                name, arguments, ..
            } => {
                self.ensure_exists(name, expression.location)?;
                for argument in arguments {
                    self.expression(argument)?;
                }
                Ok(())
            }
            ExpressionKind::TypeCast { operand, .. } => self.expression(operand),
            ExpressionKind::Str { parts } => {
                for part in parts {
                    if let StringPart::Expr(expression) = part {
                        self.expression(expression)?;
                    }
                }
                Ok(())
            }
            ExpressionKind::This { inner } => self.chain_arguments(inner),
        }
    }

    /// Walk a member chain checking only call arguments; the member names
    /// themselves resolve against a type, not a scope
    fn chain_arguments(&mut self, expression: &Expression) -> CheckResult {
        match &expression.kind {
            ExpressionKind::Identifier { inner, .. } => match inner {
                Some(inner) => self.chain_arguments(inner),
                None => Ok(()),
            },
            ExpressionKind::Call { arguments, .. } => {
                for argument in arguments {
                    self.expression(argument)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn declare(&mut self, name: &str, location: SourceLocation) -> CheckResult {
        self.scopes
            .declare(name, Rc::clone(&self.placeholder))
            .map_err(|message| self.error_at(message, location))
    }

    fn ensure_exists(&mut self, name: &str, location: SourceLocation) -> CheckResult {
        if self.scopes.lookup(name).is_some() {
            return Ok(());
        }
        Err(self.error_at(format!("unknown identifier '{name}'!"), location))
    }

    fn error_at(&self, message: impl Into<String>, location: SourceLocation) -> CompileError {
        CompileError::at(message, &self.filename, self.source, location)
    }

    fn require_loop(&self, keyword: &str, location: SourceLocation) -> CheckResult {
        if self.loop_depth > 0 {
            return Ok(());
        }
        Err(self.error_at(format!("'{keyword}' outside of a loop!"), location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::tokenizer::Tokenizer;
    use crate::type_applier::TypeApplier;
    use crate::type_resolver::TypeResolver;
    use std::path::Path;

    fn scope_check(source: &str) -> Result<(), Vec<CompileError>> {
        let filename = Path::new("test.tapl");
        let result = Tokenizer::new(source, filename).tokenize();
        assert!(result.errors.is_empty());
        let mut tokens = result.tokens;
        let mut types = TypeResolver::resolve(&tokens);
        TypeApplier::new(filename, source, &mut types)
            .apply(&mut tokens)
            .unwrap();
        let ast = Parser::new(tokens, types, filename, source)
            .parse()
            .expect("parse failed");
        ScopingPass::new(&ast, source).run(&ast)
    }

    #[test]
    fn test_declared_variable_is_known() {
        scope_check("u8 x = 1\nprint(x)\n").unwrap();
    }

    #[test]
    fn test_unknown_identifier() {
        let errors = scope_check("print(nope)\n").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "unknown identifier 'nope'!");
        assert_eq!(errors[0].line, 1);
        assert_eq!(errors[0].source_line, "print(nope)");
    }

    #[test]
    fn test_duplicate_declaration() {
        let errors = scope_check("u8 x = 1\nu8 x = 2\n").unwrap_err();
        assert_eq!(errors[0].message, "identifier 'x' already exists!");
    }

    #[test]
    fn test_initial_value_may_not_use_declared_name() {
        let errors = scope_check("u8 x = x\n").unwrap_err();
        assert_eq!(errors[0].message, "unknown identifier 'x'!");
    }

    #[test]
    fn test_block_scope_allows_redeclaration() {
        scope_check("u8 x = 1\nif x:\n    u8 y = 2\nif x:\n    u8 y = 3\n").unwrap();
    }

    #[test]
    fn test_inner_scope_name_does_not_leak() {
        let errors = scope_check("if 1:\n    u8 y = 2\nprint(y)\n").unwrap_err();
        assert_eq!(errors[0].message, "unknown identifier 'y'!");
    }

    #[test]
    fn test_function_can_refer_to_itself() {
        scope_check("u8 f(u8 x):\n    return f(x)\n").unwrap();
    }

    #[test]
    fn test_function_params_are_in_scope() {
        scope_check("u8 f(u8 x, u8 y):\n    return x + y\n").unwrap();
    }

    #[test]
    fn test_for_loop_variable_scoped_to_loop() {
        let errors = scope_check("for u8 i = 0; i < 3; ++i:\n    print(i)\nprint(i)\n").unwrap_err();
        assert_eq!(errors[0].message, "unknown identifier 'i'!");
    }

    #[test]
    fn test_assignment_to_unknown_identifier() {
        let errors = scope_check("x = 5\n").unwrap_err();
        assert_eq!(errors[0].message, "unknown identifier 'x'!");
    }

    #[test]
    fn test_break_outside_loop() {
        let errors = scope_check("break\n").unwrap_err();
        assert_eq!(errors[0].message, "'break' outside of a loop!");
    }

    #[test]
    fn test_continue_inside_loop_is_fine() {
        scope_check("while 1:\n    continue\n").unwrap();
    }

    #[test]
    fn test_breakall_outside_loop() {
        let errors = scope_check("u8 f():\n    breakall done\n    return 1\n").unwrap_err();
        assert_eq!(errors[0].message, "'breakall' outside of a loop!");
    }

    #[test]
    fn test_multiple_errors_are_collected() {
        let errors = scope_check("print(a)\nprint(b)\n").unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_list_declaration_is_scoped() {
        scope_check("list[u8] xs\nxs.add(1)\n").unwrap();
        let errors = scope_check("list[u8] xs\nlist[u8] xs\n").unwrap_err();
        assert_eq!(errors[0].message, "identifier 'xs' already exists!");
    }

    #[test]
    fn test_class_members_are_scoped_to_class() {
        let source = "class Point:\n    u8 x\n    u8 get_x():\n        return this.x\nu8 x = 1\n";
        scope_check(source).unwrap();
    }

    #[test]
    fn test_duplicate_field_is_rejected() {
        let errors = scope_check("class Point:\n    u8 x\n    u16 x\n").unwrap_err();
        assert_eq!(errors[0].message, "identifier 'x' already exists!");
    }
}

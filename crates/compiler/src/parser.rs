//! Recursive-descent parser
//!
//! Consumes the rewritten token stream (identifiers that name types have
//! already become type tokens) and produces the statement tree. One
//! token of lookahead decides most statement forms; type-prefixed
//! statements need two to tell a function declaration from a variable
//! declaration.
//!
//! Errors do not abort the parse: the parser records the diagnostic,
//! skips to the next newline, swallows any stray INDENT/DEDENT tokens
//! and continues, so a malformed statement cannot cascade.

use crate::ast::Ast;
use crate::ast::ClassDecl;
use crate::ast::Expression;
use crate::ast::ExpressionKind;
use crate::ast::ForLoop;
use crate::ast::Function;
use crate::ast::IfStatement;
use crate::ast::Lifecycle;
use crate::ast::ListDecl;
use crate::ast::Param;
use crate::ast::Statement;
use crate::ast::StatementKind;
use crate::ast::StringPart;
use crate::ast::UnaryKind;
use crate::ast::VarDecl;
use crate::errors::CompileError;
use crate::source_location::SourceLocation;
use crate::stream::Stream;
use crate::tokens::Token;
use crate::tokens::TokenKind;
use crate::types::Type;
use crate::types::Types;
use std::path::Path;
use std::path::PathBuf;
use std::rc::Rc;

pub struct Parser<'a> {
    tokens: Stream<Token>,
    types: Types,
    filename: PathBuf,
    source: &'a str,
    errors: Vec<CompileError>,
    eof: Token,
    /// Nesting depth of function bodies; return is only legal inside one
    function_depth: usize,
    /// Nesting depth of loop bodies; breakall labels bind to the outermost
    loop_depth: usize,
}

type ParseResult<T> = Result<T, CompileError>;

impl<'a> Parser<'a> {
    pub fn new(tokens: Stream<Token>, types: Types, filename: &Path, source: &'a str) -> Self {
        let eof = Token::new(TokenKind::Eof, SourceLocation::new(source.len(), 0));
        Parser {
            tokens,
            types,
            filename: filename.to_path_buf(),
            source,
            errors: Vec::new(),
            eof,
            function_depth: 0,
            loop_depth: 0,
        }
    }

    /// Parse the whole token stream into an AST, collecting every error
    pub fn parse(mut self) -> Result<Ast, Vec<CompileError>> {
        self.tokens.reset();
        let mut statements = Vec::new();
        while !self.at_eof() {
            // stray newlines and block tokens left by error recovery
            if self.match_kind(&TokenKind::Newline).is_some()
                || self.match_kind(&TokenKind::Dedent).is_some()
            {
                continue;
            }
            match self.statement() {
                Ok(statement) => statements.push(statement),
                Err(error) => {
                    self.errors.push(error);
                    self.synchronize();
                }
            }
        }

        if self.errors.is_empty() {
            Ok(Ast {
                filename: self.filename,
                types: self.types,
                statements,
            })
        } else {
            Err(self.errors)
        }
    }

    // ------------------------------------------------------------------
    // token plumbing

    fn peek(&self, offset: usize) -> &Token {
        self.tokens.peek(offset).unwrap_or(&self.eof)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(0).kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        if self.at_eof() {
            return self.eof.clone();
        }
        match self.tokens.next() {
            Some(token) => token,
            None => self.eof.clone(),
        }
    }

    /// Consume the next token when its kind matches
    fn match_kind(&mut self, kind: &TokenKind) -> Option<Token> {
        if self.peek(0).kind.same_kind(kind) {
            return Some(self.advance());
        }
        None
    }

    fn expect(&mut self, kind: &TokenKind) -> ParseResult<Token> {
        if let Some(token) = self.match_kind(kind) {
            return Ok(token);
        }
        let expected = expected_name(kind);
        let found = self.peek(0);
        Err(self.error_at(
            format!("expected '{expected}' but found '{}'!", found.kind),
            found.location,
        ))
    }

    fn error_at(&self, message: impl Into<String>, location: SourceLocation) -> CompileError {
        CompileError::at(message, &self.filename, self.source, location)
    }

    /// Skip to the next newline, then swallow stray block tokens, so one
    /// malformed statement cannot cascade
    fn synchronize(&mut self) {
        while !self.at_eof() {
            match self.peek(0).kind {
                TokenKind::Newline => {
                    self.advance();
                    break;
                }
                // leave block closing to the caller
                TokenKind::Dedent => break,
                _ => {
                    self.advance();
                }
            }
        }
        while matches!(self.peek(0).kind, TokenKind::Indent) {
            self.advance();
        }
    }

    /// A statement ends at a newline, or just before the end of its
    /// enclosing block (the tokenizer drops a newline next to a DEDENT)
    fn expect_statement_end(&mut self) -> ParseResult<()> {
        if self.match_kind(&TokenKind::Newline).is_some() {
            return Ok(());
        }
        if matches!(self.peek(0).kind, TokenKind::Dedent | TokenKind::Eof) {
            return Ok(());
        }
        let found = self.peek(0);
        Err(self.error_at(
            format!("expected 'newline' but found '{}'!", found.kind),
            found.location,
        ))
    }

    // ------------------------------------------------------------------
    // statements

    fn statement(&mut self) -> ParseResult<Statement> {
        match &self.peek(0).kind {
            TokenKind::Type(_) => {
                if self.peek(1).identifier().is_some()
                    && matches!(self.peek(2).kind, TokenKind::ParenOpen)
                {
                    return self.function_statement();
                }
                self.var_decl_statement()
            }
            TokenKind::If => self.if_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::Print => self.print_statement(false),
            TokenKind::Println => self.print_statement(true),
            TokenKind::Return => self.return_statement(),
            TokenKind::Break => self.loop_control(StatementKind::Break),
            TokenKind::Continue => self.loop_control(StatementKind::Continue),
            TokenKind::Breakall => self.breakall_statement(),
            TokenKind::Class => self.class_statement(),
            TokenKind::Indent => {
                let token = self.advance();
                Err(self.error_at("unexpected indentation!", token.location))
            }
            TokenKind::Else => {
                let token = self.advance();
                Err(self.error_at("unexpected 'else' without a matching 'if'!", token.location))
            }
            TokenKind::Error => {
                let token = self.advance();
                Err(self.error_at("invalid token!", token.location))
            }
            // everything else is an expression statement, possibly the
            // head of an assignment
            _ => self.expression_or_assignment_statement(),
        }
    }

    /// `Type name` variable declaration, or a standalone list declaration
    fn var_decl_statement(&mut self) -> ParseResult<Statement> {
        let statement = self.var_decl_parts()?;
        self.expect_statement_end()?;
        Ok(statement)
    }

    /// The declaration itself, shared with for-loop init clauses
    fn var_decl_parts(&mut self) -> ParseResult<Statement> {
        let type_token = self.advance();
        let type_ = match type_token.type_ref() {
            Some(type_) => Rc::clone(type_),
            None => unreachable!("internal compiler error, var decl without type token!"),
        };
        let name_token = self.expect(&TokenKind::Identifier(String::new()))?;
        let name = name_token
            .identifier()
            .unwrap_or_else(|| unreachable!("internal compiler error, identifier without name!"))
            .to_string();

        if type_.is_void() {
            return Err(self.error_at(
                "variables can't be of type 'void'!",
                type_token.location,
            ));
        }

        if type_.is_list() {
            if matches!(self.peek(0).kind, TokenKind::Equal) {
                let token = self.advance();
                return Err(self.error_at(
                    "list declarations can't have an initial value!",
                    token.location,
                ));
            }
            return Ok(Statement {
                location: type_token.location + name_token.location,
                kind: StatementKind::List(ListDecl {
                    list_type: type_,
                    name,
                    name_location: name_token.location,
                }),
            });
        }

        let mut location = type_token.location + name_token.location;
        let initial_value = if self.match_kind(&TokenKind::Equal).is_some() {
            let value = self.expression()?;
            location += value.location;
            Some(value)
        } else {
            None
        };

        Ok(Statement {
            location,
            kind: StatementKind::VarDecl(VarDecl {
                type_,
                type_location: type_token.location,
                name,
                name_location: name_token.location,
                initial_value,
            }),
        })
    }

    /// `Type name(params):` function declaration with indented body
    fn function_statement(&mut self) -> ParseResult<Statement> {
        let function = self.function_decl()?;
        let location = function.return_type_location + function.name_location;
        Ok(Statement {
            location,
            kind: StatementKind::Function(function),
        })
    }

    fn function_decl(&mut self) -> ParseResult<Function> {
        let type_token = self.advance();
        let return_type = match type_token.type_ref() {
            Some(type_) => Rc::clone(type_),
            None => unreachable!("internal compiler error, function without return type token!"),
        };
        let name_token = self.expect(&TokenKind::Identifier(String::new()))?;
        let name = name_token
            .identifier()
            .unwrap_or_else(|| unreachable!("internal compiler error, identifier without name!"))
            .to_string();

        let params = self.param_list()?;

        self.function_depth += 1;
        let statements = self.block();
        self.function_depth -= 1;

        Ok(Function {
            return_type,
            return_type_location: type_token.location,
            name,
            name_location: name_token.location,
            params,
            statements: statements?,
        })
    }

    /// `(Type name, Type name, ...)` with void parameters rejected
    fn param_list(&mut self) -> ParseResult<Vec<Param>> {
        self.expect(&TokenKind::ParenOpen)?;
        let mut params = Vec::new();
        if self.match_kind(&TokenKind::ParenClose).is_some() {
            return Ok(params);
        }
        loop {
            let type_token = self.peek(0).clone();
            let Some(type_) = type_token.type_ref() else {
                return Err(self.error_at(
                    format!("expected a parameter type but found '{}'!", type_token.kind),
                    type_token.location,
                ));
            };
            if type_.is_void() {
                return Err(self.error_at(
                    "function parameters can't be of type 'void'!",
                    type_token.location,
                ));
            }
            let type_ = Rc::clone(type_);
            self.advance();
            let name_token = self.expect(&TokenKind::Identifier(String::new()))?;
            let name = name_token
                .identifier()
                .unwrap_or_else(|| unreachable!("internal compiler error, identifier without name!"))
                .to_string();
            params.push(Param {
                type_,
                name,
                location: type_token.location + name_token.location,
            });
            if self.match_kind(&TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(&TokenKind::ParenClose)?;
        Ok(params)
    }

    /// `:` followed by an indented block; a bare newline after the colon
    /// is an empty block
    fn block(&mut self) -> ParseResult<Vec<Statement>> {
        self.expect(&TokenKind::Colon)?;
        if self.match_kind(&TokenKind::Newline).is_some() {
            return Ok(Vec::new());
        }
        self.expect(&TokenKind::Indent)?;

        let mut statements = Vec::new();
        while !matches!(self.peek(0).kind, TokenKind::Dedent | TokenKind::Eof) {
            if self.match_kind(&TokenKind::Newline).is_some() {
                continue;
            }
            match self.statement() {
                Ok(statement) => statements.push(statement),
                Err(error) => {
                    self.errors.push(error);
                    self.synchronize();
                }
            }
        }
        self.match_kind(&TokenKind::Dedent);
        Ok(statements)
    }

    fn if_statement(&mut self) -> ParseResult<Statement> {
        let if_token = self.advance();
        let condition = self.expression()?;
        let statements = self.block()?;

        let mut location = if_token.location + condition.location;
        let mut else_if_blocks = Vec::new();
        let mut else_statements = None;
        while matches!(self.peek(0).kind, TokenKind::Else) {
            if matches!(self.peek(1).kind, TokenKind::If) {
                self.advance();
                self.advance();
                let else_if_condition = self.expression()?;
                location += else_if_condition.location;
                let else_if_statements = self.block()?;
                else_if_blocks.push((else_if_condition, else_if_statements));
            } else {
                let else_token = self.advance();
                location += else_token.location;
                else_statements = Some(self.block()?);
                break;
            }
        }

        Ok(Statement {
            location,
            kind: StatementKind::If(IfStatement {
                condition,
                statements,
                else_if_blocks,
                else_statements,
            }),
        })
    }

    /// `for init? ; check? ; step? :` with every clause optional
    fn for_statement(&mut self) -> ParseResult<Statement> {
        let for_token = self.advance();

        let init = if matches!(self.peek(0).kind, TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.for_init_statement()?))
        };
        self.expect(&TokenKind::Semicolon)?;

        let check = if matches!(self.peek(0).kind, TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;

        let step = if matches!(self.peek(0).kind, TokenKind::Colon) {
            None
        } else {
            Some(self.expression()?)
        };

        self.finish_loop(for_token.location, init, check, step)
    }

    /// `while check:` desugars to a for loop with only the check populated
    fn while_statement(&mut self) -> ParseResult<Statement> {
        let while_token = self.advance();
        let check = self.expression()?;
        self.finish_loop(while_token.location, None, Some(check), None)
    }

    fn finish_loop(
        &mut self,
        mut location: SourceLocation,
        init: Option<Box<Statement>>,
        check: Option<Expression>,
        step: Option<Expression>,
    ) -> ParseResult<Statement> {
        self.loop_depth += 1;
        let statements = self.block();
        self.loop_depth -= 1;
        let statements = statements?;

        if let Some(init) = &init {
            location += init.location;
        }
        if let Some(check) = &check {
            location += check.location;
        }
        if let Some(step) = &step {
            location += step.location;
        }

        // breakall jumps land after the outermost loop
        let breakall_labels = if self.loop_depth == 0 {
            collect_breakall_labels(&statements)
        } else {
            Vec::new()
        };

        Ok(Statement {
            location,
            kind: StatementKind::ForLoop(ForLoop {
                init,
                check,
                step,
                statements,
                breakall_labels,
            }),
        })
    }

    /// The init clause of a for loop: a declaration, assignment or
    /// expression without a statement terminator
    fn for_init_statement(&mut self) -> ParseResult<Statement> {
        if matches!(self.peek(0).kind, TokenKind::Type(_)) {
            return self.var_decl_parts();
        }
        self.assignment_or_expression_parts()
    }

    fn print_statement(&mut self, newline: bool) -> ParseResult<Statement> {
        let print_token = self.advance();
        self.expect(&TokenKind::ParenOpen)?;
        let value = self.expression()?;
        let close = self.expect(&TokenKind::ParenClose)?;
        self.expect_statement_end()?;
        Ok(Statement {
            location: print_token.location + close.location,
            kind: StatementKind::Print { value, newline },
        })
    }

    fn return_statement(&mut self) -> ParseResult<Statement> {
        let return_token = self.advance();
        if self.function_depth == 0 {
            return Err(self.error_at(
                "return statement outside of a function!",
                return_token.location,
            ));
        }
        let mut location = return_token.location;
        let value = if matches!(
            self.peek(0).kind,
            TokenKind::Newline | TokenKind::Dedent | TokenKind::Eof
        ) {
            None
        } else {
            let value = self.expression()?;
            location += value.location;
            Some(value)
        };
        self.expect_statement_end()?;
        Ok(Statement {
            location,
            kind: StatementKind::Return { value },
        })
    }

    fn loop_control(&mut self, kind: StatementKind) -> ParseResult<Statement> {
        let token = self.advance();
        self.expect_statement_end()?;
        Ok(Statement {
            location: token.location,
            kind,
        })
    }

    fn breakall_statement(&mut self) -> ParseResult<Statement> {
        let breakall_token = self.advance();
        let label_token = self.expect(&TokenKind::Identifier(String::new()))?;
        let label = label_token
            .identifier()
            .unwrap_or_else(|| unreachable!("internal compiler error, identifier without name!"))
            .to_string();
        self.expect_statement_end()?;
        Ok(Statement {
            location: breakall_token.location + label_token.location,
            kind: StatementKind::Breakall { label },
        })
    }

    /// `class Name:` with fields, methods, and lifecycle declarations
    fn class_statement(&mut self) -> ParseResult<Statement> {
        let class_token = self.advance();
        let name_token = self.peek(0).clone();
        let Some(type_) = name_token.type_ref() else {
            return Err(self.error_at(
                format!("expected a class name but found '{}'!", name_token.kind),
                name_token.location,
            ));
        };
        if !type_.is_class() {
            return Err(self.error_at(
                format!("can't redefine built-in type '{}'!", type_.keyword),
                name_token.location,
            ));
        }
        let type_ = Rc::clone(type_);
        self.advance();

        self.expect(&TokenKind::Colon)?;
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        let mut constructor: Option<Lifecycle> = None;
        let mut destructor: Option<Lifecycle> = None;

        if self.match_kind(&TokenKind::Newline).is_none() {
            self.expect(&TokenKind::Indent)?;
            while !matches!(self.peek(0).kind, TokenKind::Dedent | TokenKind::Eof) {
                if self.match_kind(&TokenKind::Newline).is_some() {
                    continue;
                }
                if let Err(error) = self.class_member(
                    &type_,
                    &mut fields,
                    &mut methods,
                    &mut constructor,
                    &mut destructor,
                ) {
                    self.errors.push(error);
                    self.synchronize();
                }
            }
            self.match_kind(&TokenKind::Dedent);
        }

        Ok(Statement {
            location: class_token.location + name_token.location,
            kind: StatementKind::Class(ClassDecl {
                type_,
                fields,
                methods,
                constructor,
                destructor,
            }),
        })
    }

    fn class_member(
        &mut self,
        class_type: &Rc<Type>,
        fields: &mut Vec<Statement>,
        methods: &mut Vec<Function>,
        constructor: &mut Option<Lifecycle>,
        destructor: &mut Option<Lifecycle>,
    ) -> ParseResult<()> {
        match &self.peek(0).kind {
            // `~ClassName():` destructor
            TokenKind::Tilde => {
                let tilde = self.advance();
                let lifecycle = self.lifecycle(class_type, tilde.location)?;
                if !lifecycle.params.is_empty() {
                    return Err(self.error_at(
                        "destructors can't have parameters!",
                        lifecycle.location,
                    ));
                }
                if destructor.is_some() {
                    return Err(self.error_at(
                        format!("class '{}' already has a destructor!", class_type.keyword),
                        lifecycle.location,
                    ));
                }
                *destructor = Some(lifecycle);
                Ok(())
            }
            // `ClassName():` constructor
            TokenKind::Type(type_)
                if type_.keyword == class_type.keyword
                    && matches!(self.peek(1).kind, TokenKind::ParenOpen) =>
            {
                let name = self.advance();
                let lifecycle = self.lifecycle(class_type, name.location)?;
                if constructor.is_some() {
                    return Err(self.error_at(
                        format!("class '{}' already has a constructor!", class_type.keyword),
                        lifecycle.location,
                    ));
                }
                *constructor = Some(lifecycle);
                Ok(())
            }
            // `Type name(...)` method or `Type name` field
            TokenKind::Type(_) => {
                if self.peek(1).identifier().is_some()
                    && matches!(self.peek(2).kind, TokenKind::ParenOpen)
                {
                    methods.push(self.function_decl()?);
                    return Ok(());
                }
                let field = self.var_decl_parts()?;
                if let StatementKind::VarDecl(decl) = &field.kind
                    && decl.initial_value.is_some()
                {
                    return Err(self.error_at(
                        "class fields can't have an initial value!",
                        field.location,
                    ));
                }
                self.expect_statement_end()?;
                fields.push(field);
                Ok(())
            }
            other => {
                let location = self.peek(0).location;
                let message = format!("unexpected '{other}' inside a class!");
                self.advance();
                Err(self.error_at(message, location))
            }
        }
    }

    /// Parameter list and body of a constructor or destructor; the class
    /// name token has already been consumed
    fn lifecycle(
        &mut self,
        class_type: &Rc<Type>,
        location: SourceLocation,
    ) -> ParseResult<Lifecycle> {
        if matches!(self.peek(0).kind, TokenKind::Type(_)) {
            // the destructor form `~ClassName()`
            let name = self.advance();
            let Some(type_) = name.type_ref() else {
                unreachable!("internal compiler error, lifecycle without type token!");
            };
            if type_.keyword != class_type.keyword {
                return Err(self.error_at(
                    format!(
                        "expected lifecycle of class '{}' but found '{}'!",
                        class_type.keyword, type_.keyword
                    ),
                    name.location,
                ));
            }
        }
        let params = self.param_list()?;
        self.function_depth += 1;
        let statements = self.block();
        self.function_depth -= 1;
        Ok(Lifecycle {
            class_type: Rc::clone(class_type),
            params,
            statements: statements?,
            location,
        })
    }

    /// Expression statement, or an assignment when an `=` follows the
    /// parsed identifier chain
    fn expression_or_assignment_statement(&mut self) -> ParseResult<Statement> {
        let statement = self.assignment_or_expression_parts()?;
        self.expect_statement_end()?;
        Ok(statement)
    }

    fn assignment_or_expression_parts(&mut self) -> ParseResult<Statement> {
        let expression = self.expression()?;

        let compound = match self.peek(0).kind {
            TokenKind::Equal => None,
            TokenKind::PlusEqual => Some(TokenKind::Plus),
            TokenKind::MinusEqual => Some(TokenKind::Minus),
            TokenKind::StarEqual => Some(TokenKind::Star),
            TokenKind::SlashEqual => Some(TokenKind::Slash),
            _ => {
                return Ok(Statement {
                    location: expression.location,
                    kind: StatementKind::Expression { expression },
                });
            }
        };
        let operator_token = self.advance();

        if !is_assignable(&expression) {
            return Err(self.error_at("invalid assignment target!", expression.location));
        }

        let value = self.expression()?;
        let location = expression.location + value.location;
        // `x += y` is sugar for `x = (x + y)`
        let value = match compound {
            Some(kind) => Expression::new(
                location,
                ExpressionKind::Binary {
                    left: Box::new(expression.clone()),
                    operator: Token::new(kind, operator_token.location),
                    right: Box::new(value),
                },
            ),
            None => value,
        };

        Ok(Statement {
            location,
            kind: StatementKind::Assignment {
                target: expression,
                value,
            },
        })
    }

    // ------------------------------------------------------------------
    // expressions, lowest to highest precedence

    pub fn expression(&mut self) -> ParseResult<Expression> {
        self.boolean()
    }

    fn boolean(&mut self) -> ParseResult<Expression> {
        let mut left = self.additive()?;
        while matches!(
            self.peek(0).kind,
            TokenKind::EqualEqual
                | TokenKind::NotEqual
                | TokenKind::Less
                | TokenKind::LessEqual
                | TokenKind::Greater
                | TokenKind::GreaterEqual
        ) {
            let operator = self.advance();
            let right = self.additive()?;
            left = binary(left, operator, right);
        }
        Ok(left)
    }

    fn additive(&mut self) -> ParseResult<Expression> {
        let mut left = self.multiplicative()?;
        while matches!(self.peek(0).kind, TokenKind::Plus | TokenKind::Minus) {
            let operator = self.advance();
            let right = self.multiplicative()?;
            left = binary(left, operator, right);
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> ParseResult<Expression> {
        let mut left = self.primary()?;
        while matches!(self.peek(0).kind, TokenKind::Star | TokenKind::Slash) {
            let operator = self.advance();
            let right = self.primary()?;
            left = binary(left, operator, right);
        }
        Ok(left)
    }

    fn primary(&mut self) -> ParseResult<Expression> {
        match &self.peek(0).kind {
            TokenKind::False
            | TokenKind::Null
            | TokenKind::True
            | TokenKind::Number(_)
            | TokenKind::Character(_) => {
                let token = self.advance();
                Ok(Expression::new(
                    token.location,
                    ExpressionKind::TokenValue { token },
                ))
            }
            TokenKind::StringStart => self.string_expression(),
            TokenKind::ParenOpen => {
                let open = self.advance();
                // `(Type)` is a cast of the primary that follows
                if matches!(self.peek(0).kind, TokenKind::Type(_))
                    && matches!(self.peek(1).kind, TokenKind::ParenClose)
                {
                    let type_token = self.advance();
                    let target = match type_token.type_ref() {
                        Some(type_) => Rc::clone(type_),
                        None => unreachable!("internal compiler error, cast without type token!"),
                    };
                    self.expect(&TokenKind::ParenClose)?;
                    let operand = self.primary()?;
                    let location = open.location + operand.location;
                    return Ok(Expression::new(
                        location,
                        ExpressionKind::TypeCast {
                            target,
                            operand: Box::new(operand),
                        },
                    ));
                }
                let expression = self.expression()?;
                let close = self.expect(&TokenKind::ParenClose)?;
                Ok(Expression::new(
                    open.location + close.location,
                    ExpressionKind::Unary {
                        kind: UnaryKind::Grouping,
                        operand: Box::new(expression),
                    },
                ))
            }
            TokenKind::Not => self.unary(UnaryKind::Not),
            TokenKind::Minus => self.unary(UnaryKind::Minus),
            TokenKind::PlusPlus => self.prefix_step(UnaryKind::PreIncrement),
            TokenKind::MinusMinus => self.prefix_step(UnaryKind::PreDecrement),
            TokenKind::Identifier(_) => self.identifier_expression(),
            TokenKind::This => {
                let this_token = self.advance();
                self.expect(&TokenKind::Dot)?;
                let inner = self.identifier_chain()?;
                let location = this_token.location + inner.location;
                Ok(Expression::new(
                    location,
                    ExpressionKind::This {
                        inner: Box::new(inner),
                    },
                ))
            }
            TokenKind::Error => {
                let token = self.advance();
                Err(self.error_at("invalid token!", token.location))
            }
            _ => {
                let found = self.peek(0);
                Err(self.error_at("expected an expression!", found.location))
            }
        }
    }

    fn unary(&mut self, kind: UnaryKind) -> ParseResult<Expression> {
        let operator = self.advance();
        let operand = self.primary()?;
        let location = operator.location + operand.location;
        Ok(Expression::new(
            location,
            ExpressionKind::Unary {
                kind,
                operand: Box::new(operand),
            },
        ))
    }

    /// `++x` / `--x` apply to an identifier only
    fn prefix_step(&mut self, kind: UnaryKind) -> ParseResult<Expression> {
        let operator = self.advance();
        let name_token = self.expect(&TokenKind::Identifier(String::new()))?;
        let operand = identifier_value(&name_token);
        let location = operator.location + name_token.location;
        Ok(Expression::new(
            location,
            ExpressionKind::Unary {
                kind,
                operand: Box::new(operand),
            },
        ))
    }

    /// A bare identifier, a call, a member-access chain, or a postfix
    /// increment/decrement
    fn identifier_expression(&mut self) -> ParseResult<Expression> {
        match self.peek(1).kind {
            TokenKind::ParenOpen | TokenKind::Dot => self.identifier_chain(),
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let name_token = self.advance();
                let operator = self.advance();
                let kind = match operator.kind {
                    TokenKind::PlusPlus => UnaryKind::PostIncrement,
                    _ => UnaryKind::PostDecrement,
                };
                let operand = identifier_value(&name_token);
                Ok(Expression::new(
                    name_token.location + operator.location,
                    ExpressionKind::Unary {
                        kind,
                        operand: Box::new(operand),
                    },
                ))
            }
            _ => {
                let token = self.advance();
                Ok(Expression::new(
                    token.location,
                    ExpressionKind::TokenValue { token },
                ))
            }
        }
    }

    /// `name`, `name(args)`, or `name.<chain>`
    fn identifier_chain(&mut self) -> ParseResult<Expression> {
        let name_token = self.expect(&TokenKind::Identifier(String::new()))?;
        let name = name_token
            .identifier()
            .unwrap_or_else(|| unreachable!("internal compiler error, identifier without name!"))
            .to_string();

        if matches!(self.peek(0).kind, TokenKind::ParenOpen) {
            self.advance();
            let mut arguments = Vec::new();
            if self.match_kind(&TokenKind::ParenClose).is_none() {
                loop {
                    arguments.push(self.expression()?);
                    if self.match_kind(&TokenKind::Comma).is_none() {
                        break;
                    }
                }
                self.expect(&TokenKind::ParenClose)?;
            }
            return Ok(Expression::new(
                name_token.location,
                ExpressionKind::Call {
                    name,
                    class_of: None,
                    arguments,
                },
            ));
        }

        if self.match_kind(&TokenKind::Dot).is_some() {
            let inner = self.identifier_chain()?;
            let location = name_token.location + inner.location;
            return Ok(Expression::new(
                location,
                ExpressionKind::Identifier {
                    name,
                    inner: Some(Box::new(inner)),
                },
            ));
        }

        Ok(Expression::new(
            name_token.location,
            ExpressionKind::Identifier { name, inner: None },
        ))
    }

    /// The parts between STRING_START and STRING_END: literal runs and
    /// bracketed expressions
    fn string_expression(&mut self) -> ParseResult<Expression> {
        let start = self.advance();
        let mut location = start.location;
        let mut parts = Vec::new();
        loop {
            match &self.peek(0).kind {
                TokenKind::StringChars(text) => {
                    let text = text.clone();
                    let token = self.advance();
                    location += token.location;
                    parts.push(StringPart::Chars(text));
                }
                TokenKind::StringExprStart => {
                    self.advance();
                    let expression = self.expression()?;
                    let end = self.expect(&TokenKind::StringExprEnd)?;
                    location += end.location;
                    parts.push(StringPart::Expr(expression));
                }
                TokenKind::StringEnd => {
                    let end = self.advance();
                    location += end.location;
                    break;
                }
                other => {
                    let message = format!("expected 'string end' but found '{other}'!");
                    let at = self.peek(0).location;
                    return Err(self.error_at(message, at));
                }
            }
        }
        Ok(Expression::new(location, ExpressionKind::Str { parts }))
    }
}

/// Display form of an expected token kind, ignoring any payload
fn expected_name(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Identifier(_) => "identifier".to_string(),
        TokenKind::Type(_) => "type".to_string(),
        TokenKind::Number(_) => "number".to_string(),
        other => other.to_string(),
    }
}

fn binary(left: Expression, operator: Token, right: Expression) -> Expression {
    let location = left.location + right.location;
    Expression::new(
        location,
        ExpressionKind::Binary {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        },
    )
}

fn identifier_value(token: &Token) -> Expression {
    Expression::new(
        token.location,
        ExpressionKind::TokenValue {
            token: token.clone(),
        },
    )
}

/// Whether an expression may stand on the left of an assignment
fn is_assignable(expression: &Expression) -> bool {
    match &expression.kind {
        ExpressionKind::Identifier { inner, .. } => match inner {
            Some(inner) => is_assignable(inner),
            None => true,
        },
        ExpressionKind::TokenValue { token } => token.identifier().is_some(),
        ExpressionKind::This { inner } => is_assignable(inner),
        _ => false,
    }
}

/// Collect every breakall label in a statement tree, in source order
fn collect_breakall_labels(statements: &[Statement]) -> Vec<String> {
    fn walk(statements: &[Statement], labels: &mut Vec<String>) {
        for statement in statements {
            match &statement.kind {
                StatementKind::Breakall { label } => {
                    if !labels.contains(label) {
                        labels.push(label.clone());
                    }
                }
                StatementKind::If(if_statement) => {
                    walk(&if_statement.statements, labels);
                    for (_, block) in &if_statement.else_if_blocks {
                        walk(block, labels);
                    }
                    if let Some(block) = &if_statement.else_statements {
                        walk(block, labels);
                    }
                }
                StatementKind::ForLoop(for_loop) => walk(&for_loop.statements, labels),
                _ => {}
            }
        }
    }
    let mut labels = Vec::new();
    walk(statements, &mut labels);
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Tokenizer;
    use crate::type_applier::TypeApplier;
    use crate::type_resolver::TypeResolver;

    fn parse(source: &str) -> Result<Ast, Vec<CompileError>> {
        let filename = Path::new("test.tapl");
        let result = Tokenizer::new(source, filename).tokenize();
        assert!(result.errors.is_empty(), "lex errors: {:?}", result.errors);
        let mut tokens = result.tokens;
        let mut types = TypeResolver::resolve(&tokens);
        TypeApplier::new(filename, source, &mut types)
            .apply(&mut tokens)
            .expect("type application failed");
        Parser::new(tokens, types, filename, source).parse()
    }

    fn parse_ok(source: &str) -> Ast {
        match parse(source) {
            Ok(ast) => ast,
            Err(errors) => panic!("parse errors: {errors:#?}"),
        }
    }

    #[test]
    fn test_arithmetic_precedence() {
        let ast = parse_ok("1100 + 150 * 2 + 37 - 100\n");
        assert_eq!(ast.statements.len(), 1);
        assert_eq!(
            ast.statements[0].to_c(),
            "(((1100 + (150 * 2)) + 37) - 100);"
        );
    }

    #[test]
    fn test_typed_var_decl() {
        let ast = parse_ok("u16 var = 10\n");
        let StatementKind::VarDecl(decl) = &ast.statements[0].kind else {
            panic!("expected a var decl");
        };
        assert_eq!(decl.type_.keyword, "u16");
        assert_eq!(decl.name, "var");
        assert!(decl.initial_value.is_some());
    }

    #[test]
    fn test_var_decl_without_initial_value() {
        let ast = parse_ok("u16 var\n");
        let StatementKind::VarDecl(decl) = &ast.statements[0].kind else {
            panic!("expected a var decl");
        };
        assert!(decl.initial_value.is_none());
    }

    #[test]
    fn test_list_declaration() {
        let ast = parse_ok("list[u32] xs\n");
        let StatementKind::List(decl) = &ast.statements[0].kind else {
            panic!("expected a list decl");
        };
        assert_eq!(decl.list_type.keyword, "list[u32]");
        assert_eq!(decl.name, "xs");
    }

    #[test]
    fn test_assignment() {
        let ast = parse_ok("u8 x\nx = 5\n");
        let StatementKind::Assignment { target, value } = &ast.statements[1].kind else {
            panic!("expected an assignment");
        };
        assert_eq!(target.to_c(), "x");
        assert_eq!(value.to_c(), "5");
    }

    #[test]
    fn test_compound_assignment_desugars() {
        let ast = parse_ok("u8 x\nx += 5\n");
        let StatementKind::Assignment { value, .. } = &ast.statements[1].kind else {
            panic!("expected an assignment");
        };
        assert_eq!(value.to_c(), "(x + 5)");
    }

    #[test]
    fn test_member_chain_assignment_target() {
        let ast = parse_ok("p.x = 5\n");
        let StatementKind::Assignment { target, .. } = &ast.statements[0].kind else {
            panic!("expected an assignment");
        };
        assert_eq!(target.to_c(), "p.x");
    }

    #[test]
    fn test_literal_is_not_assignable() {
        let errors = parse("5 = 6\n").unwrap_err();
        assert!(errors[0].message.contains("invalid assignment target"));
    }

    #[test]
    fn test_if_without_else() {
        let ast = parse_ok("if x == 1:\n    y = 2\n");
        let StatementKind::If(if_statement) = &ast.statements[0].kind else {
            panic!("expected an if statement");
        };
        assert_eq!(if_statement.statements.len(), 1);
        assert!(if_statement.else_if_blocks.is_empty());
        assert!(if_statement.else_statements.is_none());
    }

    #[test]
    fn test_if_with_else_only() {
        let ast = parse_ok("if x:\n    a = 1\nelse:\n    a = 2\n");
        let StatementKind::If(if_statement) = &ast.statements[0].kind else {
            panic!("expected an if statement");
        };
        assert!(if_statement.else_if_blocks.is_empty());
        assert_eq!(if_statement.else_statements.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_if_with_else_if_and_else() {
        let ast = parse_ok("if x:\n    a = 1\nelse if y:\n    a = 2\nelse:\n    a = 3\n");
        let StatementKind::If(if_statement) = &ast.statements[0].kind else {
            panic!("expected an if statement");
        };
        assert_eq!(if_statement.else_if_blocks.len(), 1);
        assert!(if_statement.else_statements.is_some());
    }

    #[test]
    fn test_if_with_multiple_else_ifs_and_no_else() {
        let ast = parse_ok("if x:\n    a = 1\nelse if y:\n    a = 2\nelse if z:\n    a = 3\n");
        let StatementKind::If(if_statement) = &ast.statements[0].kind else {
            panic!("expected an if statement");
        };
        assert_eq!(if_statement.else_if_blocks.len(), 2);
        assert!(if_statement.else_statements.is_none());
    }

    #[test]
    fn test_for_loop_with_all_clauses() {
        let ast = parse_ok("for u8 i = 0; i < 10; ++i:\n    print(i)\n");
        let StatementKind::ForLoop(for_loop) = &ast.statements[0].kind else {
            panic!("expected a for loop");
        };
        assert!(for_loop.init.is_some());
        assert!(for_loop.check.is_some());
        assert!(for_loop.step.is_some());
        assert_eq!(for_loop.statements.len(), 1);
    }

    #[test]
    fn test_for_loop_with_empty_clauses() {
        let ast = parse_ok("for ; ; :\n    break\n");
        let StatementKind::ForLoop(for_loop) = &ast.statements[0].kind else {
            panic!("expected a for loop");
        };
        assert!(for_loop.init.is_none());
        assert!(for_loop.check.is_none());
        assert!(for_loop.step.is_none());
    }

    #[test]
    fn test_while_desugars_to_for() {
        let ast = parse_ok("while x < 10:\n    x += 1\n");
        let StatementKind::ForLoop(for_loop) = &ast.statements[0].kind else {
            panic!("expected a for loop");
        };
        assert!(for_loop.init.is_none());
        assert!(for_loop.check.is_some());
        assert!(for_loop.step.is_none());
    }

    #[test]
    fn test_function_declaration() {
        let ast = parse_ok("u16 double_it(u16 value):\n    return value * 2\n");
        let StatementKind::Function(function) = &ast.statements[0].kind else {
            panic!("expected a function");
        };
        assert_eq!(function.name, "double_it");
        assert_eq!(function.return_type.keyword, "u16");
        assert_eq!(function.params.len(), 1);
        assert_eq!(function.params[0].name, "value");
        assert_eq!(function.statements.len(), 1);
    }

    #[test]
    fn test_empty_function_body() {
        let ast = parse_ok("void nothing():\nu8 x = 1\n");
        let StatementKind::Function(function) = &ast.statements[0].kind else {
            panic!("expected a function");
        };
        assert!(function.statements.is_empty());
        assert_eq!(ast.statements.len(), 2);
    }

    #[test]
    fn test_void_parameter_is_rejected() {
        let errors = parse("u8 bad(void x):\n    return 1\n").unwrap_err();
        assert!(errors[0].message.contains("can't be of type 'void'"));
    }

    #[test]
    fn test_return_outside_function_is_rejected() {
        let errors = parse("return 5\n").unwrap_err();
        assert!(errors[0].message.contains("outside of a function"));
    }

    #[test]
    fn test_return_without_value() {
        let ast = parse_ok("void f():\n    return\n");
        let StatementKind::Function(function) = &ast.statements[0].kind else {
            panic!("expected a function");
        };
        let StatementKind::Return { value } = &function.statements[0].kind else {
            panic!("expected a return");
        };
        assert!(value.is_none());
    }

    #[test]
    fn test_class_with_members() {
        let source = "class Point:\n    u8 x\n    u8 y\n    Point():\n        this.x = 0\n    ~Point():\n        this.x = 0\n    u8 get_x():\n        return this.x\n";
        let ast = parse_ok(source);
        let StatementKind::Class(class) = &ast.statements[0].kind else {
            panic!("expected a class");
        };
        assert_eq!(class.type_.keyword, "Point");
        assert_eq!(class.fields.len(), 2);
        assert_eq!(class.methods.len(), 1);
        assert!(class.constructor.is_some());
        assert!(class.destructor.is_some());
    }

    #[test]
    fn test_duplicate_constructor_is_rejected() {
        let source = "class Point:\n    Point():\n        u8 x = 1\n    Point():\n        u8 x = 2\n";
        let errors = parse(source).unwrap_err();
        assert!(errors[0].message.contains("already has a constructor"));
    }

    #[test]
    fn test_print_and_println() {
        let ast = parse_ok("print(1)\nprintln(2)\n");
        let StatementKind::Print { newline, .. } = &ast.statements[0].kind else {
            panic!("expected print");
        };
        assert!(!newline);
        let StatementKind::Print { newline, .. } = &ast.statements[1].kind else {
            panic!("expected println");
        };
        assert!(newline);
    }

    #[test]
    fn test_interpolated_string_expression() {
        let ast = parse_ok("print(\"x = {1 + 2}\")\n");
        let StatementKind::Print { value, .. } = &ast.statements[0].kind else {
            panic!("expected print");
        };
        let ExpressionKind::Str { parts } = &value.kind else {
            panic!("expected a string expression");
        };
        assert_eq!(parts.len(), 2);
        assert!(matches!(&parts[0], StringPart::Chars(text) if text == "x = "));
        assert!(matches!(&parts[1], StringPart::Expr(_)));
    }

    #[test]
    fn test_type_cast() {
        let ast = parse_ok("u8 x = (u8)300\n");
        let StatementKind::VarDecl(decl) = &ast.statements[0].kind else {
            panic!("expected a var decl");
        };
        let ExpressionKind::TypeCast { target, .. } = &decl.initial_value.as_ref().unwrap().kind
        else {
            panic!("expected a cast");
        };
        assert_eq!(target.keyword, "u8");
    }

    #[test]
    fn test_grouping_versus_cast() {
        let ast = parse_ok("u8 x = (1 + 2)\n");
        let StatementKind::VarDecl(decl) = &ast.statements[0].kind else {
            panic!("expected a var decl");
        };
        assert!(matches!(
            &decl.initial_value.as_ref().unwrap().kind,
            ExpressionKind::Unary {
                kind: UnaryKind::Grouping,
                ..
            }
        ));
    }

    #[test]
    fn test_call_with_arguments() {
        let ast = parse_ok("foo(1, 2, 3)\n");
        let StatementKind::Expression { expression } = &ast.statements[0].kind else {
            panic!("expected an expression statement");
        };
        let ExpressionKind::Call { name, arguments, .. } = &expression.kind else {
            panic!("expected a call");
        };
        assert_eq!(name, "foo");
        assert_eq!(arguments.len(), 3);
    }

    #[test]
    fn test_method_call_chain() {
        let ast = parse_ok("xs.add(5)\n");
        let StatementKind::Expression { expression } = &ast.statements[0].kind else {
            panic!("expected an expression statement");
        };
        let ExpressionKind::Identifier { name, inner } = &expression.kind else {
            panic!("expected an identifier chain");
        };
        assert_eq!(name, "xs");
        assert!(matches!(
            &inner.as_ref().unwrap().kind,
            ExpressionKind::Call { name, .. } if name == "add"
        ));
    }

    #[test]
    fn test_this_chain() {
        let ast = parse_ok("class Point:\n    u8 x\n    u8 get_x():\n        return this.x\n");
        let StatementKind::Class(class) = &ast.statements[0].kind else {
            panic!("expected a class");
        };
        let StatementKind::Return { value } = &class.methods[0].statements[0].kind else {
            panic!("expected a return");
        };
        assert!(matches!(
            &value.as_ref().unwrap().kind,
            ExpressionKind::This { .. }
        ));
    }

    #[test]
    fn test_pre_and_post_increment() {
        let ast = parse_ok("++x\nx--\n");
        let StatementKind::Expression { expression } = &ast.statements[0].kind else {
            panic!("expected an expression statement");
        };
        assert!(matches!(
            &expression.kind,
            ExpressionKind::Unary {
                kind: UnaryKind::PreIncrement,
                ..
            }
        ));
        let StatementKind::Expression { expression } = &ast.statements[1].kind else {
            panic!("expected an expression statement");
        };
        assert!(matches!(
            &expression.kind,
            ExpressionKind::Unary {
                kind: UnaryKind::PostDecrement,
                ..
            }
        ));
    }

    #[test]
    fn test_breakall_binds_to_outermost_loop() {
        let source = "while 1:\n    while 1:\n        breakall all_done\n";
        let ast = parse_ok(source);
        let StatementKind::ForLoop(outer) = &ast.statements[0].kind else {
            panic!("expected a for loop");
        };
        assert_eq!(outer.breakall_labels, vec!["all_done".to_string()]);
        let StatementKind::ForLoop(inner) = &outer.statements[0].kind else {
            panic!("expected a nested for loop");
        };
        assert!(inner.breakall_labels.is_empty());
    }

    #[test]
    fn test_error_recovery_collects_multiple_errors() {
        let errors = parse("u8 = 5\nreturn 1\n").unwrap_err();
        assert!(errors.len() >= 2);
    }

    #[test]
    fn test_missing_colon_is_reported() {
        let errors = parse("if x\n    y = 1\n").unwrap_err();
        assert!(errors[0].message.contains("expected ':'"));
    }

    #[test]
    fn test_missing_close_paren_is_reported() {
        let errors = parse("print(1\n").unwrap_err();
        assert!(errors[0].message.contains("expected ')'"));
    }
}

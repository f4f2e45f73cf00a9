//! Abstract syntax tree
//!
//! Statements and expressions as tagged unions, each carrying the byte
//! span it was parsed from. Expressions additionally carry a type slot
//! that starts empty and is filled in exactly once by the typing pass;
//! the code generator relies on it for printf format selection.
//!
//! Every node knows how to emit its own C form through `to_c`; the
//! composition into whole files (headers, `main.c`) lives in the code
//! generator, and all pretty-printing is delegated to the external C
//! formatter.

use crate::source_location::SourceLocation;
use crate::tokens::Token;
use crate::tokens::TokenKind;
use crate::types::Type;
use crate::types::Types;
use std::path::PathBuf;
use std::rc::Rc;

/// A parsed source file: the registry of its types plus the top-level
/// statements in source order
#[derive(Debug)]
pub struct Ast {
    pub filename: PathBuf,
    pub types: Types,
    pub statements: Vec<Statement>,
}

/// A statement and the span it covers
#[derive(Debug, Clone)]
pub struct Statement {
    pub location: SourceLocation,
    pub kind: StatementKind,
}

#[derive(Debug, Clone)]
pub enum StatementKind {
    VarDecl(VarDecl),
    Assignment { target: Expression, value: Expression },
    Expression { expression: Expression },
    If(IfStatement),
    ForLoop(ForLoop),
    Function(Function),
    Class(ClassDecl),
    Return { value: Option<Expression> },
    Print { value: Expression, newline: bool },
    Break,
    Continue,
    Breakall { label: String },
    List(ListDecl),
}

/// `Type name` optionally followed by `= expression`
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub type_: Rc<Type>,
    pub type_location: SourceLocation,
    pub name: String,
    pub name_location: SourceLocation,
    pub initial_value: Option<Expression>,
}

/// `if expr:` block with any number of else-if blocks and an optional
/// else block
#[derive(Debug, Clone)]
pub struct IfStatement {
    pub condition: Expression,
    pub statements: Vec<Statement>,
    pub else_if_blocks: Vec<(Expression, Vec<Statement>)>,
    pub else_statements: Option<Vec<Statement>>,
}

/// `for init; check; step:` block; `while check:` desugars to a for
/// loop with only the check populated
#[derive(Debug, Clone)]
pub struct ForLoop {
    pub init: Option<Box<Statement>>,
    pub check: Option<Expression>,
    pub step: Option<Expression>,
    pub statements: Vec<Statement>,
    /// Labels of `breakall` statements that jump past this loop; only
    /// ever populated on an outermost loop
    pub breakall_labels: Vec<String>,
}

/// One `Type name` function parameter
#[derive(Debug, Clone)]
pub struct Param {
    pub type_: Rc<Type>,
    pub name: String,
    pub location: SourceLocation,
}

/// A function declaration, free or as a class method
#[derive(Debug, Clone)]
pub struct Function {
    pub return_type: Rc<Type>,
    pub return_type_location: SourceLocation,
    pub name: String,
    pub name_location: SourceLocation,
    pub params: Vec<Param>,
    pub statements: Vec<Statement>,
}

/// A constructor or destructor block inside a class
#[derive(Debug, Clone)]
pub struct Lifecycle {
    pub class_type: Rc<Type>,
    pub params: Vec<Param>,
    pub statements: Vec<Statement>,
    pub location: SourceLocation,
}

/// `class Name:` with fields, methods and optional lifecycle blocks
#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub type_: Rc<Type>,
    /// Field declarations; every entry is a `StatementKind::VarDecl`
    pub fields: Vec<Statement>,
    pub methods: Vec<Function>,
    pub constructor: Option<Lifecycle>,
    pub destructor: Option<Lifecycle>,
}

/// Standalone `list[T] name` declaration
#[derive(Debug, Clone)]
pub struct ListDecl {
    pub list_type: Rc<Type>,
    pub name: String,
    pub name_location: SourceLocation,
}

/// An expression, its span, and the type slot the typing pass fills
#[derive(Debug, Clone)]
pub struct Expression {
    pub location: SourceLocation,
    /// None until the typing pass has run
    pub type_: Option<Rc<Type>>,
    pub kind: ExpressionKind,
}

impl Expression {
    pub fn new(location: SourceLocation, kind: ExpressionKind) -> Self {
        Expression {
            location,
            type_: None,
            kind,
        }
    }

    /// The checked type; only valid after the typing pass
    pub fn checked_type(&self) -> &Rc<Type> {
        match &self.type_ {
            Some(type_) => type_,
            None => unreachable!("internal compiler error, expression was not typed!"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryKind {
    Grouping,
    Not,
    Minus,
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,
}

#[derive(Debug, Clone)]
pub enum ExpressionKind {
    Binary {
        left: Box<Expression>,
        operator: Token,
        right: Box<Expression>,
    },
    Unary {
        kind: UnaryKind,
        operand: Box<Expression>,
    },
    /// A literal or bare identifier carried directly by its token
    TokenValue { token: Token },
    /// A member-access chain segment: `name` or `name.inner`
    Identifier {
        name: String,
        inner: Option<Box<Expression>>,
    },
    /// A call; `class_of` is filled by the typing pass when the callee
    /// resolves to a class method or a built-in list method
    Call {
        name: String,
        class_of: Option<Rc<Type>>,
        arguments: Vec<Expression>,
    },
    TypeCast {
        target: Rc<Type>,
        operand: Box<Expression>,
    },
    /// Interpolated string: literal runs mixed with embedded expressions
    Str { parts: Vec<StringPart> },
    /// `this.field` or `this.method(...)`
    This { inner: Box<Expression> },
}

#[derive(Debug, Clone)]
pub enum StringPart {
    Chars(String),
    Expr(Expression),
}

/// Escape raw string characters for inclusion in a C string literal
pub fn escape_c_string(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for char in text.chars() {
        match char {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Escape a character literal for C
fn escape_c_char(char: char) -> String {
    match char {
        '\'' => "\\'".to_string(),
        '\\' => "\\\\".to_string(),
        '\n' => "\\n".to_string(),
        '\r' => "\\r".to_string(),
        '\t' => "\\t".to_string(),
        '\0' => "\\0".to_string(),
        other => other.to_string(),
    }
}

impl Expression {
    /// The C form of this expression
    pub fn to_c(&self) -> String {
        match &self.kind {
            ExpressionKind::Binary {
                left,
                operator,
                right,
            } => {
                let spelling = operator.kind.spelling().unwrap_or_else(|| {
                    unreachable!("internal compiler error, binary operator without spelling!")
                });
                format!("({} {} {})", left.to_c(), spelling, right.to_c())
            }
            ExpressionKind::Unary { kind, operand } => match kind {
                UnaryKind::Grouping => format!("({})", operand.to_c()),
                UnaryKind::Not => format!("(!({}))", operand.to_c()),
                UnaryKind::Minus => format!("(-{})", operand.to_c()),
                UnaryKind::PreIncrement => format!("(++{})", operand.to_c()),
                UnaryKind::PreDecrement => format!("(--{})", operand.to_c()),
                UnaryKind::PostIncrement => format!("({}++)", operand.to_c()),
                UnaryKind::PostDecrement => format!("({}--)", operand.to_c()),
            },
            ExpressionKind::TokenValue { token } => match &token.kind {
                TokenKind::Number(value) => value.to_string(),
                TokenKind::Character(value) => format!("'{}'", escape_c_char(*value)),
                TokenKind::Identifier(name) => name.clone(),
                TokenKind::True => "true".to_string(),
                TokenKind::False => "false".to_string(),
                // becomes NULL once a pointer type exists
                TokenKind::Null => "0".to_string(),
                other => unreachable!("internal compiler error, {other} is not a value token!"),
            },
            ExpressionKind::Identifier { .. } => self.chain_to_c(""),
            ExpressionKind::Call {
                name, arguments, ..
            } => {
                let arguments: Vec<String> = arguments.iter().map(Expression::to_c).collect();
                format!("{name}({})", arguments.join(", "))
            }
            ExpressionKind::TypeCast { target, operand } => {
                format!("(({}){})", target.keyword, operand.to_c())
            }
            ExpressionKind::Str { parts } => {
                let (format, _) = string_format_parts(parts);
                format!("\"{format}\"")
            }
            ExpressionKind::This { inner } => Self::this_to_c(inner),
        }
    }

    /// Emit a member-access chain; `prefix` is the C access path of the
    /// object the chain hangs off, empty at the head of the chain
    fn chain_to_c(&self, prefix: &str) -> String {
        match &self.kind {
            ExpressionKind::Identifier { name, inner } => {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}.{name}")
                };
                match inner {
                    Some(inner) => inner.chain_to_c(&path),
                    None => path,
                }
            }
            ExpressionKind::Call {
                name,
                class_of,
                arguments,
            } => {
                let arguments: Vec<String> = arguments.iter().map(Expression::to_c).collect();
                match class_of {
                    // a resolved method turns into a free function taking
                    // a pointer to the object as its first argument
                    Some(class) => {
                        let mut all_arguments = vec![format!("&{prefix}")];
                        all_arguments.extend(arguments);
                        format!("{}_{}({})", class.c_name(), name, all_arguments.join(", "))
                    }
                    None => format!("{name}({})", arguments.join(", ")),
                }
            }
            _ => unreachable!("internal compiler error, invalid member chain node!"),
        }
    }

    /// Emit `this.xxx`; inside a method `this` is already a pointer
    fn this_to_c(inner: &Expression) -> String {
        match &inner.kind {
            ExpressionKind::Identifier { name, inner: rest } => {
                let path = format!("this->{name}");
                match rest {
                    Some(rest) => rest.chain_to_c(&path),
                    None => path,
                }
            }
            ExpressionKind::Call {
                name,
                class_of,
                arguments,
            } => {
                let class = match class_of {
                    Some(class) => class,
                    None => unreachable!("internal compiler error, method call without class!"),
                };
                let mut all_arguments = vec!["this".to_string()];
                all_arguments.extend(arguments.iter().map(Expression::to_c));
                format!("{}_{}({})", class.c_name(), name, all_arguments.join(", "))
            }
            _ => unreachable!("internal compiler error, invalid this chain node!"),
        }
    }
}

/// Build the printf format string and argument list for an interpolated
/// string; expression parts must already be typed
pub fn string_format_parts(parts: &[StringPart]) -> (String, Vec<String>) {
    let mut format = String::new();
    let mut arguments = Vec::new();
    for part in parts {
        match part {
            StringPart::Chars(text) => format.push_str(&escape_c_string(text).replace('%', "%%")),
            StringPart::Expr(expression) => {
                let specifier = expression
                    .checked_type()
                    .format_specifier()
                    .unwrap_or_else(|| {
                        unreachable!("internal compiler error, unprintable interpolated expression!")
                    });
                format.push_str(&specifier);
                arguments.push(expression.to_c());
            }
        }
    }
    (format, arguments)
}

impl Statement {
    /// The C form of this statement; block statements include their
    /// braces, simple statements their terminating semicolon
    pub fn to_c(&self) -> String {
        match &self.kind {
            StatementKind::VarDecl(decl) => decl.to_c(),
            StatementKind::Assignment { target, value } => {
                format!("{} = {};", target.to_c(), value.to_c())
            }
            StatementKind::Expression { expression } => format!("{};", expression.to_c()),
            StatementKind::If(if_statement) => if_statement.to_c(),
            StatementKind::ForLoop(for_loop) => for_loop.to_c(),
            StatementKind::Function(function) => function.c_code(),
            StatementKind::Class(_) => {
                unreachable!("internal compiler error, class emission is file-level!")
            }
            StatementKind::Return { value } => match value {
                Some(value) => format!("return {};", value.to_c()),
                None => "return;".to_string(),
            },
            StatementKind::Print { value, newline } => print_to_c(value, *newline),
            StatementKind::Break => "break;".to_string(),
            StatementKind::Continue => "continue;".to_string(),
            StatementKind::Breakall { label } => format!("goto {label};"),
            StatementKind::List(list) => list.to_c(),
        }
    }
}

impl VarDecl {
    pub fn to_c(&self) -> String {
        let keyword = self.type_.c_name();
        if let Some(initial_value) = &self.initial_value {
            return format!("{keyword} {} = {};", self.name, initial_value.to_c());
        }
        if self.type_.is_class() {
            // class instances are set up by their constructor
            return format!("{keyword} {};\n{}_constructor(&{});", self.name, keyword, self.name);
        }
        format!("{keyword} {};", self.name)
    }
}

impl ListDecl {
    pub fn to_c(&self) -> String {
        // a null backing pointer is the empty list
        format!(
            "{} {};\n{}.list = 0;",
            self.list_type.c_name(),
            self.name,
            self.name
        )
    }
}

impl IfStatement {
    fn block_to_c(condition: &Expression, statements: &[Statement]) -> String {
        let mut code = format!("if ({}) {{\n", condition.to_c());
        for statement in statements {
            code.push_str(&statement.to_c());
            code.push('\n');
        }
        code.push('}');
        code
    }

    pub fn to_c(&self) -> String {
        let mut code = Self::block_to_c(&self.condition, &self.statements);
        for (condition, statements) in &self.else_if_blocks {
            code.push_str(" else ");
            code.push_str(&Self::block_to_c(condition, statements));
        }
        if let Some(statements) = &self.else_statements {
            code.push_str(" else {\n");
            for statement in statements {
                code.push_str(&statement.to_c());
                code.push('\n');
            }
            code.push('}');
        }
        code
    }
}

impl ForLoop {
    pub fn to_c(&self) -> String {
        let init = match &self.init {
            Some(init) => init.to_c(),
            None => String::new(),
        };
        // the init statement already carries its semicolon
        let init = init.strip_suffix(';').unwrap_or(&init);
        let check = self.check.as_ref().map(Expression::to_c).unwrap_or_default();
        let step = self.step.as_ref().map(Expression::to_c).unwrap_or_default();

        let mut code = format!("for ({init}; {check}; {step}) {{\n");
        for statement in &self.statements {
            code.push_str(&statement.to_c());
            code.push('\n');
        }
        code.push('}');

        // land every breakall that targets this loop just past it
        for label in &self.breakall_labels {
            code.push_str(&format!("\n{label}:;"));
        }
        code
    }
}

impl Function {
    /// The declaration line without the trailing `;` or body; `this_type`
    /// adds the implicit first parameter for class methods
    fn c_declaration_base(&self, this_type: Option<&Rc<Type>>) -> String {
        let mut params: Vec<String> = Vec::new();
        if let Some(class) = this_type {
            params.push(format!("{}* this", class.c_name()));
        }
        for param in &self.params {
            params.push(format!("{} {}", param.type_.c_name(), param.name));
        }
        let name = match this_type {
            Some(class) => format!("{}_{}", class.c_name(), self.name),
            None => self.name.clone(),
        };
        format!(
            "{} {}({})",
            self.return_type.c_name(),
            name,
            params.join(", ")
        )
    }

    /// Forward declaration with terminating semicolon
    pub fn c_declaration(&self) -> String {
        format!("{};", self.c_declaration_base(None))
    }

    /// Declaration and body of the function
    pub fn c_code(&self) -> String {
        self.c_code_with_this(None)
    }

    /// Declaration and body, as a method of `this_type` when given
    pub fn c_code_with_this(&self, this_type: Option<&Rc<Type>>) -> String {
        let mut code = format!("{} {{\n", self.c_declaration_base(this_type));
        for statement in &self.statements {
            code.push_str(&statement.to_c());
            code.push('\n');
        }
        code.push('}');
        code
    }
}

/// Which lifecycle function a [`Lifecycle`] block declares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleKind {
    Constructor,
    Destructor,
}

impl Lifecycle {
    /// Declaration and body of the constructor/destructor function
    pub fn c_code(&self, kind: LifecycleKind) -> String {
        let suffix = match kind {
            LifecycleKind::Constructor => "constructor",
            LifecycleKind::Destructor => "destructor",
        };
        let class = self.class_type.c_name();
        let mut params = vec![format!("{class}* this")];
        for param in &self.params {
            params.push(format!("{} {}", param.type_.c_name(), param.name));
        }
        let mut code = format!("void {class}_{suffix}({}) {{\n", params.join(", "));
        for statement in &self.statements {
            code.push_str(&statement.to_c());
            code.push('\n');
        }
        code.push('}');
        code
    }
}

fn print_to_c(value: &Expression, newline: bool) -> String {
    let newline = if newline { "\\n" } else { "" };
    if let ExpressionKind::Str { parts } = &value.kind {
        let (format, arguments) = string_format_parts(parts);
        if arguments.is_empty() {
            return format!("printf(\"{format}{newline}\");");
        }
        return format!("printf(\"{format}{newline}\", {});", arguments.join(", "));
    }

    let specifier = value.checked_type().format_specifier().unwrap_or_else(|| {
        unreachable!("internal compiler error, unprintable expression reached emission!")
    });
    format!("printf(\"{specifier}{newline}\", {});", value.to_c())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> SourceLocation {
        SourceLocation::new(0, 0)
    }

    fn number(value: u64) -> Expression {
        let mut expression = Expression::new(
            location(),
            ExpressionKind::TokenValue {
                token: Token::new(TokenKind::Number(value), location()),
            },
        );
        expression.type_ = Some(Types::new().builtin("base"));
        expression
    }

    fn binary(left: Expression, operator: TokenKind, right: Expression) -> Expression {
        let mut expression = Expression::new(
            location(),
            ExpressionKind::Binary {
                left: Box::new(left),
                operator: Token::new(operator, location()),
                right: Box::new(right),
            },
        );
        expression.type_ = Some(Types::new().builtin("base"));
        expression
    }

    #[test]
    fn test_binary_expression_parenthesization() {
        // 1100 + 150 * 2 + 37 - 100, associated the way the parser builds it
        let product = binary(number(150), TokenKind::Star, number(2));
        let sum = binary(number(1100), TokenKind::Plus, product);
        let sum = binary(sum, TokenKind::Plus, number(37));
        let difference = binary(sum, TokenKind::Minus, number(100));
        assert_eq!(difference.to_c(), "(((1100 + (150 * 2)) + 37) - 100)");
    }

    #[test]
    fn test_unary_forms() {
        let grouped = Expression::new(
            location(),
            ExpressionKind::Unary {
                kind: UnaryKind::Grouping,
                operand: Box::new(number(5)),
            },
        );
        assert_eq!(grouped.to_c(), "(5)");

        let negated = Expression::new(
            location(),
            ExpressionKind::Unary {
                kind: UnaryKind::Not,
                operand: Box::new(number(1)),
            },
        );
        assert_eq!(negated.to_c(), "(!(1))");

        let identifier = Expression::new(
            location(),
            ExpressionKind::Identifier {
                name: "x".to_string(),
                inner: None,
            },
        );
        let incremented = Expression::new(
            location(),
            ExpressionKind::Unary {
                kind: UnaryKind::PostIncrement,
                operand: Box::new(identifier),
            },
        );
        assert_eq!(incremented.to_c(), "(x++)");
    }

    #[test]
    fn test_type_cast_emission() {
        let cast = Expression::new(
            location(),
            ExpressionKind::TypeCast {
                target: Types::new().builtin("u8"),
                operand: Box::new(number(5)),
            },
        );
        assert_eq!(cast.to_c(), "((u8)5)");
    }

    #[test]
    fn test_null_emits_zero() {
        let null = Expression::new(
            location(),
            ExpressionKind::TokenValue {
                token: Token::new(TokenKind::Null, location()),
            },
        );
        assert_eq!(null.to_c(), "0");
    }

    #[test]
    fn test_character_literal_emission() {
        let newline = Expression::new(
            location(),
            ExpressionKind::TokenValue {
                token: Token::new(TokenKind::Character('\n'), location()),
            },
        );
        assert_eq!(newline.to_c(), "'\\n'");
    }

    #[test]
    fn test_member_chain_emission() {
        let chain = Expression::new(
            location(),
            ExpressionKind::Identifier {
                name: "point".to_string(),
                inner: Some(Box::new(Expression::new(
                    location(),
                    ExpressionKind::Identifier {
                        name: "x".to_string(),
                        inner: None,
                    },
                ))),
            },
        );
        assert_eq!(chain.to_c(), "point.x");
    }

    #[test]
    fn test_method_call_emission() {
        let mut types = Types::new();
        let point = types.add_class("Point");
        let call = Expression::new(
            location(),
            ExpressionKind::Identifier {
                name: "p".to_string(),
                inner: Some(Box::new(Expression::new(
                    location(),
                    ExpressionKind::Call {
                        name: "norm".to_string(),
                        class_of: Some(point),
                        arguments: vec![number(2)],
                    },
                ))),
            },
        );
        assert_eq!(call.to_c(), "Point_norm(&p, 2)");
    }

    #[test]
    fn test_list_method_call_emission() {
        let mut types = Types::new();
        let u32_ = types.builtin("u32");
        let list = types.add_list_type(&u32_);
        let call = Expression::new(
            location(),
            ExpressionKind::Identifier {
                name: "xs".to_string(),
                inner: Some(Box::new(Expression::new(
                    location(),
                    ExpressionKind::Call {
                        name: "add".to_string(),
                        class_of: Some(list),
                        arguments: vec![number(5)],
                    },
                ))),
            },
        );
        assert_eq!(call.to_c(), "list_u32_add(&xs, 5)");
    }

    #[test]
    fn test_this_field_and_method_emission() {
        let mut types = Types::new();
        let point = types.add_class("Point");

        let field = Expression::new(
            location(),
            ExpressionKind::This {
                inner: Box::new(Expression::new(
                    location(),
                    ExpressionKind::Identifier {
                        name: "x".to_string(),
                        inner: None,
                    },
                )),
            },
        );
        assert_eq!(field.to_c(), "this->x");

        let method = Expression::new(
            location(),
            ExpressionKind::This {
                inner: Box::new(Expression::new(
                    location(),
                    ExpressionKind::Call {
                        name: "norm".to_string(),
                        class_of: Some(point),
                        arguments: vec![],
                    },
                )),
            },
        );
        assert_eq!(method.to_c(), "Point_norm(this)");
    }

    #[test]
    fn test_print_with_interpolated_string() {
        let mut sum = binary(number(1), TokenKind::Plus, number(2));
        sum.type_ = Some(Types::new().builtin("base"));
        let value = Expression::new(
            location(),
            ExpressionKind::Str {
                parts: vec![
                    StringPart::Chars("x = ".to_string()),
                    StringPart::Expr(sum),
                ],
            },
        );
        let statement = Statement {
            location: location(),
            kind: StatementKind::Print {
                value,
                newline: false,
            },
        };
        assert_eq!(statement.to_c(), "printf(\"x = %d\", (1 + 2));");
    }

    #[test]
    fn test_println_appends_newline() {
        let mut value = number(10);
        value.type_ = Some(Types::new().builtin("u16"));
        let statement = Statement {
            location: location(),
            kind: StatementKind::Print {
                value,
                newline: true,
            },
        };
        assert_eq!(statement.to_c(), "printf(\"%u\\n\", 10);");
    }

    #[test]
    fn test_percent_escaping_in_format_strings() {
        let value = Expression::new(
            location(),
            ExpressionKind::Str {
                parts: vec![StringPart::Chars("100%".to_string())],
            },
        );
        let statement = Statement {
            location: location(),
            kind: StatementKind::Print {
                value,
                newline: true,
            },
        };
        assert_eq!(statement.to_c(), "printf(\"100%%\\n\");");
    }

    #[test]
    fn test_var_decl_emission() {
        let types = Types::new();
        let decl = VarDecl {
            type_: types.builtin("u16"),
            type_location: location(),
            name: "var".to_string(),
            name_location: location(),
            initial_value: Some(number(10)),
        };
        assert_eq!(decl.to_c(), "u16 var = 10;");

        let uninitialized = VarDecl {
            type_: types.builtin("u16"),
            type_location: location(),
            name: "var".to_string(),
            name_location: location(),
            initial_value: None,
        };
        assert_eq!(uninitialized.to_c(), "u16 var;");
    }

    #[test]
    fn test_class_var_decl_calls_constructor() {
        let mut types = Types::new();
        let point = types.add_class("Point");
        let decl = VarDecl {
            type_: point,
            type_location: location(),
            name: "p".to_string(),
            name_location: location(),
            initial_value: None,
        };
        assert_eq!(decl.to_c(), "Point p;\nPoint_constructor(&p);");
    }

    #[test]
    fn test_list_decl_emission() {
        let mut types = Types::new();
        let u32_ = types.builtin("u32");
        let list = types.add_list_type(&u32_);
        let decl = ListDecl {
            list_type: list,
            name: "xs".to_string(),
            name_location: location(),
        };
        assert_eq!(decl.to_c(), "list_u32 xs;\nxs.list = 0;");
    }

    #[test]
    fn test_for_loop_emission_strips_init_semicolon() {
        let types = Types::new();
        let init = Statement {
            location: location(),
            kind: StatementKind::VarDecl(VarDecl {
                type_: types.builtin("u8"),
                type_location: location(),
                name: "i".to_string(),
                name_location: location(),
                initial_value: Some(number(0)),
            }),
        };
        let i = || {
            Expression::new(
                location(),
                ExpressionKind::TokenValue {
                    token: Token::new(TokenKind::Identifier("i".to_string()), location()),
                },
            )
        };
        let check = binary(i(), TokenKind::Less, number(10));
        let step = Expression::new(
            location(),
            ExpressionKind::Unary {
                kind: UnaryKind::PreIncrement,
                operand: Box::new(i()),
            },
        );
        let for_loop = ForLoop {
            init: Some(Box::new(init)),
            check: Some(check),
            step: Some(step),
            statements: vec![Statement {
                location: location(),
                kind: StatementKind::Break,
            }],
            breakall_labels: vec![],
        };
        assert_eq!(
            for_loop.to_c(),
            "for (u8 i = 0; (i < 10); (++i)) {\nbreak;\n}"
        );
    }

    #[test]
    fn test_breakall_labels_land_after_loop() {
        let for_loop = ForLoop {
            init: None,
            check: None,
            step: None,
            statements: vec![Statement {
                location: location(),
                kind: StatementKind::Breakall {
                    label: "done".to_string(),
                },
            }],
            breakall_labels: vec!["done".to_string()],
        };
        assert_eq!(for_loop.to_c(), "for (; ; ) {\ngoto done;\n}\ndone:;");
    }

    #[test]
    fn test_if_else_if_else_emission() {
        let if_statement = IfStatement {
            condition: number(1),
            statements: vec![Statement {
                location: location(),
                kind: StatementKind::Break,
            }],
            else_if_blocks: vec![(
                number(2),
                vec![Statement {
                    location: location(),
                    kind: StatementKind::Continue,
                }],
            )],
            else_statements: Some(vec![Statement {
                location: location(),
                kind: StatementKind::Return { value: None },
            }]),
        };
        assert_eq!(
            if_statement.to_c(),
            "if (1) {\nbreak;\n} else if (2) {\ncontinue;\n} else {\nreturn;\n}"
        );
    }

    #[test]
    fn test_function_declaration_and_body() {
        let types = Types::new();
        let function = Function {
            return_type: types.builtin("u16"),
            return_type_location: location(),
            name: "double_it".to_string(),
            name_location: location(),
            params: vec![Param {
                type_: types.builtin("u16"),
                name: "value".to_string(),
                location: location(),
            }],
            statements: vec![Statement {
                location: location(),
                kind: StatementKind::Return {
                    value: Some(number(0)),
                },
            }],
        };
        assert_eq!(function.c_declaration(), "u16 double_it(u16 value);");
        assert_eq!(function.c_code(), "u16 double_it(u16 value) {\nreturn 0;\n}");
    }

    #[test]
    fn test_method_takes_this_pointer() {
        let mut types = Types::new();
        let point = types.add_class("Point");
        let method = Function {
            return_type: types.builtin("void"),
            return_type_location: location(),
            name: "reset".to_string(),
            name_location: location(),
            params: vec![],
            statements: vec![],
        };
        assert_eq!(
            method.c_code_with_this(Some(&point)),
            "void Point_reset(Point* this) {\n}"
        );
    }

    #[test]
    fn test_lifecycle_emission() {
        let mut types = Types::new();
        let point = types.add_class("Point");
        let constructor = Lifecycle {
            class_type: Rc::clone(&point),
            params: vec![],
            statements: vec![],
            location: location(),
        };
        assert_eq!(
            constructor.c_code(LifecycleKind::Constructor),
            "void Point_constructor(Point* this) {\n}"
        );
        assert_eq!(
            constructor.c_code(LifecycleKind::Destructor),
            "void Point_destructor(Point* this) {\n}"
        );
    }
}

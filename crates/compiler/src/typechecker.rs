//! Typing pass
//!
//! Second AST check, running after scoping with the same scope-stack
//! machinery plus registries for functions and classes, a stack of
//! surrounding function return types and a stack of surrounding class
//! types for `this`. Fills the type slot of every expression, checks
//! declarations, assignments and calls under the numeric promotion
//! rules, validates return statements against the enclosing function
//! and resolves the built-in list methods.
//!
//! Numeric literals carry the `base` type until context refines them;
//! combining `base` with any scalar yields that scalar, two scalars of
//! the same kind combine to the one later in the promotion lattice, and
//! everything else must match by keyword.

use crate::ast::Ast;
use crate::ast::ClassDecl;
use crate::ast::Expression;
use crate::ast::ExpressionKind;
use crate::ast::Function;
use crate::ast::Lifecycle;
use crate::ast::Statement;
use crate::ast::StatementKind;
use crate::ast::StringPart;
use crate::ast::UnaryKind;
use crate::errors::CompileError;
use crate::scope::ScopeStack;
use crate::source_location::SourceLocation;
use crate::tokens::TokenKind;
use crate::types::NumericKind;
use crate::types::Type;
use crate::types::Types;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

/// Callable signature recorded for call-site checking
#[derive(Debug, Clone)]
struct FunctionSig {
    return_type: Rc<Type>,
    params: Vec<Rc<Type>>,
}

impl FunctionSig {
    fn of(function: &Function) -> Self {
        FunctionSig {
            return_type: Rc::clone(&function.return_type),
            params: function.params.iter().map(|p| Rc::clone(&p.type_)).collect(),
        }
    }
}

/// Field and method tables of one class
#[derive(Debug, Clone)]
struct ClassInfo {
    type_: Rc<Type>,
    fields: HashMap<String, Rc<Type>>,
    methods: HashMap<String, FunctionSig>,
}

pub struct TypingPass<'a> {
    filename: PathBuf,
    source: &'a str,
    types: Types,
    scopes: ScopeStack,
    errors: Vec<CompileError>,
    functions: HashMap<String, FunctionSig>,
    classes: HashMap<String, ClassInfo>,
    /// Return types of the functions the walk is currently inside
    function_stack: Vec<Rc<Type>>,
    /// Names of the classes the walk is currently inside, for `this`
    class_stack: Vec<String>,
}

type CheckResult = Result<(), CompileError>;

impl<'a> TypingPass<'a> {
    pub fn new(ast: &Ast, source: &'a str) -> Self {
        TypingPass {
            filename: ast.filename.clone(),
            source,
            types: ast.types.clone(),
            scopes: ScopeStack::new(),
            errors: Vec::new(),
            functions: HashMap::new(),
            classes: HashMap::new(),
            function_stack: Vec::new(),
            class_stack: Vec::new(),
        }
    }

    /// Run the pass, writing each expression's type slot exactly once
    pub fn run(mut self, ast: &mut Ast) -> Result<(), Vec<CompileError>> {
        for statement in &mut ast.statements {
            self.check_statement(statement);
        }

        assert_eq!(
            self.scopes.depth(),
            1,
            "internal compiler error, more scopes than the global scope left!"
        );
        assert!(
            self.function_stack.is_empty() && self.class_stack.is_empty(),
            "internal compiler error, unbalanced function or class stack!"
        );

        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    fn check_statement(&mut self, statement: &mut Statement) {
        if let Err(error) = self.statement(statement) {
            self.errors.push(error);
        }
    }

    fn statement(&mut self, statement: &mut Statement) -> CheckResult {
        let location = statement.location;
        match &mut statement.kind {
            StatementKind::VarDecl(decl) => {
                // the declaration is visible to its own initial value
                self.declare(&decl.name, Rc::clone(&decl.type_), decl.name_location)?;
                if let Some(initial_value) = &mut decl.initial_value {
                    let requested = Rc::clone(&decl.type_);
                    let value_type = self.expression(initial_value)?;
                    self.check_types(&requested, &value_type, decl.name_location)?;
                    self.check_number_literal(&requested, initial_value)?;
                }
                Ok(())
            }
            StatementKind::Assignment { target, value } => {
                let requested = self.expression(target)?;
                let value_type = self.expression(value)?;
                self.check_types(&requested, &value_type, target.location)?;
                self.check_number_literal(&requested, value)
            }
            StatementKind::Expression { expression } => {
                self.expression(expression)?;
                Ok(())
            }
            StatementKind::If(if_statement) => {
                self.scopes.enter();
                if let Err(error) = self.expression(&mut if_statement.condition) {
                    self.errors.push(error);
                }
                for body_statement in &mut if_statement.statements {
                    self.check_statement(body_statement);
                }
                self.scopes.leave();
                for (condition, block) in &mut if_statement.else_if_blocks {
                    self.scopes.enter();
                    if let Err(error) = self.expression(condition) {
                        self.errors.push(error);
                    }
                    for body_statement in block {
                        self.check_statement(body_statement);
                    }
                    self.scopes.leave();
                }
                if let Some(block) = &mut if_statement.else_statements {
                    self.scopes.enter();
                    for body_statement in block {
                        self.check_statement(body_statement);
                    }
                    self.scopes.leave();
                }
                Ok(())
            }
            StatementKind::ForLoop(for_loop) => {
                self.scopes.enter();
                if let Some(init) = &mut for_loop.init {
                    self.check_statement(init);
                }
                if let Some(check) = &mut for_loop.check
                    && let Err(error) = self.expression(check)
                {
                    self.errors.push(error);
                }
                if let Some(step) = &mut for_loop.step
                    && let Err(error) = self.expression(step)
                {
                    self.errors.push(error);
                }
                for body_statement in &mut for_loop.statements {
                    self.check_statement(body_statement);
                }
                self.scopes.leave();
                Ok(())
            }
            StatementKind::Function(function) => {
                self.declare(
                    &function.name,
                    Rc::clone(&function.return_type),
                    function.name_location,
                )?;
                self.functions
                    .insert(function.name.clone(), FunctionSig::of(function));
                self.check_function_body(function);
                Ok(())
            }
            StatementKind::Class(class) => {
                let info = class_info(class);
                let name = class.type_.keyword.clone();
                self.classes.insert(name.clone(), info);

                self.class_stack.push(name);
                self.scopes.enter();
                for field in &mut class.fields {
                    self.check_statement(field);
                }
                for method in &mut class.methods {
                    if let Err(error) = self.declare(
                        &method.name,
                        Rc::clone(&method.return_type),
                        method.name_location,
                    ) {
                        self.errors.push(error);
                    }
                    self.check_function_body(method);
                }
                let lifecycles = class
                    .constructor
                    .iter_mut()
                    .chain(class.destructor.iter_mut());
                for lifecycle in lifecycles {
                    self.check_lifecycle_body(lifecycle);
                }
                self.scopes.leave();
                self.class_stack.pop();
                Ok(())
            }
            StatementKind::Return { value } => self.return_statement(value, location),
            StatementKind::Print { value, .. } => {
                let value_type = self.expression(value)?;
                // interpolated strings validated their parts already
                if matches!(value.kind, ExpressionKind::Str { .. }) {
                    return Ok(());
                }
                if value_type.format_specifier().is_none() {
                    return Err(self.error_at(
                        format!("can't print expression of type '{}'!", value_type.keyword),
                        value.location,
                    ));
                }
                Ok(())
            }
            StatementKind::Break | StatementKind::Continue | StatementKind::Breakall { .. } => {
                Ok(())
            }
            StatementKind::List(list) => {
                self.declare(&list.name, Rc::clone(&list.list_type), list.name_location)
            }
        }
    }

    fn check_function_body(&mut self, function: &mut Function) {
        self.scopes.enter();
        self.function_stack.push(Rc::clone(&function.return_type));
        for param in &function.params {
            if let Err(error) =
                self.declare(&param.name, Rc::clone(&param.type_), param.location)
            {
                self.errors.push(error);
            }
        }
        for body_statement in &mut function.statements {
            self.check_statement(body_statement);
        }
        self.function_stack.pop();
        self.scopes.leave();
    }

    /// Constructors and destructors check like void functions
    fn check_lifecycle_body(&mut self, lifecycle: &mut Lifecycle) {
        self.scopes.enter();
        self.function_stack.push(self.types.builtin("void"));
        for param in &lifecycle.params {
            if let Err(error) =
                self.declare(&param.name, Rc::clone(&param.type_), param.location)
            {
                self.errors.push(error);
            }
        }
        for body_statement in &mut lifecycle.statements {
            self.check_statement(body_statement);
        }
        self.function_stack.pop();
        self.scopes.leave();
    }

    fn return_statement(
        &mut self,
        value: &mut Option<Expression>,
        location: SourceLocation,
    ) -> CheckResult {
        let function_return_type = match self.function_stack.last() {
            Some(type_) => Rc::clone(type_),
            None => unreachable!("internal compiler error, return outside of a function!"),
        };
        let non_void = !function_return_type.is_void();

        match value {
            None if non_void => {
                Err(self.error_at("non-void function expects a return value!", location))
            }
            None => Ok(()),
            Some(value) => {
                let value_type = self.expression(value)?;
                if !non_void {
                    return Err(self.error_at(
                        format!(
                            "void function expects no return value, found '{}'!",
                            value.to_c()
                        ),
                        location,
                    ));
                }
                if self.combine(&function_return_type, &value_type).is_none() {
                    return Err(self.error_at(
                        format!(
                            "expected return value of type '{}', but found '{}'!",
                            function_return_type.keyword, value_type.keyword
                        ),
                        location,
                    ));
                }
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // expressions

    /// Check an expression and fill in its type slot
    fn expression(&mut self, expression: &mut Expression) -> Result<Rc<Type>, CompileError> {
        let location = expression.location;
        let type_ = match &mut expression.kind {
            ExpressionKind::Binary {
                left,
                operator,
                right,
            } => {
                let operator_location = operator.location;
                let left_type = self.expression(left)?;
                let right_type = self.expression(right)?;
                self.check_types(&left_type, &right_type, operator_location)?
            }
            ExpressionKind::Unary { kind, operand } => {
                let kind = *kind;
                let operand_type = self.expression(operand)?;
                if kind != UnaryKind::Grouping && !operand_type.is_numeric() {
                    return Err(self.error_at(
                        format!(
                            "expected numeric type for unary expression '{kind:?}', found '{}'!",
                            operand_type.keyword
                        ),
                        location,
                    ));
                }
                operand_type
            }
            ExpressionKind::TokenValue { token } => match &token.kind {
                TokenKind::Number(_) => self.types.builtin("base"),
                TokenKind::Character(_) => self.types.builtin("char"),
                // true/false report the base type until a boolean type
                // exists; null until a pointer type exists
                TokenKind::True | TokenKind::False | TokenKind::Null => {
                    self.types.builtin("base")
                }
                TokenKind::Identifier(name) => {
                    let name = name.clone();
                    self.lookup(&name, token.location)?
                }
                other => {
                    unreachable!("internal compiler error, {other} is not a value token!")
                }
            },
            ExpressionKind::Identifier { name, inner } => {
                let name = name.clone();
                let head_type = self.lookup(&name, location)?;
                match inner {
                    Some(inner) => self.chain(inner, &head_type)?,
                    None => head_type,
                }
            }
            ExpressionKind::Call {
                name, arguments, ..
            } => {
                let name = name.clone();
                let Some(sig) = self.functions.get(&name).cloned() else {
                    return Err(self.error_at(
                        format!("identifier '{name}' is not callable!"),
                        location,
                    ));
                };
                self.check_call_arguments(&name, &sig, arguments, location)?;
                sig.return_type
            }
            ExpressionKind::TypeCast { target, operand } => {
                let target = Rc::clone(target);
                let operand_type = self.expression(operand)?;
                // only numeric values cast to numeric types
                if !(target.is_numeric() && operand_type.is_numeric()) {
                    return Err(self.error_at(
                        format!(
                            "cannot type cast from '{}' to '{}'!",
                            operand_type.keyword, target.keyword
                        ),
                        location,
                    ));
                }
                target
            }
            ExpressionKind::Str { parts } => {
                for part in parts {
                    if let StringPart::Expr(part_expression) = part {
                        let part_type = self.expression(part_expression)?;
                        if part_type.format_specifier().is_none() {
                            return Err(self.error_at(
                                format!(
                                    "can't format expression of type '{}' in a string!",
                                    part_type.keyword
                                ),
                                part_expression.location,
                            ));
                        }
                    }
                }
                self.types.builtin("string")
            }
            ExpressionKind::This { inner } => {
                let Some(class_name) = self.class_stack.last().cloned() else {
                    return Err(
                        self.error_at("'this' can only be used inside a class!", location)
                    );
                };
                let class_type = match self.classes.get(&class_name) {
                    Some(info) => Rc::clone(&info.type_),
                    None => unreachable!("internal compiler error, class '{class_name}' unknown!"),
                };
                self.chain(inner, &class_type)?
            }
        };

        expression.type_ = Some(Rc::clone(&type_));
        Ok(type_)
    }

    /// Resolve a member chain against the type of its receiver: fields
    /// and methods of classes, and the built-in methods of lists
    fn chain(
        &mut self,
        expression: &mut Expression,
        receiver: &Rc<Type>,
    ) -> Result<Rc<Type>, CompileError> {
        let location = expression.location;
        let type_ = match &mut expression.kind {
            ExpressionKind::Identifier { name, inner } => {
                let name = name.clone();
                let field_type = self.field_type(receiver, &name, location)?;
                match inner {
                    Some(inner) => self.chain(inner, &field_type)?,
                    None => field_type,
                }
            }
            ExpressionKind::Call {
                name,
                class_of,
                arguments,
            } => {
                let name = name.clone();
                let sig = self.method_signature(receiver, &name, location)?;
                self.check_call_arguments(&name, &sig, arguments, location)?;
                *class_of = Some(Rc::clone(receiver));
                sig.return_type
            }
            _ => unreachable!("internal compiler error, invalid member chain node!"),
        };

        expression.type_ = Some(Rc::clone(&type_));
        Ok(type_)
    }

    fn field_type(
        &self,
        receiver: &Rc<Type>,
        name: &str,
        location: SourceLocation,
    ) -> Result<Rc<Type>, CompileError> {
        if let Some(info) = self.classes.get(&receiver.keyword)
            && let Some(field_type) = info.fields.get(name)
        {
            return Ok(Rc::clone(field_type));
        }
        Err(self.error_at(format!("unknown identifier '{name}'!"), location))
    }

    fn method_signature(
        &self,
        receiver: &Rc<Type>,
        name: &str,
        location: SourceLocation,
    ) -> Result<FunctionSig, CompileError> {
        if receiver.is_list() {
            if let Some((params, return_type)) = self.types.list_method_signature(receiver, name) {
                return Ok(FunctionSig {
                    return_type,
                    params,
                });
            }
        } else if let Some(info) = self.classes.get(&receiver.keyword)
            && let Some(sig) = info.methods.get(name)
        {
            return Ok(sig.clone());
        }
        Err(self.error_at(
            format!(
                "identifier '{name}' of a '{}' is not callable!",
                receiver.keyword
            ),
            location,
        ))
    }

    fn check_call_arguments(
        &mut self,
        name: &str,
        sig: &FunctionSig,
        arguments: &mut [Expression],
        location: SourceLocation,
    ) -> CheckResult {
        if sig.params.len() != arguments.len() {
            return Err(self.error_at(
                format!(
                    "'{name}' expected {} argument(s), but {} were passed!",
                    sig.params.len(),
                    arguments.len()
                ),
                location,
            ));
        }
        for (index, (param, argument)) in sig.params.iter().zip(arguments.iter_mut()).enumerate() {
            let argument_type = self.expression(argument)?;
            if self.combine(param, &argument_type).is_none() {
                return Err(self.error_at(
                    format!(
                        "expected 'argument {}' of type '{}', but found '{}'!",
                        index + 1,
                        param.keyword,
                        argument_type.keyword
                    ),
                    argument.location,
                ));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // the check-compatibility rule

    /// Combine two types, or None when they can't be used together:
    /// `base` unifies with any scalar, scalars of one kind promote to
    /// the wider one, everything else must match by keyword
    fn combine(&self, left: &Rc<Type>, right: &Rc<Type>) -> Option<Rc<Type>> {
        if left.is_numeric() && right.is_numeric() {
            if left.is_base() {
                return Some(Rc::clone(right));
            }
            if right.is_base() {
                return Some(Rc::clone(left));
            }
            let (left_kind, left_bits) = left.scalar_info()?;
            let (right_kind, right_bits) = right.scalar_info()?;
            if left_kind == right_kind {
                let wider = if left_bits >= right_bits { left } else { right };
                return Some(Rc::clone(wider));
            }
            return None;
        }
        if left.keyword == right.keyword {
            return Some(Rc::clone(left));
        }
        None
    }

    fn check_types(
        &self,
        left: &Rc<Type>,
        right: &Rc<Type>,
        location: SourceLocation,
    ) -> Result<Rc<Type>, CompileError> {
        self.combine(left, right).ok_or_else(|| {
            self.error_at(
                format!(
                    "invalid types provided, '{}' and '{}' can't be used together!",
                    left.keyword, right.keyword
                ),
                location,
            )
        })
    }

    /// Signed and unsigned literals must fit the declared bit width;
    /// floating targets skip the check
    fn check_number_literal(
        &self,
        requested: &Rc<Type>,
        expression: &Expression,
    ) -> CheckResult {
        let Some((value, negative)) = literal_value(expression) else {
            return Ok(());
        };
        let Some((kind, bits)) = requested.scalar_info() else {
            return Ok(());
        };
        let (min, max): (i128, i128) = match kind {
            NumericKind::Signed => {
                let max = (1i128 << (bits - 1)) - 1;
                (-max - 1, max)
            }
            NumericKind::Unsigned => (0, (1i128 << bits) - 1),
            NumericKind::FloatingPoint => return Ok(()),
        };

        let value = if negative {
            -(value as i128)
        } else {
            value as i128
        };
        if value < min || value > max {
            return Err(self.error_at(
                format!(
                    "can't assign '{value}' to '{}', value must be between [{min}, {max}]!",
                    requested.keyword
                ),
                expression.location,
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------

    fn declare(&mut self, name: &str, type_: Rc<Type>, location: SourceLocation) -> CheckResult {
        self.scopes
            .declare(name, type_)
            .map_err(|message| self.error_at(message, location))
    }

    fn lookup(&self, name: &str, location: SourceLocation) -> Result<Rc<Type>, CompileError> {
        self.scopes
            .lookup(name)
            .ok_or_else(|| self.error_at(format!("unknown identifier '{name}'!"), location))
    }

    fn error_at(&self, message: impl Into<String>, location: SourceLocation) -> CompileError {
        CompileError::at(message, &self.filename, self.source, location)
    }
}

/// Field and method tables collected before a class body is checked, so
/// sibling methods can call each other through `this`
fn class_info(class: &ClassDecl) -> ClassInfo {
    let mut fields = HashMap::new();
    for field in &class.fields {
        if let StatementKind::VarDecl(decl) = &field.kind {
            fields.insert(decl.name.clone(), Rc::clone(&decl.type_));
        }
    }
    let mut methods = HashMap::new();
    for method in &class.methods {
        methods.insert(method.name.clone(), FunctionSig::of(method));
    }
    ClassInfo {
        type_: Rc::clone(&class.type_),
        fields,
        methods,
    }
}

/// The literal a bounds check applies to: a bare number, possibly
/// wrapped in negations
fn literal_value(expression: &Expression) -> Option<(u64, bool)> {
    match &expression.kind {
        ExpressionKind::TokenValue { token } => match token.kind {
            TokenKind::Number(value) => Some((value, false)),
            _ => None,
        },
        ExpressionKind::Unary {
            kind: UnaryKind::Minus,
            operand,
        } => literal_value(operand).map(|(value, negative)| (value, !negative)),
        _ => None,
    }
}

/// Walk a checked AST and assert that every reachable expression got a
/// type; violating this is an internal compiler error
pub fn verify_types(ast: &Ast) {
    fn check_expression(expression: &Expression) {
        assert!(
            expression.type_.is_some(),
            "internal compiler error, expression without a type: {:?}",
            expression.kind
        );
        match &expression.kind {
            ExpressionKind::Binary { left, right, .. } => {
                check_expression(left);
                check_expression(right);
            }
            ExpressionKind::Unary { operand, .. } => check_expression(operand),
            ExpressionKind::TokenValue { .. } => {}
            ExpressionKind::Identifier { inner, .. } => {
                if let Some(inner) = inner {
                    check_expression(inner);
                }
            }
            ExpressionKind::Call { arguments, .. } => {
                for argument in arguments {
                    check_expression(argument);
                }
            }
            ExpressionKind::TypeCast { operand, .. } => check_expression(operand),
            ExpressionKind::Str { parts } => {
                for part in parts {
                    if let StringPart::Expr(expression) = part {
                        check_expression(expression);
                    }
                }
            }
            ExpressionKind::This { inner } => check_expression(inner),
        }
    }

    fn check_statement(statement: &Statement) {
        match &statement.kind {
            StatementKind::VarDecl(decl) => {
                if let Some(initial_value) = &decl.initial_value {
                    check_expression(initial_value);
                }
            }
            StatementKind::Assignment { target, value } => {
                check_expression(target);
                check_expression(value);
            }
            StatementKind::Expression { expression } => check_expression(expression),
            StatementKind::If(if_statement) => {
                check_expression(&if_statement.condition);
                if_statement.statements.iter().for_each(check_statement);
                for (condition, block) in &if_statement.else_if_blocks {
                    check_expression(condition);
                    block.iter().for_each(check_statement);
                }
                if let Some(block) = &if_statement.else_statements {
                    block.iter().for_each(check_statement);
                }
            }
            StatementKind::ForLoop(for_loop) => {
                if let Some(init) = &for_loop.init {
                    check_statement(init);
                }
                if let Some(check) = &for_loop.check {
                    check_expression(check);
                }
                if let Some(step) = &for_loop.step {
                    check_expression(step);
                }
                for_loop.statements.iter().for_each(check_statement);
            }
            StatementKind::Function(function) => {
                function.statements.iter().for_each(check_statement);
            }
            StatementKind::Class(class) => {
                class.fields.iter().for_each(check_statement);
                for method in &class.methods {
                    method.statements.iter().for_each(check_statement);
                }
                for lifecycle in class.constructor.iter().chain(class.destructor.iter()) {
                    lifecycle.statements.iter().for_each(check_statement);
                }
            }
            StatementKind::Return { value } => {
                if let Some(value) = value {
                    check_expression(value);
                }
            }
            StatementKind::Print { value, .. } => check_expression(value),
            StatementKind::Break
            | StatementKind::Continue
            | StatementKind::Breakall { .. }
            | StatementKind::List(_) => {}
        }
    }

    ast.statements.iter().for_each(check_statement);
}

//! C code generation
//!
//! Walks the checked AST and assembles the output translation unit:
//! `types.h` with typedefs for the built-in scalars, `classes.h` with
//! struct bodies and lifecycle/method functions, `functions.h` with the
//! free functions, and `main.c` wrapping the remaining top-level
//! statements. The built-in `list.h` ships with the compiler and is
//! written next to the generated headers, with one macro instantiation
//! per interned list type.
//!
//! No user-visible errors originate here; the AST is fully validated by
//! the time it reaches the generator, and only file-system failures can
//! surface.

use crate::ast::Ast;
use crate::ast::LifecycleKind;
use crate::ast::StatementKind;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

/// The embedded list runtime header
pub static LIST_H: &str = include_str!("../stdlib/list.h");

/// Name of the directory the generated headers land in, next to main.c
pub const HEADERS_DIR: &str = "tapl_headers";

/// The full set of generated sources, before they are written out
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedCode {
    pub types_h: String,
    pub classes_h: String,
    pub functions_h: String,
    pub main_c: String,
}

pub struct CodeGen<'a> {
    ast: &'a Ast,
}

impl<'a> CodeGen<'a> {
    pub fn new(ast: &'a Ast) -> Self {
        CodeGen { ast }
    }

    /// Assemble every output file as a string
    pub fn generate(&self) -> GeneratedCode {
        GeneratedCode {
            types_h: self.generate_types_h(),
            classes_h: self.generate_classes_h(),
            functions_h: self.generate_functions_h(),
            main_c: self.generate_main_c(),
        }
    }

    /// Write the generated sources under the build directory and return
    /// the paths of every written file
    pub fn write(&self, build_dir: &Path) -> io::Result<Vec<PathBuf>> {
        let headers_dir = build_dir.join(HEADERS_DIR);
        fs::create_dir_all(&headers_dir)?;

        let code = self.generate();
        let mut written = Vec::new();
        for (path, content) in [
            (build_dir.join("main.c"), code.main_c.as_str()),
            (headers_dir.join("types.h"), code.types_h.as_str()),
            (headers_dir.join("classes.h"), code.classes_h.as_str()),
            (headers_dir.join("functions.h"), code.functions_h.as_str()),
            (headers_dir.join("list.h"), LIST_H),
        ] {
            fs::write(&path, content)?;
            written.push(path);
        }
        Ok(written)
    }

    /// `types.h`: one typedef per built-in whose C spelling differs from
    /// its canonical keyword
    fn generate_types_h(&self) -> String {
        let mut code = String::from("#pragma once\n\n#include <stdbool.h>\n#include <stdint.h>\n\n");
        for type_ in self.ast.types.in_order() {
            let Some(underlying) = &type_.underlying_c_type else {
                continue;
            };
            if underlying == &type_.keyword {
                continue;
            }
            code.push_str(&format!("typedef {underlying} {};\n", type_.keyword));
        }
        code
    }

    /// `classes.h`: forward declaration, struct body, lifecycle functions
    /// and methods for every class, in source order
    fn generate_classes_h(&self) -> String {
        let mut code = String::from("#pragma once\n\n#include \"types.h\"\n\n");
        for statement in &self.ast.statements {
            let StatementKind::Class(class) = &statement.kind else {
                continue;
            };
            let name = class.type_.c_name();

            code.push_str(&format!("typedef struct {name}_struct {name};\n"));
            code.push_str(&format!("struct {name}_struct {{\n"));
            for field in &class.fields {
                let StatementKind::VarDecl(decl) = &field.kind else {
                    unreachable!("internal compiler error, class field is not a var decl!");
                };
                code.push_str(&format!("{} {};\n", decl.type_.c_name(), decl.name));
            }
            code.push_str("};\n");

            // every class gets lifecycle functions, empty ones when the
            // source declares none
            match &class.constructor {
                Some(constructor) => {
                    code.push_str(&constructor.c_code(LifecycleKind::Constructor));
                }
                None => code.push_str(&format!("void {name}_constructor({name}* this) {{\n}}")),
            }
            code.push('\n');
            match &class.destructor {
                Some(destructor) => code.push_str(&destructor.c_code(LifecycleKind::Destructor)),
                None => code.push_str(&format!("void {name}_destructor({name}* this) {{\n}}")),
            }
            code.push('\n');

            for method in &class.methods {
                code.push_str(&method.c_code_with_this(Some(&class.type_)));
                code.push('\n');
            }
        }
        code
    }

    /// `functions.h`: forward declarations first, then the definitions
    fn generate_functions_h(&self) -> String {
        let mut code = String::from("#pragma once\n\n#include \"classes.h\"\n#include \"types.h\"\n\n");
        let functions: Vec<_> = self
            .ast
            .statements
            .iter()
            .filter_map(|statement| match &statement.kind {
                StatementKind::Function(function) => Some(function),
                _ => None,
            })
            .collect();

        for function in &functions {
            code.push_str(&function.c_declaration());
            code.push('\n');
        }
        if !functions.is_empty() {
            code.push('\n');
        }
        for function in &functions {
            code.push_str(&function.c_code());
            code.push('\n');
        }
        code
    }

    /// `main.c`: includes, list instantiations, and a `main` wrapping all
    /// top-level non-class, non-function statements
    fn generate_main_c(&self) -> String {
        let mut code = String::from("#include <stdio.h>\n\n");
        code.push_str(&format!("#include \"{HEADERS_DIR}/types.h\"\n"));
        code.push_str(&format!("#include \"{HEADERS_DIR}/list.h\"\n"));

        // instantiate the list runtime once per interned list type; the
        // interning order guarantees inner lists come first
        let list_types = self.ast.types.list_types();
        if !list_types.is_empty() {
            code.push('\n');
            for list_type in &list_types {
                let element = list_type
                    .list_element()
                    .unwrap_or_else(|| {
                        unreachable!("internal compiler error, list type without element!")
                    });
                code.push_str(&format!("TAPL_DECLARE_LIST({})\n", element.c_name()));
            }
        }

        code.push('\n');
        code.push_str(&format!("#include \"{HEADERS_DIR}/classes.h\"\n"));
        code.push_str(&format!("#include \"{HEADERS_DIR}/functions.h\"\n"));

        code.push_str("\nint main(int argc, char** argv) {\n");
        for statement in &self.ast.statements {
            if matches!(
                statement.kind,
                StatementKind::Class(_) | StatementKind::Function(_)
            ) {
                continue;
            }
            code.push_str(&statement.to_c());
            code.push('\n');
        }
        code.push_str("return 0;\n}\n");
        code
    }
}

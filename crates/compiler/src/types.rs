//! Type system for TAPL
//!
//! Built-in scalar types, user-declared class types and parametric list
//! types, plus the promotion lattice between scalars of the same kind
//! (`u1 -> u8 -> u16 -> u32 -> u64`, `s8 -> .. -> s64`, `f32 -> f64`).
//! `Type` values are immutable after creation and shared by reference;
//! the [`Types`] registry owns one entry per distinct keyword for the
//! lifetime of a compilation.

use std::collections::HashMap;
use std::rc::Rc;

/// Kind of a scalar numeric type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    Signed,
    Unsigned,
    FloatingPoint,
}

/// The shape of a type
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Void,
    /// A sized numeric type
    Scalar { kind: NumericKind, bits: u32 },
    /// The type of a numeric literal before context refines it;
    /// unifies with any scalar
    Base,
    /// Single character, printed with %c
    Character,
    /// Unparameterized string type
    Str,
    /// User-declared class
    Class,
    /// Parametric list over an element type
    List { element: Rc<Type> },
}

/// A language type, identified by its canonical keyword
#[derive(Debug, Clone)]
pub struct Type {
    /// Canonical name, e.g. `u16`, `string`, `MyClass`, `list[u8]`
    pub keyword: String,
    /// Alternative spellings accepted by the tokenizer, e.g. `bool` for `u1`
    pub aliases: Vec<String>,
    /// C spelling for built-ins, absent for user types
    pub underlying_c_type: Option<String>,
    pub kind: TypeKind,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.keyword == other.keyword
    }
}

impl Type {
    fn scalar(keyword: &str, kind: NumericKind, bits: u32, underlying: &str) -> Type {
        Type {
            keyword: keyword.to_string(),
            aliases: Vec::new(),
            underlying_c_type: Some(underlying.to_string()),
            kind: TypeKind::Scalar { kind, bits },
        }
    }

    /// The scalar kind and bit width, for promotion and range checks
    pub fn scalar_info(&self) -> Option<(NumericKind, u32)> {
        match self.kind {
            TypeKind::Scalar { kind, bits } => Some((kind, bits)),
            _ => None,
        }
    }

    /// Whether the type participates in numeric checking (scalars and the
    /// literal base type; `char` deliberately does not)
    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, TypeKind::Scalar { .. } | TypeKind::Base)
    }

    pub fn is_base(&self) -> bool {
        matches!(self.kind, TypeKind::Base)
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Void)
    }

    pub fn is_class(&self) -> bool {
        matches!(self.kind, TypeKind::Class)
    }

    pub fn is_list(&self) -> bool {
        matches!(self.kind, TypeKind::List { .. })
    }

    /// The element type of a list type
    pub fn list_element(&self) -> Option<&Rc<Type>> {
        match &self.kind {
            TypeKind::List { element } => Some(element),
            _ => None,
        }
    }

    /// Whether this type can be promoted to (or already is) `other`
    pub fn can_promote_to(&self, other: &Type) -> bool {
        if self.keyword == other.keyword {
            return true;
        }
        match (self.scalar_info(), other.scalar_info()) {
            (Some((kind, bits)), Some((other_kind, other_bits))) => {
                kind == other_kind && bits < other_bits
            }
            _ => false,
        }
    }

    /// C spelling usable as an identifier part: the keyword itself, except
    /// for list types where the brackets are flattened (`list[u8]` -> `list_u8`)
    pub fn c_name(&self) -> String {
        self.keyword.replace('[', "_").replace(']', "")
    }

    /// The printf conversion for a value of this type, selected after the
    /// typing pass has run
    pub fn format_specifier(&self) -> Option<String> {
        match self.kind {
            TypeKind::Character => Some("%c".to_string()),
            TypeKind::Str => Some("%s".to_string()),
            TypeKind::Base => Some("%d".to_string()),
            TypeKind::Scalar { kind, bits } => {
                let long = if bits > 32 { "l" } else { "" };
                let conversion = match kind {
                    NumericKind::Signed => "d",
                    NumericKind::Unsigned => "u",
                    NumericKind::FloatingPoint => "f",
                };
                Some(format!("%{long}{conversion}"))
            }
            _ => None,
        }
    }
}

/// Registry of every type known to one compilation, keyed by canonical
/// keyword and by alias
#[derive(Debug, Clone)]
pub struct Types {
    by_keyword: HashMap<String, Rc<Type>>,
    /// Distinct types in registration order, for deterministic emission
    order: Vec<Rc<Type>>,
}

impl Default for Types {
    fn default() -> Self {
        Self::new()
    }
}

impl Types {
    /// A registry populated with the built-in types
    pub fn new() -> Self {
        let mut types = Types {
            by_keyword: HashMap::new(),
            order: Vec::new(),
        };

        types.insert(Type {
            keyword: "void".to_string(),
            aliases: Vec::new(),
            underlying_c_type: Some("void".to_string()),
            kind: TypeKind::Void,
        });
        types.insert(Type {
            keyword: "u1".to_string(),
            aliases: vec!["bool".to_string()],
            underlying_c_type: Some("bool".to_string()),
            kind: TypeKind::Scalar {
                kind: NumericKind::Unsigned,
                bits: 1,
            },
        });
        types.insert(Type::scalar("u8", NumericKind::Unsigned, 8, "uint8_t"));
        types.insert(Type::scalar("u16", NumericKind::Unsigned, 16, "uint16_t"));
        types.insert(Type::scalar("u32", NumericKind::Unsigned, 32, "uint32_t"));
        types.insert(Type::scalar("u64", NumericKind::Unsigned, 64, "uint64_t"));
        types.insert(Type::scalar("s8", NumericKind::Signed, 8, "int8_t"));
        types.insert(Type::scalar("s16", NumericKind::Signed, 16, "int16_t"));
        types.insert(Type::scalar("s32", NumericKind::Signed, 32, "int32_t"));
        types.insert(Type::scalar("s64", NumericKind::Signed, 64, "int64_t"));
        types.insert(Type::scalar("f32", NumericKind::FloatingPoint, 32, "float"));
        types.insert(Type::scalar("f64", NumericKind::FloatingPoint, 64, "double"));
        types.insert(Type {
            keyword: "string".to_string(),
            aliases: Vec::new(),
            underlying_c_type: Some("char*".to_string()),
            kind: TypeKind::Str,
        });
        types.insert(Type {
            keyword: "char".to_string(),
            aliases: Vec::new(),
            underlying_c_type: Some("char".to_string()),
            kind: TypeKind::Character,
        });
        // the literal base type unifies with any scalar during checking
        types.insert(Type {
            keyword: "base".to_string(),
            aliases: Vec::new(),
            underlying_c_type: None,
            kind: TypeKind::Base,
        });

        types
    }

    fn insert(&mut self, type_: Type) -> Rc<Type> {
        let type_ = Rc::new(type_);
        for keyword in std::iter::once(&type_.keyword).chain(type_.aliases.iter()) {
            let previous = self.by_keyword.insert(keyword.clone(), Rc::clone(&type_));
            assert!(
                previous.is_none(),
                "internal compiler error, duplicate type keyword '{keyword}'!"
            );
        }
        self.order.push(Rc::clone(&type_));
        type_
    }

    /// Register a user-declared class type; a repeated registration
    /// returns the existing entry
    pub fn add_class(&mut self, keyword: &str) -> Rc<Type> {
        if let Some(existing) = self.by_keyword.get(keyword) {
            return Rc::clone(existing);
        }
        self.insert(Type {
            keyword: keyword.to_string(),
            aliases: Vec::new(),
            underlying_c_type: None,
            kind: TypeKind::Class,
        })
    }

    /// Intern `list[element]`; repeated calls with the same element type
    /// return the same shared entry
    pub fn add_list_type(&mut self, element: &Rc<Type>) -> Rc<Type> {
        let keyword = format!("list[{}]", element.keyword);
        if let Some(existing) = self.by_keyword.get(&keyword) {
            return Rc::clone(existing);
        }
        self.insert(Type {
            keyword,
            aliases: Vec::new(),
            underlying_c_type: None,
            kind: TypeKind::List {
                element: Rc::clone(element),
            },
        })
    }

    /// Look up a type by canonical keyword or alias
    pub fn get(&self, keyword: &str) -> Option<&Rc<Type>> {
        self.by_keyword.get(keyword)
    }

    /// A built-in type that is always present
    pub fn builtin(&self, keyword: &str) -> Rc<Type> {
        match self.by_keyword.get(keyword) {
            Some(type_) => Rc::clone(type_),
            None => unreachable!("internal compiler error, missing builtin type '{keyword}'!"),
        }
    }

    /// Distinct registered types, in registration order
    pub fn in_order(&self) -> &[Rc<Type>] {
        &self.order
    }

    /// Interned list types in interning order (inner lists precede the
    /// outer lists that contain them)
    pub fn list_types(&self) -> Vec<Rc<Type>> {
        self.order.iter().filter(|t| t.is_list()).cloned().collect()
    }

    /// The parameter and return types of a built-in list method, or None
    /// when no such method exists
    pub fn list_method_signature(
        &self,
        list_type: &Rc<Type>,
        method: &str,
    ) -> Option<(Vec<Rc<Type>>, Rc<Type>)> {
        let element = Rc::clone(list_type.list_element()?);
        let u64_ = self.builtin("u64");
        let bool_ = self.builtin("u1");
        let void = self.builtin("void");
        match method {
            "size" => Some((vec![], u64_)),
            "add" => Some((vec![element], void)),
            "get" => Some((vec![u64_], element)),
            "set" => Some((vec![u64_, element], bool_)),
            "del" => Some((vec![u64_], bool_)),
            "insert" => Some((vec![u64_, element], bool_)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_resolves_to_same_type() {
        let types = Types::new();
        let u1 = types.get("u1").unwrap();
        let bool_ = types.get("bool").unwrap();
        assert!(Rc::ptr_eq(u1, bool_));
    }

    #[test]
    fn test_promotion_within_kind() {
        let types = Types::new();
        assert!(types.builtin("u1").can_promote_to(&types.builtin("u8")));
        assert!(types.builtin("u8").can_promote_to(&types.builtin("u64")));
        assert!(types.builtin("s8").can_promote_to(&types.builtin("s16")));
        assert!(types.builtin("f32").can_promote_to(&types.builtin("f64")));
        // reflexive
        assert!(types.builtin("u8").can_promote_to(&types.builtin("u8")));
    }

    #[test]
    fn test_no_cross_kind_promotion() {
        let types = Types::new();
        assert!(!types.builtin("u8").can_promote_to(&types.builtin("s16")));
        assert!(!types.builtin("s8").can_promote_to(&types.builtin("u16")));
        assert!(!types.builtin("u32").can_promote_to(&types.builtin("f64")));
        assert!(!types.builtin("u64").can_promote_to(&types.builtin("u8")));
    }

    #[test]
    fn test_list_type_interning() {
        let mut types = Types::new();
        let u8_ = types.builtin("u8");
        let first = types.add_list_type(&u8_);
        let second = types.add_list_type(&u8_);
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.keyword, "list[u8]");
        assert_eq!(types.list_types().len(), 1);
    }

    #[test]
    fn test_nested_list_c_name() {
        let mut types = Types::new();
        let u8_ = types.builtin("u8");
        let inner = types.add_list_type(&u8_);
        let outer = types.add_list_type(&inner);
        assert_eq!(inner.c_name(), "list_u8");
        assert_eq!(outer.c_name(), "list_list_u8");
        // inner was interned first
        assert_eq!(types.list_types()[0].keyword, "list[u8]");
    }

    #[test]
    fn test_class_registration_is_idempotent() {
        let mut types = Types::new();
        let first = types.add_class("Point");
        let second = types.add_class("Point");
        assert!(Rc::ptr_eq(&first, &second));
        assert!(first.is_class());
    }

    #[test]
    fn test_format_specifiers() {
        let types = Types::new();
        assert_eq!(types.builtin("u16").format_specifier().unwrap(), "%u");
        assert_eq!(types.builtin("u64").format_specifier().unwrap(), "%lu");
        assert_eq!(types.builtin("s64").format_specifier().unwrap(), "%ld");
        assert_eq!(types.builtin("f32").format_specifier().unwrap(), "%f");
        assert_eq!(types.builtin("f64").format_specifier().unwrap(), "%lf");
        assert_eq!(types.builtin("char").format_specifier().unwrap(), "%c");
        assert_eq!(types.builtin("string").format_specifier().unwrap(), "%s");
        assert_eq!(types.builtin("base").format_specifier().unwrap(), "%d");

        let mut types = Types::new();
        let point = types.add_class("Point");
        assert!(point.format_specifier().is_none());
    }

    #[test]
    fn test_list_method_signatures() {
        let mut types = Types::new();
        let u32_ = types.builtin("u32");
        let list = types.add_list_type(&u32_);

        let (params, ret) = types.list_method_signature(&list, "size").unwrap();
        assert!(params.is_empty());
        assert_eq!(ret.keyword, "u64");

        let (params, ret) = types.list_method_signature(&list, "add").unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].keyword, "u32");
        assert!(ret.is_void());

        let (params, ret) = types.list_method_signature(&list, "insert").unwrap();
        assert_eq!(params[0].keyword, "u64");
        assert_eq!(params[1].keyword, "u32");
        assert_eq!(ret.keyword, "u1");

        assert!(types.list_method_signature(&list, "bogus").is_none());
    }
}

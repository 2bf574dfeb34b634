//! Built-in front end for the supported `.capnp` subset
//!
//! Hand-rolled lexer + recursive-descent parser. Accepts file id headers,
//! aliased and bare imports, the `$Cxx.namespace("…")` annotation, structs
//! with anonymous union blocks and nested declarations, enums, and `const`
//! declarations (parsed and ignored). Declarations without an explicit
//! `@0x…` id get a deterministic FNV-1a id derived from their qualified
//! name, so ids are stable across runs.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PodgenError, Result};

use super::{
    EnumerantDecl, FieldDecl, FieldType, ImportDecl, PrimitiveKind, SchemaParser, SchemaTree,
    TypeBody, TypeDecl,
};

/// Parser for the supported Cap'n Proto schema subset
#[derive(Debug, Default)]
pub struct CapnpParser;

impl CapnpParser {
    pub fn new() -> Self {
        CapnpParser
    }
}

impl SchemaParser for CapnpParser {
    fn parse(
        &self,
        base_dir: &Path,
        relative_path: &Path,
        _search_paths: &[PathBuf],
    ) -> Result<SchemaTree> {
        let full = base_dir.join(relative_path);
        let text = fs::read_to_string(&full).map_err(|e| PodgenError::Parse {
            path: full.clone(),
            message: e.to_string(),
        })?;

        let file_key = relative_path.to_string_lossy().replace('\\', "/");
        parse_schema_text(&text, &file_key).map_err(|message| PodgenError::Parse {
            path: full,
            message,
        })
    }
}

/// Parse schema source text. `file_key` is the file's identity string, used
/// when deriving ids for declarations that omit them.
pub fn parse_schema_text(text: &str, file_key: &str) -> std::result::Result<SchemaTree, String> {
    let tokens = lex(text)?;
    let mut p = Parser {
        tokens: &tokens,
        pos: 0,
        file_key,
        scope: Vec::new(),
    };
    p.parse_file()
}

/// 64-bit FNV-1a over the qualified name; high bit forced like declared
/// schema ids so derived ids live in the same value space.
fn derive_id(qualified: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in qualified.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash | (1 << 63)
}

// =============================================================================
// Lexer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Number(u64),
    Str(String),
    Punct(char),
}

fn lex(text: &str) -> std::result::Result<Vec<Tok>, String> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            '#' => {
                // line comment
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Tok::Ident(ident));
            }
            c if c.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() {
                        digits.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = if let Some(hex) = digits.strip_prefix("0x") {
                    u64::from_str_radix(hex, 16)
                } else {
                    digits.parse()
                };
                let value = value.map_err(|_| format!("invalid number literal '{digits}'"))?;
                tokens.push(Tok::Number(value));
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(esc) => s.push(esc),
                            None => return Err("unterminated string literal".to_string()),
                        },
                        Some(c) => s.push(c),
                        None => return Err("unterminated string literal".to_string()),
                    }
                }
                tokens.push(Tok::Str(s));
            }
            '@' | ':' | ';' | '{' | '}' | '(' | ')' | '=' | '.' | '$' | ',' => {
                tokens.push(Tok::Punct(c));
                chars.next();
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }

    Ok(tokens)
}

// =============================================================================
// Parser
// =============================================================================

struct Parser<'a> {
    tokens: &'a [Tok],
    pos: usize,
    file_key: &'a str,
    /// Enclosing declaration names, for derived-id qualification
    scope: Vec<String>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> std::result::Result<&Tok, String> {
        let tok = self
            .tokens
            .get(self.pos)
            .ok_or_else(|| "unexpected end of file".to_string())?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect_punct(&mut self, c: char) -> std::result::Result<(), String> {
        match self.next()? {
            Tok::Punct(p) if *p == c => Ok(()),
            other => Err(format!("expected '{c}', found {other:?}")),
        }
    }

    fn expect_ident(&mut self) -> std::result::Result<String, String> {
        match self.next()? {
            Tok::Ident(name) => Ok(name.clone()),
            other => Err(format!("expected identifier, found {other:?}")),
        }
    }

    fn expect_number(&mut self) -> std::result::Result<u64, String> {
        match self.next()? {
            Tok::Number(n) => Ok(*n),
            other => Err(format!("expected number, found {other:?}")),
        }
    }

    fn expect_str(&mut self) -> std::result::Result<String, String> {
        match self.next()? {
            Tok::Str(s) => Ok(s.clone()),
            other => Err(format!("expected string literal, found {other:?}")),
        }
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if matches!(self.peek(), Some(Tok::Punct(p)) if *p == c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Qualified name of a declaration in the current scope, for derived ids
    fn qualify(&self, name: &str) -> String {
        let mut path = self.scope.join(".");
        if !path.is_empty() {
            path.push('.');
        }
        path.push_str(name);
        format!("{}:{}", self.file_key, path)
    }

    fn parse_file(&mut self) -> std::result::Result<SchemaTree, String> {
        let mut tree = SchemaTree {
            file_id: derive_id(self.file_key),
            namespace: String::new(),
            imports: Vec::new(),
            types: Vec::new(),
        };

        while let Some(tok) = self.peek() {
            match tok.clone() {
                Tok::Punct('@') => {
                    // file id header
                    self.pos += 1;
                    tree.file_id = self.expect_number()?;
                    self.expect_punct(';')?;
                }
                Tok::Punct('$') => {
                    self.pos += 1;
                    let _alias = self.expect_ident()?;
                    self.expect_punct('.')?;
                    let method = self.expect_ident()?;
                    self.expect_punct('(')?;
                    let value = self.expect_str()?;
                    self.expect_punct(')')?;
                    self.expect_punct(';')?;
                    if method == "namespace" {
                        tree.namespace = value;
                    }
                }
                Tok::Ident(kw) if kw == "using" => {
                    self.pos += 1;
                    let alias = self.expect_ident()?;
                    self.expect_punct('=')?;
                    match self.next()? {
                        Tok::Ident(kw) if kw == "import" => {}
                        other => return Err(format!("expected 'import', found {other:?}")),
                    }
                    let target = self.expect_str()?;
                    self.expect_punct(';')?;
                    tree.imports.push(ImportDecl {
                        alias: Some(alias),
                        target,
                    });
                }
                Tok::Ident(kw) if kw == "import" => {
                    self.pos += 1;
                    let target = self.expect_str()?;
                    self.expect_punct(';')?;
                    tree.imports.push(ImportDecl {
                        alias: None,
                        target,
                    });
                }
                Tok::Ident(kw) if kw == "const" => {
                    self.skip_to_semicolon()?;
                }
                Tok::Ident(kw) if kw == "struct" => {
                    self.pos += 1;
                    tree.types.push(self.parse_struct()?);
                }
                Tok::Ident(kw) if kw == "enum" => {
                    self.pos += 1;
                    tree.types.push(self.parse_enum()?);
                }
                other => return Err(format!("unexpected top-level token {other:?}")),
            }
        }

        Ok(tree)
    }

    fn skip_to_semicolon(&mut self) -> std::result::Result<(), String> {
        loop {
            match self.next()? {
                Tok::Punct(';') => return Ok(()),
                _ => continue,
            }
        }
    }

    /// Parse a struct body after the `struct` keyword has been consumed
    fn parse_struct(&mut self) -> std::result::Result<TypeDecl, String> {
        let name = self.expect_ident()?;
        let id = if self.eat_punct('@') {
            self.expect_number()?
        } else {
            derive_id(&self.qualify(&name))
        };

        self.expect_punct('{')?;
        self.scope.push(name.clone());

        let mut fields = Vec::new();
        let mut nested = Vec::new();
        let mut union_blocks = 0usize;

        loop {
            match self.peek() {
                Some(Tok::Punct('}')) => {
                    self.pos += 1;
                    break;
                }
                Some(Tok::Ident(kw)) if kw == "struct" => {
                    self.pos += 1;
                    nested.push(self.parse_struct()?);
                }
                Some(Tok::Ident(kw)) if kw == "enum" => {
                    self.pos += 1;
                    nested.push(self.parse_enum()?);
                }
                Some(Tok::Ident(kw)) if kw == "const" => {
                    self.skip_to_semicolon()?;
                }
                Some(Tok::Ident(kw)) if kw == "union" => {
                    self.pos += 1;
                    let block = union_blocks;
                    union_blocks += 1;
                    self.expect_punct('{')?;
                    loop {
                        match self.peek() {
                            Some(Tok::Punct('}')) => {
                                self.pos += 1;
                                break;
                            }
                            Some(Tok::Ident(kw)) if kw == "union" => {
                                return Err(format!(
                                    "nested union groups are not supported in struct {name}"
                                ));
                            }
                            Some(_) => {
                                let mut field = self.parse_field()?;
                                field.union_block = Some(block);
                                fields.push(field);
                            }
                            None => return Err("unexpected end of file".to_string()),
                        }
                    }
                }
                Some(_) => {
                    fields.push(self.parse_field()?);
                }
                None => return Err("unexpected end of file".to_string()),
            }
        }

        self.scope.pop();

        Ok(TypeDecl {
            name,
            id,
            body: TypeBody::Struct {
                fields,
                union_blocks,
            },
            nested,
        })
    }

    fn parse_field(&mut self) -> std::result::Result<FieldDecl, String> {
        let name = self.expect_ident()?;
        self.expect_punct('@')?;
        let ordinal = self.expect_ordinal()?;
        self.expect_punct(':')?;
        let ty = self.parse_type()?;
        self.expect_punct(';')?;

        Ok(FieldDecl {
            name,
            ordinal,
            ty,
            union_block: None,
        })
    }

    fn expect_ordinal(&mut self) -> std::result::Result<u16, String> {
        let ordinal = self.expect_number()?;
        u16::try_from(ordinal).map_err(|_| format!("ordinal @{ordinal} out of range"))
    }

    fn parse_type(&mut self) -> std::result::Result<FieldType, String> {
        let head = self.expect_ident()?;

        if head == "List" {
            self.expect_punct('(')?;
            let inner = self.parse_type()?;
            self.expect_punct(')')?;
            return Ok(FieldType::List(Box::new(inner)));
        }

        if let Some(prim) = PrimitiveKind::from_name(&head) {
            return Ok(FieldType::Primitive(prim));
        }

        let mut path = head;
        while self.eat_punct('.') {
            path.push('.');
            path.push_str(&self.expect_ident()?);
        }
        Ok(FieldType::Named(path))
    }

    /// Parse an enum body after the `enum` keyword has been consumed
    fn parse_enum(&mut self) -> std::result::Result<TypeDecl, String> {
        let name = self.expect_ident()?;
        let id = if self.eat_punct('@') {
            self.expect_number()?
        } else {
            derive_id(&self.qualify(&name))
        };

        self.expect_punct('{')?;
        let mut enumerants = Vec::new();
        loop {
            match self.peek() {
                Some(Tok::Punct('}')) => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    let variant = self.expect_ident()?;
                    self.expect_punct('@')?;
                    let ordinal = self.expect_ordinal()?;
                    self.expect_punct(';')?;
                    enumerants.push(EnumerantDecl {
                        name: variant,
                        ordinal,
                    });
                }
                None => return Err("unexpected end of file".to_string()),
            }
        }

        Ok(TypeDecl {
            name,
            id,
            body: TypeBody::Enum { enumerants },
            nested: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        @0xdeadbeefcafe0001;

        using Cxx = import "/capnp/c++.capnp";
        $Cxx.namespace("demo::msg");

        using Geo = import "../geo/point.capnp";
        import "helper.capnp";

        const maxEntries :UInt32 = 64;

        struct Person {
            name @0 :Text;
            age @1 :UInt8;
            home @2 :Geo.Point;
            tags @3 :List(Text);

            union {
                email @4 :Text;
                phone @5 :Text;
            }

            struct Job {
                title @0 :Text;
            }

            enum Mood {
                happy @0;
                grumpy @1;
            }
        }

        enum Color @0xdeadbeefcafe0002 {
            red @0;
            green @1;
            blue @2;
        }
    "#;

    #[test]
    fn test_file_header_and_namespace() {
        let tree = parse_schema_text(SAMPLE, "people.capnp").unwrap();
        assert_eq!(tree.file_id, 0xdeadbeefcafe0001);
        assert_eq!(tree.namespace, "demo::msg");
    }

    #[test]
    fn test_imports() {
        let tree = parse_schema_text(SAMPLE, "people.capnp").unwrap();
        assert_eq!(tree.imports.len(), 3);
        assert_eq!(tree.imports[0].alias.as_deref(), Some("Cxx"));
        assert_eq!(tree.imports[0].target, "/capnp/c++.capnp");
        assert_eq!(tree.imports[1].alias.as_deref(), Some("Geo"));
        assert_eq!(tree.imports[1].target, "../geo/point.capnp");
        assert_eq!(tree.imports[2].alias, None);
        assert_eq!(tree.imports[2].target, "helper.capnp");
    }

    #[test]
    fn test_struct_fields_in_declaration_order() {
        let tree = parse_schema_text(SAMPLE, "people.capnp").unwrap();
        let person = &tree.types[0];
        assert_eq!(person.name, "Person");

        match &person.body {
            TypeBody::Struct {
                fields,
                union_blocks,
            } => {
                let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
                assert_eq!(names, vec!["name", "age", "home", "tags", "email", "phone"]);
                assert_eq!(*union_blocks, 1);
                assert_eq!(fields[4].union_block, Some(0));
                assert_eq!(fields[5].union_block, Some(0));
                assert_eq!(fields[0].union_block, None);
            }
            _ => panic!("Person should be a struct"),
        }
    }

    #[test]
    fn test_field_types() {
        let tree = parse_schema_text(SAMPLE, "people.capnp").unwrap();
        let person = &tree.types[0];
        let fields = match &person.body {
            TypeBody::Struct { fields, .. } => fields,
            _ => panic!("expected struct"),
        };

        assert_eq!(fields[0].ty, FieldType::Primitive(PrimitiveKind::Text));
        assert_eq!(fields[1].ty, FieldType::Primitive(PrimitiveKind::UInt8));
        assert_eq!(fields[2].ty, FieldType::Named("Geo.Point".to_string()));
        assert_eq!(
            fields[3].ty,
            FieldType::List(Box::new(FieldType::Primitive(PrimitiveKind::Text)))
        );
    }

    #[test]
    fn test_nested_declarations() {
        let tree = parse_schema_text(SAMPLE, "people.capnp").unwrap();
        let person = &tree.types[0];
        assert_eq!(person.nested.len(), 2);
        assert_eq!(person.nested[0].name, "Job");
        assert!(person.nested[0].is_struct());
        assert_eq!(person.nested[1].name, "Mood");
    }

    #[test]
    fn test_enum_with_declared_id() {
        let tree = parse_schema_text(SAMPLE, "people.capnp").unwrap();
        let color = &tree.types[1];
        assert_eq!(color.id, 0xdeadbeefcafe0002);
        match &color.body {
            TypeBody::Enum { enumerants } => {
                let names: Vec<&str> = enumerants.iter().map(|e| e.name.as_str()).collect();
                assert_eq!(names, vec!["red", "green", "blue"]);
                assert_eq!(enumerants[2].ordinal, 2);
            }
            _ => panic!("Color should be an enum"),
        }
    }

    #[test]
    fn test_derived_ids_are_stable_and_distinct() {
        let a = parse_schema_text("struct Foo { x @0 :Bool; }", "a.capnp").unwrap();
        let b = parse_schema_text("struct Foo { x @0 :Bool; }", "a.capnp").unwrap();
        let c = parse_schema_text("struct Foo { x @0 :Bool; }", "c.capnp").unwrap();

        assert_eq!(a.types[0].id, b.types[0].id);
        assert_ne!(a.types[0].id, c.types[0].id);
        // derived ids share the declared-id value space (high bit set)
        assert!(a.types[0].id & (1 << 63) != 0);
    }

    #[test]
    fn test_two_union_blocks_counted() {
        let src = r#"
            struct Odd {
                union { a @0 :Bool; b @1 :Bool; }
                middle @2 :Text;
                union { c @3 :Bool; d @4 :Bool; }
            }
        "#;
        let tree = parse_schema_text(src, "odd.capnp").unwrap();
        match &tree.types[0].body {
            TypeBody::Struct { union_blocks, fields } => {
                assert_eq!(*union_blocks, 2);
                assert_eq!(fields[0].union_block, Some(0));
                assert_eq!(fields[3].union_block, Some(1));
            }
            _ => panic!("expected struct"),
        }
    }

    #[test]
    fn test_parse_error_is_a_value() {
        let err = parse_schema_text("struct {", "bad.capnp").unwrap_err();
        assert!(err.contains("expected identifier"), "got: {err}");
    }

    #[test]
    fn test_out_of_range_ordinal_rejected() {
        let err = parse_schema_text("struct S { x @70000 :Bool; }", "s.capnp").unwrap_err();
        assert!(err.contains("out of range"), "got: {err}");

        let err = parse_schema_text("enum E { big @100000; }", "e.capnp").unwrap_err();
        assert!(err.contains("out of range"), "got: {err}");
    }
}

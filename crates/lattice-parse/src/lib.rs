//! lattice-parse - structural parser collaborator for lattice
//!
//! Tree-sitter based extraction of named constructs (functions, structs,
//! classes) from source files, with a blake3 content fingerprint per
//! construct. The fingerprint covers the construct's token stream with
//! comments stripped and whitespace collapsed, so formatting-only edits do
//! not change it.
//!
//! This crate is the concrete implementation of
//! [`lattice_core::StructuralParser`]; the validation core never links a
//! grammar itself.

use arborium::tree_sitter::{Node, Parser};
use eyre::{Result, eyre};
use lattice_core::{Construct, StructuralParser, StructureNode};
use std::ffi::OsStr;
use std::path::Path;

/// File extensions the parser understands.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "rs",  // Rust
    "py",  // Python
    "ts",  // TypeScript
    "tsx", // TypeScript JSX
    "js",  // JavaScript
    "jsx", // JavaScript JSX
    "go",  // Go
    "c",   // C
    "h",   // C headers
    "cpp", // C++
    "cc",  // C++
    "cxx", // C++
    "hpp", // C++ headers
];

/// Check if a file extension is supported for structural parsing
pub fn is_supported_extension(ext: &OsStr) -> bool {
    ext.to_str()
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

/// How a tree-sitter node contributes to a structure node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConstructKind {
    /// Callable: recorded under `outputs`.
    Callable,
    /// Data declaration: recorded under `data`.
    Data,
}

type KindMapper = fn(&str) -> Option<ConstructKind>;

/// Structural parser over the arborium grammar set.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeParser;

impl TreeParser {
    pub fn new() -> Self {
        Self
    }
}

impl StructuralParser for TreeParser {
    fn parse(&self, content: &str, module_name: &str, file_path: &str) -> Result<StructureNode> {
        let ext = Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let (language, mapper) = grammar_for(ext).ok_or_else(|| {
            eyre!("Unsupported file extension for structural parsing: {file_path}")
        })?;

        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| eyre!("Failed to load grammar for {file_path}: {e}"))?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| eyre!("Failed to parse {file_path}"))?;

        let mut node = StructureNode {
            id: module_name.to_string(),
            file_path: file_path.to_string(),
            ..Default::default()
        };
        collect_constructs(content, tree.root_node(), mapper, &mut node);
        Ok(node)
    }

    fn extract_construct(&self, content: &str, construct_name: &str) -> Option<String> {
        // Bare content carries no language hint; try each grammar until one
        // yields the named construct.
        for ext in ["rs", "py", "ts", "go", "cpp"] {
            let Some((language, mapper)) = grammar_for(ext) else {
                continue;
            };
            let mut parser = Parser::new();
            if parser.set_language(&language).is_err() {
                continue;
            }
            let Some(tree) = parser.parse(content, None) else {
                continue;
            };
            if let Some(slice) = find_slice(content, tree.root_node(), mapper, construct_name) {
                return Some(slice);
            }
        }
        None
    }
}

fn grammar_for(ext: &str) -> Option<(arborium::tree_sitter::Language, KindMapper)> {
    match ext {
        "rs" => Some((arborium_rust::language().into(), rust_kind as KindMapper)),
        "py" => Some((arborium_python::language().into(), python_kind as KindMapper)),
        "ts" | "tsx" | "js" | "jsx" => Some((
            arborium_typescript::language().into(),
            typescript_kind as KindMapper,
        )),
        "go" => Some((arborium_go::language().into(), go_kind as KindMapper)),
        "c" | "h" | "cpp" | "cc" | "cxx" | "hpp" => {
            Some((arborium_cpp::language().into(), cpp_kind as KindMapper))
        }
        _ => None,
    }
}

// Language-specific node kind mappings

fn rust_kind(kind: &str) -> Option<ConstructKind> {
    match kind {
        "function_item" => Some(ConstructKind::Callable),
        "struct_item" | "enum_item" | "trait_item" | "type_item" => Some(ConstructKind::Data),
        _ => None,
    }
}

fn python_kind(kind: &str) -> Option<ConstructKind> {
    match kind {
        "function_definition" => Some(ConstructKind::Callable),
        "class_definition" => Some(ConstructKind::Data),
        _ => None,
    }
}

fn typescript_kind(kind: &str) -> Option<ConstructKind> {
    match kind {
        "function_declaration" | "method_definition" => Some(ConstructKind::Callable),
        "class_declaration" | "interface_declaration" | "type_alias_declaration"
        | "enum_declaration" => Some(ConstructKind::Data),
        _ => None,
    }
}

fn go_kind(kind: &str) -> Option<ConstructKind> {
    match kind {
        "function_declaration" | "method_declaration" => Some(ConstructKind::Callable),
        "type_declaration" => Some(ConstructKind::Data),
        _ => None,
    }
}

fn cpp_kind(kind: &str) -> Option<ConstructKind> {
    match kind {
        "function_definition" => Some(ConstructKind::Callable),
        "struct_specifier" | "class_specifier" | "enum_specifier" | "union_specifier" => {
            Some(ConstructKind::Data)
        }
        _ => None,
    }
}

/// Walk the tree collecting every named construct into a flat node.
/// Methods inside impl blocks and nested functions land in the same file
/// node; `children` stays empty.
fn collect_constructs(source: &str, node: Node, mapper: KindMapper, out: &mut StructureNode) {
    if let Some(kind) = mapper(node.kind()) {
        if let Some(name) = node_name(source, node) {
            let construct = Construct {
                name,
                fingerprint: Some(fingerprint(source, node)),
            };
            match kind {
                ConstructKind::Callable => out.outputs.push(construct),
                ConstructKind::Data => out.data.push(construct),
            }
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_constructs(source, child, mapper, out);
    }
}

/// Find the literal source slice of the named construct.
fn find_slice(source: &str, node: Node, mapper: KindMapper, name: &str) -> Option<String> {
    if mapper(node.kind()).is_some() && node_name(source, node).as_deref() == Some(name) {
        return Some(source[node.byte_range()].to_string());
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(slice) = find_slice(source, child, mapper, name) {
            return Some(slice);
        }
    }
    None
}

/// Pull the identifier out of a declaration node. Most grammars expose it
/// as the `name` field; C/C++ bury it inside a declarator chain.
fn node_name(source: &str, node: Node) -> Option<String> {
    let name_node = node
        .child_by_field_name("name")
        .or_else(|| {
            node.child_by_field_name("declarator")
                .and_then(declarator_name)
        })
        .or_else(|| {
            let mut cursor = node.walk();
            node.children(&mut cursor)
                .find(|c| c.kind() == "identifier" || c.kind() == "type_identifier")
        })?;
    Some(source[name_node.byte_range()].to_string())
}

/// Unwrap C/C++ declarator chains down to the identifier node.
fn declarator_name(node: Node) -> Option<Node> {
    if matches!(
        node.kind(),
        "identifier" | "field_identifier" | "type_identifier"
    ) {
        return Some(node);
    }
    if let Some(inner) = node.child_by_field_name("declarator") {
        return declarator_name(inner);
    }
    let mut cursor = node.walk();
    node.children(&mut cursor).find_map(declarator_name)
}

/// Fingerprint a construct: blake3 over its token stream with comments
/// stripped, so renames of surrounding code and formatting-only edits do
/// not change the hash.
fn fingerprint(source: &str, node: Node) -> String {
    let mut hasher = blake3::Hasher::new();
    hash_tokens(source, node, &mut hasher);
    hasher.finalize().to_hex().to_string()
}

fn hash_tokens(source: &str, node: Node, hasher: &mut blake3::Hasher) {
    if node.kind().contains("comment") {
        return;
    }
    if node.child_count() == 0 {
        hasher.update(source[node.byte_range()].as_bytes());
        hasher.update(b" ");
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        hash_tokens(source, child, hasher);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str, file: &str) -> StructureNode {
        TreeParser::new().parse(content, "test", file).unwrap()
    }

    fn construct_fingerprint(node: &StructureNode, name: &str) -> String {
        node.declared_construct(name)
            .and_then(|c| c.fingerprint.clone())
            .expect("construct with fingerprint")
    }

    #[test]
    fn extracts_rust_functions_and_types() {
        let node = parse(
            r#"
pub struct Session {
    token: String,
}

pub fn login(name: &str) -> Session {
    Session { token: name.to_string() }
}

impl Session {
    pub fn refresh(&mut self) {}
}
"#,
            "src/auth.rs",
        );

        let output_names: Vec<&str> = node.outputs.iter().map(|c| c.name.as_str()).collect();
        let data_names: Vec<&str> = node.data.iter().map(|c| c.name.as_str()).collect();
        assert!(output_names.contains(&"login"));
        assert!(output_names.contains(&"refresh"));
        assert_eq!(data_names, vec!["Session"]);
    }

    #[test]
    fn extracts_python_functions_and_classes() {
        let node = parse(
            "class Session:\n    pass\n\ndef login(name):\n    return Session()\n",
            "auth.py",
        );

        assert!(node.outputs.iter().any(|c| c.name == "login"));
        assert!(node.data.iter().any(|c| c.name == "Session"));
    }

    #[test]
    fn extracts_typescript_declarations() {
        let node = parse(
            "interface Session { token: string }\n\nfunction login(name: string): Session {\n    return { token: name };\n}\n",
            "auth.ts",
        );

        assert!(node.outputs.iter().any(|c| c.name == "login"));
        assert!(node.data.iter().any(|c| c.name == "Session"));
    }

    #[test]
    fn fingerprint_is_stable_across_cosmetic_edits() {
        let original = "pub fn login(name: &str) -> bool {\n    name == \"admin\"\n}\n";
        let reformatted =
            "// checks the operator name\npub fn login(name: &str) -> bool { name == \"admin\" }\n";

        let a = construct_fingerprint(&parse(original, "a.rs"), "login");
        let b = construct_fingerprint(&parse(reformatted, "b.rs"), "login");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_changes_with_logic() {
        let original = "pub fn login(name: &str) -> bool {\n    name == \"admin\"\n}\n";
        let changed = "pub fn login(name: &str) -> bool {\n    name == \"root\"\n}\n";

        let a = construct_fingerprint(&parse(original, "a.rs"), "login");
        let b = construct_fingerprint(&parse(changed, "b.rs"), "login");
        assert_ne!(a, b);
    }

    #[test]
    fn unsupported_extension_is_an_error() {
        assert!(TreeParser::new().parse("body", "doc", "notes.md").is_err());
    }

    #[test]
    fn extract_construct_returns_the_source_slice() {
        let content = "pub struct Session;\n\npub fn login() {\n    let _ = 1;\n}\n";
        let slice = TreeParser::new()
            .extract_construct(content, "login")
            .expect("construct slice");
        assert!(slice.starts_with("pub fn login()"));
        assert!(slice.ends_with('}'));
    }

    #[test]
    fn extract_construct_misses_unknown_names() {
        let content = "pub fn login() {}\n";
        assert!(
            TreeParser::new()
                .extract_construct(content, "logout")
                .is_none()
        );
    }

    #[test]
    fn supported_extensions_cover_the_language_enum() {
        use std::ffi::OsStr;
        for ext in ["rs", "py", "ts", "js", "go", "cpp"] {
            assert!(is_supported_extension(OsStr::new(ext)), "{ext} unsupported");
        }
        assert!(!is_supported_extension(OsStr::new("md")));
    }
}

//! Tag injection: make a target file physically match its expectation

use crate::store::{Target, Workspace};
use tracing::{debug, warn};

/// Keywords that open a construct declaration in the supported languages.
const DECLARATION_KEYWORDS: &[&str] = &[
    "fn",
    "struct",
    "enum",
    "trait",
    "type",
    "class",
    "def",
    "func",
    "function",
    "interface",
];

/// Qualifiers that may precede a declaration keyword.
const DECLARATION_QUALIFIERS: &[&str] = &[
    "pub", "export", "public", "private", "protected", "static", "async", "unsafe", "const",
];

/// Inserts traceability tags into target files.
pub struct TagInjector<'a> {
    workspace: &'a Workspace,
}

impl<'a> TagInjector<'a> {
    pub fn new(workspace: &'a Workspace) -> Self {
        Self { workspace }
    }

    /// Insert the tag line for `target` into its file, immediately above
    /// the declaration of `construct_name` when one can be found, at the
    /// top of the file otherwise.
    ///
    /// Returns true when the tag is present after the call (including the
    /// already-present case); false only when the file cannot be read.
    /// Idempotent: a tag that already exists anywhere in the file is never
    /// written twice. The write is a whole-file overwrite with no partial-
    /// write recovery.
    pub fn inject(&self, target: &Target, source_ids: &[String]) -> bool {
        let path = self.workspace.resolve(&target.file_path);
        let Ok(content) = std::fs::read_to_string(&path) else {
            debug!("cannot inject into missing file {}", target.file_path);
            return false;
        };

        let tag = tag_line(target, source_ids);
        if content.contains(&tag) {
            return true;
        }

        let lines: Vec<&str> = content.lines().collect();
        let insert_at = target
            .construct_name
            .as_deref()
            .and_then(|name| lines.iter().position(|line| is_declaration(line, name)));

        let rewritten = match insert_at {
            Some(index) => {
                let mut rebuilt: Vec<&str> = Vec::with_capacity(lines.len() + 1);
                rebuilt.extend_from_slice(&lines[..index]);
                rebuilt.push(&tag);
                rebuilt.extend_from_slice(&lines[index..]);
                let mut out = rebuilt.join("\n");
                if content.ends_with('\n') {
                    out.push('\n');
                }
                out
            }
            None => format!("{tag}\n{content}"),
        };

        match std::fs::write(&path, rewritten) {
            Ok(()) => true,
            Err(e) => {
                warn!("failed to write tag into {}: {e}", target.file_path);
                false
            }
        }
    }
}

/// Compose the literal tag line: the pre-formatted expected tag when it
/// already carries a comment prefix, otherwise the language comment prefix
/// followed by `@MATRIX: ` and the comma-joined source ids.
fn tag_line(target: &Target, source_ids: &[String]) -> String {
    let expected = target.expected_tag.trim();
    if expected.starts_with("//") || expected.starts_with('#') {
        return expected.to_string();
    }
    format!(
        "{} @MATRIX: {}",
        target.language.comment_prefix(),
        source_ids.join(", ")
    )
}

/// Whether `line` opens the declaration of `construct_name`: optional
/// qualifiers, a declaration keyword, then the construct name.
fn is_declaration(line: &str, construct_name: &str) -> bool {
    let mut tokens = line.split_whitespace();
    let Some(mut token) = tokens.next() else {
        return false;
    };
    while is_qualifier(token) {
        match tokens.next() {
            Some(next) => token = next,
            None => return false,
        }
    }
    if !DECLARATION_KEYWORDS.contains(&token) {
        return false;
    }
    let Some(name_token) = tokens.next() else {
        return false;
    };
    let identifier: String = name_token
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    identifier == construct_name
}

fn is_qualifier(token: &str) -> bool {
    DECLARATION_QUALIFIERS
        .iter()
        .any(|q| token == *q || (token.starts_with(q) && token[q.len()..].starts_with('(')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Language;

    fn target(file: &str, construct: Option<&str>, language: Language, tag: &str) -> Target {
        Target {
            file_path: file.to_string(),
            construct_name: construct.map(str::to_string),
            language,
            expected_tag: tag.to_string(),
            expected_fingerprint: None,
        }
    }

    fn workspace_with(file: &str, content: &str) -> (tempfile::TempDir, Workspace) {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(file);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
        let workspace = Workspace::new(temp.path());
        (temp, workspace)
    }

    fn read(workspace: &Workspace, file: &str) -> String {
        std::fs::read_to_string(workspace.resolve(file)).unwrap()
    }

    #[test]
    fn returns_false_for_missing_file() {
        let temp = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(temp.path());
        let injector = TagInjector::new(&workspace);
        let t = target("src/gone.rs", None, Language::Rust, "@MATRIX: REQ-001");
        assert!(!injector.inject(&t, &["REQ-001".to_string()]));
    }

    #[test]
    fn inserts_above_the_declaration() {
        let (_temp, workspace) =
            workspace_with("src/auth.rs", "use std::fmt;\n\npub fn login() {\n}\n");
        let injector = TagInjector::new(&workspace);
        let t = target(
            "src/auth.rs",
            Some("login"),
            Language::Rust,
            "@MATRIX: REQ-001",
        );

        assert!(injector.inject(&t, &["REQ-001".to_string()]));
        let content = read(&workspace, "src/auth.rs");
        let lines: Vec<&str> = content.lines().collect();
        let decl = lines.iter().position(|l| l.contains("pub fn login")).unwrap();
        assert_eq!(lines[decl - 1], "// @MATRIX: REQ-001");
    }

    #[test]
    fn falls_back_to_file_top() {
        let (_temp, workspace) = workspace_with("src/auth.rs", "pub fn other() {}\n");
        let injector = TagInjector::new(&workspace);
        let t = target(
            "src/auth.rs",
            Some("login"),
            Language::Rust,
            "@MATRIX: REQ-001",
        );

        assert!(injector.inject(&t, &["REQ-001".to_string()]));
        let content = read(&workspace, "src/auth.rs");
        assert!(content.starts_with("// @MATRIX: REQ-001\n"));
    }

    #[test]
    fn injection_is_idempotent() {
        let (_temp, workspace) = workspace_with("src/auth.rs", "pub fn login() {}\n");
        let injector = TagInjector::new(&workspace);
        let t = target(
            "src/auth.rs",
            Some("login"),
            Language::Rust,
            "@MATRIX: REQ-001",
        );

        assert!(injector.inject(&t, &["REQ-001".to_string()]));
        assert!(injector.inject(&t, &["REQ-001".to_string()]));
        let content = read(&workspace, "src/auth.rs");
        assert_eq!(content.matches("@MATRIX: REQ-001").count(), 1);
    }

    #[test]
    fn python_targets_get_hash_comments() {
        let (_temp, workspace) = workspace_with("auth.py", "def login():\n    pass\n");
        let injector = TagInjector::new(&workspace);
        let t = target("auth.py", Some("login"), Language::Python, "@MATRIX: REQ-001");

        assert!(injector.inject(&t, &["REQ-001".to_string()]));
        let content = read(&workspace, "auth.py");
        assert!(content.starts_with("# @MATRIX: REQ-001\ndef login():"));
    }

    #[test]
    fn preformatted_tag_is_used_verbatim() {
        let (_temp, workspace) = workspace_with("src/auth.rs", "pub fn login() {}\n");
        let injector = TagInjector::new(&workspace);
        let t = target(
            "src/auth.rs",
            Some("login"),
            Language::Rust,
            "// @MATRIX: REQ-001, REQ-002",
        );

        assert!(injector.inject(&t, &[]));
        let content = read(&workspace, "src/auth.rs");
        assert!(content.starts_with("// @MATRIX: REQ-001, REQ-002\n"));
    }

    #[test]
    fn joins_multiple_source_ids() {
        let (_temp, workspace) = workspace_with("src/auth.rs", "fn login() {}\n");
        let injector = TagInjector::new(&workspace);
        let t = target("src/auth.rs", Some("login"), Language::Rust, "@MATRIX: ids");

        assert!(injector.inject(&t, &["REQ-001".to_string(), "REQ-002".to_string()]));
        let content = read(&workspace, "src/auth.rs");
        assert!(content.starts_with("// @MATRIX: REQ-001, REQ-002\n"));
    }

    #[test]
    fn declaration_matching_handles_qualifiers_and_generics() {
        assert!(is_declaration("pub fn login() {", "login"));
        assert!(is_declaration("pub(crate) async fn login() {", "login"));
        assert!(is_declaration("struct Session;", "Session"));
        assert!(is_declaration("export function render<T>(props: T) {", "render"));
        assert!(is_declaration("def login():", "login"));
        assert!(!is_declaration("fn logout() {", "login"));
        assert!(!is_declaration("// fn login looks like a comment", "login"));
        assert!(!is_declaration("login();", "login"));
    }
}

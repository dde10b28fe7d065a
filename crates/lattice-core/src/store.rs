//! The matrix store: persisted link state between requirements and code

use eyre::{Result, WrapErr};
use facet::Facet;
use std::path::{Path, PathBuf};

/// Directory under the workspace root holding lattice artifacts.
pub const LATTICE_DIR: &str = ".lattice";

/// Workspace artifact locations.
///
/// Everything lattice reads or writes lives under `.lattice/` at the
/// workspace root. The task tree, the decision map, and the structural
/// snapshot are produced by collaborating tools and only read here.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lattice_dir(&self) -> PathBuf {
        self.root.join(LATTICE_DIR)
    }

    /// The store document.
    pub fn store_path(&self) -> PathBuf {
        self.lattice_dir().join("matrix.json")
    }

    /// The structural snapshot exported by `lattice scan`.
    pub fn snapshot_path(&self) -> PathBuf {
        self.lattice_dir().join("structure.json")
    }

    /// The external task-tree document.
    pub fn tree_path(&self) -> PathBuf {
        self.lattice_dir().join("tree.json")
    }

    /// The external decision-rationale document.
    pub fn decisions_path(&self) -> PathBuf {
        self.lattice_dir().join("decisions.json")
    }

    /// Resolve a target path against the workspace root.
    pub fn resolve(&self, file_path: &str) -> PathBuf {
        let path = Path::new(file_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// Intended multiplicity of a link. Documentation only, never enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum Cardinality {
    #[facet(rename = "1:1")]
    OneToOne,
    #[facet(rename = "1:N")]
    OneToMany,
    #[facet(rename = "N:1")]
    ManyToOne,
    #[facet(rename = "N:M")]
    ManyToMany,
}

/// Derived health of a link, recomputed on every validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum LinkStatus {
    #[facet(rename = "VALID")]
    Valid,
    #[facet(rename = "BROKEN")]
    Broken,
    /// Reserved for the external bridging collaborator; nothing in this
    /// crate assigns it.
    #[facet(rename = "ORPHAN")]
    Orphan,
}

/// Source language of a target file, used to pick comment syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
#[repr(u8)]
#[facet(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Cpp,
    Python,
    Typescript,
    Javascript,
    Go,
}

impl Language {
    /// Line-comment prefix for tag injection.
    pub fn comment_prefix(&self) -> &'static str {
        match self {
            Language::Python => "#",
            _ => "//",
        }
    }

    /// Guess the language from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "rs" => Some(Language::Rust),
            "c" | "h" | "cpp" | "cc" | "cxx" | "hpp" => Some(Language::Cpp),
            "py" => Some(Language::Python),
            "ts" | "tsx" => Some(Language::Typescript),
            "js" | "jsx" => Some(Language::Javascript),
            "go" => Some(Language::Go),
            _ => None,
        }
    }
}

/// One physical location a link points at.
#[derive(Debug, Clone, Facet)]
pub struct Target {
    /// Absolute or workspace-relative path of the tracked file.
    pub file_path: String,
    /// Named construct within the file; `None` tracks the file as a whole.
    #[facet(default)]
    pub construct_name: Option<String>,
    pub language: Language,
    /// Exact line substring that must be present in the file,
    /// e.g. `@MATRIX: REQ-012`.
    pub expected_tag: String,
    /// Content fingerprint captured when the link was established. Only
    /// comparable against fingerprints from the same parser contract.
    #[facet(default)]
    pub expected_fingerprint: Option<String>,
}

/// A tracked relationship between requirement ids and code targets.
#[derive(Debug, Clone, Facet)]
pub struct Link {
    pub matrix_id: String,
    pub cardinality: Cardinality,
    /// Requirement identifiers. Never empty.
    pub sources: Vec<String>,
    /// Code locations. Never empty; order is preserved.
    pub targets: Vec<Target>,
    pub status: LinkStatus,
    /// RFC 3339 timestamp of the last validation pass.
    #[facet(default)]
    pub last_verified: Option<String>,
}

/// Orphan bookkeeping, populated by an external bridging collaborator.
/// Round-trips unchanged; nothing in this crate writes to it.
#[derive(Debug, Clone, Default, Facet)]
pub struct Orphans {
    #[facet(default)]
    pub unlinked_sources: Vec<String>,
    #[facet(default)]
    pub unlinked_tags: Vec<String>,
}

/// The persisted store document.
#[derive(Debug, Clone, Facet)]
pub struct Store {
    pub version: String,
    #[facet(default)]
    pub links: Vec<Link>,
    #[facet(default)]
    pub orphans: Orphans,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            links: Vec::new(),
            orphans: Orphans::default(),
        }
    }
}

impl Store {
    /// Parse a store from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        facet_json::from_str(json).wrap_err("Failed to parse matrix store JSON")
    }

    /// Load the store from a local file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read matrix store from {}", path.display()))?;
        Self::from_json(&content)
            .wrap_err_with(|| format!("Failed to parse matrix store from {}", path.display()))
    }

    /// Load the store, or start from an empty one when the document does
    /// not exist yet. A present-but-malformed store is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Serialize with stable field order and human-readable indentation.
    pub fn to_json(&self) -> Result<String> {
        facet_json::to_string_pretty(self).wrap_err("Failed to serialize matrix store")
    }

    /// Wholesale write of the store document, creating `.lattice/` when
    /// needed. There is no incremental patching and no lock: concurrent
    /// writers race and the last one wins.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = self.to_json()?;
        std::fs::write(path, json)
            .wrap_err_with(|| format!("Failed to write matrix store to {}", path.display()))
    }

    /// Number of links with the given status.
    pub fn count_status(&self, status: LinkStatus) -> usize {
        self.links.iter().filter(|l| l.status == status).count()
    }
}

/// RFC 3339 timestamp for `last_verified`.
pub fn timestamp_now() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> Store {
        Store {
            version: "1.0".to_string(),
            links: vec![Link {
                matrix_id: "MTX-001".to_string(),
                cardinality: Cardinality::OneToOne,
                sources: vec!["REQ-001".to_string()],
                targets: vec![Target {
                    file_path: "src/auth.rs".to_string(),
                    construct_name: Some("login".to_string()),
                    language: Language::Rust,
                    expected_tag: "@MATRIX: REQ-001".to_string(),
                    expected_fingerprint: Some("abc123".to_string()),
                }],
                status: LinkStatus::Broken,
                last_verified: None,
            }],
            orphans: Orphans {
                unlinked_sources: vec!["REQ-099".to_string()],
                unlinked_tags: vec!["@MATRIX: REQ-098".to_string()],
            },
        }
    }

    #[test]
    fn store_round_trips_with_orphans() {
        let store = sample_store();
        let json = store.to_json().unwrap();
        let parsed = Store::from_json(&json).unwrap();

        assert_eq!(parsed.version, "1.0");
        assert_eq!(parsed.links.len(), 1);
        assert_eq!(parsed.links[0].matrix_id, "MTX-001");
        assert_eq!(parsed.links[0].status, LinkStatus::Broken);
        assert_eq!(parsed.orphans.unlinked_sources, vec!["REQ-099"]);
        assert_eq!(parsed.orphans.unlinked_tags, vec!["@MATRIX: REQ-098"]);
    }

    #[test]
    fn enums_serialize_as_wire_strings() {
        let json = sample_store().to_json().unwrap();
        assert!(json.contains("\"1:1\""));
        assert!(json.contains("\"BROKEN\""));
        assert!(json.contains("\"rust\""));
    }

    #[test]
    fn load_or_default_on_missing_file() {
        let temp = tempfile::tempdir().unwrap();
        let store = Store::load_or_default(temp.path().join("matrix.json")).unwrap();
        assert!(store.links.is_empty());
        assert_eq!(store.version, "1.0");
    }

    #[test]
    fn load_fails_on_malformed_store() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("matrix.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Store::load_or_default(&path).is_err());
    }

    #[test]
    fn save_creates_lattice_dir() {
        let temp = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(temp.path());
        sample_store().save(workspace.store_path()).unwrap();
        assert!(workspace.store_path().exists());
    }

    #[test]
    fn workspace_resolves_relative_and_absolute() {
        let workspace = Workspace::new("/tmp/project");
        assert_eq!(
            workspace.resolve("src/lib.rs"),
            Path::new("/tmp/project/src/lib.rs")
        );
        assert_eq!(workspace.resolve("/etc/hosts"), Path::new("/etc/hosts"));
    }

    #[test]
    fn comment_prefix_per_language() {
        assert_eq!(Language::Python.comment_prefix(), "#");
        assert_eq!(Language::Rust.comment_prefix(), "//");
        assert_eq!(Language::Go.comment_prefix(), "//");
    }
}

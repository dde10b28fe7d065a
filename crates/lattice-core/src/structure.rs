//! Structural snapshot types and the parser seam

use eyre::{Result, WrapErr};
use facet::Facet;
use std::path::Path;

/// A named construct (callable or data declaration) with its content
/// fingerprint.
#[derive(Debug, Clone, Facet)]
pub struct Construct {
    pub name: String,
    /// Hash over the construct's normalized logic, stable across cosmetic
    /// edits. Only comparable within a single parser contract.
    #[facet(default)]
    pub fingerprint: Option<String>,
}

/// One parsed source file (or nested scope) in the snapshot.
#[derive(Debug, Clone, Default, Facet)]
pub struct StructureNode {
    pub id: String,
    pub file_path: String,
    /// Callable constructs (functions, methods).
    #[facet(default)]
    pub outputs: Vec<Construct>,
    /// Data constructs (structs, enums, classes, type aliases).
    #[facet(default)]
    pub data: Vec<Construct>,
    #[facet(default)]
    pub children: Vec<StructureNode>,
}

impl StructureNode {
    /// Non-recursive lookup among this node's own declarations: callable
    /// outputs first, then data.
    pub fn declared_construct(&self, name: &str) -> Option<&Construct> {
        self.outputs
            .iter()
            .chain(self.data.iter())
            .find(|c| c.name == name)
    }

    /// Recursive lookup through this node and its children.
    pub fn find_construct(&self, name: &str) -> Option<&Construct> {
        if let Some(found) = self.declared_construct(name) {
            return Some(found);
        }
        self.children
            .iter()
            .find_map(|child| child.find_construct(name))
    }
}

/// The workspace structural snapshot: every parsed file node.
#[derive(Debug, Clone, Default, Facet)]
pub struct Snapshot {
    #[facet(default)]
    pub nodes: Vec<StructureNode>,
}

impl Snapshot {
    /// Parse a snapshot from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        facet_json::from_str(json).wrap_err("Failed to parse structural snapshot JSON")
    }

    /// Load a snapshot from a local file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).wrap_err_with(|| {
            format!("Failed to read structural snapshot from {}", path.display())
        })?;
        Self::from_json(&content).wrap_err_with(|| {
            format!("Failed to parse structural snapshot from {}", path.display())
        })
    }

    /// Load the snapshot if one has been exported. `None` degrades the
    /// semantic checks to no-ops; a malformed snapshot is still an error.
    pub fn load_if_present(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    /// Write the snapshot document, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = facet_json::to_string_pretty(self)
            .wrap_err("Failed to serialize structural snapshot")?;
        std::fs::write(path, json).wrap_err_with(|| {
            format!("Failed to write structural snapshot to {}", path.display())
        })
    }

    /// Find the node for a file, matching either the node id or its path.
    pub fn find_node(&self, file_path: &str) -> Option<&StructureNode> {
        self.nodes
            .iter()
            .find(|n| n.id == file_path || n.file_path == file_path)
    }
}

/// The structural parser contract.
///
/// Implemented outside this crate (see `lattice-parse`); the engine
/// consumes parse results and never inspects source syntax itself.
pub trait StructuralParser {
    /// Parse file content into a structure node. `module_name` is the
    /// logical module (usually the file stem); `file_path` is recorded on
    /// the node as its identity.
    fn parse(&self, content: &str, module_name: &str, file_path: &str) -> Result<StructureNode>;

    /// Extract the literal source slice of a named construct, if present.
    fn extract_construct(&self, content: &str, construct_name: &str) -> Option<String>;
}

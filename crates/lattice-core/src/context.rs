//! Read-only context aggregation for a node id
//!
//! Composes the rationale ("why"), the task description ("what"), the
//! tracked code locations ("where"), and one illustrative source excerpt
//! for a node. This is the one component with a blanket failure boundary:
//! a malformed document or missing file yields `None`, never an error.

use crate::store::{Store, Workspace};
use crate::structure::StructuralParser;
use eyre::{Result, WrapErr};
use facet::Facet;
use std::path::Path;
use tracing::warn;

/// Everything known about a node: why it exists, what it requires, where
/// it lives in code, and one excerpt from the first location.
#[derive(Debug, Facet)]
pub struct Context {
    pub node_id: String,
    pub why: String,
    pub what: Vec<String>,
    #[facet(rename = "where")]
    pub locations: Vec<CodeLocation>,
    #[facet(default)]
    pub snippet: Option<String>,
}

/// One tracked code location.
#[derive(Debug, Clone, Facet)]
pub struct CodeLocation {
    pub file: String,
    #[facet(default)]
    pub construct: Option<String>,
}

/// The external decision-rationale document.
#[derive(Debug, Clone, Default, Facet)]
struct DecisionMap {
    #[facet(default)]
    nodes: Vec<DecisionNode>,
    #[facet(default)]
    edges: Vec<DecisionEdge>,
}

#[derive(Debug, Clone, Facet)]
struct DecisionNode {
    id: String,
    label: String,
}

#[derive(Debug, Clone, Facet)]
struct DecisionEdge {
    source: String,
    target: String,
    #[facet(default)]
    rationale: Option<String>,
}

/// The external task-tree document.
#[derive(Debug, Clone, Default, Facet)]
pub struct TaskTree {
    #[facet(default)]
    pub nodes: Vec<TaskNode>,
}

/// One task in the tree, identified recursively through `children`.
#[derive(Debug, Clone, Facet)]
pub struct TaskNode {
    pub id: String,
    pub label: String,
    #[facet(default)]
    pub checklist: Vec<String>,
    #[facet(default)]
    pub children: Vec<TaskNode>,
}

impl TaskTree {
    /// Load a task tree from a local file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read task tree from {}", path.display()))?;
        facet_json::from_str(&content)
            .wrap_err_with(|| format!("Failed to parse task tree from {}", path.display()))
    }

    /// Recursive id search through the nested child structure.
    pub fn find(&self, node_id: &str) -> Option<&TaskNode> {
        find_task(&self.nodes, node_id)
    }
}

fn find_task<'t>(nodes: &'t [TaskNode], node_id: &str) -> Option<&'t TaskNode> {
    for node in nodes {
        if node.id == node_id {
            return Some(node);
        }
        if let Some(found) = find_task(&node.children, node_id) {
            return Some(found);
        }
    }
    None
}

/// Aggregates context for external consumption. Read-only.
pub struct ContextAggregator<'a, P: StructuralParser> {
    workspace: &'a Workspace,
    parser: &'a P,
}

impl<'a, P: StructuralParser> ContextAggregator<'a, P> {
    pub fn new(workspace: &'a Workspace, parser: &'a P) -> Self {
        Self { workspace, parser }
    }

    /// Aggregate context for `node_id`. Any failure along the way -
    /// malformed document, unreadable file - yields `None`; this boundary
    /// never propagates an error to its caller.
    pub fn extract(&self, node_id: &str) -> Option<Context> {
        match self.try_extract(node_id) {
            Ok(context) => Some(context),
            Err(e) => {
                warn!("context aggregation failed for {node_id}: {e:#}");
                None
            }
        }
    }

    fn try_extract(&self, node_id: &str) -> Result<Context> {
        let why = self.rationale_for(node_id)?;
        let what = self.task_for(node_id)?;
        let locations = self.locations_for(node_id)?;
        let snippet = self.snippet_for(locations.first())?;

        Ok(Context {
            node_id: node_id.to_string(),
            why,
            what,
            locations,
            snippet,
        })
    }

    /// Node label plus any rationale annotations on edges touching it.
    fn rationale_for(&self, node_id: &str) -> Result<String> {
        let path = self.workspace.decisions_path();
        if !path.exists() {
            return Ok("Unknown".to_string());
        }
        let content = std::fs::read_to_string(&path)
            .wrap_err_with(|| format!("Failed to read decision map from {}", path.display()))?;
        let map: DecisionMap = facet_json::from_str(&content)
            .wrap_err_with(|| format!("Failed to parse decision map from {}", path.display()))?;

        let Some(node) = map.nodes.iter().find(|n| n.id == node_id) else {
            return Ok("Unknown".to_string());
        };
        let mut why = node.label.clone();
        let rationales: Vec<&str> = map
            .edges
            .iter()
            .filter(|e| e.source == node_id || e.target == node_id)
            .filter_map(|e| e.rationale.as_deref())
            .collect();
        if !rationales.is_empty() {
            why.push_str(" | Rationale: ");
            why.push_str(&rationales.join("; "));
        }
        Ok(why)
    }

    /// The task's checklist when it has one, its label otherwise.
    fn task_for(&self, node_id: &str) -> Result<Vec<String>> {
        let path = self.workspace.tree_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let tree = TaskTree::load(&path)?;
        Ok(match tree.find(node_id) {
            Some(task) if !task.checklist.is_empty() => task.checklist.clone(),
            Some(task) => vec![task.label.clone()],
            None => Vec::new(),
        })
    }

    /// Every target of every link whose sources include the node id.
    fn locations_for(&self, node_id: &str) -> Result<Vec<CodeLocation>> {
        let store = Store::load_or_default(self.workspace.store_path())?;
        Ok(store
            .links
            .iter()
            .filter(|link| link.sources.iter().any(|s| s == node_id))
            .flat_map(|link| link.targets.iter())
            .map(|target| CodeLocation {
                file: target.file_path.clone(),
                construct: target.construct_name.clone(),
            })
            .collect())
    }

    /// Source excerpt for the first location only.
    fn snippet_for(&self, location: Option<&CodeLocation>) -> Result<Option<String>> {
        let Some(location) = location else {
            return Ok(None);
        };
        let Some(construct) = &location.construct else {
            return Ok(None);
        };
        let path = self.workspace.resolve(&location.file);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
        Ok(self.parser.extract_construct(&content, construct))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Cardinality, Language, Link, LinkStatus, Target};
    use crate::structure::StructureNode;

    /// Parser stub: the excerpt for `name` is any line mentioning it.
    struct StubParser;

    impl StructuralParser for StubParser {
        fn parse(&self, _: &str, module_name: &str, file_path: &str) -> Result<StructureNode> {
            Ok(StructureNode {
                id: module_name.to_string(),
                file_path: file_path.to_string(),
                ..Default::default()
            })
        }

        fn extract_construct(&self, content: &str, construct_name: &str) -> Option<String> {
            content
                .lines()
                .find(|l| l.contains(construct_name))
                .map(str::to_string)
        }
    }

    fn workspace() -> (tempfile::TempDir, Workspace) {
        let temp = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(temp.path());
        std::fs::create_dir_all(workspace.lattice_dir()).unwrap();
        (temp, workspace)
    }

    fn seed_store(workspace: &Workspace) {
        let store = Store {
            links: vec![Link {
                matrix_id: "MTX-001".to_string(),
                cardinality: Cardinality::OneToOne,
                sources: vec!["REQ-001".to_string()],
                targets: vec![Target {
                    file_path: "src/auth.rs".to_string(),
                    construct_name: Some("login".to_string()),
                    language: Language::Rust,
                    expected_tag: "@MATRIX: REQ-001".to_string(),
                    expected_fingerprint: None,
                }],
                status: LinkStatus::Valid,
                last_verified: None,
            }],
            ..Default::default()
        };
        store.save(workspace.store_path()).unwrap();
    }

    #[test]
    fn aggregates_why_what_where_and_snippet() {
        let (_temp, ws) = workspace();
        std::fs::write(
            ws.decisions_path(),
            r#"{
                "nodes": [{"id": "REQ-001", "label": "Auth system"}],
                "edges": [
                    {"source": "REQ-001", "target": "REQ-002", "rationale": "sessions need auth"}
                ]
            }"#,
        )
        .unwrap();
        std::fs::write(
            ws.tree_path(),
            r#"{
                "nodes": [{
                    "id": "root", "label": "Root",
                    "children": [{"id": "REQ-001", "label": "Login", "checklist": ["hash passwords"]}]
                }]
            }"#,
        )
        .unwrap();
        seed_store(&ws);
        std::fs::create_dir_all(ws.root().join("src")).unwrap();
        std::fs::write(ws.root().join("src/auth.rs"), "pub fn login() {}\n").unwrap();

        let context = ContextAggregator::new(&ws, &StubParser)
            .extract("REQ-001")
            .unwrap();

        assert_eq!(context.why, "Auth system | Rationale: sessions need auth");
        assert_eq!(context.what, vec!["hash passwords"]);
        assert_eq!(context.locations.len(), 1);
        assert_eq!(context.locations[0].file, "src/auth.rs");
        assert_eq!(context.snippet.as_deref(), Some("pub fn login() {}"));
    }

    #[test]
    fn missing_documents_degrade_gracefully() {
        let (_temp, ws) = workspace();
        let context = ContextAggregator::new(&ws, &StubParser)
            .extract("REQ-001")
            .unwrap();

        assert_eq!(context.why, "Unknown");
        assert!(context.what.is_empty());
        assert!(context.locations.is_empty());
        assert!(context.snippet.is_none());
    }

    #[test]
    fn task_label_stands_in_for_an_empty_checklist() {
        let (_temp, ws) = workspace();
        std::fs::write(
            ws.tree_path(),
            r#"{"nodes": [{"id": "REQ-002", "label": "Sessions"}]}"#,
        )
        .unwrap();

        let context = ContextAggregator::new(&ws, &StubParser)
            .extract("REQ-002")
            .unwrap();
        assert_eq!(context.what, vec!["Sessions"]);
    }

    #[test]
    fn malformed_document_yields_none_not_an_error() {
        let (_temp, ws) = workspace();
        std::fs::write(ws.decisions_path(), "{ this is not json").unwrap();

        assert!(
            ContextAggregator::new(&ws, &StubParser)
                .extract("REQ-001")
                .is_none()
        );
    }
}

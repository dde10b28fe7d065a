//! Bridging: derive traceability links from the task tree and the
//! structural snapshot
//!
//! For every requirement id found in the task tree that no link tracks
//! yet, the configured prefix rules pick a snapshot node and a new link is
//! appended with `status = BROKEN`; the next validation pass decides its
//! real health. Requirements with no matching rule or node are reported as
//! a gap, never written into the store's orphan lists - those belong to an
//! external collaborator.

use crate::config::Config;
use eyre::Result;
use lattice_core::{
    Cardinality, Language, Link, LinkStatus, Snapshot, Store, StructureNode, Target, TaskNode,
    TaskTree, Workspace,
};
use std::path::Path;
use tracing::warn;

/// What a bridging pass did.
#[derive(Debug)]
pub struct ConnectSummary {
    pub total_requirements: usize,
    pub added: usize,
    pub unmapped: usize,
}

/// Bridge task-tree requirements to code constructs and persist the
/// extended store.
pub fn connect(workspace: &Workspace, config: &Config) -> Result<ConnectSummary> {
    let tree_path = workspace.tree_path();
    if !tree_path.exists() {
        eyre::bail!(
            "No task tree at {}. Export one before bridging.",
            tree_path.display()
        );
    }
    let snapshot_path = workspace.snapshot_path();
    if !snapshot_path.exists() {
        eyre::bail!(
            "No structural snapshot at {}. Run `lattice scan` first.",
            snapshot_path.display()
        );
    }

    let tree = TaskTree::load(&tree_path)?;
    let snapshot = Snapshot::load(&snapshot_path)?;
    let mut store = Store::load_or_default(workspace.store_path())?;

    let req_ids = collect_requirement_ids(&tree.nodes);
    let mut added = 0;

    for req_id in &req_ids {
        if is_linked(&store, req_id) {
            continue;
        }
        let Some(mapping) = config
            .mappings
            .iter()
            .find(|m| req_id.starts_with(&m.prefix))
        else {
            continue;
        };
        let Some(node) = snapshot
            .nodes
            .iter()
            .find(|n| n.file_path.contains(&mapping.path))
        else {
            continue;
        };

        store.links.push(link_for(req_id, node));
        added += 1;
    }

    let unmapped = req_ids
        .iter()
        .filter(|id| !is_linked(&store, id))
        .count();
    if unmapped > 0 {
        warn!("{unmapped} requirements have no code constructs mapped");
    }

    store.save(workspace.store_path())?;

    Ok(ConnectSummary {
        total_requirements: req_ids.len(),
        added,
        unmapped,
    })
}

fn is_linked(store: &Store, req_id: &str) -> bool {
    store
        .links
        .iter()
        .any(|l| l.sources.iter().any(|s| s == req_id))
}

/// New links point at the node's first callable (or first data construct,
/// or the module itself) and capture its fingerprint as the stability
/// baseline.
fn link_for(req_id: &str, node: &StructureNode) -> Link {
    let construct_name = node
        .outputs
        .first()
        .or_else(|| node.data.first())
        .map(|c| c.name.clone())
        .unwrap_or_else(|| "mod".to_string());
    let fingerprint = node
        .declared_construct(&construct_name)
        .and_then(|c| c.fingerprint.clone());
    let language = Path::new(&node.file_path)
        .extension()
        .and_then(|e| e.to_str())
        .and_then(Language::from_extension)
        .unwrap_or(Language::Rust);

    Link {
        matrix_id: format!("MTX-{}", req_id.replace('.', "-")),
        cardinality: Cardinality::OneToOne,
        sources: vec![req_id.to_string()],
        targets: vec![Target {
            file_path: node.file_path.clone(),
            construct_name: Some(construct_name),
            language,
            expected_tag: format!("@MATRIX: {req_id}"),
            expected_fingerprint: fingerprint,
        }],
        status: LinkStatus::Broken,
        last_verified: None,
    }
}

/// All dotted requirement ids in the tree, in first-seen order.
fn collect_requirement_ids(nodes: &[TaskNode]) -> Vec<String> {
    let mut ids = Vec::new();
    walk_labels(nodes, &mut ids);
    ids
}

fn walk_labels(nodes: &[TaskNode], ids: &mut Vec<String>) {
    for node in nodes {
        if let Some(id) = requirement_id(&node.label) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        walk_labels(&node.children, ids);
    }
}

/// Extract a dotted requirement id (`AC.1.1` style: uppercase/digit
/// segments joined by dots) from a task label.
fn requirement_id(label: &str) -> Option<String> {
    let mut current = String::new();
    for ch in label.chars().chain(std::iter::once(' ')) {
        if ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '.' {
            current.push(ch);
        } else {
            let candidate = current.trim_matches('.');
            if is_dotted_id(candidate) {
                return Some(candidate.to_string());
            }
            current.clear();
        }
    }
    None
}

fn is_dotted_id(candidate: &str) -> bool {
    candidate.contains('.')
        && candidate.chars().any(|c| c.is_ascii_uppercase())
        && candidate.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        })
}

//! Workspace scanning into a structural snapshot
//!
//! Walks the workspace gitignore-aware, parses every supported source
//! file through the structural parser, and collects the result into a
//! [`Snapshot`] for `.lattice/structure.json`. Files are processed
//! strictly sequentially; the engine consuming the snapshot assumes one
//! node per file.

use eyre::Result;
use ignore::WalkBuilder;
use lattice_core::{Snapshot, StructuralParser};
use lattice_parse::is_supported_extension;
use std::path::Path;
use tracing::debug;

/// Parse every supported source file under `root` into a snapshot.
pub fn scan_workspace<P: StructuralParser>(root: &Path, parser: &P) -> Result<Snapshot> {
    let mut snapshot = Snapshot::default();

    let walker = WalkBuilder::new(root)
        .follow_links(true)
        .hidden(false)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .build();

    for entry in walker {
        let entry = entry?;
        let path = entry.path();

        if path
            .extension()
            .is_none_or(|ext| !is_supported_extension(ext))
        {
            continue;
        }

        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };
        let relative = path.strip_prefix(root).unwrap_or(path);
        let file_path = relative.to_string_lossy().replace('\\', "/");
        let module = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("mod");

        match parser.parse(&content, module, &file_path) {
            Ok(node) => snapshot.nodes.push(node),
            Err(e) => debug!("skipping {file_path}: {e}"),
        }
    }

    // Deterministic output regardless of walk order.
    snapshot.nodes.sort_by(|a, b| a.file_path.cmp(&b.file_path));
    Ok(snapshot)
}

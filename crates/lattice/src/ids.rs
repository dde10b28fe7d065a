//! Requirement id allocation over the markdown manifest
//!
//! The manifest draws the project as a tree of checkbox lines:
//!
//! ```text
//! ├── [ ] Auth_System: access management
//! └── [X] REQ-002: Network_Module: socket handling
//! ```
//!
//! Syncing assigns a sequential `REQ-NNN` id to every node that lacks one,
//! continuing from the highest id already present, and rewrites the
//! manifest in place.

use eyre::{Result, WrapErr};
use std::collections::BTreeMap;
use std::path::Path;

/// Default manifest file name at the workspace root.
pub const DEFAULT_MANIFEST: &str = "PROJECT_TREE.md";

/// Ensure every tree node line carries a requirement id. Returns the
/// label -> id map. A missing manifest is not an error: nothing to sync.
pub fn sync_ids_with_manifest(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read manifest from {}", path.display()))?;

    let mut last_id = highest_req_number(&content);
    let mut id_map = BTreeMap::new();
    let mut changed = false;

    let rewritten: Vec<String> = content
        .lines()
        .map(|line| {
            let Some(node) = parse_tree_line(line) else {
                return line.to_string();
            };
            match find_req_id(&node.text) {
                Some(id) => {
                    id_map.insert(clean_label(&node.text, &id), id);
                    line.to_string()
                }
                None => {
                    last_id += 1;
                    let id = format!("REQ-{last_id:03}");
                    id_map.insert(node.label.clone(), id.clone());
                    changed = true;
                    format!(
                        "{}{} {id}: {}{}",
                        node.prefix, node.status, node.label, node.tail
                    )
                }
            }
        })
        .collect();

    if changed {
        let mut output = rewritten.join("\n");
        if content.ends_with('\n') {
            output.push('\n');
        }
        std::fs::write(path, output)
            .wrap_err_with(|| format!("Failed to rewrite manifest at {}", path.display()))?;
    }

    Ok(id_map)
}

/// A manifest tree line split into its parts.
struct TreeLine {
    /// Tree-drawing characters and indentation, verbatim.
    prefix: String,
    /// The `[ ]`-style status checkbox.
    status: String,
    /// Label up to the first colon, trimmed.
    label: String,
    /// Everything from the first colon on (description), verbatim.
    tail: String,
    /// Full text after the checkbox, for id lookup.
    text: String,
}

fn parse_tree_line(line: &str) -> Option<TreeLine> {
    let prefix_end = line
        .char_indices()
        .find(|(_, c)| !matches!(c, '│' | '├' | '└' | '─' | ' ' | '\t'))
        .map(|(i, _)| i)?;
    if prefix_end == 0 {
        return None;
    }
    let rest = &line[prefix_end..];

    let close = rest.find(']')?;
    if !rest.starts_with('[') || close != 2 {
        return None;
    }
    let status_char = rest[1..close].chars().next()?;
    if !matches!(status_char, ' ' | 'x' | 'X' | '/' | '!') {
        return None;
    }
    let status = &rest[..=close];

    let text = rest[close + 1..].trim_start();
    if text.is_empty() {
        return None;
    }
    let (label, tail) = match text.find(':') {
        Some(i) => (&text[..i], &text[i..]),
        None => (text, ""),
    };

    Some(TreeLine {
        prefix: line[..prefix_end].to_string(),
        status: status.to_string(),
        label: label.trim().to_string(),
        tail: tail.to_string(),
        text: text.to_string(),
    })
}

/// First `REQ-NNN` id in the text, if any.
fn find_req_id(text: &str) -> Option<String> {
    let mut search = text;
    while let Some(pos) = search.find("REQ-") {
        let digits: String = search[pos + 4..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if digits.len() >= 3 {
            return Some(format!("REQ-{digits}"));
        }
        search = &search[pos + 4..];
    }
    None
}

/// Label with the id marker stripped, for the id map key.
fn clean_label(text: &str, id: &str) -> String {
    let without_id = text.replacen(id, "", 1);
    let without_id = without_id.trim_start_matches([' ', ':']);
    match without_id.find(':') {
        Some(i) => without_id[..i].trim().to_string(),
        None => without_id.trim().to_string(),
    }
}

/// Highest `REQ-NNN` number anywhere in the manifest.
fn highest_req_number(content: &str) -> u32 {
    let mut highest = 0;
    let mut search = content;
    while let Some(pos) = search.find("REQ-") {
        let digits: String = search[pos + 4..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(n) = digits.parse::<u32>() {
            highest = highest.max(n);
        }
        search = &search[pos + 4..];
    }
    highest
}

//! Patch impact simulation: would this diff break a tracked link?
//!
//! The simulator parses a unified-diff subset, applies it virtually in
//! memory, re-derives structural identity through the parser, and compares
//! fingerprints and tag presence against store expectations. It never
//! writes to the filesystem under any outcome.

use crate::store::{Store, Workspace};
use crate::structure::{StructuralParser, StructureNode};
use eyre::{Result, WrapErr, bail};
use facet::Facet;
use std::path::Path;
use tracing::debug;

/// Verdict of a simulation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum SimulationStatus {
    #[facet(rename = "SAFE_TO_APPLY")]
    SafeToApply,
    #[facet(rename = "REJECTED")]
    Rejected,
}

/// Result of a simulation: REJECTED iff any violation was recorded.
/// Either the full violation list is returned or the call fails outright;
/// there is no partial result.
#[derive(Debug, Facet)]
pub struct SimulationResult {
    pub status: SimulationStatus,
    pub violations: Vec<String>,
}

/// One line of a hunk body, classified by its leading character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Removed(String),
    Added(String),
}

/// One contiguous block of patch lines, anchored at the old-side line
/// offset from its `@@` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// 1-indexed first old-file line this hunk applies at; 0 for hunks
    /// against an empty file.
    pub old_start: usize,
    pub lines: Vec<HunkLine>,
}

/// All hunks for a single patched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    pub file: String,
    pub hunks: Vec<Hunk>,
}

/// Parse the unified-diff subset: `+++ b/<path>` opens a file patch,
/// `@@ -a,b +c,d @@` opens a hunk, every other line belongs to the current
/// hunk. `diff --git` headers, binary patches, and rename metadata are not
/// recognized.
pub fn parse_patch(patch_text: &str) -> Result<Vec<FilePatch>> {
    let mut patches: Vec<FilePatch> = Vec::new();

    for line in patch_text.lines() {
        if let Some(path) = line.strip_prefix("+++ b/") {
            patches.push(FilePatch {
                file: path.trim().to_string(),
                hunks: Vec::new(),
            });
        } else if line.starts_with("@@") {
            let Some(patch) = patches.last_mut() else {
                continue;
            };
            patch.hunks.push(Hunk {
                old_start: parse_hunk_header(line)?,
                lines: Vec::new(),
            });
        } else if let Some(patch) = patches.last_mut() {
            let Some(hunk) = patch.hunks.last_mut() else {
                // Between the file marker and the first `@@` there is only
                // header noise (`--- a/...`, index lines).
                continue;
            };
            if line.starts_with('\\') {
                // "\ No newline at end of file"
                continue;
            }
            let classified = if let Some(text) = line.strip_prefix('+') {
                HunkLine::Added(text.to_string())
            } else if let Some(text) = line.strip_prefix('-') {
                HunkLine::Removed(text.to_string())
            } else {
                // Context; the leading space is part of the diff syntax,
                // a fully blank line is an empty context line.
                HunkLine::Context(line.strip_prefix(' ').unwrap_or(line).to_string())
            };
            hunk.lines.push(classified);
        }
    }

    Ok(patches)
}

/// Pull the old-side start line out of `@@ -a,b +c,d @@`.
fn parse_hunk_header(line: &str) -> Result<usize> {
    let old_range = line
        .split_whitespace()
        .find(|token| token.starts_with('-'))
        .ok_or_else(|| eyre::eyre!("Malformed hunk header: {line}"))?;
    let start = old_range[1..].split(',').next().unwrap_or("");
    start
        .parse::<usize>()
        .wrap_err_with(|| format!("Malformed hunk header: {line}"))
}

/// Apply hunks to `content`, anchored at their old-side line offsets.
///
/// Every context and removal line is verified against the file; a mismatch
/// is a hard error, never a silent no-op. Hunks are expected in old-file
/// order; a running delta accounts for lines added or removed by earlier
/// hunks.
pub fn apply_hunks(content: &str, hunks: &[Hunk]) -> Result<String> {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let mut delta: isize = 0;

    for hunk in hunks {
        let anchor = hunk.old_start.saturating_sub(1) as isize + delta;
        if anchor < 0 {
            bail!("Hunk at line {} underflows the patched file", hunk.old_start);
        }
        let mut cursor = anchor as usize;

        for hunk_line in &hunk.lines {
            match hunk_line {
                HunkLine::Context(text) | HunkLine::Removed(text) => {
                    let Some(actual) = lines.get(cursor) else {
                        bail!(
                            "Hunk at line {} runs past the end of the file (expected {:?})",
                            hunk.old_start,
                            text
                        );
                    };
                    if actual != text {
                        bail!(
                            "Hunk context mismatch at line {}: expected {:?}, found {:?}",
                            cursor + 1,
                            text,
                            actual
                        );
                    }
                    if matches!(hunk_line, HunkLine::Removed(_)) {
                        lines.remove(cursor);
                        delta -= 1;
                    } else {
                        cursor += 1;
                    }
                }
                HunkLine::Added(text) => {
                    lines.insert(cursor, text.clone());
                    cursor += 1;
                    delta += 1;
                }
            }
        }
    }

    let mut patched = lines.join("\n");
    if content.ends_with('\n') && !patched.is_empty() {
        patched.push('\n');
    }
    Ok(patched)
}

/// Simulates a patch against the workspace without writing anything.
pub struct Simulator<'a, P: StructuralParser> {
    workspace: &'a Workspace,
    parser: &'a P,
}

impl<'a, P: StructuralParser> Simulator<'a, P> {
    pub fn new(workspace: &'a Workspace, parser: &'a P) -> Self {
        Self { workspace, parser }
    }

    /// Simulate `patch_text` against the persisted store. A missing store
    /// document means nothing is tracked: SAFE_TO_APPLY.
    pub fn simulate(&self, patch_text: &str) -> Result<SimulationResult> {
        let store_path = self.workspace.store_path();
        if !store_path.exists() {
            return Ok(SimulationResult {
                status: SimulationStatus::SafeToApply,
                violations: Vec::new(),
            });
        }
        let store = Store::load(&store_path)?;
        self.simulate_against(&store, patch_text)
    }

    /// Simulate `patch_text` against an already-loaded store.
    pub fn simulate_against(&self, store: &Store, patch_text: &str) -> Result<SimulationResult> {
        let mut violations = Vec::new();
        let patches = parse_patch(patch_text)?;

        for patch in &patches {
            let full_path = self.workspace.resolve(&patch.file);
            if !full_path.exists() {
                debug!("patched file does not exist, skipping: {}", patch.file);
                continue;
            }
            let original = std::fs::read_to_string(&full_path)
                .wrap_err_with(|| format!("Failed to read {}", full_path.display()))?;
            let patched = apply_hunks(&original, &patch.hunks)
                .wrap_err_with(|| format!("Patch does not apply cleanly to {}", patch.file))?;

            let module = module_name(&patch.file);
            let patched_node = self
                .parser
                .parse(&patched, &module, &patch.file)
                .wrap_err_with(|| format!("Failed to parse patched {}", patch.file))?;

            // The pre-patch content is only parsed if a fingerprint
            // mismatch needs the baseline for the tie-break.
            let mut baseline: Option<StructureNode> = None;

            for link in &store.links {
                for target in &link.targets {
                    if target.file_path != patch.file {
                        continue;
                    }
                    let Some(name) = &target.construct_name else {
                        continue;
                    };
                    let Some(construct) = patched_node.find_construct(name) else {
                        violations.push(format!(
                            "Target `{}` in {} was deleted or renamed by this patch",
                            name, patch.file
                        ));
                        continue;
                    };
                    let Some(expected) = &target.expected_fingerprint else {
                        continue;
                    };
                    let Some(observed) = &construct.fingerprint else {
                        continue;
                    };
                    if observed == expected {
                        continue;
                    }
                    // Blame the patch only when the original content still
                    // matched expectation; pre-existing drift is not its
                    // fault.
                    if baseline.is_none() {
                        baseline = Some(
                            self.parser
                                .parse(&original, &module, &patch.file)
                                .wrap_err_with(|| {
                                    format!("Failed to parse original {}", patch.file)
                                })?,
                        );
                    }
                    let original_matches = baseline
                        .as_ref()
                        .and_then(|node| node.find_construct(name))
                        .and_then(|c| c.fingerprint.as_ref())
                        .is_some_and(|fingerprint| fingerprint == expected);
                    if original_matches {
                        violations.push(format!(
                            "Target `{}` in {}: logic changed, stability expected",
                            name, patch.file
                        ));
                    }
                }
            }

            // Tag removal is checked independently of construct matching,
            // over every target of the patched file.
            for link in &store.links {
                for target in &link.targets {
                    if target.file_path == patch.file && !patched.contains(&target.expected_tag) {
                        violations.push(format!(
                            "Tag `{}` was removed from {}",
                            target.expected_tag, patch.file
                        ));
                    }
                }
            }
        }

        let status = if violations.is_empty() {
            SimulationStatus::SafeToApply
        } else {
            SimulationStatus::Rejected
        };
        Ok(SimulationResult { status, violations })
    }
}

fn module_name(file: &str) -> String {
    Path::new(file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("mod")
        .to_string()
}

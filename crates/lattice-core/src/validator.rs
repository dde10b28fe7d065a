//! Link validation against the filesystem and the structural snapshot

use crate::store::{LinkStatus, Store, Target, Workspace, timestamp_now};
use crate::structure::Snapshot;
use eyre::Result;
use tracing::{debug, warn};

/// Outcome of a validation pass: the refreshed store plus any drift
/// warnings that did not affect link status.
#[derive(Debug)]
pub struct ValidationOutcome {
    pub store: Store,
    /// Fingerprint mismatches observed on otherwise-passing targets.
    pub drift_warnings: Vec<String>,
}

/// Validates every link's targets and rederives link status.
pub struct Validator<'a> {
    workspace: &'a Workspace,
    snapshot: Option<&'a Snapshot>,
}

impl<'a> Validator<'a> {
    pub fn new(workspace: &'a Workspace, snapshot: Option<&'a Snapshot>) -> Self {
        Self {
            workspace,
            snapshot,
        }
    }

    /// Refresh `status` and `last_verified` on every link. The store is
    /// otherwise untouched: links are never added, removed, or reordered.
    ///
    /// A link is VALID iff every one of its targets passes. A fingerprint
    /// mismatch alone never fails a target here - it is recorded as a
    /// warning; the patch simulator applies the strict policy instead.
    pub fn validate(&self, mut store: Store) -> ValidationOutcome {
        let mut drift_warnings = Vec::new();
        let now = timestamp_now();

        for link in &mut store.links {
            let mut all_targets_valid = true;
            for target in &link.targets {
                if !self.verify_target(target, &mut drift_warnings) {
                    all_targets_valid = false;
                }
            }
            link.status = if all_targets_valid {
                LinkStatus::Valid
            } else {
                LinkStatus::Broken
            };
            link.last_verified = Some(now.clone());
        }

        ValidationOutcome {
            store,
            drift_warnings,
        }
    }

    /// Per-target checks, in order, short-circuiting on the first failure:
    /// file exists, tag line present, snapshot node present, construct
    /// declared. Without a snapshot the last two degrade to no-ops.
    fn verify_target(&self, target: &Target, drift_warnings: &mut Vec<String>) -> bool {
        let path = self.workspace.resolve(&target.file_path);
        let Ok(content) = std::fs::read_to_string(&path) else {
            debug!("target file missing: {}", target.file_path);
            return false;
        };

        if !content
            .lines()
            .any(|line| line.contains(&target.expected_tag))
        {
            debug!(
                "tag `{}` not found in {}",
                target.expected_tag, target.file_path
            );
            return false;
        }

        let Some(snapshot) = self.snapshot else {
            return true;
        };
        let Some(node) = snapshot.find_node(&target.file_path) else {
            debug!("no snapshot node for {}", target.file_path);
            return false;
        };
        let Some(name) = &target.construct_name else {
            return true;
        };
        let Some(construct) = node.declared_construct(name) else {
            debug!(
                "construct `{}` not declared in {}",
                name, target.file_path
            );
            return false;
        };

        if let Some(expected) = &target.expected_fingerprint {
            if let Some(observed) = &construct.fingerprint {
                if expected != observed {
                    let msg = format!(
                        "fingerprint drift on `{}` in {}: logic changed since the link was recorded",
                        name, target.file_path
                    );
                    warn!("{msg}");
                    drift_warnings.push(msg);
                }
            }
        }

        true
    }
}

/// Load the workspace snapshot (if one has been exported) and run a
/// validation pass over `store`.
pub fn validate_workspace(store: Store, workspace: &Workspace) -> Result<ValidationOutcome> {
    let snapshot = Snapshot::load_if_present(workspace.snapshot_path())?;
    Ok(Validator::new(workspace, snapshot.as_ref()).validate(store))
}

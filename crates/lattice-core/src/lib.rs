//! lattice-core - Deterministic traceability between requirements and code
//!
//! This crate provides the building blocks for:
//! - Validating tracked links between requirement ids and code constructs
//! - Simulating a patch against tracked links without applying it
//! - Injecting traceability tags into source files
//! - Aggregating context (rationale, task, code locations) for a node id
//!
//! # The store
//!
//! Link state is persisted as a single JSON document, `.lattice/matrix.json`
//! under the workspace root. Each [`Link`] connects one or more requirement
//! ids to one or more [`Target`]s - a file, optionally scoped to a named
//! construct inside it. The store is the single source of truth: `status` is
//! rederived on every validation pass and never trusted between passes.
//!
//! # Validating
//!
//! ```ignore
//! use lattice_core::{Store, Validator, Workspace};
//!
//! let workspace = Workspace::new(".");
//! let store = Store::load_or_default(workspace.store_path())?;
//! let outcome = lattice_core::validate_workspace(store, &workspace)?;
//! outcome.store.save(workspace.store_path())?;
//! ```
//!
//! # Simulating a patch
//!
//! ```ignore
//! use lattice_core::{Simulator, Workspace};
//!
//! let simulator = Simulator::new(&workspace, &parser);
//! let result = simulator.simulate(&patch_text)?;
//! // result.status is SAFE_TO_APPLY or REJECTED; no file was written.
//! ```
//!
//! # Structural parsing
//!
//! The engine never inspects source syntax itself. Construct trees and
//! content fingerprints come from an implementation of [`StructuralParser`]
//! (see the `lattice-parse` crate), either live or via a persisted
//! [`Snapshot`] at `.lattice/structure.json`.

mod context;
mod injector;
mod simulator;
mod store;
mod structure;
mod validator;

pub use context::{CodeLocation, Context, ContextAggregator, TaskNode, TaskTree};
pub use injector::TagInjector;
pub use simulator::{
    FilePatch, Hunk, HunkLine, SimulationResult, SimulationStatus, Simulator, apply_hunks,
    parse_patch,
};
pub use store::{
    Cardinality, LATTICE_DIR, Language, Link, LinkStatus, Orphans, Store, Target, Workspace,
    timestamp_now,
};
pub use structure::{Construct, Snapshot, StructuralParser, StructureNode};
pub use validator::{ValidationOutcome, Validator, validate_workspace};

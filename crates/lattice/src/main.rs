//! lattice - deterministic traceability between requirements and code
//!
//! lattice keeps a store of links from requirement ids to code constructs,
//! validates them against the working tree and the structural snapshot,
//! and can evaluate whether a proposed patch would silently break a
//! tracked link - without applying it.

use eyre::{Result, WrapErr};
use facet_args as args;
use lattice::{config, connect, ids, report::HealthReport, scan};
use lattice_core::{
    ContextAggregator, LinkStatus, SimulationStatus, Simulator, Store, TagInjector, Workspace,
    validate_workspace,
};
use lattice_parse::TreeParser;
use owo_colors::OwoColorize;
use std::path::PathBuf;

/// CLI arguments
#[derive(Debug, facet::Facet)]
struct Args {
    /// Subcommand to run
    #[facet(args::subcommand)]
    command: Option<Command>,

    /// Workspace root (default: current directory)
    #[facet(args::named, args::short = 'w', default)]
    workspace: Option<PathBuf>,
}

/// Subcommands
#[derive(Debug, facet::Facet)]
#[repr(u8)]
enum Command {
    /// Sync requirement ids with the manifest and validate all links
    Sync {
        /// Manifest to assign ids in (default: PROJECT_TREE.md)
        #[facet(args::named, default)]
        manifest: Option<PathBuf>,
    },

    /// Parse the workspace into a structural snapshot
    Scan,

    /// Bridge task-tree requirements to code constructs
    Connect,

    /// Inject @MATRIX tags for broken links
    Inject,

    /// Evaluate a patch against tracked links without applying it
    Simulate {
        /// Unified diff file to evaluate
        #[facet(args::positional)]
        patch: PathBuf,
    },

    /// Print aggregated context for a node id
    Context {
        /// Requirement/node identifier
        #[facet(args::positional)]
        node_id: String,
    },

    /// Print the traceability health report
    Report,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Args =
        facet_args::from_std_args().wrap_err("Failed to parse command line arguments")?;

    let root = match args.workspace {
        Some(root) => root,
        None => std::env::current_dir().wrap_err("Failed to get current directory")?,
    };
    let workspace = Workspace::new(root);

    match args.command {
        Some(Command::Sync { manifest }) => run_sync(&workspace, manifest),
        Some(Command::Scan) => run_scan(&workspace),
        Some(Command::Connect) => run_connect(&workspace),
        Some(Command::Inject) => run_inject(&workspace),
        Some(Command::Simulate { patch }) => run_simulate(&workspace, patch),
        Some(Command::Context { node_id }) => run_context(&workspace, &node_id),
        Some(Command::Report) => run_report(&workspace),
        None => {
            eprintln!(
                "Usage: lattice <sync|scan|connect|inject|simulate|context|report> [-w <workspace-root>]"
            );
            Ok(())
        }
    }
}

fn run_sync(workspace: &Workspace, manifest: Option<PathBuf>) -> Result<()> {
    eprintln!(
        "{} Syncing requirement ids and validating links...",
        "->".blue().bold()
    );

    let manifest_path = manifest.unwrap_or_else(|| workspace.root().join(ids::DEFAULT_MANIFEST));
    let id_map = ids::sync_ids_with_manifest(&manifest_path)?;
    if !id_map.is_empty() {
        eprintln!(
            "   {} requirement ids in manifest",
            id_map.len().to_string().green()
        );
    }

    let store = Store::load_or_default(workspace.store_path())?;
    let outcome = validate_workspace(store, workspace)?;
    for warning in &outcome.drift_warnings {
        eprintln!("{} {}", "!".yellow().bold(), warning);
    }
    outcome.store.save(workspace.store_path())?;

    let valid = outcome.store.count_status(LinkStatus::Valid);
    let total = outcome.store.links.len();
    println!(
        "{} Validated {} links ({} valid, {} broken)",
        "OK".green().bold(),
        total,
        valid.to_string().green(),
        (total - valid).to_string().red()
    );
    Ok(())
}

fn run_scan(workspace: &Workspace) -> Result<()> {
    eprintln!("{} Scanning source files...", "->".blue().bold());

    let parser = TreeParser::new();
    let snapshot = scan::scan_workspace(workspace.root(), &parser)?;
    snapshot.save(workspace.snapshot_path())?;

    println!(
        "{} Captured {} file nodes into {}",
        "OK".green().bold(),
        snapshot.nodes.len().to_string().green(),
        workspace.snapshot_path().display()
    );
    Ok(())
}

fn run_connect(workspace: &Workspace) -> Result<()> {
    eprintln!(
        "{} Bridging requirements to code constructs...",
        "->".blue().bold()
    );

    let config = config::load_config_or_default(&config::config_path(workspace.root()));
    let summary = connect::connect(workspace, &config)?;

    if summary.unmapped > 0 {
        eprintln!(
            "{} {} of {} requirements have no code constructs mapped",
            "!".yellow().bold(),
            summary.unmapped,
            summary.total_requirements
        );
    }
    println!(
        "{} Bridge updated: {} new links",
        "OK".green().bold(),
        summary.added.to_string().green()
    );
    Ok(())
}

fn run_inject(workspace: &Workspace) -> Result<()> {
    eprintln!("{} Injecting tags...", "->".blue().bold());

    let store_path = workspace.store_path();
    if !store_path.exists() {
        eyre::bail!(
            "No matrix store found at {}. Run `lattice sync` first.",
            store_path.display()
        );
    }
    let store = Store::load(&store_path)?;

    let injector = TagInjector::new(workspace);
    let mut injected = 0;
    for link in store
        .links
        .iter()
        .filter(|l| l.status == LinkStatus::Broken)
    {
        for target in &link.targets {
            if injector.inject(target, &link.sources) {
                injected += 1;
            }
        }
    }

    println!(
        "{} Injected {} tags",
        "OK".green().bold(),
        injected.to_string().green()
    );
    Ok(())
}

fn run_simulate(workspace: &Workspace, patch: PathBuf) -> Result<()> {
    let patch_text = std::fs::read_to_string(&patch)
        .wrap_err_with(|| format!("Failed to read patch from {}", patch.display()))?;

    let parser = TreeParser::new();
    let result = Simulator::new(workspace, &parser).simulate(&patch_text)?;

    match result.status {
        SimulationStatus::SafeToApply => {
            println!("{} SAFE_TO_APPLY", "OK".green().bold());
            Ok(())
        }
        SimulationStatus::Rejected => {
            println!(
                "{} REJECTED ({} violations)",
                "!!".red().bold(),
                result.violations.len()
            );
            for violation in &result.violations {
                println!("  {} {}", "-".red(), violation);
            }
            std::process::exit(1);
        }
    }
}

fn run_context(workspace: &Workspace, node_id: &str) -> Result<()> {
    let parser = TreeParser::new();
    let aggregator = ContextAggregator::new(workspace, &parser);

    match aggregator.extract(node_id) {
        Some(context) => {
            let json =
                facet_json::to_string_pretty(&context).wrap_err("Failed to serialize context")?;
            println!("{json}");
        }
        None => {
            eprintln!(
                "{} No context available for {}",
                "!".yellow().bold(),
                node_id.cyan()
            );
        }
    }
    Ok(())
}

fn run_report(workspace: &Workspace) -> Result<()> {
    let store_path = workspace.store_path();
    if !store_path.exists() {
        eyre::bail!(
            "No matrix store found at {}. Run `lattice connect` first.",
            store_path.display()
        );
    }
    let store = Store::load(&store_path)?;
    print!("{}", HealthReport::compute(&store).render());
    Ok(())
}

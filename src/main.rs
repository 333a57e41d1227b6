use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use inventory_refresh::config::{init_config, load_config};
use inventory_refresh::inventory::Inventory;
use inventory_refresh::lazy::LazyResolver;

/// Lazy reference resolution for inventory documents.
#[derive(Parser)]
#[command(
    name = "inventory-refresh",
    about = "Lazy reference resolution for inventory documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default resolver config
    Init {
        /// Directory to create .inventory_refresh/config.json in (default: current directory)
        path: Option<String>,
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },
    /// Resolve every lazy attribute and report unconnected edges
    Resolve {
        /// Inventory document (JSON)
        file: PathBuf,
        /// Directory holding .inventory_refresh/config.json (default: current directory)
        #[arg(short, long)]
        config: Option<String>,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
    /// Show save-order dependencies per collection
    Deps {
        /// Inventory document (JSON)
        file: PathBuf,
        /// Directory holding .inventory_refresh/config.json (default: current directory)
        #[arg(short, long)]
        config: Option<String>,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> inventory_refresh::errors::Result<()> {
    match cli.command {
        Commands::Init { path, force } => {
            let config_path = init_config(&resolve_path(path), force)?;
            println!("Wrote {}", config_path.display());
        }
        Commands::Resolve { file, config, json } => {
            let resolver = build_resolver(config)?;
            let inventory = Inventory::load(&file)?;
            let report = inventory.resolve(&resolver)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            for object in &report.objects {
                println!("{}", object.identity);
                for (name, value) in &object.attributes {
                    println!("  {}: {}", name, value);
                }
            }
            if !report.placeholders.is_empty() {
                println!("\nSkeletal placeholders ({}):", report.placeholders.len());
                for placeholder in &report.placeholders {
                    println!("  {}", placeholder);
                }
            }
            if report.unconnected_edges.is_empty() {
                println!("\nAll edges connected");
            } else {
                println!("\nUnconnected edges ({}):", report.unconnected_edges.len());
                for edge in &report.unconnected_edges {
                    println!("  {}.{} -> {}", edge.owner, edge.attribute, edge.target);
                }
            }
        }
        Commands::Deps { file, config, json } => {
            let resolver = build_resolver(config)?;
            let inventory = Inventory::load(&file)?;
            let scans = inventory.dependencies(&resolver);
            if json {
                println!("{}", serde_json::to_string_pretty(&scans)?);
                return Ok(());
            }

            for (collection, scan) in &scans {
                let dependencies: Vec<_> = scan.dependencies().into_iter().collect();
                if dependencies.is_empty() {
                    println!("{}: no dependencies", collection);
                    continue;
                }
                println!("{}: depends on {}", collection, dependencies.join(", "));
                for (attribute, targets) in &scan.dependency_attributes {
                    let transitive = if scan.transitive_dependency_attributes.contains(attribute) {
                        " (transitive)"
                    } else {
                        ""
                    };
                    let targets: Vec<_> = targets.iter().map(String::as_str).collect();
                    println!("  {} -> {}{}", attribute, targets.join(", "), transitive);
                }
            }
        }
    }
    Ok(())
}

/// Loads resolver settings from `root`, defaulting to the current directory.
fn build_resolver(root: Option<String>) -> inventory_refresh::errors::Result<LazyResolver> {
    let config = load_config(&resolve_path(root))?;
    Ok(LazyResolver::new(&config))
}

fn resolve_path(path: Option<String>) -> PathBuf {
    match path {
        Some(p) => PathBuf::from(p),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

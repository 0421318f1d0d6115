mod commands;
mod config;
mod context;
mod iac;
mod import;
mod infrastructure;
mod output;
#[cfg(test)]
mod test_helpers;
mod traits;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use commands::{ImportCommand, ImportFlags};
use context::Context;
use infrastructure::discovery::Selector;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cloudport")]
#[command(about = "Cloudport - Import existing cloud resources into Terraform/OpenTofu state", long_about = None)]
#[command(version)]
struct Cli {
    /// Log filter (e.g. info, cloudport=debug); defaults to RUST_LOG, then warn
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a single resource by its id
    Resource {
        /// Cloud resource id
        id: String,

        /// Resource name in the configuration
        #[arg(long)]
        name: Option<String>,

        /// Resource type in the configuration (e.g. azurerm_linux_virtual_machine)
        #[arg(long = "type")]
        resource_type: Option<String>,

        #[command(flatten)]
        flags: ImportFlags,
    },

    /// Import a resource group and every resource in it
    ResourceGroup {
        /// Resource group name
        name: String,

        #[command(flatten)]
        flags: ImportFlags,
    },

    /// Import the resources matched by a resource-graph predicate
    Query {
        /// Predicate for `Resources | where <predicate>`
        predicate: String,

        #[command(flatten)]
        flags: ImportFlags,
    },

    /// Import the resources listed in a mapping file
    MappingFile {
        /// Path to the mapping file
        path: PathBuf,

        #[command(flatten)]
        flags: ImportFlags,
    },
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level)
            .with_context(|| format!("Invalid --log-level '{}'", level))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    let (selector, flags) = match cli.command {
        Commands::Resource {
            id,
            name,
            resource_type,
            flags,
        } => (
            Selector::Resource {
                id,
                name,
                resource_type,
            },
            flags,
        ),
        Commands::ResourceGroup { name, flags } => (Selector::ResourceGroup { name }, flags),
        Commands::Query { predicate, flags } => (Selector::Query { predicate }, flags),
        Commands::MappingFile { path, flags } => (Selector::MappingFile { path }, flags),
    };

    let ctx = Context::new();
    let outcome = ImportCommand::execute(&ctx, selector, &flags.into())?;
    std::process::exit(outcome.exit_code());
}

use std::path::PathBuf;

use assay_common::config::AppConfig;
use assay_inventory::InventoryKind;
use assay_telemetry::telemetry::init_telemetry;
use clap::{Parser, Subcommand};

use crate::inventory::{run_crawl, run_reset, run_show};

#[derive(Parser)]
#[command(version, name = "assay", about = "Inventory a legacy metadata catalog")]
struct Cli {
    /// A TOML file layered over the built-in configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl a metadata dump and derive the external locations to grant
    Crawl {
        /// The JSON export of the metastore and mount table
        #[arg(long)]
        source: PathBuf,
        /// Crawl even if the stored snapshots are fresh
        #[arg(long)]
        force: bool,
    },
    /// Print the stored snapshot of one inventory kind
    Show { kind: InventoryKind },
    /// Delete the stored snapshot of one kind, or of all kinds
    Reset { kind: Option<InventoryKind> },
}

pub fn main(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_from(args);
    let config = match &cli.config {
        Some(path) => AppConfig::load_with_file(path)?,
        None => AppConfig::load()?,
    };
    init_telemetry(&config.telemetry)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let mut stdout = std::io::stdout();
    runtime.block_on(async {
        match cli.command {
            Command::Crawl { source, force } => {
                run_crawl(&config, &source, force, &mut stdout).await
            }
            Command::Show { kind } => run_show(&config, kind, &mut stdout).await,
            Command::Reset { kind } => run_reset(&config, kind, &mut stdout).await,
        }
    })
}

//! PersistKit CLI
//!
//! Operator commands for store files: inspect contents, verify integrity, and
//! look at a sync store's replication outbox

use clap::{Parser, Subcommand, ValueEnum};
use persistkit_core::logging_facility::{self, Profile};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "persistkit")]
#[command(about = "PersistKit - inspect and maintain store files", long_about = None)]
struct Cli {
    /// Emit operation logs
    #[arg(long, global = true, value_enum)]
    log: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    /// Human-readable
    Text,
    /// One JSON object per event
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Count records per entity and collection
    Inspect(commands::inspect::InspectArgs),
    /// Decode every record and check identifiers and references
    Verify(commands::verify::VerifyArgs),
    /// Show or requeue pending and failed replication operations
    Outbox(commands::outbox::OutboxArgs),
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.log {
        Some(LogFormat::Text) => logging_facility::init(Profile::Development),
        Some(LogFormat::Json) => logging_facility::init(Profile::Production),
        None => {}
    }

    let result = match cli.command {
        Commands::Inspect(args) => commands::inspect::execute(args),
        Commands::Verify(args) => commands::verify::execute(args),
        Commands::Outbox(args) => commands::outbox::execute(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

//! Outbox command
//!
//! Usage: persistkit outbox (--config <TOML> | --path <TABLE>) [--requeue]
//!
//! Reads the outbox file directly. Do not run `--requeue` while a store has
//! the same outbox open.

use anyhow::Result;
use clap::Args;
use persistkit_sync::{Outbox, OutboxEntry};

use super::StoreTarget;

#[derive(Debug, Args)]
pub struct OutboxArgs {
    #[command(flatten)]
    pub target: StoreTarget,

    /// Move failed operations back to the queue
    #[arg(long)]
    pub requeue: bool,
}

pub fn execute(args: OutboxArgs) -> Result<()> {
    let path = Outbox::path_for(&args.target.table_path()?);
    let mut outbox = Outbox::open(&path)?;

    if args.requeue {
        let count = outbox.requeue_failed()?;
        println!("requeued: {}", count);
    }

    let status = outbox.status();
    println!("pending: {}", status.pending);
    for entry in outbox.pending() {
        print_entry(entry);
    }
    println!("failed: {}", status.failed);
    for entry in outbox.failed() {
        print_entry(entry);
    }
    Ok(())
}

fn print_entry(entry: &OutboxEntry) {
    let statement = &entry.statement;
    println!(
        "  {} {} {} {} attempts={}{}",
        entry.id,
        statement.verb(),
        statement.collection(),
        statement.document_id().unwrap_or("-"),
        entry.attempts,
        entry
            .last_error
            .as_deref()
            .map(|e| format!(" last_error={}", e))
            .unwrap_or_default()
    );
}

//! Verify command
//!
//! Usage: persistkit verify (--config <TOML> | --path <TABLE>) [--strict]
//!
//! Decoding the table already rejects malformed records, temporary or
//! duplicate identifiers. On top of that every identifier must belong to
//! this store, and every relationship target should be present.

use anyhow::{bail, Result};
use clap::Args;
use persistkit_store::file::store_identifier_for;
use persistkit_store::Table;

use super::StoreTarget;

#[derive(Debug, Args)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub target: StoreTarget,

    /// Treat dangling relationship targets as errors
    #[arg(long)]
    pub strict: bool,
}

pub fn execute(args: VerifyArgs) -> Result<()> {
    let path = args.target.table_path()?;
    let store_identifier = store_identifier_for(&path)?;
    let table = Table::read(&path)?;

    let mut errors = Vec::new();
    let mut dangling = Vec::new();
    for (id, snapshot) in table.iter() {
        if id.store_identifier() != store_identifier {
            errors.push(format!("{} belongs to store {}", id, id.store_identifier()));
        }
        for (name, relationship) in snapshot.relationships() {
            for target in relationship.targets() {
                if !table.contains(target) {
                    dangling.push(format!("{}.{} -> {}", id, name, target));
                }
            }
        }
    }

    for problem in &errors {
        println!("error: {}", problem);
    }
    for reference in &dangling {
        let level = if args.strict { "error" } else { "warning" };
        println!("{}: dangling reference {}", level, reference);
    }

    let failures = errors.len() + if args.strict { dangling.len() } else { 0 };
    if failures > 0 {
        bail!("{} problem(s) in {}", failures, path.display());
    }
    println!("ok: {} records in {}", table.len(), store_identifier);
    Ok(())
}

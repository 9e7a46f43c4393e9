//! Inspect command
//!
//! Usage: persistkit inspect (--config <TOML> | --path <TABLE>)

use std::collections::BTreeMap;

use anyhow::Result;
use clap::Args;
use persistkit_store::file::store_identifier_for;
use persistkit_store::Table;
use persistkit_sync::Outbox;

use super::StoreTarget;

#[derive(Debug, Args)]
pub struct InspectArgs {
    #[command(flatten)]
    pub target: StoreTarget,
}

pub fn execute(args: InspectArgs) -> Result<()> {
    let path = args.target.table_path()?;
    let table = Table::read(&path)?;

    let mut entities: BTreeMap<&str, usize> = BTreeMap::new();
    let mut collections: BTreeMap<&str, usize> = BTreeMap::new();
    for snapshot in table.snapshots() {
        *entities.entry(snapshot.entity_name()).or_default() += 1;
        *collections
            .entry(snapshot.collection_name().unwrap_or("(none)"))
            .or_default() += 1;
    }

    println!("store: {}", store_identifier_for(&path)?);
    println!("records: {}", table.len());
    println!("entities:");
    for (name, count) in &entities {
        println!("  {}: {}", name, count);
    }
    println!("collections:");
    for (name, count) in &collections {
        println!("  {}: {}", name, count);
    }

    let outbox_path = Outbox::path_for(&path);
    if outbox_path.exists() {
        let status = Outbox::open(outbox_path)?.status();
        println!("outbox: {} pending, {} failed", status.pending, status.failed);
    }
    Ok(())
}

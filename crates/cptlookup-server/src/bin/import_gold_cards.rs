//! Loads gold-card procedure codes from a CSV file into the database.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use cptlookup_db_postgres::PostgresStorage;
use cptlookup_server::config::loader::load_storage_config;
use cptlookup_server::import::{import_codes, read_codes_from_path};
use cptlookup_server::observability;

#[derive(Debug, Parser)]
#[command(name = "cptlookup-import-gold-cards", version, about)]
struct Args {
    /// CSV file with one procedure code per line
    file: PathBuf,

    /// Configuration file (defaults to CPTLOOKUP_CONFIG or cptlookup.toml)
    #[arg(long, env = "CPTLOOKUP_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::load_dotenv();
    observability::init_tracing("warn");

    let args = Args::parse();
    let cfg = load_storage_config(args.config.as_deref()).context("loading configuration")?;

    let codes = read_codes_from_path(&args.file)?;
    let storage = PostgresStorage::new(cfg.storage.postgres.clone(), cfg.staleness_window())
        .await
        .context("connecting to the database")?;

    let summary = import_codes(&storage, &codes).await?;
    println!("Read {} codes from {}", summary.read, args.file.display());
    println!("Inserted {} new gold-card codes", summary.inserted);
    Ok(())
}

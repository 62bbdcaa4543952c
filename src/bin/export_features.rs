use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use nba_props::config::{self, AppConfig};
use nba_props::{SqliteHistory, export, training};

/// Build the model-ready training dataset from the history store.
#[derive(Debug, Parser)]
#[command(name = "export_features")]
struct Args {
    /// Output path; `.xlsx` writes a workbook, anything else CSV.
    #[arg(long, default_value = "data/features.csv")]
    out: PathBuf,
    #[arg(long, env = "NBA_PROPS_DB")]
    db: Option<PathBuf>,
}

fn main() -> Result<()> {
    config::init_logging();
    let cfg = AppConfig::from_env();
    let args = Args::parse();

    let db_path = args
        .db
        .or(cfg.db_path)
        .context("unable to resolve sqlite path")?;
    let history = SqliteHistory::open(&db_path)?;
    let rows = training::build_training_dataset(&history)?;
    let report = export::export_dataset(&args.out, &rows)?;

    println!("Export complete: {}", args.out.display());
    println!("Rows: {} Players: {}", report.rows, report.players);
    if let (Some(first), Some(last)) = (report.first_date, report.last_date) {
        println!("Dates: {first} -> {last}");
    }
    Ok(())
}

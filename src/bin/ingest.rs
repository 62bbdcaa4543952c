use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use nba_props::config::{self, AppConfig};
use nba_props::{history_store, ingest};

/// Import box-score CSV files into the history store.
#[derive(Debug, Parser)]
#[command(name = "ingest")]
struct Args {
    /// One or more CSV files with the box-score header.
    #[arg(required = true)]
    files: Vec<PathBuf>,
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
    let mut conn = history_store::open_db(&db_path)?;

    println!("DB: {}", db_path.display());
    for file in &args.files {
        let summary = ingest::ingest_csv_file(&mut conn, file)?;
        println!(
            "{}: read={} upserted={} skipped={} players={} games={}",
            file.display(),
            summary.rows_read,
            summary.rows_upserted,
            summary.rows_skipped,
            summary.players,
            summary.games
        );
        for err in summary.errors.iter().take(6) {
            println!("   - {err}");
        }
    }
    Ok(())
}

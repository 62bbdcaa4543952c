use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use nba_props::config::{self, AppConfig};
use nba_props::{history_store, summary};

/// Summarize ingested data coverage.
#[derive(Debug, Parser)]
#[command(name = "summarize")]
struct Args {
    #[arg(long, env = "NBA_PROPS_DB")]
    db: Option<PathBuf>,
    /// Print JSON instead of the text report.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    config::init_logging();
    let cfg = AppConfig::from_env();
    let args = Args::parse();

    let db_path = args
        .db
        .or(cfg.db_path)
        .context("unable to resolve sqlite path")?;
    let conn = history_store::open_db(&db_path)?;
    let report = summary::summarize(&conn)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}

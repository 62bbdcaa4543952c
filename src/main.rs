use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use nba_props::config::{self, AppConfig};
use nba_props::model_registry::ModelRegistry;
use nba_props::predict::{self, PredictionService, PropPrediction, PropRequest};
use nba_props::probability::{CalibratedPrediction, ProbabilityTranslator, StatType};
use nba_props::{PredictError, SqliteHistory};

/// Price one player prop and print the result as JSON.
#[derive(Debug, Parser)]
#[command(name = "nba_props", version)]
struct Cli {
    /// Player name, e.g. "Jayson Tatum" or a unique surname.
    #[arg(long, required_unless_present = "projection")]
    player: Option<String>,
    /// pts, reb, ast, stl, blk or pra.
    #[arg(long)]
    stat: String,
    #[arg(long)]
    line: f64,
    /// Opponent team code, e.g. NYK.
    #[arg(long, required_unless_present = "projection")]
    opponent: Option<String>,
    /// The player's team is the visitor.
    #[arg(long)]
    away: bool,
    #[arg(long)]
    days_rest: Option<f64>,
    #[arg(long, env = "NBA_PROPS_DB")]
    db: Option<PathBuf>,
    #[arg(long, env = "MODEL_DIR")]
    model_dir: Option<PathBuf>,
    /// Price an external point projection instead of running the classifier.
    #[arg(long)]
    projection: Option<f64>,
    /// Spread for the projection path.
    #[arg(long, env = "NBA_PROPS_SIGMA")]
    sigma: Option<f64>,
}

fn main() -> Result<()> {
    config::init_logging();
    let mut cfg = AppConfig::from_env();
    let cli = Cli::parse();
    if let Some(sigma) = cli.sigma.filter(|s| *s > 0.0) {
        cfg.default_sigma = sigma;
    }

    let outcome = match cli.projection {
        Some(projection) => price_projection(&cli, &cfg, projection).map(serde_json::to_value),
        None => price_with_models(&cli, cfg).map(serde_json::to_value),
    };

    match outcome {
        Ok(value) => {
            let value = value.context("serialize prediction")?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&error_body(&err))?);
            std::process::exit(1);
        }
    }
}

fn error_body(err: &PredictError) -> serde_json::Value {
    json!({ "error": err.kind(), "detail": err.to_string() })
}

fn price_projection(
    cli: &Cli,
    cfg: &AppConfig,
    projection: f64,
) -> Result<CalibratedPrediction, PredictError> {
    let stat = cli
        .stat
        .parse::<StatType>()
        .map_err(PredictError::invalid)?;
    let translator = ProbabilityTranslator::new(cfg.default_sigma);
    predict::price_projection(&translator, stat, projection, cli.line, None)
}

fn price_with_models(cli: &Cli, mut cfg: AppConfig) -> Result<PropPrediction, PredictError> {
    if let Some(db) = &cli.db {
        cfg.db_path = Some(db.clone());
    }
    if let Some(dir) = &cli.model_dir {
        cfg.model_dir = dir.clone();
    }
    let db_path = cfg
        .db_path
        .clone()
        .context("unable to resolve sqlite path")?;
    let history = SqliteHistory::open(&db_path)?;
    let registry = ModelRegistry::load(&cfg.model_dir)?;
    let service = PredictionService::new(history, registry).with_default_sigma(cfg.default_sigma);

    let request = PropRequest {
        player_name: cli.player.clone().unwrap_or_default(),
        stat: cli.stat.clone(),
        line: cli.line,
        opponent: cli.opponent.clone().unwrap_or_default(),
        is_home: !cli.away,
        days_rest: cli.days_rest,
    };
    service.predict(&request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_carries_kind_and_reason() {
        let body = error_body(&PredictError::not_found("Player"));
        assert_eq!(body["error"], "not_found");
        assert_eq!(body["detail"], "Player not found.");
    }

    #[test]
    fn projection_output_serializes_without_error_wrapping() {
        let cli = Cli::parse_from([
            "nba_props", "--stat", "pts", "--line", "20.5", "--projection", "22",
        ]);
        let priced = price_projection(&cli, &AppConfig::default(), 22.0).expect("priced");
        let value = serde_json::to_value(priced).expect("json");
        assert_eq!(value["stat"], "pts");
        assert_eq!(value["direction"], "Over");
    }
}

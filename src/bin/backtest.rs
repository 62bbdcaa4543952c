use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;

use nba_props::calibration::{self, Metrics};
use nba_props::config::{self, AppConfig};
use nba_props::model_registry::ModelRegistry;
use nba_props::probability::StatType;
use nba_props::{export, training};

/// Score registry models on the held-out tail of an exported dataset.
#[derive(Debug, Parser)]
#[command(name = "backtest")]
struct Args {
    /// CSV written by `export_features`.
    #[arg(long, default_value = "data/features.csv")]
    data: PathBuf,
    #[arg(long, env = "MODEL_DIR")]
    model_dir: Option<PathBuf>,
    #[arg(long, env = "NBA_PROPS_TRAIN_RATIO")]
    train_ratio: Option<f64>,
    #[arg(long, default_value_t = 10)]
    bins: usize,
}

fn main() -> Result<()> {
    config::init_logging();
    let cfg = AppConfig::from_env();
    let args = Args::parse();
    let model_dir = args.model_dir.unwrap_or(cfg.model_dir);
    let ratio = args.train_ratio.unwrap_or(cfg.train_ratio);

    let rows = export::read_training_csv(&args.data)?;
    let (train, test) = training::time_split(rows, ratio);
    if test.is_empty() {
        return Err(anyhow!("no test rows after split (ratio={ratio})"));
    }
    let registry = ModelRegistry::load(&model_dir)?;

    println!("Player-prop backtest");
    println!("Data: {}", args.data.display());
    println!("Train rows: {} Test rows: {}", train.len(), test.len());
    if let (Some(first), Some(last)) = (test.first(), test.last()) {
        println!("Test range: {} -> {}", first.game_date, last.game_date);
    }

    for stat in StatType::MODELED {
        println!();
        let Ok(model) = registry.classifier(stat) else {
            println!("{stat}: no model in {}", model_dir.display());
            continue;
        };
        let test_set = training::labelled(&test, stat);
        let outcomes: Vec<bool> = test_set.iter().map(|(_, y)| *y).collect();
        let preds: Vec<f64> = test_set.iter().map(|(x, _)| model.predict(x)).collect();

        // No-skill reference: always predict the training base rate.
        let train_set = training::labelled(&train, stat);
        let base_rate = if train_set.is_empty() {
            0.5
        } else {
            train_set.iter().filter(|(_, y)| *y).count() as f64 / train_set.len() as f64
        };
        let flat = vec![base_rate; outcomes.len()];

        print_metrics(&format!("{stat} model"), calibration::evaluate_binary(&preds, &outcomes));
        print_metrics(&format!("{stat} base rate"), calibration::evaluate_binary(&flat, &outcomes));
        println!("{stat} calibration bins:");
        for bin in calibration::calibration_bins(&preds, &outcomes, args.bins) {
            if bin.count == 0 {
                continue;
            }
            println!(
                "  [{:.1},{:.1}) n={:<5} pred={:.3} actual={:.3}",
                bin.bucket_start, bin.bucket_end, bin.count, bin.avg_pred, bin.actual_rate
            );
        }
    }
    Ok(())
}

fn print_metrics(label: &str, metrics: Metrics) {
    println!("{label}:");
    println!(
        "  samples={} brier={:.4} log_loss={:.4} accuracy={:.3} over_rate={:.3}",
        metrics.samples, metrics.brier, metrics.log_loss, metrics.accuracy, metrics.base_rate
    );
}

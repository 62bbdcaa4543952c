use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::warn;

use nba_props::config::{self, AppConfig};
use nba_props::model_registry::{self, artifact_file_name};
use nba_props::probability::StatType;
use nba_props::training::{self, FitConfig};
use nba_props::{Feature, export};

/// Fit per-stat logistic classifiers on the training share of a dataset.
#[derive(Debug, Parser)]
#[command(name = "fit_models")]
struct Args {
    #[arg(long, default_value = "data/features.csv")]
    data: PathBuf,
    #[arg(long, env = "MODEL_DIR")]
    model_dir: Option<PathBuf>,
    #[arg(long, env = "NBA_PROPS_TRAIN_RATIO")]
    train_ratio: Option<f64>,
    #[arg(long, default_value_t = 0.01)]
    l2: f64,
    /// Write artifacts even when validation does not beat the base rate.
    #[arg(long)]
    force: bool,
}

/// Tail of the training share held back for early stopping.
const VALIDATION_SHARE: f64 = 0.15;

fn main() -> Result<()> {
    config::init_logging();
    let cfg = AppConfig::from_env();
    let args = Args::parse();
    let model_dir = args.model_dir.unwrap_or(cfg.model_dir);
    let ratio = args.train_ratio.unwrap_or(cfg.train_ratio);

    let rows = export::read_training_csv(&args.data)?;
    let (train, _test) = training::time_split(rows, ratio);
    let (fit_rows, val_rows) = training::time_split(train, 1.0 - VALIDATION_SHARE);
    if fit_rows.is_empty() || val_rows.is_empty() {
        return Err(anyhow!(
            "not enough rows to fit (fit={} val={})",
            fit_rows.len(),
            val_rows.len()
        ));
    }

    let fit_cfg = FitConfig {
        l2: args.l2,
        ..FitConfig::default()
    };
    for (stat, fitted) in training::fit_stats(&StatType::MODELED, &fit_rows, &val_rows, fit_cfg) {
        let fit = match fitted {
            Ok(fit) => fit,
            Err(err) => {
                warn!(stat = %stat, error = %err, "fit failed");
                println!("{stat}: skipped: {err:#}");
                continue;
            }
        };
        let report = &fit.report;

        println!(
            "{stat}: fit={} val={} val log_loss baseline={:.6} fit={:.6} delta={:+.6}",
            fit.fit_samples,
            fit.val_samples,
            fit.baseline.log_loss,
            report.validation.log_loss,
            fit.baseline.log_loss - report.validation.log_loss
        );
        for (feature, coeff) in Feature::ALL.iter().zip(&report.artifact.coeffs) {
            println!("  {:22} coeff={:+.4}", feature.name(), coeff);
        }

        if !fit.beats_baseline() && !args.force {
            println!("  skipped: no validation improvement (pass --force to write)");
            continue;
        }
        let path = model_dir.join(artifact_file_name(stat));
        model_registry::write_artifact(&path, &report.artifact)?;
        println!("  wrote {}", path.display());
    }
    Ok(())
}

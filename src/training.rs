//! Model-ready dataset, binary targets, chronological split and the logistic
//! fit that produces registry artifacts.

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, Utc};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::calibration::{self, Metrics};
use crate::features::{self, FEATURE_COUNT, Feature, FeatureVector};
use crate::history_store::HistorySource;
use crate::model_registry::{Classifier, LogisticArtifact, LogisticModel, sigmoid};
use crate::opponent_defense::DefenseTable;
use crate::probability::StatType;
use crate::timeline::{self, PlayerRef, PlayerTimeline, StatLine};

/// One labelled observation: identity, realized box score, and the features
/// known before tip-off.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRow {
    pub game_id: String,
    pub game_date: NaiveDate,
    pub player_id: u32,
    pub player_name: String,
    pub opponent: String,
    pub pts: f64,
    pub reb: f64,
    pub ast: f64,
    pub min: f64,
    pub features: FeatureVector,
}

impl TrainingRow {
    pub fn actual(&self, stat: StatType) -> f64 {
        match stat {
            StatType::Pts => self.pts,
            StatType::Reb => self.reb,
            StatType::Ast => self.ast,
            StatType::Pra => self.pts + self.reb + self.ast,
            // Not tracked in the box-score history.
            StatType::Stl | StatType::Blk => f64::NAN,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct BuildCounts {
    kept: usize,
    dnp: usize,
    incomplete: usize,
}

/// Loads every full-game row from `source` and assembles the dataset.
pub fn build_training_dataset<S: HistorySource + ?Sized>(source: &S) -> Result<Vec<TrainingRow>> {
    let rows = source.all_full_game_rows()?;
    let players = source.all_players()?;
    Ok(build_training_rows(rows, &players))
}

/// Player timelines are independent, so they are featurized in parallel
/// against one shared opponent-defense table.
pub fn build_training_rows(rows: Vec<StatLine>, players: &[PlayerRef]) -> Vec<TrainingRow> {
    let table = DefenseTable::from_rows(&rows);
    let names: HashMap<u32, String> = players
        .iter()
        .map(|p| (p.player_id, p.full_name()))
        .collect();
    let timelines = timeline::group_timelines(rows);

    let per_player: Vec<(Vec<TrainingRow>, BuildCounts)> = timelines
        .par_iter()
        .map(|t| rows_for_timeline(t, &table, &names))
        .collect();

    let mut totals = BuildCounts::default();
    let mut out = Vec::new();
    for (rows, counts) in per_player {
        totals.kept += counts.kept;
        totals.dnp += counts.dnp;
        totals.incomplete += counts.incomplete;
        out.extend(rows);
    }
    out.sort_by(|a, b| {
        a.game_date
            .cmp(&b.game_date)
            .then_with(|| a.game_id.cmp(&b.game_id))
            .then_with(|| a.player_id.cmp(&b.player_id))
    });

    info!(
        players = timelines.len(),
        rows = totals.kept,
        dropped_dnp = totals.dnp,
        dropped_incomplete = totals.incomplete,
        "built training rows"
    );
    out
}

fn rows_for_timeline(
    timeline: &PlayerTimeline,
    table: &DefenseTable,
    names: &HashMap<u32, String>,
) -> (Vec<TrainingRow>, BuildCounts) {
    let mut counts = BuildCounts::default();
    let mut out = Vec::new();
    let name = names
        .get(&timeline.player_id())
        .cloned()
        .unwrap_or_else(|| timeline.player_id().to_string());

    for mut row in features::player_feature_rows(timeline) {
        if !row.is_candidate() {
            counts.dnp += 1;
            continue;
        }
        row.features.set(
            Feature::OppPtsAllowedL10,
            table.rating(&row.opponent, &row.line.game_id),
        );
        let Some(features) = row.features.complete() else {
            counts.incomplete += 1;
            continue;
        };
        counts.kept += 1;
        out.push(TrainingRow {
            game_id: row.line.game_id.clone(),
            game_date: row.line.game_date,
            player_id: row.line.player_id,
            player_name: name.clone(),
            opponent: row.opponent,
            pts: row.line.points as f64,
            reb: row.line.rebounds as f64,
            ast: row.line.assists as f64,
            min: row.line.minutes_played,
            features,
        });
    }
    debug!(player_id = timeline.player_id(), kept = counts.kept, "featurized player");
    (out, counts)
}

/// `Some(true)` when the stat beat its own 5-game average. `None` for stats
/// without a rolling baseline.
pub fn target_for(row: &TrainingRow, stat: StatType) -> Option<bool> {
    let baseline = row.features[stat.baseline_feature()?];
    let actual = row.actual(stat);
    actual.is_finite().then_some(actual > baseline)
}

pub fn labelled(rows: &[TrainingRow], stat: StatType) -> Vec<(FeatureVector, bool)> {
    rows.iter()
        .filter_map(|r| target_for(r, stat).map(|y| (r.features, y)))
        .collect()
}

/// Oldest `floor(n * ratio)` rows train, the rest test. Never shuffles.
pub fn time_split(mut rows: Vec<TrainingRow>, train_ratio: f64) -> (Vec<TrainingRow>, Vec<TrainingRow>) {
    let ratio = if train_ratio.is_finite() {
        train_ratio.clamp(f64::EPSILON, 1.0 - f64::EPSILON)
    } else {
        crate::config::DEFAULT_TRAIN_RATIO
    };
    rows.sort_by(|a, b| {
        a.game_date
            .cmp(&b.game_date)
            .then_with(|| a.game_id.cmp(&b.game_id))
            .then_with(|| a.player_id.cmp(&b.player_id))
    });
    let cut = (rows.len() as f64 * ratio).floor() as usize;
    let test = rows.split_off(cut.min(rows.len()));
    (rows, test)
}

#[derive(Debug, Clone, Copy)]
pub struct FitConfig {
    pub l2: f64,
    pub learning_rate: f64,
    pub max_iters: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            l2: 0.01,
            learning_rate: 0.5,
            max_iters: 2000,
        }
    }
}

const IMPROVEMENT_EPS: f64 = 1e-7;
const EVAL_EVERY: usize = 20;
const PATIENCE: usize = 20;

#[derive(Debug, Clone)]
pub struct FitReport {
    pub model: LogisticModel,
    pub artifact: LogisticArtifact,
    pub train: Metrics,
    pub validation: Metrics,
}

/// Batch gradient descent on standardized features, keeping the coefficients
/// with the best validation log loss.
pub fn fit_logistic(
    stat: StatType,
    train: &[(FeatureVector, bool)],
    validation: &[(FeatureVector, bool)],
    cfg: FitConfig,
) -> Result<FitReport> {
    if train.is_empty() || validation.is_empty() {
        return Err(anyhow!(
            "{stat}: need train and validation samples (train={} val={})",
            train.len(),
            validation.len()
        ));
    }

    let (means, stds) = feature_norm_stats(train);
    let standardize = |x: &FeatureVector| -> [f64; FEATURE_COUNT] {
        let mut z = [0.0; FEATURE_COUNT];
        for (i, v) in x.as_array().iter().enumerate() {
            z[i] = (v - means[i]) / stds[i];
        }
        z
    };
    let train_z: Vec<([f64; FEATURE_COUNT], f64)> = train
        .iter()
        .map(|(x, y)| (standardize(x), if *y { 1.0 } else { 0.0 }))
        .collect();
    let val_z: Vec<([f64; FEATURE_COUNT], f64)> = validation
        .iter()
        .map(|(x, y)| (standardize(x), if *y { 1.0 } else { 0.0 }))
        .collect();

    let mut coeffs = [0.0; FEATURE_COUNT];
    let mut intercept = 0.0;
    let mut best = (coeffs, intercept);
    let mut best_val = log_loss(&coeffs, intercept, &val_z);
    let mut no_improve = 0usize;
    let n = train_z.len() as f64;

    for iter in 0..cfg.max_iters {
        let mut grad = [0.0; FEATURE_COUNT];
        let mut grad_b = 0.0;
        for (x, y) in &train_z {
            let dz = sigmoid(dot(&coeffs, x) + intercept) - y;
            grad_b += dz;
            for j in 0..FEATURE_COUNT {
                grad[j] += dz * x[j];
            }
        }

        let lr = cfg.learning_rate / (1.0 + iter as f64 * 0.003);
        for j in 0..FEATURE_COUNT {
            coeffs[j] -= lr * (grad[j] / n + cfg.l2 * coeffs[j]);
        }
        intercept -= lr * grad_b / n;

        if iter % EVAL_EVERY == 0 || iter + 1 == cfg.max_iters {
            let val_ll = log_loss(&coeffs, intercept, &val_z);
            if val_ll + IMPROVEMENT_EPS < best_val {
                best_val = val_ll;
                best = (coeffs, intercept);
                no_improve = 0;
            } else {
                no_improve += 1;
                if no_improve >= PATIENCE {
                    break;
                }
            }
        }
    }

    let model = LogisticModel::new(stat, means, stds, best.0, best.1);
    let score = |samples: &[(FeatureVector, bool)]| {
        let preds: Vec<f64> = samples
            .iter()
            .map(|(x, _)| model.predict(x))
            .collect();
        let outcomes: Vec<bool> = samples.iter().map(|(_, y)| *y).collect();
        calibration::evaluate_binary(&preds, &outcomes)
    };
    let train_metrics = score(train);
    let val_metrics = score(validation);

    let mut artifact = model.to_artifact();
    artifact.generated_at = Some(Utc::now().to_rfc3339());
    artifact.l2 = cfg.l2;
    artifact.train_log_loss = train_metrics.log_loss;
    artifact.val_log_loss = val_metrics.log_loss;
    artifact.train_samples = train.len();
    artifact.val_samples = validation.len();

    info!(
        stat = %stat,
        train = train.len(),
        val = validation.len(),
        train_log_loss = train_metrics.log_loss,
        val_log_loss = val_metrics.log_loss,
        "fit logistic model"
    );

    Ok(FitReport {
        model,
        artifact,
        train: train_metrics,
        validation: val_metrics,
    })
}

/// A fitted stat next to the no-skill reference on the same validation rows.
#[derive(Debug, Clone)]
pub struct StatFit {
    pub report: FitReport,
    /// Validation metrics of always predicting the fit-split base rate.
    pub baseline: Metrics,
    pub fit_samples: usize,
    pub val_samples: usize,
}

impl StatFit {
    pub fn beats_baseline(&self) -> bool {
        self.report.validation.log_loss < self.baseline.log_loss
    }
}

/// Fits each stat independently; one stat failing does not stop the rest.
pub fn fit_stats(
    stats: &[StatType],
    fit_rows: &[TrainingRow],
    val_rows: &[TrainingRow],
    cfg: FitConfig,
) -> Vec<(StatType, Result<StatFit>)> {
    stats
        .iter()
        .map(|&stat| {
            let fit_set = labelled(fit_rows, stat);
            let val_set = labelled(val_rows, stat);
            let fitted = fit_logistic(stat, &fit_set, &val_set, cfg).map(|report| {
                let base_rate = fit_set.iter().filter(|(_, y)| *y).count() as f64
                    / fit_set.len().max(1) as f64;
                let outcomes: Vec<bool> = val_set.iter().map(|(_, y)| *y).collect();
                let flat = vec![base_rate; outcomes.len()];
                StatFit {
                    report,
                    baseline: calibration::evaluate_binary(&flat, &outcomes),
                    fit_samples: fit_set.len(),
                    val_samples: val_set.len(),
                }
            });
            (stat, fitted)
        })
        .collect()
}

fn feature_norm_stats(
    samples: &[(FeatureVector, bool)],
) -> ([f64; FEATURE_COUNT], [f64; FEATURE_COUNT]) {
    let mut mean = [0.0; FEATURE_COUNT];
    let mut var = [0.0; FEATURE_COUNT];
    let n = samples.len().max(1) as f64;

    for (x, _) in samples {
        for (i, v) in x.as_array().iter().enumerate() {
            mean[i] += v / n;
        }
    }
    for (x, _) in samples {
        for (i, v) in x.as_array().iter().enumerate() {
            let d = v - mean[i];
            var[i] += d * d / n;
        }
    }
    for v in &mut var {
        *v = v.sqrt().max(1e-6);
    }
    (mean, var)
}

fn log_loss(coeffs: &[f64; FEATURE_COUNT], intercept: f64, samples: &[([f64; FEATURE_COUNT], f64)]) -> f64 {
    if samples.is_empty() {
        return f64::INFINITY;
    }
    let sum: f64 = samples
        .iter()
        .map(|(x, y)| {
            let p = sigmoid(dot(coeffs, x) + intercept).clamp(1e-12, 1.0 - 1e-12);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();
    sum / samples.len() as f64
}

fn dot(a: &[f64; FEATURE_COUNT], b: &[f64; FEATURE_COUNT]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::fixtures::line;

    fn vector(first: f64) -> FeatureVector {
        let mut values = [1.0; FEATURE_COUNT];
        values[Feature::PtsL5.index()] = first;
        FeatureVector::from_array(values).expect("finite")
    }

    fn training_row(game: &str, date: &str, pts: f64, pts_l5: f64) -> TrainingRow {
        TrainingRow {
            game_id: game.into(),
            game_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("date"),
            player_id: 1,
            player_name: "A".into(),
            opponent: "NYK".into(),
            pts,
            reb: 0.0,
            ast: 0.0,
            min: 30.0,
            features: vector(pts_l5),
        }
    }

    #[test]
    fn target_is_strictly_above_baseline() {
        assert_eq!(target_for(&training_row("g", "2024-01-01", 21.0, 20.0), StatType::Pts), Some(true));
        assert_eq!(target_for(&training_row("g", "2024-01-01", 20.0, 20.0), StatType::Pts), Some(false));
        assert_eq!(target_for(&training_row("g", "2024-01-01", 20.0, 20.0), StatType::Stl), None);
    }

    #[test]
    fn split_is_chronological() {
        let rows = vec![
            training_row("g3", "2024-01-03", 1.0, 1.0),
            training_row("g1", "2024-01-01", 1.0, 1.0),
            training_row("g4", "2024-01-04", 1.0, 1.0),
            training_row("g2", "2024-01-02", 1.0, 1.0),
            training_row("g5", "2024-01-05", 1.0, 1.0),
        ];
        let (train, test) = time_split(rows, 0.8);
        let ids: Vec<&str> = train.iter().map(|r| r.game_id.as_str()).collect();
        assert_eq!(ids, ["g1", "g2", "g3", "g4"]);
        assert_eq!(test.len(), 1);
        assert_eq!(test[0].game_id, "g5");
        assert!(train.iter().all(|r| r.game_date < test[0].game_date));
    }

    #[test]
    fn split_clamps_ratio() {
        let rows = vec![training_row("g1", "2024-01-01", 1.0, 1.0)];
        let (train, test) = time_split(rows.clone(), 5.0);
        assert_eq!((train.len(), test.len()), (0, 1));
        let (train, test) = time_split(rows, -1.0);
        assert_eq!((train.len(), test.len()), (0, 1));
    }

    /// Two teams trade games so both sides build defensive history.
    fn synthetic_rows() -> Vec<TrainingRow> {
        let mut rows = Vec::new();
        for g in 0..14u32 {
            let date = format!("2024-01-{:02}", g + 1);
            let game = format!("G{g:02}");
            let mut a = line(1, &game, &date, 20 + g % 3, 30.0);
            let mut b = line(2, &game, &date, 15, if g == 12 { 0.0 } else { 28.0 });
            b.team_code = "NYK".into();
            a.team_code = "BOS".into();
            rows.push(a);
            rows.push(b);
        }
        build_training_rows(rows, &[])
    }

    #[test]
    fn dataset_drops_dnp_and_incomplete_rows() {
        let out = synthetic_rows();
        assert!(!out.is_empty());
        assert!(out.iter().all(|r| r.min > 0.0));
        assert!(out.iter().all(|r| r.features.as_array().iter().all(|v| v.is_finite())));
        // The first two games cannot have an opponent rating yet.
        assert!(out.iter().all(|r| r.game_id.as_str() >= "G02"));
        assert!(out.iter().any(|r| r.player_name == "2"));
    }

    #[test]
    fn fit_learns_a_separable_signal() {
        let mut samples = Vec::new();
        for i in 0..200 {
            let x = (i % 20) as f64;
            samples.push((vector(x), x >= 10.0));
        }
        let (train, val) = samples.split_at(150);
        let report = fit_logistic(StatType::Pts, train, val, FitConfig::default()).expect("fit");
        assert!(report.validation.accuracy > 0.9, "{:?}", report.validation);
        assert!(report.validation.log_loss < std::f64::consts::LN_2);
        assert_eq!(report.artifact.feature_names.len(), FEATURE_COUNT);
        assert!(LogisticModel::from_artifact(&report.artifact).is_ok());
    }

    #[test]
    fn fit_requires_both_splits() {
        assert!(fit_logistic(StatType::Reb, &[(vector(1.0), true)], &[], FitConfig::default()).is_err());
    }

    #[test]
    fn one_unfittable_stat_does_not_block_the_others() {
        let rows = synthetic_rows();
        let (fit_rows, val_rows) = time_split(rows, 0.6);
        let results = fit_stats(
            &[StatType::Stl, StatType::Pts],
            &fit_rows,
            &val_rows,
            FitConfig::default(),
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, StatType::Stl);
        assert!(results[0].1.is_err());
        let pts = results[1].1.as_ref().expect("pts fits");
        assert!(pts.fit_samples > 0 && pts.val_samples > 0);
        assert_eq!(pts.baseline.samples, pts.val_samples);
    }
}

//! Per-stat classifiers that estimate `P(actual > rolling 5-game average)`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PredictError;
use crate::features::{FEATURE_COUNT, FeatureVector, feature_names};
use crate::probability::StatType;

pub const ARTIFACT_VERSION: u32 = 1;

pub trait Classifier: Send + Sync {
    /// Probability in `[0, 1]` that the stat lands above its 5-game average.
    fn predict(&self, features: &FeatureVector) -> f64;
}

impl<F> Classifier for F
where
    F: Fn(&FeatureVector) -> f64 + Send + Sync,
{
    fn predict(&self, features: &FeatureVector) -> f64 {
        self(features)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticArtifact {
    pub version: u32,
    pub stat: StatType,
    #[serde(default)]
    pub generated_at: Option<String>,
    pub feature_names: Vec<String>,
    pub feature_means: Vec<f64>,
    pub feature_stds: Vec<f64>,
    pub coeffs: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub l2: f64,
    #[serde(default)]
    pub train_log_loss: f64,
    #[serde(default)]
    pub val_log_loss: f64,
    #[serde(default)]
    pub train_samples: usize,
    #[serde(default)]
    pub val_samples: usize,
}

/// Standardize-then-logit model over the 17 contract features.
#[derive(Debug, Clone)]
pub struct LogisticModel {
    stat: StatType,
    means: [f64; FEATURE_COUNT],
    stds: [f64; FEATURE_COUNT],
    coeffs: [f64; FEATURE_COUNT],
    intercept: f64,
}

impl LogisticModel {
    pub fn new(
        stat: StatType,
        means: [f64; FEATURE_COUNT],
        stds: [f64; FEATURE_COUNT],
        coeffs: [f64; FEATURE_COUNT],
        intercept: f64,
    ) -> Self {
        Self {
            stat,
            means,
            stds,
            coeffs,
            intercept,
        }
    }

    /// Rejects artifacts whose feature order differs from the contract.
    pub fn from_artifact(artifact: &LogisticArtifact) -> Result<Self> {
        let expected = feature_names();
        if artifact.feature_names.len() != FEATURE_COUNT
            || artifact
                .feature_names
                .iter()
                .zip(expected.iter())
                .any(|(got, want)| got != want)
        {
            return Err(anyhow!(
                "{} model feature order does not match {:?}",
                artifact.stat,
                expected
            ));
        }
        Ok(Self::new(
            artifact.stat,
            fixed(&artifact.feature_means, "feature_means")?,
            fixed(&artifact.feature_stds, "feature_stds")?,
            fixed(&artifact.coeffs, "coeffs")?,
            artifact.intercept,
        ))
    }

    pub fn to_artifact(&self) -> LogisticArtifact {
        LogisticArtifact {
            version: ARTIFACT_VERSION,
            stat: self.stat,
            generated_at: None,
            feature_names: feature_names().iter().map(|s| s.to_string()).collect(),
            feature_means: self.means.to_vec(),
            feature_stds: self.stds.to_vec(),
            coeffs: self.coeffs.to_vec(),
            intercept: self.intercept,
            l2: 0.0,
            train_log_loss: 0.0,
            val_log_loss: 0.0,
            train_samples: 0,
            val_samples: 0,
        }
    }

    pub fn stat(&self) -> StatType {
        self.stat
    }

    pub fn logit(&self, features: &FeatureVector) -> f64 {
        let mut z = self.intercept;
        for (i, x) in features.as_array().iter().enumerate() {
            z += self.coeffs[i] * (x - self.means[i]) / self.stds[i].max(1e-6);
        }
        z
    }
}

impl Classifier for LogisticModel {
    fn predict(&self, features: &FeatureVector) -> f64 {
        sigmoid(self.logit(features))
    }
}

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn fixed(values: &[f64], field: &str) -> Result<[f64; FEATURE_COUNT]> {
    let arr: [f64; FEATURE_COUNT] = values
        .try_into()
        .map_err(|_| anyhow!("{field}: expected {FEATURE_COUNT} values, got {}", values.len()))?;
    if arr.iter().any(|v| !v.is_finite()) {
        return Err(anyhow!("{field}: non-finite value"));
    }
    Ok(arr)
}

pub fn load_artifact(path: &Path) -> Result<LogisticArtifact> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read model artifact {}", path.display()))?;
    serde_json::from_str::<LogisticArtifact>(&raw)
        .with_context(|| format!("parse model artifact {}", path.display()))
}

pub fn write_artifact(path: &Path, artifact: &LogisticArtifact) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create model dir {}", parent.display()))?;
    }
    let raw = serde_json::to_string_pretty(artifact).context("serialize model artifact")?;
    fs::write(path, raw).with_context(|| format!("write model artifact {}", path.display()))
}

/// Preferred file name for a stat's artifact inside a model directory.
pub fn artifact_file_name(stat: StatType) -> String {
    format!("{}_logit.json", stat.key())
}

/// Loaded once at startup and shared read-only by the prediction path.
#[derive(Default)]
pub struct ModelRegistry {
    models: HashMap<StatType, Box<dyn Classifier>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads whatever artifacts exist under `model_dir`; absent files are skipped.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let mut registry = Self::new();
        for stat in StatType::MODELED {
            let candidates = [
                model_dir.join(artifact_file_name(stat)),
                model_dir.join(format!("{}.json", stat.key())),
            ];
            let Some(path) = candidates.iter().find(|p| p.exists()) else {
                warn!(stat = %stat, dir = %model_dir.display(), "no model artifact");
                continue;
            };
            let artifact = load_artifact(path)?;
            if artifact.stat != stat {
                return Err(anyhow!(
                    "{} holds a {} model, expected {stat}",
                    path.display(),
                    artifact.stat
                ));
            }
            let model = LogisticModel::from_artifact(&artifact)
                .with_context(|| format!("load model {}", path.display()))?;
            info!(stat = %stat, path = %path.display(), "loaded model");
            registry.insert(stat, model);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, stat: StatType, model: impl Classifier + 'static) {
        self.models.insert(stat, Box::new(model));
    }

    pub fn classifier(&self, stat: StatType) -> Result<&dyn Classifier, PredictError> {
        self.models
            .get(&stat)
            .map(|m| m.as_ref())
            .ok_or_else(|| PredictError::ModelUnavailable {
                stat: stat.key().to_string(),
            })
    }

    pub fn available(&self) -> Vec<StatType> {
        let mut stats: Vec<StatType> = self.models.keys().copied().collect();
        stats.sort_by_key(|s| s.key());
        stats
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_model(stat: StatType, intercept: f64) -> LogisticModel {
        LogisticModel::new(
            stat,
            [0.0; FEATURE_COUNT],
            [1.0; FEATURE_COUNT],
            [0.0; FEATURE_COUNT],
            intercept,
        )
    }

    #[test]
    fn sigmoid_is_stable_at_extremes() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!((sigmoid(2.0) + sigmoid(-2.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn artifact_with_reordered_features_is_rejected() {
        let mut artifact = flat_model(StatType::Pts, 0.0).to_artifact();
        assert!(LogisticModel::from_artifact(&artifact).is_ok());
        artifact.feature_names.swap(0, 1);
        assert!(LogisticModel::from_artifact(&artifact).is_err());
    }

    #[test]
    fn artifact_with_short_coeffs_is_rejected() {
        let mut artifact = flat_model(StatType::Reb, 0.0).to_artifact();
        artifact.coeffs.pop();
        assert!(LogisticModel::from_artifact(&artifact).is_err());
    }

    #[test]
    fn missing_stat_is_model_unavailable() {
        let mut registry = ModelRegistry::new();
        registry.insert(StatType::Pts, flat_model(StatType::Pts, 0.0));
        assert!(registry.classifier(StatType::Pts).is_ok());
        let err = registry.classifier(StatType::Ast).err();
        assert!(matches!(err, Some(PredictError::ModelUnavailable { .. })));
    }

    #[test]
    fn closures_are_classifiers() {
        let mut registry = ModelRegistry::new();
        registry.insert(StatType::Ast, |_: &FeatureVector| 0.42);
        let features = FeatureVector::from_array([1.0; FEATURE_COUNT]);
        let p = features.map(|f| registry.classifier(StatType::Ast).map(|c| c.predict(&f)));
        assert!(matches!(p, Some(Ok(v)) if (v - 0.42).abs() < 1e-12));
    }

    #[test]
    fn load_skips_missing_files() {
        let dir = std::env::temp_dir().join(format!("nba_props_models_{}", std::process::id()));
        let artifact = flat_model(StatType::Reb, 1.0).to_artifact();
        write_artifact(&dir.join("reb.json"), &artifact).expect("write");

        let registry = ModelRegistry::load(&dir).expect("load");
        assert_eq!(registry.available(), vec![StatType::Reb]);
        let _ = fs::remove_dir_all(&dir);
    }
}

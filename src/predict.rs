//! End-to-end prop pricing: history → features → classifier → line probability.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PredictError;
use crate::features::{self, InferenceFeatures, Scenario};
use crate::history_store::HistorySource;
use crate::model_registry::ModelRegistry;
use crate::opponent_defense::DefenseCache;
use crate::probability::{
    CalibratedPrediction, ModelOutput, ProbabilityTranslator, StatType,
};

/// Rest assumed when a request carries no usable value.
pub const DEFAULT_REQUEST_DAYS_REST: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropRequest {
    pub player_name: String,
    pub stat: String,
    pub line: f64,
    pub opponent: String,
    #[serde(default = "default_is_home")]
    pub is_home: bool,
    #[serde(default)]
    pub days_rest: Option<f64>,
}

fn default_is_home() -> bool {
    true
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub player_name: String,
    pub stat: StatType,
    pub line: f64,
    pub scenario: Scenario,
}

impl PropRequest {
    pub fn validate(&self) -> Result<ValidatedRequest, PredictError> {
        let mut missing = Vec::new();
        if self.player_name.trim().is_empty() {
            missing.push("player_name");
        }
        if self.stat.trim().is_empty() {
            missing.push("stat");
        }
        if self.opponent.trim().is_empty() {
            missing.push("opponent");
        }
        if !missing.is_empty() {
            return Err(PredictError::invalid(format!(
                "Missing fields: {}",
                missing.join(", ")
            )));
        }
        if !self.line.is_finite() {
            return Err(PredictError::invalid("line must be a number."));
        }
        let stat = self
            .stat
            .parse::<StatType>()
            .map_err(PredictError::invalid)?;
        let days_rest = match self.days_rest {
            Some(d) if d.is_finite() && d >= 0.0 => d,
            _ => DEFAULT_REQUEST_DAYS_REST,
        };
        Ok(ValidatedRequest {
            player_name: self.player_name.trim().to_string(),
            stat,
            line: self.line,
            scenario: Scenario {
                opponent: self.opponent.trim().to_ascii_uppercase(),
                is_home: self.is_home,
                days_rest,
            },
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PropPrediction {
    pub player: String,
    pub anchor_game_id: String,
    pub base_probability: f64,
    #[serde(flatten)]
    pub calibrated: CalibratedPrediction,
}

/// Owns the history handle, the loaded models and the opponent memo for the
/// lifetime of a process.
pub struct PredictionService<S> {
    source: S,
    registry: ModelRegistry,
    defense_cache: DefenseCache,
    translator: ProbabilityTranslator,
}

impl<S: HistorySource> PredictionService<S> {
    pub fn new(source: S, registry: ModelRegistry) -> Self {
        Self {
            source,
            registry,
            defense_cache: DefenseCache::new(),
            translator: ProbabilityTranslator::default(),
        }
    }

    /// Spread used when pricing a point projection without a residual estimate.
    pub fn with_default_sigma(mut self, sigma: f64) -> Self {
        self.translator = ProbabilityTranslator::new(sigma);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn inference_features(
        &self,
        player_name: &str,
        scenario: &Scenario,
    ) -> Result<InferenceFeatures, PredictError> {
        features::build_inference_features_with_cache(
            &self.source,
            Some(&self.defense_cache),
            player_name,
            scenario,
        )
    }

    pub fn predict(&self, request: &PropRequest) -> Result<PropPrediction, PredictError> {
        let req = request.validate()?;
        let inputs = self.inference_features(&req.player_name, &req.scenario)?;

        let classifier = self.registry.classifier(req.stat)?;
        let raw = classifier.predict(&inputs.features);
        if !raw.is_finite() {
            return Err(PredictError::BadModelOutput {
                stat: req.stat.key().to_string(),
            });
        }
        let base_probability = raw.clamp(0.0, 1.0);

        let rolling_average = req
            .stat
            .baseline_feature()
            .map(|f| inputs.features[f])
            .unwrap_or(req.line);
        let std_dev = req
            .stat
            .spread_feature()
            .map(|f| inputs.features[f])
            .filter(|s| *s > 0.0)
            .unwrap_or_else(|| req.stat.fallback_std_dev());

        let probability_over = self.translator.translate_to_line_probability(
            req.stat,
            ModelOutput::BaselineProbability {
                probability: base_probability,
                rolling_average,
            },
            req.line,
            Some(std_dev),
        );
        let calibrated =
            CalibratedPrediction::new(req.stat, req.line, rolling_average, probability_over);

        info!(
            player = %inputs.player.full_name(),
            stat = %req.stat,
            line = req.line,
            p_over = calibrated.probability_over,
            "priced prop"
        );

        Ok(PropPrediction {
            player: inputs.player.full_name(),
            anchor_game_id: inputs.anchor_game_id,
            base_probability,
            calibrated,
        })
    }
}

/// Prices a point projection from an external regressor. Needs no history.
pub fn price_projection(
    translator: &ProbabilityTranslator,
    stat: StatType,
    projection: f64,
    line: f64,
    std_dev: Option<f64>,
) -> Result<CalibratedPrediction, PredictError> {
    if !projection.is_finite() || !line.is_finite() {
        return Err(PredictError::invalid("projection and line must be numbers."));
    }
    let p = translator.translate_to_line_probability(
        stat,
        ModelOutput::Projection(projection),
        line,
        std_dev,
    );
    Ok(CalibratedPrediction::new(stat, line, projection, p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PropRequest {
        PropRequest {
            player_name: "Jayson Tatum".into(),
            stat: "PTS".into(),
            line: 27.5,
            opponent: " nyk ".into(),
            is_home: false,
            days_rest: None,
        }
    }

    #[test]
    fn validation_normalizes_fields() {
        let req = request().validate().expect("valid");
        assert_eq!(req.stat, StatType::Pts);
        assert_eq!(req.scenario.opponent, "NYK");
        assert_eq!(req.scenario.days_rest, DEFAULT_REQUEST_DAYS_REST);
    }

    #[test]
    fn bad_days_rest_falls_back() {
        let mut r = request();
        r.days_rest = Some(-1.0);
        assert_eq!(r.validate().expect("valid").scenario.days_rest, 2.0);
        r.days_rest = Some(f64::NAN);
        assert_eq!(r.validate().expect("valid").scenario.days_rest, 2.0);
        r.days_rest = Some(0.0);
        assert_eq!(r.validate().expect("valid").scenario.days_rest, 0.0);
    }

    #[test]
    fn missing_fields_are_listed() {
        let mut r = request();
        r.player_name = " ".into();
        r.opponent = String::new();
        let err = r.validate().expect_err("invalid");
        assert_eq!(err.to_string(), "Missing fields: player_name, opponent");
    }

    #[test]
    fn rejects_unknown_stat_and_nan_line() {
        let mut r = request();
        r.stat = "fg3m".into();
        assert!(matches!(r.validate(), Err(PredictError::InvalidRequest { .. })));
        let mut r = request();
        r.line = f64::NAN;
        assert!(matches!(r.validate(), Err(PredictError::InvalidRequest { .. })));
    }

    #[test]
    fn projection_pricing_uses_count_model() {
        let t = ProbabilityTranslator::default();
        let p = price_projection(&t, StatType::Stl, 0.0, 0.5, None).expect("priced");
        assert_eq!(p.probability_over, 0.0);
        assert_eq!(p.direction, crate::probability::Direction::Under);
        assert!(price_projection(&t, StatType::Pts, f64::NAN, 20.5, None).is_err());
    }

    #[test]
    fn request_json_defaults() {
        let r: PropRequest = serde_json::from_str(
            r#"{"player_name":"A B","stat":"reb","line":8.5,"opponent":"LAL"}"#,
        )
        .expect("json");
        assert!(r.is_home);
        assert_eq!(r.days_rest, None);
    }
}

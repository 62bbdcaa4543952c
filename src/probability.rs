//! Turns model output into an over/under probability for an arbitrary line.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use statrs::distribution::{DiscreteCDF, Poisson};
use statrs::function::erf::{erfc, erfc_inv};

use crate::config::DEFAULT_SIGMA;
use crate::features::Feature;

/// Bound on implied z-scores recovered from a probability.
pub const Z_CLAMP: f64 = 3.5;
pub const PROB_FLOOR: f64 = 0.01;
pub const PROB_CEIL: f64 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatType {
    Pts,
    Reb,
    Ast,
    Stl,
    Blk,
    Pra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountModel {
    Poisson,
    Normal,
}

impl StatType {
    pub const ALL: [StatType; 6] = [
        StatType::Pts,
        StatType::Reb,
        StatType::Ast,
        StatType::Stl,
        StatType::Blk,
        StatType::Pra,
    ];

    /// Stats with a trained classifier and a rolling baseline.
    pub const MODELED: [StatType; 3] = [StatType::Pts, StatType::Reb, StatType::Ast];

    pub fn key(self) -> &'static str {
        match self {
            StatType::Pts => "pts",
            StatType::Reb => "reb",
            StatType::Ast => "ast",
            StatType::Stl => "stl",
            StatType::Blk => "blk",
            StatType::Pra => "pra",
        }
    }

    pub fn count_model(self) -> CountModel {
        match self {
            StatType::Ast | StatType::Stl | StatType::Blk => CountModel::Poisson,
            StatType::Pts | StatType::Reb | StatType::Pra => CountModel::Normal,
        }
    }

    /// The 5-game average the classifier's target was defined against.
    pub fn baseline_feature(self) -> Option<Feature> {
        match self {
            StatType::Pts => Some(Feature::PtsL5),
            StatType::Reb => Some(Feature::RebL5),
            StatType::Ast => Some(Feature::AstL5),
            _ => None,
        }
    }

    /// Empirical spread feature, where one exists.
    pub fn spread_feature(self) -> Option<Feature> {
        match self {
            StatType::Pts => Some(Feature::PtsStdL10),
            _ => None,
        }
    }

    /// Spread used for re-centering when no empirical estimate exists.
    pub fn fallback_std_dev(self) -> f64 {
        match self {
            StatType::Pts => 8.0,
            StatType::Reb => 3.0,
            StatType::Ast => 2.5,
            _ => 5.0,
        }
    }
}

impl fmt::Display for StatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for StatType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pts" | "points" => Ok(StatType::Pts),
            "reb" | "rebounds" => Ok(StatType::Reb),
            "ast" | "assists" => Ok(StatType::Ast),
            "stl" | "steals" => Ok(StatType::Stl),
            "blk" | "blocks" => Ok(StatType::Blk),
            "pra" | "pts+reb+ast" => Ok(StatType::Pra),
            other => Err(format!("unknown stat '{other}'")),
        }
    }
}

/// Standard normal CDF.
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / std::f64::consts::SQRT_2)
}

/// Standard normal quantile; callers keep `p` inside (0, 1).
pub fn normal_quantile(p: f64) -> f64 {
    -std::f64::consts::SQRT_2 * erfc_inv(2.0 * p)
}

/// What the upstream model produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelOutput {
    /// Expected value of the stat.
    Projection(f64),
    /// `P(actual > rolling_average)` from a classifier.
    BaselineProbability {
        probability: f64,
        rolling_average: f64,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct ProbabilityTranslator {
    /// Spread for the Normal projection path when no residual estimate is given.
    pub default_sigma: f64,
}

impl Default for ProbabilityTranslator {
    fn default() -> Self {
        Self {
            default_sigma: DEFAULT_SIGMA,
        }
    }
}

impl ProbabilityTranslator {
    pub fn new(default_sigma: f64) -> Self {
        Self { default_sigma }
    }

    pub fn translate_to_line_probability(
        &self,
        stat: StatType,
        output: ModelOutput,
        line: f64,
        std_dev: Option<f64>,
    ) -> f64 {
        match output {
            ModelOutput::Projection(projection) => {
                let sigma = std_dev.unwrap_or(self.default_sigma);
                over_probability_from_projection(stat, projection, line, sigma)
            }
            ModelOutput::BaselineProbability {
                probability,
                rolling_average,
            } => {
                let sigma = std_dev.unwrap_or_else(|| stat.fallback_std_dev());
                recenter_baseline_probability(probability, rolling_average, line, sigma)
            }
        }
    }
}

/// `P(X > line)` given a point projection.
///
/// Low-count stats use a Poisson with `lambda = max(projection, 0)` and
/// compare against `floor(line)`; the rest use a Normal with spread `sigma`.
pub fn over_probability_from_projection(
    stat: StatType,
    projection: f64,
    line: f64,
    sigma: f64,
) -> f64 {
    let p = match stat.count_model() {
        CountModel::Poisson => poisson_over(projection.max(0.0), line.floor()),
        CountModel::Normal => {
            let sigma = if sigma.is_finite() && sigma > 0.0 {
                sigma
            } else {
                1.0
            };
            normal_cdf((projection - line) / sigma)
        }
    };
    p.clamp(0.0, 1.0)
}

fn poisson_over(lambda: f64, threshold: f64) -> f64 {
    if threshold < 0.0 {
        return 1.0;
    }
    match Poisson::new(lambda) {
        Ok(dist) => 1.0 - dist.cdf(threshold as u64),
        // lambda == 0: the count is always zero.
        Err(_) => 0.0,
    }
}

/// Moves a classifier's `P(actual > rolling_average)` onto the user's line.
///
/// The baseline probability is read as a z-score (clamped to ±[`Z_CLAMP`]),
/// shifted by `(line - rolling_average) / std_dev`, and mapped back, never
/// returning more certainty than [`PROB_FLOOR`]..[`PROB_CEIL`].
pub fn recenter_baseline_probability(
    base_prob: f64,
    rolling_average: f64,
    line: f64,
    std_dev: f64,
) -> f64 {
    let std_dev = if std_dev.is_finite() && std_dev > 0.0 {
        std_dev
    } else {
        1.0
    };

    let base_z = if base_prob >= 0.9999 {
        Z_CLAMP
    } else if base_prob <= 0.0001 {
        -Z_CLAMP
    } else {
        normal_quantile(base_prob).clamp(-Z_CLAMP, Z_CLAMP)
    };

    let shift = (line - rolling_average) / std_dev;
    normal_cdf(base_z - shift).clamp(PROB_FLOOR, PROB_CEIL)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Over,
    Under,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Over => f.write_str("Over"),
            Direction::Under => f.write_str("Under"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibratedPrediction {
    pub stat: StatType,
    pub line: f64,
    pub projection: f64,
    pub probability_over: f64,
    pub probability_under: f64,
    pub direction: Direction,
}

impl CalibratedPrediction {
    /// `probability_under` is always the complement; it is never estimated.
    pub fn new(stat: StatType, line: f64, projection: f64, probability_over: f64) -> Self {
        let probability_over = probability_over.clamp(0.0, 1.0);
        let direction = if probability_over >= 0.5 {
            Direction::Over
        } else {
            Direction::Under
        };
        Self {
            stat,
            line,
            projection,
            probability_over,
            probability_under: 1.0 - probability_over,
            direction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stat_aliases() {
        assert_eq!("PTS".parse::<StatType>(), Ok(StatType::Pts));
        assert_eq!(" assists ".parse::<StatType>(), Ok(StatType::Ast));
        assert!("fg3".parse::<StatType>().is_err());
        assert_eq!(StatType::Stl.count_model(), CountModel::Poisson);
        assert_eq!(StatType::Pra.count_model(), CountModel::Normal);
    }

    #[test]
    fn normal_helpers_are_consistent() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-15);
        assert!((normal_cdf(1.959963984540054) - 0.975).abs() < 1e-9);
        for p in [0.05, 0.3, 0.5, 0.8, 0.99] {
            assert!((normal_cdf(normal_quantile(p)) - p).abs() < 1e-9);
        }
    }

    #[test]
    fn poisson_path_uses_floor_of_line() {
        // P(X > 2) for lambda 3 = 1 - e^-3 (1 + 3 + 4.5)
        let expected = 1.0 - (-3.0_f64).exp() * 8.5;
        let p = over_probability_from_projection(StatType::Ast, 3.0, 2.5, 6.0);
        assert!((p - expected).abs() < 1e-9);
        let same = over_probability_from_projection(StatType::Ast, 3.0, 2.0, 6.0);
        assert!((p - same).abs() < 1e-12);
    }

    #[test]
    fn poisson_edge_cases() {
        assert_eq!(over_probability_from_projection(StatType::Blk, -1.0, 0.5, 1.0), 0.0);
        assert_eq!(over_probability_from_projection(StatType::Stl, 2.0, -0.5, 1.0), 1.0);
    }

    #[test]
    fn normal_path_centers_on_projection() {
        let p = over_probability_from_projection(StatType::Pts, 25.0, 25.0, 6.0);
        assert!((p - 0.5).abs() < 1e-12);
        let high = over_probability_from_projection(StatType::Pts, 31.0, 25.0, 6.0);
        assert!((high - normal_cdf(1.0)).abs() < 1e-12);
        // Non-positive sigma falls back to 1.
        let unit = over_probability_from_projection(StatType::Reb, 9.0, 8.0, 0.0);
        assert!((unit - normal_cdf(1.0)).abs() < 1e-12);
    }

    #[test]
    fn recentering_is_identity_at_the_average() {
        let p = recenter_baseline_probability(0.5, 15.0, 15.0, 6.0);
        assert!((p - 0.5).abs() < 1e-12);
        let q = recenter_baseline_probability(0.7, 15.0, 15.0, 6.0);
        assert!((q - 0.7).abs() < 1e-9);
    }

    #[test]
    fn recentering_clamps_extremes() {
        assert_eq!(recenter_baseline_probability(1.0, 10.0, 0.0, 1.0), PROB_CEIL);
        assert_eq!(recenter_baseline_probability(0.0, 10.0, 30.0, 1.0), PROB_FLOOR);
        let p = recenter_baseline_probability(0.99999, 10.0, 10.0, 4.0);
        assert!((p - PROB_CEIL).abs() < 1e-12);
    }

    #[test]
    fn recentering_decreases_with_line() {
        let mut prev = f64::INFINITY;
        for step in 0..20 {
            let line = 12.0 + step as f64 * 0.5;
            let p = recenter_baseline_probability(0.55, 15.0, line, 6.0);
            assert!(p < prev, "line {line}: {p} !< {prev}");
            prev = p;
        }
    }

    #[test]
    fn prediction_probabilities_are_complementary() {
        for p in [0.0, 0.01, 0.123456789, 0.5, 0.7, 0.99, 1.0] {
            let pred = CalibratedPrediction::new(StatType::Pts, 20.5, 21.0, p);
            assert_eq!(pred.probability_over + pred.probability_under, 1.0);
        }
        assert_eq!(
            CalibratedPrediction::new(StatType::Pts, 1.0, 1.0, 0.5).direction,
            Direction::Over
        );
        assert_eq!(
            CalibratedPrediction::new(StatType::Pts, 1.0, 1.0, 0.4999).direction,
            Direction::Under
        );
    }

    #[test]
    fn translator_dispatches_on_output_kind() {
        let t = ProbabilityTranslator::default();
        let direct =
            t.translate_to_line_probability(StatType::Pts, ModelOutput::Projection(26.0), 20.0, None);
        assert!((direct - normal_cdf(1.0)).abs() < 1e-12);
        let base = t.translate_to_line_probability(
            StatType::Reb,
            ModelOutput::BaselineProbability {
                probability: 0.5,
                rolling_average: 8.0,
            },
            11.0,
            None,
        );
        assert!((base - normal_cdf(-1.0)).abs() < 1e-12);
    }
}

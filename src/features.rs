//! Fixed-order feature vectors fed to the per-stat classifiers.
//!
//! [`player_feature_rows`] is the only place context and rolling features are
//! combined; the training export and live inference both go through it.

use std::fmt;
use std::ops::Index;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::context::{self, GameContext};
use crate::error::PredictError;
use crate::history_store::HistorySource;
use crate::opponent_defense::{self, DefenseCache};
use crate::rolling::{self, RollingFeatures};
use crate::timeline::{PlayerRef, PlayerTimeline, StatLine};

pub const FEATURE_COUNT: usize = 17;

/// Classifier input columns. The declaration order is the column order the
/// models were trained with; reordering requires retraining every model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    IsHome,
    DaysRest,
    OppPtsAllowedL10,
    PtsL5,
    PtsL10,
    PtsEmaL5,
    PtsStdL10,
    RebL5,
    RebL10,
    RebEmaL5,
    AstL5,
    AstL10,
    AstEmaL5,
    MinL5,
    MinL10,
    FgPctL5,
    FgPctL10,
}

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::IsHome,
        Feature::DaysRest,
        Feature::OppPtsAllowedL10,
        Feature::PtsL5,
        Feature::PtsL10,
        Feature::PtsEmaL5,
        Feature::PtsStdL10,
        Feature::RebL5,
        Feature::RebL10,
        Feature::RebEmaL5,
        Feature::AstL5,
        Feature::AstL10,
        Feature::AstEmaL5,
        Feature::MinL5,
        Feature::MinL10,
        Feature::FgPctL5,
        Feature::FgPctL10,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Feature::IsHome => "is_home",
            Feature::DaysRest => "days_rest",
            Feature::OppPtsAllowedL10 => "opp_pts_allowed_L10",
            Feature::PtsL5 => "pts_L5",
            Feature::PtsL10 => "pts_L10",
            Feature::PtsEmaL5 => "pts_ema_L5",
            Feature::PtsStdL10 => "pts_std_L10",
            Feature::RebL5 => "reb_L5",
            Feature::RebL10 => "reb_L10",
            Feature::RebEmaL5 => "reb_ema_L5",
            Feature::AstL5 => "ast_L5",
            Feature::AstL10 => "ast_L10",
            Feature::AstEmaL5 => "ast_ema_L5",
            Feature::MinL5 => "min_L5",
            Feature::MinL10 => "min_L10",
            Feature::FgPctL5 => "fg_pct_L5",
            Feature::FgPctL10 => "fg_pct_L10",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name.trim())
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn feature_names() -> [&'static str; FEATURE_COUNT] {
    Feature::ALL.map(Feature::name)
}

/// A complete feature vector: every slot is a finite number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Option<Self> {
        values
            .iter()
            .all(|v| v.is_finite())
            .then_some(Self { values })
    }

    pub fn get(&self, feature: Feature) -> f64 {
        self.values[feature.index()]
    }

    pub fn as_array(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (Feature, f64)> + '_ {
        Feature::ALL.into_iter().map(|f| (f, self.get(f)))
    }
}

impl Index<Feature> for FeatureVector {
    type Output = f64;

    fn index(&self, feature: Feature) -> &f64 {
        &self.values[feature.index()]
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(FEATURE_COUNT))?;
        for (feature, value) in self.iter() {
            map.serialize_entry(feature.name(), &value)?;
        }
        map.end()
    }
}

/// Feature slots while a row is being assembled.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PartialFeatures {
    slots: [Option<f64>; FEATURE_COUNT],
}

impl PartialFeatures {
    fn from_parts(ctx: &GameContext, r: &RollingFeatures) -> Self {
        let mut out = Self::default();
        out.set(Feature::IsHome, Some(ctx.is_home));
        out.set(Feature::DaysRest, Some(ctx.days_rest));
        out.set(Feature::PtsL5, r.pts_l5);
        out.set(Feature::PtsL10, r.pts_l10);
        out.set(Feature::PtsEmaL5, r.pts_ema_l5);
        out.set(Feature::PtsStdL10, r.pts_std_l10);
        out.set(Feature::RebL5, r.reb_l5);
        out.set(Feature::RebL10, r.reb_l10);
        out.set(Feature::RebEmaL5, r.reb_ema_l5);
        out.set(Feature::AstL5, r.ast_l5);
        out.set(Feature::AstL10, r.ast_l10);
        out.set(Feature::AstEmaL5, r.ast_ema_l5);
        out.set(Feature::MinL5, r.min_l5);
        out.set(Feature::MinL10, r.min_l10);
        out.set(Feature::FgPctL5, r.fg_pct_l5);
        out.set(Feature::FgPctL10, r.fg_pct_l10);
        out
    }

    pub fn set(&mut self, feature: Feature, value: Option<f64>) {
        self.slots[feature.index()] = value.filter(|v| v.is_finite());
    }

    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.slots[feature.index()]
    }

    pub fn missing(&self) -> Vec<Feature> {
        Feature::ALL
            .into_iter()
            .filter(|f| self.get(*f).is_none())
            .collect()
    }

    /// All-or-nothing: a vector with any missing slot is rejected whole.
    pub fn complete(&self) -> Option<FeatureVector> {
        let mut values = [0.0; FEATURE_COUNT];
        for (dst, slot) in values.iter_mut().zip(self.slots) {
            *dst = slot?;
        }
        FeatureVector::from_array(values)
    }
}

/// Context + rolling features for one game of a player's timeline.
/// The opponent-defense slot is left empty for the caller to fill.
#[derive(Debug, Clone)]
pub struct FeatureRow<'a> {
    pub line: &'a StatLine,
    pub opponent: String,
    pub features: PartialFeatures,
}

impl FeatureRow<'_> {
    /// Did-not-play games are never training targets or inference anchors.
    pub fn is_candidate(&self) -> bool {
        self.line.played()
    }
}

pub fn player_feature_rows(timeline: &PlayerTimeline) -> Vec<FeatureRow<'_>> {
    let contexts = context::build_context(timeline);
    let rolling = rolling::rolling_features(timeline);
    timeline
        .lines()
        .iter()
        .zip(contexts)
        .zip(rolling)
        .map(|((line, ctx), r)| FeatureRow {
            line,
            features: PartialFeatures::from_parts(&ctx, &r),
            opponent: ctx.opponent,
        })
        .collect()
}

/// Most recent candidate row whose player-side features are all present.
pub fn inference_anchor<'a, 'b>(rows: &'b [FeatureRow<'a>]) -> Option<&'b FeatureRow<'a>> {
    rows.iter().rev().find(|row| {
        row.is_candidate()
            && row
                .features
                .missing()
                .iter()
                .all(|f| *f == Feature::OppPtsAllowedL10)
    })
}

/// The game being predicted; it has not happened yet, so its context comes
/// from the caller rather than from history.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub opponent: String,
    pub is_home: bool,
    pub days_rest: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InferenceFeatures {
    pub player: PlayerRef,
    pub anchor_game_id: String,
    pub anchor_date: NaiveDate,
    pub features: FeatureVector,
}

pub fn build_inference_features<S: HistorySource + ?Sized>(
    source: &S,
    player_name: &str,
    scenario: &Scenario,
) -> Result<InferenceFeatures, PredictError> {
    build_inference_features_with_cache(source, None, player_name, scenario)
}

pub fn build_inference_features_with_cache<S: HistorySource + ?Sized>(
    source: &S,
    cache: Option<&DefenseCache>,
    player_name: &str,
    scenario: &Scenario,
) -> Result<InferenceFeatures, PredictError> {
    let opponent = scenario.opponent.trim().to_ascii_uppercase();
    if opponent.is_empty() {
        return Err(PredictError::invalid("opponent must not be empty."));
    }

    let player = source
        .find_player(player_name)?
        .ok_or_else(|| PredictError::not_found("Player"))?;

    let timeline = source.player_timeline(player.player_id)?;
    if timeline.is_empty() {
        return Err(PredictError::insufficient("No historical stats found."));
    }

    let rows = player_feature_rows(&timeline);
    let anchor = inference_anchor(&rows)
        .ok_or_else(|| PredictError::insufficient("Not enough data to build features."))?;
    let as_of = anchor.line.game_date;

    let lookup = || -> Result<Option<f64>, PredictError> {
        let games = source.opponent_points_allowed(&opponent, as_of)?;
        Ok(opponent_defense::rating_as_of(games, as_of))
    };
    let opp_def = match cache {
        Some(cache) => cache.get_or_compute(&opponent, as_of, lookup)?,
        None => lookup()?,
    };
    let opp_def = opp_def.ok_or_else(|| {
        PredictError::insufficient("Not enough opponent history to build features.")
    })?;

    let mut features = anchor.features;
    features.set(
        Feature::IsHome,
        Some(if scenario.is_home { 1.0 } else { 0.0 }),
    );
    features.set(Feature::DaysRest, Some(scenario.days_rest));
    features.set(Feature::OppPtsAllowedL10, Some(opp_def));
    let features = features
        .complete()
        .ok_or_else(|| PredictError::insufficient("Not enough data to build features."))?;

    debug!(
        player_id = player.player_id,
        anchor = %anchor.line.game_id,
        %opponent,
        "built inference features"
    );

    Ok(InferenceFeatures {
        player,
        anchor_game_id: anchor.line.game_id.clone(),
        anchor_date: as_of,
        features,
    })
}

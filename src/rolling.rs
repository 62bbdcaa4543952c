//! Trailing per-player statistics.
//!
//! Every value emitted for game `i` is computed from games strictly before `i`:
//! the state is snapshotted first and only then updated with game `i`.
//! Games under [`GARBAGE_TIME_MINUTES`] never enter the state, but they still
//! receive a snapshot like any other game.

use std::collections::VecDeque;

use crate::timeline::{PlayerTimeline, StatLine};

pub const GARBAGE_TIME_MINUTES: f64 = 10.0;
pub const SHORT_WINDOW: usize = 5;
pub const LONG_WINDOW: usize = 10;
pub const EMA_SPAN: f64 = 5.0;
pub const STD_MIN_PERIODS: usize = 5;

/// Trailing features for one game. `None` means "not computable yet".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RollingFeatures {
    pub pts_l5: Option<f64>,
    pub pts_l10: Option<f64>,
    pub pts_ema_l5: Option<f64>,
    pub pts_std_l10: Option<f64>,
    pub reb_l5: Option<f64>,
    pub reb_l10: Option<f64>,
    pub reb_ema_l5: Option<f64>,
    pub ast_l5: Option<f64>,
    pub ast_l10: Option<f64>,
    pub ast_ema_l5: Option<f64>,
    pub min_l5: Option<f64>,
    pub min_l10: Option<f64>,
    pub fg_pct_l5: Option<f64>,
    pub fg_pct_l10: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    pts: f64,
    reb: f64,
    ast: f64,
    min: f64,
    fg_pct: f64,
}

fn observation(line: &StatLine) -> Option<Observation> {
    if line.minutes_played < GARBAGE_TIME_MINUTES {
        return None;
    }
    Some(Observation {
        pts: line.points as f64,
        reb: line.rebounds as f64,
        ast: line.assists as f64,
        min: line.minutes_played,
        fg_pct: line.fg_pct(),
    })
}

/// Last `cap` valid observations, oldest first.
#[derive(Debug, Clone)]
pub(crate) struct TrailingWindow {
    cap: usize,
    values: VecDeque<f64>,
}

impl TrailingWindow {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            cap,
            values: VecDeque::with_capacity(cap + 1),
        }
    }

    pub(crate) fn push(&mut self, value: f64) {
        self.values.push_back(value);
        while self.values.len() > self.cap {
            self.values.pop_front();
        }
    }

    pub(crate) fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let sum: f64 = self.values.iter().sum();
        Some(sum / self.values.len() as f64)
    }

    /// Sample standard deviation (n - 1 denominator).
    fn std_dev(&self, min_periods: usize) -> Option<f64> {
        let n = self.values.len();
        if n < min_periods.max(2) {
            return None;
        }
        let mean = self.mean()?;
        let ss: f64 = self.values.iter().map(|v| (v - mean).powi(2)).sum();
        Some((ss / (n - 1) as f64).sqrt())
    }
}

/// Recursive EMA with `alpha = 2 / (span + 1)`, seeded by the first value.
///
/// Masked games still occupy a slot: the previous value decays once more for
/// every masked game since the last observation, and the update is
/// renormalised.
#[derive(Debug, Clone)]
struct Ema {
    alpha: f64,
    value: Option<f64>,
    masked_since: i32,
}

impl Ema {
    fn with_span(span: f64) -> Self {
        Self {
            alpha: 2.0 / (span + 1.0),
            value: None,
            masked_since: 0,
        }
    }

    fn push(&mut self, x: f64) {
        self.value = Some(match self.value {
            Some(prev) => {
                let old_wt = (1.0 - self.alpha).powi(self.masked_since + 1);
                (old_wt * prev + self.alpha * x) / (old_wt + self.alpha)
            }
            None => x,
        });
        self.masked_since = 0;
    }

    fn skip(&mut self) {
        if self.value.is_some() {
            self.masked_since += 1;
        }
    }
}

#[derive(Debug, Clone)]
struct StatTrack {
    short: TrailingWindow,
    long: TrailingWindow,
}

impl StatTrack {
    fn new() -> Self {
        Self {
            short: TrailingWindow::new(SHORT_WINDOW),
            long: TrailingWindow::new(LONG_WINDOW),
        }
    }

    fn push(&mut self, x: f64) {
        self.short.push(x);
        self.long.push(x);
    }
}

/// Everything known about a player "so far" while walking the timeline.
#[derive(Debug, Clone)]
struct RollingState {
    pts: StatTrack,
    reb: StatTrack,
    ast: StatTrack,
    min: StatTrack,
    fg_pct: StatTrack,
    pts_ema: Ema,
    reb_ema: Ema,
    ast_ema: Ema,
}

impl RollingState {
    fn new() -> Self {
        Self {
            pts: StatTrack::new(),
            reb: StatTrack::new(),
            ast: StatTrack::new(),
            min: StatTrack::new(),
            fg_pct: StatTrack::new(),
            pts_ema: Ema::with_span(EMA_SPAN),
            reb_ema: Ema::with_span(EMA_SPAN),
            ast_ema: Ema::with_span(EMA_SPAN),
        }
    }

    fn snapshot(&self) -> RollingFeatures {
        RollingFeatures {
            pts_l5: self.pts.short.mean(),
            pts_l10: self.pts.long.mean(),
            pts_ema_l5: self.pts_ema.value,
            pts_std_l10: self.pts.long.std_dev(STD_MIN_PERIODS),
            reb_l5: self.reb.short.mean(),
            reb_l10: self.reb.long.mean(),
            reb_ema_l5: self.reb_ema.value,
            ast_l5: self.ast.short.mean(),
            ast_l10: self.ast.long.mean(),
            ast_ema_l5: self.ast_ema.value,
            min_l5: self.min.short.mean(),
            min_l10: self.min.long.mean(),
            fg_pct_l5: self.fg_pct.short.mean(),
            fg_pct_l10: self.fg_pct.long.mean(),
        }
    }

    fn push(&mut self, obs: Observation) {
        self.pts.push(obs.pts);
        self.reb.push(obs.reb);
        self.ast.push(obs.ast);
        self.min.push(obs.min);
        self.fg_pct.push(obs.fg_pct);
        self.pts_ema.push(obs.pts);
        self.reb_ema.push(obs.reb);
        self.ast_ema.push(obs.ast);
    }

    /// A masked game leaves the windows alone but ages the EMAs.
    fn skip(&mut self) {
        self.pts_ema.skip();
        self.reb_ema.skip();
        self.ast_ema.skip();
    }
}

/// Trailing features for every game in the timeline, index-aligned with
/// `timeline.lines()`.
pub fn rolling_features(timeline: &PlayerTimeline) -> Vec<RollingFeatures> {
    let lines = timeline.lines();
    let mut state = RollingState::new();
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        out.push(state.snapshot());
        match observation(line) {
            Some(obs) => state.push(obs),
            None => state.skip(),
        }
    }
    out
}

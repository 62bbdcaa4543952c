use chrono::NaiveDate;

use crate::timeline::{PlayerTimeline, StatLine};

/// Rest assumed for a player's first recorded game.
pub const DEFAULT_DAYS_REST: f64 = 3.0;

#[derive(Debug, Clone, PartialEq)]
pub struct GameContext {
    pub is_home: f64,
    pub days_rest: f64,
    pub opponent: String,
}

pub fn is_home(line: &StatLine) -> bool {
    line.team_code.eq_ignore_ascii_case(&line.home_team)
}

pub fn opponent(line: &StatLine) -> String {
    if is_home(line) {
        line.away_team.to_ascii_uppercase()
    } else {
        line.home_team.to_ascii_uppercase()
    }
}

/// One context row per timeline entry, using the previous game in the
/// timeline for rest days.
pub fn build_context(timeline: &PlayerTimeline) -> Vec<GameContext> {
    let lines = timeline.lines();
    let mut out = Vec::with_capacity(lines.len());
    let mut prev_date: Option<NaiveDate> = None;
    for line in lines {
        let days_rest = match prev_date {
            Some(prev) => (line.game_date - prev).num_days() as f64,
            None => DEFAULT_DAYS_REST,
        };
        out.push(GameContext {
            is_home: if is_home(line) { 1.0 } else { 0.0 },
            days_rest,
            opponent: opponent(line),
        });
        prev_date = Some(line.game_date);
    }
    out
}

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One player's full-game box score for one game.
///
/// Unique per `(player_id, game_id)`. Rows are replaced wholesale on
/// re-ingestion, never patched field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatLine {
    pub player_id: u32,
    pub game_id: String,
    pub game_date: NaiveDate,
    /// Team the player was on for this game.
    pub team_code: String,
    pub home_team: String,
    pub away_team: String,
    pub points: u32,
    pub rebounds: u32,
    pub assists: u32,
    pub minutes_played: f64,
    pub field_goals_made: u32,
    pub field_goals_attempted: u32,
}

impl StatLine {
    pub fn fg_pct(&self) -> f64 {
        if self.field_goals_attempted == 0 {
            0.0
        } else {
            self.field_goals_made as f64 / self.field_goals_attempted as f64
        }
    }

    pub fn played(&self) -> bool {
        self.minutes_played > 0.0
    }

    fn chrono_cmp(&self, other: &Self) -> Ordering {
        self.game_date
            .cmp(&other.game_date)
            .then_with(|| self.game_id.cmp(&other.game_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRef {
    pub player_id: u32,
    pub first_name: String,
    pub last_name: String,
    pub team_code: Option<String>,
}

impl PlayerRef {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

/// A single player's games in ascending date order.
///
/// Construction always re-sorts; storage order is never trusted.
#[derive(Debug, Clone, Default)]
pub struct PlayerTimeline {
    player_id: u32,
    lines: Vec<StatLine>,
}

impl PlayerTimeline {
    pub fn new(player_id: u32, mut lines: Vec<StatLine>) -> Self {
        lines.retain(|line| line.player_id == player_id);
        lines.sort_by(StatLine::chrono_cmp);
        // Same game twice means a double ingest; keep the later copy.
        lines.reverse();
        lines.dedup_by(|a, b| a.game_id == b.game_id);
        lines.reverse();
        Self { player_id, lines }
    }

    pub fn player_id(&self) -> u32 {
        self.player_id
    }

    pub fn lines(&self) -> &[StatLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Splits a flat row set into one timeline per player, ordered by player id.
pub fn group_timelines(rows: Vec<StatLine>) -> Vec<PlayerTimeline> {
    let mut by_player: std::collections::BTreeMap<u32, Vec<StatLine>> =
        std::collections::BTreeMap::new();
    for row in rows {
        by_player.entry(row.player_id).or_default().push(row);
    }
    by_player
        .into_iter()
        .map(|(player_id, lines)| PlayerTimeline::new(player_id, lines))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::line;
    use super::*;

    #[test]
    fn timeline_sorts_and_dedups() {
        let rows = vec![
            line(1, "g3", "2024-01-05", 30, 30.0),
            line(1, "g1", "2024-01-01", 10, 30.0),
            line(2, "x", "2024-01-02", 99, 30.0),
            line(1, "g2", "2024-01-03", 20, 30.0),
            line(1, "g2", "2024-01-03", 22, 30.0),
        ];
        let tl = PlayerTimeline::new(1, rows);
        let ids: Vec<&str> = tl.lines().iter().map(|l| l.game_id.as_str()).collect();
        assert_eq!(ids, vec!["g1", "g2", "g3"]);
        assert_eq!(tl.lines()[1].points, 22);
    }

    #[test]
    fn fg_pct_handles_zero_attempts() {
        let mut l = line(1, "g1", "2024-01-01", 0, 0.0);
        l.field_goals_attempted = 0;
        l.field_goals_made = 0;
        assert_eq!(l.fg_pct(), 0.0);
    }
}

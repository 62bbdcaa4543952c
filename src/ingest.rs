//! Imports box-score rows from a local CSV file into the history store.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Deserialize;
use tracing::{info, warn};

use crate::history_store::{self, FULL_GAME_PERIOD, GameRecord};
use crate::timeline::{PlayerRef, StatLine};

/// One CSV row. `period` is optional and defaults to the full game.
#[derive(Debug, Clone, Deserialize)]
pub struct BoxScoreRecord {
    pub game_id: String,
    pub game_date: String,
    pub player_id: u32,
    pub first_name: String,
    pub last_name: String,
    pub team_code: String,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub pts: Option<u32>,
    #[serde(default)]
    pub reb: Option<u32>,
    #[serde(default)]
    pub ast: Option<u32>,
    #[serde(default)]
    pub min: Option<String>,
    #[serde(default)]
    pub fgm: Option<u32>,
    #[serde(default)]
    pub fga: Option<u32>,
    #[serde(default)]
    pub period: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub rows_read: usize,
    pub rows_upserted: usize,
    pub rows_skipped: usize,
    pub players: usize,
    pub games: usize,
    pub errors: Vec<String>,
}

/// Minutes as decimal or `MM:SS`; blank or unparseable input is zero.
pub fn parse_minutes(raw: &str) -> f64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0.0;
    }
    let parsed = match raw.split_once(':') {
        Some((m, s)) => m
            .trim()
            .parse::<f64>()
            .ok()
            .zip(s.trim().parse::<f64>().ok())
            .map(|(m, s)| m + s / 60.0),
        None => raw.parse::<f64>().ok(),
    };
    parsed.filter(|m| m.is_finite() && *m >= 0.0).unwrap_or(0.0)
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time component.
pub fn parse_game_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Rows from test fixtures upstream carry these id prefixes.
pub fn is_test_game(game_id: &str) -> bool {
    let id = game_id.trim();
    id.starts_with("TEST") || id.starts_with("999")
}

impl BoxScoreRecord {
    fn to_stat_line(&self, game_date: NaiveDate) -> StatLine {
        StatLine {
            player_id: self.player_id,
            game_id: self.game_id.trim().to_string(),
            game_date,
            team_code: self.team_code.trim().to_ascii_uppercase(),
            home_team: self.home_team.trim().to_ascii_uppercase(),
            away_team: self.away_team.trim().to_ascii_uppercase(),
            points: self.pts.unwrap_or(0),
            rebounds: self.reb.unwrap_or(0),
            assists: self.ast.unwrap_or(0),
            minutes_played: self.min.as_deref().map(parse_minutes).unwrap_or(0.0),
            field_goals_made: self.fgm.unwrap_or(0),
            field_goals_attempted: self.fga.unwrap_or(0),
        }
    }
}

pub fn ingest_csv_file(conn: &mut Connection, path: &Path) -> Result<IngestSummary> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("open box scores {}", path.display()))?;
    let summary = ingest_csv(conn, file)?;
    info!(
        path = %path.display(),
        read = summary.rows_read,
        upserted = summary.rows_upserted,
        skipped = summary.rows_skipped,
        "ingested box scores"
    );
    Ok(summary)
}

/// All rows land in a single transaction: a failed import leaves the store
/// as it was.
pub fn ingest_csv<R: Read>(conn: &mut Connection, input: R) -> Result<IngestSummary> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
    let mut summary = IngestSummary::default();
    let mut players = HashSet::new();
    let mut games = HashSet::new();

    let tx = conn.transaction().context("begin ingest transaction")?;
    for (idx, record) in reader.deserialize::<BoxScoreRecord>().enumerate() {
        summary.rows_read += 1;
        let line_no = idx + 2;
        let record = match record {
            Ok(r) => r,
            Err(err) => {
                summary.rows_skipped += 1;
                summary.errors.push(format!("line {line_no}: {err}"));
                continue;
            }
        };
        if is_test_game(&record.game_id) {
            summary.rows_skipped += 1;
            continue;
        }
        let Some(game_date) = parse_game_date(&record.game_date) else {
            summary.rows_skipped += 1;
            summary
                .errors
                .push(format!("line {line_no}: bad game_date {:?}", record.game_date));
            continue;
        };

        let line = record.to_stat_line(game_date);
        // Later rows win, so a mid-file trade leaves the newest team code.
        history_store::upsert_player(
            &tx,
            &PlayerRef {
                player_id: line.player_id,
                first_name: record.first_name.trim().to_string(),
                last_name: record.last_name.trim().to_string(),
                team_code: Some(line.team_code.clone()),
            },
        )?;
        history_store::upsert_game(
            &tx,
            &GameRecord {
                game_id: line.game_id.clone(),
                game_date,
                home_team: line.home_team.clone(),
                away_team: line.away_team.clone(),
            },
        )?;
        players.insert(line.player_id);
        games.insert(line.game_id.clone());
        history_store::upsert_stat_line(&tx, &line, record.period.unwrap_or(FULL_GAME_PERIOD))?;
        summary.rows_upserted += 1;
    }
    tx.commit().context("commit ingest transaction")?;

    summary.players = players.len();
    summary.games = games.len();
    if !summary.errors.is_empty() {
        warn!(errors = summary.errors.len(), "some box-score rows were rejected");
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_accept_clock_and_decimal() {
        assert_eq!(parse_minutes("34:30"), 34.5);
        assert_eq!(parse_minutes("12.25"), 12.25);
        assert_eq!(parse_minutes(""), 0.0);
        assert_eq!(parse_minutes("DNP"), 0.0);
        assert_eq!(parse_minutes("-3"), 0.0);
    }

    #[test]
    fn dates_ignore_time_suffix() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 9);
        assert_eq!(parse_game_date("2024-03-09T00:00:00"), d);
        assert_eq!(parse_game_date("2024-03-09"), d);
        assert_eq!(parse_game_date("03/09/2024"), None);
    }

    #[test]
    fn test_games_are_recognized() {
        assert!(is_test_game("TEST_001"));
        assert!(is_test_game("9990001"));
        assert!(!is_test_game("0022300001"));
    }
}

//! Coverage report over the history store.

use std::fmt;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Serialize;

/// Full game plus four quarters.
pub const PERIODS_PER_GAME: i64 = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataSummary {
    pub players: usize,
    pub players_with_stats: usize,
    pub games: usize,
    pub games_with_stats: usize,
    pub stat_rows: usize,
    pub first_game_date: Option<String>,
    pub last_game_date: Option<String>,
    /// Games with rows for every period.
    pub fully_covered_games: usize,
    pub per_period: Vec<(u8, usize)>,
    /// A few `(game_id, distinct periods)` pairs for games missing periods.
    pub incomplete_sample: Vec<(String, usize)>,
}

impl DataSummary {
    pub fn games_missing_periods(&self) -> usize {
        self.games_with_stats.saturating_sub(self.fully_covered_games)
    }
}

fn count(conn: &Connection, sql: &str) -> Result<usize> {
    let n: i64 = conn
        .query_row(sql, [], |row| row.get(0))
        .with_context(|| format!("summary query: {sql}"))?;
    Ok(n.max(0) as usize)
}

pub fn summarize(conn: &Connection) -> Result<DataSummary> {
    let (first_game_date, last_game_date) = conn
        .query_row("SELECT MIN(game_date), MAX(game_date) FROM games", [], |row| {
            Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?))
        })
        .context("query game date range")?;

    let mut stmt = conn
        .prepare("SELECT period, COUNT(*) FROM player_stats GROUP BY period ORDER BY period")
        .context("prepare per-period counts")?;
    let per_period = stmt
        .query_map([], |row| {
            Ok((row.get::<_, i64>(0)? as u8, row.get::<_, i64>(1)? as usize))
        })
        .context("query per-period counts")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("read per-period counts")?;

    let mut stmt = conn
        .prepare(
            "SELECT game_id, COUNT(DISTINCT period) AS periods FROM player_stats
             GROUP BY game_id HAVING periods < ?1 ORDER BY periods, game_id LIMIT 10",
        )
        .context("prepare incomplete games")?;
    let incomplete_sample = stmt
        .query_map(params![PERIODS_PER_GAME], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })
        .context("query incomplete games")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("read incomplete games")?;

    let fully_covered_games: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM (
                SELECT game_id FROM player_stats GROUP BY game_id
                HAVING COUNT(DISTINCT period) >= ?1
             )",
            params![PERIODS_PER_GAME],
            |row| row.get(0),
        )
        .context("query fully covered games")?;

    Ok(DataSummary {
        players: count(conn, "SELECT COUNT(*) FROM players")?,
        players_with_stats: count(conn, "SELECT COUNT(DISTINCT player_id) FROM player_stats")?,
        games: count(conn, "SELECT COUNT(*) FROM games")?,
        games_with_stats: count(conn, "SELECT COUNT(DISTINCT game_id) FROM player_stats")?,
        stat_rows: count(conn, "SELECT COUNT(*) FROM player_stats")?,
        first_game_date,
        last_game_date,
        fully_covered_games: fully_covered_games.max(0) as usize,
        per_period,
        incomplete_sample,
    })
}

impl fmt::Display for DataSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Data Summary ===")?;
        writeln!(f, "Players: {} (with stats: {})", self.players, self.players_with_stats)?;
        writeln!(f, "Games: {} (with stats: {})", self.games, self.games_with_stats)?;
        writeln!(f, "Stat rows: {}", self.stat_rows)?;
        writeln!(
            f,
            "Game date range: {} -> {}",
            self.first_game_date.as_deref().unwrap_or("n/a"),
            self.last_game_date.as_deref().unwrap_or("n/a")
        )?;
        writeln!(f, "Games fully covered (periods 0-4): {}", self.fully_covered_games)?;
        writeln!(f, "Games missing periods: {}", self.games_missing_periods())?;
        writeln!(f)?;
        writeln!(f, "Per-period row counts:")?;
        for (period, rows) in &self.per_period {
            writeln!(f, "  Period {period}: {rows}")?;
        }
        if !self.incomplete_sample.is_empty() {
            writeln!(f)?;
            writeln!(f, "Sample incomplete games (game_id: periods):")?;
            for (game_id, periods) in &self.incomplete_sample {
                writeln!(f, "  {game_id}: {periods}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history_store::{SqliteHistory, upsert_game, upsert_player, upsert_stat_line, GameRecord};
    use crate::timeline::{PlayerRef, fixtures::line};

    #[test]
    fn empty_store_summarizes_to_zero() {
        let store = SqliteHistory::in_memory().expect("db");
        let s = summarize(store.conn()).expect("summary");
        assert_eq!(s, DataSummary::default());
    }

    #[test]
    fn counts_periods_and_coverage() {
        let store = SqliteHistory::in_memory().expect("db");
        let conn = store.conn();
        let row = line(1, "G1", "2024-01-05", 20, 30.0);
        upsert_player(
            conn,
            &PlayerRef {
                player_id: 1,
                first_name: "A".into(),
                last_name: "B".into(),
                team_code: None,
            },
        )
        .expect("player");
        upsert_game(
            conn,
            &GameRecord {
                game_id: "G1".into(),
                game_date: row.game_date,
                home_team: "BOS".into(),
                away_team: "NYK".into(),
            },
        )
        .expect("game");
        for period in 0..3 {
            upsert_stat_line(conn, &row, period).expect("stats");
        }

        let s = summarize(conn).expect("summary");
        assert_eq!(s.stat_rows, 3);
        assert_eq!(s.per_period, vec![(0, 1), (1, 1), (2, 1)]);
        assert_eq!(s.fully_covered_games, 0);
        assert_eq!(s.games_missing_periods(), 1);
        assert_eq!(s.incomplete_sample, vec![("G1".to_string(), 3)]);
        assert_eq!(s.first_game_date.as_deref(), Some("2024-01-05"));
    }
}

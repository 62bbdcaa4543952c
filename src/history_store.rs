use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};
use tracing::debug;

use crate::opponent_defense::{self, DefenseGame};
use crate::timeline::{PlayerRef, PlayerTimeline, StatLine};

/// Period value for full-game totals; 1-4 are quarters.
pub const FULL_GAME_PERIOD: u8 = 0;

const DATE_FMT: &str = "%Y-%m-%d";

/// Read access to recorded history. Everything the feature pipeline needs
/// from storage goes through here.
pub trait HistorySource {
    fn find_player(&self, name: &str) -> Result<Option<PlayerRef>>;

    fn all_players(&self) -> Result<Vec<PlayerRef>>;

    /// Full-game rows for one player, oldest first. Empty when unknown.
    fn player_timeline(&self, player_id: u32) -> Result<PlayerTimeline>;

    /// Points scored against `team` per game, games strictly before `before`.
    fn opponent_points_allowed(&self, team: &str, before: NaiveDate) -> Result<Vec<DefenseGame>>;

    fn all_full_game_rows(&self) -> Result<Vec<StatLine>>;
}

/// Name lookup shared by every source: exact first + last name when the query
/// has two or more words, otherwise the first player whose first or last name
/// contains the query.
pub fn resolve_player(players: &[PlayerRef], query: &str) -> Option<PlayerRef> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }
    let mut sorted: Vec<&PlayerRef> = players.iter().collect();
    sorted.sort_by_key(|p| p.player_id);

    let parts: Vec<&str> = query.split_whitespace().collect();
    if parts.len() >= 2 {
        let first = parts[0];
        let last = parts[1..].join(" ");
        if let Some(hit) = sorted.iter().find(|p| {
            p.first_name.trim().eq_ignore_ascii_case(first)
                && p.last_name.trim().eq_ignore_ascii_case(&last)
        }) {
            return Some((*hit).clone());
        }
    }

    let needle = query.to_lowercase();
    sorted
        .into_iter()
        .find(|p| {
            p.first_name.to_lowercase().contains(&needle)
                || p.last_name.to_lowercase().contains(&needle)
        })
        .cloned()
}

/// Vector-backed history, for tests and for offline CSV work.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    players: Vec<PlayerRef>,
    rows: Vec<StatLine>,
}

impl MemoryHistory {
    pub fn new(players: Vec<PlayerRef>, rows: Vec<StatLine>) -> Self {
        Self { players, rows }
    }

    pub fn push_player(&mut self, player: PlayerRef) {
        self.players.retain(|p| p.player_id != player.player_id);
        self.players.push(player);
    }

    /// Replaces any existing row for the same player and game.
    pub fn push_row(&mut self, row: StatLine) {
        self.rows
            .retain(|r| !(r.player_id == row.player_id && r.game_id == row.game_id));
        self.rows.push(row);
    }
}

impl HistorySource for MemoryHistory {
    fn find_player(&self, name: &str) -> Result<Option<PlayerRef>> {
        Ok(resolve_player(&self.players, name))
    }

    fn all_players(&self) -> Result<Vec<PlayerRef>> {
        Ok(self.players.clone())
    }

    fn player_timeline(&self, player_id: u32) -> Result<PlayerTimeline> {
        Ok(PlayerTimeline::new(player_id, self.rows.clone()))
    }

    fn opponent_points_allowed(&self, team: &str, before: NaiveDate) -> Result<Vec<DefenseGame>> {
        Ok(opponent_defense::points_allowed_by_game(
            &self.rows,
            team,
            Some(before),
        ))
    }

    fn all_full_game_rows(&self) -> Result<Vec<StatLine>> {
        Ok(self.rows.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    pub game_id: String,
    pub game_date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
}

/// SQLite-backed history.
pub struct SqliteHistory {
    conn: Connection,
}

impl SqliteHistory {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: open_db(path)?,
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl HistorySource for SqliteHistory {
    fn find_player(&self, name: &str) -> Result<Option<PlayerRef>> {
        Ok(resolve_player(&self.all_players()?, name))
    }

    fn all_players(&self) -> Result<Vec<PlayerRef>> {
        load_players(&self.conn)
    }

    fn player_timeline(&self, player_id: u32) -> Result<PlayerTimeline> {
        let lines = load_player_rows(&self.conn, player_id)?;
        debug!(player_id, rows = lines.len(), "loaded player history");
        Ok(PlayerTimeline::new(player_id, lines))
    }

    fn opponent_points_allowed(&self, team: &str, before: NaiveDate) -> Result<Vec<DefenseGame>> {
        load_points_allowed(&self.conn, team, before)
    }

    fn all_full_game_rows(&self) -> Result<Vec<StatLine>> {
        load_full_game_rows(&self.conn)
    }
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS players (
            player_id INTEGER PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            team_code TEXT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS games (
            game_id TEXT PRIMARY KEY,
            game_date TEXT NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_games_date ON games(game_date);

        CREATE TABLE IF NOT EXISTS player_stats (
            player_id INTEGER NOT NULL REFERENCES players(player_id),
            game_id TEXT NOT NULL REFERENCES games(game_id),
            period INTEGER NOT NULL,
            team_code TEXT NOT NULL,
            pts INTEGER NOT NULL,
            reb INTEGER NOT NULL,
            ast INTEGER NOT NULL,
            min REAL NOT NULL,
            fgm INTEGER NOT NULL,
            fga INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (player_id, game_id, period)
        );
        CREATE INDEX IF NOT EXISTS idx_stats_game ON player_stats(game_id);
        CREATE INDEX IF NOT EXISTS idx_stats_period ON player_stats(period);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn upsert_player(conn: &Connection, p: &PlayerRef) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO players (player_id, first_name, last_name, team_code, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(player_id) DO UPDATE SET
            first_name = excluded.first_name,
            last_name = excluded.last_name,
            team_code = COALESCE(excluded.team_code, players.team_code),
            updated_at = excluded.updated_at
        "#,
        params![
            p.player_id as i64,
            p.first_name,
            p.last_name,
            p.team_code,
            Utc::now().to_rfc3339(),
        ],
    )
    .context("upsert player")?;
    Ok(())
}

pub fn upsert_game(conn: &Connection, g: &GameRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO games (game_id, game_date, home_team, away_team, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(game_id) DO UPDATE SET
            game_date = excluded.game_date,
            home_team = excluded.home_team,
            away_team = excluded.away_team,
            updated_at = excluded.updated_at
        "#,
        params![
            g.game_id,
            g.game_date.format(DATE_FMT).to_string(),
            g.home_team.trim().to_ascii_uppercase(),
            g.away_team.trim().to_ascii_uppercase(),
            Utc::now().to_rfc3339(),
        ],
    )
    .context("upsert game")?;
    Ok(())
}

/// Replaces the whole row for `(player, game, period)`.
pub fn upsert_stat_line(conn: &Connection, line: &StatLine, period: u8) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO player_stats (
            player_id, game_id, period, team_code,
            pts, reb, ast, min, fgm, fga, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(player_id, game_id, period) DO UPDATE SET
            team_code = excluded.team_code,
            pts = excluded.pts,
            reb = excluded.reb,
            ast = excluded.ast,
            min = excluded.min,
            fgm = excluded.fgm,
            fga = excluded.fga,
            updated_at = excluded.updated_at
        "#,
        params![
            line.player_id as i64,
            line.game_id,
            period as i64,
            line.team_code.trim().to_ascii_uppercase(),
            line.points as i64,
            line.rebounds as i64,
            line.assists as i64,
            line.minutes_played,
            line.field_goals_made as i64,
            line.field_goals_attempted as i64,
            Utc::now().to_rfc3339(),
        ],
    )
    .context("upsert player stat row")?;
    Ok(())
}

pub fn load_players(conn: &Connection) -> Result<Vec<PlayerRef>> {
    let mut stmt = conn
        .prepare(
            "SELECT player_id, first_name, last_name, team_code FROM players ORDER BY player_id",
        )
        .context("prepare load players query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PlayerRef {
                player_id: row.get::<_, u32>(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                team_code: row.get(3)?,
            })
        })
        .context("query load players")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode player row")?);
    }
    Ok(out)
}

const STAT_LINE_SELECT: &str = r#"
    SELECT
        s.player_id, s.game_id, g.game_date, s.team_code,
        g.home_team, g.away_team,
        s.pts, s.reb, s.ast, s.min, s.fgm, s.fga
    FROM player_stats s
    JOIN games g ON g.game_id = s.game_id
"#;

pub fn load_player_rows(conn: &Connection, player_id: u32) -> Result<Vec<StatLine>> {
    let sql = format!(
        "{STAT_LINE_SELECT} WHERE s.player_id = ?1 AND s.period = ?2 ORDER BY g.game_date ASC, s.game_id ASC"
    );
    let mut stmt = conn
        .prepare(&sql)
        .context("prepare player history query")?;
    let rows = stmt
        .query_map(
            params![player_id as i64, FULL_GAME_PERIOD as i64],
            decode_stat_line,
        )
        .context("query player history")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode stat row")?);
    }
    Ok(out)
}

pub fn load_full_game_rows(conn: &Connection) -> Result<Vec<StatLine>> {
    let sql = format!(
        "{STAT_LINE_SELECT} WHERE s.period = ?1 ORDER BY s.player_id ASC, g.game_date ASC, s.game_id ASC"
    );
    let mut stmt = conn.prepare(&sql).context("prepare full game query")?;
    let rows = stmt
        .query_map(params![FULL_GAME_PERIOD as i64], decode_stat_line)
        .context("query full game rows")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode stat row")?);
    }
    debug!(rows = out.len(), "loaded full game rows");
    Ok(out)
}

/// SQL twin of [`opponent_defense::points_allowed_by_game`]: the opponent of a
/// row is the away team when the player's team is home, else the home team.
pub fn load_points_allowed(
    conn: &Connection,
    team: &str,
    before: NaiveDate,
) -> Result<Vec<DefenseGame>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT s.game_id, g.game_date, SUM(s.pts)
            FROM player_stats s
            JOIN games g ON g.game_id = s.game_id
            WHERE s.period = ?1
              AND g.game_date < ?3
              AND (CASE WHEN UPPER(s.team_code) = UPPER(g.home_team)
                        THEN UPPER(g.away_team)
                        ELSE UPPER(g.home_team) END) = ?2
            GROUP BY s.game_id, g.game_date
            ORDER BY g.game_date ASC, s.game_id ASC
            "#,
        )
        .context("prepare points allowed query")?;
    let rows = stmt
        .query_map(
            params![
                FULL_GAME_PERIOD as i64,
                team.trim().to_ascii_uppercase(),
                before.format(DATE_FMT).to_string(),
            ],
            |row| {
                Ok(DefenseGame {
                    game_id: row.get(0)?,
                    game_date: date_column(row, 1)?,
                    points_allowed: row.get::<_, i64>(2)? as f64,
                })
            },
        )
        .context("query points allowed")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode points allowed row")?);
    }
    Ok(out)
}

fn decode_stat_line(row: &Row<'_>) -> rusqlite::Result<StatLine> {
    Ok(StatLine {
        player_id: row.get::<_, u32>(0)?,
        game_id: row.get(1)?,
        game_date: date_column(row, 2)?,
        team_code: row.get(3)?,
        home_team: row.get(4)?,
        away_team: row.get(5)?,
        points: row.get::<_, u32>(6)?,
        rebounds: row.get::<_, u32>(7)?,
        assists: row.get::<_, u32>(8)?,
        minutes_played: row.get(9)?,
        field_goals_made: row.get::<_, u32>(10)?,
        field_goals_attempted: row.get::<_, u32>(11)?,
    })
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(raw.trim(), DATE_FMT)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: u32, first: &str, last: &str) -> PlayerRef {
        PlayerRef {
            player_id: id,
            first_name: first.to_string(),
            last_name: last.to_string(),
            team_code: None,
        }
    }

    #[test]
    fn resolve_prefers_exact_full_name() {
        let players = vec![
            player(3, "Jaylen", "Brown"),
            player(1, "Bruce", "Brown"),
            player(2, "Jayson", "Tatum"),
        ];
        assert_eq!(
            resolve_player(&players, "jaylen brown").map(|p| p.player_id),
            Some(3)
        );
        assert_eq!(
            resolve_player(&players, "Brown").map(|p| p.player_id),
            Some(1)
        );
        assert_eq!(
            resolve_player(&players, "tat").map(|p| p.player_id),
            Some(2)
        );
        assert!(resolve_player(&players, "  ").is_none());
        assert!(resolve_player(&players, "Larry Bird").is_none());
    }

    #[test]
    fn multi_word_last_names_match() {
        let players = vec![player(9, "Karl-Anthony", "Towns Jr")];
        assert_eq!(
            resolve_player(&players, "Karl-Anthony Towns Jr").map(|p| p.player_id),
            Some(9)
        );
    }
}

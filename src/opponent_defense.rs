//! Points allowed per team per game, and the trailing defense rating built
//! from it.
//!
//! The rating attached to a game is the mean of up to [`DEFENSE_WINDOW`]
//! earlier games of the same team, never including the game itself.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::NaiveDate;

use crate::context;
use crate::rolling::TrailingWindow;
use crate::timeline::StatLine;

pub const DEFENSE_WINDOW: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct DefenseGame {
    pub game_id: String,
    pub game_date: NaiveDate,
    pub points_allowed: f64,
}

/// Sums every opposing player's points against `team`, one entry per game,
/// optionally restricted to games strictly before `before`.
pub fn points_allowed_by_game(
    rows: &[StatLine],
    team: &str,
    before: Option<NaiveDate>,
) -> Vec<DefenseGame> {
    let team = team.trim().to_ascii_uppercase();
    let mut by_game: HashMap<&str, DefenseGame> = HashMap::new();
    for row in rows {
        if before.is_some_and(|cutoff| row.game_date >= cutoff) {
            continue;
        }
        if context::opponent(row) != team {
            continue;
        }
        by_game
            .entry(row.game_id.as_str())
            .or_insert_with(|| DefenseGame {
                game_id: row.game_id.clone(),
                game_date: row.game_date,
                points_allowed: 0.0,
            })
            .points_allowed += row.points as f64;
    }
    let mut games: Vec<DefenseGame> = by_game.into_values().collect();
    sort_games(&mut games);
    games
}

/// Trailing rating per game, index-aligned with `games` (which must be sorted).
pub fn trailing_ratings(games: &[DefenseGame]) -> Vec<Option<f64>> {
    let mut window = TrailingWindow::new(DEFENSE_WINDOW);
    let mut out = Vec::with_capacity(games.len());
    for game in games {
        out.push(window.mean());
        window.push(game.points_allowed);
    }
    out
}

/// Most recent rating attached to a game strictly before `as_of`.
///
/// `None` when the team has fewer than two qualifying games: the first game
/// never has a rating, and a missing rating is never replaced by zero.
pub fn rating_as_of(mut games: Vec<DefenseGame>, as_of: NaiveDate) -> Option<f64> {
    games.retain(|g| g.game_date < as_of);
    sort_games(&mut games);
    trailing_ratings(&games).last().copied().flatten()
}

fn sort_games(games: &mut [DefenseGame]) {
    games.sort_by(|a, b| {
        a.game_date
            .cmp(&b.game_date)
            .then_with(|| a.game_id.cmp(&b.game_id))
    });
}

/// Batch ratings for every `(team, game)` pair, used by the training export.
#[derive(Debug, Clone, Default)]
pub struct DefenseTable {
    ratings: HashMap<(String, String), f64>,
}

impl DefenseTable {
    pub fn from_rows(rows: &[StatLine]) -> Self {
        let mut per_team: HashMap<String, HashMap<&str, DefenseGame>> = HashMap::new();
        for row in rows {
            per_team
                .entry(context::opponent(row))
                .or_default()
                .entry(row.game_id.as_str())
                .or_insert_with(|| DefenseGame {
                    game_id: row.game_id.clone(),
                    game_date: row.game_date,
                    points_allowed: 0.0,
                })
                .points_allowed += row.points as f64;
        }

        let mut ratings = HashMap::new();
        for (team, games) in per_team {
            let mut games: Vec<DefenseGame> = games.into_values().collect();
            sort_games(&mut games);
            for (game, rating) in games.iter().zip(trailing_ratings(&games)) {
                if let Some(rating) = rating {
                    ratings.insert((team.clone(), game.game_id.clone()), rating);
                }
            }
        }
        Self { ratings }
    }

    pub fn rating(&self, team: &str, game_id: &str) -> Option<f64> {
        self.ratings
            .get(&(team.trim().to_ascii_uppercase(), game_id.to_string()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }
}

/// Memo of `(team, as_of)` lookups shared across requests.
#[derive(Debug, Default)]
pub struct DefenseCache {
    entries: Mutex<HashMap<(String, NaiveDate), Option<f64>>>,
}

impl DefenseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute<E>(
        &self,
        team: &str,
        as_of: NaiveDate,
        compute: impl FnOnce() -> Result<Option<f64>, E>,
    ) -> Result<Option<f64>, E> {
        let key = (team.trim().to_ascii_uppercase(), as_of);
        if let Some(hit) = self.lock().get(&key) {
            return Ok(*hit);
        }
        let value = compute()?;
        self.lock().insert(key, value);
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, NaiveDate), Option<f64>>> {
        // Entries are plain values; a panic mid-insert cannot leave one half-written.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::fixtures::line;

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid date")
    }

    /// Two NYK players scoring against BOS (home) plus one BOS player.
    fn game(id: &str, day: &str, a: u32, b: u32) -> Vec<StatLine> {
        let mut x = line(1, id, day, a, 30.0);
        x.team_code = "NYK".into();
        let mut y = line(2, id, day, b, 30.0);
        y.team_code = "NYK".into();
        let z = line(3, id, day, 50, 30.0);
        vec![x, y, z]
    }

    fn history() -> Vec<StatLine> {
        let mut rows = Vec::new();
        rows.extend(game("g1", "2024-01-01", 50, 50));
        rows.extend(game("g2", "2024-01-03", 60, 50));
        rows.extend(game("g3", "2024-01-05", 40, 40));
        rows
    }

    #[test]
    fn sums_opposing_players_only() {
        let games = points_allowed_by_game(&history(), "bos", None);
        let totals: Vec<f64> = games.iter().map(|g| g.points_allowed).collect();
        assert_eq!(totals, vec![100.0, 110.0, 80.0]);
    }

    #[test]
    fn ratings_exclude_current_game() {
        let games = points_allowed_by_game(&history(), "BOS", None);
        assert_eq!(
            trailing_ratings(&games),
            vec![None, Some(100.0), Some(105.0)]
        );
    }

    #[test]
    fn as_of_is_strict() {
        let rows = history();
        let games = points_allowed_by_game(&rows, "BOS", None);
        assert_eq!(rating_as_of(games.clone(), date("2024-01-05")), Some(100.0));
        assert_eq!(rating_as_of(games.clone(), date("2024-01-06")), Some(105.0));
        assert_eq!(rating_as_of(games.clone(), date("2024-01-02")), None);
        assert_eq!(rating_as_of(games, date("2024-01-01")), None);
    }

    #[test]
    fn table_matches_single_team_path() {
        let rows = history();
        let table = DefenseTable::from_rows(&rows);
        assert_eq!(table.rating("BOS", "g1"), None);
        assert_eq!(table.rating("BOS", "g2"), Some(100.0));
        assert_eq!(table.rating("bos", "g3"), Some(105.0));
        // NYK allowed 50 per game from the single BOS player.
        assert_eq!(table.rating("NYK", "g3"), Some(50.0));
    }

    #[test]
    fn cache_computes_once() {
        let cache = DefenseCache::new();
        let mut calls = 0;
        for _ in 0..3 {
            let v: Result<Option<f64>, ()> = cache.get_or_compute("BOS", date("2024-01-06"), || {
                calls += 1;
                Ok(Some(1.0))
            });
            assert_eq!(v, Ok(Some(1.0)));
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.len(), 1);
    }
}

use std::fs;
use std::path::PathBuf;

use nba_props::features::{Scenario, build_inference_features};
use nba_props::history_store::{self, HistorySource, MemoryHistory, SqliteHistory};
use nba_props::{Feature, export, ingest, summary, training};

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn loaded_store() -> SqliteHistory {
    let mut store = SqliteHistory::in_memory().expect("in-memory db");
    ingest::ingest_csv_file(store.conn_mut(), &fixture_path("box_scores.csv"))
        .expect("fixture should ingest");
    store
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("nba_props_{}_{name}", std::process::id()))
}

#[test]
fn ingest_skips_test_games_and_counts_rows() {
    let mut store = SqliteHistory::in_memory().expect("db");
    let summary = ingest::ingest_csv_file(store.conn_mut(), &fixture_path("box_scores.csv"))
        .expect("ingest");
    assert_eq!(summary.rows_read, 27);
    assert_eq!(summary.rows_skipped, 2);
    assert_eq!(summary.rows_upserted, 25);
    assert_eq!(summary.players, 3);
    assert_eq!(summary.games, 8);
    assert!(summary.errors.is_empty(), "{:?}", summary.errors);
}

#[test]
fn reingest_replaces_rows_instead_of_duplicating() {
    let mut store = loaded_store();
    ingest::ingest_csv_file(store.conn_mut(), &fixture_path("box_scores.csv")).expect("again");
    let report = summary::summarize(store.conn()).expect("summary");
    assert_eq!(report.stat_rows, 25);
    assert_eq!(report.per_period, vec![(0, 24), (1, 1)]);
    assert_eq!(report.games, 8);
    assert_eq!(report.first_game_date.as_deref(), Some("2024-01-02"));
    assert_eq!(report.last_game_date.as_deref(), Some("2024-01-16"));
}

#[test]
fn only_full_game_rows_reach_the_timeline() {
    let store = loaded_store();
    let tatum = store.find_player("jayson tatum").expect("query").expect("found");
    let timeline = store.player_timeline(tatum.player_id).expect("timeline");
    assert_eq!(timeline.len(), 8);
    assert_eq!(timeline.lines()[0].points, 30);
    assert_eq!(timeline.lines()[1].minutes_played, 34.5);
    assert!(!timeline.lines().iter().any(|l| l.game_id.starts_with("TEST")));
}

#[test]
fn name_lookup_falls_back_to_substring() {
    let store = loaded_store();
    let by_last = store.find_player("BRUNSON").expect("query").expect("found");
    assert_eq!(by_last.player_id, 3);
    let partial = store.find_player("jal").expect("query").expect("found");
    assert_eq!(partial.player_id, 3);
    assert!(store.find_player("Larry Bird").expect("query").is_none());
}

#[test]
fn sqlite_and_memory_sources_build_identical_features() {
    let store = loaded_store();
    let memory = MemoryHistory::new(
        history_store::load_players(store.conn()).expect("players"),
        history_store::load_full_game_rows(store.conn()).expect("rows"),
    );
    let scenario = Scenario {
        opponent: "NYK".into(),
        is_home: false,
        days_rest: 1.0,
    };
    let a = build_inference_features(&store, "Jayson Tatum", &scenario).expect("sqlite");
    let b = build_inference_features(&memory, "Jayson Tatum", &scenario).expect("memory");
    assert_eq!(a.features, b.features);
    assert_eq!(a.anchor_game_id, b.anchor_game_id);
}

#[test]
fn training_dataset_keeps_only_complete_rows() {
    let store = loaded_store();
    let rows = training::build_training_dataset(&store).expect("dataset");

    // Tatum needs five valid games first, Brown and Brunson from their sixth game.
    assert_eq!(rows.len(), 7);
    let tatum: Vec<_> = rows.iter().filter(|r| r.player_id == 1).collect();
    assert_eq!(tatum.len(), 1);
    assert_eq!(tatum[0].game_id, "G08");
    assert_eq!(tatum[0].player_name, "Jayson Tatum");
    assert_eq!(tatum[0].opponent, "NYK");
    // G01..G07 points scored against NYK, DNP included.
    let opp = tatum[0].features[Feature::OppPtsAllowedL10];
    assert!((opp - 293.0 / 7.0).abs() < 1e-9, "{opp}");
    assert!((tatum[0].features[Feature::PtsL5] - 28.4).abs() < 1e-9);

    assert!(rows.windows(2).all(|w| w[0].game_date <= w[1].game_date));
}

#[test]
fn csv_export_reads_back_unchanged() {
    let store = loaded_store();
    let rows = training::build_training_dataset(&store).expect("dataset");
    let path = temp_path("features.csv");

    let report = export::export_dataset(&path, &rows).expect("export");
    assert_eq!(report.rows, rows.len());
    assert_eq!(report.players, 3);

    let back = export::read_training_csv(&path).expect("read back");
    assert_eq!(back, rows);
    let _ = fs::remove_file(&path);
}

#[test]
fn xlsx_export_writes_a_workbook() {
    let store = loaded_store();
    let rows = training::build_training_dataset(&store).expect("dataset");
    let path = temp_path("features.xlsx");

    let report = export::export_dataset(&path, &rows).expect("export");
    assert_eq!(report.format, export::ExportFormat::Xlsx);
    assert!(fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false));
    let _ = fs::remove_file(&path);
}

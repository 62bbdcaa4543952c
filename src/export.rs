//! Writes and reads the training dataset as CSV or an `.xlsx` workbook.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, Utc};
use rust_xlsxwriter::{Workbook, Worksheet};
use tracing::info;

use crate::features::{FEATURE_COUNT, Feature, FeatureVector};
use crate::training::TrainingRow;

const DATE_FMT: &str = "%Y-%m-%d";

/// Columns ahead of the 17 features, in file order.
pub const IDENTITY_COLUMNS: [&str; 9] = [
    "game_id",
    "game_date",
    "player_id",
    "player_name",
    "opponent",
    "pts",
    "reb",
    "ast",
    "min",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("xlsx") => ExportFormat::Xlsx,
            _ => ExportFormat::Csv,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportReport {
    pub rows: usize,
    pub players: usize,
    pub format: ExportFormat,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

pub fn header() -> Vec<String> {
    IDENTITY_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(Feature::ALL.iter().map(|f| f.name().to_string()))
        .collect()
}

fn record(row: &TrainingRow) -> Vec<String> {
    let mut out = vec![
        row.game_id.clone(),
        row.game_date.format(DATE_FMT).to_string(),
        row.player_id.to_string(),
        row.player_name.clone(),
        row.opponent.clone(),
        row.pts.to_string(),
        row.reb.to_string(),
        row.ast.to_string(),
        row.min.to_string(),
    ];
    out.extend(row.features.as_array().iter().map(|v| v.to_string()));
    out
}

pub fn export_dataset(path: &Path, rows: &[TrainingRow]) -> Result<ExportReport> {
    let format = ExportFormat::for_path(path);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create export dir {}", parent.display()))?;
    }
    match format {
        ExportFormat::Csv => write_csv(path, rows)?,
        ExportFormat::Xlsx => write_workbook(path, rows)?,
    }

    let mut players: Vec<u32> = rows.iter().map(|r| r.player_id).collect();
    players.sort_unstable();
    players.dedup();
    let report = ExportReport {
        rows: rows.len(),
        players: players.len(),
        format,
        first_date: rows.iter().map(|r| r.game_date).min(),
        last_date: rows.iter().map(|r| r.game_date).max(),
    };
    info!(
        path = %path.display(),
        rows = report.rows,
        players = report.players,
        "exported training dataset"
    );
    Ok(report)
}

fn write_csv(path: &Path, rows: &[TrainingRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("open csv {}", path.display()))?;
    writer.write_record(header()).context("write csv header")?;
    for row in rows {
        writer
            .write_record(record(row))
            .with_context(|| format!("write csv row {} {}", row.game_id, row.player_id))?;
    }
    writer.flush().context("flush csv")?;
    Ok(())
}

fn write_workbook(path: &Path, rows: &[TrainingRow]) -> Result<()> {
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Features")?;
        write_header(sheet, &header())?;
        for (i, row) in rows.iter().enumerate() {
            write_row(sheet, i as u32 + 1, row)?;
        }
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Info")?;
        let info = [
            ("generated_at", Utc::now().to_rfc3339()),
            ("rows", rows.len().to_string()),
            ("features", FEATURE_COUNT.to_string()),
        ];
        for (r, (key, value)) in info.iter().enumerate() {
            sheet
                .write_string(r as u32, 0, *key)
                .with_context(|| format!("write info key {key}"))?;
            sheet
                .write_string(r as u32, 1, value)
                .with_context(|| format!("write info value {key}"))?;
        }
    }
    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;
    Ok(())
}

fn write_header(sheet: &mut Worksheet, header: &[String]) -> Result<()> {
    for (col, name) in header.iter().enumerate() {
        sheet
            .write_string(0, col as u16, name)
            .with_context(|| format!("write header cell {col}"))?;
    }
    Ok(())
}

fn write_row(sheet: &mut Worksheet, r: u32, row: &TrainingRow) -> Result<()> {
    sheet
        .write_string(r, 0, &row.game_id)
        .with_context(|| format!("write cell ({r},0)"))?;
    sheet
        .write_string(r, 1, row.game_date.format(DATE_FMT).to_string())
        .with_context(|| format!("write cell ({r},1)"))?;
    sheet
        .write_number(r, 2, row.player_id as f64)
        .with_context(|| format!("write cell ({r},2)"))?;
    sheet
        .write_string(r, 3, &row.player_name)
        .with_context(|| format!("write cell ({r},3)"))?;
    sheet
        .write_string(r, 4, &row.opponent)
        .with_context(|| format!("write cell ({r},4)"))?;

    let numbers = [row.pts, row.reb, row.ast, row.min]
        .into_iter()
        .chain(row.features.as_array().iter().copied());
    for (offset, value) in numbers.enumerate() {
        let col = 5 + offset as u16;
        sheet
            .write_number(r, col, value)
            .with_context(|| format!("write cell ({r},{col})"))?;
    }
    Ok(())
}

/// Reads a CSV written by [`export_dataset`]. Columns are found by name, so
/// extra columns are ignored, but every feature column must be present.
pub fn read_training_csv(path: &Path) -> Result<Vec<TrainingRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("open csv {}", path.display()))?;
    let headers = reader.headers().context("read csv header")?.clone();
    let column = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| anyhow!("{}: missing column {name}", path.display()))
    };
    let id_cols: Vec<usize> = IDENTITY_COLUMNS
        .iter()
        .map(|&c| column(c))
        .collect::<Result<_>>()?;
    let feature_cols: Vec<usize> = Feature::ALL
        .iter()
        .map(|f| column(f.name()))
        .collect::<Result<_>>()?;

    let mut out = Vec::new();
    for (line_no, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("read csv record {}", line_no + 2))?;
        let field = |idx: usize| record.get(idx).unwrap_or("").trim();
        let num = |idx: usize| -> Result<f64> {
            field(idx)
                .parse::<f64>()
                .with_context(|| format!("row {}: bad number {:?}", line_no + 2, field(idx)))
        };

        let mut values = [0.0; FEATURE_COUNT];
        for (slot, idx) in values.iter_mut().zip(&feature_cols) {
            *slot = num(*idx)?;
        }
        let features = FeatureVector::from_array(values)
            .ok_or_else(|| anyhow!("row {}: non-finite feature", line_no + 2))?;

        out.push(TrainingRow {
            game_id: field(id_cols[0]).to_string(),
            game_date: NaiveDate::parse_from_str(field(id_cols[1]), DATE_FMT)
                .with_context(|| format!("row {}: bad game_date", line_no + 2))?,
            player_id: field(id_cols[2])
                .parse()
                .with_context(|| format!("row {}: bad player_id", line_no + 2))?,
            player_name: field(id_cols[3]).to_string(),
            opponent: field(id_cols[4]).to_string(),
            pts: num(id_cols[5])?,
            reb: num(id_cols[6])?,
            ast: num(id_cols[7])?,
            min: num(id_cols[8])?,
            features,
        });
    }
    info!(path = %path.display(), rows = out.len(), "read training dataset");
    Ok(out)
}

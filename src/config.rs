use std::env;
use std::path::PathBuf;

const APP_DIR: &str = "nba_props";
const DB_FILE: &str = "history.sqlite";

pub const DEFAULT_MODEL_DIR: &str = "data/models";
pub const DEFAULT_SIGMA: f64 = 6.0;
pub const DEFAULT_TRAIN_RATIO: f64 = 0.8;

/// Runtime settings shared by the binaries.
///
/// Feature-engine constants are part of the classifier contract and live
/// next to the code that uses them.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: Option<PathBuf>,
    pub model_dir: PathBuf,
    pub default_sigma: f64,
    pub train_ratio: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            default_sigma: DEFAULT_SIGMA,
            train_ratio: DEFAULT_TRAIN_RATIO,
        }
    }
}

impl AppConfig {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();

        if let Some(path) = env_path("NBA_PROPS_DB") {
            cfg.db_path = Some(path);
        }
        if let Some(dir) = env_path("MODEL_DIR") {
            cfg.model_dir = dir;
        }
        if let Some(sigma) = env_f64("NBA_PROPS_SIGMA").filter(|v| *v > 0.0) {
            cfg.default_sigma = sigma;
        }
        if let Some(ratio) = env_f64("NBA_PROPS_TRAIN_RATIO").filter(|v| *v > 0.0 && *v < 1.0) {
            cfg.train_ratio = ratio;
        }
        cfg
    }
}

pub fn app_cache_dir() -> Option<PathBuf> {
    // Prefer XDG cache.
    if let Ok(base) = env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(DB_FILE))
}

/// Installs the `tracing` subscriber used by every binary.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn env_path(key: &str) -> Option<PathBuf> {
    let raw = env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

fn env_f64(key: &str) -> Option<f64> {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

//! Point-in-time feature pipeline and over/under pricing for NBA player props.

pub mod calibration;
pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod features;
pub mod history_store;
pub mod ingest;
pub mod model_registry;
pub mod opponent_defense;
pub mod predict;
pub mod probability;
pub mod rolling;
pub mod summary;
pub mod timeline;
pub mod training;

pub use error::PredictError;
pub use features::{FEATURE_COUNT, Feature, FeatureVector};
pub use history_store::{HistorySource, MemoryHistory, SqliteHistory};
pub use predict::{PredictionService, PropPrediction, PropRequest};
pub use probability::{CalibratedPrediction, Direction, StatType};

//! Interval-walking session tracker: a fast/slow phase timer, GPS trace
//! capture with synthetic fallback, haversine distance totals, weekly
//! achievement stats, and JSON import/export over a SQLite store.

pub mod db;
pub mod distance;
pub mod geo;
pub mod stats;
pub mod transfer;
pub mod utils;
pub mod walk;

pub use db::{Database, Phase, Session, TracePoint};
pub use distance::{haversine_km, total_distance_km, GeoPoint};
pub use geo::{GeoFix, GeoSampler, LocationProvider, NoLocationProvider};
pub use stats::{
    daily_stats, weekly_achievement, weekly_overview, DailyStat, WeeklyAchievement, WeeklyOverview,
};
pub use transfer::{
    export_dataset, import_dataset, parse_envelope, to_json, ExportEnvelope, ImportMode,
    ImportSummary,
};
pub use utils::init_logging;
pub use walk::{WalkController, WalkEvent, WalkSnapshot, WalkStatus};

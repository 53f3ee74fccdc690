//! Rolls per-day segmentations into a monthly view.

pub mod heatmap;
pub mod summary;

pub use heatmap::{HeatMap, HeatMapRows};
pub use summary::{summarize, MonthlySummary, PeakWindow};

//! Derives working hours, dead time and schedule compliance from commit history and live device
//! activity. A background daemon records activity pulses, the cli turns them into monthly reports.
//!

pub mod aggregate;
pub mod cli;
pub mod collector;
pub mod daemon;
pub mod error;
pub mod input_api;
pub mod lunch;
pub mod persistence;
pub mod report;
pub mod schedule;
pub mod segmentation;
pub mod storage;
pub mod utils;

//! Market data consumed by the environment

pub mod frame;

pub use frame::{parse_timestamp, FeatureFrame, CLOSE_COLUMN, TIME_COLUMNS};

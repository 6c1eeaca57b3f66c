//! Simulated Trading Environment for RL Training
//!
//! Gym-like environment replaying a Feature Frame so agents can be trained
//! and validated without risking real capital.

mod render;
mod trading;

pub use render::{ChartPanel, Marker, MarkerKind, RenderMode, Series, SvgChart};
pub use trading::{
    AccountSnapshot, ActionSpace, ObservationSpace, StepInfo, StepResult, TradeRecord,
    TradingEnvironment,
};

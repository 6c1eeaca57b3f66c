//! Coordination Layer
//!
//! Process-level signal handling and cooperative cancellation of
//! long-running training jobs.

pub mod shutdown;

pub use shutdown::{install_signal_handler, wait_for_signal, CancellationToken, ShutdownSignal};

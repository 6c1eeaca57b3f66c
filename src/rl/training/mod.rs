//! Training Infrastructure
//!
//! Training loop, checkpointing, history, evaluation and report artifacts.

pub mod checkpointing;
pub mod evaluation;
pub mod history;
pub mod report;
pub mod trainer;

pub use checkpointing::{run_dir_name, Checkpoint, CheckpointState, Checkpointer, CHECKPOINT_DIR};
pub use evaluation::{
    evaluate_agent, max_drawdown, sharpe_ratio, sortino_ratio, EvaluationReport, MetricChange,
    EVALUATION_HISTORY_FILE,
};
pub use history::{HistoryRow, TrainingHistory};
pub use report::write_training_report;
pub use trainer::{run_episode, EpisodeResult, TrainingLoop, TrainingOutcome, BEST_MODEL, FINAL_MODEL};

use dqtrade::error::Result;
use dqtrade::rl::training::{Checkpointer, EvaluationReport, EVALUATION_HISTORY_FILE};
use std::path::Path;

pub(super) fn run_info(run_dir: &str) -> Result<()> {
    let run_dir = Path::new(run_dir);
    let checkpointer = Checkpointer::new(run_dir);

    println!("Run directory: {}", run_dir.display());
    let episodes = checkpointer.list_episodes();
    if episodes.is_empty() {
        println!("  No checkpoints");
        return Ok(());
    }
    println!("  Checkpoints:  {:?}", episodes);

    if let Some(checkpoint) = checkpointer.load_latest()? {
        let history = &checkpoint.history;
        println!("  Latest episode:   {}", checkpoint.state.episode);
        println!("  Exploration rate: {:.4}", checkpoint.state.exploration_rate);
        println!("  Saved at:         {}", checkpoint.state.timestamp);
        println!("  Train episodes:   {}", history.train_len());
        println!("  Validations:      {}", history.val_len());
        if let Some(best) = history.best_val_profit() {
            println!("  Best val profit:  {:.2}", best);
        }
        if let Some(last) = history.train_profits.last() {
            println!("  Last train profit: {:.2}", last);
        }
    }

    if let Some(report) = EvaluationReport::load(run_dir.join(EVALUATION_HISTORY_FILE))? {
        println!(
            "  Last evaluation: profit {:.2}, win rate {:.1}%, drawdown {:.1}%",
            report.avg_total_profit,
            report.avg_win_rate * 100.0,
            report.avg_max_drawdown * 100.0
        );
    }
    Ok(())
}

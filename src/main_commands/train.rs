use burn_ndarray::NdArrayDevice;
use dqtrade::config::AppConfig;
use dqtrade::coordination::shutdown::{install_signal_handler, CancellationToken};
use dqtrade::error::{Result, TraderError};
use dqtrade::rl::training::run_dir_name;
use dqtrade::rl::{build_dqn_agent, DefaultBackend, FeatureFrame, TradingEnvironment, TrainingLoop};
use std::path::{Path, PathBuf};
use tracing::info;

pub(super) async fn run_train(config: AppConfig, run_dir: Option<PathBuf>) -> Result<()> {
    let csv_path = config.data.csv_path.clone().ok_or_else(|| {
        TraderError::config("no Feature Frame CSV: set data.csv_path or pass --data")
    })?;

    info!(path = %csv_path, "Loading Feature Frame");
    let frame = FeatureFrame::from_csv(&csv_path)?;
    let (train_frame, val_frame) = frame.split_chronological(
        config.data.train_split,
        config.environment.window_size + 1,
    )?;
    info!(
        train_rows = train_frame.len(),
        val_rows = val_frame.len(),
        "Chronological split"
    );

    let train_env = TradingEnvironment::new(train_frame, config.environment.clone())?;
    let val_env = TradingEnvironment::new(val_frame, config.environment.clone())?;

    let run_dir = run_dir.unwrap_or_else(|| {
        Path::new(&config.training.output_dir)
            .join(run_dir_name(&config.data.symbol, &config.data.timeframe))
    });

    let agent = build_dqn_agent::<DefaultBackend>(
        config.agent.clone(),
        train_env.state_size(),
        NdArrayDevice::default(),
    )?;

    println!("DQN training");
    println!("  Data:         {}", csv_path);
    println!("  Run dir:      {}", run_dir.display());
    println!("  Episodes:     {}", config.training.episodes);
    println!("  State size:   {}", train_env.state_size());
    println!("  Window:       {}", config.environment.window_size);
    println!("  Batch size:   {}", config.agent.batch_size);
    println!("  Learning rate {}", config.agent.learning_rate);

    let cancel = CancellationToken::new();
    let signal_task = install_signal_handler(cancel.clone());

    let mut training = TrainingLoop::new(config.training.clone(), &run_dir, agent, train_env, val_env)
        .with_cancellation(cancel);
    let result = tokio::task::spawn_blocking(move || training.run())
        .await
        .map_err(|e| TraderError::Other(anyhow::anyhow!("training task failed: {e}")))?;
    signal_task.abort();

    match result? {
        Some(outcome) => {
            println!("\nTraining complete");
            println!("  Final model:  {}", outcome.final_model_path.display());
            match &outcome.best_model_path {
                Some(path) => println!("  Best model:   {}", path.display()),
                None => println!("  Best model:   none"),
            }
            if let Some(profit) = outcome.best_validation_profit {
                println!("  Best validation profit: {:.2}", profit);
            }
            println!("  Episodes recorded: {}", outcome.history.train_len());
        }
        None => {
            println!("\nTraining cancelled");
            println!(
                "  Resume with: dqtrade train --run-dir {}",
                run_dir.display()
            );
        }
    }

    Ok(())
}

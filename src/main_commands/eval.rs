use burn_ndarray::NdArrayDevice;
use dqtrade::config::AppConfig;
use dqtrade::error::{Result, TraderError};
use dqtrade::rl::{build_dqn_agent, evaluate_agent, Agent, DefaultBackend, FeatureFrame, TradingEnvironment};
use std::path::Path;
use tracing::info;

pub(super) fn run_eval(
    config: &AppConfig,
    model: &str,
    episodes: usize,
    output: Option<&str>,
) -> Result<()> {
    let csv_path = config.data.csv_path.as_deref().ok_or_else(|| {
        TraderError::config("no Feature Frame CSV: set data.csv_path or pass --data")
    })?;

    let frame = FeatureFrame::from_csv(csv_path)?;
    let mut env = TradingEnvironment::new(frame, config.environment.clone())?;

    let mut agent = build_dqn_agent::<DefaultBackend>(
        config.agent.clone(),
        env.state_size(),
        NdArrayDevice::default(),
    )?;
    let model_path = Path::new(model);
    let model_path = if model_path.extension().is_some_and(|ext| ext == "mpk") {
        model_path.with_extension("")
    } else {
        model_path.to_path_buf()
    };
    agent.load(&model_path)?;

    info!(model = %model_path.display(), episodes, "Evaluating model");
    let report = evaluate_agent(&mut env, &mut agent, episodes)?;

    println!("Evaluation over {} episode(s)", report.episodes);
    println!("  Avg total profit:     {:>12.2}", report.avg_total_profit);
    println!("  Avg win rate:         {:>12.2}%", report.avg_win_rate * 100.0);
    println!("  Avg profit per trade: {:>12.4}", report.avg_profit_per_trade);
    println!("  Avg max drawdown:     {:>12.2}%", report.avg_max_drawdown * 100.0);
    println!("  Avg Sharpe ratio:     {:>12.4}", report.avg_sharpe_ratio);
    println!("  Avg Sortino ratio:    {:>12.4}", report.avg_sortino_ratio);
    println!("  Avg trades/episode:   {:>12.1}", report.avg_trades_per_episode);

    if let Some(output) = output {
        report.save(output)?;
        println!("Report written to {}", output);
    }
    Ok(())
}

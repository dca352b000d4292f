// ============================================================
// Layer 1 - CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and routes to Layer 2. Printing
// results for the user happens here and nowhere else.
//
//   `train` - grid search, promotes models/best_lstm_model.bin
//   `serve` - POST /predict, GET /metrics, GET /health
//   `runs`  - leaderboard of tracked runs

pub mod commands;

use std::{cmp::Ordering, path::Path};

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Commands, RunsArgs, ServeArgs, TrainArgs};

use crate::application::promoter::BestScore;
use crate::domain::run_record::TrainingRunRecord;
use crate::infra::tracker::{experiment_slug, read_runs, RUNS_FILE};

#[derive(Parser, Debug)]
#[command(
    name = "pm25-forecast",
    version,
    about = "Grid-search LSTM models for PM2.5 forecasting, promote the best one, and serve it."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Serve(args) => run_serve(args),
            Commands::Runs(args)  => run_runs(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let config = args.into_config()?;
    tracing::info!("Training on windows from: {}", config.data_path);
    let artifact_path = config.artifact_path.clone();

    let report = TrainUseCase::new(config).execute()?;

    println!(
        "Session {}: {} runs, {} completed, {} failed.",
        report.session_id,
        report.records.len(),
        report.completed(),
        report.failed()
    );
    if let BestScore::HasBest { rmse, combination, run_number, .. } = &report.best {
        println!("Best: run {run_number} ({combination}) rmse={rmse:.6}");
        println!("Promoted model: {artifact_path}");
    }
    Ok(())
}

fn run_serve(args: ServeArgs) -> Result<()> {
    use crate::application::serve_use_case::ServeUseCase;

    let use_case = ServeUseCase::new(args.into());
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Cannot start the async runtime")?;
    runtime.block_on(use_case.execute())
}

fn run_runs(args: RunsArgs) -> Result<()> {
    let log_path = Path::new(&args.tracking_dir)
        .join(experiment_slug(&args.experiment))
        .join(RUNS_FILE);
    let mut runs = read_runs(&log_path)?;
    sort_leaderboard(&mut runs);

    let shown = args.limit.unwrap_or(runs.len()).min(runs.len());
    println!("{} runs in '{}'", runs.len(), args.experiment);
    println!(
        "{:<10} {:>4} {:<44} {:>10} {:>10} {:>8}  {}",
        "status", "run", "combination", "rmse", "mae", "r2", "session"
    );
    for run in &runs[..shown] {
        let (rmse, mae, r2) = match run.metrics {
            Some(m) => (format!("{:.6}", m.rmse), format!("{:.6}", m.mae), format!("{:.4}", m.r2)),
            None => ("-".into(), "-".into(), "-".into()),
        };
        let status = if run.promoted { "promoted".to_string() } else { format!("{:?}", run.status).to_lowercase() };
        println!(
            "{:<10} {:>4} {:<44} {:>10} {:>10} {:>8}  {}",
            status,
            run.run_number,
            run.combination.to_string(),
            rmse,
            mae,
            r2,
            run.session_id
        );
    }
    Ok(())
}

/// Lowest RMSE first; runs without metrics (failed) go last in log order.
fn sort_leaderboard(runs: &mut [TrainingRunRecord]) {
    runs.sort_by(|a, b| match (a.rmse(), b.rmse()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hyperparams::HyperparameterSpace;
    use crate::domain::run_record::{RunMetrics, RunStatus};

    fn run(run_number: usize, rmse: Option<f64>) -> TrainingRunRecord {
        TrainingRunRecord {
            run_id:      format!("run-{run_number}"),
            session_id:  "s".into(),
            experiment:  "e".into(),
            run_number,
            combination: HyperparameterSpace::default().combinations()[0],
            status:      if rmse.is_some() { RunStatus::Completed } else { RunStatus::Failed },
            metrics:     rmse.map(|rmse| RunMetrics { rmse, mae: 0.0, r2: 0.0 }),
            artifact:    None,
            promoted:    false,
            error:       None,
            timestamp:   chrono::Utc::now(),
        }
    }

    #[test]
    fn test_leaderboard_order() {
        let mut runs = vec![run(1, None), run(2, Some(0.8)), run(3, Some(0.2)), run(4, None), run(5, Some(0.5))];
        sort_leaderboard(&mut runs);
        let order: Vec<usize> = runs.iter().map(|r| r.run_number).collect();
        assert_eq!(order, vec![3, 5, 2, 1, 4]);
    }
}

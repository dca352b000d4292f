// ============================================================
// Layer 1 - CLI Commands and Arguments
// ============================================================
// Three subcommands:
//
//   train - grid search over the hyperparameter space,
//           promoting the best model as it goes
//   serve - HTTP inference service over the promoted model
//   runs  - list tracked runs of an experiment, best first
//
// Each axis of the grid takes a comma separated list, e.g.
// `--hidden-units 50,100`. `--grid-file` replaces all four
// axes with a JSON HyperparameterSpace.

use std::fs;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::application::serve_use_case::ServeConfig;
use crate::application::train_use_case::{
    TrainConfig, DEFAULT_ARTIFACT_PATH, DEFAULT_EXPERIMENT,
};
use crate::domain::hyperparams::HyperparameterSpace;
use crate::ml::trainer::{DEFAULT_LEARNING_RATE, DEFAULT_SEED};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train every hyperparameter combination and promote the best model
    Train(TrainArgs),

    /// Serve predictions from the promoted model over HTTP
    Serve(ServeArgs),

    /// List the tracked runs of an experiment, lowest RMSE first
    Runs(RunsArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON file with x_train, y_train, x_test and y_test windows
    #[arg(long, default_value = "data/sequences.json")]
    pub data_path: String,

    /// Where the promoted model is written
    #[arg(long, default_value = DEFAULT_ARTIFACT_PATH)]
    pub artifact_path: String,

    /// Root directory of the experiment tracking logs
    #[arg(long, default_value = "mlruns")]
    pub tracking_dir: String,

    /// Experiment name the runs are filed under
    #[arg(long, default_value = DEFAULT_EXPERIMENT)]
    pub experiment: String,

    /// LSTM cell counts to try
    #[arg(long, value_delimiter = ',', default_values_t = [50usize, 100])]
    pub hidden_units: Vec<usize>,

    /// Dropout rates to try, each in [0, 1)
    #[arg(long, value_delimiter = ',', default_values_t = [0.2f64, 0.3])]
    pub dropout_rates: Vec<f64>,

    /// Mini-batch sizes to try
    #[arg(long, value_delimiter = ',', default_values_t = [32usize, 64])]
    pub batch_sizes: Vec<usize>,

    /// Epoch counts to try
    #[arg(long, value_delimiter = ',', default_values_t = [20usize, 30])]
    pub epoch_counts: Vec<usize>,

    /// JSON hyperparameter space; overrides the four axis flags
    #[arg(long)]
    pub grid_file: Option<String>,

    /// Adam learning rate
    #[arg(long, default_value_t = DEFAULT_LEARNING_RATE)]
    pub lr: f64,

    /// Seed for weight initialisation and batch shuffling
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,
}

impl TrainArgs {
    /// Build the application config, reading `--grid-file` if given.
    pub fn into_config(self) -> Result<TrainConfig> {
        let space = match &self.grid_file {
            Some(path) => load_grid_file(path)?,
            None => HyperparameterSpace {
                hidden_units:  self.hidden_units,
                dropout_rates: self.dropout_rates,
                batch_sizes:   self.batch_sizes,
                epoch_counts:  self.epoch_counts,
            },
        };
        Ok(TrainConfig {
            data_path:     self.data_path,
            artifact_path: self.artifact_path,
            tracking_dir:  self.tracking_dir,
            experiment:    self.experiment,
            space,
            learning_rate: self.lr,
            seed:          self.seed,
        })
    }
}

fn load_grid_file(path: &str) -> Result<HyperparameterSpace> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Cannot read grid file '{path}'"))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("'{path}' is not a hyperparameter space"))
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, default_value_t = 5000)]
    pub port: u16,

    /// Promoted model produced by `train`
    #[arg(long, default_value = DEFAULT_ARTIFACT_PATH)]
    pub artifact_path: String,

    /// Per-request deadline in milliseconds; unset means no deadline
    #[arg(long)]
    pub request_timeout_ms: Option<u64>,
}

impl From<ServeArgs> for ServeConfig {
    fn from(a: ServeArgs) -> Self {
        ServeConfig {
            host:               a.host,
            port:               a.port,
            artifact_path:      a.artifact_path,
            request_timeout_ms: a.request_timeout_ms,
        }
    }
}

#[derive(Args, Debug)]
pub struct RunsArgs {
    #[arg(long, default_value = "mlruns")]
    pub tracking_dir: String,

    #[arg(long, default_value = DEFAULT_EXPERIMENT)]
    pub experiment: String,

    /// Show at most this many runs
    #[arg(long)]
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn train_args(argv: &[&str]) -> TrainArgs {
        let mut full = vec!["pm25-forecast", "train"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Train(args) => args,
            other => panic!("expected train, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_are_the_sixteen_run_grid() {
        let config = train_args(&[]).into_config().unwrap();
        assert_eq!(config.space, HyperparameterSpace::default());
        assert_eq!(config.space.cardinality(), 16);
        assert_eq!(config.experiment, "LSTM Pollution Prediction");
        assert_eq!(config.artifact_path, "models/best_lstm_model.bin");
    }

    #[test]
    fn test_axis_flags_are_comma_separated() {
        let config = train_args(&["--hidden-units", "8,16,32", "--dropout-rates", "0.1"])
            .into_config()
            .unwrap();
        assert_eq!(config.space.hidden_units, vec![8, 16, 32]);
        assert_eq!(config.space.dropout_rates, vec![0.1]);
        assert_eq!(config.space.cardinality(), 12);
    }

    #[test]
    fn test_grid_file_overrides_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.json");
        let space = HyperparameterSpace {
            hidden_units:  vec![4],
            dropout_rates: vec![0.0],
            batch_sizes:   vec![2],
            epoch_counts:  vec![1],
        };
        fs::write(&path, serde_json::to_string(&space).unwrap()).unwrap();

        let path = path.display().to_string();
        let config = train_args(&["--hidden-units", "99", "--grid-file", &path])
            .into_config()
            .unwrap();
        assert_eq!(config.space, space);
    }

    #[test]
    fn test_serve_args_into_config() {
        let cli = Cli::parse_from(["pm25-forecast", "serve", "--port", "8080", "--request-timeout-ms", "250"]);
        let Commands::Serve(args) = cli.command else { panic!("expected serve") };
        let config = ServeConfig::from(args);
        assert_eq!(config.port, 8080);
        assert_eq!(config.request_timeout().unwrap().as_millis(), 250);
        assert_eq!(config.host, "0.0.0.0");
    }
}

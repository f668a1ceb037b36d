use crate::core::{CoordinatorConfig, RetryPolicy};
use crate::replay::ReplayConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Replay an escrow command script and print final wallet states
#[derive(Parser, Debug)]
#[command(name = "escrow-ledger")]
#[command(about = "Replay an escrow command script and print final wallet states", long_about = None)]
pub struct CliArgs {
    /// Input CSV file path containing commands
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    /// Upper bound on each coordinator operation
    #[arg(
        long = "timeout-ms",
        value_name = "MS",
        help = "Timeout for each coordinator operation in milliseconds (default: 5000)"
    )]
    pub timeout_ms: Option<u64>,

    /// Attempts per collaborator call
    #[arg(
        long = "max-attempts",
        value_name = "COUNT",
        help = "Attempts per collaborator call, including the first (default: 3)"
    )]
    pub max_attempts: Option<u32>,

    /// Tokio worker threads
    #[arg(
        long = "workers",
        value_name = "COUNT",
        help = "Number of runtime worker threads (default: CPU cores)"
    )]
    pub workers: Option<usize>,

    /// Number of commands read per batch
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of commands read per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,
}

impl CliArgs {
    /// Create a ReplayConfig from CLI arguments, using defaults for omitted values
    pub fn to_replay_config(&self) -> ReplayConfig {
        let default = ReplayConfig::default();
        let retry = RetryPolicy::new(
            self.max_attempts
                .unwrap_or(default.coordinator.retry.max_attempts),
            default.coordinator.retry.backoff,
        );
        let coordinator = CoordinatorConfig {
            timeout: self
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default.coordinator.timeout),
            retry,
        };

        ReplayConfig::new(
            self.batch_size.unwrap_or(default.batch_size),
            self.workers.unwrap_or(default.workers),
            coordinator,
        )
    }
}

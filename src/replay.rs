//! Command-script replay
//!
//! Drives the escrow subsystem from a CSV command script and reports the final
//! wallet states. Collaborators are served by an [`InMemoryDirectory`], so
//! setup commands (`verify`, `befriend`, `invite`, `decline`) write straight
//! into it while every money-moving command goes through the coordinator.
//!
//! # Architecture
//!
//! ```text
//! replay_file
//!     ├── ReplayConfig (batch_size, workers, CoordinatorConfig)
//!     ├── AsyncReader (batch CSV reading)
//!     └── Replayer
//!         ├── EscrowCoordinator
//!         └── Arc<InMemoryDirectory>
//! ```
//!
//! Commands are applied strictly in script order; later commands routinely
//! depend on earlier ones (fund before transfer, transfer before settle).

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::{
    Collaborators, CoordinatorConfig, EscrowCoordinator, InMemoryDirectory, LogNotifier,
};
use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::{write_wallets_csv, Command, WalletSummary};
use crate::types::EscrowError;

/// Fatal replay errors
///
/// Failures of individual commands are not fatal; they are logged and the
/// script continues.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to create tokio runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to open file '{}': {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write output: {0}")]
    Output(#[from] csv::Error),
}

/// Configuration for script replay
#[derive(Clone, Debug)]
pub struct ReplayConfig {
    /// Number of commands read per batch
    pub batch_size: usize,
    /// Tokio worker threads
    pub workers: usize,
    pub coordinator: CoordinatorConfig,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            workers: num_cpus::get(),
            coordinator: CoordinatorConfig::default(),
        }
    }
}

impl ReplayConfig {
    /// Create a config, falling back to defaults for zero sizes
    pub fn new(batch_size: usize, workers: usize, coordinator: CoordinatorConfig) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(default = default.batch_size, "invalid batch_size 0, using default");
            default.batch_size
        } else {
            batch_size
        };

        let workers = if workers == 0 {
            warn!(default = default.workers, "invalid workers 0, using default");
            default.workers
        } else {
            workers
        };

        Self {
            batch_size,
            workers,
            coordinator,
        }
    }
}

/// Applies commands to an in-memory escrow subsystem
#[derive(Debug)]
pub struct Replayer {
    coordinator: EscrowCoordinator,
    directory: Arc<InMemoryDirectory>,
}

impl Replayer {
    pub fn new(config: CoordinatorConfig) -> Self {
        let directory = Arc::new(InMemoryDirectory::new());
        let collaborators = Collaborators {
            identity: directory.clone(),
            social: directory.clone(),
            events: directory.clone(),
            notifier: Arc::new(LogNotifier),
        };

        Self {
            coordinator: EscrowCoordinator::new(collaborators, config),
            directory,
        }
    }

    pub fn coordinator(&self) -> &EscrowCoordinator {
        &self.coordinator
    }

    pub fn directory(&self) -> &Arc<InMemoryDirectory> {
        &self.directory
    }

    /// Apply a single command
    pub async fn apply(&self, command: Command) -> Result<(), EscrowError> {
        let coordinator = &self.coordinator;

        match command {
            Command::Verify { user } => self.directory.verify(&user),
            Command::Befriend { user, friend } => self.directory.befriend(&user, &friend),
            Command::Invite { user, event } => self.directory.invite(&event, &user),
            Command::Decline { user, event } => self.directory.decline(&event, &user)?,
            Command::Open { user, pin } => {
                coordinator.open_wallet(&user, &pin).await?;
            }
            Command::Fund {
                user,
                amount,
                reference,
            } => {
                coordinator.confirm_funding(&user, amount, &reference).await?;
            }
            Command::Transfer {
                from,
                to,
                amount,
                pin,
                token,
            } => {
                coordinator
                    .request_transfer(&from, &to, amount, &pin, &token)
                    .await?;
            }
            Command::Settle {
                from,
                token,
                outcome,
            } => {
                let tx = coordinator.ledger().find_by_token(&from, &token)?;
                coordinator.settle_transaction(tx.id, &outcome).await?;
            }
            Command::Accept {
                user,
                event,
                amount,
            } => {
                coordinator.accept_invite(&user, &event, amount).await?;
            }
            Command::Refund { user, purpose } => {
                coordinator.refund_budget(&user, &purpose).await?;
            }
            Command::Payout {
                user,
                purpose,
                payee,
            } => {
                coordinator.pay_out_budget(&user, &purpose, &payee).await?;
            }
            Command::ChangePin {
                user,
                old_pin,
                new_pin,
            } => {
                coordinator.change_pin(&user, &old_pin, &new_pin).await?;
            }
        }

        Ok(())
    }

    /// Balance and locked total of every wallet
    pub fn summaries(&self) -> Vec<WalletSummary> {
        let budgets = self.coordinator.budgets();
        self.coordinator
            .wallets()
            .all()
            .into_iter()
            .map(|wallet| WalletSummary {
                locked: budgets.locked_total(&wallet.user),
                balance: wallet.balance,
                user: wallet.user,
            })
            .collect()
    }
}

/// Replay the script at `input_path` and write final wallet states to `output`
///
/// # Returns
///
/// * `Ok(())` - Script replayed, possibly with rejected commands
/// * `Err(ReplayError)` - The runtime, the input file or the output failed
pub fn replay_file(
    input_path: &Path,
    output: &mut dyn Write,
    config: &ReplayConfig,
) -> Result<(), ReplayError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()
        .map_err(ReplayError::Runtime)?;

    runtime.block_on(async {
        let file = tokio::fs::File::open(input_path)
            .await
            .map_err(|source| ReplayError::Open {
                path: input_path.to_path_buf(),
                source,
            })?;

        // csv-async reads through the futures AsyncRead traits
        let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
        let mut reader = AsyncReader::new(compat_file);
        let replayer = Replayer::new(config.coordinator);
        let mut line = 0usize;

        loop {
            let batch = reader.read_batch(config.batch_size).await;
            if batch.is_empty() {
                break;
            }

            for command in batch {
                line += 1;
                debug!(line, ?command, "applying command");
                if let Err(e) = replayer.apply(command).await {
                    warn!(line, error = %e, "command rejected");
                }
            }
        }

        write_wallets_csv(&replayer.summaries(), output)?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use rust_decimal::Decimal;
    use tempfile::NamedTempFile;

    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[tokio::test]
    async fn test_apply_settle_looks_up_token() {
        let replayer = Replayer::new(CoordinatorConfig::default());
        for user in ["alice", "bob"] {
            replayer
                .apply(Command::Verify {
                    user: user.to_string(),
                })
                .await
                .unwrap();
            replayer
                .apply(Command::Open {
                    user: user.to_string(),
                    pin: "1234".to_string(),
                })
                .await
                .unwrap();
        }
        replayer
            .apply(Command::Befriend {
                user: "alice".to_string(),
                friend: "bob".to_string(),
            })
            .await
            .unwrap();
        replayer
            .apply(Command::Fund {
                user: "alice".to_string(),
                amount: Decimal::from(10),
                reference: "dep".to_string(),
            })
            .await
            .unwrap();
        replayer
            .apply(Command::Transfer {
                from: "alice".to_string(),
                to: "bob".to_string(),
                amount: Decimal::from(4),
                pin: "1234".to_string(),
                token: "t-1".to_string(),
            })
            .await
            .unwrap();

        replayer
            .apply(Command::Settle {
                from: "alice".to_string(),
                token: "t-1".to_string(),
                outcome: "success".to_string(),
            })
            .await
            .unwrap();

        let wallets = replayer.coordinator().wallets();
        assert_eq!(wallets.get_balance("alice").unwrap(), Decimal::from(6));
        assert_eq!(wallets.get_balance("bob").unwrap(), Decimal::from(4));
    }

    #[tokio::test]
    async fn test_apply_settle_unknown_token() {
        let replayer = Replayer::new(CoordinatorConfig::default());

        let err = replayer
            .apply(Command::Settle {
                from: "alice".to_string(),
                token: "missing".to_string(),
                outcome: "success".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_replay_file_writes_summaries() {
        let file = create_temp_csv(
            "op,user,counterparty,purpose,amount,pin,token,outcome\n\
             verify,alice,,,,,,\n\
             open,alice,,,,1234,,\n\
             fund,alice,,,500,,dep-1,\n\
             invite,alice,,party,,,,\n\
             accept,alice,,party,200,,,\n",
        );
        let mut output = Vec::new();

        replay_file(file.path(), &mut output, &ReplayConfig::default()).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "user,balance,locked\nalice,300.0000,200.0000\n"
        );
    }

    #[test]
    fn test_replay_file_small_batches_keep_order() {
        let file = create_temp_csv(
            "op,user,counterparty,purpose,amount,pin,token,outcome\n\
             verify,alice,,,,,,\n\
             open,alice,,,,1234,,\n\
             fund,alice,,,100,,dep-1,\n\
             fund,alice,,,50,,dep-2,\n\
             fund,alice,,,50,,dep-2,\n",
        );
        let config = ReplayConfig::new(1, 2, CoordinatorConfig::default());
        let mut output = Vec::new();

        replay_file(file.path(), &mut output, &config).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "user,balance,locked\nalice,150.0000,0.0000\n"
        );
    }

    #[test]
    fn test_replay_file_missing_input() {
        let mut output = Vec::new();

        let err = replay_file(
            Path::new("nonexistent.csv"),
            &mut output,
            &ReplayConfig::default(),
        )
        .unwrap_err();

        assert!(matches!(err, ReplayError::Open { .. }));
        assert!(err.to_string().contains("failed to open file"));
    }

    #[test]
    fn test_config_zero_values_fall_back() {
        let config = ReplayConfig::new(0, 0, CoordinatorConfig::default());

        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.workers, num_cpus::get());
    }
}

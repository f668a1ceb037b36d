//! Escrow Ledger CLI
//!
//! Replays a CSV command script through the escrow subsystem.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- commands.csv > wallets.csv
//! cargo run -- --timeout-ms 1000 --max-attempts 5 commands.csv > wallets.csv
//! RUST_LOG=info cargo run -- commands.csv > wallets.csv
//! ```
//!
//! Final wallet states go to stdout; logs go to stderr. Rejected commands are
//! logged at `warn` and do not stop the replay.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (file not found, file not readable, output failure, etc.)

use escrow_ledger::cli;
use escrow_ledger::replay;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = cli::parse_args();
    let config = args.to_replay_config();

    let mut output = std::io::stdout();
    if let Err(e) = replay::replay_file(&args.input_file, &mut output, &config) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

//! End-to-end integration tests
//!
//! These tests validate the complete replay pipeline using predefined CSV
//! fixtures. Each test:
//! 1. Reads input.csv from a fixture directory
//! 2. Replays every command through the escrow coordinator
//! 3. Generates the wallet output CSV
//! 4. Compares actual output with expected.csv
//!
//! Test fixtures are located in tests/fixtures/ and cover:
//! - Transfer request and settlement
//! - Escrow lock, payout and refund flows
//! - Declined invites and insufficient funds
//! - Settlement after the sender's balance dropped
//! - Rejected commands (bad PIN, non-friends, self transfer, double settlement)
//! - Malformed rows and idempotent replays
//!
//! Each fixture runs with the default batch size and with single-command
//! batches.

#[cfg(test)]
mod tests {
    use escrow_ledger::core::CoordinatorConfig;
    use escrow_ledger::replay::{replay_file, ReplayConfig};
    use rstest::rstest;
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use tempfile::NamedTempFile;

    /// Replay input.csv of a fixture and compare the output with expected.csv
    fn run_test_fixture(fixture_name: &str, batch_size: usize) {
        let fixture_dir = format!("tests/fixtures/{}", fixture_name);
        let input_path = format!("{}/input.csv", fixture_dir);
        let expected_path = format!("{}/expected.csv", fixture_dir);

        assert!(
            Path::new(&input_path).exists(),
            "Input file not found: {}",
            input_path
        );
        assert!(
            Path::new(&expected_path).exists(),
            "Expected file not found: {}",
            expected_path
        );

        let config = ReplayConfig::new(batch_size, 2, CoordinatorConfig::default());
        let mut temp_output = NamedTempFile::new().expect("Failed to create temp file");

        replay_file(Path::new(&input_path), &mut temp_output, &config)
            .unwrap_or_else(|e| panic!("Failed to replay commands: {}", e));

        temp_output.flush().expect("Failed to flush temp file");

        let actual_output = fs::read_to_string(temp_output.path())
            .unwrap_or_else(|e| panic!("Failed to read temp output file: {}", e));
        let expected_output = fs::read_to_string(&expected_path)
            .unwrap_or_else(|e| panic!("Failed to read expected file {}: {}", expected_path, e));

        assert_eq!(
            actual_output, expected_output,
            "\n\nOutput mismatch for fixture: {} (batch size: {})\n\nActual output:\n{}\n\nExpected output:\n{}\n",
            fixture_name, batch_size, actual_output, expected_output
        );
    }

    #[rstest]
    #[case("happy_path")]
    #[case("escrow_flow")]
    #[case("refund_flow")]
    #[case("declined_invite")]
    #[case("insufficient_funds")]
    #[case("settlement_failure")]
    #[case("rejected_commands")]
    #[case("malformed_data")]
    #[case("pin_change")]
    #[case("idempotent_requests")]
    fn test_fixtures(#[case] fixture: &str, #[values(1, 1000)] batch_size: usize) {
        run_test_fixture(fixture, batch_size);
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let mut output = Vec::new();

        let result = replay_file(
            Path::new("tests/fixtures/does_not_exist/input.csv"),
            &mut output,
            &ReplayConfig::default(),
        );

        assert!(result.is_err());
        assert!(output.is_empty());
    }
}

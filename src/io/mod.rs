//! I/O module
//!
//! Handles command-script parsing and wallet-state output.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (record conversion, output serialization)
//! - `async_reader` - Asynchronous CSV reader with batch reading interface

pub mod async_reader;
pub mod csv_format;

pub use async_reader::AsyncReader;
pub use csv_format::{
    convert_command_record, write_wallets_csv, Command, CommandRecord, WalletSummary,
};

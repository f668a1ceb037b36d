//! CSV format handling for command scripts and wallet output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CommandRecord structure for deserialization
//! - Conversion from CSV records to replay commands
//! - Wallet state output serialization
//!
//! All functions are pure (no I/O) for easy testing.
//!
//! # Columns
//!
//! `op,user,counterparty,purpose,amount,pin,token,outcome`; unused columns are
//! left empty. `counterparty` names the friend, recipient or payee, `purpose`
//! names the event. For `fund` the `token` column carries the funding
//! reference, and for `change_pin` it carries the new PIN.

use crate::types::{PurposeId, UserId};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// CSV record structure for deserialization
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct CommandRecord {
    pub op: String,
    pub user: UserId,
    pub counterparty: Option<String>,
    pub purpose: Option<String>,
    pub amount: Option<String>,
    pub pin: Option<String>,
    pub token: Option<String>,
    pub outcome: Option<String>,
}

/// A single step of a command script
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Mark the user's KYC as verified
    Verify { user: UserId },
    Befriend { user: UserId, friend: UserId },
    Invite { user: UserId, event: PurposeId },
    Decline { user: UserId, event: PurposeId },
    Open { user: UserId, pin: String },
    Fund {
        user: UserId,
        amount: Decimal,
        reference: String,
    },
    Transfer {
        from: UserId,
        to: UserId,
        amount: Decimal,
        pin: String,
        token: String,
    },
    /// Settle the transfer `from` created under `token`
    Settle {
        from: UserId,
        token: String,
        outcome: String,
    },
    Accept {
        user: UserId,
        event: PurposeId,
        amount: Decimal,
    },
    Refund { user: UserId, purpose: PurposeId },
    Payout {
        user: UserId,
        purpose: PurposeId,
        payee: UserId,
    },
    ChangePin {
        user: UserId,
        old_pin: String,
        new_pin: String,
    },
}

fn required(
    field: Option<String>,
    name: &str,
    record_op: &str,
    user: &str,
) -> Result<String, String> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(format!(
            "'{}' command for user '{}' requires field '{}'",
            record_op, user, name
        )),
    }
}

/// Decimal places carried by amounts, matching the output format
const AMOUNT_SCALE: u32 = 4;

fn parse_amount(field: Option<String>, record_op: &str, user: &str) -> Result<Decimal, String> {
    let raw = required(field, "amount", record_op, user)?;
    let amount = Decimal::from_str(&raw).map_err(|_| {
        format!(
            "Invalid amount '{}' in '{}' command for user '{}'",
            raw, record_op, user
        )
    })?;

    // trailing zeros are fine, extra significant places are not
    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(format!(
            "Amount '{}' in '{}' command for user '{}' has more than {} decimal places",
            raw, record_op, user, AMOUNT_SCALE
        ));
    }
    Ok(amount)
}

/// Convert a CommandRecord to a Command
///
/// The op name is case insensitive. Fields the op needs must be present and
/// non-blank; fields it does not use are ignored.
///
/// # Returns
///
/// * `Ok(Command)` - Successfully converted record
/// * `Err(String)` - Error message describing the conversion failure
pub fn convert_command_record(record: CommandRecord) -> Result<Command, String> {
    let op = record.op.trim().to_lowercase();
    let user = record.user.trim().to_string();
    if user.is_empty() {
        return Err(format!("'{}' command is missing a user", record.op));
    }

    let command = match op.as_str() {
        "verify" => Command::Verify { user },
        "befriend" => Command::Befriend {
            friend: required(record.counterparty, "counterparty", &op, &user)?,
            user,
        },
        "invite" => Command::Invite {
            event: required(record.purpose, "purpose", &op, &user)?,
            user,
        },
        "decline" => Command::Decline {
            event: required(record.purpose, "purpose", &op, &user)?,
            user,
        },
        "open" => Command::Open {
            pin: required(record.pin, "pin", &op, &user)?,
            user,
        },
        "fund" => Command::Fund {
            amount: parse_amount(record.amount, &op, &user)?,
            reference: required(record.token, "token", &op, &user)?,
            user,
        },
        "transfer" => Command::Transfer {
            to: required(record.counterparty, "counterparty", &op, &user)?,
            amount: parse_amount(record.amount, &op, &user)?,
            pin: required(record.pin, "pin", &op, &user)?,
            token: required(record.token, "token", &op, &user)?,
            from: user,
        },
        "settle" => Command::Settle {
            token: required(record.token, "token", &op, &user)?,
            outcome: required(record.outcome, "outcome", &op, &user)?,
            from: user,
        },
        "accept" => Command::Accept {
            event: required(record.purpose, "purpose", &op, &user)?,
            amount: parse_amount(record.amount, &op, &user)?,
            user,
        },
        "refund" => Command::Refund {
            purpose: required(record.purpose, "purpose", &op, &user)?,
            user,
        },
        "payout" => Command::Payout {
            purpose: required(record.purpose, "purpose", &op, &user)?,
            payee: required(record.counterparty, "counterparty", &op, &user)?,
            user,
        },
        "change_pin" => Command::ChangePin {
            old_pin: required(record.pin, "pin", &op, &user)?,
            new_pin: required(record.token, "token", &op, &user)?,
            user,
        },
        _ => {
            return Err(format!(
                "Invalid command: '{}' for user '{}'",
                record.op, user
            ))
        }
    };

    Ok(command)
}

/// Final state of one wallet
#[derive(Debug, Clone, PartialEq)]
pub struct WalletSummary {
    pub user: UserId,
    /// Spendable balance
    pub balance: Decimal,
    /// Sum of the user's active budgets
    pub locked: Decimal,
}

/// Write wallet states to CSV format
///
/// Writes wallets with columns: user, balance, locked. Rows are sorted by user
/// for deterministic output and amounts carry four decimal places.
pub fn write_wallets_csv(
    wallets: &[WalletSummary],
    output: &mut dyn Write,
) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record(["user", "balance", "locked"])?;

    let mut sorted = wallets.to_vec();
    sorted.sort_by(|a, b| a.user.cmp(&b.user));

    for wallet in sorted {
        writer.write_record(&[
            wallet.user,
            format!("{:.4}", wallet.balance),
            format!("{:.4}", wallet.locked),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

//! Collaborator traits consumed by the escrow subsystem
//!
//! Identity, social graph, event/attendee records and notification delivery
//! live outside this crate. They are injected into the stores and the
//! coordinator as trait objects so tests can substitute doubles.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{EscrowError, PurposeId, UserId};

/// Identity resolved from an opaque caller token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: UserId,
    /// Whether KYC verification has completed
    pub kyc_verified: bool,
}

/// Idempotency key for the accept-invite workflow
///
/// Updates keyed by the same (event, user) pair converge instead of applying
/// their deltas twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AcceptanceKey {
    pub event: PurposeId,
    pub user: UserId,
}

/// Attendance status of a user on an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendeeStatus {
    Invited,
    Attending { budget: Decimal },
    Declined,
}

/// Resolves caller tokens to users
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Identity, EscrowError>;
}

/// Answers friendship queries
#[async_trait]
pub trait SocialGraph: Send + Sync {
    async fn are_friends(&self, a: &str, b: &str) -> Result<bool, EscrowError>;
}

/// Owner of the attendee and event aggregate records
///
/// Both update operations must be conditional on the current state so that
/// repeating them with the same key is a no-op.
#[async_trait]
pub trait EventDirectory: Send + Sync {
    /// Current status of `user` on `event`, `None` if never invited
    async fn attendee_status(
        &self,
        event: &str,
        user: &str,
    ) -> Result<Option<AttendeeStatus>, EscrowError>;

    /// Move the attendee record from `invited` to `attending` with `budget`
    async fn mark_attending(&self, key: &AcceptanceKey, budget: Decimal)
        -> Result<(), EscrowError>;

    /// Move the user from the event's invited set to its attendees, bumping
    /// `attendee_count` and the cumulative budget
    async fn record_attendance(
        &self,
        key: &AcceptanceKey,
        budget: Decimal,
    ) -> Result<(), EscrowError>;
}

/// Fire-and-forget notification delivery
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user: &str, message: &str);
}

//! In-memory collaborators
//!
//! `InMemoryDirectory` stands in for the identity, social-graph and event
//! services. It backs the replay binary and the tests. Event updates are
//! conditional on the current record state, so applying the same
//! [`AcceptanceKey`] twice leaves the records unchanged.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use tracing::{debug, info};

use super::traits::{
    AcceptanceKey, AttendeeStatus, EventDirectory, Identity, IdentityVerifier, Notifier,
    SocialGraph,
};
use crate::types::{EscrowError, PurposeId, UserId};

/// Aggregate counters of an event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventAggregate {
    pub invited: BTreeSet<UserId>,
    pub attendees: BTreeSet<UserId>,
    pub attendee_count: u32,
    /// Sum of every attendee's committed budget
    pub budget: Decimal,
}

/// Identity, social graph and event records held in memory
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    verified: DashSet<UserId>,

    /// Friendships, stored with the smaller user ID first
    friendships: DashSet<(UserId, UserId)>,

    attendees: DashMap<(PurposeId, UserId), AttendeeStatus>,

    events: DashMap<PurposeId, EventAggregate>,
}

fn pair(a: &str, b: &str) -> (UserId, UserId) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a user's KYC as verified
    pub fn verify(&self, user: &str) {
        self.verified.insert(user.to_string());
    }

    pub fn befriend(&self, a: &str, b: &str) {
        self.friendships.insert(pair(a, b));
    }

    /// Invite a user to an event; no-op if they already have a status
    pub fn invite(&self, event: &str, user: &str) {
        let key = (event.to_string(), user.to_string());
        if self.attendees.contains_key(&key) {
            return;
        }
        self.attendees.insert(key, AttendeeStatus::Invited);
        self.events
            .entry(event.to_string())
            .or_default()
            .invited
            .insert(user.to_string());
    }

    /// Decline a pending invite
    pub fn decline(&self, event: &str, user: &str) -> Result<(), EscrowError> {
        let key = (event.to_string(), user.to_string());
        let mut status = self.attendees.get_mut(&key).ok_or_else(|| EscrowError::NotFound {
            entity: "invite",
            key: format!("{}/{}", event, user),
        })?;

        if *status != AttendeeStatus::Invited {
            return Err(EscrowError::precheck_failed(format!(
                "user {} is not awaiting a reply to {}",
                user, event
            )));
        }
        *status = AttendeeStatus::Declined;
        drop(status);

        if let Some(mut aggregate) = self.events.get_mut(event) {
            aggregate.invited.remove(user);
        }
        Ok(())
    }

    pub fn event(&self, event: &str) -> Option<EventAggregate> {
        self.events.get(event).map(|e| e.value().clone())
    }

    pub fn attendee(&self, event: &str, user: &str) -> Option<AttendeeStatus> {
        self.attendees
            .get(&(event.to_string(), user.to_string()))
            .map(|s| *s.value())
    }
}

#[async_trait]
impl IdentityVerifier for InMemoryDirectory {
    /// Tokens are user IDs
    async fn resolve(&self, token: &str) -> Result<Identity, EscrowError> {
        Ok(Identity {
            user: token.to_string(),
            kyc_verified: self.verified.contains(token),
        })
    }
}

#[async_trait]
impl SocialGraph for InMemoryDirectory {
    async fn are_friends(&self, a: &str, b: &str) -> Result<bool, EscrowError> {
        Ok(self.friendships.contains(&pair(a, b)))
    }
}

#[async_trait]
impl EventDirectory for InMemoryDirectory {
    async fn attendee_status(
        &self,
        event: &str,
        user: &str,
    ) -> Result<Option<AttendeeStatus>, EscrowError> {
        Ok(self.attendee(event, user))
    }

    async fn mark_attending(
        &self,
        key: &AcceptanceKey,
        budget: Decimal,
    ) -> Result<(), EscrowError> {
        let mut status = self
            .attendees
            .get_mut(&(key.event.clone(), key.user.clone()))
            .ok_or_else(|| EscrowError::NotFound {
                entity: "invite",
                key: format!("{}/{}", key.event, key.user),
            })?;

        let current = *status;
        match current {
            AttendeeStatus::Invited => {
                *status = AttendeeStatus::Attending { budget };
                debug!(event = %key.event, user = %key.user, "attendee marked attending");
                Ok(())
            }
            AttendeeStatus::Attending { budget: held } if held == budget => Ok(()),
            other => Err(EscrowError::precheck_failed(format!(
                "attendee {} on {} is {:?}",
                key.user, key.event, other
            ))),
        }
    }

    async fn record_attendance(
        &self,
        key: &AcceptanceKey,
        budget: Decimal,
    ) -> Result<(), EscrowError> {
        let mut aggregate = self.events.get_mut(&key.event).ok_or_else(|| EscrowError::NotFound {
            entity: "event",
            key: key.event.clone(),
        })?;

        if aggregate.attendees.contains(&key.user) {
            return Ok(());
        }
        if !aggregate.invited.contains(&key.user) {
            return Err(EscrowError::precheck_failed(format!(
                "user {} is not invited to {}",
                key.user, key.event
            )));
        }

        // totals are checked before any field changes
        let total = aggregate.budget.checked_add(budget).ok_or_else(|| {
            EscrowError::precheck_failed(format!("budget total of {} would overflow", key.event))
        })?;
        let count = aggregate.attendee_count.checked_add(1).ok_or_else(|| {
            EscrowError::precheck_failed(format!("attendee count of {} would overflow", key.event))
        })?;

        aggregate.invited.remove(&key.user);
        aggregate.attendees.insert(key.user.clone());
        aggregate.attendee_count = count;
        aggregate.budget = total;
        debug!(event = %key.event, user = %key.user, "attendance recorded");
        Ok(())
    }
}

/// Notifier that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, user: &str, message: &str) {
        info!(user, message, "notification");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;

    fn key(event: &str, user: &str) -> AcceptanceKey {
        AcceptanceKey {
            event: event.to_string(),
            user: user.to_string(),
        }
    }

    #[tokio::test]
    async fn test_friendship_is_symmetric() {
        let directory = InMemoryDirectory::new();
        directory.befriend("bob", "alice");

        assert!(directory.are_friends("alice", "bob").await.unwrap());
        assert!(directory.are_friends("bob", "alice").await.unwrap());
        assert!(!directory.are_friends("alice", "carol").await.unwrap());
    }

    #[tokio::test]
    async fn test_resolve_reports_kyc() {
        let directory = InMemoryDirectory::new();
        directory.verify("alice");

        assert!(directory.resolve("alice").await.unwrap().kyc_verified);
        assert!(!directory.resolve("bob").await.unwrap().kyc_verified);
    }

    #[tokio::test]
    async fn test_attendance_updates_are_idempotent() {
        let directory = InMemoryDirectory::new();
        directory.invite("party", "alice");
        let k = key("party", "alice");

        for _ in 0..2 {
            directory.mark_attending(&k, Decimal::from(30)).await.unwrap();
            directory
                .record_attendance(&k, Decimal::from(30))
                .await
                .unwrap();
        }

        let event = directory.event("party").unwrap();
        assert_eq!(event.attendee_count, 1);
        assert_eq!(event.budget, Decimal::from(30));
        assert!(event.invited.is_empty());
        assert_eq!(
            directory.attendee("party", "alice"),
            Some(AttendeeStatus::Attending {
                budget: Decimal::from(30)
            })
        );
    }

    #[tokio::test]
    async fn test_mark_attending_with_other_budget_fails() {
        let directory = InMemoryDirectory::new();
        directory.invite("party", "alice");
        let k = key("party", "alice");
        directory.mark_attending(&k, Decimal::from(30)).await.unwrap();

        let err = directory
            .mark_attending(&k, Decimal::from(40))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PrecheckFailed);
    }

    #[tokio::test]
    async fn test_declined_user_cannot_attend() {
        let directory = InMemoryDirectory::new();
        directory.invite("party", "alice");
        directory.decline("party", "alice").unwrap();
        let k = key("party", "alice");

        assert!(directory.mark_attending(&k, Decimal::ONE).await.is_err());
        assert!(directory.record_attendance(&k, Decimal::ONE).await.is_err());
        assert_eq!(
            directory.decline("party", "alice").unwrap_err().kind(),
            ErrorKind::PrecheckFailed
        );
    }

    #[tokio::test]
    async fn test_budget_total_overflow_leaves_aggregate_unchanged() {
        let directory = InMemoryDirectory::new();
        directory.invite("party", "alice");
        directory.invite("party", "bob");
        directory
            .record_attendance(&key("party", "alice"), Decimal::MAX)
            .await
            .unwrap();

        let err = directory
            .record_attendance(&key("party", "bob"), Decimal::MAX)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PrecheckFailed);
        let event = directory.event("party").unwrap();
        assert_eq!(event.attendee_count, 1);
        assert_eq!(event.budget, Decimal::MAX);
        assert!(event.invited.contains("bob"));
        assert!(!event.attendees.contains("bob"));
    }

    #[test]
    fn test_invite_does_not_reset_status() {
        let directory = InMemoryDirectory::new();
        directory.invite("party", "alice");
        directory.decline("party", "alice").unwrap();

        directory.invite("party", "alice");

        assert_eq!(
            directory.attendee("party", "alice"),
            Some(AttendeeStatus::Declined)
        );
    }
}

//! Invitation records and their lifecycle
//!
//! ```text
//! Pending --accept--> Accepted
//! Pending --reject--> Rejected
//! Pending --cancel--> Cancelled
//! Pending --(expires_at passed)--> Expired
//! ```
//!
//! Terminal statuses are sinks. The stores enforce transitions with a
//! compare-and-swap on the expected `Pending` status.

use crate::{emails_match, CollabError, InvitationId, TripId, UserId, UserRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle status of an invitation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
    Cancelled,
}

impl InvitationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvitationStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Rejected => "rejected",
            InvitationStatus::Expired => "expired",
            InvitationStatus::Cancelled => "cancelled",
        }
    }

    /// Whether `self -> to` is a legal lifecycle edge
    pub fn can_transition_to(&self, to: InvitationStatus) -> bool {
        matches!(self, InvitationStatus::Pending) && to.is_terminal()
    }
}

impl std::fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvitationStatus {
    type Err = CollabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InvitationStatus::Pending),
            "accepted" => Ok(InvitationStatus::Accepted),
            "rejected" => Ok(InvitationStatus::Rejected),
            "expired" => Ok(InvitationStatus::Expired),
            "cancelled" => Ok(InvitationStatus::Cancelled),
            other => Err(CollabError::Validation(format!(
                "unknown invitation status: {other}"
            ))),
        }
    }
}

/// Who an invitation is addressed to
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Recipient {
    /// An existing account
    User(UserId),
    /// An email address, possibly without an account yet. Stored lowercased.
    Email(String),
}

impl Recipient {
    /// Build from the two optional request fields; exactly one must be set
    pub fn from_parts(
        user_id: Option<UserId>,
        email: Option<String>,
    ) -> Result<Self, CollabError> {
        let email = email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty());
        match (user_id, email) {
            (Some(id), None) => Ok(Recipient::User(id)),
            (None, Some(email)) => Ok(Recipient::Email(email.to_lowercase())),
            _ => Err(CollabError::InvalidRecipient),
        }
    }

    /// Uniqueness key used by stores for the one-pending-per-recipient rule
    pub fn key(&self) -> String {
        match self {
            Recipient::User(id) => format!("user:{id}"),
            Recipient::Email(email) => format!("email:{}", email.to_lowercase()),
        }
    }
}

/// A proposal for a user or email address to join a trip
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub trip_id: TripId,
    pub invited_by: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invited_user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invited_email: Option<String>,
    pub status: InvitationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Opaque secret, only issued for email invitations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
}

impl Invitation {
    pub fn new(
        trip_id: TripId,
        invited_by: UserId,
        recipient: Recipient,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let (invited_user_id, invited_email) = match recipient {
            Recipient::User(id) => (Some(id), None),
            Recipient::Email(email) => (None, Some(email)),
        };
        Self {
            id: InvitationId::generate(),
            trip_id,
            invited_by,
            invited_user_id,
            invited_email,
            status: InvitationStatus::Pending,
            message: None,
            token: None,
            created_at: Utc::now(),
            expires_at,
            responded_at: None,
        }
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// The addressee, or `None` for a malformed record that sets both or neither side
    pub fn recipient(&self) -> Option<Recipient> {
        match (&self.invited_user_id, &self.invited_email) {
            (Some(id), None) => Some(Recipient::User(id.clone())),
            (None, Some(email)) => Some(Recipient::Email(email.clone())),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == InvitationStatus::Pending
    }

    /// Pending but past its deadline, i.e. due for the `Expired` transition
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && now >= self.expires_at
    }

    /// Whether `user` is the addressee: by id, or by email for email invitations
    pub fn is_addressed_to(&self, user: &UserRecord) -> bool {
        match self.recipient() {
            Some(Recipient::User(id)) => id == user.id,
            Some(Recipient::Email(email)) => user.has_email(&email),
            None => false,
        }
    }
}

/// Which invitations a query selects
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvitationScope {
    Trip(TripId),
    SentBy(UserId),
    /// Addressed to the user by id, or to any of their emails
    ReceivedBy {
        user_id: UserId,
        email: Option<String>,
    },
}

/// Filtered invitation listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvitationQuery {
    pub scope: InvitationScope,
    pub status: Option<InvitationStatus>,
    /// When false, drops `Expired` records and pending ones past their deadline
    pub include_expired: bool,
    pub as_of: DateTime<Utc>,
}

impl InvitationQuery {
    pub fn new(scope: InvitationScope) -> Self {
        Self {
            scope,
            status: None,
            include_expired: false,
            as_of: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: Option<InvitationStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn including_expired(mut self, include: bool) -> Self {
        self.include_expired = include;
        self
    }

    pub fn matches(&self, invitation: &Invitation) -> bool {
        let in_scope = match &self.scope {
            InvitationScope::Trip(trip_id) => &invitation.trip_id == trip_id,
            InvitationScope::SentBy(user_id) => &invitation.invited_by == user_id,
            InvitationScope::ReceivedBy { user_id, email } => {
                invitation.invited_user_id.as_ref() == Some(user_id)
                    || match (&invitation.invited_email, email) {
                        (Some(a), Some(b)) => emails_match(a, b),
                        _ => false,
                    }
            }
        };
        if !in_scope {
            return false;
        }
        if let Some(status) = self.status {
            if invitation.status != status {
                return false;
            }
        }
        if !self.include_expired
            && (invitation.status == InvitationStatus::Expired || invitation.is_lapsed(self.as_of))
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn email_invitation(email: &str) -> Invitation {
        Invitation::new(
            TripId::new("trip-1"),
            UserId::new("alice"),
            Recipient::Email(email.to_string()),
            Utc::now() + Duration::days(7),
        )
    }

    #[test]
    fn test_recipient_requires_exactly_one_side() {
        assert!(Recipient::from_parts(None, None).is_err());
        assert!(Recipient::from_parts(
            Some(UserId::new("bob")),
            Some("bob@example.com".into())
        )
        .is_err());
        assert!(Recipient::from_parts(None, Some("   ".into())).is_err());
        assert_eq!(
            Recipient::from_parts(None, Some(" Bob@Example.com ".into())).unwrap(),
            Recipient::Email("bob@example.com".into())
        );
    }

    #[test]
    fn test_terminal_statuses_are_sinks() {
        for status in [
            InvitationStatus::Accepted,
            InvitationStatus::Rejected,
            InvitationStatus::Expired,
            InvitationStatus::Cancelled,
        ] {
            assert!(status.is_terminal());
            assert!(!status.can_transition_to(InvitationStatus::Accepted));
            assert!(!status.can_transition_to(InvitationStatus::Pending));
        }
        assert!(InvitationStatus::Pending.can_transition_to(InvitationStatus::Expired));
        assert!(!InvitationStatus::Pending.can_transition_to(InvitationStatus::Pending));
    }

    #[test]
    fn test_addressed_by_email_is_case_insensitive() {
        let invitation = email_invitation("bob@example.com");
        let bob = UserRecord::new(UserId::new("bob"), "bob", "Bob@Example.COM");
        let carol = UserRecord::new(UserId::new("carol"), "carol", "carol@example.com");
        assert!(invitation.is_addressed_to(&bob));
        assert!(!invitation.is_addressed_to(&carol));
    }

    #[test]
    fn test_query_hides_lapsed_unless_asked() {
        let mut invitation = email_invitation("bob@example.com");
        invitation.expires_at = Utc::now() - Duration::minutes(1);

        let query = InvitationQuery::new(InvitationScope::Trip(TripId::new("trip-1")));
        assert!(!query.matches(&invitation));
        assert!(query.including_expired(true).matches(&invitation));
    }

    #[test]
    fn test_received_scope_matches_email() {
        let invitation = email_invitation("bob@example.com");
        let query = InvitationQuery::new(InvitationScope::ReceivedBy {
            user_id: UserId::new("bob"),
            email: Some("BOB@example.com".into()),
        });
        assert!(query.matches(&invitation));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            InvitationStatus::Pending,
            InvitationStatus::Accepted,
            InvitationStatus::Rejected,
            InvitationStatus::Expired,
            InvitationStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<InvitationStatus>().unwrap(), status);
        }
    }
}

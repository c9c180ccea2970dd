//! Trip membership shape
//!
//! Only the fields the collaboration core reasons about are modelled here;
//! everything else about a trip (destinations, budget, images) belongs to
//! the trip store.
//!
//! `created_by` is the single source of truth for who the creator is.
//! `members` never contains the creator; [`Trip::roster`] synthesizes the
//! creator entry at read time.

use crate::{TripId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role a user holds within a trip
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Creator,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Creator => "creator",
            MemberRole::Member => "member",
        }
    }
}

impl std::fmt::Display for MemberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A collaborator's standing on a trip
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: UserId,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
    /// Who invited this member, kept for audit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invited_by: Option<UserId>,
}

impl Member {
    pub fn new(user_id: UserId, invited_by: Option<UserId>) -> Self {
        Self {
            user_id,
            role: MemberRole::Member,
            joined_at: Utc::now(),
            invited_by,
        }
    }
}

/// Membership-relevant view of a trip document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub name: String,
    pub created_by: UserId,
    /// Invited collaborators, in join order. Never includes the creator.
    #[serde(default)]
    pub members: Vec<Member>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped by the store on every save
    #[serde(default)]
    pub version: u64,
}

impl Trip {
    /// Create a fresh, unsaved trip owned by `created_by`
    pub fn new(name: impl Into<String>, created_by: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: TripId::generate(),
            name: name.into(),
            created_by,
            members: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn with_id(mut self, id: TripId) -> Self {
        self.id = id;
        self
    }

    /// Stored (non-creator) member entry for a user
    pub fn member(&self, user_id: &UserId) -> Option<&Member> {
        self.members.iter().find(|m| &m.user_id == user_id)
    }

    pub fn member_mut(&mut self, user_id: &UserId) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| &m.user_id == user_id)
    }

    /// Everyone with standing access, creator first
    pub fn member_ids(&self) -> Vec<UserId> {
        std::iter::once(self.created_by.clone())
            .chain(self.members.iter().map(|m| m.user_id.clone()))
            .collect()
    }

    /// Full roster with a synthesized creator entry
    pub fn roster(&self) -> Vec<Member> {
        let creator = Member {
            user_id: self.created_by.clone(),
            role: MemberRole::Creator,
            joined_at: self.created_at,
            invited_by: None,
        };
        std::iter::once(creator)
            .chain(self.members.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_synthesizes_creator() {
        let mut trip = Trip::new("Lisbon", UserId::new("alice"));
        trip.members
            .push(Member::new(UserId::new("bob"), Some(UserId::new("alice"))));

        let roster = trip.roster();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].user_id, UserId::new("alice"));
        assert_eq!(roster[0].role, MemberRole::Creator);
        assert_eq!(roster[1].role, MemberRole::Member);
        assert_eq!(
            trip.member_ids(),
            vec![UserId::new("alice"), UserId::new("bob")]
        );
    }

    #[test]
    fn test_member_lookup_ignores_creator() {
        let trip = Trip::new("Oslo", UserId::new("alice"));
        assert!(trip.member(&UserId::new("alice")).is_none());
    }
}

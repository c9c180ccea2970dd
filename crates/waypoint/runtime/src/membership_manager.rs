//! Membership Manager: persisted member operations
//!
//! Loads a trip, asks the authority for a decision, applies the mutation,
//! and saves with the trip's version so concurrent edits surface as
//! [`CollabError::StaleWrite`] instead of silently overwriting each other.

use crate::membership_authority as authority;
use std::sync::Arc;
use tracing::{debug, info};
use waypoint_storage::{CollabStorage, TripStore};
use waypoint_types::{CollabError, CollabResult, Member, MemberRole, Trip, TripId, UserId};

/// Fetch a trip or fail with `TripNotFound`
pub(crate) async fn load_trip<S>(storage: &S, trip_id: &TripId) -> CollabResult<Trip>
where
    S: TripStore + ?Sized,
{
    storage
        .find_trip(trip_id)
        .await?
        .ok_or_else(|| CollabError::TripNotFound(trip_id.clone()))
}

/// Persisted membership lifecycle
pub struct MembershipManager<S: ?Sized> {
    storage: Arc<S>,
}

impl<S: ?Sized> Clone for MembershipManager<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S> MembershipManager<S>
where
    S: CollabStorage + ?Sized,
{
    /// Create a membership manager over a trip store
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Roster with the synthesized creator entry; members only
    pub async fn roster(&self, trip_id: &TripId, actor: &UserId) -> CollabResult<Vec<Member>> {
        let trip = load_trip(self.storage.as_ref(), trip_id).await?;
        if !authority::is_member(&trip, actor) {
            debug!(trip = %trip_id, user = %actor, "Roster read denied");
            return Err(CollabError::denied("only trip members can view the roster"));
        }
        Ok(trip.roster())
    }

    /// Creator removes another member
    pub async fn remove_member(
        &self,
        trip_id: &TripId,
        actor: &UserId,
        target: &UserId,
    ) -> CollabResult<Trip> {
        let mut trip = load_trip(self.storage.as_ref(), trip_id).await?;
        if !authority::can_manage_members(&trip, actor) {
            debug!(trip = %trip_id, user = %actor, "Member removal denied");
            return Err(CollabError::denied("only the trip creator can remove members"));
        }

        authority::remove_member(&mut trip, target)?;
        let trip = self.storage.save_trip(trip).await?;

        info!(trip = %trip_id, user = %target, removed_by = %actor, "Member removed from trip");
        Ok(trip)
    }

    /// A member removes themself. The creator cannot leave.
    pub async fn leave_trip(&self, trip_id: &TripId, user: &UserId) -> CollabResult<Trip> {
        let mut trip = load_trip(self.storage.as_ref(), trip_id).await?;
        authority::remove_member(&mut trip, user)?;
        let trip = self.storage.save_trip(trip).await?;

        info!(trip = %trip_id, user = %user, "Member left trip");
        Ok(trip)
    }

    /// Creator changes a member's role. Nobody can become or stop being
    /// the creator this way.
    pub async fn change_role(
        &self,
        trip_id: &TripId,
        actor: &UserId,
        target: &UserId,
        role: MemberRole,
    ) -> CollabResult<Trip> {
        let mut trip = load_trip(self.storage.as_ref(), trip_id).await?;
        if !authority::can_manage_members(&trip, actor) {
            debug!(trip = %trip_id, user = %actor, "Role change denied");
            return Err(CollabError::denied("only the trip creator can change roles"));
        }

        authority::change_role(&mut trip, target, role)?;
        let trip = self.storage.save_trip(trip).await?;

        info!(trip = %trip_id, user = %target, role = %role, "Member role changed");
        Ok(trip)
    }
}

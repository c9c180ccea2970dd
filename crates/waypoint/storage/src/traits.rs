use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use waypoint_types::{
    Completion, Invitation, InvitationId, InvitationQuery, InvitationStatus, PageRequest,
    Recipient, Task, TaskId, Trip, TripId, UserId, UserRecord,
};

/// Generic query window for paged reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl From<PageRequest> for QueryWindow {
    fn from(page: PageRequest) -> Self {
        Self {
            limit: page.limit as usize,
            offset: page.offset(),
        }
    }
}

/// Trip documents. External to the collaboration core; only the
/// membership-relevant shape is exchanged.
#[async_trait]
pub trait TripStore: Send + Sync {
    async fn find_trip(&self, trip_id: &TripId) -> StorageResult<Option<Trip>>;

    /// Insert or update a trip. Updates are a compare-and-swap on
    /// `trip.version`; a stale version fails with `Conflict`. Returns the
    /// stored trip with its bumped version.
    async fn save_trip(&self, trip: Trip) -> StorageResult<Trip>;
}

/// Read-only user lookups.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_user_by_id(&self, user_id: &UserId) -> StorageResult<Option<UserRecord>>;

    /// Case-insensitive match on email.
    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<UserRecord>>;

    async fn find_user_by_username(&self, username: &str) -> StorageResult<Option<UserRecord>>;
}

/// Invitation records.
#[async_trait]
pub trait InvitationStore: Send + Sync {
    /// Insert a pending invitation. Fails with `Conflict` if a pending
    /// invitation already exists for the same trip and recipient; this check
    /// is enforced by the store itself, not only by callers.
    async fn insert_invitation(&self, invitation: Invitation) -> StorageResult<Invitation>;

    async fn get_invitation(&self, id: &InvitationId) -> StorageResult<Option<Invitation>>;

    async fn find_invitation_by_token(&self, token: &str) -> StorageResult<Option<Invitation>>;

    async fn find_pending_invitation(
        &self,
        trip_id: &TripId,
        recipient: &Recipient,
    ) -> StorageResult<Option<Invitation>>;

    /// Move an invitation from `expected_from` to `to` at time `at`.
    ///
    /// Moving to `Expired` requires the deadline to have passed at `at`; any
    /// other target requires it not to have. A status or deadline mismatch
    /// fails with `InvariantViolation`. `responded_at` is stamped for
    /// `Accepted` and `Rejected` only.
    async fn transition_invitation(
        &self,
        id: &InvitationId,
        expected_from: InvitationStatus,
        to: InvitationStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<Invitation>;

    /// Atomically accept a pending invitation and save the trip carrying the
    /// new member. Either both writes commit or neither does.
    async fn commit_acceptance(
        &self,
        id: &InvitationId,
        responded_at: DateTime<Utc>,
        trip: Trip,
    ) -> StorageResult<(Invitation, Trip)>;

    /// Expire every pending invitation whose deadline is at or before
    /// `as_of`. Returns only the records this call transitioned.
    async fn expire_pending(&self, as_of: DateTime<Utc>) -> StorageResult<Vec<Invitation>>;

    /// Newest-first listing plus the unpaged total.
    async fn query_invitations(
        &self,
        query: &InvitationQuery,
        window: QueryWindow,
    ) -> StorageResult<(Vec<Invitation>, u64)>;
}

/// Task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert_task(&self, task: Task) -> StorageResult<Task>;

    async fn get_task(&self, id: &TaskId) -> StorageResult<Option<Task>>;

    /// Compare-and-swap on `task.version`; a stale version fails with `Conflict`.
    async fn replace_task(&self, task: Task) -> StorageResult<Task>;

    /// Append a completion. The user must belong to the task's trip and be
    /// assigned to the task at write time, else `NotPermitted`. Fails with
    /// `Conflict` if the user already has one.
    async fn add_completion(&self, task_id: &TaskId, completion: Completion)
        -> StorageResult<Task>;

    /// Remove a user's completion. Same `NotPermitted` rule as
    /// [`TaskStore::add_completion`]; fails with `InvariantViolation` if absent.
    async fn remove_completion(&self, task_id: &TaskId, user_id: &UserId) -> StorageResult<Task>;

    /// Tasks of a trip ordered by due date (undated last), then creation time.
    async fn list_tasks(
        &self,
        trip_id: &TripId,
        include_archived: bool,
        window: QueryWindow,
    ) -> StorageResult<(Vec<Task>, u64)>;
}

/// Completion precondition shared by the adapters. Evaluated against the
/// trip and task as locked by the write, not the caller's earlier snapshot.
pub(crate) fn check_completer(
    trip: Option<&Trip>,
    task: &Task,
    user_id: &UserId,
) -> StorageResult<()> {
    let on_trip = trip.is_some_and(|trip| {
        trip.id == task.trip_id && (&trip.created_by == user_id || trip.member(user_id).is_some())
    });
    if !on_trip {
        return Err(StorageError::NotPermitted(format!(
            "{} is not a member of trip {}",
            user_id, task.trip_id
        )));
    }
    if !task.is_assigned_to(user_id) {
        return Err(StorageError::NotPermitted(format!(
            "{} is not assigned to task {}",
            user_id, task.id
        )));
    }
    Ok(())
}

/// Unified storage bundle used by the collaboration runtime.
pub trait CollabStorage: TripStore + Directory + InvitationStore + TaskStore + Send + Sync {}

impl<T> CollabStorage for T where T: TripStore + Directory + InvitationStore + TaskStore + Send + Sync
{}

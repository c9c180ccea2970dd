//! In-memory reference implementation for the Waypoint storage traits.
//!
//! This adapter is deterministic and test-friendly. Each collection sits
//! behind its own lock; operations that touch both invitations and trips
//! always take the invitation lock first, and completion writes take the
//! task lock before reading trips.

use crate::traits::{
    check_completer, Directory, InvitationStore, QueryWindow, TaskStore, TripStore,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;
use waypoint_types::{
    Completion, Invitation, InvitationId, InvitationQuery, InvitationStatus, Recipient, Task,
    TaskId, Trip, TripId, UserId, UserRecord,
};

/// In-memory Waypoint storage adapter.
#[derive(Default)]
pub struct InMemoryCollabStorage {
    trips: RwLock<HashMap<TripId, Trip>>,
    users: RwLock<HashMap<UserId, UserRecord>>,
    invitations: RwLock<HashMap<InvitationId, Invitation>>,
    tasks: RwLock<HashMap<TaskId, Task>>,
    fail_trip_writes: AtomicBool,
}

impl InMemoryCollabStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a directory user.
    pub fn insert_user(&self, user: UserRecord) -> StorageResult<()> {
        let mut guard = write(&self.users, "users")?;
        if guard
            .values()
            .any(|u| u.id != user.id && (u.username == user.username || u.has_email(&user.email)))
        {
            return Err(StorageError::Conflict(format!(
                "username or email of user {} already taken",
                user.id
            )));
        }
        guard.insert(user.id.clone(), user);
        Ok(())
    }

    /// Make every subsequent trip write fail with a backend error, to
    /// exercise rollback paths in tests.
    pub fn set_fail_trip_writes(&self, fail: bool) {
        self.fail_trip_writes.store(fail, Ordering::SeqCst);
    }

    fn check_trip_writes(&self) -> StorageResult<()> {
        if self.fail_trip_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("trip store unavailable".to_string()));
        }
        Ok(())
    }
}

fn read<'a, T>(lock: &'a RwLock<T>, name: &str) -> StorageResult<RwLockReadGuard<'a, T>> {
    lock.read()
        .map_err(|_| StorageError::Backend(format!("{name} lock poisoned")))
}

fn write<'a, T>(lock: &'a RwLock<T>, name: &str) -> StorageResult<RwLockWriteGuard<'a, T>> {
    lock.write()
        .map_err(|_| StorageError::Backend(format!("{name} lock poisoned")))
}

/// Version-checked upsert shared by `save_trip` and `commit_acceptance`.
fn stage_trip_save(trips: &HashMap<TripId, Trip>, mut trip: Trip) -> StorageResult<Trip> {
    if let Some(stored) = trips.get(&trip.id) {
        if stored.version != trip.version {
            return Err(StorageError::Conflict(format!(
                "trip {} is at version {}, write was based on {}",
                trip.id, stored.version, trip.version
            )));
        }
        if stored.created_by != trip.created_by {
            return Err(StorageError::InvariantViolation(format!(
                "trip {} creator is immutable",
                trip.id
            )));
        }
        trip.updated_at = Utc::now();
    }
    trip.version += 1;
    Ok(trip)
}

#[async_trait]
impl TripStore for InMemoryCollabStorage {
    async fn find_trip(&self, trip_id: &TripId) -> StorageResult<Option<Trip>> {
        let guard = read(&self.trips, "trips")?;
        Ok(guard.get(trip_id).cloned())
    }

    async fn save_trip(&self, trip: Trip) -> StorageResult<Trip> {
        self.check_trip_writes()?;
        let mut guard = write(&self.trips, "trips")?;
        let staged = stage_trip_save(&guard, trip)?;
        guard.insert(staged.id.clone(), staged.clone());
        Ok(staged)
    }
}

#[async_trait]
impl Directory for InMemoryCollabStorage {
    async fn find_user_by_id(&self, user_id: &UserId) -> StorageResult<Option<UserRecord>> {
        let guard = read(&self.users, "users")?;
        Ok(guard.get(user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<UserRecord>> {
        let guard = read(&self.users, "users")?;
        Ok(guard.values().find(|u| u.has_email(email)).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StorageResult<Option<UserRecord>> {
        let guard = read(&self.users, "users")?;
        Ok(guard.values().find(|u| u.username == username).cloned())
    }
}

fn check_transition(
    invitation: &Invitation,
    expected_from: InvitationStatus,
    to: InvitationStatus,
    at: DateTime<Utc>,
) -> StorageResult<()> {
    if invitation.status != expected_from || !expected_from.can_transition_to(to) {
        return Err(StorageError::InvariantViolation(format!(
            "invalid invitation transition: expected {}, found {}, target {}",
            expected_from, invitation.status, to
        )));
    }
    let lapsed = at >= invitation.expires_at;
    if (to == InvitationStatus::Expired) != lapsed {
        return Err(StorageError::InvariantViolation(format!(
            "invitation {} deadline does not allow {} at {}",
            invitation.id, to, at
        )));
    }
    Ok(())
}

fn apply_transition(invitation: &mut Invitation, to: InvitationStatus, at: DateTime<Utc>) {
    invitation.status = to;
    if matches!(to, InvitationStatus::Accepted | InvitationStatus::Rejected) {
        invitation.responded_at = Some(at);
    }
}

#[async_trait]
impl InvitationStore for InMemoryCollabStorage {
    async fn insert_invitation(&self, invitation: Invitation) -> StorageResult<Invitation> {
        let recipient = invitation.recipient().ok_or_else(|| {
            StorageError::InvalidInput(
                "invitation must name exactly one of user id or email".to_string(),
            )
        })?;
        let mut guard = write(&self.invitations, "invitations")?;

        if guard.contains_key(&invitation.id) {
            return Err(StorageError::Conflict(format!(
                "invitation {} already exists",
                invitation.id
            )));
        }
        let key = recipient.key();
        let duplicate = guard.values().any(|existing| {
            existing.is_pending()
                && existing.trip_id == invitation.trip_id
                && existing.recipient().map(|r| r.key()).as_deref() == Some(key.as_str())
        });
        if duplicate {
            return Err(StorageError::Conflict(format!(
                "pending invitation for {} on trip {} already exists",
                key, invitation.trip_id
            )));
        }
        if let Some(token) = &invitation.token {
            if guard.values().any(|i| i.token.as_ref() == Some(token)) {
                return Err(StorageError::Conflict("invitation token collision".to_string()));
            }
        }

        guard.insert(invitation.id.clone(), invitation.clone());
        Ok(invitation)
    }

    async fn get_invitation(&self, id: &InvitationId) -> StorageResult<Option<Invitation>> {
        let guard = read(&self.invitations, "invitations")?;
        Ok(guard.get(id).cloned())
    }

    async fn find_invitation_by_token(&self, token: &str) -> StorageResult<Option<Invitation>> {
        let guard = read(&self.invitations, "invitations")?;
        Ok(guard
            .values()
            .find(|i| i.token.as_deref() == Some(token))
            .cloned())
    }

    async fn find_pending_invitation(
        &self,
        trip_id: &TripId,
        recipient: &Recipient,
    ) -> StorageResult<Option<Invitation>> {
        let guard = read(&self.invitations, "invitations")?;
        let key = recipient.key();
        Ok(guard
            .values()
            .find(|i| {
                i.is_pending()
                    && &i.trip_id == trip_id
                    && i.recipient().map(|r| r.key()).as_deref() == Some(key.as_str())
            })
            .cloned())
    }

    async fn transition_invitation(
        &self,
        id: &InvitationId,
        expected_from: InvitationStatus,
        to: InvitationStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<Invitation> {
        let mut guard = write(&self.invitations, "invitations")?;
        let invitation = guard
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("invitation {} not found", id)))?;

        check_transition(invitation, expected_from, to, at)?;
        apply_transition(invitation, to, at);
        Ok(invitation.clone())
    }

    async fn commit_acceptance(
        &self,
        id: &InvitationId,
        responded_at: DateTime<Utc>,
        trip: Trip,
    ) -> StorageResult<(Invitation, Trip)> {
        let mut invitations = write(&self.invitations, "invitations")?;
        let mut trips = write(&self.trips, "trips")?;

        let invitation = invitations
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("invitation {} not found", id)))?;
        if invitation.trip_id != trip.id {
            return Err(StorageError::InvalidInput(format!(
                "invitation {} belongs to trip {}, not {}",
                id, invitation.trip_id, trip.id
            )));
        }
        check_transition(
            invitation,
            InvitationStatus::Pending,
            InvitationStatus::Accepted,
            responded_at,
        )?;

        // Validate the trip write before touching either record.
        self.check_trip_writes()?;
        let staged = stage_trip_save(&trips, trip)?;

        apply_transition(invitation, InvitationStatus::Accepted, responded_at);
        trips.insert(staged.id.clone(), staged.clone());
        Ok((invitation.clone(), staged))
    }

    async fn expire_pending(&self, as_of: DateTime<Utc>) -> StorageResult<Vec<Invitation>> {
        let mut guard = write(&self.invitations, "invitations")?;
        let mut expired = Vec::new();
        for invitation in guard.values_mut().filter(|i| i.is_lapsed(as_of)) {
            apply_transition(invitation, InvitationStatus::Expired, as_of);
            expired.push(invitation.clone());
        }
        debug!(count = expired.len(), "expired lapsed invitations");
        Ok(expired)
    }

    async fn query_invitations(
        &self,
        query: &InvitationQuery,
        window: QueryWindow,
    ) -> StorageResult<(Vec<Invitation>, u64)> {
        let guard = read(&self.invitations, "invitations")?;
        let mut values = guard
            .values()
            .filter(|i| query.matches(i))
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = values.len() as u64;
        Ok((apply_window(values, window), total))
    }
}

#[async_trait]
impl TaskStore for InMemoryCollabStorage {
    async fn insert_task(&self, mut task: Task) -> StorageResult<Task> {
        let mut guard = write(&self.tasks, "tasks")?;
        if guard.contains_key(&task.id) {
            return Err(StorageError::Conflict(format!(
                "task {} already exists",
                task.id
            )));
        }
        task.version = 1;
        guard.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: &TaskId) -> StorageResult<Option<Task>> {
        let guard = read(&self.tasks, "tasks")?;
        Ok(guard.get(id).cloned())
    }

    async fn replace_task(&self, mut task: Task) -> StorageResult<Task> {
        let mut guard = write(&self.tasks, "tasks")?;
        let stored = guard
            .get_mut(&task.id)
            .ok_or_else(|| StorageError::NotFound(format!("task {} not found", task.id)))?;
        if stored.version != task.version {
            return Err(StorageError::Conflict(format!(
                "task {} is at version {}, write was based on {}",
                task.id, stored.version, task.version
            )));
        }
        task.version += 1;
        task.updated_at = Utc::now();
        *stored = task.clone();
        Ok(task)
    }

    async fn add_completion(
        &self,
        task_id: &TaskId,
        completion: Completion,
    ) -> StorageResult<Task> {
        let mut guard = write(&self.tasks, "tasks")?;
        let task = guard
            .get_mut(task_id)
            .ok_or_else(|| StorageError::NotFound(format!("task {} not found", task_id)))?;
        {
            let trips = read(&self.trips, "trips")?;
            check_completer(trips.get(&task.trip_id), task, &completion.user_id)?;
        }
        if task.is_completed_by(&completion.user_id) {
            return Err(StorageError::Conflict(format!(
                "task {} already completed by {}",
                task_id, completion.user_id
            )));
        }
        task.completions.push(completion);
        task.version += 1;
        Ok(task.clone())
    }

    async fn remove_completion(&self, task_id: &TaskId, user_id: &UserId) -> StorageResult<Task> {
        let mut guard = write(&self.tasks, "tasks")?;
        let task = guard
            .get_mut(task_id)
            .ok_or_else(|| StorageError::NotFound(format!("task {} not found", task_id)))?;
        {
            let trips = read(&self.trips, "trips")?;
            check_completer(trips.get(&task.trip_id), task, user_id)?;
        }
        if !task.is_completed_by(user_id) {
            return Err(StorageError::InvariantViolation(format!(
                "task {} has no completion by {}",
                task_id, user_id
            )));
        }
        task.completions.retain(|c| &c.user_id != user_id);
        task.version += 1;
        Ok(task.clone())
    }

    async fn list_tasks(
        &self,
        trip_id: &TripId,
        include_archived: bool,
        window: QueryWindow,
    ) -> StorageResult<(Vec<Task>, u64)> {
        let guard = read(&self.tasks, "tasks")?;
        let mut values = guard
            .values()
            .filter(|t| &t.trip_id == trip_id && (include_archived || !t.is_archived))
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => x.cmp(&y).then(a.created_at.cmp(&b.created_at)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.created_at.cmp(&b.created_at),
        });
        let total = values.len() as u64;
        Ok((apply_window(values, window), total))
    }
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use waypoint_types::{Member, TaskDraft};

    fn pending_for(trip: &str, email: &str, expires_in: Duration) -> Invitation {
        Invitation::new(
            TripId::new(trip),
            UserId::new("alice"),
            Recipient::Email(email.to_string()),
            Utc::now() + expires_in,
        )
    }

    #[tokio::test]
    async fn stale_trip_save_is_rejected() {
        let storage = InMemoryCollabStorage::new();
        let trip = storage
            .save_trip(Trip::new("Rome", UserId::new("alice")))
            .await
            .unwrap();
        assert_eq!(trip.version, 1);

        let mut first = trip.clone();
        first.members.push(Member::new(UserId::new("bob"), None));
        storage.save_trip(first).await.unwrap();

        let mut second = trip;
        second.members.push(Member::new(UserId::new("carol"), None));
        let result = storage.save_trip(second).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn duplicate_pending_invitation_is_rejected() {
        let storage = InMemoryCollabStorage::new();
        storage
            .insert_invitation(pending_for("t1", "bob@example.com", Duration::days(7)))
            .await
            .unwrap();

        let result = storage
            .insert_invitation(pending_for("t1", "bob@example.com", Duration::days(7)))
            .await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));

        // Different trip is fine
        storage
            .insert_invitation(pending_for("t2", "bob@example.com", Duration::days(7)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn transition_checks_expected_state_and_deadline() {
        let storage = InMemoryCollabStorage::new();
        let live = storage
            .insert_invitation(pending_for("t1", "bob@example.com", Duration::days(7)))
            .await
            .unwrap();

        let result = storage
            .transition_invitation(
                &live.id,
                InvitationStatus::Pending,
                InvitationStatus::Expired,
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(StorageError::InvariantViolation(_))));

        let rejected = storage
            .transition_invitation(
                &live.id,
                InvitationStatus::Pending,
                InvitationStatus::Rejected,
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, InvitationStatus::Rejected);
        assert!(rejected.responded_at.is_some());

        let again = storage
            .transition_invitation(
                &live.id,
                InvitationStatus::Pending,
                InvitationStatus::Cancelled,
                Utc::now(),
            )
            .await;
        assert!(matches!(again, Err(StorageError::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn failed_trip_write_leaves_invitation_pending() {
        let storage = InMemoryCollabStorage::new();
        let trip = storage
            .save_trip(Trip::new("Rome", UserId::new("alice")))
            .await
            .unwrap();
        let invitation = storage
            .insert_invitation(pending_for(trip.id.as_str(), "bob@example.com", Duration::days(7)))
            .await
            .unwrap();

        storage.set_fail_trip_writes(true);
        let result = storage
            .commit_acceptance(&invitation.id, Utc::now(), trip)
            .await;
        assert!(matches!(result, Err(StorageError::Backend(_))));

        let stored = storage.get_invitation(&invitation.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InvitationStatus::Pending);
    }

    #[tokio::test]
    async fn expire_pending_is_idempotent() {
        let storage = InMemoryCollabStorage::new();
        storage
            .insert_invitation(pending_for("t1", "a@example.com", -Duration::hours(1)))
            .await
            .unwrap();
        storage
            .insert_invitation(pending_for("t1", "b@example.com", Duration::days(1)))
            .await
            .unwrap();

        assert_eq!(storage.expire_pending(Utc::now()).await.unwrap().len(), 1);
        assert!(storage.expire_pending(Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn completions_are_unique_per_user() {
        let storage = InMemoryCollabStorage::new();
        seed_trip(&storage, &["bob", "carol"]).await;
        let task = storage
            .insert_task(Task::new(
                TripId::new("t1"),
                UserId::new("alice"),
                TaskDraft::new("Buy tickets"),
            ))
            .await
            .unwrap();

        storage
            .add_completion(&task.id, Completion::now(UserId::new("bob")))
            .await
            .unwrap();
        let duplicate = storage
            .add_completion(&task.id, Completion::now(UserId::new("bob")))
            .await;
        assert!(matches!(duplicate, Err(StorageError::Conflict(_))));

        let missing = storage
            .remove_completion(&task.id, &UserId::new("carol"))
            .await;
        assert!(matches!(missing, Err(StorageError::InvariantViolation(_))));
    }

    async fn seed_trip(storage: &InMemoryCollabStorage, members: &[&str]) {
        let mut trip = Trip::new("Porto", UserId::new("alice")).with_id(TripId::new("t1"));
        for member in members {
            trip.members
                .push(Member::new(UserId::new(*member), Some(UserId::new("alice"))));
        }
        storage.save_trip(trip).await.unwrap();
    }

    #[tokio::test]
    async fn completion_requires_current_assignment_and_membership() {
        let storage = InMemoryCollabStorage::new();
        seed_trip(&storage, &["bob", "carol"]).await;
        let task = storage
            .insert_task(Task::new(
                TripId::new("t1"),
                UserId::new("alice"),
                TaskDraft::new("Book ferry").assigned_to(vec![UserId::new("bob")]),
            ))
            .await
            .unwrap();

        let carol = storage
            .add_completion(&task.id, Completion::now(UserId::new("carol")))
            .await;
        assert!(matches!(carol, Err(StorageError::NotPermitted(_))));

        let outsider = storage
            .add_completion(&task.id, Completion::now(UserId::new("zed")))
            .await;
        assert!(matches!(outsider, Err(StorageError::NotPermitted(_))));

        let done = storage
            .add_completion(&task.id, Completion::now(UserId::new("bob")))
            .await
            .unwrap();
        assert!(done.is_completed_by(&UserId::new("bob")));
        assert!(done.completions.iter().all(|c| c.user_id == UserId::new("bob")));
    }

    #[tokio::test]
    async fn users_are_found_by_email_case_insensitively() {
        let storage = InMemoryCollabStorage::new();
        storage
            .insert_user(UserRecord::new(UserId::new("bob"), "bob", "Bob@Example.com"))
            .unwrap();

        let found = storage.find_user_by_email("bob@example.COM").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(UserId::new("bob")));
        assert!(storage.find_user_by_username("bob").await.unwrap().is_some());
    }
}

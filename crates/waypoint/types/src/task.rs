//! Shared trip tasks with per-user completion
//!
//! There is no global "done" flag: a task is done *for a user* when that
//! user has a [`Completion`] entry. An empty `assigned_to` means the task is
//! assigned to everyone on the trip.

use crate::{TaskId, TripId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Record that one user has finished a task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub user_id: UserId,
    pub completed_at: DateTime<Utc>,
}

impl Completion {
    pub fn now(user_id: UserId) -> Self {
        Self {
            user_id,
            completed_at: Utc::now(),
        }
    }
}

/// A to-do item scoped to a trip
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub trip_id: TripId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_by: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    /// Empty means everyone on the trip
    #[serde(default)]
    pub assigned_to: Vec<UserId>,
    /// At most one entry per user
    #[serde(default)]
    pub completions: Vec<Completion>,
    #[serde(default)]
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped by the store on every write
    #[serde(default)]
    pub version: u64,
}

impl Task {
    pub fn new(trip_id: TripId, created_by: UserId, draft: TaskDraft) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::generate(),
            trip_id,
            title: draft.title,
            description: draft.description,
            created_by,
            due_date: draft.due_date,
            assigned_to: draft.assigned_to,
            completions: Vec::new(),
            is_archived: false,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_assigned_to_everyone(&self) -> bool {
        self.assigned_to.is_empty()
    }

    pub fn is_assigned_to(&self, user_id: &UserId) -> bool {
        self.is_assigned_to_everyone() || self.assigned_to.contains(user_id)
    }

    pub fn completion_by(&self, user_id: &UserId) -> Option<&Completion> {
        self.completions.iter().find(|c| &c.user_id == user_id)
    }

    pub fn is_completed_by(&self, user_id: &UserId) -> bool {
        self.completion_by(user_id).is_some()
    }

    /// Replace the assignee set. Narrowing to a non-empty set drops
    /// completions of users who are no longer assigned; widening to
    /// everyone keeps all of them.
    pub fn reassign(&mut self, assigned_to: Vec<UserId>) {
        if !assigned_to.is_empty() {
            self.completions
                .retain(|c| assigned_to.contains(&c.user_id));
        }
        self.assigned_to = assigned_to;
    }
}

/// Fields supplied when creating a task
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assigned_to: Vec<UserId>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn assigned_to(mut self, users: Vec<UserId>) -> Self {
        self.assigned_to = users;
        self
    }

    pub fn due(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }
}

/// Partial update; `None` leaves a field untouched
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    /// `Some(None)` clears the description; JSON `null` decodes to that
    #[serde(default, deserialize_with = "present_or_null")]
    pub description: Option<Option<String>>,
    /// `Some(None)` clears the due date; JSON `null` decodes to that
    #[serde(default, deserialize_with = "present_or_null")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub assigned_to: Option<Vec<UserId>>,
}

/// A field that is present decodes to `Some`, even when its value is `null`.
/// Absent fields fall back to `None` through `#[serde(default)]`.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.assigned_to.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with_completions(users: &[&str]) -> Task {
        let mut task = Task::new(
            TripId::new("trip-1"),
            UserId::new("alice"),
            TaskDraft::new("Book hostel").assigned_to(
                users.iter().map(|u| UserId::new(*u)).collect(),
            ),
        );
        for user in users {
            task.completions.push(Completion::now(UserId::new(*user)));
        }
        task
    }

    #[test]
    fn test_narrowing_drops_unassigned_completions() {
        let mut task = task_with_completions(&["a", "b"]);
        task.reassign(vec![UserId::new("a")]);

        assert!(task.is_completed_by(&UserId::new("a")));
        assert!(!task.is_completed_by(&UserId::new("b")));
        assert_eq!(task.assigned_to, vec![UserId::new("a")]);
    }

    #[test]
    fn test_widening_to_everyone_keeps_completions() {
        let mut task = task_with_completions(&["a", "b"]);
        task.reassign(Vec::new());

        assert!(task.is_assigned_to_everyone());
        assert_eq!(task.completions.len(), 2);
    }

    #[test]
    fn test_empty_assignment_includes_anyone() {
        let task = Task::new(
            TripId::new("trip-1"),
            UserId::new("alice"),
            TaskDraft::new("Pack"),
        );
        assert!(task.is_assigned_to(&UserId::new("zed")));
    }

    #[test]
    fn test_patch_null_clears_and_absent_keeps() {
        let patch: TaskPatch =
            serde_json::from_str(r#"{"description": null, "title": "Pack light"}"#).unwrap();
        assert_eq!(patch.description, Some(None));
        assert_eq!(patch.due_date, None);
        assert_eq!(patch.title.as_deref(), Some("Pack light"));

        let patch: TaskPatch = serde_json::from_str(r#"{"description": "bring adapters"}"#).unwrap();
        assert_eq!(patch.description, Some(Some("bring adapters".to_string())));
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(TaskPatch::default().is_empty());
        let patch = TaskPatch {
            description: Some(None),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}

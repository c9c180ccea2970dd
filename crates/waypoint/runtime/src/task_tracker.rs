//! Task Authorization & Completion Tracker
//!
//! Owns task records. Every operation re-reads the trip so permission checks
//! see current membership. Completion is per user and is applied by the store
//! as a single atomic append or remove.

use crate::config::TaskConfig;
use crate::membership_authority as authority;
use crate::membership_manager::load_trip;
use crate::task_permissions as permissions;
use crate::validation;
use std::sync::Arc;
use tracing::{debug, info};
use waypoint_storage::{CollabStorage, QueryWindow, StorageError};
use waypoint_types::{
    CollabError, CollabResult, Completion, Page, PageRequest, Task, TaskDraft, TaskId, TaskPatch,
    Trip, TripId, UserId,
};

/// Task lifecycle and per-user completion
pub struct TaskTracker<S: ?Sized> {
    storage: Arc<S>,
    config: TaskConfig,
}

impl<S: ?Sized> Clone for TaskTracker<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            config: self.config.clone(),
        }
    }
}

impl<S> TaskTracker<S>
where
    S: CollabStorage + ?Sized,
{
    /// Create a tracker with the given validation limits
    pub fn new(storage: Arc<S>, config: TaskConfig) -> Self {
        Self { storage, config }
    }

    /// Add a task to a trip. Any member may create; assignees must be members.
    pub async fn create(
        &self,
        trip_id: &TripId,
        user_id: &UserId,
        draft: TaskDraft,
    ) -> CollabResult<Task> {
        let trip = load_trip(self.storage.as_ref(), trip_id).await?;
        if !permissions::can_create(&trip, user_id) {
            debug!(trip = %trip_id, user = %user_id, "Task creation denied");
            return Err(CollabError::denied("only trip members can add tasks"));
        }

        let draft = TaskDraft {
            title: validation::required_text("title", &draft.title, self.config.max_title_len)?,
            description: validation::optional_text(
                "description",
                draft.description,
                self.config.max_description_len,
            )?,
            assigned_to: validation::dedupe_ids(draft.assigned_to),
            due_date: draft.due_date,
        };
        permissions::validate_assignees(&trip, &draft.assigned_to)?;

        let task = self
            .storage
            .insert_task(Task::new(trip_id.clone(), user_id.clone(), draft))
            .await?;

        info!(
            trip = %trip_id,
            task = %task.id,
            user = %user_id,
            assignees = task.assigned_to.len(),
            "Task created"
        );
        Ok(task)
    }

    /// Apply a partial update. Narrowing the assignee set drops completions
    /// of users no longer assigned.
    pub async fn update(
        &self,
        task_id: &TaskId,
        user_id: &UserId,
        patch: TaskPatch,
    ) -> CollabResult<Task> {
        let (trip, mut task) = self.load(task_id).await?;
        if !permissions::can_edit(&trip, &task, user_id) {
            debug!(task = %task_id, user = %user_id, "Task edit denied");
            return Err(CollabError::denied(
                "only the trip creator or the task creator can edit this task",
            ));
        }
        if patch.is_empty() {
            return Ok(task);
        }

        if let Some(title) = patch.title {
            task.title = validation::required_text("title", &title, self.config.max_title_len)?;
        }
        if let Some(description) = patch.description {
            task.description = validation::optional_text(
                "description",
                description,
                self.config.max_description_len,
            )?;
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = due_date;
        }
        if let Some(assigned_to) = patch.assigned_to {
            let assigned_to = validation::dedupe_ids(assigned_to);
            permissions::validate_assignees(&trip, &assigned_to)?;
            task.reassign(assigned_to);
        }

        let task = self.storage.replace_task(task).await?;
        info!(task = %task_id, user = %user_id, "Task updated");
        Ok(task)
    }

    /// Soft delete. Archiving an archived task is a no-op.
    pub async fn archive(&self, task_id: &TaskId, user_id: &UserId) -> CollabResult<Task> {
        let (trip, mut task) = self.load(task_id).await?;
        if !permissions::can_delete(&trip, &task, user_id) {
            debug!(task = %task_id, user = %user_id, "Task archive denied");
            return Err(CollabError::denied(
                "only the trip creator or the task creator can archive this task",
            ));
        }
        if task.is_archived {
            return Ok(task);
        }

        task.is_archived = true;
        let task = self.storage.replace_task(task).await?;
        info!(task = %task_id, user = %user_id, "Task archived");
        Ok(task)
    }

    /// Record that `user_id` finished the task. The store re-checks
    /// assignment and membership at write time.
    pub async fn complete(&self, task_id: &TaskId, user_id: &UserId) -> CollabResult<Task> {
        let (trip, task) = self.load(task_id).await?;
        ensure_can_complete(&trip, &task, user_id)?;
        if task.is_completed_by(user_id) {
            return Err(CollabError::AlreadyCompletedByUser(user_id.clone()));
        }

        let task = match self
            .storage
            .add_completion(task_id, Completion::now(user_id.clone()))
            .await
        {
            Ok(task) => task,
            Err(StorageError::Conflict(_)) => {
                return Err(CollabError::AlreadyCompletedByUser(user_id.clone()))
            }
            Err(StorageError::NotFound(_)) => return Err(CollabError::TaskNotFound(task_id.clone())),
            Err(StorageError::NotPermitted(_)) => {
                return Err(self.explain_refusal(task_id, user_id).await)
            }
            Err(other) => return Err(other.into()),
        };

        info!(task = %task_id, user = %user_id, "Task completed");
        Ok(task)
    }

    /// Withdraw the caller's own completion
    pub async fn uncomplete(&self, task_id: &TaskId, user_id: &UserId) -> CollabResult<Task> {
        let (trip, task) = self.load(task_id).await?;
        ensure_can_complete(&trip, &task, user_id)?;
        if !task.is_completed_by(user_id) {
            return Err(CollabError::NotCompletedByUser(user_id.clone()));
        }

        let task = match self.storage.remove_completion(task_id, user_id).await {
            Ok(task) => task,
            Err(StorageError::InvariantViolation(_)) => {
                return Err(CollabError::NotCompletedByUser(user_id.clone()))
            }
            Err(StorageError::NotFound(_)) => return Err(CollabError::TaskNotFound(task_id.clone())),
            Err(StorageError::NotPermitted(_)) => {
                return Err(self.explain_refusal(task_id, user_id).await)
            }
            Err(other) => return Err(other.into()),
        };

        info!(task = %task_id, user = %user_id, "Task completion withdrawn");
        Ok(task)
    }

    /// All tasks of a trip regardless of assignment, due date order
    pub async fn list(
        &self,
        trip_id: &TripId,
        user_id: &UserId,
        include_archived: bool,
        page: Option<PageRequest>,
    ) -> CollabResult<Page<Task>> {
        let trip = load_trip(self.storage.as_ref(), trip_id).await?;
        if !permissions::can_view(&trip, user_id) {
            debug!(trip = %trip_id, user = %user_id, "Task listing denied");
            return Err(CollabError::denied("only trip members can view tasks"));
        }

        let request =
            validation::page_request(page, self.config.default_page_limit, self.config.max_page_limit);
        let (items, total) = self
            .storage
            .list_tasks(trip_id, include_archived, QueryWindow::from(request))
            .await?;
        Ok(Page::new(items, request, total))
    }

    /// A single task, visible to any trip member
    pub async fn get(&self, task_id: &TaskId, user_id: &UserId) -> CollabResult<Task> {
        let (trip, task) = self.load(task_id).await?;
        if !permissions::can_view(&trip, user_id) {
            return Err(CollabError::denied("only trip members can view tasks"));
        }
        Ok(task)
    }

    /// Whether `user_id` has recorded completion of the task
    pub async fn completion_status(&self, task_id: &TaskId, user_id: &UserId) -> CollabResult<bool> {
        let task = self.get(task_id, user_id).await?;
        Ok(task.is_completed_by(user_id))
    }

    /// Listed assignees who are no longer on the trip. Stored assignments are
    /// never rewritten automatically; an editor reassigns through `update`.
    pub async fn stale_assignees(
        &self,
        task_id: &TaskId,
        user_id: &UserId,
    ) -> CollabResult<Vec<UserId>> {
        let (trip, task) = self.load(task_id).await?;
        if !permissions::can_view(&trip, user_id) {
            return Err(CollabError::denied("only trip members can view tasks"));
        }
        Ok(task
            .assigned_to
            .into_iter()
            .filter(|id| !authority::is_member(&trip, id))
            .collect())
    }

    /// The store refused a completion write that passed our earlier check:
    /// the task or trip changed in between. Re-derive the denial from fresh state.
    async fn explain_refusal(&self, task_id: &TaskId, user_id: &UserId) -> CollabError {
        match self.load(task_id).await {
            Ok((trip, task)) => ensure_can_complete(&trip, &task, user_id)
                .err()
                .unwrap_or_else(|| {
                    CollabError::StaleWrite(format!("task {task_id} changed during completion"))
                }),
            Err(e) => e,
        }
    }

    async fn load(&self, task_id: &TaskId) -> CollabResult<(Trip, Task)> {
        let task = self
            .storage
            .get_task(task_id)
            .await?
            .ok_or_else(|| CollabError::TaskNotFound(task_id.clone()))?;
        let trip = load_trip(self.storage.as_ref(), &task.trip_id).await?;
        Ok((trip, task))
    }
}

fn ensure_can_complete(trip: &Trip, task: &Task, user_id: &UserId) -> CollabResult<()> {
    if permissions::can_complete(trip, task, user_id) {
        return Ok(());
    }
    debug!(task = %task.id, user = %user_id, "Task completion denied");
    if authority::is_member(trip, user_id) {
        Err(CollabError::denied("task is assigned to other members"))
    } else {
        Err(CollabError::denied("only trip members can complete tasks"))
    }
}

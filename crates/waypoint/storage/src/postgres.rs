//! PostgreSQL adapter for Waypoint storage.
//!
//! This adapter is the transactional source-of-truth backend. The
//! one-pending-invitation rule is a partial unique index, acceptance runs in
//! a single transaction, and every lifecycle transition is a conditional
//! `UPDATE` so the row lock decides races between accept and the sweep.

use crate::traits::{
    check_completer, Directory, InvitationStore, QueryWindow, TaskStore, TripStore,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{PgConnection, Postgres, QueryBuilder, Row};
use tracing::debug;
use waypoint_types::{
    Completion, Invitation, InvitationId, InvitationQuery, InvitationScope, InvitationStatus,
    Member, Recipient, Task, TaskId, Trip, TripId, UserId, UserRecord,
};

const TRIP_COLUMNS: &str = "trip_id, name, created_by, members, created_at, updated_at, version";
const INVITATION_COLUMNS: &str = "invitation_id, trip_id, invited_by, invited_user_id, \
    invited_email, status, message, token, created_at, expires_at, responded_at";
const TASK_COLUMNS: &str = "task_id, trip_id, title, description, created_by, due_date, \
    assigned_to, completions, is_archived, created_at, updated_at, version";
const USER_COLUMNS: &str = "user_id, username, email, display_name";

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresCollabStorage {
    pool: PgPool,
}

impl PostgresCollabStorage {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert or update a directory user. The directory is read-only to the
    /// collaboration core; this exists for provisioning and tests.
    pub async fn upsert_user(&self, user: &UserRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO waypoint_users (user_id, username, email, display_name)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
               SET username = EXCLUDED.username,
                   email = EXCLUDED.email,
                   display_name = EXCLUDED.display_name
            "#,
        )
        .bind(user.id.as_str())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.display_name)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;
        Ok(())
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS waypoint_trips (
                trip_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_by TEXT NOT NULL,
                members JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                version BIGINT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS waypoint_users (
                user_id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL,
                display_name TEXT
            )
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS waypoint_users_email_idx
                ON waypoint_users (LOWER(email))
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS waypoint_invitations (
                invitation_id TEXT PRIMARY KEY,
                trip_id TEXT NOT NULL,
                invited_by TEXT NOT NULL,
                invited_user_id TEXT,
                invited_email TEXT,
                recipient_key TEXT NOT NULL,
                status TEXT NOT NULL,
                message TEXT,
                token TEXT UNIQUE,
                created_at TIMESTAMPTZ NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL,
                responded_at TIMESTAMPTZ,
                CHECK ((invited_user_id IS NULL) <> (invited_email IS NULL))
            )
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS waypoint_invitations_one_pending_idx
                ON waypoint_invitations (trip_id, recipient_key)
                WHERE status = 'pending'
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS waypoint_invitations_expiry_idx
                ON waypoint_invitations (expires_at)
                WHERE status = 'pending'
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS waypoint_tasks (
                task_id TEXT PRIMARY KEY,
                trip_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                created_by TEXT NOT NULL,
                due_date TIMESTAMPTZ,
                assigned_to JSONB NOT NULL,
                completions JSONB NOT NULL,
                is_archived BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                version BIGINT NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS waypoint_tasks_trip_idx
                ON waypoint_tasks (trip_id, is_archived)
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        debug!("waypoint schema ready");
        Ok(())
    }

    async fn invitation_exists(&self, id: &InvitationId) -> StorageResult<bool> {
        Ok(self.get_invitation(id).await?.is_some())
    }

    async fn task_exists(&self, id: &TaskId) -> StorageResult<bool> {
        Ok(self.get_task(id).await?.is_some())
    }
}

/// Version-checked trip upsert on an existing connection or transaction.
async fn save_trip_on(conn: &mut PgConnection, mut trip: Trip) -> StorageResult<Trip> {
    let members = to_json(&trip.members)?;
    let now = Utc::now();

    let updated = sqlx::query(
        r#"
        UPDATE waypoint_trips
           SET name = $2,
               members = $3,
               updated_at = $4,
               version = version + 1
         WHERE trip_id = $1
           AND version = $5
           AND created_by = $6
        "#,
    )
    .bind(trip.id.as_str())
    .bind(&trip.name)
    .bind(members.clone())
    .bind(now)
    .bind(to_i64(trip.version)?)
    .bind(trip.created_by.as_str())
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::Backend(e.to_string()))?;

    if updated.rows_affected() == 1 {
        trip.version += 1;
        trip.updated_at = now;
        return Ok(trip);
    }

    let exists = sqlx::query("SELECT 1 FROM waypoint_trips WHERE trip_id = $1")
        .bind(trip.id.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .is_some();
    if exists {
        return Err(StorageError::Conflict(format!(
            "trip {} changed since version {}",
            trip.id, trip.version
        )));
    }

    trip.version += 1;
    sqlx::query(
        r#"
        INSERT INTO waypoint_trips (trip_id, name, created_by, members, created_at, updated_at, version)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(trip.id.as_str())
    .bind(&trip.name)
    .bind(trip.created_by.as_str())
    .bind(members)
    .bind(trip.created_at)
    .bind(trip.updated_at)
    .bind(to_i64(trip.version)?)
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx_conflict)?;
    Ok(trip)
}

#[async_trait]
impl TripStore for PostgresCollabStorage {
    async fn find_trip(&self, trip_id: &TripId) -> StorageResult<Option<Trip>> {
        let row = sqlx::query(&format!(
            "SELECT {TRIP_COLUMNS} FROM waypoint_trips WHERE trip_id = $1"
        ))
        .bind(trip_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.as_ref().map(trip_from_row).transpose()
    }

    async fn save_trip(&self, trip: Trip) -> StorageResult<Trip> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        save_trip_on(&mut conn, trip).await
    }
}

#[async_trait]
impl Directory for PostgresCollabStorage {
    async fn find_user_by_id(&self, user_id: &UserId) -> StorageResult<Option<UserRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM waypoint_users WHERE user_id = $1"
        ))
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<UserRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM waypoint_users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> StorageResult<Option<UserRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM waypoint_users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.as_ref().map(user_from_row).transpose()
    }
}

#[async_trait]
impl InvitationStore for PostgresCollabStorage {
    async fn insert_invitation(&self, invitation: Invitation) -> StorageResult<Invitation> {
        let recipient = invitation.recipient().ok_or_else(|| {
            StorageError::InvalidInput(
                "invitation must name exactly one of user id or email".to_string(),
            )
        })?;

        sqlx::query(
            r#"
            INSERT INTO waypoint_invitations
                (invitation_id, trip_id, invited_by, invited_user_id, invited_email, recipient_key,
                 status, message, token, created_at, expires_at, responded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(invitation.id.as_str())
        .bind(invitation.trip_id.as_str())
        .bind(invitation.invited_by.as_str())
        .bind(invitation.invited_user_id.as_ref().map(|id| id.0.clone()))
        .bind(&invitation.invited_email)
        .bind(recipient.key())
        .bind(invitation.status.as_str())
        .bind(&invitation.message)
        .bind(&invitation.token)
        .bind(invitation.created_at)
        .bind(invitation.expires_at)
        .bind(invitation.responded_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        Ok(invitation)
    }

    async fn get_invitation(&self, id: &InvitationId) -> StorageResult<Option<Invitation>> {
        let row = sqlx::query(&format!(
            "SELECT {INVITATION_COLUMNS} FROM waypoint_invitations WHERE invitation_id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.as_ref().map(invitation_from_row).transpose()
    }

    async fn find_invitation_by_token(&self, token: &str) -> StorageResult<Option<Invitation>> {
        let row = sqlx::query(&format!(
            "SELECT {INVITATION_COLUMNS} FROM waypoint_invitations WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.as_ref().map(invitation_from_row).transpose()
    }

    async fn find_pending_invitation(
        &self,
        trip_id: &TripId,
        recipient: &Recipient,
    ) -> StorageResult<Option<Invitation>> {
        let row = sqlx::query(&format!(
            "SELECT {INVITATION_COLUMNS} FROM waypoint_invitations \
             WHERE trip_id = $1 AND recipient_key = $2 AND status = 'pending'"
        ))
        .bind(trip_id.as_str())
        .bind(recipient.key())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.as_ref().map(invitation_from_row).transpose()
    }

    async fn transition_invitation(
        &self,
        id: &InvitationId,
        expected_from: InvitationStatus,
        to: InvitationStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<Invitation> {
        if !expected_from.can_transition_to(to) {
            return Err(StorageError::InvariantViolation(format!(
                "illegal invitation transition {} -> {}",
                expected_from, to
            )));
        }
        let deadline = if to == InvitationStatus::Expired {
            "expires_at <= $2"
        } else {
            "expires_at > $2"
        };
        let responded_at =
            matches!(to, InvitationStatus::Accepted | InvitationStatus::Rejected).then_some(at);

        let row = sqlx::query(&format!(
            r#"
            UPDATE waypoint_invitations
               SET status = $1,
                   responded_at = COALESCE($3, responded_at)
             WHERE invitation_id = $4
               AND status = $5
               AND {deadline}
            RETURNING {INVITATION_COLUMNS}
            "#
        ))
        .bind(to.as_str())
        .bind(at)
        .bind(responded_at)
        .bind(id.as_str())
        .bind(expected_from.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        match row {
            Some(row) => invitation_from_row(&row),
            None if self.invitation_exists(id).await? => Err(StorageError::InvariantViolation(
                format!("invalid lifecycle transition for invitation {}", id),
            )),
            None => Err(StorageError::NotFound(format!("invitation {} not found", id))),
        }
    }

    async fn commit_acceptance(
        &self,
        id: &InvitationId,
        responded_at: DateTime<Utc>,
        trip: Trip,
    ) -> StorageResult<(Invitation, Trip)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE waypoint_invitations
               SET status = 'accepted',
                   responded_at = $2
             WHERE invitation_id = $1
               AND trip_id = $3
               AND status = 'pending'
               AND expires_at > $2
            RETURNING {INVITATION_COLUMNS}
            "#
        ))
        .bind(id.as_str())
        .bind(responded_at)
        .bind(trip.id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let invitation = match row {
            Some(row) => invitation_from_row(&row)?,
            None => {
                tx.rollback()
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                if self.invitation_exists(id).await? {
                    return Err(StorageError::InvariantViolation(format!(
                        "invitation {} is no longer acceptable",
                        id
                    )));
                }
                return Err(StorageError::NotFound(format!("invitation {} not found", id)));
            }
        };

        // Dropping `tx` on error rolls the status change back.
        let trip = save_trip_on(&mut tx, trip).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok((invitation, trip))
    }

    async fn expire_pending(&self, as_of: DateTime<Utc>) -> StorageResult<Vec<Invitation>> {
        let rows = sqlx::query(&format!(
            r#"
            UPDATE waypoint_invitations
               SET status = 'expired'
             WHERE status = 'pending'
               AND expires_at <= $1
            RETURNING {INVITATION_COLUMNS}
            "#
        ))
        .bind(as_of)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.iter().map(invitation_from_row).collect()
    }

    async fn query_invitations(
        &self,
        query: &InvitationQuery,
        window: QueryWindow,
    ) -> StorageResult<(Vec<Invitation>, u64)> {
        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) AS total FROM waypoint_invitations WHERE ",
        );
        push_invitation_filters(&mut count, query);
        let total: i64 = count
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .try_get("total")
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {INVITATION_COLUMNS} FROM waypoint_invitations WHERE "
        ));
        push_invitation_filters(&mut select, query);
        select.push(" ORDER BY created_at DESC");
        push_window(&mut select, window)?;

        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let items = rows
            .iter()
            .map(invitation_from_row)
            .collect::<StorageResult<Vec<_>>>()?;
        Ok((items, total.max(0) as u64))
    }
}

fn push_invitation_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &InvitationQuery) {
    match &query.scope {
        InvitationScope::Trip(trip_id) => {
            qb.push("trip_id = ").push_bind(trip_id.0.clone());
        }
        InvitationScope::SentBy(user_id) => {
            qb.push("invited_by = ").push_bind(user_id.0.clone());
        }
        InvitationScope::ReceivedBy { user_id, email } => {
            qb.push("(invited_user_id = ").push_bind(user_id.0.clone());
            if let Some(email) = email {
                qb.push(" OR LOWER(invited_email) = LOWER(")
                    .push_bind(email.clone())
                    .push(")");
            }
            qb.push(")");
        }
    }
    if let Some(status) = query.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if !query.include_expired {
        qb.push(" AND status <> 'expired' AND NOT (status = 'pending' AND expires_at <= ")
            .push_bind(query.as_of)
            .push(")");
    }
}

fn push_window(qb: &mut QueryBuilder<'_, Postgres>, window: QueryWindow) -> StorageResult<()> {
    if window.limit > 0 {
        qb.push(" LIMIT ").push_bind(to_i64(window.limit as u64)?);
    }
    qb.push(" OFFSET ").push_bind(to_i64(window.offset as u64)?);
    Ok(())
}

#[async_trait]
impl TaskStore for PostgresCollabStorage {
    async fn insert_task(&self, mut task: Task) -> StorageResult<Task> {
        task.version = 1;
        sqlx::query(
            r#"
            INSERT INTO waypoint_tasks
                (task_id, trip_id, title, description, created_by, due_date, assigned_to,
                 completions, is_archived, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(task.id.as_str())
        .bind(task.trip_id.as_str())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.created_by.as_str())
        .bind(task.due_date)
        .bind(to_json(&task.assigned_to)?)
        .bind(to_json(&task.completions)?)
        .bind(task.is_archived)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(to_i64(task.version)?)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;
        Ok(task)
    }

    async fn get_task(&self, id: &TaskId) -> StorageResult<Option<Task>> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM waypoint_tasks WHERE task_id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn replace_task(&self, task: Task) -> StorageResult<Task> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE waypoint_tasks
               SET title = $2,
                   description = $3,
                   due_date = $4,
                   assigned_to = $5,
                   completions = $6,
                   is_archived = $7,
                   updated_at = $8,
                   version = version + 1
             WHERE task_id = $1
               AND version = $9
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task.id.as_str())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.due_date)
        .bind(to_json(&task.assigned_to)?)
        .bind(to_json(&task.completions)?)
        .bind(task.is_archived)
        .bind(Utc::now())
        .bind(to_i64(task.version)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        match row {
            Some(row) => task_from_row(&row),
            None if self.task_exists(&task.id).await? => Err(StorageError::Conflict(format!(
                "task {} changed since version {}",
                task.id, task.version
            ))),
            None => Err(StorageError::NotFound(format!("task {} not found", task.id))),
        }
    }

    async fn add_completion(
        &self,
        task_id: &TaskId,
        completion: Completion,
    ) -> StorageResult<Task> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let mut task = lock_task(&mut tx, task_id).await?;
        let trip = share_trip(&mut tx, &task.trip_id).await?;
        check_completer(trip.as_ref(), &task, &completion.user_id)?;

        if task.is_completed_by(&completion.user_id) {
            return Err(StorageError::Conflict(format!(
                "task {} already completed by {}",
                task_id, completion.user_id
            )));
        }
        task.completions.push(completion);
        let task = write_completions(&mut tx, task).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(task)
    }

    async fn remove_completion(&self, task_id: &TaskId, user_id: &UserId) -> StorageResult<Task> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let mut task = lock_task(&mut tx, task_id).await?;
        let trip = share_trip(&mut tx, &task.trip_id).await?;
        check_completer(trip.as_ref(), &task, user_id)?;

        if !task.is_completed_by(user_id) {
            return Err(StorageError::InvariantViolation(format!(
                "task {} has no completion by {}",
                task_id, user_id
            )));
        }
        task.completions.retain(|c| &c.user_id != user_id);
        let task = write_completions(&mut tx, task).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(task)
    }

    async fn list_tasks(
        &self,
        trip_id: &TripId,
        include_archived: bool,
        window: QueryWindow,
    ) -> StorageResult<(Vec<Task>, u64)> {
        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM waypoint_tasks WHERE trip_id = $1 AND ($2 OR NOT is_archived)",
        )
        .bind(trip_id.as_str())
        .bind(include_archived)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .try_get("total")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {TASK_COLUMNS} FROM waypoint_tasks WHERE trip_id = "
        ));
        select.push_bind(trip_id.0.clone());
        if !include_archived {
            select.push(" AND NOT is_archived");
        }
        select.push(" ORDER BY due_date ASC NULLS LAST, created_at ASC");
        push_window(&mut select, window)?;

        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let items = rows
            .iter()
            .map(task_from_row)
            .collect::<StorageResult<Vec<_>>>()?;
        Ok((items, total.max(0) as u64))
    }
}

async fn lock_task(conn: &mut PgConnection, task_id: &TaskId) -> StorageResult<Task> {
    let row = sqlx::query(&format!(
        "SELECT {TASK_COLUMNS} FROM waypoint_tasks WHERE task_id = $1 FOR UPDATE"
    ))
    .bind(task_id.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| StorageError::Backend(e.to_string()))?
    .ok_or_else(|| StorageError::NotFound(format!("task {} not found", task_id)))?;
    task_from_row(&row)
}

/// Read a trip under `FOR SHARE` so membership cannot change until commit.
async fn share_trip(conn: &mut PgConnection, trip_id: &TripId) -> StorageResult<Option<Trip>> {
    let row = sqlx::query(&format!(
        "SELECT {TRIP_COLUMNS} FROM waypoint_trips WHERE trip_id = $1 FOR SHARE"
    ))
    .bind(trip_id.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| StorageError::Backend(e.to_string()))?;
    row.as_ref().map(trip_from_row).transpose()
}

async fn write_completions(conn: &mut PgConnection, mut task: Task) -> StorageResult<Task> {
    sqlx::query(
        "UPDATE waypoint_tasks SET completions = $2, version = version + 1 WHERE task_id = $1",
    )
    .bind(task.id.as_str())
    .bind(to_json(&task.completions)?)
    .execute(&mut *conn)
    .await
    .map_err(|e| StorageError::Backend(e.to_string()))?;
    task.version += 1;
    Ok(task)
}

fn trip_from_row(row: &PgRow) -> StorageResult<Trip> {
    let members: serde_json::Value = get(row, "members")?;
    Ok(Trip {
        id: TripId::new(get::<String>(row, "trip_id")?),
        name: get(row, "name")?,
        created_by: UserId::new(get::<String>(row, "created_by")?),
        members: from_json::<Vec<Member>>(members)?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
        version: from_i64(get(row, "version")?)?,
    })
}

fn user_from_row(row: &PgRow) -> StorageResult<UserRecord> {
    Ok(UserRecord {
        id: UserId::new(get::<String>(row, "user_id")?),
        username: get(row, "username")?,
        email: get(row, "email")?,
        display_name: get(row, "display_name")?,
    })
}

fn invitation_from_row(row: &PgRow) -> StorageResult<Invitation> {
    let status: String = get(row, "status")?;
    Ok(Invitation {
        id: InvitationId::new(get::<String>(row, "invitation_id")?),
        trip_id: TripId::new(get::<String>(row, "trip_id")?),
        invited_by: UserId::new(get::<String>(row, "invited_by")?),
        invited_user_id: get::<Option<String>>(row, "invited_user_id")?.map(UserId::new),
        invited_email: get(row, "invited_email")?,
        status: status
            .parse()
            .map_err(|_| StorageError::Serialization(format!("unknown status {status}")))?,
        message: get(row, "message")?,
        token: get(row, "token")?,
        created_at: get(row, "created_at")?,
        expires_at: get(row, "expires_at")?,
        responded_at: get(row, "responded_at")?,
    })
}

fn task_from_row(row: &PgRow) -> StorageResult<Task> {
    Ok(Task {
        id: TaskId::new(get::<String>(row, "task_id")?),
        trip_id: TripId::new(get::<String>(row, "trip_id")?),
        title: get(row, "title")?,
        description: get(row, "description")?,
        created_by: UserId::new(get::<String>(row, "created_by")?),
        due_date: get(row, "due_date")?,
        assigned_to: from_json(get(row, "assigned_to")?)?,
        completions: from_json(get(row, "completions")?)?,
        is_archived: get(row, "is_archived")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
        version: from_i64(get(row, "version")?)?,
    })
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> StorageResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StorageError::Backend(format!("column {column}: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> StorageResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> StorageResult<T> {
    serde_json::from_value(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn map_sqlx_conflict(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StorageError::Conflict(db_err.message().to_string());
        }
    }
    StorageError::Backend(err.to_string())
}

fn to_i64(value: u64) -> StorageResult<i64> {
    i64::try_from(value).map_err(|_| StorageError::InvalidInput("value too large".to_string()))
}

fn from_i64(value: i64) -> StorageResult<u64> {
    u64::try_from(value)
        .map_err(|_| StorageError::Serialization(format!("negative counter {value}")))
}

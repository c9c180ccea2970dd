//! Error types for the collaboration core

use crate::{InvitationId, InvitationStatus, TaskId, TripId, UserId};
use serde::{Deserialize, Serialize};

/// Errors raised by membership, invitation and task operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollabError {
    #[error("Trip not found: {0}")]
    TripNotFound(TripId),

    #[error("Invitation not found: {0}")]
    InvitationNotFound(InvitationId),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("No invitation matches this token")]
    UnknownToken,

    #[error("Only the trip creator can invite members")]
    OnlyCreatorCanInvite,

    #[error("Only the inviter can cancel this invitation")]
    OnlyInviterCanCancel,

    #[error("This invitation is not addressed to you")]
    NotYourInvitation,

    #[error("The trip creator cannot be removed")]
    CannotRemoveCreator,

    #[error("The trip creator's role cannot be changed")]
    CannotChangeCreatorRole,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invitation is not pending (status: {0})")]
    InvitationNotPending(InvitationStatus),

    #[error("Invitation has expired")]
    InvitationExpired,

    #[error("A pending invitation already exists for this recipient")]
    DuplicatePendingInvitation,

    #[error("User is already a member of this trip: {0}")]
    AlreadyMember(UserId),

    #[error("User is not a member of this trip: {0}")]
    NotAMember(UserId),

    #[error("Task already completed by user: {0}")]
    AlreadyCompletedByUser(UserId),

    #[error("Task not completed by user: {0}")]
    NotCompletedByUser(UserId),

    #[error("Record was modified concurrently: {0}")]
    StaleWrite(String),

    #[error("Exactly one of invited user id or invited email must be given")]
    InvalidRecipient,

    #[error("Assignees are not trip members: {0:?}")]
    InvalidAssignees(Vec<UserId>),

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

/// Coarse classification the calling layer maps onto transport responses
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    InvalidState,
    Conflict,
    Validation,
    Internal,
}

impl CollabError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CollabError::TripNotFound(_)
            | CollabError::InvitationNotFound(_)
            | CollabError::TaskNotFound(_)
            | CollabError::UserNotFound(_)
            | CollabError::UnknownToken => ErrorKind::NotFound,

            CollabError::OnlyCreatorCanInvite
            | CollabError::OnlyInviterCanCancel
            | CollabError::NotYourInvitation
            | CollabError::CannotRemoveCreator
            | CollabError::CannotChangeCreatorRole
            | CollabError::PermissionDenied(_) => ErrorKind::PermissionDenied,

            CollabError::InvitationNotPending(_)
            | CollabError::InvitationExpired
            | CollabError::NotAMember(_)
            | CollabError::NotCompletedByUser(_) => ErrorKind::InvalidState,

            CollabError::DuplicatePendingInvitation
            | CollabError::AlreadyMember(_)
            | CollabError::AlreadyCompletedByUser(_)
            | CollabError::StaleWrite(_) => ErrorKind::Conflict,

            CollabError::InvalidRecipient
            | CollabError::InvalidAssignees(_)
            | CollabError::InvalidRole(_)
            | CollabError::Validation(_) => ErrorKind::Validation,

            CollabError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand for a generic permission failure
    pub fn denied(reason: impl Into<String>) -> Self {
        CollabError::PermissionDenied(reason.into())
    }
}

/// Result type alias for collaboration operations
pub type CollabResult<T> = Result<T, CollabError>;

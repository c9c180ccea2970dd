//! # Waypoint Runtime
//!
//! The trip collaboration core: who belongs to a trip, how people are
//! invited, and who may edit and complete shared tasks.
//!
//! ## Architecture
//!
//! ```text
//! InvitationManager ──┐          ┌── TaskTracker
//!   (state machine)   │          │   (permissions, completion)
//!                     ▼          ▼
//!               membership_authority
//!                 (pure decisions)
//!                         │
//! MembershipManager ──────┤
//! ExpirySweeper ──────────┤
//!                         ▼
//!          waypoint-storage (CollabStorage)
//! ```
//!
//! Callers pass an already-authenticated user id into every operation. All
//! failures are [`waypoint_types::CollabError`] values with a coarse
//! [`waypoint_types::ErrorKind`] for transport mapping.

#![deny(unsafe_code)]

pub mod config;
pub mod expiry_sweeper;
pub mod invitation_manager;
pub mod membership_authority;
pub mod membership_manager;
pub mod task_permissions;
pub mod task_tracker;
pub mod validation;

pub use config::{CollabConfig, InvitationConfig, SweepConfig, TaskConfig};
pub use expiry_sweeper::ExpirySweeper;
pub use invitation_manager::{
    AcceptedInvitation, InvitationFilter, InvitationManager, InvitationRequest,
};
pub use membership_manager::MembershipManager;
pub use task_tracker::TaskTracker;

use std::sync::Arc;
use waypoint_storage::CollabStorage;

/// The composed collaboration core over one storage backend
pub struct CollabRuntime<S: ?Sized> {
    pub membership: MembershipManager<S>,
    pub invitations: InvitationManager<S>,
    pub tasks: TaskTracker<S>,
    sweep: SweepConfig,
}

impl<S> CollabRuntime<S>
where
    S: CollabStorage + ?Sized,
{
    pub fn new(storage: Arc<S>, config: CollabConfig) -> Self {
        tracing::info!("Collaboration runtime initialized");
        Self {
            membership: MembershipManager::new(Arc::clone(&storage)),
            invitations: InvitationManager::new(Arc::clone(&storage), config.invitations),
            tasks: TaskTracker::new(storage, config.tasks),
            sweep: config.sweep,
        }
    }

    pub fn with_defaults(storage: Arc<S>) -> Self {
        Self::new(storage, CollabConfig::default())
    }

    /// A sweeper sharing this runtime's invitation manager
    pub fn expiry_sweeper(&self) -> ExpirySweeper<S> {
        ExpirySweeper::new(self.invitations.clone(), self.sweep.clone())
    }
}

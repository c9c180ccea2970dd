//! Waypoint storage abstractions.
//!
//! This crate defines the storage contract the collaboration core consumes:
//! - trips and their embedded member lists (owned by the trip store)
//! - read-only user lookups (the directory)
//! - invitation records with a store-enforced one-pending-per-recipient rule
//! - task records with atomic per-user completion updates
//!
//! Design stance:
//! - Every state transition is a compare-and-swap against the expected prior
//!   state (invitation status, trip/task version), so concurrent callers
//!   observe exactly one winner.
//! - The in-memory adapter is the reference; Postgres is the transactional
//!   production backend behind the `postgres` feature.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryCollabStorage;
pub use traits::{CollabStorage, Directory, InvitationStore, QueryWindow, TaskStore, TripStore};
#[cfg(feature = "postgres")]
pub use postgres::PostgresCollabStorage;

//! Waypoint Domain Types
//!
//! Data shapes for the trip collaboration core: who belongs to a trip,
//! how people are invited into it, and the shared tasks members work on.
//!
//! # Key Concepts
//!
//! - **Trip**: the shared planning unit. `created_by` is the single
//!   authoritative creator; `members` only lists invited collaborators.
//! - **Invitation**: a one-way state machine from `Pending` to exactly one
//!   terminal status (`Accepted`, `Rejected`, `Expired`, `Cancelled`).
//! - **Task**: a to-do scoped to a trip with per-user completion records
//!   instead of a single "done" flag.
//!
//! # Architecture
//!
//! This is a pure types crate with no I/O. Decisions about who may do what
//! live in `waypoint-runtime`; persistence lives in `waypoint-storage`.

#![deny(unsafe_code)]

mod errors;
mod ids;
mod invitation;
mod page;
mod task;
mod trip;
mod user;

pub use errors::*;
pub use ids::*;
pub use invitation::*;
pub use page::*;
pub use task::*;
pub use trip::*;
pub use user::*;

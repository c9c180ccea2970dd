//! Task permission predicates
//!
//! Stateless checks layered on the membership authority. Membership is always
//! evaluated against the trip as it is now, so a user who left the trip loses
//! every task permission even if a task still lists them as an assignee.

use crate::membership_authority as authority;
use waypoint_types::{CollabError, CollabResult, Task, Trip, UserId};

pub fn can_view(trip: &Trip, user_id: &UserId) -> bool {
    authority::is_member(trip, user_id)
}

/// Any collaborator may add tasks
pub fn can_create(trip: &Trip, user_id: &UserId) -> bool {
    authority::is_member(trip, user_id)
}

/// Trip creator or the task's own creator. Assignees who did not create the
/// task may not edit it.
pub fn can_edit(trip: &Trip, task: &Task, user_id: &UserId) -> bool {
    authority::is_member(trip, user_id)
        && (authority::is_creator(trip, user_id) || &task.created_by == user_id)
}

pub fn can_delete(trip: &Trip, task: &Task, user_id: &UserId) -> bool {
    can_edit(trip, task, user_id)
}

/// Members may complete unassigned tasks; assigned tasks only by listed users
pub fn can_complete(trip: &Trip, task: &Task, user_id: &UserId) -> bool {
    authority::is_member(trip, user_id) && task.is_assigned_to(user_id)
}

/// Every assignee must currently be on the trip. Empty means everyone.
pub fn validate_assignees(trip: &Trip, assignees: &[UserId]) -> CollabResult<()> {
    let outsiders: Vec<UserId> = assignees
        .iter()
        .filter(|id| !authority::is_member(trip, id))
        .cloned()
        .collect();
    if outsiders.is_empty() {
        Ok(())
    } else {
        Err(CollabError::InvalidAssignees(outsiders))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_types::{Member, TaskDraft};

    fn trip() -> Trip {
        let mut trip = Trip::new("Hanoi", UserId::new("carol"));
        for id in ["uma", "max"] {
            trip.members
                .push(Member::new(UserId::new(id), Some(UserId::new("carol"))));
        }
        trip
    }

    fn task(trip: &Trip, creator: &str, assigned: &[&str]) -> Task {
        Task::new(
            trip.id.clone(),
            UserId::new(creator),
            TaskDraft::new("Book ferry")
                .assigned_to(assigned.iter().map(|id| UserId::new(*id)).collect()),
        )
    }

    #[test]
    fn test_edit_is_creator_or_task_author() {
        let trip = trip();
        let task = task(&trip, "uma", &["max"]);

        assert!(can_edit(&trip, &task, &UserId::new("carol")));
        assert!(can_edit(&trip, &task, &UserId::new("uma")));
        assert!(!can_edit(&trip, &task, &UserId::new("max")));
        assert!(!can_delete(&trip, &task, &UserId::new("eve")));
    }

    #[test]
    fn test_complete_follows_assignment() {
        let trip = trip();
        let open = task(&trip, "carol", &[]);
        let assigned = task(&trip, "carol", &["uma"]);

        assert!(can_complete(&trip, &open, &UserId::new("max")));
        assert!(!can_complete(&trip, &open, &UserId::new("eve")));
        assert!(can_complete(&trip, &assigned, &UserId::new("uma")));
        assert!(!can_complete(&trip, &assigned, &UserId::new("max")));
        assert!(!can_complete(&trip, &assigned, &UserId::new("carol")));
    }

    #[test]
    fn test_removed_assignee_cannot_complete() {
        let mut trip = trip();
        let assigned = task(&trip, "carol", &["uma"]);
        authority::remove_member(&mut trip, &UserId::new("uma")).unwrap();

        assert!(!can_complete(&trip, &assigned, &UserId::new("uma")));
        assert!(!can_complete(&trip, &assigned, &UserId::new("max")));
    }

    #[test]
    fn test_validate_assignees() {
        let trip = trip();
        assert!(validate_assignees(&trip, &[]).is_ok());
        assert!(validate_assignees(&trip, &[UserId::new("carol"), UserId::new("uma")]).is_ok());
        assert_eq!(
            validate_assignees(&trip, &[UserId::new("uma"), UserId::new("eve")]),
            Err(CollabError::InvalidAssignees(vec![UserId::new("eve")]))
        );
    }
}

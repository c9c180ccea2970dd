//! Membership Authority: pure decisions over a trip's member list
//!
//! Every check about who created a trip, who belongs to it, and who may
//! change it goes through here. `Trip::created_by` is the only creator
//! record; `Trip::members` holds invited collaborators with role `member`.
//!
//! Mutations operate on an in-memory [`Trip`]; persisting the result is the
//! caller's job (see [`crate::MembershipManager`]).

use waypoint_types::{CollabError, CollabResult, Member, MemberRole, Trip, UserId};

/// True iff `user_id` is the trip's recorded creator
pub fn is_creator(trip: &Trip, user_id: &UserId) -> bool {
    &trip.created_by == user_id
}

/// The user's role on the trip, or `None` for outsiders
pub fn role(trip: &Trip, user_id: &UserId) -> Option<MemberRole> {
    if is_creator(trip, user_id) {
        return Some(MemberRole::Creator);
    }
    trip.member(user_id).map(|m| m.role)
}

/// Creator or a listed member
pub fn is_member(trip: &Trip, user_id: &UserId) -> bool {
    role(trip, user_id).is_some()
}

/// Any collaborator may edit shared trip metadata
pub fn can_edit_trip_fields(trip: &Trip, user_id: &UserId) -> bool {
    is_member(trip, user_id)
}

/// Inviting, removing and re-roling members is creator-only
pub fn can_manage_members(trip: &Trip, user_id: &UserId) -> bool {
    is_creator(trip, user_id)
}

/// Only the creator may delete the trip
pub fn can_delete_trip(trip: &Trip, user_id: &UserId) -> bool {
    is_creator(trip, user_id)
}

/// Creator plus members, creator first
pub fn member_ids(trip: &Trip) -> Vec<UserId> {
    trip.member_ids()
}

/// Append `user_id` with role `member`
pub fn add_member(
    trip: &mut Trip,
    user_id: UserId,
    invited_by: Option<UserId>,
) -> CollabResult<()> {
    if is_member(trip, &user_id) {
        return Err(CollabError::AlreadyMember(user_id));
    }
    trip.members.push(Member::new(user_id, invited_by));
    Ok(())
}

/// Remove a non-creator member, returning the removed entry
pub fn remove_member(trip: &mut Trip, user_id: &UserId) -> CollabResult<Member> {
    if is_creator(trip, user_id) {
        return Err(CollabError::CannotRemoveCreator);
    }
    let index = trip
        .members
        .iter()
        .position(|m| &m.user_id == user_id)
        .ok_or_else(|| CollabError::NotAMember(user_id.clone()))?;
    Ok(trip.members.remove(index))
}

/// Set a member's role. `member` is the only assignable role; there is no
/// promotion path to creator.
pub fn change_role(trip: &mut Trip, user_id: &UserId, new_role: MemberRole) -> CollabResult<()> {
    if is_creator(trip, user_id) {
        return Err(CollabError::CannotChangeCreatorRole);
    }
    if new_role == MemberRole::Creator {
        return Err(CollabError::InvalidRole(format!(
            "cannot assign role {new_role}"
        )));
    }
    let member = trip
        .member_mut(user_id)
        .ok_or_else(|| CollabError::NotAMember(user_id.clone()))?;
    member.role = new_role;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn trip_with(creator: &str, members: &[&str]) -> Trip {
        let mut trip = Trip::new("Kyoto", UserId::new(creator));
        for m in members {
            trip.members
                .push(Member::new(UserId::new(*m), Some(UserId::new(creator))));
        }
        trip
    }

    #[test]
    fn test_roles() {
        let trip = trip_with("carol", &["uma"]);
        assert_eq!(role(&trip, &UserId::new("carol")), Some(MemberRole::Creator));
        assert_eq!(role(&trip, &UserId::new("uma")), Some(MemberRole::Member));
        assert_eq!(role(&trip, &UserId::new("eve")), None);

        assert!(can_edit_trip_fields(&trip, &UserId::new("uma")));
        assert!(!can_manage_members(&trip, &UserId::new("uma")));
        assert!(can_delete_trip(&trip, &UserId::new("carol")));
        assert!(!can_delete_trip(&trip, &UserId::new("eve")));
    }

    #[test]
    fn test_add_member_rejects_existing() {
        let mut trip = trip_with("carol", &["uma"]);
        assert_eq!(
            add_member(&mut trip, UserId::new("uma"), None),
            Err(CollabError::AlreadyMember(UserId::new("uma")))
        );
        assert_eq!(
            add_member(&mut trip, UserId::new("carol"), None),
            Err(CollabError::AlreadyMember(UserId::new("carol")))
        );

        add_member(&mut trip, UserId::new("max"), Some(UserId::new("carol"))).unwrap();
        let added = trip.member(&UserId::new("max")).unwrap();
        assert_eq!(added.role, MemberRole::Member);
        assert_eq!(added.invited_by, Some(UserId::new("carol")));
    }

    #[test]
    fn test_remove_member() {
        let mut trip = trip_with("carol", &["uma", "max"]);
        let removed = remove_member(&mut trip, &UserId::new("uma")).unwrap();
        assert_eq!(removed.user_id, UserId::new("uma"));
        assert_eq!(
            member_ids(&trip),
            vec![UserId::new("carol"), UserId::new("max")]
        );
        assert_eq!(
            remove_member(&mut trip, &UserId::new("uma")),
            Err(CollabError::NotAMember(UserId::new("uma")))
        );
    }

    #[test]
    fn test_change_role_has_no_promotion_path() {
        let mut trip = trip_with("carol", &["uma"]);
        assert!(matches!(
            change_role(&mut trip, &UserId::new("uma"), MemberRole::Creator),
            Err(CollabError::InvalidRole(_))
        ));
        change_role(&mut trip, &UserId::new("uma"), MemberRole::Member).unwrap();
        assert!(matches!(
            change_role(&mut trip, &UserId::new("eve"), MemberRole::Member),
            Err(CollabError::NotAMember(_))
        ));
    }

    fn role_strategy() -> impl Strategy<Value = MemberRole> {
        prop_oneof![Just(MemberRole::Creator), Just(MemberRole::Member)]
    }

    proptest! {
        #[test]
        fn prop_creator_cannot_be_removed_or_changed(
            members in proptest::collection::hash_set("[a-z]{1,6}", 0..8),
            new_role in role_strategy(),
        ) {
            let names: Vec<&str> = members
                .iter()
                .map(String::as_str)
                .filter(|m| *m != "creator")
                .collect();
            let mut trip = trip_with("creator", &names);
            let before = trip.clone();
            let creator = trip.created_by.clone();

            prop_assert_eq!(
                remove_member(&mut trip, &creator),
                Err(CollabError::CannotRemoveCreator)
            );
            prop_assert_eq!(
                change_role(&mut trip, &creator, new_role),
                Err(CollabError::CannotChangeCreatorRole)
            );
            prop_assert_eq!(&trip, &before);
            prop_assert_eq!(role(&trip, &creator), Some(MemberRole::Creator));
        }

        #[test]
        fn prop_add_then_remove_restores_members(
            members in proptest::collection::hash_set("[a-z]{1,6}", 0..8),
            newcomer in "[A-Z]{1,6}",
        ) {
            let names: Vec<&str> = members.iter().map(String::as_str).collect();
            let mut trip = trip_with("Creator1", &names);
            let before = trip.members.clone();
            let user = UserId::new(newcomer);

            add_member(&mut trip, user.clone(), None).unwrap();
            prop_assert!(is_member(&trip, &user));
            prop_assert_eq!(
                trip.members.iter().filter(|m| m.user_id == user).count(),
                1
            );

            remove_member(&mut trip, &user).unwrap();
            prop_assert_eq!(trip.members, before);
        }
    }
}

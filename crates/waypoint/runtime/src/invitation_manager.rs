//! Invitation Lifecycle Manager
//!
//! ```text
//! pending --accept--> accepted   (adds the recipient to the trip)
//! pending --reject--> rejected
//! pending --cancel--> cancelled
//! pending --(deadline passed, on read or by sweep)--> expired
//! ```
//!
//! Terminal states are sinks. Every transition is a compare-and-swap in the
//! store, so an accept racing the expiry sweep has exactly one winner, and
//! acceptance commits the status change and the membership change together.

use crate::config::InvitationConfig;
use crate::membership_authority as authority;
use crate::membership_manager::load_trip;
use crate::validation;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use std::sync::Arc;
use tracing::{debug, info, warn};
use waypoint_storage::{CollabStorage, QueryWindow, StorageError};
use waypoint_types::{
    CollabError, CollabResult, Invitation, InvitationId, InvitationQuery, InvitationScope,
    InvitationStatus, Page, PageRequest, Recipient, Trip, TripId, UserId, UserRecord,
};

/// Who to invite and how
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvitationRequest {
    pub invited_user_id: Option<UserId>,
    pub invited_email: Option<String>,
    pub message: Option<String>,
    /// Falls back to the configured default lifetime
    pub expires_in_days: Option<u32>,
}

impl InvitationRequest {
    pub fn to_user(user_id: UserId) -> Self {
        Self {
            invited_user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn to_email(email: impl Into<String>) -> Self {
        Self {
            invited_email: Some(email.into()),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn expires_in_days(mut self, days: u32) -> Self {
        self.expires_in_days = Some(days);
        self
    }
}

/// Listing filter shared by every query operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvitationFilter {
    pub status: Option<InvitationStatus>,
    pub include_expired: bool,
}

/// Result of a successful accept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedInvitation {
    pub invitation: Invitation,
    pub trip: Trip,
}

/// Owns invitation records and their state machine
pub struct InvitationManager<S: ?Sized> {
    storage: Arc<S>,
    config: InvitationConfig,
}

impl<S: ?Sized> Clone for InvitationManager<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            config: self.config.clone(),
        }
    }
}

impl<S> InvitationManager<S>
where
    S: CollabStorage + ?Sized,
{
    /// Create an invitation manager
    pub fn new(storage: Arc<S>, config: InvitationConfig) -> Self {
        Self { storage, config }
    }

    pub fn config(&self) -> &InvitationConfig {
        &self.config
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Invite a user by id or an email address to a trip. Creator only.
    pub async fn create(
        &self,
        trip_id: &TripId,
        invited_by: &UserId,
        request: InvitationRequest,
    ) -> CollabResult<Invitation> {
        let trip = load_trip(self.storage.as_ref(), trip_id).await?;
        if !authority::can_manage_members(&trip, invited_by) {
            debug!(trip = %trip_id, user = %invited_by, "Invitation denied: not the creator");
            return Err(CollabError::OnlyCreatorCanInvite);
        }

        let recipient = match Recipient::from_parts(request.invited_user_id, request.invited_email)? {
            Recipient::Email(email) => Recipient::Email(validation::normalize_email(&email)?),
            by_id => by_id,
        };
        let message =
            validation::optional_text("message", request.message, self.config.max_message_len)?;
        let days = validation::expiry_days(
            request.expires_in_days,
            self.config.default_expiry_days,
            self.config.max_expiry_days,
        )?;

        match &recipient {
            Recipient::User(user_id) => {
                if authority::is_member(&trip, user_id) {
                    return Err(CollabError::AlreadyMember(user_id.clone()));
                }
                if self.storage.find_user_by_id(user_id).await?.is_none() {
                    return Err(CollabError::UserNotFound(user_id.to_string()));
                }
            }
            Recipient::Email(email) => {
                if let Some(user) = self.storage.find_user_by_email(email).await? {
                    if authority::is_member(&trip, &user.id) {
                        return Err(CollabError::AlreadyMember(user.id));
                    }
                }
            }
        }

        let now = Utc::now();
        if let Some(existing) = self
            .storage
            .find_pending_invitation(trip_id, &recipient)
            .await?
        {
            if !existing.is_lapsed(now) {
                return Err(CollabError::DuplicatePendingInvitation);
            }
            // A lapsed invitation must not block a fresh one
            self.expire_lapsed(&existing, now).await?;
        }

        let token = matches!(recipient, Recipient::Email(_))
            .then(|| generate_token(self.config.token_bytes));
        let mut invitation = Invitation::new(
            trip_id.clone(),
            invited_by.clone(),
            recipient,
            now + Duration::days(i64::from(days)),
        )
        .with_message(message);
        invitation.token = token;

        let invitation = self
            .storage
            .insert_invitation(invitation)
            .await
            .map_err(|e| match e {
                StorageError::Conflict(_) => CollabError::DuplicatePendingInvitation,
                other => other.into(),
            })?;

        info!(
            trip = %trip_id,
            invitation = %invitation.id,
            invited_by = %invited_by,
            by_email = invitation.invited_email.is_some(),
            expires_at = %invitation.expires_at,
            "Invitation created"
        );
        Ok(invitation)
    }

    /// Accept as the addressee; adds them to the trip in the same commit
    pub async fn accept(
        &self,
        invitation_id: &InvitationId,
        acting_user: &UserId,
    ) -> CollabResult<AcceptedInvitation> {
        let invitation = self.fetch(invitation_id).await?;
        let now = Utc::now();
        self.ensure_open(&invitation, now).await?;
        let user = self.acting_user(acting_user).await?;
        ensure_addressed_to(&invitation, &user)?;

        let mut trip = load_trip(self.storage.as_ref(), &invitation.trip_id).await?;
        authority::add_member(
            &mut trip,
            user.id.clone(),
            Some(invitation.invited_by.clone()),
        )?;

        let (invitation, trip) = match self
            .storage
            .commit_acceptance(invitation_id, now, trip)
            .await
        {
            Ok(committed) => committed,
            Err(StorageError::InvariantViolation(_)) => {
                return Err(self.explain_lost_race(invitation_id).await)
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            trip = %trip.id,
            invitation = %invitation.id,
            user = %user.id,
            "Invitation accepted"
        );
        Ok(AcceptedInvitation { invitation, trip })
    }

    /// Decline as the addressee. No membership effect.
    pub async fn reject(
        &self,
        invitation_id: &InvitationId,
        acting_user: &UserId,
    ) -> CollabResult<Invitation> {
        let invitation = self.fetch(invitation_id).await?;
        let now = Utc::now();
        self.ensure_open(&invitation, now).await?;
        let user = self.acting_user(acting_user).await?;
        ensure_addressed_to(&invitation, &user)?;

        let invitation = self
            .close(invitation_id, InvitationStatus::Rejected, now)
            .await?;
        info!(
            trip = %invitation.trip_id,
            invitation = %invitation.id,
            user = %acting_user,
            "Invitation rejected"
        );
        Ok(invitation)
    }

    /// Withdraw a pending invitation. Only the original inviter may cancel.
    pub async fn cancel(
        &self,
        invitation_id: &InvitationId,
        acting_user: &UserId,
    ) -> CollabResult<Invitation> {
        let invitation = self.fetch(invitation_id).await?;
        if &invitation.invited_by != acting_user {
            debug!(invitation = %invitation_id, user = %acting_user, "Cancel denied");
            return Err(CollabError::OnlyInviterCanCancel);
        }
        let now = Utc::now();
        self.ensure_open(&invitation, now).await?;

        let invitation = self
            .close(invitation_id, InvitationStatus::Cancelled, now)
            .await?;
        info!(
            trip = %invitation.trip_id,
            invitation = %invitation.id,
            "Invitation cancelled"
        );
        Ok(invitation)
    }

    /// Expire every pending invitation past its deadline. Safe to run
    /// concurrently with itself and with accept/reject.
    pub async fn sweep_expired(&self) -> CollabResult<usize> {
        self.sweep_expired_as_of(Utc::now()).await
    }

    /// [`Self::sweep_expired`] against a caller-supplied clock
    pub async fn sweep_expired_as_of(&self, as_of: DateTime<Utc>) -> CollabResult<usize> {
        let expired = self.storage.expire_pending(as_of).await?;
        for invitation in &expired {
            debug!(
                trip = %invitation.trip_id,
                invitation = %invitation.id,
                "Invitation expired"
            );
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Expired pending invitations");
        }
        Ok(expired.len())
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Readable by the inviter, the addressee, or any trip member
    pub async fn get(
        &self,
        invitation_id: &InvitationId,
        actor: &UserId,
    ) -> CollabResult<Invitation> {
        let invitation = self.fetch(invitation_id).await?;

        let allowed = &invitation.invited_by == actor
            || invitation.invited_user_id.as_ref() == Some(actor)
            || self.is_addressed_by_email(&invitation, actor).await?
            || self
                .storage
                .find_trip(&invitation.trip_id)
                .await?
                .is_some_and(|trip| authority::is_member(&trip, actor));
        if !allowed {
            debug!(invitation = %invitation_id, user = %actor, "Invitation read denied");
            return Err(CollabError::denied("not a party to this invitation"));
        }

        self.observe_expiry(invitation).await
    }

    /// Lookup for email-link flows; possession of the token is the credential
    pub async fn get_by_token(&self, token: &str) -> CollabResult<Invitation> {
        let invitation = self
            .storage
            .find_invitation_by_token(token)
            .await?
            .ok_or(CollabError::UnknownToken)?;
        self.observe_expiry(invitation).await
    }

    /// Invitations of a trip; members only
    pub async fn list_for_trip(
        &self,
        trip_id: &TripId,
        actor: &UserId,
        filter: InvitationFilter,
        page: Option<PageRequest>,
    ) -> CollabResult<Page<Invitation>> {
        let trip = load_trip(self.storage.as_ref(), trip_id).await?;
        if !authority::is_member(&trip, actor) {
            debug!(trip = %trip_id, user = %actor, "Invitation listing denied");
            return Err(CollabError::denied("only trip members can list invitations"));
        }
        self.query(InvitationScope::Trip(trip_id.clone()), filter, page)
            .await
    }

    /// Invitations `user_id` issued, across all of their trips
    pub async fn list_sent_by(
        &self,
        user_id: &UserId,
        filter: InvitationFilter,
        page: Option<PageRequest>,
    ) -> CollabResult<Page<Invitation>> {
        self.query(InvitationScope::SentBy(user_id.clone()), filter, page)
            .await
    }

    /// Addressed to the user by id or by their directory email
    pub async fn list_received(
        &self,
        user_id: &UserId,
        filter: InvitationFilter,
        page: Option<PageRequest>,
    ) -> CollabResult<Page<Invitation>> {
        let email = self
            .storage
            .find_user_by_id(user_id)
            .await?
            .map(|user| user.email.trim().to_lowercase());
        let scope = InvitationScope::ReceivedBy {
            user_id: user_id.clone(),
            email,
        };
        self.query(scope, filter, page).await
    }

    /// Open invitations addressed to the user; lapsed ones are hidden
    pub async fn pending_for_user(
        &self,
        user_id: &UserId,
        page: Option<PageRequest>,
    ) -> CollabResult<Page<Invitation>> {
        let filter = InvitationFilter {
            status: Some(InvitationStatus::Pending),
            include_expired: false,
        };
        self.list_received(user_id, filter, page).await
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    async fn fetch(&self, invitation_id: &InvitationId) -> CollabResult<Invitation> {
        self.storage
            .get_invitation(invitation_id)
            .await?
            .ok_or_else(|| CollabError::InvitationNotFound(invitation_id.clone()))
    }

    async fn acting_user(&self, user_id: &UserId) -> CollabResult<UserRecord> {
        self.storage
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| CollabError::UserNotFound(user_id.to_string()))
    }

    async fn is_addressed_by_email(
        &self,
        invitation: &Invitation,
        actor: &UserId,
    ) -> CollabResult<bool> {
        if invitation.invited_email.is_none() {
            return Ok(false);
        }
        Ok(self
            .storage
            .find_user_by_id(actor)
            .await?
            .is_some_and(|user| invitation.is_addressed_to(&user)))
    }

    /// Fail unless the invitation can still be answered. A pending record
    /// past its deadline is expired on the spot.
    async fn ensure_open(&self, invitation: &Invitation, now: DateTime<Utc>) -> CollabResult<()> {
        match invitation.status {
            InvitationStatus::Pending if invitation.is_lapsed(now) => {
                self.expire_lapsed(invitation, now).await?;
                Err(CollabError::InvitationExpired)
            }
            InvitationStatus::Pending => Ok(()),
            InvitationStatus::Expired => Err(CollabError::InvitationExpired),
            status => Err(CollabError::InvitationNotPending(status)),
        }
    }

    /// Transition a lapsed pending record to `Expired`. Losing the race to a
    /// concurrent sweep or response is fine.
    async fn expire_lapsed(&self, invitation: &Invitation, now: DateTime<Utc>) -> CollabResult<()> {
        match self
            .storage
            .transition_invitation(
                &invitation.id,
                InvitationStatus::Pending,
                InvitationStatus::Expired,
                now,
            )
            .await
        {
            Ok(expired) => {
                debug!(invitation = %expired.id, "Invitation expired on read");
                Ok(())
            }
            Err(StorageError::InvariantViolation(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn observe_expiry(&self, invitation: Invitation) -> CollabResult<Invitation> {
        let now = Utc::now();
        if !invitation.is_lapsed(now) {
            return Ok(invitation);
        }
        self.expire_lapsed(&invitation, now).await?;
        self.fetch(&invitation.id).await
    }

    async fn close(
        &self,
        invitation_id: &InvitationId,
        to: InvitationStatus,
        now: DateTime<Utc>,
    ) -> CollabResult<Invitation> {
        match self
            .storage
            .transition_invitation(invitation_id, InvitationStatus::Pending, to, now)
            .await
        {
            Ok(invitation) => Ok(invitation),
            Err(StorageError::InvariantViolation(_)) => {
                Err(self.explain_lost_race(invitation_id).await)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Map a failed compare-and-swap onto the state that won
    async fn explain_lost_race(&self, invitation_id: &InvitationId) -> CollabError {
        let current = match self.fetch(invitation_id).await {
            Ok(invitation) => invitation,
            Err(e) => return e,
        };
        let now = Utc::now();
        match current.status {
            InvitationStatus::Expired => CollabError::InvitationExpired,
            InvitationStatus::Pending if current.is_lapsed(now) => CollabError::InvitationExpired,
            InvitationStatus::Pending => {
                warn!(invitation = %invitation_id, "Invitation transition lost a race");
                CollabError::StaleWrite(format!("invitation {invitation_id}"))
            }
            status => CollabError::InvitationNotPending(status),
        }
    }

    async fn query(
        &self,
        scope: InvitationScope,
        filter: InvitationFilter,
        page: Option<PageRequest>,
    ) -> CollabResult<Page<Invitation>> {
        let request = validation::page_request(
            page,
            self.config.default_page_limit,
            self.config.max_page_limit,
        );
        let query = InvitationQuery::new(scope)
            .with_status(filter.status)
            .including_expired(filter.include_expired);
        let (items, total) = self
            .storage
            .query_invitations(&query, QueryWindow::from(request))
            .await?;
        Ok(Page::new(items, request, total))
    }
}

fn ensure_addressed_to(invitation: &Invitation, user: &UserRecord) -> CollabResult<()> {
    if invitation.is_addressed_to(user) {
        Ok(())
    } else {
        debug!(invitation = %invitation.id, user = %user.id, "Invitation not addressed to user");
        Err(CollabError::NotYourInvitation)
    }
}

/// Hex-encoded random secret for email invitations
fn generate_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes.max(16)];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_storage::{InMemoryCollabStorage, InvitationStore, TripStore};

    struct Fixture {
        storage: Arc<InMemoryCollabStorage>,
        manager: InvitationManager<InMemoryCollabStorage>,
        trip: Trip,
        carol: UserId,
        uma: UserId,
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(InMemoryCollabStorage::new());
        let carol = UserId::new("carol");
        let uma = UserId::new("uma");
        storage
            .insert_user(UserRecord::new(carol.clone(), "carol", "carol@example.com"))
            .unwrap();
        storage
            .insert_user(UserRecord::new(uma.clone(), "uma", "Uma@Example.com"))
            .unwrap();
        let trip = storage
            .save_trip(Trip::new("Lisbon", carol.clone()))
            .await
            .unwrap();
        Fixture {
            manager: InvitationManager::new(storage.clone(), InvitationConfig::default()),
            storage,
            trip,
            carol,
            uma,
        }
    }

    #[tokio::test]
    async fn test_create_by_id_has_no_token() {
        let f = fixture().await;
        let invitation = f
            .manager
            .create(&f.trip.id, &f.carol, InvitationRequest::to_user(f.uma.clone()))
            .await
            .unwrap();

        assert_eq!(invitation.status, InvitationStatus::Pending);
        assert!(invitation.token.is_none());
        let lifetime = invitation.expires_at - invitation.created_at;
        assert!((lifetime - Duration::days(7)).num_seconds().abs() < 5);
    }

    #[tokio::test]
    async fn test_create_by_email_issues_token_and_normalizes() {
        let f = fixture().await;
        let invitation = f
            .manager
            .create(
                &f.trip.id,
                &f.carol,
                InvitationRequest::to_email("  New.Friend@Example.com "),
            )
            .await
            .unwrap();

        assert_eq!(invitation.invited_email.as_deref(), Some("new.friend@example.com"));
        let token = invitation.token.clone().unwrap();
        assert_eq!(token.len(), 64);

        let by_token = f.manager.get_by_token(&token).await.unwrap();
        assert_eq!(by_token.id, invitation.id);
        assert_eq!(
            f.manager.get_by_token("deadbeef").await,
            Err(CollabError::UnknownToken)
        );
    }

    #[tokio::test]
    async fn test_create_preconditions() {
        let f = fixture().await;

        let both = InvitationRequest {
            invited_user_id: Some(f.uma.clone()),
            invited_email: Some("uma@example.com".into()),
            ..Default::default()
        };
        assert_eq!(
            f.manager.create(&f.trip.id, &f.carol, both).await,
            Err(CollabError::InvalidRecipient)
        );
        assert_eq!(
            f.manager
                .create(&f.trip.id, &f.carol, InvitationRequest::default())
                .await,
            Err(CollabError::InvalidRecipient)
        );
        assert_eq!(
            f.manager
                .create(
                    &f.trip.id,
                    &f.carol,
                    InvitationRequest::to_user(UserId::new("ghost"))
                )
                .await,
            Err(CollabError::UserNotFound("ghost".into()))
        );
        assert_eq!(
            f.manager
                .create(&f.trip.id, &f.carol, InvitationRequest::to_user(f.carol.clone()))
                .await,
            Err(CollabError::AlreadyMember(f.carol.clone()))
        );
        assert!(matches!(
            f.manager
                .create(
                    &f.trip.id,
                    &f.carol,
                    InvitationRequest::to_user(f.uma.clone()).expires_in_days(0)
                )
                .await,
            Err(CollabError::Validation(_))
        ));
        assert!(matches!(
            f.manager
                .create(
                    &f.trip.id,
                    &f.carol,
                    InvitationRequest::to_user(f.uma.clone()).with_message("x".repeat(501))
                )
                .await,
            Err(CollabError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_email_of_existing_member_is_rejected() {
        let f = fixture().await;
        let invitation = f
            .manager
            .create(&f.trip.id, &f.carol, InvitationRequest::to_user(f.uma.clone()))
            .await
            .unwrap();
        f.manager.accept(&invitation.id, &f.uma).await.unwrap();

        assert_eq!(
            f.manager
                .create(&f.trip.id, &f.carol, InvitationRequest::to_email("UMA@example.com"))
                .await,
            Err(CollabError::AlreadyMember(f.uma.clone()))
        );
    }

    #[tokio::test]
    async fn test_duplicate_pending_is_rejected_until_lapsed() {
        let f = fixture().await;
        let first = f
            .manager
            .create(&f.trip.id, &f.carol, InvitationRequest::to_email("pat@example.com"))
            .await
            .unwrap();
        assert_eq!(
            f.manager
                .create(&f.trip.id, &f.carol, InvitationRequest::to_email("PAT@example.com"))
                .await,
            Err(CollabError::DuplicatePendingInvitation)
        );

        // Age the first invitation past its deadline
        let lapsed = Invitation {
            id: InvitationId::generate(),
            token: None,
            expires_at: Utc::now() - Duration::minutes(1),
            ..first.clone()
        };
        f.manager.cancel(&first.id, &f.carol).await.unwrap();
        f.storage.insert_invitation(lapsed.clone()).await.unwrap();

        let fresh = f
            .manager
            .create(&f.trip.id, &f.carol, InvitationRequest::to_email("pat@example.com"))
            .await
            .unwrap();
        assert_ne!(fresh.id, lapsed.id);
        let old = f.storage.get_invitation(&lapsed.id).await.unwrap().unwrap();
        assert_eq!(old.status, InvitationStatus::Expired);
    }

    #[tokio::test]
    async fn test_accept_by_email_match_is_case_insensitive() {
        let f = fixture().await;
        let invitation = f
            .manager
            .create(&f.trip.id, &f.carol, InvitationRequest::to_email("uma@example.com"))
            .await
            .unwrap();

        let accepted = f.manager.accept(&invitation.id, &f.uma).await.unwrap();
        assert_eq!(accepted.invitation.status, InvitationStatus::Accepted);
        assert!(accepted.invitation.responded_at.is_some());
        assert!(authority::is_member(&accepted.trip, &f.uma));
    }

    #[tokio::test]
    async fn test_only_addressee_responds_and_only_inviter_cancels() {
        let f = fixture().await;
        let invitation = f
            .manager
            .create(&f.trip.id, &f.carol, InvitationRequest::to_user(f.uma.clone()))
            .await
            .unwrap();

        assert_eq!(
            f.manager.accept(&invitation.id, &f.carol).await,
            Err(CollabError::NotYourInvitation)
        );
        assert_eq!(
            f.manager.reject(&invitation.id, &f.carol).await,
            Err(CollabError::NotYourInvitation)
        );
        assert_eq!(
            f.manager.cancel(&invitation.id, &f.uma).await,
            Err(CollabError::OnlyInviterCanCancel)
        );

        let rejected = f.manager.reject(&invitation.id, &f.uma).await.unwrap();
        assert_eq!(rejected.status, InvitationStatus::Rejected);
        assert!(rejected.responded_at.is_some());
        assert_eq!(
            f.manager.cancel(&invitation.id, &f.carol).await,
            Err(CollabError::InvitationNotPending(InvitationStatus::Rejected))
        );
    }

    #[tokio::test]
    async fn test_cancel_leaves_responded_at_unset() {
        let f = fixture().await;
        let invitation = f
            .manager
            .create(&f.trip.id, &f.carol, InvitationRequest::to_user(f.uma.clone()))
            .await
            .unwrap();

        let cancelled = f.manager.cancel(&invitation.id, &f.carol).await.unwrap();
        assert_eq!(cancelled.status, InvitationStatus::Cancelled);
        assert!(cancelled.responded_at.is_none());
        assert_eq!(
            f.manager.accept(&invitation.id, &f.uma).await,
            Err(CollabError::InvitationNotPending(InvitationStatus::Cancelled))
        );
    }

    #[tokio::test]
    async fn test_get_observes_expiry_and_checks_parties() {
        let f = fixture().await;
        let invitation = Invitation::new(
            f.trip.id.clone(),
            f.carol.clone(),
            Recipient::User(f.uma.clone()),
            Utc::now() - Duration::seconds(1),
        );
        f.storage.insert_invitation(invitation.clone()).await.unwrap();

        let seen = f.manager.get(&invitation.id, &f.uma).await.unwrap();
        assert_eq!(seen.status, InvitationStatus::Expired);
        assert!(matches!(
            f.manager.get(&invitation.id, &UserId::new("eve")).await,
            Err(CollabError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_listings_are_paginated() {
        let f = fixture().await;
        for i in 0..5 {
            f.manager
                .create(
                    &f.trip.id,
                    &f.carol,
                    InvitationRequest::to_email(format!("guest{i}@example.com")),
                )
                .await
                .unwrap();
        }
        f.manager
            .create(&f.trip.id, &f.carol, InvitationRequest::to_email("uma@example.com"))
            .await
            .unwrap();

        let page = f
            .manager
            .list_for_trip(
                &f.trip.id,
                &f.carol,
                InvitationFilter::default(),
                Some(PageRequest::new(2, 4)),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 6);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.items.len(), 2);

        let sent = f
            .manager
            .list_sent_by(&f.carol, InvitationFilter::default(), None)
            .await
            .unwrap();
        assert_eq!(sent.limit, 20);
        assert_eq!(sent.total, 6);

        let pending = f.manager.pending_for_user(&f.uma, None).await.unwrap();
        assert_eq!(pending.total, 1);
        assert_eq!(
            pending.items[0].invited_email.as_deref(),
            Some("uma@example.com")
        );

        assert!(matches!(
            f.manager
                .list_for_trip(&f.trip.id, &f.uma, InvitationFilter::default(), None)
                .await,
            Err(CollabError::PermissionDenied(_))
        ));
    }
}

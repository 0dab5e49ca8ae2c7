use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    error::AppError,
    models::{
        participant::Participant,
        trip::{NewTrip, Trip},
    },
    validation::{validate_email, validate_new_trip},
};

use super::{
    links::Links,
    mail::{deliver_all, DeliveryReport, Notifier, NotifyError, OutgoingEmail, Recipient},
    store::TripStore,
    templates::{format_date, render, subject, TripCreatedEmail, TripInvitationEmail},
};

/// Redirect target returned when a trip was already confirmed.
pub const ALREADY_CONFIRMED_REDIRECT: &str = "/";

#[derive(Debug, Clone)]
pub struct TripConfirmation {
    pub redirect_to: String,
    /// Empty when the call did not perform the confirmation.
    pub delivery: DeliveryReport,
}

#[derive(Clone)]
pub struct TripService {
    store: Arc<dyn TripStore>,
    notifier: Arc<dyn Notifier>,
    links: Links,
}

impl TripService {
    pub fn new(store: Arc<dyn TripStore>, notifier: Arc<dyn Notifier>, links: Links) -> Self {
        Self {
            store,
            notifier,
            links,
        }
    }

    pub async fn create_trip(&self, new_trip: NewTrip) -> Result<String, AppError> {
        validate_new_trip(&new_trip, Utc::now())?;

        let trip = self.store.create_trip_with_owner(&new_trip).await?;
        info!(
            trip_id = %trip.id,
            invitees = new_trip.emails_to_invite.len(),
            "trip created"
        );

        let confirmation_link = self.links.trip_confirmation(&trip.id);
        let owner = Recipient::new(Some(new_trip.owner_name.clone()), &new_trip.owner_email);
        let body = render(&TripCreatedEmail {
            destination: &trip.destination,
            starts_at: format_date(trip.starts_at),
            ends_at: format_date(trip.ends_at),
            owner_name: &new_trip.owner_name,
            owner_email: &new_trip.owner_email,
            emails_to_invite: new_trip.emails_to_invite.join(", "),
            confirmation_link: &confirmation_link,
        });
        self.notify(owner, &trip.destination, body).await;

        Ok(trip.id)
    }

    pub async fn confirm_trip(&self, trip_id: &str) -> Result<TripConfirmation, AppError> {
        let trip = self
            .store
            .find_trip(trip_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if trip.is_confirmed || !self.store.update_trip_confirmed(&trip.id).await? {
            debug!(trip_id = %trip.id, "trip already confirmed");
            return Ok(TripConfirmation {
                redirect_to: ALREADY_CONFIRMED_REDIRECT.to_string(),
                delivery: DeliveryReport::default(),
            });
        }
        info!(trip_id = %trip.id, "trip confirmed");

        let participants = self.store.list_participants(&trip.id, true).await?;
        let starts_at = format_date(trip.starts_at);
        let ends_at = format_date(trip.ends_at);

        let mut delivery = DeliveryReport::default();
        let mut emails = Vec::with_capacity(participants.len());
        for participant in participants {
            let recipient = Recipient::new(participant.name.clone(), &participant.email);
            let confirmation_link = self.links.participant_confirmation(&participant.id);
            let rendered = render(&TripInvitationEmail {
                destination: &trip.destination,
                starts_at: starts_at.clone(),
                ends_at: ends_at.clone(),
                confirmation_link: &confirmation_link,
            });
            match rendered {
                Ok(body_html) => emails.push(OutgoingEmail {
                    to: recipient,
                    subject: subject(&trip.destination),
                    body_html,
                }),
                Err(reason) => delivery.record_failure(recipient, reason),
            }
        }

        let sent = deliver_all(self.notifier.as_ref(), emails).await;
        delivery.delivered.extend(sent.delivered);
        delivery.failed.extend(sent.failed);
        if !delivery.is_complete() {
            warn!(
                trip_id = %trip.id,
                failed = delivery.failed.len(),
                delivered = delivery.delivered.len(),
                "some participants were not notified of the confirmation"
            );
        }

        Ok(TripConfirmation {
            redirect_to: self.links.trip_page(&trip.id),
            delivery,
        })
    }

    pub async fn create_invite(&self, trip_id: &str, email: &str) -> Result<String, AppError> {
        validate_email(email)?;

        let trip = self
            .store
            .find_trip(trip_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let participant = self.store.create_participant(&trip.id, email).await?;
        info!(trip_id = %trip.id, participant_id = %participant.id, "participant invited");

        // Invitees land on the trip-level confirmation endpoint.
        let confirmation_link = self.links.trip_confirmation(&trip.id);
        let body = render(&TripInvitationEmail {
            destination: &trip.destination,
            starts_at: format_date(trip.starts_at),
            ends_at: format_date(trip.ends_at),
            confirmation_link: &confirmation_link,
        });
        self.notify(
            Recipient::new(None, &participant.email),
            &trip.destination,
            body,
        )
        .await;

        Ok(participant.id)
    }

    pub async fn confirm_participant(&self, participant_id: &str) -> Result<String, AppError> {
        let participant = self
            .store
            .find_participant(participant_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if !participant.is_confirmed
            && self
                .store
                .update_participant_confirmed(&participant.id)
                .await?
        {
            info!(participant_id = %participant.id, "participant confirmed");
        }

        Ok(self.links.trip_page(&participant.trip_id))
    }

    pub async fn get_trip(&self, trip_id: &str) -> Result<Trip, AppError> {
        self.store
            .find_trip(trip_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn participants(&self, trip_id: &str) -> Result<Vec<Participant>, AppError> {
        let trip = self.get_trip(trip_id).await?;
        self.store.list_participants(&trip.id, false).await
    }

    /// Best effort: failures end up in the log, never in the caller's result.
    async fn notify(&self, to: Recipient, destination: &str, body: Result<String, NotifyError>) {
        match body {
            Ok(body_html) => {
                let email = OutgoingEmail {
                    to,
                    subject: subject(destination),
                    body_html,
                };
                deliver_all(self.notifier.as_ref(), vec![email]).await;
            }
            Err(reason) => DeliveryReport::default().record_failure(to, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        db::{init_pool, run_migrations},
        services::store::SqliteStore,
        testing::RecordingNotifier,
    };

    struct Fixture {
        service: TripService,
        store: SqliteStore,
        notifier: Arc<RecordingNotifier>,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("trips.sqlite").to_string_lossy());
        let pool = init_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let store = SqliteStore::new(pool);
        let notifier = Arc::new(RecordingNotifier::new());
        let service = TripService::new(
            Arc::new(store.clone()),
            notifier.clone(),
            Links::new("http://api.test", "http://web.test"),
        );
        Fixture {
            service,
            store,
            notifier,
            _dir: dir,
        }
    }

    fn paris() -> NewTrip {
        let now = Utc::now();
        NewTrip {
            destination: "Paris".into(),
            starts_at: now + Duration::days(1),
            ends_at: now + Duration::days(6),
            owner_name: "Ana".into(),
            owner_email: "ana@x.com".into(),
            emails_to_invite: vec!["bob@x.com".into(), "cleo@x.com".into()],
        }
    }

    async fn count(store: &SqliteStore, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_trip_writes_owner_and_invitees_and_mails_the_owner() {
        let fx = fixture().await;
        let trip_id = fx.service.create_trip(paris()).await.unwrap();

        let participants = fx.service.participants(&trip_id).await.unwrap();
        assert_eq!(participants.len(), 3);
        let owners: Vec<_> = participants.iter().filter(|p| p.is_owner).collect();
        assert_eq!(owners.len(), 1);
        assert!(owners[0].is_confirmed);
        assert_eq!(owners[0].name.as_deref(), Some("Ana"));
        assert_eq!(participants[0].email, "ana@x.com");
        assert!(participants[1..]
            .iter()
            .all(|p| !p.is_owner && !p.is_confirmed && p.name.is_none()));

        let sent = fx.notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to.email, "ana@x.com");
        assert_eq!(sent[0].to.name.as_deref(), Some("Ana"));
        assert_eq!(sent[0].subject, "Confirm your trip to Paris");
        assert!(sent[0].body_html.contains("bob@x.com, cleo@x.com"));
        assert!(sent[0]
            .body_html
            .contains(&format!("http://api.test/trips/{trip_id}/confirm")));
    }

    #[tokio::test]
    async fn duplicate_invitees_are_kept() {
        let fx = fixture().await;
        let mut trip = paris();
        trip.emails_to_invite = vec!["bob@x.com".into(), "bob@x.com".into()];
        let trip_id = fx.service.create_trip(trip).await.unwrap();
        assert_eq!(fx.service.participants(&trip_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn invalid_trip_writes_nothing_and_sends_nothing() {
        let fx = fixture().await;

        let mut past = paris();
        past.starts_at = Utc::now() - Duration::days(1);
        let err = fx.service.create_trip(past).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(ref m) if m == "starts_at must be in the future"));

        let mut backwards = paris();
        backwards.ends_at = backwards.starts_at - Duration::hours(1);
        let err = fx.service.create_trip(backwards).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(ref m) if m == "ends_at must be after starts_at"));

        assert_eq!(count(&fx.store, "trips").await, 0);
        assert_eq!(count(&fx.store, "participants").await, 0);
        assert!(fx.notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn owner_mail_failure_does_not_fail_creation() {
        let fx = fixture().await;
        fx.notifier.fail_for("ana@x.com").await;
        let trip_id = fx.service.create_trip(paris()).await.unwrap();
        assert!(fx.service.get_trip(&trip_id).await.is_ok());
    }

    #[tokio::test]
    async fn confirm_trip_notifies_everyone_but_the_owner_once() {
        let fx = fixture().await;
        let trip_id = fx.service.create_trip(paris()).await.unwrap();

        let first = fx.service.confirm_trip(&trip_id).await.unwrap();
        assert_eq!(first.redirect_to, format!("http://web.test/trips/{trip_id}"));
        assert!(first.delivery.is_complete());
        assert_eq!(first.delivery.delivered.len(), 2);
        assert!(fx.service.get_trip(&trip_id).await.unwrap().is_confirmed);

        assert_eq!(fx.notifier.sent_to("ana@x.com").await.len(), 1);
        let participants = fx.store.list_participants(&trip_id, true).await.unwrap();
        for participant in &participants {
            let mails = fx.notifier.sent_to(&participant.email).await;
            assert_eq!(mails.len(), 1);
            assert!(mails[0].body_html.contains(&format!(
                "http://api.test/participants/{}/confirm",
                participant.id
            )));
        }

        let second = fx.service.confirm_trip(&trip_id).await.unwrap();
        assert_eq!(second.redirect_to, "/");
        assert!(second.delivery.delivered.is_empty());
        assert_eq!(fx.notifier.sent().await.len(), 3);
    }

    #[tokio::test]
    async fn concurrent_confirmations_fan_out_once() {
        let fx = fixture().await;
        let trip_id = fx.service.create_trip(paris()).await.unwrap();

        let (a, b) = tokio::join!(
            fx.service.confirm_trip(&trip_id),
            fx.service.confirm_trip(&trip_id)
        );
        let mut redirects = vec![a.unwrap().redirect_to, b.unwrap().redirect_to];
        redirects.sort();
        assert_eq!(redirects, ["/".to_string(), format!("http://web.test/trips/{trip_id}")]);
        // owner mail + bob + cleo
        assert_eq!(fx.notifier.sent().await.len(), 3);
    }

    #[tokio::test]
    async fn failing_recipient_is_reported_and_trip_stays_confirmed() {
        let fx = fixture().await;
        fx.notifier.fail_for("bob@x.com").await;
        let trip_id = fx.service.create_trip(paris()).await.unwrap();

        let outcome = fx.service.confirm_trip(&trip_id).await.unwrap();
        assert_eq!(outcome.delivery.failed.len(), 1);
        assert_eq!(outcome.delivery.failed[0].recipient.email, "bob@x.com");
        assert_eq!(outcome.delivery.delivered.len(), 1);
        assert_eq!(fx.notifier.sent_to("cleo@x.com").await.len(), 1);
        assert!(fx.service.get_trip(&trip_id).await.unwrap().is_confirmed);
    }

    #[tokio::test]
    async fn unknown_trip_is_not_found_everywhere() {
        let fx = fixture().await;
        assert!(matches!(
            fx.service.confirm_trip("missing").await,
            Err(AppError::NotFound)
        ));
        assert!(matches!(
            fx.service.create_invite("missing", "dan@x.com").await,
            Err(AppError::NotFound)
        ));
        assert!(matches!(
            fx.service.confirm_participant("missing").await,
            Err(AppError::NotFound)
        ));
        assert_eq!(count(&fx.store, "participants").await, 0);
        assert!(fx.notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn invites_work_before_and_after_confirmation() {
        let fx = fixture().await;
        let trip_id = fx.service.create_trip(paris()).await.unwrap();

        let early = fx.service.create_invite(&trip_id, "dan@x.com").await.unwrap();
        fx.service.confirm_trip(&trip_id).await.unwrap();
        let late = fx.service.create_invite(&trip_id, "dan@x.com").await.unwrap();
        assert_ne!(early, late);

        for id in [&early, &late] {
            let participant = fx.store.find_participant(id).await.unwrap().unwrap();
            assert!(!participant.is_owner);
            assert!(!participant.is_confirmed);
            assert_eq!(participant.trip_id, trip_id);
        }

        let dan = fx.notifier.sent_to("dan@x.com").await;
        // early invite, confirmation fan-out, late invite
        assert_eq!(dan.len(), 3);
        assert!(dan[0]
            .body_html
            .contains(&format!("http://api.test/trips/{trip_id}/confirm")));
    }

    #[tokio::test]
    async fn invite_mail_failure_does_not_fail_the_invite() {
        let fx = fixture().await;
        let trip_id = fx.service.create_trip(paris()).await.unwrap();
        fx.notifier.fail_for("dan@x.com").await;

        let id = fx.service.create_invite(&trip_id, "dan@x.com").await.unwrap();

        let participant = fx.store.find_participant(&id).await.unwrap().unwrap();
        assert_eq!(participant.email, "dan@x.com");
        assert_eq!(participant.trip_id, trip_id);
        assert!(fx.notifier.sent_to("dan@x.com").await.is_empty());
    }

    #[tokio::test]
    async fn invite_with_bad_email_is_rejected() {
        let fx = fixture().await;
        let trip_id = fx.service.create_trip(paris()).await.unwrap();
        let err = fx.service.create_invite(&trip_id, "dan").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(fx.service.participants(&trip_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn participant_confirmation_is_idempotent() {
        let fx = fixture().await;
        let trip_id = fx.service.create_trip(paris()).await.unwrap();
        let id = fx.service.create_invite(&trip_id, "dan@x.com").await.unwrap();

        let page = format!("http://web.test/trips/{trip_id}");
        assert_eq!(fx.service.confirm_participant(&id).await.unwrap(), page);
        assert_eq!(fx.service.confirm_participant(&id).await.unwrap(), page);
        assert!(fx.store.find_participant(&id).await.unwrap().unwrap().is_confirmed);
    }
}

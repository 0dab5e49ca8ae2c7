use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        participant::Participant,
        trip::{NewTrip, Trip},
    },
};

/// Persistence operations the trip lifecycle relies on.
///
/// The two `update_*_confirmed` methods must be atomic: when several callers
/// race on the same record, exactly one of them gets `true` back.
#[async_trait]
pub trait TripStore: Send + Sync {
    async fn find_trip(&self, id: &str) -> Result<Option<Trip>, AppError>;

    /// Writes the trip, its confirmed owner and one unconfirmed participant per
    /// invitee email in a single transaction.
    async fn create_trip_with_owner(&self, new_trip: &NewTrip) -> Result<Trip, AppError>;

    async fn update_trip_confirmed(&self, id: &str) -> Result<bool, AppError>;

    async fn list_participants(
        &self,
        trip_id: &str,
        exclude_owner: bool,
    ) -> Result<Vec<Participant>, AppError>;

    async fn create_participant(&self, trip_id: &str, email: &str)
        -> Result<Participant, AppError>;

    async fn find_participant(&self, id: &str) -> Result<Option<Participant>, AppError>;

    async fn update_participant_confirmed(&self, id: &str) -> Result<bool, AppError>;
}

#[derive(Clone)]
pub struct SqliteStore {
    db: DbPool,
}

impl SqliteStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &DbPool {
        &self.db
    }
}

const PARTICIPANT_COLUMNS: &str =
    "id, trip_id, name, email, is_owner, is_confirmed, created_at";

async fn insert_participant<'e, E>(executor: E, participant: &Participant) -> Result<(), AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"INSERT INTO participants (id, trip_id, name, email, is_owner, is_confirmed, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&participant.id)
    .bind(&participant.trip_id)
    .bind(&participant.name)
    .bind(&participant.email)
    .bind(participant.is_owner)
    .bind(participant.is_confirmed)
    .bind(participant.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl TripStore for SqliteStore {
    async fn find_trip(&self, id: &str) -> Result<Option<Trip>, AppError> {
        let trip = sqlx::query_as::<_, Trip>(
            r#"SELECT id, destination, starts_at, ends_at, is_confirmed, created_at
               FROM trips WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(trip)
    }

    async fn create_trip_with_owner(&self, new_trip: &NewTrip) -> Result<Trip, AppError> {
        let now = Utc::now();
        let trip = Trip {
            id: Uuid::new_v4().to_string(),
            destination: new_trip.destination.clone(),
            starts_at: new_trip.starts_at,
            ends_at: new_trip.ends_at,
            is_confirmed: false,
            created_at: now,
        };

        let mut tx = self.db.begin().await?;
        sqlx::query(
            r#"INSERT INTO trips (id, destination, starts_at, ends_at, is_confirmed, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&trip.id)
        .bind(&trip.destination)
        .bind(trip.starts_at)
        .bind(trip.ends_at)
        .bind(trip.is_confirmed)
        .bind(trip.created_at)
        .execute(&mut *tx)
        .await?;

        let owner = Participant::owner(&trip.id, &new_trip.owner_name, &new_trip.owner_email, now);
        insert_participant(&mut *tx, &owner).await?;
        for email in &new_trip.emails_to_invite {
            insert_participant(&mut *tx, &Participant::invitee(&trip.id, email, now)).await?;
        }
        tx.commit().await?;

        Ok(trip)
    }

    async fn update_trip_confirmed(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE trips SET is_confirmed = 1 WHERE id = ? AND is_confirmed = 0")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_participants(
        &self,
        trip_id: &str,
        exclude_owner: bool,
    ) -> Result<Vec<Participant>, AppError> {
        // rowid keeps insertion order for rows sharing a created_at
        let sql = if exclude_owner {
            format!(
                "SELECT {PARTICIPANT_COLUMNS} FROM participants \
                 WHERE trip_id = ? AND is_owner = 0 ORDER BY created_at, rowid"
            )
        } else {
            format!(
                "SELECT {PARTICIPANT_COLUMNS} FROM participants \
                 WHERE trip_id = ? ORDER BY created_at, rowid"
            )
        };
        let participants = sqlx::query_as::<_, Participant>(&sql)
            .bind(trip_id)
            .fetch_all(&self.db)
            .await?;
        Ok(participants)
    }

    async fn create_participant(
        &self,
        trip_id: &str,
        email: &str,
    ) -> Result<Participant, AppError> {
        let participant = Participant::invitee(trip_id, email, Utc::now());
        insert_participant(&self.db, &participant).await?;
        Ok(participant)
    }

    async fn find_participant(&self, id: &str) -> Result<Option<Participant>, AppError> {
        let participant = sqlx::query_as::<_, Participant>(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(participant)
    }

    async fn update_participant_confirmed(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE participants SET is_confirmed = 1 WHERE id = ? AND is_confirmed = 0",
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Participant {
    pub id: String,
    pub trip_id: String,
    pub name: Option<String>,
    pub email: String,
    pub is_owner: bool,
    pub is_confirmed: bool,
    pub created_at: DateTime<Utc>,
}

impl Participant {
    pub fn owner(
        trip_id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            trip_id: trip_id.into(),
            name: Some(name.into()),
            email: email.into(),
            is_owner: true,
            is_confirmed: true,
            created_at,
        }
    }

    pub fn invitee(
        trip_id: impl Into<String>,
        email: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            trip_id: trip_id.into(),
            name: None,
            email: email.into(),
            is_owner: false,
            is_confirmed: false,
            created_at,
        }
    }
}

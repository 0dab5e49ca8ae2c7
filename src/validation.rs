//! Checks applied to caller input before anything is written.

use chrono::{DateTime, Utc};
use lettre::Address;

use crate::{error::AppError, models::trip::NewTrip};

pub const MIN_DESTINATION_LEN: usize = 4;

pub fn validate_trip_window(
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if starts_at <= now {
        return Err(AppError::invalid("starts_at must be in the future"));
    }
    if ends_at < starts_at {
        return Err(AppError::invalid("ends_at must be after starts_at"));
    }
    Ok(())
}

pub fn validate_destination(destination: &str) -> Result<(), AppError> {
    if destination.chars().count() < MIN_DESTINATION_LEN {
        return Err(AppError::invalid(format!(
            "destination must be at least {MIN_DESTINATION_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), AppError> {
    email
        .parse::<Address>()
        .map(|_| ())
        .map_err(|_| AppError::invalid(format!("invalid email address: {email}")))
}

pub fn validate_new_trip(trip: &NewTrip, now: DateTime<Utc>) -> Result<(), AppError> {
    validate_destination(&trip.destination)?;
    validate_email(&trip.owner_email)?;
    for email in &trip.emails_to_invite {
        validate_email(email)?;
    }
    validate_trip_window(trip.starts_at, trip.ends_at, now)
}

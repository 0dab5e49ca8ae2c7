use askama::Template;
use chrono::{DateTime, Utc};

use super::mail::NotifyError;

#[derive(Template)]
#[template(path = "email/trip_created.html")]
pub struct TripCreatedEmail<'a> {
    pub destination: &'a str,
    pub starts_at: String,
    pub ends_at: String,
    pub owner_name: &'a str,
    pub owner_email: &'a str,
    pub emails_to_invite: String,
    pub confirmation_link: &'a str,
}

#[derive(Template)]
#[template(path = "email/trip_invitation.html")]
pub struct TripInvitationEmail<'a> {
    pub destination: &'a str,
    pub starts_at: String,
    pub ends_at: String,
    pub confirmation_link: &'a str,
}

pub fn subject(destination: &str) -> String {
    format!("Confirm your trip to {destination}")
}

/// Long date, e.g. `October 20, 2026`.
pub fn format_date(ts: DateTime<Utc>) -> String {
    ts.format("%B %-d, %Y").to_string()
}

pub fn render<T: Template>(template: &T) -> Result<String, NotifyError> {
    template
        .render()
        .map_err(|err| NotifyError::Build(err.to_string()))
}

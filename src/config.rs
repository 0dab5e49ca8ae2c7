use std::{env, net::SocketAddr};

use url::Url;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub api_base_url: String,
    pub web_base_url: String,
    pub mail: MailConfig,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    /// No host means messages are only logged.
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from_name: String,
    pub from_address: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            from_name: "Planner".into(),
            from_address: "planner@me.com".into(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://planner.db".to_string());
        let listen_addr: SocketAddr = env::var("APP_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3333".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid APP_LISTEN_ADDR: {err}")))?;

        let api_base_url = parse_base_url(
            "API_BASE_URL",
            &env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:3333".to_string()),
        )?;
        let web_base_url = parse_base_url(
            "WEB_BASE_URL",
            &env::var("WEB_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
        )?;

        let defaults = MailConfig::default();
        let smtp_port = match env::var("SMTP_PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|err| AppError::Config(format!("invalid SMTP_PORT: {err}")))?,
            Err(_) => defaults.smtp_port,
        };
        let mail = MailConfig {
            smtp_host: non_empty_var("SMTP_HOST"),
            smtp_port,
            smtp_username: non_empty_var("SMTP_USERNAME"),
            smtp_password: non_empty_var("SMTP_PASSWORD"),
            from_name: non_empty_var("MAIL_FROM_NAME").unwrap_or(defaults.from_name),
            from_address: non_empty_var("MAIL_FROM_ADDRESS").unwrap_or(defaults.from_address),
        };

        Ok(Self {
            database_url,
            listen_addr,
            api_base_url,
            web_base_url,
            mail,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Checks that `raw` is an absolute http(s) URL and strips trailing slashes so
/// links can be joined with `format!("{base}/trips/...")`.
pub fn parse_base_url(key: &str, raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed)
        .map_err(|err| AppError::Config(format!("invalid {key}: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::Config(format!(
            "invalid {key}: unsupported scheme {}",
            url.scheme()
        )));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

use crate::config::AppConfig;

/// Builds the absolute URLs embedded in emails and redirects.
#[derive(Debug, Clone)]
pub struct Links {
    api_base_url: String,
    web_base_url: String,
}

impl Links {
    pub fn new(api_base_url: impl Into<String>, web_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            web_base_url: web_base_url.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.api_base_url, &config.web_base_url)
    }

    pub fn trip_confirmation(&self, trip_id: &str) -> String {
        format!("{}/trips/{trip_id}/confirm", self.api_base_url)
    }

    pub fn participant_confirmation(&self, participant_id: &str) -> String {
        format!("{}/participants/{participant_id}/confirm", self.api_base_url)
    }

    pub fn trip_page(&self, trip_id: &str) -> String {
        format!("{}/trips/{trip_id}", self.web_base_url)
    }
}

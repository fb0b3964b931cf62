use crate::error::ScrapeError;

const DEFAULT_DB_PATH: &str = "data/screenings.sqlite";

pub struct Config {
    pub contact: String,
    pub db_path: String,
    pub fallback_key: Option<String>,
}

/// Read configuration from the environment. The contact address is required
/// so every request carries an identifiable, polite user agent; the fallback
/// provider key is optional and its absence simply disables that escape
/// hatch.
pub fn load() -> Result<Config, ScrapeError> {
    let contact = std::env::var("SCRAPER_CONTACT_EMAIL")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ScrapeError::Config("SCRAPER_CONTACT_EMAIL is not set".into()))?;

    let db_path = std::env::var("LISTINGS_DB")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

    let fallback_key = std::env::var("FIRECRAWL_API_KEY")
        .ok()
        .filter(|v| !v.trim().is_empty());

    Ok(Config {
        contact,
        db_path,
        fallback_key,
    })
}

impl Config {
    pub fn user_agent(&self) -> String {
        format!("RepertoryListingsBot/1.0 (+contact: {})", self.contact)
    }
}

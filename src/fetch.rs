use std::time::Duration;

use rand::Rng;
use reqwest::header;
use tracing::warn;
use url::Url;

use crate::config::Config;
use crate::error::ScrapeError;
use crate::fallback::RenderFallback;

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF_MS: u64 = 500;
const REQUEST_TIMEOUT_SECS: u64 = 60;
const PAGE_DELAY_MS: u64 = 250;
const PAGE_JITTER_MS: u64 = 250;

const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-GB,en;q=0.9";

// Alternate UA strings rotated across retries to reduce naive blocking.
const ALT_AGENTS: [&str; 2] = [
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

/// Retry-then-fallback control flow as an explicit state machine.
enum FetchState {
    Attempting(u32),
    Blocked,
    FallbackAttempt,
    Failed,
}

enum AttemptError {
    /// 403/429: the site is refusing automated access.
    Blocked(u16),
    Other(String),
}

pub struct FetchClient {
    client: reqwest::Client,
    agents: Vec<String>,
    fallback: Option<RenderFallback>,
}

impl FetchClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let mut agents = vec![config.user_agent()];
        agents.extend(ALT_AGENTS.iter().map(|s| s.to_string()));

        let fallback = config
            .fallback_key
            .as_ref()
            .map(|key| RenderFallback::new(key.clone()));

        Ok(Self {
            client,
            agents,
            fallback,
        })
    }

    pub fn fallback(&self) -> Option<&RenderFallback> {
        self.fallback.as_ref()
    }

    /// Resilient GET: up to 3 attempts with exponential backoff and UA
    /// rotation. 403/429 with a configured render-fallback short-circuits to
    /// the provider; exhausted retries get exactly one fallback attempt.
    pub async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        let referer = origin_of(url);
        let mut state = FetchState::Attempting(0);
        let mut last_reason = String::from("no attempts made");

        loop {
            state = match state {
                FetchState::Attempting(n) if n >= MAX_ATTEMPTS => FetchState::FallbackAttempt,
                FetchState::Attempting(n) => match self.attempt(url, n, referer.as_deref()).await {
                    Ok(body) => return Ok(body),
                    Err(AttemptError::Blocked(status)) => {
                        last_reason = format!("HTTP {status}");
                        warn!(url, status, attempt = n + 1, "fetch blocked");
                        if self.fallback.is_some() {
                            FetchState::Blocked
                        } else {
                            self.backoff(n).await;
                            FetchState::Attempting(n + 1)
                        }
                    }
                    Err(AttemptError::Other(reason)) => {
                        warn!(url, attempt = n + 1, %reason, "fetch attempt failed");
                        last_reason = reason;
                        self.backoff(n).await;
                        FetchState::Attempting(n + 1)
                    }
                },
                FetchState::Blocked => FetchState::FallbackAttempt,
                FetchState::FallbackAttempt => match &self.fallback {
                    Some(provider) => match provider.scrape(url).await {
                        Ok(html) if !html.trim().is_empty() => return Ok(html),
                        Ok(_) => {
                            warn!(url, "render fallback returned no html");
                            FetchState::Failed
                        }
                        Err(e) => {
                            warn!(url, error = %e, "render fallback failed");
                            FetchState::Failed
                        }
                    },
                    None => FetchState::Failed,
                },
                FetchState::Failed => {
                    return Err(ScrapeError::Fetch {
                        url: url.to_string(),
                        reason: last_reason,
                    })
                }
            };
        }
    }

    async fn attempt(
        &self,
        url: &str,
        attempt: u32,
        referer: Option<&str>,
    ) -> Result<String, AttemptError> {
        let ua = &self.agents[attempt as usize % self.agents.len()];
        let mut req = self
            .client
            .get(url)
            .header(header::USER_AGENT, ua)
            .header(header::ACCEPT, ACCEPT)
            .header(header::ACCEPT_LANGUAGE, ACCEPT_LANGUAGE)
            .header("upgrade-insecure-requests", "1");
        if let Some(origin) = referer {
            req = req.header(header::REFERER, origin);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| AttemptError::Other(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 403 || status.as_u16() == 429 {
            return Err(AttemptError::Blocked(status.as_u16()));
        }
        if !status.is_success() {
            return Err(AttemptError::Other(format!("HTTP {}", status.as_u16())));
        }

        resp.text().await.map_err(|e| AttemptError::Other(e.to_string()))
    }

    async fn backoff(&self, attempt: u32) {
        let delay = backoff_ms(attempt);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

fn backoff_ms(attempt: u32) -> u64 {
    BASE_BACKOFF_MS * 3u64.pow(attempt)
}

fn origin_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .map(|u| format!("{}/", u.origin().ascii_serialization()))
}

/// Short jittered pause between consecutive page fetches inside a collector.
/// Deliberate backpressure against upstream rate limits, not a tunable.
pub async fn polite_delay() {
    let jitter = rand::thread_rng().gen_range(0..=PAGE_JITTER_MS);
    tokio::time::sleep(Duration::from_millis(PAGE_DELAY_MS + jitter)).await;
}

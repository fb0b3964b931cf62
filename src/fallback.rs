use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tracing::warn;

const SCRAPE_ENDPOINT: &str = "https://api.firecrawl.dev/v1/scrape";
const CRAWL_ENDPOINT: &str = "https://api.firecrawl.dev/v1/crawl";
const PROVIDER_TIMEOUT_SECS: u64 = 90;

/// Client for the server-side render provider, used when direct fetches are
/// blocked or a venue index cannot be reached at all.
pub struct RenderFallback {
    key: String,
    client: reqwest::Client,
}

/// One rendered document in a provider response.
#[derive(Debug, Default, Deserialize)]
pub struct RenderedDoc {
    pub url: Option<String>,
    pub html: Option<String>,
    pub content: Option<String>,
    pub metadata: Option<DocMetadata>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DocMetadata {
    pub url: Option<String>,
}

// The provider's response shape is not fixed: the payload has been observed
// at several nesting depths. Model the known shapes as an explicit union and
// probe them in one place instead of scattering deep-field lookups.
#[derive(Deserialize)]
#[serde(untagged)]
enum ProviderResponse {
    Wrapped { data: ProviderData },
    List(Vec<RenderedDoc>),
    Doc(RenderedDoc),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProviderData {
    One(Box<RenderedDoc>),
    Many(Vec<RenderedDoc>),
}

impl RenderedDoc {
    /// Best page URL the provider reported for this document.
    pub fn page_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .or_else(|| self.metadata.as_ref().and_then(|m| m.url.as_deref()))
    }

    fn into_html(self) -> Option<String> {
        self.html
            .or(self.content)
            .filter(|h| !h.trim().is_empty())
    }
}

/// Candidate locations in fixed order: `data.html`, `data[0].html`, `html`,
/// `[0].html`, then the same chain for `content`. First present wins.
fn html_payload(value: serde_json::Value) -> Option<String> {
    let resp: ProviderResponse = serde_json::from_value(value).ok()?;
    match resp {
        ProviderResponse::Wrapped { data: ProviderData::One(doc) } => doc.into_html(),
        ProviderResponse::Wrapped { data: ProviderData::Many(docs) } => {
            docs.into_iter().find_map(RenderedDoc::into_html)
        }
        ProviderResponse::Doc(doc) => doc.into_html(),
        ProviderResponse::List(docs) => docs.into_iter().find_map(RenderedDoc::into_html),
    }
}

impl RenderFallback {
    pub fn new(key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { key, client }
    }

    /// Fetch one page through the provider and return its rendered HTML.
    pub async fn scrape(&self, url: &str) -> Result<String> {
        warn!(url, "using render fallback");
        let body = serde_json::json!({
            "url": url,
            "formats": ["html"],
            "onlyMainContent": false,
        });
        let value = self.post(SCRAPE_ENDPOINT, &body).await?;
        html_payload(value).ok_or_else(|| anyhow!("no html payload in provider response"))
    }

    /// Crawl a site section through the provider and return every rendered
    /// document it reports, for link discovery when the index is unreachable.
    pub async fn crawl(&self, url: &str, limit: usize) -> Result<Vec<RenderedDoc>> {
        warn!(url, limit, "using render fallback for link discovery");
        let body = serde_json::json!({
            "url": url,
            "limit": limit,
            "scrapeOptions": { "formats": ["html"] },
        });
        let value = self.post(CRAWL_ENDPOINT, &body).await?;

        let docs = match serde_json::from_value::<ProviderResponse>(value) {
            Ok(ProviderResponse::Wrapped { data: ProviderData::Many(docs) }) => docs,
            Ok(ProviderResponse::Wrapped { data: ProviderData::One(doc) }) => vec![*doc],
            Ok(ProviderResponse::List(docs)) => docs,
            Ok(ProviderResponse::Doc(doc)) => vec![doc],
            Err(_) => Vec::new(),
        };
        Ok(docs)
    }

    async fn post(&self, endpoint: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let resp = self
            .client
            .post(endpoint)
            .bearer_auth(&self.key)
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("provider HTTP {}", status.as_u16()));
        }
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn probes_wrapped_object() {
        let v = json!({ "data": { "html": "<p>hi</p>" } });
        assert_eq!(html_payload(v).as_deref(), Some("<p>hi</p>"));
    }

    #[test]
    fn probes_wrapped_array() {
        let v = json!({ "data": [{ "html": "<p>first</p>" }, { "html": "<p>second</p>" }] });
        assert_eq!(html_payload(v).as_deref(), Some("<p>first</p>"));
    }

    #[test]
    fn probes_flat_and_bare_list() {
        assert_eq!(
            html_payload(json!({ "html": "<p>flat</p>" })).as_deref(),
            Some("<p>flat</p>")
        );
        assert_eq!(
            html_payload(json!([{ "html": "<p>listed</p>" }])).as_deref(),
            Some("<p>listed</p>")
        );
    }

    #[test]
    fn falls_back_to_content_field() {
        let v = json!({ "data": { "content": "<p>rendered</p>" } });
        assert_eq!(html_payload(v).as_deref(), Some("<p>rendered</p>"));
    }

    #[test]
    fn empty_payload_is_none() {
        assert!(html_payload(json!({ "data": { "html": "  " } })).is_none());
        assert!(html_payload(json!({ "status": "queued" })).is_none());
    }

    #[test]
    fn doc_url_prefers_top_level() {
        let doc: RenderedDoc = serde_json::from_value(json!({
            "url": "https://a/", "metadata": { "url": "https://b/" }
        }))
        .unwrap();
        assert_eq!(doc.page_url(), Some("https://a/"));
    }
}

use std::collections::{HashMap, HashSet};

use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{info, warn};

use crate::error::ScrapeError;
use crate::extract::{extract_rows, resolve_url, ScreeningRow};
use crate::fetch::{polite_delay, FetchClient};
use crate::venues::VenueSpec;

const FALLBACK_CRAWL_LIMIT: usize = 30;
const DETAIL_PROBE_CAP: usize = 8;

/// Run one venue end to end: discover candidate pages, extract rows from
/// each, dedupe locally by row id. Per-page failures are logged and skipped;
/// only a total inability to obtain candidate links is terminal.
pub async fn collect(fetcher: &FetchClient, spec: &VenueSpec) -> Result<Vec<ScreeningRow>, ScrapeError> {
    let links = discover_links(fetcher, spec).await?;
    if links.is_empty() {
        return Err(ScrapeError::Discovery(spec.slug.to_string()));
    }
    info!(venue = spec.slug, pages = links.len(), "candidate pages discovered");

    let pb = ProgressBar::new(links.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=> "),
    );
    pb.set_message(spec.slug.to_string());

    let mut visited: HashSet<String> = links.iter().cloned().collect();
    let mut all_rows = Vec::new();

    for (i, url) in links.iter().enumerate() {
        if i > 0 {
            polite_delay().await;
        }
        match fetcher.fetch(url).await {
            Ok(html) => {
                let mut rows = extract_rows(&html, url, spec.slug);
                if rows.is_empty() && spec.probe_details {
                    rows = probe_detail_pages(fetcher, spec, &html, url, &mut visited).await;
                }
                all_rows.extend(rows);
            }
            Err(e) => warn!(venue = spec.slug, url = %url, error = %e, "page skipped"),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    Ok(dedup_by_id(all_rows))
}

/// Candidate event-page URLs for the venue. Index URLs are tried in order;
/// if none of them can be fetched, fall back to provider crawl discovery.
async fn discover_links(
    fetcher: &FetchClient,
    spec: &VenueSpec,
) -> Result<Vec<String>, ScrapeError> {
    let mut first_err = None;
    for index_url in spec.index_urls {
        match fetcher.fetch(index_url).await {
            Ok(html) => {
                let mut links = harvest_links(&html, index_url, spec);
                if spec.scan_index {
                    links.insert(0, index_url.to_string());
                }
                links.truncate(spec.max_pages);
                return Ok(links);
            }
            Err(e) => {
                warn!(venue = spec.slug, url = index_url, error = %e, "index fetch failed");
                first_err.get_or_insert(e);
            }
        }
    }

    match fetcher.fallback() {
        Some(provider) => {
            let mut links = discover_via_fallback(provider, spec).await;
            links.truncate(spec.max_pages);
            if links.is_empty() {
                Err(first_err.unwrap_or_else(|| ScrapeError::Discovery(spec.slug.to_string())))
            } else {
                Ok(links)
            }
        }
        None => Err(first_err.unwrap_or_else(|| ScrapeError::Discovery(spec.slug.to_string()))),
    }
}

/// Same-domain hyperlinks matching the venue's path pattern, excluding the
/// index page itself. Insertion order preserved, duplicates dropped.
fn harvest_links(html: &str, base: &str, spec: &VenueSpec) -> Vec<String> {
    let doc = Html::parse_document(html);
    let Ok(sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let exclude = match Regex::new(spec.index_exclude) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for a in doc.select(&sel) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let Some(full) = resolve_url(href, base) else {
            continue;
        };
        if !accepts(&full, spec, &exclude) {
            continue;
        }
        if seen.insert(full.clone()) {
            links.push(full);
        }
    }
    links
}

fn accepts(url: &str, spec: &VenueSpec, exclude: &Regex) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    parsed.host_str() == Some(spec.domain)
        && parsed.path().contains(spec.link_pattern)
        && !exclude.is_match(url)
}

/// Ask the render provider to crawl the venue section and harvest links from
/// whatever it returns: reported page URLs plus any nested HTML fragments.
async fn discover_via_fallback(
    provider: &crate::fallback::RenderFallback,
    spec: &VenueSpec,
) -> Vec<String> {
    let docs = match provider.crawl(spec.section_url, FALLBACK_CRAWL_LIMIT).await {
        Ok(docs) => docs,
        Err(e) => {
            warn!(venue = spec.slug, error = %e, "fallback discovery failed");
            return Vec::new();
        }
    };

    let exclude = match Regex::new(spec.index_exclude) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for doc in docs {
        if let Some(page_url) = doc.page_url() {
            if accepts(page_url, spec, &exclude) && seen.insert(page_url.to_string()) {
                links.push(page_url.to_string());
            }
        }
        let base = doc.page_url().unwrap_or(spec.section_url).to_string();
        if let Some(fragment) = doc.html.as_deref().or(doc.content.as_deref()) {
            for link in harvest_links(fragment, &base, spec) {
                if seen.insert(link.clone()) {
                    links.push(link);
                }
            }
        }
    }
    info!(venue = spec.slug, count = links.len(), "fallback discovery collected links");
    links
}

/// A listing card without inline date/time data usually links to a detail
/// page that has it. Follow those links once, bounded, no recursion.
async fn probe_detail_pages(
    fetcher: &FetchClient,
    spec: &VenueSpec,
    listing_html: &str,
    listing_url: &str,
    visited: &mut HashSet<String>,
) -> Vec<ScreeningRow> {
    let candidates: Vec<String> = harvest_links(listing_html, listing_url, spec)
        .into_iter()
        .filter(|l| !visited.contains(l))
        .take(DETAIL_PROBE_CAP)
        .collect();

    let mut rows = Vec::new();
    for url in candidates {
        visited.insert(url.clone());
        polite_delay().await;
        match fetcher.fetch(&url).await {
            Ok(html) => rows.extend(extract_rows(&html, &url, spec.slug)),
            Err(e) => warn!(venue = spec.slug, url = %url, error = %e, "detail page skipped"),
        }
    }
    rows
}

/// Local dedup by row id, last observation wins, original order kept.
pub fn dedup_by_id(rows: Vec<ScreeningRow>) -> Vec<ScreeningRow> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<ScreeningRow> = Vec::new();
    for row in rows {
        match index.get(&row.id) {
            Some(&i) => out[i] = row,
            None => {
                index.insert(row.id.clone(), out.len());
                out.push(row);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venues::venue_spec;
    use chrono::{TimeZone, Utc};

    #[test]
    fn harvest_filters_domain_pattern_and_index() {
        let spec = venue_spec("ica").unwrap();
        let html = r#"<html><body>
            <a href="/whats-on/la-chimera">La Chimera</a>
            <a href="/whats-on/la-chimera">dup</a>
            <a href="https://www.ica.art/whats-on/cinema">index itself</a>
            <a href="https://elsewhere.test/whats-on/other">other domain</a>
            <a href="/about">wrong path</a>
        </body></html>"#;
        let links = harvest_links(html, "https://www.ica.art/whats-on/cinema", spec);
        assert_eq!(links, vec!["https://www.ica.art/whats-on/la-chimera"]);
    }

    #[test]
    fn dedup_keeps_last_observation() {
        let t = Utc.with_ymd_and_hms(2025, 8, 19, 15, 10, 0).unwrap();
        let a = ScreeningRow::new("ica", "Mirror", t, "https://a/1".into(), "https://a");
        let mut b = a.clone();
        b.booking_url = "https://a/2".into();
        let out = dedup_by_id(vec![a, b]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].booking_url, "https://a/2");
    }
}

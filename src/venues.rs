/// Fixed venue-slug → display-name table. Every registered venue appears
/// here even when no collector ships for it yet; the persistence gateway
/// falls back to the raw slug for anything unmapped.
pub const CINEMA_NAMES: &[(&str, &str)] = &[
    ("ica", "ICA"),
    ("bfi-southbank", "BFI Southbank"),
    ("genesis", "Genesis Cinema"),
    ("rio", "Rio Cinema"),
    ("the-nickel", "The Nickel Cinema"),
    ("picturehouse-central", "Picturehouse Central"),
];

pub fn cinema_name(slug: &str) -> &str {
    CINEMA_NAMES
        .iter()
        .find(|(s, _)| *s == slug)
        .map(|(_, name)| *name)
        .unwrap_or(slug)
}

/// Per-venue collector configuration: where to find the index, which links
/// on it are event pages, and how the venue behaves when listings lack
/// inline data.
pub struct VenueSpec {
    pub slug: &'static str,
    /// Candidate index pages, tried in order.
    pub index_urls: &'static [&'static str],
    /// Host the venue's event pages live on.
    pub domain: &'static str,
    /// Path substring a candidate link must contain.
    pub link_pattern: &'static str,
    /// Regex excluding the index page itself from the candidate set.
    pub index_exclude: &'static str,
    /// Seed URL for render-fallback crawl discovery.
    pub section_url: &'static str,
    /// Hard cap on candidate pages per run.
    pub max_pages: usize,
    /// Also run the extractor over the index page itself.
    pub scan_index: bool,
    /// When a listing page yields nothing, follow its detail links once.
    pub probe_details: bool,
}

pub const VENUES: &[VenueSpec] = &[
    VenueSpec {
        slug: "ica",
        index_urls: &["https://www.ica.art/whats-on/cinema"],
        domain: "www.ica.art",
        link_pattern: "/whats-on/",
        index_exclude: r"/whats-on/cinema/?$",
        section_url: "https://www.ica.art/whats-on",
        max_pages: 200,
        scan_index: false,
        probe_details: false,
    },
    VenueSpec {
        slug: "bfi-southbank",
        index_urls: &[
            "https://whatson.bfi.org.uk/southbank/Calendar",
            "https://whatson.bfi.org.uk/southbank/",
            "https://whatson.bfi.org.uk/",
        ],
        domain: "whatson.bfi.org.uk",
        link_pattern: "/southbank/",
        index_exclude: r"(?i)/southbank/Calendar(/|$)",
        section_url: "https://whatson.bfi.org.uk/southbank/",
        max_pages: 250,
        scan_index: true,
        probe_details: true,
    },
];

pub fn venue_spec(slug: &str) -> Option<&'static VenueSpec> {
    VENUES.iter().find(|v| v.slug == slug)
}

pub fn venue_slugs() -> Vec<&'static str> {
    VENUES.iter().map(|v| v.slug).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_table_falls_back_to_slug() {
        assert_eq!(cinema_name("ica"), "ICA");
        assert_eq!(cinema_name("bfi-southbank"), "BFI Southbank");
        assert_eq!(cinema_name("unknown-venue"), "unknown-venue");
    }

    #[test]
    fn every_collector_venue_is_named() {
        for spec in VENUES {
            assert_ne!(cinema_name(spec.slug), spec.slug);
        }
    }
}

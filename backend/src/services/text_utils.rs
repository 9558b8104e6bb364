//! Title normalization and comparison utilities
//!
//! Shared by the metadata resolver (cleaning up host titles) and the catalog
//! client (cleaning up search result titles before matching).

use once_cell::sync::Lazy;
use regex::Regex;

/// `S01E02`, `s1e2`, `S01.E02`
static SXXEXX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[\s._-]*\bS\d{1,2}[\s._-]?E\d{1,3}\b.*$").expect("valid regex"));

/// `1x02`
static NXNN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[\s._-]*\b\d{1,2}x\d{2,3}\b.*$").expect("valid regex"));

/// `Season 1 Episode 2`, `Season 1`, `Episode 2`
static VERBOSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[\s._:-]*\b(?:Season|Series)\s*\d+.*$|[\s._:-]*\bEpisode\s*\d+.*$")
        .expect("valid regex")
});

/// Edition/format noise a catalog appends to product titles
static EDITION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\s*[(\[]?\b(?:4K(?:\s*Ultra\s*HD)?|Ultra\s*HD|UHD|Blu[-\s]?ray(?:\s*3D)?|3D|DVD|Digital(?:\s*HD)?|Steelbook|Collector'?s\s+Edition|Limited\s+Edition|Special\s+Edition)\b[)\]]?",
    )
    .expect("valid regex")
});

/// `(2021)`. Bare trailing numbers are left alone ("Blade Runner 2049").
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\d{4})\)").expect("valid regex"));

/// Normalize a title for matching.
/// Lowercases, drops apostrophes, folds punctuation to spaces and collapses whitespace.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .replace('&', " and ")
        .replace(['\'', '\u{2019}'], "")
        .replace([':', '-', '.', '_', ',', '!', '?', '/'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity of two titles after normalization (0.0 to 1.0)
pub fn title_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&normalize_title(a), &normalize_title(b))
}

/// Remove trailing season/episode qualifiers from a label.
///
/// "Example Show S01E01 Pilot" becomes "Example Show". Returns the trimmed
/// input unchanged when no qualifier is present.
pub fn strip_episode_qualifiers(label: &str) -> String {
    let mut cleaned = label.trim().to_string();
    for re in [&*SXXEXX_RE, &*NXNN_RE, &*VERBOSE_RE] {
        if let Some(m) = re.find(&cleaned) {
            // Never strip the whole label
            if m.start() > 0 {
                cleaned.truncate(m.start());
            }
        }
    }
    cleaned
        .trim()
        .trim_end_matches(|c: char| c == '-' || c == ':' || c == '.' || c == ',')
        .trim()
        .to_string()
}

/// Remove edition/format suffixes ("Blu-ray", "4K", "Steelbook"...) from a catalog title
pub fn strip_edition(title: &str) -> String {
    EDITION_RE
        .replace_all(title, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a plausible release year off a title: "Dune (2021)" -> ("Dune", Some(2021))
pub fn split_year(title: &str) -> (String, Option<u16>) {
    let Some(caps) = YEAR_RE.captures(title) else {
        return (title.trim().to_string(), None);
    };
    let Some(m) = caps.get(1) else {
        return (title.trim().to_string(), None);
    };
    let Some(year) = parse_year(m.as_str()) else {
        return (title.trim().to_string(), None);
    };

    let Some(whole) = caps.get(0) else {
        return (title.trim().to_string(), Some(year));
    };
    let mut rest = String::with_capacity(title.len());
    rest.push_str(&title[..whole.start()]);
    rest.push_str(&title[whole.end()..]);
    let rest = rest.split_whitespace().collect::<Vec<_>>().join(" ");

    // "(1917)" alone is a title, not a year
    if rest.is_empty() {
        return (title.trim().to_string(), None);
    }
    (rest, Some(year))
}

/// Parse a four-digit year in the range cinema could plausibly have
pub fn parse_year(raw: &str) -> Option<u16> {
    raw.trim()
        .get(..4)
        .and_then(|y| y.parse::<u16>().ok())
        .filter(|y| (1880..=2100).contains(y))
}

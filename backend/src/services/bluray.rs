//! Aspect-ratio lookup against blu-ray.com
//!
//! The video file does not reliably say what its real picture shape is, so
//! the ratio is scraped from the catalog's product page:
//!
//! 1. Quick-search for "title year".
//! 2. Collect every product link (`/movies/<slug>/<id>/`) as a candidate.
//! 3. Pick the best candidate by title (and year, when known).
//! 4. Read `Aspect ratio: 2.39:1` from that candidate's page.
//!
//! Every failure, whether network, HTTP status, markup drift or no match,
//! collapses to [`LookupOutcome::NotFound`] at the [`AspectRatioLookup`]
//! boundary. Callers only ever see a ratio or nothing.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use super::rate_limiter::{RateLimitedClient, RetryConfig, retry_async};
use super::text_utils::{
    normalize_title, split_year, strip_edition, strip_episode_qualifiers, title_similarity,
};
use crate::error::{AutofitError, AutofitResult};
use crate::media::{AspectRatioResult, MediaIdentity, MediaKind, parse_ratio};

pub const DEFAULT_BASE_URL: &str = "https://www.blu-ray.com";

/// The catalog blocks obvious bots; look like a browser.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Product pages live at `/movies/<slug>/<numeric id>/`
static PRODUCT_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/movies/([^/?#]+)/(\d+)/?").expect("valid regex"));

static ASPECT_RATIO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)aspect\s+ratio\s*:?\s*(\d+(?:\.\d+)?\s*:\s*\d+(?:\.\d+)?)")
        .expect("valid regex")
});

static BARE_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("valid regex"));

/// Wrapper levels climbed when looking for a year printed beside a link
const YEAR_SEARCH_DEPTH: usize = 3;

static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Result of a lookup as seen by callers
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LookupOutcome {
    Found(AspectRatioResult),
    NotFound,
}

/// Anything that can turn an identity into an aspect ratio
#[async_trait]
pub trait AspectRatioLookup: Send + Sync {
    /// Never fails: every problem is reported as [`LookupOutcome::NotFound`].
    async fn lookup(&self, identity: &MediaIdentity) -> LookupOutcome;
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    /// Country filter for the quick search (`US`, `UK`, `all`...)
    pub country: String,
    pub user_agent: String,
    /// Timeout for each HTTP request
    pub request_timeout: Duration,
    /// Hard ceiling for the whole lookup (search + detail, retries included)
    pub lookup_timeout: Duration,
    pub retry: RetryConfig,
    /// Minimum normalized similarity for a non-exact title match; 1.0 disables fuzzy matching
    pub min_title_similarity: f64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            country: "US".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(10),
            lookup_timeout: Duration::from_secs(15),
            retry: RetryConfig::default(),
            min_title_similarity: 0.85,
        }
    }
}

/// A product link found on the search page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub title: String,
    pub year: Option<u16>,
    pub url: String,
}

/// Confidence class of a candidate, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchClass {
    /// Same title, and same year when the identity has one
    Exact,
    /// Same title, year not confirmed
    TitleOnly,
    /// Title similar enough to pass the fuzzy threshold
    Similar,
}

#[derive(Debug, Clone, Copy)]
pub struct CandidateMatch<'a> {
    pub candidate: &'a Candidate,
    pub class: MatchClass,
    pub similarity: f64,
    pub year_confirmed: bool,
}

/// blu-ray.com scraper
pub struct BlurayClient {
    client: Arc<RateLimitedClient>,
    config: CatalogConfig,
}

impl BlurayClient {
    pub fn new(config: CatalogConfig) -> anyhow::Result<Self> {
        let client = RateLimitedClient::for_catalog(&config.user_agent, config.request_timeout)?;
        Ok(Self {
            client: Arc::new(client),
            config,
        })
    }

    /// Quick-search URL for an identity
    pub fn search_url(&self, identity: &MediaIdentity) -> AutofitResult<Url> {
        let base = Url::parse(&self.config.base_url)
            .and_then(|base| base.join("/search/"))
            .map_err(|e| AutofitError::LookupUnavailable(format!("invalid catalog URL: {}", e)))?;

        Url::parse_with_params(
            base.as_str(),
            &[
                ("quicksearch", "1"),
                ("quicksearch_country", self.config.country.as_str()),
                ("quicksearch_keyword", identity.search_query().as_str()),
                ("section", "all"),
            ],
        )
        .map_err(|e| AutofitError::LookupUnavailable(format!("invalid search URL: {}", e)))
    }

    async fn fetch(&self, url: &str, operation: &str) -> AutofitResult<String> {
        let client = self.client.clone();
        retry_async(
            || {
                let client = client.clone();
                let url = url.to_string();
                async move { client.get_text(&url).await }
            },
            &self.config.retry,
            operation,
        )
        .await
        .map_err(|e| AutofitError::LookupUnavailable(format!("{:#}", e)))
    }

    /// Full lookup with causes kept apart, for logging
    pub async fn try_lookup(&self, identity: &MediaIdentity) -> AutofitResult<f64> {
        if identity.title.trim().is_empty() {
            return Err(AutofitError::LookupNoMatch("empty title".to_string()));
        }

        let search_url = self.search_url(identity)?;
        info!(query = %identity.search_query(), "Searching catalog for aspect ratio");

        let search_html = self.fetch(search_url.as_str(), "catalog_search").await?;
        let candidates = parse_search_results(&search_html, &search_url);
        debug!(count = candidates.len(), "Catalog search returned candidates");

        let best = best_match(identity, &candidates, self.config.min_title_similarity)
            .ok_or_else(|| {
                AutofitError::LookupNoMatch(format!(
                    "{} candidates, none matched '{}'",
                    candidates.len(),
                    identity.title
                ))
            })?;

        info!(
            candidate = %best.candidate.title,
            year = ?best.candidate.year,
            class = ?best.class,
            similarity = best.similarity,
            url = %best.candidate.url,
            "Selected catalog entry"
        );

        let detail_html = self.fetch(&best.candidate.url, "catalog_detail").await?;
        parse_aspect_ratio(&detail_html).ok_or_else(|| {
            AutofitError::LookupNoMatch(format!("no aspect ratio on {}", best.candidate.url))
        })
    }
}

#[async_trait]
impl AspectRatioLookup for BlurayClient {
    async fn lookup(&self, identity: &MediaIdentity) -> LookupOutcome {
        match tokio::time::timeout(self.config.lookup_timeout, self.try_lookup(identity)).await {
            Ok(Ok(ratio)) => {
                info!(identity = %identity, ratio = ratio, "Catalog aspect ratio found");
                LookupOutcome::Found(AspectRatioResult::looked_up(ratio))
            }
            Ok(Err(e)) => {
                warn!(identity = %identity, error = %e, "Catalog lookup failed");
                LookupOutcome::NotFound
            }
            Err(_) => {
                let e = AutofitError::LookupUnavailable(format!(
                    "timed out after {:?}",
                    self.config.lookup_timeout
                ));
                warn!(identity = %identity, error = %e, "Catalog lookup failed");
                LookupOutcome::NotFound
            }
        }
    }
}

/// Extract product candidates from a search result page.
///
/// Relative links are resolved against `page_url`. A URL that appears more
/// than once (image link + text link) yields one candidate.
pub fn parse_search_results(html: &str, page_url: &Url) -> Vec<Candidate> {
    let document = Html::parse_document(html);
    let mut candidates: Vec<Candidate> = Vec::new();

    for anchor in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(url) = page_url.join(href) else {
            continue;
        };
        let Some(caps) = PRODUCT_PATH_RE.captures(url.path()) else {
            continue;
        };
        let slug = caps.get(1).map(|m| m.as_str()).unwrap_or_default();

        let Some(candidate) = candidate_from_anchor(anchor, slug, url.as_str()) else {
            continue;
        };

        match candidates.iter_mut().find(|c| c.url == candidate.url) {
            Some(existing) => {
                if existing.year.is_none() {
                    existing.year = candidate.year;
                }
            }
            None => candidates.push(candidate),
        }
    }

    candidates
}

fn candidate_from_anchor(anchor: ElementRef<'_>, slug: &str, url: &str) -> Option<Candidate> {
    let text = anchor.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

    let raw_title = anchor
        .value()
        .attr("title")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| (!text.is_empty()).then(|| text.clone()))
        .unwrap_or_else(|| slug.replace('-', " "));

    let (title, mut year) = split_year(&raw_title);
    let title = strip_edition(&title);
    if title.is_empty() {
        return None;
    }

    // Result rows often print the year next to the link rather than inside it
    if year.is_none() {
        year = year_near(anchor);
    }

    Some(Candidate {
        title,
        year,
        url: url.to_string(),
    })
}

/// First bare year printed after the anchor and before any link to another
/// product. Climbs a few levels when the anchor is wrapped.
fn year_near(anchor: ElementRef<'_>) -> Option<u16> {
    let href = anchor.value().attr("href").unwrap_or_default();
    let mut node = *anchor;

    for _ in 0..YEAR_SEARCH_DEPTH {
        for sibling in node.next_siblings() {
            if let Some(element) = ElementRef::wrap(sibling) {
                if links_to_other_product(element, href) {
                    return None;
                }
                let text = element.text().collect::<Vec<_>>().join(" ");
                if let Some(year) = first_year(&text) {
                    return Some(year);
                }
            } else if let Some(text) = sibling.value().as_text() {
                if let Some(year) = first_year(text) {
                    return Some(year);
                }
            }
        }
        node = node.parent()?;
    }

    None
}

fn links_to_other_product(element: ElementRef<'_>, href: &str) -> bool {
    std::iter::once(element)
        .filter(|e| e.value().name() == "a")
        .chain(element.select(&ANCHOR_SELECTOR))
        .filter_map(|a| a.value().attr("href"))
        .any(|other| other != href && PRODUCT_PATH_RE.is_match(other))
}

fn first_year(text: &str) -> Option<u16> {
    BARE_YEAR_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Choose the most confident candidate for an identity.
///
/// Classes rank `Exact` > `TitleOnly` > `Similar`; within a class higher
/// similarity wins, then a confirmed year, then page order.
pub fn best_match<'a>(
    identity: &MediaIdentity,
    candidates: &'a [Candidate],
    min_similarity: f64,
) -> Option<CandidateMatch<'a>> {
    let wanted = normalize_title(&identity.title);
    let mut best: Option<CandidateMatch<'a>> = None;

    for candidate in candidates {
        // Series box sets are listed as "Show: Season 1"
        let candidate_title = match identity.kind {
            MediaKind::Episode => strip_episode_qualifiers(&candidate.title),
            MediaKind::Movie => candidate.title.clone(),
        };

        let year_confirmed = matches!(
            (identity.year, candidate.year),
            (Some(wanted_year), Some(year)) if wanted_year == year
        );
        let similarity = title_similarity(&identity.title, &candidate_title);

        let class = if normalize_title(&candidate_title) == wanted {
            if identity.year.is_none() || year_confirmed {
                MatchClass::Exact
            } else {
                MatchClass::TitleOnly
            }
        } else if similarity >= min_similarity {
            MatchClass::Similar
        } else {
            continue;
        };

        let current = CandidateMatch {
            candidate,
            class,
            similarity,
            year_confirmed,
        };

        best = match best {
            Some(previous) if rank(&previous, &current) != Ordering::Greater => Some(previous),
            _ => Some(current),
        };
    }

    best
}

/// `Less` means `a` is the better match
fn rank(a: &CandidateMatch<'_>, b: &CandidateMatch<'_>) -> Ordering {
    a.class
        .cmp(&b.class)
        .then_with(|| b.similarity.total_cmp(&a.similarity))
        .then_with(|| b.year_confirmed.cmp(&a.year_confirmed))
}

/// Read the declared aspect ratio from a product page (`Aspect ratio: 2.39:1`)
pub fn parse_aspect_ratio(html: &str) -> Option<f64> {
    let document = Html::parse_document(html);
    let text = document.root_element().text().collect::<Vec<_>>().join(" ");

    ASPECT_RATIO_RE
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_ratio(m.as_str()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const SEARCH_PAGE: &str = r#"
        <html><body>
          <a href="https://www.blu-ray.com/">Home</a>
          <a href="/movies/search.php?keyword=dune">More results</a>
          <div class="result">
            <a href="https://www.blu-ray.com/movies/Dune-4K-Blu-ray/296043/"><img src="x.jpg"></a>
            <a href="https://www.blu-ray.com/movies/Dune-4K-Blu-ray/296043/" title="Dune 4K (Blu-ray)">Dune 4K</a>
            <span>2021</span>
          </div>
          <div class="result">
            <a href="/movies/Dune-Blu-ray/8562/" title="Dune (1984)">Dune</a>
          </div>
          <div class="result">
            <a href="/movies/Dune-Part-Two-Blu-ray/351246/">Dune: Part Two (2024)</a>
          </div>
        </body></html>
    "#;

    fn page_url() -> Url {
        Url::parse("https://www.blu-ray.com/search/?quicksearch=1").unwrap()
    }

    fn candidate(title: &str, year: Option<u16>, id: u32) -> Candidate {
        Candidate {
            title: title.to_string(),
            year,
            url: format!("https://www.blu-ray.com/movies/x/{}/", id),
        }
    }

    #[test]
    fn test_parse_search_results() {
        let candidates = parse_search_results(SEARCH_PAGE, &page_url());

        assert_eq!(
            candidates,
            vec![
                Candidate {
                    title: "Dune".to_string(),
                    year: Some(2021),
                    url: "https://www.blu-ray.com/movies/Dune-4K-Blu-ray/296043/".to_string(),
                },
                Candidate {
                    title: "Dune".to_string(),
                    year: Some(1984),
                    url: "https://www.blu-ray.com/movies/Dune-Blu-ray/8562/".to_string(),
                },
                Candidate {
                    title: "Dune: Part Two".to_string(),
                    year: Some(2024),
                    url: "https://www.blu-ray.com/movies/Dune-Part-Two-Blu-ray/351246/"
                        .to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_years_stay_with_their_own_result() {
        let html = r#"<div>
            <a href="/movies/Dune-Blu-ray/1/">Dune</a> 1984
            <a href="/movies/Dune-4K-Blu-ray/2/">Dune</a> 2021
            <a href="/movies/Dune-Extended-Blu-ray/3/">Dune</a>
            <a href="/movies/Dune-Part-Two-Blu-ray/4/">Dune: Part Two</a> 2024
        </div>"#;
        let candidates = parse_search_results(html, &page_url());

        let years: Vec<Option<u16>> = candidates.iter().map(|c| c.year).collect();
        assert_eq!(years, vec![Some(1984), Some(2021), None, Some(2024)]);

        let identity = MediaIdentity::new("Dune", Some(2021), MediaKind::Movie);
        let best = best_match(&identity, &candidates, 0.85).unwrap();
        assert_eq!(best.class, MatchClass::Exact);
        assert_eq!(best.candidate.url, "https://www.blu-ray.com/movies/Dune-4K-Blu-ray/2/");
    }

    #[test]
    fn test_year_beside_wrapped_link() {
        let html = r#"<table>
            <tr><td><a href="/movies/Heat-Blu-ray/7/">Heat</a></td><td>1995</td></tr>
            <tr><td><a href="/movies/Ronin-Blu-ray/8/">Ronin</a></td><td>1998</td></tr>
        </table>"#;
        let candidates = parse_search_results(html, &page_url());

        let years: Vec<Option<u16>> = candidates.iter().map(|c| c.year).collect();
        assert_eq!(years, vec![Some(1995), Some(1998)]);
    }

    #[test]
    fn test_parse_search_results_ignores_unrelated_markup() {
        let page_url = page_url();
        assert!(parse_search_results("<html><body>No results</body></html>", &page_url).is_empty());
        assert!(parse_search_results("not html at all {{{", &page_url).is_empty());
    }

    #[test]
    fn test_exact_match_requires_year() {
        let candidates = vec![
            candidate("Dune", Some(1984), 1),
            candidate("Dune", Some(2021), 2),
        ];
        let identity = MediaIdentity::new("Dune", Some(2021), MediaKind::Movie);

        let best = best_match(&identity, &candidates, 0.85).unwrap();
        assert_eq!(best.class, MatchClass::Exact);
        assert_eq!(best.candidate.year, Some(2021));
    }

    #[test]
    fn test_title_only_match_when_year_differs() {
        let candidates = vec![candidate("Dune", Some(1984), 1)];
        let identity = MediaIdentity::new("Dune", Some(2021), MediaKind::Movie);

        let best = best_match(&identity, &candidates, 0.85).unwrap();
        assert_eq!(best.class, MatchClass::TitleOnly);
    }

    #[test]
    fn test_exact_match_without_year_takes_first() {
        let candidates = vec![
            candidate("Heat", Some(1995), 1),
            candidate("Heat", Some(1986), 2),
        ];
        let identity = MediaIdentity::new("heat", None, MediaKind::Movie);

        let best = best_match(&identity, &candidates, 0.85).unwrap();
        assert_eq!(best.class, MatchClass::Exact);
        assert_eq!(best.candidate.year, Some(1995));
    }

    #[test]
    fn test_fuzzy_match_threshold() {
        let candidates = vec![candidate("The Batmen", Some(2022), 1)];
        let identity = MediaIdentity::new("The Batman", Some(2022), MediaKind::Movie);

        let best = best_match(&identity, &candidates, 0.85).unwrap();
        assert_eq!(best.class, MatchClass::Similar);
        assert!(best.year_confirmed);

        assert!(best_match(&identity, &candidates, 1.0).is_none());
    }

    #[test]
    fn test_no_match_below_threshold() {
        let candidates = vec![candidate("Aliens vs Predator", Some(2004), 1)];
        let identity = MediaIdentity::new("Alien", Some(1979), MediaKind::Movie);

        assert!(best_match(&identity, &candidates, 0.85).is_none());
    }

    #[test]
    fn test_episode_matches_series_box_set() {
        let candidates = vec![
            candidate("Other Show: Season 1", None, 1),
            candidate("Example Show: Season 1", None, 2),
        ];
        let identity = MediaIdentity::new("Example Show", None, MediaKind::Episode);

        let best = best_match(&identity, &candidates, 0.85).unwrap();
        assert_eq!(best.class, MatchClass::Exact);
        assert_eq!(best.candidate.title, "Example Show: Season 1");
    }

    #[test]
    fn test_parse_aspect_ratio() {
        let page = r#"<div id="shortreview">Video<br>Codec: HEVC / H.265<br>
            Resolution: Native 4K (2160p)<br>Aspect ratio: 2.39:1<br>Original aspect ratio: 2.39:1</div>"#;
        assert_eq!(parse_aspect_ratio(page), Some(2.39));

        let split = "<td>Aspect ratio:</td><td>1.85:1</td>";
        assert_eq!(parse_aspect_ratio(split), Some(1.85));

        let tv = "<p>Aspect ratio: 16:9</p>";
        assert!((parse_aspect_ratio(tv).unwrap() - 16.0 / 9.0).abs() < 1e-9);

        assert_eq!(parse_aspect_ratio("<p>Resolution: 1080p</p>"), None);
        assert_eq!(parse_aspect_ratio("<p>Aspect ratio: unknown</p>"), None);
    }

    #[test]
    fn test_search_url_contains_series_title_only() {
        let client = BlurayClient::new(CatalogConfig::default()).unwrap();
        let identity = MediaIdentity::new("Example Show", None, MediaKind::Episode);

        let url = client.search_url(&identity).unwrap();
        let keyword = url
            .query_pairs()
            .find(|(k, _)| k == "quicksearch_keyword")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        assert_eq!(keyword, "Example Show");
        assert!(!url.as_str().contains("Pilot"));
        assert_eq!(url.path(), "/search/");
    }
}

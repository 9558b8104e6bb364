//! Identity of the item being played and the aspect ratio resolved for it

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ratio assumed for a movie when the catalog has nothing (scope, 2.39:1)
pub const MOVIE_FALLBACK_RATIO: f64 = 2.39;

/// Ratio assumed for an episode when the catalog has nothing (16:9)
pub const EPISODE_FALLBACK_RATIO: f64 = 16.0 / 9.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Episode,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Episode => "episode",
        }
    }

    /// Map a host item type (`movie`, `episode`, `tvshow`...) to a kind.
    ///
    /// Returns `None` for types that carry no video kind (e.g. `unknown`, `song`).
    pub fn from_item_type(item_type: &str) -> Option<Self> {
        match item_type.trim().to_lowercase().as_str() {
            "movie" | "movies" => Some(Self::Movie),
            "episode" | "episodes" | "tvshow" | "tv" | "season" => Some(Self::Episode),
            _ => None,
        }
    }

    /// Fallback ratio for this kind
    pub fn fallback_ratio(&self) -> f64 {
        match self {
            Self::Movie => MOVIE_FALLBACK_RATIO,
            Self::Episode => EPISODE_FALLBACK_RATIO,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalized identity used for the catalog lookup.
///
/// For episodes `title` is the series title, never the episode title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaIdentity {
    pub title: String,
    pub year: Option<u16>,
    pub kind: MediaKind,
}

impl MediaIdentity {
    pub fn new(title: impl Into<String>, year: Option<u16>, kind: MediaKind) -> Self {
        Self {
            title: title.into(),
            year,
            kind,
        }
    }

    /// Free-text catalog query: the title, followed by the year when known
    pub fn search_query(&self) -> String {
        match self.year {
            Some(year) => format!("{} {}", self.title, year),
            None => self.title.clone(),
        }
    }
}

impl fmt::Display for MediaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.year {
            Some(year) => write!(f, "{} ({}) [{}]", self.title, year, self.kind),
            None => write!(f, "{} [{}]", self.title, self.kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioSource {
    LookedUp,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AspectRatioResult {
    pub ratio: f64,
    pub source: RatioSource,
}

impl AspectRatioResult {
    pub fn looked_up(ratio: f64) -> Self {
        Self {
            ratio,
            source: RatioSource::LookedUp,
        }
    }

    /// Fallback for a kind. An unknown kind gets the episode (16:9) ratio.
    pub fn fallback(kind: Option<MediaKind>) -> Self {
        Self {
            ratio: kind.unwrap_or(MediaKind::Episode).fallback_ratio(),
            source: RatioSource::Fallback,
        }
    }
}

/// Parse a declared ratio such as `2.39:1`, `16:9` or a bare `1.85`.
///
/// Rejects anything that is not a finite ratio in (0, 10].
pub fn parse_ratio(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let ratio = match raw.split_once(':') {
        Some((width, height)) => {
            let width: f64 = width.trim().parse().ok()?;
            let height: f64 = height.trim().parse().ok()?;
            if height <= 0.0 {
                return None;
            }
            width / height
        }
        None => raw.parse().ok()?,
    };

    (ratio.is_finite() && ratio > 0.0 && ratio <= 10.0).then_some(ratio)
}

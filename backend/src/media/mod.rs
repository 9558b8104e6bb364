//! Media identity, aspect ratios and the zoom calculation

pub mod identity;
pub mod zoom;

pub use identity::{
    AspectRatioResult, EPISODE_FALLBACK_RATIO, MOVIE_FALLBACK_RATIO, MediaIdentity, MediaKind,
    RatioSource, parse_ratio,
};
pub use zoom::{CONTAINER_RATIO, ZoomAdjustment, ZoomCalculator, compute};

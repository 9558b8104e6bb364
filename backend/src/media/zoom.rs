//! Vertical zoom / pixel ratio calculation
//!
//! The content is assumed to be stored in a 16:9 container with black bars
//! baked in whenever it is wider than the container. The calculation:
//!
//! 1. Vertical zoom removes exactly those bars: `content / container`, or 1.0
//!    when the content already fills the container height. Nothing but padding
//!    is ever cropped.
//! 2. If the content is at least as wide as the screen, the pixel ratio stays
//!    1.0 (the picture is kept whole rather than filling the screen).
//! 3. Otherwise the pixel ratio stretches the image horizontally by
//!    `screen / content` so it covers the full screen width.
//!
//! Inputs outside `[1.0, 4.0]` short-circuit to the identity adjustment.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AutofitError, AutofitResult};

/// Aspect ratio of the container the content is encoded in (16:9)
pub const CONTAINER_RATIO: f64 = 16.0 / 9.0;

/// Narrowest ratio accepted by the calculator
pub const MIN_RATIO: f64 = 1.0;

/// Widest ratio accepted by the calculator
pub const MAX_RATIO: f64 = 4.0;

/// Ratios closer than this are treated as equal. Catalog ratios carry two
/// decimals (2.39 vs a 2.40 screen, 1.78 vs 16:9).
pub const MATCH_TOLERANCE: f64 = 0.01;

/// Slack for float noise when comparing against the tolerance
const EPSILON: f64 = 1e-9;

/// Multiplicative vertical stretch plus horizontal pixel-aspect correction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomAdjustment {
    pub vertical_zoom: f64,
    pub pixel_ratio: f64,
}

impl ZoomAdjustment {
    /// No adjustment. Applied on stop so nothing outlives its playback.
    pub const IDENTITY: Self = Self {
        vertical_zoom: 1.0,
        pixel_ratio: 1.0,
    };

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Aspect ratio the content is shown at once this adjustment is applied
    pub fn visible_ratio(&self, content_ratio: f64) -> f64 {
        content_ratio * self.pixel_ratio
    }
}

impl Default for ZoomAdjustment {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ZoomCalculator {
    container_ratio: f64,
    tolerance: f64,
}

impl Default for ZoomCalculator {
    fn default() -> Self {
        Self {
            container_ratio: CONTAINER_RATIO,
            tolerance: MATCH_TOLERANCE,
        }
    }
}

impl ZoomCalculator {
    /// Calculator for content stored in a container other than 16:9
    pub fn with_container(container_ratio: f64) -> Self {
        Self {
            container_ratio,
            ..Self::default()
        }
    }

    /// Largest vertical zoom this calculator can produce
    pub fn max_vertical_zoom(&self) -> f64 {
        MAX_RATIO / self.container_ratio
    }

    /// Compute the adjustment, rejecting ratios outside the sane range.
    ///
    /// `try_compute(r, r)` is the identity only while `r` fits the container.
    /// Wider content still gets the vertical zoom that removes its bars.
    pub fn try_compute(&self, content: f64, screen: f64) -> AutofitResult<ZoomAdjustment> {
        if !in_range(content) || !in_range(screen) || !in_range(self.container_ratio) {
            return Err(AutofitError::InvalidRatioInput { content, screen });
        }

        let vertical_zoom = if content - self.container_ratio > self.tolerance + EPSILON {
            (content / self.container_ratio).min(self.max_vertical_zoom())
        } else {
            1.0
        };

        let pixel_ratio = if screen - content <= self.tolerance + EPSILON {
            1.0
        } else {
            screen / content
        };

        Ok(ZoomAdjustment {
            vertical_zoom,
            pixel_ratio,
        })
    }

    /// Compute the adjustment; invalid input yields the identity.
    ///
    /// Equal content and screen ratios give `pixel_ratio == 1.0` but a
    /// vertical zoom above 1.0 once they exceed the container ratio.
    pub fn compute(&self, content: f64, screen: f64) -> ZoomAdjustment {
        match self.try_compute(content, screen) {
            Ok(adjustment) => {
                debug!(
                    content_ratio = content,
                    screen_ratio = screen,
                    vertical_zoom = adjustment.vertical_zoom,
                    pixel_ratio = adjustment.pixel_ratio,
                    "Computed zoom adjustment"
                );
                adjustment
            }
            Err(e) => {
                warn!(error = %e, "Refusing degenerate zoom, using identity");
                ZoomAdjustment::IDENTITY
            }
        }
    }
}

/// Compute the adjustment for content in a 16:9 container
pub fn compute(content: f64, screen: f64) -> ZoomAdjustment {
    ZoomCalculator::default().compute(content, screen)
}

fn in_range(ratio: f64) -> bool {
    ratio.is_finite() && (MIN_RATIO..=MAX_RATIO).contains(&ratio)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const TOL: f64 = 1e-6;

    fn ratios() -> impl Iterator<Item = f64> {
        (100..=400).step_by(7).map(|r| r as f64 / 100.0)
    }

    #[test]
    fn test_scope_on_wide_screen() {
        let adj = compute(2.39, 2.40);
        assert!((adj.vertical_zoom - 2.39 / CONTAINER_RATIO).abs() < TOL);
        assert_eq!(adj.pixel_ratio, 1.0);
    }

    #[test]
    fn test_sixteen_nine_on_wide_screen() {
        let adj = compute(1.78, 2.40);
        assert_eq!(adj.vertical_zoom, 1.0);
        assert!((adj.pixel_ratio - 2.40 / 1.78).abs() < TOL);
        assert!((adj.pixel_ratio - 1.348).abs() < 0.001);
    }

    #[test]
    fn test_wider_content_is_never_cropped() {
        for screen in ratios() {
            for content in ratios().filter(|c| *c >= screen) {
                let adj = compute(content, screen);
                assert_eq!(adj.pixel_ratio, 1.0, "content {content} screen {screen}");

                // Content height as a fraction of the container height, after zoom
                let visible_height = if content > CONTAINER_RATIO {
                    CONTAINER_RATIO / content * adj.vertical_zoom
                } else {
                    adj.vertical_zoom
                };
                assert!(
                    visible_height <= 1.0 + MATCH_TOLERANCE,
                    "content {content} cropped on screen {screen}"
                );
            }
        }
    }

    #[test]
    fn test_narrower_content_fills_width() {
        for screen in ratios() {
            for content in ratios().filter(|c| *c < screen - MATCH_TOLERANCE) {
                let adj = compute(content, screen);
                assert!(
                    (adj.visible_ratio(content) - screen).abs() < TOL,
                    "content {content} screen {screen}"
                );
            }
        }
    }

    #[test]
    fn test_equal_ratios_need_no_horizontal_stretch() {
        for ratio in ratios() {
            let adj = compute(ratio, ratio);
            assert_eq!(adj.pixel_ratio, 1.0);
            if ratio <= CONTAINER_RATIO {
                assert!(adj.is_identity(), "ratio {ratio}");
            }
        }
        assert!(compute(1.78, 1.78).is_identity());
        assert!(compute(CONTAINER_RATIO, CONTAINER_RATIO).is_identity());
    }

    #[test]
    fn test_equal_wide_ratios_still_zoom_vertically() {
        let adj = compute(2.4, 2.4);
        assert_eq!(adj.pixel_ratio, 1.0);
        assert!((adj.vertical_zoom - 1.35).abs() < TOL);
        assert!(!adj.is_identity());
    }

    #[test]
    fn test_pixel_ratio_monotonic_in_screen() {
        for content in ratios() {
            let mut previous = 0.0;
            for screen in ratios().filter(|s| *s > content) {
                let adj = compute(content, screen);
                assert!(adj.pixel_ratio >= previous);
                previous = adj.pixel_ratio;
            }
        }
    }

    #[test]
    fn test_out_of_range_is_identity() {
        assert!(compute(0.5, 2.40).is_identity());
        assert!(compute(2.39, 7.0).is_identity());
        assert!(compute(f64::NAN, 2.40).is_identity());
        assert!(compute(-2.39, 2.40).is_identity());
        assert!(compute(2.39, f64::INFINITY).is_identity());

        assert_matches!(
            ZoomCalculator::default().try_compute(4.5, 2.40),
            Err(AutofitError::InvalidRatioInput { .. })
        );
    }

    #[test]
    fn test_vertical_zoom_ceiling() {
        let calc = ZoomCalculator::default();
        for content in ratios() {
            let adj = calc.compute(content, 2.40);
            assert!(adj.vertical_zoom >= 1.0);
            assert!(adj.vertical_zoom <= calc.max_vertical_zoom() + TOL);
        }
    }

    #[test]
    fn test_custom_container() {
        let calc = ZoomCalculator::with_container(1.85);
        let adj = calc.compute(2.39, 2.40);
        assert!((adj.vertical_zoom - 2.39 / 1.85).abs() < TOL);
        assert_eq!(adj.pixel_ratio, 1.0);
    }
}

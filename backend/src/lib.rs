//! Anamorphic auto-fit service
//!
//! Watches playback on a media player, looks up the true aspect ratio of the
//! movie or episode and sets the player's vertical zoom and pixel ratio so
//! the picture fills a wide projection screen without cropping.

pub mod config;
pub mod error;
pub mod media;
pub mod services;

pub use error::{AutofitError, AutofitResult};

//! Cadence helper functions.
//!
//! Everything is behind a feature flag, so crates only pull in what they use.

#[cfg(feature = "asynch")]
pub mod asynch;

//! Description extraction pipeline for catalog items.
//!
//! Goes from a catalog record to a clean, human-readable Japanese
//! description, trying detail pages first and falling back to catalog data:
//!
//! - [`candidates`]: ordered detail-page URL guesses
//! - [`fetcher`]: HTTP retrieval and response classification
//! - [`document`]: byte decoding and the strict → lenient parser chain
//! - [`age_gate`]: age-verification interstitial detection
//! - [`main_body`] / [`metadata`]: the two extraction stages
//! - [`sanitize`]: cleaning and acceptance rules shared by every tier
//! - [`fallback`]: catalog-field and synthesized descriptions
//! - [`resolver`]: the state machine tying it together

pub mod age_gate;
pub mod candidates;
pub mod document;
pub mod fallback;
pub mod fetcher;
pub mod main_body;
pub mod metadata;
pub mod resolver;
pub mod sanitize;

pub use fetcher::{HttpPageFetcher, PageFetcher};
pub use resolver::DescriptionResolver;

//! MSense Core - data model and contracts of the prediction pipeline
//!
//! Provides:
//! - Feature and score vectors with their invariants
//! - The published cache entry and the single-writer prediction cache
//! - The telemetry source and scorer contracts
//! - Failure taxonomy and service configuration
//!
//! # Example
//!
//! ```rust
//! use msense_core::{CacheEntry, FailureKind, PredictionCache};
//!
//! let (cache, publisher) = PredictionCache::with_publisher();
//! assert_eq!(*cache.read(), CacheEntry::Empty);
//!
//! publisher.publish(CacheEntry::stale(FailureKind::NoData, None));
//! assert!(!cache.read().is_fresh());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cache;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use cache::{CachePublisher, PredictionCache};
pub use config::{load_dotenv, PartialConfig, ServiceConfig, StoreConfig};
pub use error::{ConfigError, FailureKind, FetchError, ScoringError};
pub use traits::{Scorer, TelemetrySource};
pub use types::{
    CacheEntry, FeatureVector, Horizons, NonFiniteScore, ScoreVector, StaleReason, FEATURE_LEN,
    FEATURE_NAMES, SCORE_LEN,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the pipeline
    pub use crate::{
        CacheEntry, CachePublisher, FailureKind, FeatureVector, FetchError, PredictionCache,
        ScoreVector, Scorer, ScoringError, TelemetrySource,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! MSense Scoring - artifact-backed fatigue scorer
//!
//! The scorer is built once from two artifacts in the model directory and
//! then used by the refresher without further I/O:
//! - [`FeatureScaler`]: standard-score normalization of the five features
//! - [`LstmModel`]: one LSTM step plus a three-output linear head
//! - [`ScorerHandle`]: the owned [`msense_core::Scorer`] the refresher calls
//!
//! # Example
//!
//! ```rust,ignore
//! use msense_scoring::{ArtifactPaths, ScorerHandle};
//! use msense_core::{FeatureVector, Scorer};
//!
//! let handle = ScorerHandle::load_or_unavailable(&ArtifactPaths::in_dir("models"));
//! let scores = handle.score(&FeatureVector::new(70.0, 50.0, 37.0, 500.0, 7.0))?;
//! println!("{:?}", scores.values());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod artifact;
pub mod handle;
pub mod lstm;
pub mod scaler;

pub use artifact::{ArtifactError, ArtifactPaths, StateDict, Tensor, MODEL_FILE, SCALER_FILE};
pub use handle::{ScorerHandle, ScoringPipeline};
pub use lstm::LstmModel;
pub use scaler::FeatureScaler;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

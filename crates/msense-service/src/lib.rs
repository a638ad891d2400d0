//! MSense Service - refresh loop and HTTP surface
//!
//! Provides:
//! - [`Refresher`]: the single publisher of the prediction cache
//! - [`routes`] and [`serve`]: the warp endpoints reading that cache
//! - Logging setup for the `msense` binary

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod logging;
pub mod refresher;
pub mod server;

pub use error::ServeError;
pub use logging::{init_logging, LogFormat};
pub use refresher::{
    allowed_transitions, is_allowed, CycleOutcome, RefreshObserver, RefreshState, RefreshSummary,
    Refresher,
};
pub use server::{encode, routes, serve, PredictionResponse, GREETING};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

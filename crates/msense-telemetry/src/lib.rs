//! MSense Telemetry - biometric records from the DynamoDB store
//!
//! Provides:
//! - [`DynamoClient`]: signed JSON-protocol `Scan` and `ListTables` over reqwest
//! - [`DynamoSource`]: the [`msense_core::TelemetrySource`] the refresher polls
//! - Record mapping from store attributes onto the canonical features
//! - Credential resolution: environment, shared profile files, container and
//!   instance roles
//! - Signature version 4 request signing

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod client;
pub mod credentials;
pub mod error;
pub mod provider;
pub mod record;
pub mod sigv4;
pub mod source;

pub use client::{default_endpoint, DynamoClient};
pub use credentials::AwsCredentials;
pub use error::TelemetryError;
pub use provider::{CredentialChain, CredentialSource};
pub use record::{map_item, Item, FIELD_MAPPING};
pub use source::DynamoSource;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

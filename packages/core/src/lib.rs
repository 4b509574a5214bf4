// Agility Core
// Hybrid (X25519 + Kyber-768) encryption at rest with configurable suites

#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)]

// Модули
pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod utils;

// Re-exports для удобства
pub use api::CryptoAgility;
pub use config::{AgilityConfig, CryptoParams, SuiteConfig};
pub use crypto::{Credentials, DecryptedPayload, SuiteInfo};
pub use utils::error::{AgilityError, Result};

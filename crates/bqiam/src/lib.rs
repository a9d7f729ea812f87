#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod completion;
mod config;
mod error;
pub mod gcp;
pub mod policy;
pub mod principal;
pub mod reconcile;
pub mod role;
pub mod store;
pub(crate) mod utils;

pub use config::{Config, ConfigError, DebugConfig, LogFormat};
pub use error::{ApiError, ApiErrorKind};

#[cfg(any(test, feature = "test-utils"))]
pub mod tests;

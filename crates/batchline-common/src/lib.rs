//! Batchline Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling, logging and configuration for the Batchline workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`BatchlineError`] and the [`Result`] alias
//! - **Logging**: tracing subscriber setup driven by [`logging::LogConfig`]
//! - **Configuration**: engine defaults loaded from the environment via
//!   [`config::EngineConfig`]
//!
//! # Example
//!
//! ```no_run
//! use batchline_common::config::EngineConfig;
//! use batchline_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     let config = EngineConfig::load()?;
//!     tracing::info!(batch_size = config.batch_size, "Engine configured");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{BatchlineError, Result};

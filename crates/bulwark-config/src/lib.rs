//! # Bulwark Configuration Library
//!
//! Type-safe configuration for the bulwark resilience layer: circuit breaker
//! thresholds, metrics retention, deadline and retry budgets, recovery scheduling
//! and logging.
//!
//! ## Features
//!
//! - TOML and JSON support (YAML behind the `yaml` feature)
//! - Every field has a default, so partial files are valid
//! - Validation of obviously broken values before anything is built from them
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bulwark_config::ConfigLoader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::load_from_file("bulwark.toml").await?;
//!     println!("breaker threshold: {}", config.breaker.failure_threshold);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod components;
mod config;
mod loader;

pub use components::*;
pub use config::*;
pub use loader::*;

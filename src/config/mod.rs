//! Configuration for crawl runs
//!
//! `CrawlConfig` plus a fluent builder and environment-variable overrides.

pub mod builder;
pub mod env;
pub mod types;

pub use builder::CrawlConfigBuilder;
pub use types::{CrawlConfig, OperationMode, PolitenessConfig, ResilienceConfig};

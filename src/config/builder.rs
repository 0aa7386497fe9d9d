//! Fluent builder for `CrawlConfig`
//!
//! Covers the fields callers set per run; everything else keeps its default
//! (or environment-derived) value.

use std::path::PathBuf;

use crate::fetcher::RenderingMode;
use crate::writer::OutputFormat;

use super::types::{CrawlConfig, OperationMode};

/// Builder over a `CrawlConfig`
#[derive(Debug, Clone, Default)]
pub struct CrawlConfigBuilder {
    config: CrawlConfig,
}

impl CrawlConfig {
    /// Start a builder from the defaults
    #[must_use]
    pub fn builder() -> CrawlConfigBuilder {
        CrawlConfigBuilder::default()
    }
}

impl CrawlConfigBuilder {
    /// Start from an existing configuration (e.g. `CrawlConfig::from_env()`)
    #[must_use]
    pub fn from_config(config: CrawlConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn seed_url(mut self, url: impl Into<String>) -> Self {
        self.config.seed_url = url.into();
        self
    }

    #[must_use]
    pub fn include_subpages(mut self, include: bool) -> Self {
        self.config.include_subpages = include;
        self
    }

    #[must_use]
    pub fn operation_mode(mut self, mode: OperationMode) -> Self {
        self.config.operation_mode = mode;
        self
    }

    #[must_use]
    pub fn job_id(mut self, id: impl Into<String>) -> Self {
        self.config.job_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn max_depth(mut self, depth: u32) -> Self {
        self.config.max_depth = depth;
        self
    }

    #[must_use]
    pub fn max_requests(mut self, limit: usize) -> Self {
        self.config.max_requests = limit;
        self
    }

    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.discovery_concurrency = workers;
        self
    }

    #[must_use]
    pub fn pages_per_worker(mut self, pages: usize) -> Self {
        self.config.pages_per_worker = pages;
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    #[must_use]
    pub fn rendering_mode(mut self, mode: RenderingMode) -> Self {
        self.config.rendering_mode = mode;
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    #[must_use]
    pub fn results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.results_dir = dir.into();
        self
    }

    #[must_use]
    pub fn fingerprint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.fingerprint_dir = dir.into();
        self
    }

    #[must_use]
    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.storage_dir = dir.into();
        self
    }

    #[must_use]
    pub fn allow_subdomains(mut self, allow: bool) -> Self {
        self.config.filter.allow_subdomains = allow;
        self
    }

    #[must_use]
    pub fn respect_robots(mut self, respect: bool) -> Self {
        self.config.politeness.respect_robots = respect;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.politeness.user_agent = agent.into();
        self
    }

    #[must_use]
    pub fn build(self) -> CrawlConfig {
        self.config
    }
}

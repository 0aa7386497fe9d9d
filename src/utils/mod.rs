//! Shared utility functions
//!
//! URL and filesystem helpers used across the crawler subsystems.

pub mod url_utils;

pub use url_utils::{host_of, is_valid_url, sanitize_host};

//! Utility functions for string formatting.

pub mod format;

pub use format::{format_remaining, truncate_body};

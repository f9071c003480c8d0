//! Small shared helpers and default-tuning constants.
//!
//! Mirrors the teacher crate's `utils` module: a `constants` submodule of
//! named defaults (so call sites read `DEFAULT_MAX_RETRIES` instead of a bare
//! `3`) plus a couple of pure string/URL helpers used across the crawler.

pub mod constants;
pub mod unique_key;

pub use constants::*;
pub use unique_key::normalize_url;

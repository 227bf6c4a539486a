//! Shared helpers for keyprobe integration tests.
//!
//! - `fixtures`: mock upstream providers and fetchers
//! - `logger`: per-test progress output
//! - `log_capture`: in-memory tracing capture for assertions

#![allow(dead_code)]

pub mod fixtures;
pub mod log_capture;
pub mod logger;

//! HTTP client module
//!
//! Thin reqwest wrapper used by the endpoint probe.

mod client;

pub use client::{HttpClient, HttpError};

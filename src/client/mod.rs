//! Client Module
//!
//! HTTP transport and failure classification.

pub mod classify;
pub mod http;

pub use classify::{classify_status, classify_transport};
pub use http::{header_map, HttpClient};

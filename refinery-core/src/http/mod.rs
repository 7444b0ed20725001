//! HTTP module for making API requests to LLM backends
//!
//! This module implements the transport layer shared by every adapter:
//! - Connection pooling and timeouts (one reqwest client per adapter)
//! - Request ID generation and correlation
//! - Capturing non-success responses as [`RawFailure`] for classification

pub mod client;
pub mod error;

pub use client::{json_headers, HttpClient};
pub use error::{classify_common, ErrorDetails, RawFailure};

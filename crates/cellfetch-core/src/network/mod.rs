//! Network access for the fetcher.
//!
//! This module provides:
//! - The `Transport` trait the fetcher depends on
//! - `HttpClient`, the reqwest-backed implementation

mod client;
mod transport;

pub use client::HttpClient;
pub use transport::Transport;

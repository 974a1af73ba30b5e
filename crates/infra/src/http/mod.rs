//! HTTP utilities shared by the platform adapters.

pub mod client;

pub use client::HttpClient;

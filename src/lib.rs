//! prompt-relay - OpenAI-compatible relay for a prompt-writing assistant.
//!
//! Features:
//! - Chat completion relay with JSON passthrough and SSE re-framing
//! - Free model catalog driven by environment configuration
//! - Upstream credential resolution with placeholder-key detection
//! - Client-side settings engine that merges free, built-in and custom models

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod http;
pub mod proxy;
pub mod settings;

//! Embedding provider implementations.

pub mod google;
pub mod mock;
pub mod ollama;

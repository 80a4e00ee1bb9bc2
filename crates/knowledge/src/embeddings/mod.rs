//! Embedding generation.
//!
//! Providers turn text into fixed-dimension vectors. A batch either yields one
//! vector per input, in input order, or fails as a whole.

pub mod provider;
pub mod providers;

pub use provider::{check_batch, create_provider, EmbeddingProvider};

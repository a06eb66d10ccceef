//! LLM and embedding provider implementations for codeloop.
//!
//! All providers implement the `codeloop_core::Provider` trait.
//! The router selects the correct provider based on configuration.

mod lines;

pub mod embedder;
pub mod ollama;
pub mod openai_compat;
pub mod router;

pub use embedder::ProviderEmbedder;
pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{build_from_config, ProviderRouter};

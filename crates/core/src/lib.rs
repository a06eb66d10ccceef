//! # codeloop core
//!
//! Domain types, traits, and error definitions for the codeloop
//! retrieval-augmented code agent. This crate has **no framework
//! dependencies**: it defines the domain model that every other crate
//! implements against.
//!
//! ## Seams
//!
//! The three external collaborators of the agent loop are traits here:
//! - [`Provider`]: the language model, as a streaming text generator
//! - [`Embedder`]: the embedding function
//! - [`Runnable`]: the code execution strategy
//!
//! Implementations live in their respective crates, so tests can swap in
//! scripted stand-ins without touching the orchestration loop.

pub mod error;
pub mod message;
pub mod provider;
pub mod embedding;
pub mod memory;
pub mod runnable;

// Re-export key types at crate root for ergonomics
pub use error::{CacheError, Error, ExecutorError, MemoryError, ProviderError, Result};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use embedding::Embedder;
pub use memory::{ChunkMetadata, ContextChunk};
pub use runnable::{ExecutionOutcome, ExecutionResult, Runnable};

//! Densex LLM - Model Gateway and Embeddings
//!
//! This crate provides the model-facing call sites of Densex:
//! - Embeddings: `EmbeddingProvider` trait, OpenAI-compatible HTTP provider and
//!   the validated, retried `Embedder`
//! - Completion: `CompletionProvider` trait and the retried, cost-accounted
//!   `OpenRouterClient`
//! - OpenRouter: HTTP provider for the OpenRouter gateway
//! - Util: key masking and error sanitising

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod completion;
pub mod embeddings;
pub mod error;
pub mod openrouter;
pub mod util;

pub use completion::{Completion, CompletionProvider, OpenRouterClient, TokenUsage, USAGE_KEY};
pub use embeddings::{
    l2_normalize, Embedder, EmbeddingConfig, EmbeddingProvider, HttpEmbeddingProvider,
};
pub use error::{Error, Result};
pub use openrouter::{OpenRouterConfig, OpenRouterProvider};

//! Concrete embedding provider implementations: `openai`, `ollama`.
//! The in-process default, [`crate::HashEmbeddingProvider`], lives at the
//! crate root.

pub mod ollama;
pub mod openai;

pub use ollama::OllamaEmbeddingProvider;
pub use openai::{OpenAIClient, OpenAIEmbeddingProvider};

use ctx_core::{CtxError, EmbedError};

pub(crate) fn request_failed(provider: &str, status: i32, message: impl Into<String>) -> CtxError {
    CtxError::Embed(EmbedError::RequestFailed {
        provider: provider.to_string(),
        status,
        message: message.into(),
    })
}

pub(crate) fn invalid_response(provider: &str, message: impl Into<String>) -> CtxError {
    CtxError::Embed(EmbedError::RequestFailed {
        provider: provider.to_string(),
        status: 0,
        message: message.into(),
    })
}

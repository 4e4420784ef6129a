//! OpenAI embeddings provider.

pub mod client;
pub mod embedding;
pub mod types;

pub use client::OpenAIClient;
pub use embedding::OpenAIEmbeddingProvider;

//! Minimal LLM client: chat completions with tools and text embeddings,
//! over either a standard OpenAI-compatible endpoint or a deployment-style
//! endpoint where the deployment name lives in the URL path.

pub mod client;
pub mod types;

pub use client::LlmClient;
pub use types::*;

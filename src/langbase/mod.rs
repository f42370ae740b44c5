//! Langbase client used as the opaque text-completion service.
//!
//! The pipeline only talks to [`CompletionService`]; [`LangbaseClient`] is the
//! production implementation backed by Langbase Pipes.

mod client;
mod types;


pub use client::*;
pub use types::*;

use async_trait::async_trait;

use crate::error::LangbaseResult;

/// Text-completion boundary: `{system_prompt, user_content}` in, raw text out.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Request a completion for the given prompt pair.
    async fn complete(&self, system_prompt: &str, user_content: &str) -> LangbaseResult<String>;
}

use anyhow::Result;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

mod gemini;

pub use gemini::{DEFAULT_MODEL, Gemini};

#[derive(Debug, Clone, Serialize)]
pub struct ProviderUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderResponse {
    pub text: String,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

pub type ProviderFuture = Pin<Box<dyn Future<Output = Result<ProviderResponse>> + Send>>;

/// A generative text model. Inputs accumulate by value; `generate` issues a
/// single request with everything appended so far.
pub trait Provider: Clone + Send + Sync {
    fn has_credentials(&self) -> bool;
    fn append_user_input(self, input: String) -> Self;
    fn generate(self) -> ProviderFuture;
}

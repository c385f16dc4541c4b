//! Completion API adapters.
//!
//! Each provider implements [`crate::model::Backend`] for its wire format.

mod anthropic;
mod openai;

pub use anthropic::{AnthropicBackend, AnthropicBackendBuilder};
pub use openai::{GITHUB_MODELS_URL, OPENAI_API_URL, OpenAiBackend, OpenAiBackendBuilder};

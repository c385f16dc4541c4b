//! The configured completion backend.

use runtime::model::{ModelRequest, ModelResponse};
use runtime::{AnthropicBackend, Backend, GITHUB_MODELS_URL, ModelError, OpenAiBackend};
use tracing::info;

use crate::config::{Config, ConfigError, Provider};

pub enum AnyBackend {
    OpenAi(OpenAiBackend),
    Anthropic(AnthropicBackend),
}

impl AnyBackend {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let api_key = config.api_key()?;
        let model = config.model();
        let provider = config.backend.provider;

        let backend = match provider {
            Provider::Github | Provider::Openai => {
                let mut builder = OpenAiBackend::builder(api_key, model);
                if provider == Provider::Github {
                    builder = builder.base_url(GITHUB_MODELS_URL);
                }
                if let Some(url) = &config.backend.base_url {
                    builder = builder.base_url(url);
                }
                Self::OpenAi(builder.build())
            }
            Provider::Anthropic => {
                let mut builder = AnthropicBackend::builder(api_key, model);
                if let Some(url) = &config.backend.base_url {
                    builder = builder.url(url);
                }
                Self::Anthropic(builder.build())
            }
        };
        info!(backend = %backend, "completion backend ready");
        Ok(backend)
    }
}

impl std::fmt::Display for AnyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi(backend) => std::fmt::Display::fmt(backend, f),
            Self::Anthropic(backend) => std::fmt::Display::fmt(backend, f),
        }
    }
}

impl Backend for AnyBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        match self {
            Self::OpenAi(backend) => backend.call(request).await,
            Self::Anthropic(backend) => backend.call(request).await,
        }
    }
}

//! Static model lookup: which backend serves a given model identifier.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::provider::{BedrockProvider, ChatEndpoint, LlmError, LlmProvider, OpenAiProvider};
use crate::config::LlmConfig;

/// Model identifiers routed to Amazon Bedrock.
pub const BEDROCK_MODEL_IDS: &[&str] = &[
    "mistral.mixtral-8x7b-instruct-v0:1",
    "amazon.titan-text-premier-v1:0",
    "anthropic.claude-3-sonnet-20240229-v1:0",
    "cohere.command-r-plus-v1:0",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Backend {
    Bedrock { model_id: String },
    Azure,
    OpenAi { model: String },
}

/// Bedrock ids win, then the Azure switch, then OpenAI with the requested or
/// default model.
pub fn select_backend(model_id: Option<&str>, config: &LlmConfig) -> Backend {
    let model_id = model_id.filter(|m| !m.is_empty());

    if let Some(id) = model_id {
        if BEDROCK_MODEL_IDS.contains(&id) {
            return Backend::Bedrock {
                model_id: id.to_string(),
            };
        }
    }

    if config.use_azure {
        return Backend::Azure;
    }

    Backend::OpenAi {
        model: model_id
            .map(str::to_string)
            .unwrap_or_else(|| config.default_model.clone()),
    }
}

#[derive(Clone)]
pub struct ModelRegistry {
    config: Arc<LlmConfig>,
    client: reqwest::Client,
    fixed: Option<Arc<dyn LlmProvider>>,
}

impl ModelRegistry {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            client,
            fixed: None,
        })
    }

    /// Serves every request from one provider regardless of model id.
    pub fn with_provider(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            config: Arc::new(LlmConfig::default()),
            client: reqwest::Client::new(),
            fixed: Some(provider),
        }
    }

    pub fn resolve(
        &self,
        model_id: Option<&str>,
        openai_api_key: Option<&str>,
    ) -> Result<Arc<dyn LlmProvider>, LlmError> {
        if let Some(provider) = &self.fixed {
            return Ok(provider.clone());
        }

        let backend = select_backend(model_id, &self.config);
        debug!("Resolved model {:?} to {:?}", model_id, backend);

        let api_key = openai_api_key
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.config.openai_api_key.clone());

        let provider: Arc<dyn LlmProvider> = match backend {
            Backend::Bedrock { model_id } => {
                if self.config.bedrock_api_key.is_empty() {
                    return Err(LlmError::NotConfigured(
                        "AWS_BEARER_TOKEN_BEDROCK is not set".to_string(),
                    ));
                }
                Arc::new(BedrockProvider::new(
                    self.client.clone(),
                    self.config.bedrock_region.clone(),
                    model_id,
                    self.config.bedrock_api_key.clone(),
                ))
            }
            Backend::Azure => {
                if api_key.is_empty() {
                    return Err(LlmError::NotConfigured("OPENAI_API_KEY is not set".to_string()));
                }
                Arc::new(OpenAiProvider::new(
                    self.client.clone(),
                    ChatEndpoint::Azure {
                        endpoint: self.config.azure_endpoint.clone(),
                        deployment: self.config.azure_deployment.clone(),
                        api_version: self.config.azure_api_version.clone(),
                    },
                    api_key,
                ))
            }
            Backend::OpenAi { model } => {
                if api_key.is_empty() {
                    return Err(LlmError::NotConfigured("OPENAI_API_KEY is not set".to_string()));
                }
                Arc::new(OpenAiProvider::new(
                    self.client.clone(),
                    ChatEndpoint::OpenAi {
                        base_url: self.config.openai_base_url.clone(),
                        model,
                    },
                    api_key,
                ))
            }
        };

        Ok(provider)
    }
}

//! OpenAI-backed reply generator via rig-core.

use async_trait::async_trait;
use rig::agent::AgentBuilder;
use rig::client::CompletionClient;
use rig::completion::{CompletionModel, Prompt};
use rig::providers::openai;
use secrecy::ExposeSecret;

use crate::ai::prompts::{self, BusinessProfile};
use crate::ai::{Intent, LlmConfig, ReplyContext, ReplyGenerator};
use crate::error::LlmError;

const PROVIDER: &str = "openai";

type OpenAiClient = rig::client::Client<openai::client::OpenAIResponsesExt>;

/// Completion model handed out by the OpenAI client.
pub type OpenAiModel = <OpenAiClient as CompletionClient>::CompletionModel;

/// Classification answers are a single word.
const CLASSIFY_MAX_TOKENS: u64 = 10;
const CLASSIFY_TEMPERATURE: f64 = 0.1;

pub struct OpenAiReplyGenerator<M: CompletionModel> {
    model: M,
    model_name: String,
    temperature: f64,
    max_tokens: u64,
    system_prompt: String,
}

impl OpenAiReplyGenerator<OpenAiModel> {
    /// Build a generator from configuration.
    pub fn from_config(config: &LlmConfig, business: &BusinessProfile) -> Result<Self, LlmError> {
        let client: OpenAiClient =
            openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
                LlmError::RequestFailed {
                    provider: PROVIDER.to_string(),
                    reason: format!("Failed to create OpenAI client: {e}"),
                }
            })?;

        let model = client.completion_model(&config.model);
        tracing::info!("Using OpenAI (model: {})", config.model);
        Ok(Self::new(model, config, business))
    }
}

impl<M: CompletionModel> OpenAiReplyGenerator<M> {
    pub fn new(model: M, config: &LlmConfig, business: &BusinessProfile) -> Self {
        Self {
            model,
            model_name: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: prompts::system_prompt(business),
        }
    }

    fn request_failed(&self, e: impl std::fmt::Display) -> LlmError {
        LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            reason: format!("{} ({}): {e}", self.model_name, PROVIDER),
        }
    }
}

#[async_trait]
impl<M> ReplyGenerator for OpenAiReplyGenerator<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    async fn generate_reply(
        &self,
        user_text: &str,
        context: &ReplyContext,
    ) -> Result<String, LlmError> {
        let preamble = format!(
            "{}\n\n{}",
            self.system_prompt,
            prompts::context_prompt(context)
        );
        let agent = AgentBuilder::new(self.model.clone())
            .preamble(&preamble)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build();

        let reply = agent
            .prompt(user_text)
            .await
            .map_err(|e| self.request_failed(e))?;
        tracing::debug!(chars = reply.len(), "Model replied");
        Ok(reply)
    }

    async fn classify_intent(&self, user_text: &str) -> Result<Intent, LlmError> {
        let agent = AgentBuilder::new(self.model.clone())
            .preamble(prompts::CLASSIFY_PROMPT)
            .temperature(CLASSIFY_TEMPERATURE)
            .max_tokens(CLASSIFY_MAX_TOKENS)
            .build();

        let label = agent
            .prompt(user_text)
            .await
            .map_err(|e| self.request_failed(e))?;
        if label.trim().is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "empty intent label".to_string(),
            });
        }
        Ok(Intent::from_label(&label))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

//! AI conversation mode.
//!
//! Replies come from a [`ReplyGenerator`] instead of the menu machine. The
//! session keeps a bounded history, an intent classified from the first
//! substantive message, and a flag recording whether the intake was saved.

pub mod openai;
pub mod prompts;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ConfigError, LlmError};
use crate::flow::intake::{IntakeRecord, IntakeStatus, NOT_SCHEDULED};
use crate::flow::menu::normalize;
use crate::flow::Step;
use crate::session::{HistoryEntry, Role, Session};

pub use openai::OpenAiReplyGenerator;
pub use prompts::BusinessProfile;

/// Entries of history passed to the generator.
const CONTEXT_MESSAGES: usize = 5;

/// Maximum characters of customer text kept in the intake details.
const DETAILS_MAX_CHARS: usize = 500;

/// What the customer wants, as classified by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Fabricacao,
    Reforma,
    Orcamento,
    Agendamento,
    Duvida,
    Cumprimento,
    Outros,
}

impl Intent {
    /// Parse a model answer. Anything unrecognized is `Outros`.
    pub fn from_label(label: &str) -> Self {
        let cleaned: String = normalize(label)
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        match cleaned.as_str() {
            "fabricacao" => Self::Fabricacao,
            "reforma" => Self::Reforma,
            "orcamento" => Self::Orcamento,
            "agendamento" => Self::Agendamento,
            "duvida" => Self::Duvida,
            "cumprimento" => Self::Cumprimento,
            _ => Self::Outros,
        }
    }

    /// Whether this intent is concrete enough to open an intake.
    pub fn is_substantive(&self) -> bool {
        !matches!(self, Self::Cumprimento | Self::Outros)
    }

    /// Service name recorded on the intake.
    pub fn service_name(&self) -> &'static str {
        match self {
            Self::Fabricacao => "Fabricação de Móveis",
            Self::Reforma => "Reforma de Móveis",
            Self::Orcamento => "Solicitação de Orçamento",
            Self::Agendamento => "Agendamento de Visita",
            Self::Duvida => "Dúvidas Gerais",
            Self::Cumprimento | Self::Outros => "Atendimento Geral",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Fabricacao => "fabricacao",
            Self::Reforma => "reforma",
            Self::Orcamento => "orcamento",
            Self::Agendamento => "agendamento",
            Self::Duvida => "duvida",
            Self::Cumprimento => "cumprimento",
            Self::Outros => "outros",
        };
        write!(f, "{s}")
    }
}

/// What the generator knows about the conversation.
#[derive(Debug, Clone)]
pub struct ReplyContext {
    pub customer_name: String,
    pub intent: Option<Intent>,
    pub recent: Vec<HistoryEntry>,
}

/// Language-model collaborator.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate_reply(&self, user_text: &str, context: &ReplyContext)
    -> Result<String, LlmError>;

    async fn classify_intent(&self, user_text: &str) -> Result<Intent, LlmError>;

    fn model_name(&self) -> &str;
}

/// OpenAI settings for the AI mode.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u64,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".into()))?;

        let parse_or = |key: &str, default: &str| std::env::var(key).unwrap_or(default.into());
        let temperature = parse_or("OPENAI_TEMPERATURE", "0.7");
        let max_tokens = parse_or("OPENAI_MAX_TOKENS", "500");

        Ok(Self {
            api_key: SecretString::from(api_key),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
            temperature: temperature.parse().map_err(|_| ConfigError::InvalidValue {
                key: "OPENAI_TEMPERATURE".into(),
                message: format!("not a number: '{temperature}'"),
            })?,
            max_tokens: max_tokens.parse().map_err(|_| ConfigError::InvalidValue {
                key: "OPENAI_MAX_TOKENS".into(),
                message: format!("not an integer: '{max_tokens}'"),
            })?,
        })
    }
}

/// Outcome of one AI turn.
#[derive(Debug, Clone)]
pub struct AiTurn {
    pub reply: String,
    /// Intake to persist, once the engagement threshold is met.
    pub intake: Option<IntakeRecord>,
}

/// Drives one AI-mode turn: classify, generate, and decide whether to save.
pub struct AiResponder {
    generator: Arc<dyn ReplyGenerator>,
    timeout: Duration,
    min_messages: usize,
    business_phone: String,
}

impl AiResponder {
    pub fn new(
        generator: Arc<dyn ReplyGenerator>,
        timeout: Duration,
        min_messages: usize,
        business_phone: impl Into<String>,
    ) -> Self {
        Self {
            generator,
            timeout,
            min_messages,
            business_phone: business_phone.into(),
        }
    }

    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    /// Handle one customer message. Never fails: model errors and timeouts
    /// produce the fallback apology.
    pub async fn respond(&self, session: &mut Session, text: &str, now: DateTime<Utc>) -> AiTurn {
        if !matches!(session.step, Step::Conversing { .. }) {
            session.step = Step::Conversing {
                intake_saved: false,
            };
        }
        session.push_history(Role::Customer, text, now);

        if !session.intent.is_some_and(|i| i.is_substantive()) {
            match self.classify(text).await {
                Ok(intent) => {
                    info!(user_id = %session.user_id, intent = %intent, "Intent classified");
                    session.intent = Some(intent);
                }
                Err(e) => warn!(user_id = %session.user_id, error = %e, "Intent classification failed"),
            }
        }

        let context = ReplyContext {
            customer_name: session.display_name.clone(),
            intent: session.intent,
            recent: session.recent_history(CONTEXT_MESSAGES),
        };

        let reply = match self.generate(text, &context).await {
            Ok(reply) if !reply.trim().is_empty() => {
                let mut reply = reply.trim().to_string();
                if prompts::mentions_scheduling(&reply) {
                    reply.push_str(prompts::SCHEDULING_SUFFIX);
                }
                reply
            }
            Ok(_) => {
                warn!(user_id = %session.user_id, "Model returned an empty reply");
                prompts::fallback_reply(&session.display_name, &self.business_phone)
            }
            Err(e) => {
                warn!(user_id = %session.user_id, error = %e, "Reply generation failed");
                prompts::fallback_reply(&session.display_name, &self.business_phone)
            }
        };
        session.push_history(Role::Bot, reply.clone(), now);

        let intake = self.should_save(session).then(|| build_intake(session));
        AiTurn { reply, intake }
    }

    fn should_save(&self, session: &Session) -> bool {
        session.step == (Step::Conversing { intake_saved: false })
            && session.intent.is_some_and(|i| i.is_substantive())
            && session.history().len() >= self.min_messages
    }

    async fn classify(&self, text: &str) -> Result<Intent, LlmError> {
        tokio::time::timeout(self.timeout, self.generator.classify_intent(text))
            .await
            .map_err(|_| LlmError::Timeout {
                provider: self.generator.model_name().to_string(),
                timeout: self.timeout,
            })?
    }

    async fn generate(&self, text: &str, context: &ReplyContext) -> Result<String, LlmError> {
        tokio::time::timeout(self.timeout, self.generator.generate_reply(text, context))
            .await
            .map_err(|_| LlmError::Timeout {
                provider: self.generator.model_name().to_string(),
                timeout: self.timeout,
            })?
    }
}

fn build_intake(session: &Session) -> IntakeRecord {
    let intent = session.intent.unwrap_or(Intent::Outros);
    let conversation: String = session
        .customer_messages()
        .collect::<Vec<_>>()
        .join(" | ")
        .chars()
        .take(DETAILS_MAX_CHARS)
        .collect();

    IntakeRecord {
        customer_name: session.display_name.clone(),
        phone: session.user_id.clone(),
        service: intent.service_name().to_string(),
        details: format!("Intenção: {intent} | Conversas: {conversation}"),
        scheduled_for: NOT_SCHEDULED.to_string(),
        status: IntakeStatus::InProgress,
        requested_at: session.started_at,
    }
}

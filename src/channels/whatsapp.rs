//! WhatsApp channel over the Z-API HTTP gateway.
//!
//! Inbound messages arrive as webhook JSON (handled by the HTTP server and
//! normalized here); outbound messages are POSTed to the instance API.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use crate::channels::{Channel, InboundEvent};
use crate::error::{ChannelError, ConfigError};
use crate::flow::menu::MenuOption;

const CHANNEL_NAME: &str = "whatsapp";
const DEFAULT_BASE_URL: &str = "https://api.z-api.io";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Content used when an image arrives without a caption.
pub const IMAGE_PLACEHOLDER: &str = "[imagem]";

/// Z-API instance credentials.
#[derive(Debug, Clone)]
pub struct ZapiConfig {
    pub instance_id: String,
    pub token: SecretString,
    /// Account security token, sent as the `Client-Token` header when set.
    pub client_token: Option<SecretString>,
    pub base_url: String,
}

impl ZapiConfig {
    /// Build config from `ZAPI_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let instance_id = std::env::var("ZAPI_INSTANCE_ID")
            .map_err(|_| ConfigError::MissingEnvVar("ZAPI_INSTANCE_ID".into()))?;
        let token = std::env::var("ZAPI_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("ZAPI_TOKEN".into()))?;

        Ok(Self {
            instance_id,
            token: SecretString::from(token),
            client_token: std::env::var("ZAPI_CLIENT_TOKEN")
                .ok()
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
            base_url: std::env::var("ZAPI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

// ── Inbound ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    #[serde(default)]
    pub selected_row_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonsResponse {
    #[serde(default)]
    pub button_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContent {
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// The subset of the Z-API "on message received" webhook the bot reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZapiWebhook {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub chat_name: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub from_me: bool,
    /// Set on `fromMe` notifications for messages sent through the API,
    /// which are the bot's own replies.
    #[serde(default)]
    pub from_api: bool,
    #[serde(default)]
    pub text: Option<TextContent>,
    #[serde(default)]
    pub list_response_message: Option<ListResponse>,
    #[serde(default)]
    pub buttons_response_message: Option<ButtonsResponse>,
    #[serde(default)]
    pub selected_row_id: Option<String>,
    #[serde(default)]
    pub image: Option<ImageContent>,
}

impl ZapiWebhook {
    /// The bot's own outbound message reported back by the gateway.
    pub fn is_api_echo(&self) -> bool {
        self.from_me && self.from_api
    }

    /// Normalize into an [`InboundEvent`]. Returns `None` for payloads
    /// without a phone number (status callbacks and the like) and for
    /// echoes of the bot's own replies.
    pub fn into_event(self) -> Option<InboundEvent> {
        let phone = self.phone.trim();
        if phone.is_empty() || self.is_api_echo() {
            return None;
        }

        let is_group_chat =
            self.is_group || phone.ends_with("@g.us") || phone.contains("-group");
        let user_id = phone.trim_end_matches("@c.us").to_string();
        let content = self.selection().unwrap_or_else(|| self.body());

        let display_name = self
            .sender_name
            .clone()
            .or_else(|| self.chat_name.clone())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| user_id.clone());

        Some(InboundEvent {
            user_id,
            display_name,
            is_group_chat,
            is_from_operator: self.from_me,
            content,
        })
    }

    /// Structured menu or button selection, if any.
    fn selection(&self) -> Option<String> {
        self.list_response_message
            .as_ref()
            .and_then(|l| l.selected_row_id.clone())
            .or_else(|| self.selected_row_id.clone())
            .or_else(|| {
                self.buttons_response_message
                    .as_ref()
                    .and_then(|b| b.button_id.clone())
            })
            .filter(|s| !s.trim().is_empty())
    }

    fn body(&self) -> String {
        if let Some(text) = self.text.as_ref().filter(|t| !t.message.is_empty()) {
            return text.message.clone();
        }
        match &self.image {
            Some(image) => image
                .caption
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| IMAGE_PLACEHOLDER.to_string()),
            None => String::new(),
        }
    }
}

// ── Outbound ────────────────────────────────────────────────────────

/// Sends messages through a Z-API instance.
pub struct ZapiChannel {
    config: ZapiConfig,
    client: reqwest::Client,
}

impl ZapiChannel {
    pub fn new(config: ZapiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!(
            "{}/instances/{}/token/{}/{endpoint}",
            self.config.base_url,
            self.config.instance_id,
            self.config.token.expose_secret()
        )
    }

    async fn post(&self, endpoint: &str, body: serde_json::Value) -> Result<(), ChannelError> {
        let mut request = self.client.post(self.api_url(endpoint)).json(&body);
        if let Some(client_token) = &self.config.client_token {
            request = request.header("Client-Token", client_token.expose_secret());
        }

        let resp = request.send().await.map_err(|e| ChannelError::SendFailed {
            name: CHANNEL_NAME.into(),
            reason: e.to_string(),
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: CHANNEL_NAME.into(),
                reason: format!("{endpoint} failed ({status}): {err}"),
            });
        }

        tracing::debug!(endpoint, "Z-API request sent");
        Ok(())
    }
}

/// Body for `/send-option-list`.
pub fn option_list_body(phone: &str, prompt: &str, options: &[MenuOption]) -> serde_json::Value {
    json!({
        "phone": phone,
        "message": prompt,
        "optionList": {
            "title": "Menu de Opções",
            "buttonLabel": "Ver opções",
            "options": options
                .iter()
                .map(|o| json!({ "id": o.id, "title": o.label, "description": o.description }))
                .collect::<Vec<_>>(),
        },
    })
}

/// Body for `/send-button-list`.
pub fn button_list_body(phone: &str, prompt: &str, buttons: &[MenuOption]) -> serde_json::Value {
    json!({
        "phone": phone,
        "message": prompt,
        "buttonList": {
            "buttons": buttons
                .iter()
                .map(|b| json!({ "id": b.id, "label": b.label }))
                .collect::<Vec<_>>(),
        },
    })
}

#[async_trait]
impl Channel for ZapiChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn send_text(&self, user_id: &str, text: &str) -> Result<(), ChannelError> {
        self.post("send-text", json!({ "phone": user_id, "message": text }))
            .await
    }

    async fn send_menu(
        &self,
        user_id: &str,
        prompt: &str,
        options: &[MenuOption],
    ) -> Result<(), ChannelError> {
        self.post("send-option-list", option_list_body(user_id, prompt, options))
            .await
    }

    async fn send_buttons(
        &self,
        user_id: &str,
        prompt: &str,
        buttons: &[MenuOption],
    ) -> Result<(), ChannelError> {
        self.post("send-button-list", button_list_body(user_id, prompt, buttons))
            .await
    }
}

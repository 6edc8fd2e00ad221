//! Channel trait and the normalized inbound event.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::flow::menu::{MenuOption, Outbound, render_numbered};

/// A message as the dispatcher sees it, independent of transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Customer phone number without transport suffixes.
    pub user_id: String,
    pub display_name: String,
    pub is_group_chat: bool,
    /// Sent by the business account rather than received from the customer.
    pub is_from_operator: bool,
    pub content: String,
}

impl InboundEvent {
    /// A customer-authored direct message.
    pub fn customer(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            is_group_chat: false,
            is_from_operator: false,
            content: content.into(),
        }
    }

    /// A message typed by the operator from the business account.
    pub fn operator(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            is_from_operator: true,
            ..Self::customer(user_id, display_name, content)
        }
    }
}

/// Stream of inbound events from a push-style transport.
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// Outbound side of a transport.
///
/// Only `send_text` is required. Transports without rich menus inherit the
/// numbered-text rendering for `send_menu` and `send_buttons`.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    async fn send_text(&self, user_id: &str, text: &str) -> Result<(), ChannelError>;

    async fn send_menu(
        &self,
        user_id: &str,
        prompt: &str,
        options: &[MenuOption],
    ) -> Result<(), ChannelError> {
        self.send_text(user_id, &render_numbered(prompt, options))
            .await
    }

    async fn send_buttons(
        &self,
        user_id: &str,
        prompt: &str,
        buttons: &[MenuOption],
    ) -> Result<(), ChannelError> {
        self.send_text(user_id, &render_numbered(prompt, buttons))
            .await
    }

    /// Start receiving events. Webhook transports deliver through the HTTP
    /// server instead and return an empty stream.
    async fn start(&self) -> Result<EventStream, ChannelError> {
        Ok(Box::pin(futures::stream::empty()))
    }
}

/// Send an engine reply using the richest shape the channel supports.
pub async fn send_outbound(
    channel: &dyn Channel,
    user_id: &str,
    reply: &Outbound,
) -> Result<(), ChannelError> {
    match reply {
        Outbound::Text(text) => channel.send_text(user_id, text).await,
        Outbound::Menu { prompt, options } => channel.send_menu(user_id, prompt, options).await,
        Outbound::Buttons { prompt, buttons } => {
            channel.send_buttons(user_id, prompt, buttons).await
        }
    }
}

//! CLI channel, a stdin/stdout REPL for local testing.
//!
//! Each line is a customer message from a single local user. Lines starting
//! with `!op ` are treated as operator messages, which pauses the bot the
//! same way a reply from the business phone would.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, EventStream, InboundEvent};
use crate::error::ChannelError;

const OPERATOR_PREFIX: &str = "!op ";

/// A simple CLI channel that reads from stdin and writes to stdout.
pub struct CliChannel {
    user_id: String,
    display_name: String,
}

impl CliChannel {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }

    /// Turn one input line into an event. Blank lines yield nothing.
    pub fn parse_line(&self, line: &str) -> Option<InboundEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        Some(match line.strip_prefix(OPERATOR_PREFIX) {
            Some(text) => InboundEvent::operator(&self.user_id, &self.display_name, text.trim()),
            None => InboundEvent::customer(&self.user_id, &self.display_name, line),
        })
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new("cli-user", "Cliente")
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn send_text(&self, _user_id: &str, text: &str) -> Result<(), ChannelError> {
        println!("\n{text}\n");
        eprint!("> ");
        Ok(())
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let parser = Self::new(&self.user_id, &self.display_name);

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Some(event) = parser.parse_line(&line) else {
                            eprint!("> ");
                            continue;
                        };
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }
}

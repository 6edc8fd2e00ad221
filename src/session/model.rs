//! Per-user conversation session.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ai::Intent;
use crate::flow::{IntakeField, Step};

/// Who authored a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Bot,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Customer => write!(f, "user"),
            Self::Bot => write!(f, "ai"),
        }
    }
}

/// One exchanged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// In-progress conversation state for one user.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub display_name: String,
    pub step: Step,
    pub fields: HashMap<IntakeField, String>,
    pub started_at: DateTime<Utc>,
    /// AI mode: intent classified from the first messages.
    pub intent: Option<Intent>,
    /// Set when the session is removed after finalizing. A task still holding
    /// this handle must fetch a fresh session instead.
    pub closed: bool,
    history: VecDeque<HistoryEntry>,
    history_limit: usize,
}

impl Session {
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        started_at: DateTime<Utc>,
        history_limit: usize,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            step: Step::Start,
            fields: HashMap::new(),
            started_at,
            intent: None,
            closed: false,
            history: VecDeque::with_capacity(history_limit),
            history_limit,
        }
    }

    /// Append a message, dropping the oldest entries past the limit.
    pub fn push_history(&mut self, role: Role, text: impl Into<String>, at: DateTime<Utc>) {
        self.history.push_back(HistoryEntry {
            role,
            text: text.into(),
            at,
        });
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> &VecDeque<HistoryEntry> {
        &self.history
    }

    /// The last `n` history entries, oldest first.
    pub fn recent_history(&self, n: usize) -> Vec<HistoryEntry> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Texts the customer sent, oldest first.
    pub fn customer_messages(&self) -> impl Iterator<Item = &str> {
        self.history
            .iter()
            .filter(|e| e.role == Role::Customer)
            .map(|e| e.text.as_str())
    }

    pub fn field(&self, field: IntakeField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn set_field(&mut self, field: IntakeField, value: impl Into<String>) {
        self.fields.insert(field, value.into());
    }

    /// Return to `Start` with no collected fields. History and intent are kept.
    pub fn reset(&mut self) {
        self.step = Step::Start;
        self.fields.clear();
    }
}

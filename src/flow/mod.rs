//! Menu-driven conversation flows.
//!
//! A flow is a fixed state machine over [`Step`]. The machine is pure: it
//! reads the input, updates the session's collected fields, and returns a
//! [`Transition`]. Sending, persistence, and calendar calls happen in the
//! dispatcher.

pub mod catalog;
pub mod intake;
pub mod machine;
pub mod menu;
pub mod schedule;
pub mod state;

use std::str::FromStr;

use crate::error::ConfigError;

pub use intake::{IntakeField, IntakeRecord, IntakeStatus};
pub use machine::{MenuMachine, Transition};
pub use menu::{MenuOption, Outbound};
pub use state::Step;

/// Which menu flow the bot runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    /// Fabricação / Reforma with furniture subtype, design, photo, and meeting steps.
    Workshop,
    /// Orçamento / Agendar visita / Consultar pedido / Falar com atendente.
    ServiceDesk,
}

impl FromStr for FlowKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "workshop" => Ok(Self::Workshop),
            "service_desk" | "servicedesk" => Ok(Self::ServiceDesk),
            other => Err(ConfigError::InvalidValue {
                key: "INTAKE_FLOW".into(),
                message: format!("expected 'workshop' or 'service_desk', got '{other}'"),
            }),
        }
    }
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Workshop => write!(f, "workshop"),
            Self::ServiceDesk => write!(f, "service_desk"),
        }
    }
}

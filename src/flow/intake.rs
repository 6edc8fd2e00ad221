//! The finalized customer request handed to persistence.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder stored when no date/time was scheduled.
pub const NOT_SCHEDULED: &str = "N/A";

/// Attributes collected while walking a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeField {
    /// Selected top-level category id.
    Category,
    /// Human-readable service name recorded on the intake.
    Service,
    /// Furniture type (sofá, cadeira, ...).
    Subtype,
    /// Whether the customer already has a design ("Sim"/"Não").
    HasDesign,
    /// Photo or description the customer sent.
    Photo,
    /// Online or in-person meeting.
    MeetingKind,
    /// Service desk: whether the customer wants a visit.
    WantsVisit,
    /// Requested `DD/MM/YYYY HH:MM`.
    ScheduledFor,
}

impl IntakeField {
    /// Label used when summarizing the field into the details string.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Category => "Categoria",
            Self::Service => "Serviço",
            Self::Subtype => "Tipo",
            Self::HasDesign => "Possui projeto",
            Self::Photo => "Foto/descrição",
            Self::MeetingKind => "Reunião",
            Self::WantsVisit => "Deseja visita",
            Self::ScheduledFor => "Data",
        }
    }
}

/// Fields included in the details summary, in display order.
const DETAIL_FIELDS: &[IntakeField] = &[
    IntakeField::Subtype,
    IntakeField::HasDesign,
    IntakeField::Photo,
    IntakeField::MeetingKind,
    IntakeField::WantsVisit,
];

/// Lifecycle status of a saved intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntakeStatus {
    #[serde(rename = "Pendente")]
    Pending,
    #[serde(rename = "Em andamento")]
    InProgress,
    #[serde(rename = "Concluído")]
    Completed,
    #[serde(rename = "Cancelado")]
    Cancelled,
}

impl IntakeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pendente",
            Self::InProgress => "Em andamento",
            Self::Completed => "Concluído",
            Self::Cancelled => "Cancelado",
        }
    }
}

impl std::fmt::Display for IntakeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IntakeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Pendente" | "pending" => Ok(Self::Pending),
            "Em andamento" | "in_progress" => Ok(Self::InProgress),
            "Concluído" | "completed" => Ok(Self::Completed),
            "Cancelado" | "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown intake status: {other}")),
        }
    }
}

/// A completed customer request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeRecord {
    pub customer_name: String,
    pub phone: String,
    pub service: String,
    pub details: String,
    /// `DD/MM/YYYY HH:MM` or [`NOT_SCHEDULED`].
    pub scheduled_for: String,
    pub status: IntakeStatus,
    pub requested_at: DateTime<Utc>,
}

impl IntakeRecord {
    /// Build a menu-mode record from the fields a flow collected.
    ///
    /// Returns `None` when the service was never chosen.
    pub fn from_fields(
        customer_name: &str,
        phone: &str,
        fields: &HashMap<IntakeField, String>,
        requested_at: DateTime<Utc>,
    ) -> Option<Self> {
        let service = fields.get(&IntakeField::Service)?.clone();

        let details = DETAIL_FIELDS
            .iter()
            .filter_map(|f| fields.get(f).map(|v| format!("{}: {v}", f.label())))
            .collect::<Vec<_>>()
            .join(" | ");

        Some(Self {
            customer_name: customer_name.to_string(),
            phone: phone.to_string(),
            service,
            details,
            scheduled_for: fields
                .get(&IntakeField::ScheduledFor)
                .cloned()
                .unwrap_or_else(|| NOT_SCHEDULED.to_string()),
            status: IntakeStatus::Pending,
            requested_at,
        })
    }
}

//! Calendar collaborator that books visits for scheduled intakes.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::CollaboratorError;

/// Default visit length.
pub const DEFAULT_EVENT_MINUTES: u32 = 60;

/// A visit to book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub summary: String,
    pub description: String,
    /// Local wall-clock start in `timezone`.
    pub start: NaiveDateTime,
    pub duration_minutes: u32,
    /// IANA timezone label.
    pub timezone: String,
    pub attendee: String,
}

impl CalendarEvent {
    /// Visit event for a customer.
    pub fn visit(
        customer: &str,
        phone: &str,
        service: &str,
        start: NaiveDateTime,
        timezone: &str,
    ) -> Self {
        Self {
            summary: format!("Visita - {customer}"),
            description: format!("Cliente: {customer}\nTelefone: {phone}\nServiço: {service}"),
            start,
            duration_minutes: DEFAULT_EVENT_MINUTES,
            timezone: timezone.to_string(),
            attendee: customer.to_string(),
        }
    }
}

/// Result of a booking attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CalendarOutcome {
    pub ok: bool,
    pub event_id: Option<String>,
}

/// Books calendar events. Failures never block an intake.
#[async_trait]
pub trait CalendarClient: Send + Sync {
    async fn create_event(&self, event: &CalendarEvent)
    -> Result<CalendarOutcome, CollaboratorError>;
}

/// Calendar used when no provider is configured. Logs and reports `ok: false`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledCalendar;

#[async_trait]
impl CalendarClient for DisabledCalendar {
    async fn create_event(
        &self,
        event: &CalendarEvent,
    ) -> Result<CalendarOutcome, CollaboratorError> {
        tracing::debug!(
            summary = %event.summary,
            start = %event.start,
            "Calendar disabled, skipping event"
        );
        Ok(CalendarOutcome::default())
    }
}

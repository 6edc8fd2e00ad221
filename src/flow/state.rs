//! Conversation steps: where a session currently sits in its flow.

use serde::{Deserialize, Serialize};

use crate::flow::FlowKind;

/// Position of a session in the conversation.
///
/// Menu mode walks the `Awaiting*` steps; AI mode stays in `Conversing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Start,
    AwaitingCategory,
    AwaitingSubtype,
    AwaitingHasDesign,
    AwaitingPhoto,
    AwaitingMeetingKind,
    AwaitingVisitChoice,
    AwaitingDatetime,
    /// Persistence failed on the previous attempt; the next message retries.
    Finalize,
    Conversing {
        intake_saved: bool,
    },
}

impl Step {
    /// Whether this step belongs to the given menu flow.
    pub fn belongs_to(&self, flow: FlowKind) -> bool {
        use Step::*;
        match flow {
            FlowKind::Workshop => matches!(
                self,
                Start
                    | AwaitingCategory
                    | AwaitingSubtype
                    | AwaitingHasDesign
                    | AwaitingPhoto
                    | AwaitingMeetingKind
                    | AwaitingDatetime
                    | Finalize
            ),
            FlowKind::ServiceDesk => matches!(
                self,
                Start | AwaitingCategory | AwaitingVisitChoice | AwaitingDatetime | Finalize
            ),
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::AwaitingCategory => "awaiting_category",
            Self::AwaitingSubtype => "awaiting_subtype",
            Self::AwaitingHasDesign => "awaiting_has_design",
            Self::AwaitingPhoto => "awaiting_photo",
            Self::AwaitingMeetingKind => "awaiting_meeting_kind",
            Self::AwaitingVisitChoice => "awaiting_visit_choice",
            Self::AwaitingDatetime => "awaiting_datetime",
            Self::Finalize => "finalize",
            Self::Conversing {
                intake_saved: false,
            } => "conversing",
            Self::Conversing { intake_saved: true } => "conversing_saved",
        };
        write!(f, "{s}")
    }
}

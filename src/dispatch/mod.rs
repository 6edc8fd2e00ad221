//! Message dispatcher, the single entry point for inbound events.
//!
//! Policy runs before any conversation work, short-circuiting in order:
//! group chats, the reactivation command, operator takeover, active pauses,
//! and duplicate suppression. Only then is the user's session locked and
//! handed to the menu machine or the AI responder.

pub mod inflight;

use std::sync::Arc;

use serde::Serialize;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::ai::AiResponder;
use crate::calendar::{CalendarClient, CalendarEvent, DisabledCalendar};
use crate::channels::{Channel, InboundEvent, send_outbound};
use crate::clock::Clock;
use crate::config::{BotConfig, ConversationMode};
use crate::error::{ChannelError, CollaboratorError};
use crate::flow::catalog;
use crate::flow::menu::Outbound;
use crate::flow::{IntakeRecord, MenuMachine, Step};
use crate::session::{PauseStore, Role, Session, SessionHandle, SessionStore};
use crate::store::IntakeRepository;

pub use inflight::{InFlightGuard, InFlightTracker};

/// Reply when the reactivation command cleared a pause.
pub const REACTIVATED_REPLY: &str =
    "✅ Bot reativado com sucesso!\n\nO atendimento automático está funcionando novamente.";

/// Reply when the reactivation command found nothing to clear.
pub const ALREADY_ACTIVE_REPLY: &str = "ℹ️ O bot já está ativo para este chat.";

/// Which path an inbound event took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Group chat, dropped.
    IgnoredGroup,
    /// Reactivation command handled.
    Reactivated { cleared: bool },
    /// Operator wrote to the customer; automation paused.
    OperatorTakeover,
    /// Customer is paused; dropped without reply.
    Suppressed { minutes_remaining: i64 },
    /// Another dispatch for this user is in flight or just finished.
    Duplicate,
    /// Menu step advanced (or re-prompted).
    Replied { step: Step },
    /// Intake persisted and session closed.
    Finalized { intake_id: i64 },
    /// Persistence failed; session kept at `Finalize`.
    FinalizeFailed,
    /// AI reply sent, with the intake id if this turn saved one.
    AiReplied { intake_id: Option<i64> },
}

/// Snapshot for the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStatus {
    pub mode: String,
    pub flow: String,
    pub active_sessions: usize,
    pub paused_users: usize,
    pub ai_model: Option<String>,
}

pub struct Dispatcher {
    config: BotConfig,
    pauses: Arc<PauseStore>,
    sessions: Arc<SessionStore>,
    inflight: InFlightTracker,
    channel: Arc<dyn Channel>,
    intakes: Arc<dyn IntakeRepository>,
    calendar: Arc<dyn CalendarClient>,
    machine: MenuMachine,
    ai: Option<AiResponder>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(
        config: BotConfig,
        pauses: Arc<PauseStore>,
        sessions: Arc<SessionStore>,
        channel: Arc<dyn Channel>,
        intakes: Arc<dyn IntakeRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inflight: InFlightTracker::new(config.dedup_grace),
            machine: MenuMachine::new(&config),
            calendar: Arc::new(DisabledCalendar),
            ai: None,
            config,
            pauses,
            sessions,
            channel,
            intakes,
            clock,
        }
    }

    pub fn with_calendar(mut self, calendar: Arc<dyn CalendarClient>) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn with_ai(mut self, ai: AiResponder) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn pauses(&self) -> &Arc<PauseStore> {
        &self.pauses
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The mode actually in effect. AI mode without a responder runs menus.
    pub fn mode(&self) -> ConversationMode {
        match (&self.ai, self.config.mode) {
            (Some(_), ConversationMode::Ai) => ConversationMode::Ai,
            _ => ConversationMode::Menu,
        }
    }

    pub async fn status(&self) -> BotStatus {
        let paused_users = self.pauses.count_active().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to count paused users");
            0
        });
        BotStatus {
            mode: self.mode().to_string(),
            flow: self.machine.flow().to_string(),
            active_sessions: self.sessions.len().await,
            paused_users,
            ai_model: self.ai.as_ref().map(|ai| ai.model_name().to_string()),
        }
    }

    /// Route one inbound event.
    pub async fn dispatch(&self, event: InboundEvent) -> DispatchOutcome {
        let span = info_span!(
            "dispatch",
            dispatch_id = %Uuid::new_v4(),
            user_id = %event.user_id
        );
        self.dispatch_inner(event).instrument(span).await
    }

    async fn dispatch_inner(&self, event: InboundEvent) -> DispatchOutcome {
        if event.is_group_chat {
            debug!("Group message ignored");
            return DispatchOutcome::IgnoredGroup;
        }

        if self.is_reactivation_command(&event.content) {
            return self.reactivate(&event).await;
        }

        if event.is_from_operator {
            return self.take_over(&event).await;
        }

        if let Some(outcome) = self.suppressed(&event).await {
            return outcome;
        }

        let Some(_marker) = self.inflight.try_acquire(&event.user_id) else {
            info!("Reply already in progress, message ignored");
            return DispatchOutcome::Duplicate;
        };

        loop {
            let handle = self
                .sessions
                .get_or_create(&event.user_id, &event.display_name)
                .await;
            let mut session = handle.lock().await;
            if session.closed {
                continue;
            }

            // An operator may have taken over while this message waited.
            if let Some(outcome) = self.suppressed(&event).await {
                return outcome;
            }

            return match self.mode() {
                ConversationMode::Menu => self.run_menu(&handle, &mut session, &event).await,
                ConversationMode::Ai => self.run_ai(&mut session, &event).await,
            };
        }
    }

    /// Pause automation for the user. The pause is written under the
    /// session lock, so a reply already in progress lands first and no
    /// later dispatch can pass the pause check without seeing it.
    async fn take_over(&self, event: &InboundEvent) -> DispatchOutcome {
        loop {
            let handle = self
                .sessions
                .get_or_create(&event.user_id, &event.display_name)
                .await;
            let session = handle.lock().await;
            if session.closed {
                continue;
            }

            if let Err(e) = self
                .pauses
                .pause(&event.user_id, &event.display_name, self.config.pause_duration)
                .await
            {
                error!(error = %e, "Failed to pause user after operator message");
            }
            drop(session);
            return DispatchOutcome::OperatorTakeover;
        }
    }

    /// `Some(Suppressed)` when the user is paused. Lookup failures fail open.
    async fn suppressed(&self, event: &InboundEvent) -> Option<DispatchOutcome> {
        match self.pauses.is_paused(&event.user_id).await {
            Ok(status) if status.paused => {
                info!(
                    name = %event.display_name,
                    minutes_remaining = status.minutes_remaining,
                    "User paused, message ignored"
                );
                Some(DispatchOutcome::Suppressed {
                    minutes_remaining: status.minutes_remaining,
                })
            }
            Ok(_) => None,
            Err(e) => {
                error!(error = %e, "Pause lookup failed, continuing as not paused");
                None
            }
        }
    }

    fn is_reactivation_command(&self, content: &str) -> bool {
        content
            .trim()
            .eq_ignore_ascii_case(self.config.reactivation_command.trim())
    }

    async fn reactivate(&self, event: &InboundEvent) -> DispatchOutcome {
        let cleared = match self.pauses.resume(&event.user_id).await {
            Ok(cleared) => cleared,
            Err(e) => {
                error!(error = %e, "Failed to resume user");
                false
            }
        };
        let reply = if cleared {
            REACTIVATED_REPLY
        } else {
            ALREADY_ACTIVE_REPLY
        };
        self.send(&event.user_id, &Outbound::text(reply)).await;
        DispatchOutcome::Reactivated { cleared }
    }

    async fn run_menu(
        &self,
        handle: &SessionHandle,
        session: &mut Session,
        event: &InboundEvent,
    ) -> DispatchOutcome {
        let now = self.clock.now();
        session.push_history(Role::Customer, &event.content, now);

        let transition = self.machine.advance(session, &event.content);

        if let Some(visit) = &transition.calendar {
            self.book_visit(visit).await;
        }

        if !transition.finalize {
            session.step = transition.next;
            session.push_history(Role::Bot, transition.reply.body(), now);
            self.send(&session.user_id, &transition.reply).await;
            debug!(step = %session.step, "Menu step advanced");
            return DispatchOutcome::Replied { step: session.step };
        }

        let Some(record) = IntakeRecord::from_fields(
            &session.display_name,
            &session.user_id,
            &session.fields,
            session.started_at,
        ) else {
            warn!("Finalize reached without a service, restarting session");
            let restart = self.machine.restart(session);
            session.step = restart.next;
            self.send(&session.user_id, &restart.reply).await;
            return DispatchOutcome::Replied { step: session.step };
        };

        match self.save_intake(&record).await {
            Ok(intake_id) => {
                session.closed = true;
                self.sessions.remove_if_same(&session.user_id, handle).await;
                self.send(&session.user_id, &transition.reply).await;
                info!(intake_id, service = %record.service, "Intake finalized");
                DispatchOutcome::Finalized { intake_id }
            }
            Err(e) => {
                error!(error = %e, "Failed to save intake, keeping session for retry");
                session.step = Step::Finalize;
                self.send(&session.user_id, &Outbound::text(catalog::FINALIZE_FAILED))
                    .await;
                DispatchOutcome::FinalizeFailed
            }
        }
    }

    async fn run_ai(&self, session: &mut Session, event: &InboundEvent) -> DispatchOutcome {
        let Some(ai) = &self.ai else {
            return DispatchOutcome::AiReplied { intake_id: None };
        };

        let turn = ai.respond(session, &event.content, self.clock.now()).await;

        let mut intake_id = None;
        if let Some(record) = &turn.intake {
            match self.save_intake(record).await {
                Ok(id) => {
                    session.step = Step::Conversing { intake_saved: true };
                    info!(intake_id = id, service = %record.service, "AI intake saved");
                    intake_id = Some(id);
                }
                Err(e) => error!(error = %e, "Failed to save AI intake, will retry next turn"),
            }
        }

        self.send(&session.user_id, &Outbound::Text(turn.reply)).await;
        DispatchOutcome::AiReplied { intake_id }
    }

    async fn save_intake(&self, record: &IntakeRecord) -> Result<i64, CollaboratorError> {
        let timeout = self.config.collaborator_timeout;
        let save = self.intakes.save_intake(record, self.clock.now());
        match tokio::time::timeout(timeout, save).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CollaboratorError::Timeout {
                collaborator: "persistence",
                timeout,
            }),
        }
    }

    /// Best effort: failures are logged and never block the intake.
    async fn book_visit(&self, visit: &CalendarEvent) {
        let timeout = self.config.collaborator_timeout;
        match tokio::time::timeout(timeout, self.calendar.create_event(visit)).await {
            Ok(Ok(outcome)) if outcome.ok => {
                info!(event_id = ?outcome.event_id, start = %visit.start, "Visit booked");
            }
            Ok(Ok(_)) => debug!("Calendar did not book the visit"),
            Ok(Err(e)) => warn!(error = %e, "Calendar booking failed"),
            Err(_) => warn!(?timeout, "Calendar booking timed out"),
        }
    }

    /// Bounded by the collaborator timeout so a stalled transport cannot
    /// hold the user's lock and in-flight marker forever.
    async fn send(&self, user_id: &str, reply: &Outbound) {
        let timeout = self.config.collaborator_timeout;
        let send = send_outbound(self.channel.as_ref(), user_id, reply);
        let result = match tokio::time::timeout(timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout {
                name: self.channel.name().to_string(),
                timeout,
            }),
        };
        if let Err(e) = result {
            error!(channel = self.channel.name(), error = %e, "Failed to send reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeDelta, Utc};

    use crate::ai::Intent;
    use crate::ai::tests::ScriptedGenerator;
    use crate::calendar::CalendarOutcome;
    use crate::clock::ManualClock;
    use crate::error::DatabaseError;
    use crate::flow::{FlowKind, IntakeField, IntakeStatus};
    use crate::store::{
        IntakeFilter, IntakeStats, LibSqlBackend, PauseRecord, PauseRepository, StoredIntake,
    };

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<(String, String)>>,
        /// Simulated transport latency per send.
        delay: Mutex<Duration>,
    }

    impl RecordingChannel {
        fn texts(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
        }
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send_text(&self, user_id: &str, text: &str) -> Result<(), ChannelError> {
            let delay = *self.delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.sent
                .lock()
                .unwrap()
                .push((user_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    /// Intake repository that fails until told otherwise.
    struct FlakyIntakes {
        failing: Mutex<bool>,
        saved: Mutex<Vec<IntakeRecord>>,
    }

    impl FlakyIntakes {
        fn new(failing: bool) -> Self {
            Self {
                failing: Mutex::new(failing),
                saved: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl IntakeRepository for FlakyIntakes {
        async fn save_intake(
            &self,
            record: &IntakeRecord,
            _now: DateTime<Utc>,
        ) -> Result<i64, DatabaseError> {
            if *self.failing.lock().unwrap() {
                return Err(DatabaseError::Query("disk full".into()));
            }
            let mut saved = self.saved.lock().unwrap();
            saved.push(record.clone());
            Ok(saved.len() as i64)
        }

        async fn list_intakes(
            &self,
            _filter: &IntakeFilter,
        ) -> Result<Vec<StoredIntake>, DatabaseError> {
            Ok(Vec::new())
        }

        async fn update_intake_status(
            &self,
            _id: i64,
            _status: IntakeStatus,
            _now: DateTime<Utc>,
        ) -> Result<bool, DatabaseError> {
            Ok(false)
        }

        async fn intake_stats(
            &self,
            _now: DateTime<Utc>,
            _top_services: usize,
        ) -> Result<IntakeStats, DatabaseError> {
            Ok(IntakeStats::default())
        }
    }

    /// Pause repository whose every call fails.
    struct BrokenPauses;

    #[async_trait]
    impl PauseRepository for BrokenPauses {
        async fn upsert_pause(&self, _record: &PauseRecord) -> Result<(), DatabaseError> {
            Err(DatabaseError::Query("down".into()))
        }
        async fn get_pause(&self, _user_id: &str) -> Result<Option<PauseRecord>, DatabaseError> {
            Err(DatabaseError::Query("down".into()))
        }
        async fn delete_active_pause(
            &self,
            _user_id: &str,
            _now: DateTime<Utc>,
        ) -> Result<bool, DatabaseError> {
            Err(DatabaseError::Query("down".into()))
        }
        async fn delete_expired_pause(
            &self,
            _user_id: &str,
            _now: DateTime<Utc>,
        ) -> Result<bool, DatabaseError> {
            Err(DatabaseError::Query("down".into()))
        }
        async fn list_active_pauses(
            &self,
            _now: DateTime<Utc>,
        ) -> Result<Vec<PauseRecord>, DatabaseError> {
            Err(DatabaseError::Query("down".into()))
        }
        async fn count_active_pauses(&self, _now: DateTime<Utc>) -> Result<usize, DatabaseError> {
            Err(DatabaseError::Query("down".into()))
        }
        async fn delete_expired_pauses(&self, _now: DateTime<Utc>) -> Result<usize, DatabaseError> {
            Err(DatabaseError::Query("down".into()))
        }
    }

    struct FailingCalendar;

    #[async_trait]
    impl CalendarClient for FailingCalendar {
        async fn create_event(
            &self,
            _event: &CalendarEvent,
        ) -> Result<CalendarOutcome, CollaboratorError> {
            Err(CollaboratorError::Calendar("unauthorized".into()))
        }
    }

    struct Harness {
        dispatcher: Dispatcher,
        channel: Arc<RecordingChannel>,
        intakes: Arc<FlakyIntakes>,
        clock: Arc<ManualClock>,
    }

    async fn harness_with(config: BotConfig, pause_repo: Option<Arc<dyn PauseRepository>>) -> Harness {
        let clock = Arc::new(ManualClock::default());
        let pause_repo: Arc<dyn PauseRepository> = match pause_repo {
            Some(repo) => repo,
            None => Arc::new(LibSqlBackend::new_memory().await.unwrap()),
        };
        let pauses = Arc::new(PauseStore::new(pause_repo, clock.clone()));
        let sessions = Arc::new(SessionStore::new(clock.clone(), config.history_limit));
        let channel = Arc::new(RecordingChannel::default());
        let intakes = Arc::new(FlakyIntakes::new(false));

        let dispatcher = Dispatcher::new(
            config,
            pauses,
            sessions,
            channel.clone(),
            intakes.clone(),
            clock.clone(),
        );
        Harness {
            dispatcher,
            channel,
            intakes,
            clock,
        }
    }

    fn test_config() -> BotConfig {
        BotConfig {
            dedup_grace: Duration::ZERO,
            ..BotConfig::default()
        }
    }

    async fn harness() -> Harness {
        harness_with(test_config(), None).await
    }

    fn msg(content: &str) -> InboundEvent {
        InboundEvent::customer("U1", "Maria", content)
    }

    async fn say_all(h: &Harness, inputs: &[&str]) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::new();
        for input in inputs {
            outcomes.push(h.dispatcher.dispatch(msg(input)).await);
        }
        outcomes
    }

    #[tokio::test]
    async fn happy_path_saves_one_intake_and_closes_session() {
        let h = harness().await;
        let outcomes = say_all(
            &h,
            &["oi", "fabricacao", "sofa", "nao", "online", "25/10/2025 14:30"],
        )
        .await;

        assert_eq!(outcomes[0], DispatchOutcome::Replied { step: Step::AwaitingCategory });
        assert_eq!(outcomes[5], DispatchOutcome::Finalized { intake_id: 1 });

        let saved = h.intakes.saved.lock().unwrap().clone();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].service, "Fabricação");
        assert_eq!(saved[0].scheduled_for, "25/10/2025 14:30");
        assert_eq!(saved[0].status.as_str(), "Pendente");
        assert_eq!(saved[0].phone, "U1");

        assert!(h.dispatcher.sessions().get("U1").await.is_none());
        assert_eq!(h.channel.texts().len(), 6);
        assert!(h.channel.texts()[5].contains("Agendamento confirmado"));
    }

    #[tokio::test]
    async fn new_message_after_finalize_starts_fresh() {
        let h = harness().await;
        say_all(&h, &["oi", "fabricacao", "sofa", "nao", "online", "25/10/2025 14:30"]).await;

        let outcome = h.dispatcher.dispatch(msg("oi de novo")).await;
        assert_eq!(outcome, DispatchOutcome::Replied { step: Step::AwaitingCategory });
    }

    #[tokio::test]
    async fn group_messages_are_ignored() {
        let h = harness().await;
        let mut event = msg("oi");
        event.is_group_chat = true;
        assert_eq!(h.dispatcher.dispatch(event).await, DispatchOutcome::IgnoredGroup);
        assert!(h.channel.texts().is_empty());
        assert!(h.dispatcher.sessions().is_empty().await);
    }

    #[tokio::test]
    async fn operator_takeover_pauses_and_silences() {
        let h = harness().await;
        let outcome = h
            .dispatcher
            .dispatch(InboundEvent::operator("U1", "Maria", "Oi Maria, aqui é a Ana"))
            .await;
        assert_eq!(outcome, DispatchOutcome::OperatorTakeover);

        let status = h.dispatcher.pauses().is_paused("U1").await.unwrap();
        assert!(status.paused);
        assert_eq!(status.minutes_remaining, 120);

        h.clock.advance(TimeDelta::minutes(30));
        let outcome = h.dispatcher.dispatch(msg("oi")).await;
        assert_eq!(outcome, DispatchOutcome::Suppressed { minutes_remaining: 90 });
        assert!(h.channel.texts().is_empty());
    }

    #[tokio::test]
    async fn pause_expires_on_its_own() {
        let h = harness().await;
        h.dispatcher
            .dispatch(InboundEvent::operator("U1", "Maria", "assumindo"))
            .await;
        h.clock.advance(TimeDelta::hours(2) + TimeDelta::seconds(1));

        let outcome = h.dispatcher.dispatch(msg("oi")).await;
        assert_eq!(outcome, DispatchOutcome::Replied { step: Step::AwaitingCategory });
    }

    #[tokio::test]
    async fn reactivation_resumes_at_prior_step() {
        let h = harness().await;
        say_all(&h, &["oi", "fabricacao"]).await;
        h.dispatcher
            .dispatch(InboundEvent::operator("U1", "Maria", "um momento"))
            .await;

        let outcome = h.dispatcher.dispatch(msg("  #ATIVAR ")).await;
        assert_eq!(outcome, DispatchOutcome::Reactivated { cleared: true });
        assert_eq!(h.channel.texts().last().unwrap(), REACTIVATED_REPLY);

        let outcome = h.dispatcher.dispatch(msg("sofa")).await;
        assert_eq!(outcome, DispatchOutcome::Replied { step: Step::AwaitingHasDesign });
    }

    #[tokio::test]
    async fn reactivation_when_not_paused_reports_already_active() {
        let h = harness().await;
        let outcome = h.dispatcher.dispatch(msg("#ativar")).await;
        assert_eq!(outcome, DispatchOutcome::Reactivated { cleared: false });
        assert_eq!(h.channel.texts(), vec![ALREADY_ACTIVE_REPLY.to_string()]);
        assert!(h.dispatcher.sessions().is_empty().await);
    }

    #[tokio::test]
    async fn operator_can_reactivate_from_business_account() {
        let h = harness().await;
        h.dispatcher
            .dispatch(InboundEvent::operator("U1", "Maria", "assumindo"))
            .await;
        let outcome = h
            .dispatcher
            .dispatch(InboundEvent::operator("U1", "Maria", "#ativar"))
            .await;
        assert_eq!(outcome, DispatchOutcome::Reactivated { cleared: true });
        assert!(!h.dispatcher.pauses().is_paused("U1").await.unwrap().paused);
    }

    #[tokio::test]
    async fn malformed_date_reprompts() {
        let h = harness().await;
        say_all(&h, &["oi", "fabricacao", "sofa", "nao", "online"]).await;

        let outcome = h.dispatcher.dispatch(msg("tomorrow")).await;
        assert_eq!(outcome, DispatchOutcome::Replied { step: Step::AwaitingDatetime });
        assert!(h.intakes.saved.lock().unwrap().is_empty());
        assert!(h.channel.texts().last().unwrap().contains("DD/MM/AAAA HH:MM"));
    }

    #[tokio::test]
    async fn persistence_failure_keeps_session_for_retry() {
        let h = harness().await;
        *h.intakes.failing.lock().unwrap() = true;
        let outcomes = say_all(&h, &["oi", "atendente"]).await;
        // "atendente" is not a workshop category
        assert_eq!(outcomes[1], DispatchOutcome::Replied { step: Step::AwaitingCategory });

        let outcomes = say_all(&h, &["reforma", "cama", "foto", "presencial", "01/12/2025 09:00"]).await;
        assert_eq!(outcomes[4], DispatchOutcome::FinalizeFailed);
        assert_eq!(h.channel.texts().last().unwrap(), catalog::FINALIZE_FAILED);

        let handle = h.dispatcher.sessions().get("U1").await.unwrap();
        assert_eq!(handle.lock().await.step, Step::Finalize);

        *h.intakes.failing.lock().unwrap() = false;
        let outcome = h.dispatcher.dispatch(msg("tentar de novo")).await;
        assert_eq!(outcome, DispatchOutcome::Finalized { intake_id: 1 });

        let saved = h.intakes.saved.lock().unwrap().clone();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].service, "Reforma");
        assert_eq!(saved[0].scheduled_for, "01/12/2025 09:00");
    }

    #[tokio::test]
    async fn calendar_failure_does_not_block_finalize() {
        let mut h = harness().await;
        h.dispatcher = h.dispatcher.with_calendar(Arc::new(FailingCalendar));
        let outcomes = say_all(
            &h,
            &["oi", "fabricacao", "cama", "sim", "foto", "online", "10/11/2025 10:00"],
        )
        .await;
        assert_eq!(outcomes[6], DispatchOutcome::Finalized { intake_id: 1 });
        let saved = h.intakes.saved.lock().unwrap().clone();
        assert!(saved[0].details.contains("Possui projeto: Sim"));
    }

    #[tokio::test]
    async fn pause_store_failure_fails_open() {
        let h = harness_with(test_config(), Some(Arc::new(BrokenPauses))).await;
        let outcome = h.dispatcher.dispatch(msg("oi")).await;
        assert_eq!(outcome, DispatchOutcome::Replied { step: Step::AwaitingCategory });

        let outcome = h
            .dispatcher
            .dispatch(InboundEvent::operator("U1", "Maria", "assumindo"))
            .await;
        assert_eq!(outcome, DispatchOutcome::OperatorTakeover);

        let outcome = h.dispatcher.dispatch(msg("#ativar")).await;
        assert_eq!(outcome, DispatchOutcome::Reactivated { cleared: false });
    }

    #[tokio::test(start_paused = true)]
    async fn redelivery_within_grace_is_dropped() {
        let config = BotConfig {
            dedup_grace: Duration::from_secs(2),
            ..BotConfig::default()
        };
        // Paused time auto-advances whenever the runtime idles, so keep
        // database I/O out of this test.
        let h = harness_with(config, Some(Arc::new(BrokenPauses))).await;

        assert_eq!(
            h.dispatcher.dispatch(msg("oi")).await,
            DispatchOutcome::Replied { step: Step::AwaitingCategory }
        );
        assert_eq!(h.dispatcher.dispatch(msg("oi")).await, DispatchOutcome::Duplicate);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(
            h.dispatcher.dispatch(msg("fabricacao")).await,
            DispatchOutcome::Replied { step: Step::AwaitingSubtype }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_final_messages_save_once() {
        let h = Arc::new(harness().await);
        say_all(&h, &["oi", "fabricacao", "sofa", "nao", "online"]).await;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let h = h.clone();
            tasks.push(tokio::spawn(async move {
                h.dispatcher.dispatch(msg("25/10/2025 14:30")).await
            }));
        }
        let mut finalized = 0;
        for task in tasks {
            if matches!(task.await.unwrap(), DispatchOutcome::Finalized { .. }) {
                finalized += 1;
            }
        }
        assert_eq!(finalized, 1);
        assert_eq!(h.intakes.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn service_desk_flow_is_configurable() {
        let config = BotConfig {
            flow: FlowKind::ServiceDesk,
            ..test_config()
        };
        let h = harness_with(config, None).await;
        let outcomes = say_all(&h, &["olá", "4"]).await;
        assert_eq!(outcomes[1], DispatchOutcome::Finalized { intake_id: 1 });
        let saved = h.intakes.saved.lock().unwrap().clone();
        assert_eq!(saved[0].service, "Atendimento humano");
        assert_eq!(saved[0].scheduled_for, "N/A");
    }

    #[tokio::test]
    async fn ai_mode_saves_intake_once() {
        let config = BotConfig {
            mode: ConversationMode::Ai,
            ..test_config()
        };
        let mut h = harness_with(config, None).await;
        let ai = AiResponder::new(
            Arc::new(ScriptedGenerator::replying("Claro, me conte mais!", Intent::Reforma)),
            Duration::from_secs(5),
            3,
            "(83) 3241-1234",
        );
        h.dispatcher = h.dispatcher.with_ai(ai);
        assert_eq!(h.dispatcher.mode(), ConversationMode::Ai);

        let outcomes = say_all(&h, &["quero reformar", "meu sofá", "é de couro"]).await;
        assert_eq!(outcomes[0], DispatchOutcome::AiReplied { intake_id: None });
        assert_eq!(outcomes[1], DispatchOutcome::AiReplied { intake_id: Some(1) });
        assert_eq!(outcomes[2], DispatchOutcome::AiReplied { intake_id: None });

        let saved = h.intakes.saved.lock().unwrap().clone();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].status, IntakeStatus::InProgress);
        assert_eq!(h.channel.texts().len(), 3);

        let handle = h.dispatcher.sessions().get("U1").await.unwrap();
        let session = handle.lock().await;
        assert_eq!(session.step, Step::Conversing { intake_saved: true });
        assert!(session.field(IntakeField::Service).is_none());
    }

    #[tokio::test]
    async fn ai_mode_without_responder_runs_menus() {
        let config = BotConfig {
            mode: ConversationMode::Ai,
            ..test_config()
        };
        let h = harness_with(config, None).await;
        assert_eq!(h.dispatcher.mode(), ConversationMode::Menu);
        let status = h.dispatcher.status().await;
        assert_eq!(status.mode, "menu");
        assert!(status.ai_model.is_none());
    }

    #[tokio::test]
    async fn operator_takeover_waits_for_reply_in_progress() {
        let h = Arc::new(harness().await);
        *h.channel.delay.lock().unwrap() = Duration::from_millis(300);

        let customer = {
            let h = h.clone();
            tokio::spawn(async move { h.dispatcher.dispatch(msg("oi")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let outcome = h
            .dispatcher
            .dispatch(InboundEvent::operator("U1", "Maria", "deixa comigo"))
            .await;
        assert_eq!(outcome, DispatchOutcome::OperatorTakeover);
        // The greeting already going out landed before the pause.
        assert_eq!(h.channel.texts().len(), 1);
        assert_eq!(
            customer.await.unwrap(),
            DispatchOutcome::Replied { step: Step::AwaitingCategory }
        );

        *h.channel.delay.lock().unwrap() = Duration::ZERO;
        let outcome = h.dispatcher.dispatch(msg("fabricacao")).await;
        assert_eq!(outcome, DispatchOutcome::Suppressed { minutes_remaining: 120 });
        assert_eq!(h.channel.texts().len(), 1);
    }

    #[tokio::test]
    async fn stalled_send_does_not_lock_the_user_out() {
        let config = BotConfig {
            collaborator_timeout: Duration::from_millis(100),
            ..test_config()
        };
        let h = harness_with(config, None).await;
        *h.channel.delay.lock().unwrap() = Duration::from_secs(3600);

        let started = std::time::Instant::now();
        let outcome = h.dispatcher.dispatch(msg("oi")).await;
        assert_eq!(outcome, DispatchOutcome::Replied { step: Step::AwaitingCategory });
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(h.channel.texts().is_empty());

        *h.channel.delay.lock().unwrap() = Duration::ZERO;
        let outcome = h.dispatcher.dispatch(msg("fabricacao")).await;
        assert_eq!(outcome, DispatchOutcome::Replied { step: Step::AwaitingSubtype });
    }

    #[tokio::test]
    async fn operator_takeover_after_finalize_still_pauses() {
        let h = harness().await;
        say_all(&h, &["oi", "fabricacao", "sofa", "nao", "online", "25/10/2025 14:30"]).await;

        let outcome = h
            .dispatcher
            .dispatch(InboundEvent::operator("U1", "Maria", "obrigada pelo contato"))
            .await;
        assert_eq!(outcome, DispatchOutcome::OperatorTakeover);
        assert!(h.dispatcher.pauses().is_paused("U1").await.unwrap().paused);
    }
}

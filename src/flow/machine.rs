//! The menu state machine.
//!
//! `advance` is total: every step and every input yields a next step and a
//! non-empty reply. Unrecognized input re-sends the current prompt; a step
//! that cannot be reached in the configured flow, or whose earlier answers
//! are missing, restarts the session at the main menu.

use tracing::warn;

use crate::calendar::CalendarEvent;
use crate::config::BotConfig;
use crate::flow::catalog::{self, FABRICATION, NO, REFORM, YES};
use crate::flow::intake::IntakeField;
use crate::flow::menu::{MenuOption, Outbound, match_option};
use crate::flow::schedule::parse_schedule;
use crate::flow::state::Step;
use crate::flow::FlowKind;
use crate::session::Session;

/// Result of feeding one input to the machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: Step,
    /// Sent as-is, or after persistence succeeds when `finalize` is set.
    pub reply: Outbound,
    /// Visit to book before finalizing.
    pub calendar: Option<CalendarEvent>,
    /// Build and persist the intake record, then close the session.
    pub finalize: bool,
}

impl Transition {
    fn to(next: Step, reply: Outbound) -> Self {
        Self {
            next,
            reply,
            calendar: None,
            finalize: false,
        }
    }

    fn finish(reply: Outbound) -> Self {
        Self {
            next: Step::Finalize,
            reply,
            calendar: None,
            finalize: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MenuMachine {
    flow: FlowKind,
    numeric_shortcuts: bool,
    business_name: String,
    business_phone: String,
    timezone: String,
}

impl MenuMachine {
    pub fn new(config: &BotConfig) -> Self {
        Self {
            flow: config.flow,
            numeric_shortcuts: config.numeric_shortcuts,
            business_name: config.business_name.clone(),
            business_phone: config.business_phone.clone(),
            timezone: config.timezone.clone(),
        }
    }

    pub fn flow(&self) -> FlowKind {
        self.flow
    }

    /// Feed one customer input to the session's current step.
    pub fn advance(&self, session: &mut Session, input: &str) -> Transition {
        if !session.step.belongs_to(self.flow) {
            warn!(
                user_id = %session.user_id,
                step = %session.step,
                flow = %self.flow,
                "Step not part of configured flow, restarting session"
            );
            return self.restart(session);
        }

        let transition = match session.step {
            Step::Start => Some(self.restart(session)),
            Step::AwaitingCategory => Some(self.on_category(session, input)),
            Step::AwaitingSubtype => self.on_subtype(session, input),
            Step::AwaitingHasDesign => self.on_has_design(session, input),
            Step::AwaitingPhoto => self.on_photo(session, input),
            Step::AwaitingMeetingKind => self.on_meeting_kind(session, input),
            Step::AwaitingVisitChoice => self.on_visit_choice(session, input),
            Step::AwaitingDatetime => self.on_datetime(session, input),
            Step::Finalize => self.on_retry(session),
            Step::Conversing { .. } => None,
        };

        transition.unwrap_or_else(|| {
            warn!(
                user_id = %session.user_id,
                step = %session.step,
                "Session missing earlier answers, restarting"
            );
            self.restart(session)
        })
    }

    /// Clear the session and show the main menu.
    pub fn restart(&self, session: &mut Session) -> Transition {
        session.reset();
        Transition::to(Step::AwaitingCategory, self.main_menu(&session.display_name))
    }

    fn main_menu(&self, customer: &str) -> Outbound {
        Outbound::Menu {
            prompt: catalog::greeting(customer, &self.business_name),
            options: catalog::categories(self.flow).to_vec(),
        }
    }

    fn pick<'a>(&self, input: &str, options: &'a [MenuOption]) -> Option<&'a MenuOption> {
        match_option(input, options, self.numeric_shortcuts)
    }

    fn invalid(&self, step: Step, prompt: Outbound) -> Transition {
        Transition::to(step, prompt.with_prefix(catalog::INVALID_OPTION))
    }

    fn datetime_prompt() -> Outbound {
        Outbound::text(catalog::DATETIME_HINT)
    }

    fn meeting_prompt() -> Outbound {
        Outbound::Buttons {
            prompt: catalog::MEETING_PROMPT.to_string(),
            buttons: catalog::MEETING_KINDS.to_vec(),
        }
    }

    fn yes_no(prompt: &str) -> Outbound {
        Outbound::Buttons {
            prompt: prompt.to_string(),
            buttons: catalog::YES_NO.to_vec(),
        }
    }

    fn subtype_menu(category: &str) -> Outbound {
        Outbound::Menu {
            prompt: catalog::subtype_prompt(category).to_string(),
            options: catalog::FURNITURE.to_vec(),
        }
    }

    // ── Steps ───────────────────────────────────────────────────────

    fn on_category(&self, session: &mut Session, input: &str) -> Transition {
        let Some(option) = self.pick(input, catalog::categories(self.flow)) else {
            return self.invalid(Step::AwaitingCategory, self.main_menu(&session.display_name));
        };

        session.set_field(IntakeField::Category, option.id);
        if let Some(service) = catalog::service_name(option.id) {
            session.set_field(IntakeField::Service, service);
        }

        match option.id {
            FABRICATION | REFORM => {
                Transition::to(Step::AwaitingSubtype, Self::subtype_menu(option.id))
            }
            catalog::QUOTE => Transition::to(
                Step::AwaitingVisitChoice,
                Self::yes_no(catalog::QUOTE_VISIT_PROMPT),
            ),
            catalog::SCHEDULE_VISIT => Transition::to(
                Step::AwaitingDatetime,
                Outbound::text(catalog::schedule_visit_prompt()),
            ),
            catalog::ORDER_STATUS => Transition::finish(Outbound::text(
                catalog::order_status_reply(&self.business_phone),
            )),
            _ => Transition::finish(Outbound::text(catalog::HUMAN_AGENT_REPLY)),
        }
    }

    fn on_subtype(&self, session: &mut Session, input: &str) -> Option<Transition> {
        let category = session.field(IntakeField::Category)?.to_string();
        if category != FABRICATION && category != REFORM {
            return None;
        }

        let Some(option) = self.pick(input, catalog::FURNITURE) else {
            return Some(self.invalid(Step::AwaitingSubtype, Self::subtype_menu(&category)));
        };
        session.set_field(IntakeField::Subtype, option.label);

        Some(if category == FABRICATION {
            Transition::to(
                Step::AwaitingHasDesign,
                Self::yes_no(catalog::HAS_DESIGN_PROMPT),
            )
        } else {
            Transition::to(
                Step::AwaitingPhoto,
                Outbound::text(catalog::REFORM_PHOTO_PROMPT),
            )
        })
    }

    fn on_has_design(&self, session: &mut Session, input: &str) -> Option<Transition> {
        if session.field(IntakeField::Category)? != FABRICATION {
            return None;
        }
        session.field(IntakeField::Subtype)?;

        let Some(option) = self.pick(input, catalog::YES_NO) else {
            return Some(self.invalid(
                Step::AwaitingHasDesign,
                Self::yes_no(catalog::HAS_DESIGN_PROMPT),
            ));
        };
        session.set_field(IntakeField::HasDesign, option.label);

        Some(match option.id {
            YES => Transition::to(
                Step::AwaitingPhoto,
                Outbound::text(catalog::DESIGN_PHOTO_PROMPT),
            ),
            _ => Transition::to(Step::AwaitingMeetingKind, Self::meeting_prompt()),
        })
    }

    fn on_photo(&self, session: &mut Session, input: &str) -> Option<Transition> {
        session.field(IntakeField::Subtype)?;

        let photo = input.trim();
        if photo.is_empty() {
            return Some(Transition::to(
                Step::AwaitingPhoto,
                Outbound::text(catalog::PHOTO_REQUIRED),
            ));
        }
        session.set_field(IntakeField::Photo, truncate_chars(photo, 200));

        Some(Transition::to(Step::AwaitingMeetingKind, Self::meeting_prompt()))
    }

    fn on_meeting_kind(&self, session: &mut Session, input: &str) -> Option<Transition> {
        session.field(IntakeField::Subtype)?;

        let Some(option) = self.pick(input, catalog::MEETING_KINDS) else {
            return Some(self.invalid(Step::AwaitingMeetingKind, Self::meeting_prompt()));
        };
        session.set_field(IntakeField::MeetingKind, option.label);

        Some(Transition::to(Step::AwaitingDatetime, Self::datetime_prompt()))
    }

    fn on_visit_choice(&self, session: &mut Session, input: &str) -> Option<Transition> {
        session.field(IntakeField::Service)?;

        let Some(option) = self.pick(input, catalog::YES_NO) else {
            return Some(self.invalid(
                Step::AwaitingVisitChoice,
                Self::yes_no(catalog::QUOTE_VISIT_PROMPT),
            ));
        };
        session.set_field(IntakeField::WantsVisit, option.label);

        Some(match option.id {
            NO => Transition::finish(Outbound::text(catalog::no_visit_reply(
                &self.business_name,
            ))),
            _ => Transition::to(Step::AwaitingDatetime, Self::datetime_prompt()),
        })
    }

    fn on_datetime(&self, session: &mut Session, input: &str) -> Option<Transition> {
        let service = session.field(IntakeField::Service)?.to_string();

        let Some(schedule) = parse_schedule(input) else {
            return Some(Transition::to(
                Step::AwaitingDatetime,
                Outbound::text(catalog::INVALID_DATETIME),
            ));
        };
        let when = schedule.display();
        session.set_field(IntakeField::ScheduledFor, when.clone());

        let event = CalendarEvent::visit(
            &session.display_name,
            &session.user_id,
            &service,
            schedule.at,
            &self.timezone,
        );
        let mut transition = Transition::finish(Outbound::text(catalog::scheduled_reply(
            &when,
            &self.business_name,
        )));
        transition.calendar = Some(event);
        Some(transition)
    }

    fn on_retry(&self, session: &mut Session) -> Option<Transition> {
        session.field(IntakeField::Service)?;
        Some(Transition::finish(Outbound::text(catalog::registered_reply(
            &self.business_name,
        ))))
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn machine(flow: FlowKind) -> MenuMachine {
        MenuMachine::new(&BotConfig {
            flow,
            ..BotConfig::default()
        })
    }

    fn session() -> Session {
        Session::new("5583999990000", "Maria", Utc::now(), 10)
    }

    /// Feed inputs, applying each transition's step like the dispatcher does.
    fn run(m: &MenuMachine, s: &mut Session, inputs: &[&str]) -> Transition {
        let mut last = None;
        for input in inputs {
            let t = m.advance(s, input);
            s.step = t.next;
            last = Some(t);
        }
        last.unwrap()
    }

    #[test]
    fn start_shows_main_menu() {
        let m = machine(FlowKind::Workshop);
        let mut s = session();
        let t = m.advance(&mut s, "oi");
        assert_eq!(t.next, Step::AwaitingCategory);
        match &t.reply {
            Outbound::Menu { prompt, options } => {
                assert!(prompt.contains("Maria"));
                assert!(prompt.contains("Artestofados"));
                assert_eq!(options.len(), 2);
            }
            other => panic!("expected menu, got {other:?}"),
        }
    }

    #[test]
    fn fabrication_happy_path() {
        let m = machine(FlowKind::Workshop);
        let mut s = session();
        let t = run(
            &m,
            &mut s,
            &["oi", "fabricacao", "sofa", "nao", "online", "25/10/2025 14:30"],
        );

        assert!(t.finalize);
        assert!(t.reply.body().contains("25/10/2025 14:30"));
        let event = t.calendar.unwrap();
        assert_eq!(event.summary, "Visita - Maria");
        assert_eq!(s.field(IntakeField::Service), Some("Fabricação"));
        assert_eq!(s.field(IntakeField::Subtype), Some("Sofá"));
        assert_eq!(s.field(IntakeField::HasDesign), Some("Não"));
        assert_eq!(s.field(IntakeField::MeetingKind), Some("Online"));
        assert_eq!(s.field(IntakeField::ScheduledFor), Some("25/10/2025 14:30"));
    }

    #[test]
    fn design_branch_asks_for_photo() {
        let m = machine(FlowKind::Workshop);
        let mut s = session();
        let t = run(&m, &mut s, &["oi", "1", "2", "sim"]);
        assert_eq!(t.next, Step::AwaitingPhoto);
        assert_eq!(s.field(IntakeField::Subtype), Some("Cadeira"));

        let t = run(&m, &mut s, &["[imagem] projeto da cadeira"]);
        assert_eq!(t.next, Step::AwaitingMeetingKind);
        assert!(matches!(t.reply, Outbound::Buttons { .. }));
    }

    #[test]
    fn reform_skips_design_question() {
        let m = machine(FlowKind::Workshop);
        let mut s = session();
        let t = run(&m, &mut s, &["oi", "Reforma", "poltrona"]);
        assert_eq!(t.next, Step::AwaitingPhoto);

        let t = run(&m, &mut s, &["tecido rasgado", "presencial"]);
        assert_eq!(t.next, Step::AwaitingDatetime);
        assert_eq!(s.field(IntakeField::Service), Some("Reforma"));
        assert_eq!(s.field(IntakeField::Photo), Some("tecido rasgado"));
    }

    #[test]
    fn invalid_selection_reprompts_without_advancing() {
        let m = machine(FlowKind::Workshop);
        let mut s = session();
        run(&m, &mut s, &["oi"]);

        let t = m.advance(&mut s, "pintura");
        assert_eq!(t.next, Step::AwaitingCategory);
        assert!(t.reply.body().starts_with(catalog::INVALID_OPTION));
        assert!(matches!(t.reply, Outbound::Menu { .. }));
        assert!(!t.finalize);
    }

    #[test]
    fn malformed_date_keeps_step() {
        let m = machine(FlowKind::Workshop);
        let mut s = session();
        run(&m, &mut s, &["oi", "fabricacao", "sofa", "nao", "online"]);
        assert_eq!(s.step, Step::AwaitingDatetime);

        for bad in ["tomorrow", "31/02/2025 10:00"] {
            let t = m.advance(&mut s, bad);
            assert_eq!(t.next, Step::AwaitingDatetime);
            assert!(!t.finalize);
            assert!(t.calendar.is_none());
            assert!(t.reply.body().contains("DD/MM/AAAA HH:MM"));
        }
        assert!(s.field(IntakeField::ScheduledFor).is_none());
    }

    #[test]
    fn numeric_shortcuts_can_be_disabled() {
        let m = MenuMachine::new(&BotConfig {
            numeric_shortcuts: false,
            ..BotConfig::default()
        });
        let mut s = session();
        run(&m, &mut s, &["oi"]);
        let t = m.advance(&mut s, "1");
        assert_eq!(t.next, Step::AwaitingCategory);
    }

    #[test]
    fn service_desk_branches() {
        let m = machine(FlowKind::ServiceDesk);

        let mut s = session();
        let t = run(&m, &mut s, &["oi", "orcamento", "nao"]);
        assert!(t.finalize);
        assert!(t.calendar.is_none());
        assert_eq!(s.field(IntakeField::Service), Some("Orçamento"));

        let mut s = session();
        let t = run(&m, &mut s, &["oi", "1", "s", "15/10/2025 14:30"]);
        assert!(t.finalize);
        assert!(t.calendar.is_some());

        let mut s = session();
        let t = run(&m, &mut s, &["oi", "agendar"]);
        assert_eq!(t.next, Step::AwaitingDatetime);

        let mut s = session();
        let t = run(&m, &mut s, &["oi", "3"]);
        assert!(t.finalize);
        assert!(t.reply.body().contains("(83) 3241-1234"));
        assert_eq!(s.field(IntakeField::Service), Some("Consulta de pedido"));

        let mut s = session();
        let t = run(&m, &mut s, &["oi", "Falar com atendente"]);
        assert!(t.finalize);
        assert_eq!(s.field(IntakeField::Service), Some("Atendimento humano"));
    }

    #[test]
    fn foreign_step_resets_to_menu() {
        let m = machine(FlowKind::ServiceDesk);
        let mut s = session();
        s.step = Step::AwaitingSubtype;
        s.set_field(IntakeField::Category, FABRICATION);

        let t = m.advance(&mut s, "sofa");
        assert_eq!(t.next, Step::AwaitingCategory);
        assert!(matches!(t.reply, Outbound::Menu { .. }));
        assert!(s.fields.is_empty());
    }

    #[test]
    fn missing_prerequisite_resets_to_menu() {
        let m = machine(FlowKind::Workshop);
        let mut s = session();
        s.step = Step::AwaitingDatetime;

        let t = m.advance(&mut s, "25/10/2025 14:30");
        assert_eq!(t.next, Step::AwaitingCategory);
        assert!(!t.finalize);
    }

    #[test]
    fn finalize_step_retries() {
        let m = machine(FlowKind::Workshop);
        let mut s = session();
        s.step = Step::Finalize;
        s.set_field(IntakeField::Service, "Reforma");

        let t = m.advance(&mut s, "oi?");
        assert!(t.finalize);
        assert_eq!(t.next, Step::Finalize);
    }

    #[test]
    fn every_step_and_input_yields_a_reply() {
        let steps = [
            Step::Start,
            Step::AwaitingCategory,
            Step::AwaitingSubtype,
            Step::AwaitingHasDesign,
            Step::AwaitingPhoto,
            Step::AwaitingMeetingKind,
            Step::AwaitingVisitChoice,
            Step::AwaitingDatetime,
            Step::Finalize,
            Step::Conversing { intake_saved: false },
        ];
        let inputs = ["", "oi", "1", "99", "sim", "nao", "sofa", "online", "#", "25/10/2025 14:30"];

        for flow in [FlowKind::Workshop, FlowKind::ServiceDesk] {
            let m = machine(flow);
            for step in steps {
                for with_fields in [false, true] {
                    for input in inputs {
                        let mut s = session();
                        s.step = step;
                        if with_fields {
                            s.set_field(IntakeField::Category, FABRICATION);
                            s.set_field(IntakeField::Service, "Fabricação");
                            s.set_field(IntakeField::Subtype, "Sofá");
                        }
                        let t = m.advance(&mut s, input);
                        assert!(
                            !t.reply.body().trim().is_empty(),
                            "empty reply for {flow} {step} {input:?}"
                        );
                        assert!(t.next.belongs_to(flow), "{flow} {step} -> {}", t.next);
                    }
                }
            }
        }
    }
}

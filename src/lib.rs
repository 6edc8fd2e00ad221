//! Intake Bot: WhatsApp customer intake with human takeover.

pub mod ai;
pub mod calendar;
pub mod channels;
pub mod cleanup;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod flow;
pub mod server;
pub mod session;
pub mod store;

//! Conversation sessions and human-takeover pauses.

pub mod model;
pub mod pause;
pub mod store;

pub use model::{HistoryEntry, Role, Session};
pub use pause::{PauseStatus, PauseStore, PausedUser};
pub use store::{SessionHandle, SessionStore};

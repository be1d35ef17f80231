//! Domain types for Haunter
//!
//! Core domain types: Session, Action, and the handles issued by external
//! collaborators (job IDs, notification handles).

mod action;
mod handles;
mod id;
mod session;

pub use action::{Action, ActionTag};
pub use handles::{JobId, JobKind, NotificationHandle};
pub use id::SessionId;
pub use session::{PersonaKind, Session, SessionStatus};

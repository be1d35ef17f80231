//! Correlation registries shared by every Haunter
//!
//! Both registries are shared across sessions, so every operation takes the
//! registry lock for its whole check-then-act sequence.

mod jobs;
mod notifications;

pub use jobs::{JobRegistry, RegistryError};
pub use notifications::{CancelReport, NotificationCorrelator};

//! Haunter - Haunting & Escalation Engine
//!
//! Haunter keeps reminding a user about a commitment, with growing delays and
//! a sharpening tone, until the commitment is resolved. Each tracked session is
//! owned by one Haunter state machine, specialized by a persona.
//!
//! # Core Concepts
//!
//! - **Persist first**: every transition is stored before any job or message
//! - **One job per kind**: the registry holds at most one live job per (session, kind)
//! - **Nothing dangles**: completing a session cancels its jobs and outstanding messages
//! - **Replies are data**: free text becomes a closed [`domain::Action`] or `Unknown`
//!
//! # Modules
//!
//! - [`backoff`] - Follow-up delay curve
//! - [`registry`] - Job registry and notification correlator
//! - [`haunter`] - State machine, personas and the manager
//! - [`intent`] - Reply classification and validation
//! - [`recovery`] - Re-arming sessions after a restart
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod backoff;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod executor;
pub mod haunter;
pub mod intent;
pub mod llm;
pub mod recovery;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod transport;

// Re-export commonly used types
pub use backoff::{BackoffPolicy, next_delay};
pub use config::Config;
pub use domain::{Action, ActionTag, JobId, JobKind, NotificationHandle, PersonaKind, Session, SessionId, SessionStatus};
pub use error::{HauntError, Result};
pub use executor::{CommandExecutor, ExecutorError};
pub use haunter::{Collaborators, HauntManager, Haunter, Persona};
pub use intent::{IntentClassifier, IntentRouter, RawIntent};
pub use recovery::{RecoveryPlan, RecoveryStats, recover, scan_for_recovery};
pub use registry::{JobRegistry, NotificationCorrelator};
pub use scheduler::{Clock, JobCallback, SchedulingEngine, SystemClock, TokioScheduler};
pub use state::{SessionStore, StateManager};
pub use transport::{Notification, NotificationKind, NotificationTransport, Tone, TransportError};

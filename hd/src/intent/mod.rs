//! Intent routing: free-text reply -> validated [`crate::domain::Action`]

pub mod classifier;
mod router;

pub use classifier::{ClassifierContext, ClassifierError, IntentClassifier, LlmIntentClassifier, RawIntent};
pub use router::{IntentRouter, PostponeLimits};

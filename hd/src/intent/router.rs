//! IntentRouter - raw text to a validated Action
//!
//! Total by construction: every path ends in an [`Action`], classifier
//! failures included.

use std::sync::Arc;
use tracing::{debug, warn};

use super::classifier::{ClassifierContext, IntentClassifier, RawIntent};
use crate::domain::{Action, ActionTag};

/// Postpone bounds for one persona
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostponeLimits {
    /// Used when the reply names no duration
    pub default_minutes: u32,
    /// Longest accepted postpone
    pub max_minutes: u32,
}

impl Default for PostponeLimits {
    fn default() -> Self {
        Self {
            default_minutes: 15,
            max_minutes: 1440,
        }
    }
}

impl PostponeLimits {
    /// Clamp a requested duration into `[1, max_minutes]`, defaulting when absent
    pub fn clamp(&self, requested: Option<i64>) -> u32 {
        let ceiling = self.max_minutes.max(1);
        match requested {
            None => self.default_minutes.clamp(1, ceiling),
            Some(m) => m.clamp(1, i64::from(ceiling)) as u32,
        }
    }
}

/// Routes replies through the classifier and validates the result
#[derive(Clone)]
pub struct IntentRouter {
    classifier: Arc<dyn IntentClassifier>,
}

impl IntentRouter {
    pub fn new(classifier: Arc<dyn IntentClassifier>) -> Self {
        Self { classifier }
    }

    /// Classify a reply; never fails
    pub async fn classify(&self, text: &str, context: &ClassifierContext, limits: PostponeLimits) -> Action {
        debug!(persona = %context.persona, text_len = text.len(), "IntentRouter::classify: called");
        if text.trim().is_empty() {
            debug!("IntentRouter::classify: blank reply");
            return Action::Unknown;
        }

        match self.classifier.classify_free_text(text, context).await {
            Ok(raw) => Self::validate(raw, &context.accepted_tags, limits),
            Err(e) => {
                warn!(persona = %context.persona, error = %e, "Classifier failed, treating reply as unknown");
                Action::Unknown
            }
        }
    }

    /// Constrain a raw intent to the accepted tag set
    pub fn validate(raw: RawIntent, accepted: &[ActionTag], limits: PostponeLimits) -> Action {
        let Some(tag) = ActionTag::parse(&raw.action) else {
            debug!(action = %raw.action, "IntentRouter::validate: unrecognised tag");
            return Action::Unknown;
        };
        if !accepted.contains(&tag) {
            debug!(%tag, "IntentRouter::validate: tag not accepted by persona");
            return Action::Unknown;
        }

        match tag {
            ActionTag::Postpone => Action::Postpone {
                minutes: limits.clamp(raw.minutes),
            },
            ActionTag::MarkDone => Action::MarkDone,
            ActionTag::CreateEvent => match raw.commit_time.map(|w| w.trim().to_string()) {
                Some(when) if !when.is_empty() => Action::CreateEvent { when },
                _ => {
                    debug!("IntentRouter::validate: create_event without a time");
                    Action::Unknown
                }
            },
            ActionTag::Unknown => Action::Unknown,
        }
    }
}

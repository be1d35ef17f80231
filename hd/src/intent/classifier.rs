//! Free-text intent classification
//!
//! The classifier is unreliable by contract: it may fail, return an unknown
//! tag or omit fields. Validation happens in [`super::IntentRouter`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::domain::{ActionTag, PersonaKind};
use crate::llm::{CompletionRequest, LlmClient, LlmError, Message};

/// Unvalidated classifier output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawIntent {
    /// Tag as the classifier spelled it
    pub action: String,

    /// Postpone duration, if the reply named one
    #[serde(default)]
    pub minutes: Option<i64>,

    /// Free-form time for `create_event`
    #[serde(default)]
    pub commit_time: Option<String>,
}

impl RawIntent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    pub fn with_minutes(mut self, minutes: i64) -> Self {
        self.minutes = Some(minutes);
        self
    }

    pub fn with_commit_time(mut self, when: impl Into<String>) -> Self {
        self.commit_time = Some(when.into());
        self
    }
}

/// What the classifier is told about the conversation
#[derive(Debug, Clone)]
pub struct ClassifierContext {
    pub persona: PersonaKind,
    pub title: String,
    pub accepted_tags: Vec<ActionTag>,
    pub now: DateTime<Utc>,
}

/// Errors from a classifier backend
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Malformed classifier output: {0}")]
    Malformed(String),
}

/// Text -> raw intent, treated as a black box
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify_free_text(&self, text: &str, context: &ClassifierContext) -> Result<RawIntent, ClassifierError>;
}

/// Classifier backed by an LLM completion
pub struct LlmIntentClassifier {
    llm: Arc<dyn LlmClient>,
    max_tokens: u32,
}

impl LlmIntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm, max_tokens: 256 }
    }

    fn system_prompt(context: &ClassifierContext) -> String {
        let tags: Vec<&str> = context.accepted_tags.iter().map(|t| t.as_str()).collect();
        format!(
            "You interpret a user's reply to a reminder about \"{title}\" ({persona} reminder). \
             The current time is {now}.\n\
             Answer with a single JSON object and nothing else, shaped as \
             {{\"action\": <tag>, \"minutes\": <integer or null>, \"commit_time\": <string or null>}}.\n\
             Allowed tags: {tags}.\n\
             Use \"postpone\" with minutes when the user asks for more time, \"mark_done\" when they \
             say it is finished, \"create_event\" with commit_time when they name a time to do it, \
             and \"unknown\" for anything else.",
            title = context.title,
            persona = context.persona,
            now = context.now.to_rfc3339(),
            tags = tags.join(", "),
        )
    }
}

/// Pull the JSON object out of a model answer (tolerates code fences and prose)
pub(crate) fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify_free_text(&self, text: &str, context: &ClassifierContext) -> Result<RawIntent, ClassifierError> {
        debug!(persona = %context.persona, text_len = text.len(), "LlmIntentClassifier::classify_free_text: called");
        let request = CompletionRequest {
            system_prompt: Self::system_prompt(context),
            messages: vec![Message::user(text)],
            max_tokens: self.max_tokens,
        };

        let response = self.llm.complete(request).await?;
        let content = response
            .content
            .ok_or_else(|| ClassifierError::Malformed("empty response".to_string()))?;
        let json = extract_json(&content).ok_or_else(|| ClassifierError::Malformed(content.clone()))?;

        serde_json::from_str(json).map_err(|e| ClassifierError::Malformed(format!("{}: {}", e, json)))
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Classifier that returns a fixed answer, or fails when none is set
    #[derive(Default)]
    pub struct MockClassifier {
        answer: Mutex<Option<RawIntent>>,
        calls: AtomicUsize,
    }

    impl MockClassifier {
        pub fn returning(raw: RawIntent) -> Self {
            Self {
                answer: Mutex::new(Some(raw)),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing() -> Self {
            Self::default()
        }

        pub fn set(&self, raw: RawIntent) {
            *self.answer.lock().unwrap() = Some(raw);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IntentClassifier for MockClassifier {
        async fn classify_free_text(&self, _text: &str, _context: &ClassifierContext) -> Result<RawIntent, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| ClassifierError::Malformed("mock has no answer".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use chrono::TimeZone;

    fn context() -> ClassifierContext {
        ClassifierContext {
            persona: PersonaKind::Bootstrap,
            title: "Plan tomorrow".to_string(),
            accepted_tags: vec![ActionTag::Postpone, ActionTag::MarkDone, ActionTag::CreateEvent, ActionTag::Unknown],
            now: Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_extract_json() {
        assert_eq!(extract_json("{\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), Some("{\"a\":1}"));
        assert_eq!(extract_json("Sure! {\"a\":{\"b\":2}} hope that helps"), Some("{\"a\":{\"b\":2}}"));
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[tokio::test]
    async fn test_llm_classifier_parses_fenced_answer() {
        let llm = Arc::new(MockLlmClient::new(vec![
            "```json\n{\"action\": \"postpone\", \"minutes\": 30, \"commit_time\": null}\n```",
        ]));
        let classifier = LlmIntentClassifier::new(llm.clone());

        let raw = classifier.classify_free_text("give me half an hour", &context()).await.unwrap();
        assert_eq!(raw, RawIntent::new("postpone").with_minutes(30));

        let request = llm.last_request().unwrap();
        assert!(request.system_prompt.contains("Plan tomorrow"));
        assert!(request.system_prompt.contains("create_event"));
        assert_eq!(request.messages[0].content, "give me half an hour");
    }

    #[tokio::test]
    async fn test_llm_classifier_reports_malformed_output() {
        let llm = Arc::new(MockLlmClient::new(vec!["I think they want a break"]));
        let classifier = LlmIntentClassifier::new(llm);

        let err = classifier.classify_free_text("ugh", &context()).await.unwrap_err();
        assert!(matches!(err, ClassifierError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_llm_classifier_propagates_llm_errors() {
        let classifier = LlmIntentClassifier::new(Arc::new(MockLlmClient::new(vec![])));
        let err = classifier.classify_free_text("done", &context()).await.unwrap_err();
        assert!(matches!(err, ClassifierError::Llm(_)));
    }
}

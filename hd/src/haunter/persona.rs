//! Persona parameters
//!
//! Personas share one state machine and differ only in the values here:
//! accepted actions, timings, tone ladder and message copy.

use tracing::debug;

use crate::backoff::BackoffPolicy;
use crate::config::PersonaConfig;
use crate::domain::{ActionTag, PersonaKind, Session};
use crate::intent::PostponeLimits;
use crate::transport::{Notification, NotificationKind, Tone};

/// Resolved settings for one persona
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub kind: PersonaKind,
    pub accepted_tags: Vec<ActionTag>,
    pub backoff: BackoffPolicy,
    pub postpone: PostponeLimits,
    pub reprompt_on_unknown: bool,
    /// First attempt index that reaches Nudge, Firm and Relentless
    tone_steps: [u32; 3],
}

impl Persona {
    pub fn from_config(kind: PersonaKind, config: &PersonaConfig) -> Self {
        debug!(%kind, base = config.base_minutes, cap = config.cap_minutes, "Persona::from_config: called");
        let mut accepted_tags = ActionTag::BASE.to_vec();
        let tone_steps = match kind {
            PersonaKind::Bootstrap => {
                accepted_tags.push(ActionTag::CreateEvent);
                [1, 2, 4]
            }
            PersonaKind::Commitment => [1, 3, 5],
            // Already late: skip straight past Gentle
            PersonaKind::Incomplete => [0, 2, 4],
        };

        Self {
            kind,
            accepted_tags,
            backoff: BackoffPolicy::new(config.base_minutes, config.cap_minutes),
            postpone: PostponeLimits {
                default_minutes: config.default_postpone_minutes,
                max_minutes: config.max_postpone_minutes,
            },
            reprompt_on_unknown: config.reprompt_on_unknown,
            tone_steps,
        }
    }

    /// Persona with built-in defaults
    pub fn default_for(kind: PersonaKind) -> Self {
        Self::from_config(kind, &PersonaConfig::defaults_for(kind))
    }

    pub fn accepts(&self, tag: ActionTag) -> bool {
        self.accepted_tags.contains(&tag)
    }

    /// Tone for an escalation round
    pub fn tone_for(&self, attempt: u32) -> Tone {
        let [nudge, firm, relentless] = self.tone_steps;
        if attempt >= relentless {
            Tone::Relentless
        } else if attempt >= firm {
            Tone::Firm
        } else if attempt >= nudge {
            Tone::Nudge
        } else {
            Tone::Gentle
        }
    }

    /// Build a message for this session
    ///
    /// `detail` carries the error text for [`NotificationKind::ActionFailed`].
    pub fn compose(&self, session: &Session, kind: NotificationKind, detail: Option<&str>) -> Notification {
        let tone = match kind {
            NotificationKind::CancelledReminder => self.tone_for(session.attempt).max(Tone::Firm),
            _ => self.tone_for(session.attempt),
        };
        let text = match kind {
            NotificationKind::Reminder => self.reminder_text(&session.title, tone),
            NotificationKind::CancelledReminder => cancelled_text(&session.title, tone),
            NotificationKind::Reprompt => self.reprompt_text(),
            NotificationKind::ActionFailed => format!(
                "That didn't work ({}). Nothing changed; I'll ask again at the next reminder.",
                detail.unwrap_or("unknown error")
            ),
        };

        Notification {
            session_id: session.id.clone(),
            persona: self.kind,
            kind,
            tone,
            attempt: session.attempt,
            text,
        }
    }

    fn reminder_text(&self, title: &str, tone: Tone) -> String {
        match (self.kind, tone) {
            (PersonaKind::Bootstrap, Tone::Gentle) => {
                "Nothing is planned for the coming day yet. When will you sit down and plan it?".to_string()
            }
            (PersonaKind::Bootstrap, Tone::Nudge) => {
                "Still no plan on the calendar. Give me a time and I'll book it.".to_string()
            }
            (PersonaKind::Bootstrap, Tone::Firm) => {
                "You haven't picked a planning time. Reply with one now.".to_string()
            }
            (PersonaKind::Bootstrap, Tone::Relentless) => {
                "No plan, no time booked. I'm not going away until you choose one.".to_string()
            }
            (PersonaKind::Commitment, Tone::Gentle) => {
                format!("Time for \"{}\". Reply 'done' when finished or 'later' to snooze.", title)
            }
            (PersonaKind::Commitment, Tone::Nudge) => format!("Checking in on \"{}\". How is it going?", title),
            (PersonaKind::Commitment, Tone::Firm) => {
                format!("\"{}\" is still open. Finish it or tell me how long you need.", title)
            }
            (PersonaKind::Commitment, Tone::Relentless) => {
                format!("\"{}\" is STILL not done. I will keep asking until it is.", title)
            }
            (PersonaKind::Incomplete, Tone::Gentle | Tone::Nudge) => {
                format!("The window for \"{}\" closed without a 'done'. Did you finish it?", title)
            }
            (PersonaKind::Incomplete, Tone::Firm) => {
                format!("\"{}\" was never marked done. Mark it done or snooze me.", title)
            }
            (PersonaKind::Incomplete, Tone::Relentless) => {
                format!("\"{}\" remains unresolved. This will not stop until you deal with it.", title)
            }
        }
    }

    fn reprompt_text(&self) -> String {
        let mut options = vec!["'done'", "'snooze 30'"];
        if self.accepts(ActionTag::CreateEvent) {
            options.push("a time like 'tomorrow 9am'");
        }
        format!("Sorry, I didn't catch that. Reply with {}.", options.join(" or "))
    }
}

fn cancelled_text(title: &str, tone: Tone) -> String {
    match tone {
        Tone::Relentless => format!(
            "\"{}\" was cancelled, but cancelling doesn't make it go away. Reschedule it or mark it done.",
            title
        ),
        _ => format!("\"{}\" was cancelled. It still needs doing: reschedule it or mark it done.", title),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn session(persona: PersonaKind, attempt: u32) -> Session {
        let mut s = Session::new(persona, "chat", "Write report", Utc::now());
        s.attempt = attempt;
        s
    }

    #[test]
    fn test_default_timings() {
        assert_eq!(Persona::default_for(PersonaKind::Commitment).backoff, BackoffPolicy::new(5, 120));
        assert_eq!(Persona::default_for(PersonaKind::Bootstrap).backoff, BackoffPolicy::new(20, 240));
        assert_eq!(Persona::default_for(PersonaKind::Incomplete).backoff, BackoffPolicy::new(20, 240));
        assert_eq!(Persona::default_for(PersonaKind::Incomplete).postpone, PostponeLimits::default());
    }

    #[test]
    fn test_accepted_tags() {
        for kind in PersonaKind::ALL {
            let persona = Persona::default_for(kind);
            for tag in ActionTag::BASE {
                assert!(persona.accepts(tag), "{} should accept {}", kind, tag);
            }
        }
        assert!(Persona::default_for(PersonaKind::Bootstrap).accepts(ActionTag::CreateEvent));
        assert!(!Persona::default_for(PersonaKind::Commitment).accepts(ActionTag::CreateEvent));
        assert!(!Persona::default_for(PersonaKind::Incomplete).accepts(ActionTag::CreateEvent));
    }

    #[test]
    fn test_tone_ladder_is_monotonic() {
        for kind in PersonaKind::ALL {
            let persona = Persona::default_for(kind);
            let tones: Vec<Tone> = (0..8).map(|a| persona.tone_for(a)).collect();
            assert!(tones.windows(2).all(|w| w[0] <= w[1]), "{}: {:?}", kind, tones);
            assert_eq!(tones[7], Tone::Relentless);
        }
        assert_eq!(Persona::default_for(PersonaKind::Commitment).tone_for(0), Tone::Gentle);
        assert_eq!(Persona::default_for(PersonaKind::Incomplete).tone_for(0), Tone::Nudge);
    }

    #[test]
    fn test_compose_reminder() {
        let persona = Persona::default_for(PersonaKind::Commitment);
        let s = session(PersonaKind::Commitment, 0);

        let n = persona.compose(&s, NotificationKind::Reminder, None);
        assert_eq!(n.session_id, s.id);
        assert_eq!(n.tone, Tone::Gentle);
        assert_eq!(n.attempt, 0);
        assert!(n.text.contains("Write report"));
    }

    #[test]
    fn test_cancelled_reminder_is_at_least_firm() {
        let persona = Persona::default_for(PersonaKind::Commitment);
        let n = persona.compose(&session(PersonaKind::Commitment, 0), NotificationKind::CancelledReminder, None);
        assert_eq!(n.tone, Tone::Firm);
        assert!(n.text.contains("cancelled"));
    }

    #[test]
    fn test_action_failed_carries_detail() {
        let persona = Persona::default_for(PersonaKind::Bootstrap);
        let n = persona.compose(
            &session(PersonaKind::Bootstrap, 2),
            NotificationKind::ActionFailed,
            Some("calendar unavailable"),
        );
        assert!(n.text.contains("calendar unavailable"));
    }

    #[test]
    fn test_reprompt_mentions_times_only_for_bootstrap() {
        let bootstrap = Persona::default_for(PersonaKind::Bootstrap);
        let commitment = Persona::default_for(PersonaKind::Commitment);
        assert!(bootstrap.reprompt_text().contains("tomorrow"));
        assert!(!commitment.reprompt_text().contains("tomorrow"));
    }
}

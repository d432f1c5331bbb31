//! Keyword rules deciding which messages are forwarded.
//!
//! Rules are evaluated in order and the first match wins:
//! 1. Empty body → forward only if media is attached
//! 2. Urgent term in body → forward
//! 3. Business term in body → forward
//! 4. Group chat → forward only if we are mentioned
//! 5. Media attached → forward
//! 6. Short casual chatter → drop
//! 7. Everything else → drop
//!
//! Vocabularies come from [`ClassifierConfig`]; nothing here is hardcoded.

use tracing::debug;

use crate::config::ClassifierConfig;
use crate::pipeline::types::{Conversation, RawMessage, SessionContext};

/// Which rule decided the verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    MissingConversation,
    EmptyBody,
    UrgentTerm(String),
    BusinessTerm(String),
    GroupMention,
    GroupNotMentioned,
    HasMedia,
    CasualChatter,
    NoSignal,
}

impl Rule {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::MissingConversation => "missing_conversation",
            Self::EmptyBody => "empty_body",
            Self::UrgentTerm(_) => "urgent_term",
            Self::BusinessTerm(_) => "business_term",
            Self::GroupMention => "group_mention",
            Self::GroupNotMentioned => "group_not_mentioned",
            Self::HasMedia => "has_media",
            Self::CasualChatter => "casual_chatter",
            Self::NoSignal => "no_signal",
        }
    }
}

/// Classification outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Forward(Rule),
    Drop(Rule),
}

impl Verdict {
    pub fn is_forward(&self) -> bool {
        matches!(self, Self::Forward(_))
    }

    pub fn rule(&self) -> &Rule {
        match self {
            Self::Forward(rule) | Self::Drop(rule) => rule,
        }
    }
}

/// Pure, deterministic message classifier.
#[derive(Debug, Clone)]
pub struct Classifier {
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config: config.normalized(),
        }
    }

    /// Convenience wrapper over [`Classifier::evaluate`].
    pub fn should_forward(
        &self,
        message: &RawMessage,
        conversation: Option<&Conversation>,
        session: &SessionContext,
    ) -> bool {
        self.evaluate(message, conversation, session).is_forward()
    }

    /// Decide whether a message is worth forwarding.
    pub fn evaluate(
        &self,
        message: &RawMessage,
        conversation: Option<&Conversation>,
        session: &SessionContext,
    ) -> Verdict {
        let Some(conversation) = conversation else {
            debug!(from = %message.from, "No conversation context, dropping");
            return Verdict::Drop(Rule::MissingConversation);
        };

        if message.body.trim().is_empty() {
            return if message.has_media {
                Verdict::Forward(Rule::EmptyBody)
            } else {
                Verdict::Drop(Rule::EmptyBody)
            };
        }

        let body = message.body.to_lowercase();

        if let Some(term) = first_match(&body, &self.config.urgent_terms) {
            return Verdict::Forward(Rule::UrgentTerm(term.to_string()));
        }

        if let Some(term) = first_match(&body, &self.config.business_terms) {
            return Verdict::Forward(Rule::BusinessTerm(term.to_string()));
        }

        if conversation.is_group() {
            return if session.is_mentioned(&message.mentioned_ids) {
                Verdict::Forward(Rule::GroupMention)
            } else {
                Verdict::Drop(Rule::GroupNotMentioned)
            };
        }

        if message.has_media {
            return Verdict::Forward(Rule::HasMedia);
        }

        if body.chars().count() < self.config.short_message_threshold
            && first_match(&body, &self.config.casual_phrases).is_some()
        {
            return Verdict::Drop(Rule::CasualChatter);
        }

        Verdict::Drop(Rule::NoSignal)
    }
}

fn first_match<'a>(haystack: &str, terms: &'a [String]) -> Option<&'a str> {
    terms
        .iter()
        .find(|term| haystack.contains(term.as_str()))
        .map(String::as_str)
}

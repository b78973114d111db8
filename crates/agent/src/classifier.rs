use std::sync::Arc;

use concierge_core::domain::intent::Intent;

use crate::llm::LlmClient;

const CLASSIFIER_SYSTEM: &str = "You are a routing classifier for a support agent. \
    Classify the user's message into one of: login, subscription, reservation, knowledge. \
    Respond with ONLY the label.";

/// One LLM call mapping raw text to an intent. Failures never propagate:
/// an API error, an empty reply, or an out-of-vocabulary label all resolve
/// to `Intent::Unknown` and the router escalates from there.
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, text: &str) -> Intent {
        let reply = match self.llm.complete(CLASSIFIER_SYSTEM, text).await {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!(
                    event_name = "classifier.llm_failed",
                    error = %error,
                    "classification call failed; falling back to unknown"
                );
                return Intent::Unknown;
            }
        };

        let label = reply.split_whitespace().next().unwrap_or_default();
        match label.to_ascii_lowercase().trim_matches(|c: char| !c.is_ascii_alphabetic()).parse()
        {
            Ok(intent) => intent,
            Err(_) => {
                tracing::warn!(
                    event_name = "classifier.unparseable_reply",
                    reply = %reply,
                    "classifier reply did not match a known label"
                );
                Intent::Unknown
            }
        }
    }
}

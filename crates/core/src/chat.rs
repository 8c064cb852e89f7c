use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::TurnRecord;

// The `ChatAgent` trait is the seam between the dialogue loop and whichever
// language-model backend was configured. The loop only ever sees "utterance in,
// reply out"; vendor wire formats stay inside the adapters in `providers`.
//
// In unit tests `mockall`'s `MockChatAgent` stands in for a real backend, so
// call flow can be exercised without network access or credentials.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait ChatAgent: Send + Sync {
    /// Produce the assistant's reply to `utterance`, given the prior turns of
    /// this call. Transport and provider failures propagate; the dialogue loop
    /// absorbs them into a fallback reply so the call keeps going.
    async fn reply(&self, utterance: &str, history: &[TurnRecord]) -> Result<String>;
}

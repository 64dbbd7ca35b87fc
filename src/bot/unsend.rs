//! Quoting retracted messages back into the conversation.

use tracing::debug;

use super::message_log::{LogError, MessageLog};

pub const DEFAULT_TEMPLATE: &str = "Someone unsent a message: \"{text}\"";

/// Notice that quotes a retracted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotedNotification {
    pub sender_id: String,
    pub message_id: String,
    pub text: String,
    pub sent_at: String,
}

/// Look up a retracted message and render the notice for it.
///
/// `Ok(None)` is the normal outcome for ids that were evicted or never logged.
pub fn resolve_unsend(
    log: &MessageLog,
    template: &str,
    message_id: &str,
) -> Result<Option<QuotedNotification>, LogError> {
    let Some(entry) = log.find_by_message_id(message_id)? else {
        return Ok(None);
    };
    debug!("Unsent message {} found at seq {}", message_id, entry.seq);
    Ok(Some(QuotedNotification {
        text: render(template, &entry.text),
        sender_id: entry.sender_id,
        message_id: entry.message_id,
        sent_at: entry.recorded_at,
    }))
}

fn render(template: &str, text: &str) -> String {
    template.replace("{text}", text)
}

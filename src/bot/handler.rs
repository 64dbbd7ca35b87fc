//! Per-event dispatch: log, decide, reply, quote unsends.

use std::fmt;
use tracing::{debug, info, warn};

use super::event::{Event, EventBatch, MessageContent, MessageEvent, Source, StickerMessage, TextMessage, UnsendEvent};
use super::message_log::{LogError, MessageLog};
use super::notifier::{Notifier, NotifyError, OutboundMessage, Target};
use super::unsend::{self, DEFAULT_TEMPLATE};
use crate::rules::{Inbound, Rules};

/// Error while handling a single event. Never escapes the batch.
#[derive(Debug)]
pub enum HandleError {
    Malformed(serde_json::Error),
    Storage(LogError),
    Notify(NotifyError),
}

impl fmt::Display for HandleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "malformed event: {e}"),
            Self::Storage(e) => write!(f, "{e}"),
            Self::Notify(e) => write!(f, "failed to notify: {e}"),
        }
    }
}

impl std::error::Error for HandleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Malformed(e) => Some(e),
            Self::Storage(e) => Some(e),
            Self::Notify(e) => Some(e),
        }
    }
}

impl From<LogError> for HandleError {
    fn from(e: LogError) -> Self {
        Self::Storage(e)
    }
}

impl From<NotifyError> for HandleError {
    fn from(e: NotifyError) -> Self {
        Self::Notify(e)
    }
}

#[derive(Debug, Clone)]
pub struct BotOptions {
    /// Must contain `{text}`.
    pub unsend_template: String,
    pub notification_disabled: bool,
}

impl Default for BotOptions {
    fn default() -> Self {
        Self {
            unsend_template: DEFAULT_TEMPLATE.to_string(),
            notification_disabled: false,
        }
    }
}

/// Outcome counts for one webhook delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub handled: usize,
    pub failed: usize,
}

pub struct Bot<N> {
    log: MessageLog,
    rules: Rules,
    notifier: N,
    options: BotOptions,
}

impl<N: Notifier> Bot<N> {
    pub fn new(log: MessageLog, rules: Rules, notifier: N, options: BotOptions) -> Self {
        Self {
            log,
            rules,
            notifier,
            options,
        }
    }

    #[cfg(test)]
    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    #[cfg(test)]
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Handle every event in order. A malformed or failing event is logged and skipped.
    pub async fn handle_batch(&self, batch: EventBatch) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for raw in batch.events {
            let result = match Event::decode(raw) {
                Ok(event) => self.handle_event(event).await,
                Err(e) => Err(HandleError::Malformed(e)),
            };
            match result {
                Ok(()) => summary.handled += 1,
                Err(e) => {
                    warn!("Event handling failed: {e}");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    pub async fn handle_event(&self, event: Event) -> Result<(), HandleError> {
        match event {
            Event::Message(MessageEvent {
                reply_token,
                source,
                message,
            }) => match message {
                MessageContent::Text(text) => self.handle_text(&reply_token, &source, &text).await,
                MessageContent::Sticker(sticker) => {
                    self.handle_sticker(&reply_token, &source, &sticker).await
                }
                MessageContent::Other => Ok(()),
            },
            Event::Unsend(unsend) => self.handle_unsend(&unsend).await,
            Event::Other => Ok(()),
        }
    }

    async fn handle_text(
        &self,
        reply_token: &str,
        source: &Source,
        message: &TextMessage,
    ) -> Result<(), HandleError> {
        let sender = source.user_id.as_deref().unwrap_or_default();
        let preview: String = message.text.chars().take(100).collect();
        info!("Message from {sender} ({}): \"{preview}\"", source.kind);

        // A store outage must not cost the user their reply.
        match self.log.append(sender, &message.id, &message.text) {
            Ok(seq) => debug!("Logged message {} as seq {}", message.id, seq),
            Err(e) => warn!("Failed to log message {}: {e}", message.id),
        }

        let decision = self.rules.decide(Inbound {
            sender_id: source.user_id.as_deref(),
            text: &message.text,
            mentionees: message.mentionees(),
        });
        match decision {
            Some(reply) => self.reply(reply_token, reply).await,
            None => Ok(()),
        }
    }

    async fn handle_sticker(
        &self,
        reply_token: &str,
        source: &Source,
        sticker: &StickerMessage,
    ) -> Result<(), HandleError> {
        let keywords = sticker.keywords.join(" ");
        debug!(
            "Sticker {} ({}/{}) from {:?} ({keywords})",
            sticker.id, sticker.package_id, sticker.sticker_id, source.user_id
        );

        let decision = self.rules.decide(Inbound {
            sender_id: source.user_id.as_deref(),
            text: &keywords,
            mentionees: &[],
        });
        match decision {
            Some(reply) => self.reply(reply_token, reply).await,
            None => Ok(()),
        }
    }

    async fn handle_unsend(&self, event: &UnsendEvent) -> Result<(), HandleError> {
        let message_id = &event.unsend.message_id;
        let Some(note) = unsend::resolve_unsend(&self.log, &self.options.unsend_template, message_id)?
        else {
            debug!("Unsent message {message_id} is not in the log");
            return Ok(());
        };

        let Some(conversation) = event.source.conversation_id() else {
            warn!("Unsend of {message_id} has no conversation to notify");
            return Ok(());
        };

        info!(
            "↩️ {} unsent message {} (sent {})",
            note.sender_id, note.message_id, note.sent_at
        );
        self.notifier
            .send(OutboundMessage {
                target: Target::Push(conversation.to_string()),
                texts: vec![note.text],
                notification_disabled: self.options.notification_disabled,
            })
            .await?;
        Ok(())
    }

    async fn reply(&self, reply_token: &str, text: String) -> Result<(), HandleError> {
        if reply_token.is_empty() {
            debug!("No reply token; dropping reply");
            return Ok(());
        }
        info!("Replying: \"{}\"", text.chars().take(100).collect::<String>());
        self.notifier
            .send(OutboundMessage {
                target: Target::Reply(reply_token.to_string()),
                texts: vec![text],
                notification_disabled: self.options.notification_disabled,
            })
            .await?;
        Ok(())
    }
}

//! Outbound side of the bot.

use std::fmt;
use std::future::Future;

/// Where an outbound message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Answer an inbound event. Tokens are single-use and short-lived.
    Reply(String),
    /// Send unprompted to a user, group or room id.
    Push(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub target: Target,
    pub texts: Vec<String>,
    /// Deliver without a push notification on the recipient's device.
    pub notification_disabled: bool,
}

#[derive(Debug)]
pub enum NotifyError {
    Http(String),
    Api(String),
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::Http(e) => write!(f, "HTTP error: {e}"),
            NotifyError::Api(e) => write!(f, "API error: {e}"),
        }
    }
}

impl std::error::Error for NotifyError {}

/// Sink for messages the bot sends to the chat platform.
pub trait Notifier: Send + Sync {
    fn send(&self, message: OutboundMessage) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

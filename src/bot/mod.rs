//! Bot core - relays LINE webhook events through the rules and the message log.

pub mod event;
pub mod handler;
pub mod line;
pub mod message_log;
pub mod notifier;
pub mod signature;
pub mod unsend;


pub use handler::{Bot, BotOptions};
pub use line::LineClient;
pub use message_log::MessageLog;

//! Channel capability traits.
//!
//! Channels report optional capabilities (typing indicator, message editing)
//! through accessor slots checked by presence, never by downcasting. The
//! coordinator works against these traits and stays indifferent to the
//! concrete platform behind them.

use async_trait::async_trait;

use crate::error::ChannelError;

/// Stop action returned by a typing indicator.
///
/// Channels must make this idempotent — safe to call zero or many times.
/// The coordinator invokes it at most once per turn.
pub type TypingStop = Box<dyn Fn() + Send + Sync>;

/// Channels that can show a cancellable typing/thinking indicator.
#[async_trait]
pub trait TypingIndicator: Send + Sync {
    /// Begin the indicator for a conversation and return a stop action.
    async fn start_typing(&self, chat_id: &str) -> Result<TypingStop, ChannelError>;
}

/// Channels that can edit a previously sent message in place.
#[async_trait]
pub trait MessageEditor: Send + Sync {
    /// Replace the content of `message_id`. The id is always a string;
    /// channels convert platform-specific types internally.
    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), ChannelError>;
}

/// Outbound side of a channel implementation.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel identifier (e.g. "telegram", "discord").
    fn name(&self) -> &str;

    /// Per-chunk char ceiling for this platform. 0 means the channel has no
    /// limit of its own and the configured fallback applies.
    fn max_message_len(&self) -> usize {
        0
    }

    /// Send a plain text message, returning the platform message id when
    /// the platform reports one.
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<Option<String>, ChannelError>;

    /// Typing capability slot. `None` when the platform has no indicator.
    fn typing(&self) -> Option<&dyn TypingIndicator> {
        None
    }

    /// Edit capability slot. `None` when the platform cannot edit messages.
    fn editor(&self) -> Option<&dyn MessageEditor> {
        None
    }
}

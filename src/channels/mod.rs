//! Channel abstraction for outbound delivery.

pub mod channel;
pub mod coordinator;

pub use channel::{Channel, MessageEditor, TypingIndicator, TypingStop};
pub use coordinator::{ChannelCoordinator, ConversationKey};

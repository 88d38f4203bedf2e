//! Per-conversation typing/placeholder coordination and turn delivery.
//!
//! State recorded on the inbound half of a turn (typing stop actions,
//! placeholder message ids) is consumed on the outbound half, which may run
//! on a different worker. Keys are (channel, chat) pairs; unrelated
//! conversations never contend on the same map shard lock.

use dashmap::DashMap;

use crate::channels::channel::{Channel, TypingStop};
use crate::config::DeliveryConfig;
use crate::error::ChannelError;
use crate::split::split_message;

/// Key identifying one conversation on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub channel: String,
    pub chat_id: String,
}

impl ConversationKey {
    pub fn new(channel: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
        }
    }
}

/// Tracks in-flight typing indicators and placeholder messages per
/// conversation, and drives outbound delivery of a finished response.
///
/// Construct once and share by `Arc`; all methods take `&self`.
#[derive(Default)]
pub struct ChannelCoordinator {
    config: DeliveryConfig,
    typing_stops: DashMap<ConversationKey, TypingStop>,
    placeholders: DashMap<ConversationKey, String>,
}

impl ChannelCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DeliveryConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Record the placeholder message id for a conversation. Last writer
    /// wins; an earlier id for the same key is discarded.
    pub fn record_placeholder(&self, channel: &str, chat_id: &str, message_id: impl Into<String>) {
        let key = ConversationKey::new(channel, chat_id);
        if self.placeholders.insert(key, message_id.into()).is_some() {
            tracing::debug!(channel, chat_id, "replaced placeholder id for conversation");
        }
    }

    /// Record the typing stop action for a conversation. Last writer wins;
    /// a previous stop action is dropped without being invoked — callers
    /// starting a fresh indicator while one is outstanding own the
    /// platform-side consequence.
    pub fn record_typing_stop(&self, channel: &str, chat_id: &str, stop: TypingStop) {
        let key = ConversationKey::new(channel, chat_id);
        if self.typing_stops.insert(key, stop).is_some() {
            tracing::debug!(channel, chat_id, "replaced typing stop for conversation");
        }
    }

    /// Read and clear the typing stop action for a conversation.
    pub fn take_typing_stop(&self, channel: &str, chat_id: &str) -> Option<TypingStop> {
        self.typing_stops
            .remove(&ConversationKey::new(channel, chat_id))
            .map(|(_, stop)| stop)
    }

    /// Read and clear the placeholder message id for a conversation.
    pub fn take_placeholder(&self, channel: &str, chat_id: &str) -> Option<String> {
        self.placeholders
            .remove(&ConversationKey::new(channel, chat_id))
            .map(|(_, id)| id)
    }

    /// Inbound hook: start typing feedback and, if the configuration names
    /// a placeholder text, send the immediate placeholder message.
    ///
    /// Failures here are logged and swallowed — feedback must never fail
    /// the turn. Capability absence is a silent no-op.
    pub async fn begin_turn(&self, channel: &dyn Channel, chat_id: &str) {
        if let Some(typing) = channel.typing() {
            match typing.start_typing(chat_id).await {
                Ok(stop) => self.record_typing_stop(channel.name(), chat_id, stop),
                Err(e) => {
                    tracing::warn!(
                        channel = channel.name(),
                        chat_id,
                        error = %e,
                        "failed to start typing indicator"
                    );
                }
            }
        }

        if let Some(text) = self.config.placeholder_text.as_deref() {
            match channel.send_text(chat_id, text).await {
                Ok(Some(message_id)) => {
                    self.record_placeholder(channel.name(), chat_id, message_id);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        channel = channel.name(),
                        chat_id,
                        error = %e,
                        "failed to send placeholder message"
                    );
                }
            }
        }
    }

    /// Chunk ceiling for a channel: its own limit, or the configured
    /// fallback when it does not report one.
    fn chunk_limit(&self, channel: &dyn Channel) -> usize {
        match channel.max_message_len() {
            0 => self.config.max_message_len,
            n => n,
        }
    }

    /// Outbound consumption: deliver the finished response for a turn.
    ///
    /// Splits `text` with the channel's chunk ceiling, stops the recorded
    /// typing indicator, then either edits the recorded placeholder with
    /// the first chunk (when the channel can edit) or sends it as a new
    /// message; remaining chunks go out as ordinary messages in order.
    pub async fn deliver(
        &self,
        channel: &dyn Channel,
        chat_id: &str,
        text: &str,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, self.chunk_limit(channel));

        if let Some(stop) = self.take_typing_stop(channel.name(), chat_id) {
            stop();
        }
        let placeholder = self.take_placeholder(channel.name(), chat_id);

        let Some((first, rest)) = chunks.split_first() else {
            return Ok(());
        };

        let edited = match (placeholder, channel.editor()) {
            (Some(message_id), Some(editor)) => {
                match editor.edit_message(chat_id, &message_id, first).await {
                    Ok(()) => true,
                    Err(e) => {
                        // Edit failures degrade to a fresh message.
                        tracing::warn!(
                            channel = channel.name(),
                            chat_id,
                            message_id = %message_id,
                            error = %e,
                            "placeholder edit failed; sending as new message"
                        );
                        false
                    }
                }
            }
            _ => false,
        };

        if !edited {
            channel.send_text(chat_id, first).await?;
        }

        for chunk in rest {
            channel.send_text(chat_id, chunk).await?;
        }

        tracing::debug!(
            channel = channel.name(),
            chat_id,
            chunks = chunks.len(),
            "delivered response"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::channels::channel::{MessageEditor, TypingIndicator};

    /// Mock channel with configurable capabilities and a call log.
    struct MockChannel {
        name: &'static str,
        max_len: usize,
        can_type: bool,
        can_edit: bool,
        sent: Arc<Mutex<Vec<String>>>,
        edits: Arc<Mutex<Vec<(String, String)>>>,
        typing_stops: Arc<AtomicUsize>,
        next_message_id: AtomicUsize,
        fail_edits: bool,
    }

    impl MockChannel {
        fn new(name: &'static str, max_len: usize) -> Self {
            Self {
                name,
                max_len,
                can_type: true,
                can_edit: true,
                sent: Arc::default(),
                edits: Arc::default(),
                typing_stops: Arc::default(),
                next_message_id: AtomicUsize::new(1),
                fail_edits: false,
            }
        }

        fn without_capabilities(mut self) -> Self {
            self.can_type = false;
            self.can_edit = false;
            self
        }
    }

    fn coordinator_with_placeholder(text: &str) -> ChannelCoordinator {
        ChannelCoordinator::with_config(DeliveryConfig {
            placeholder_text: Some(text.to_string()),
            ..Default::default()
        })
    }

    #[async_trait]
    impl TypingIndicator for MockChannel {
        async fn start_typing(&self, _chat_id: &str) -> Result<TypingStop, ChannelError> {
            let stops = self.typing_stops.clone();
            Ok(Box::new(move || {
                stops.fetch_add(1, Ordering::SeqCst);
            }))
        }
    }

    #[async_trait]
    impl MessageEditor for MockChannel {
        async fn edit_message(
            &self,
            _chat_id: &str,
            message_id: &str,
            content: &str,
        ) -> Result<(), ChannelError> {
            if self.fail_edits {
                return Err(ChannelError::EditFailed {
                    name: self.name.to_string(),
                    message_id: message_id.to_string(),
                    reason: "mock edit failure".to_string(),
                });
            }
            self.edits
                .lock()
                .await
                .push((message_id.to_string(), content.to_string()));
            Ok(())
        }
    }

    #[async_trait]
    impl Channel for MockChannel {
        fn name(&self) -> &str {
            self.name
        }

        fn max_message_len(&self) -> usize {
            self.max_len
        }

        async fn send_text(
            &self,
            _chat_id: &str,
            text: &str,
        ) -> Result<Option<String>, ChannelError> {
            self.sent.lock().await.push(text.to_string());
            let id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("msg-{id}")))
        }

        fn typing(&self) -> Option<&dyn TypingIndicator> {
            self.can_type.then_some(self as &dyn TypingIndicator)
        }

        fn editor(&self) -> Option<&dyn MessageEditor> {
            self.can_edit.then_some(self as &dyn MessageEditor)
        }
    }

    // ── Raw state bookkeeping ───────────────────────────────────────

    #[test]
    fn placeholder_overwrite_returns_latest() {
        let coord = ChannelCoordinator::new();
        coord.record_placeholder("telegram", "chat1", "first");
        coord.record_placeholder("telegram", "chat1", "second");

        assert_eq!(
            coord.take_placeholder("telegram", "chat1").as_deref(),
            Some("second")
        );
        assert!(coord.take_placeholder("telegram", "chat1").is_none());
    }

    #[test]
    fn typing_stop_taken_once() {
        let coord = ChannelCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        coord.record_typing_stop(
            "telegram",
            "chat1",
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let stop = coord.take_typing_stop("telegram", "chat1");
        assert!(stop.is_some());
        assert!(coord.take_typing_stop("telegram", "chat1").is_none());

        stop.into_iter().for_each(|s| s());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn replaced_typing_stop_is_not_invoked() {
        let coord = ChannelCoordinator::new();
        let old_calls = Arc::new(AtomicUsize::new(0));
        let c = old_calls.clone();
        coord.record_typing_stop(
            "telegram",
            "chat1",
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        coord.record_typing_stop("telegram", "chat1", Box::new(|| {}));

        // The superseded stop is dropped silently, never called.
        assert_eq!(old_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn keys_are_isolated_per_conversation() {
        let coord = ChannelCoordinator::new();
        coord.record_placeholder("telegram", "chat1", "a");
        coord.record_placeholder("telegram", "chat2", "b");
        coord.record_placeholder("discord", "chat1", "c");

        assert_eq!(coord.take_placeholder("telegram", "chat2").as_deref(), Some("b"));
        assert_eq!(coord.take_placeholder("telegram", "chat1").as_deref(), Some("a"));
        assert_eq!(coord.take_placeholder("discord", "chat1").as_deref(), Some("c"));
    }

    // ── Inbound half (begin_turn) ───────────────────────────────────

    #[tokio::test]
    async fn begin_turn_records_typing_and_placeholder() {
        let coord = coordinator_with_placeholder("Thinking...");
        let channel = MockChannel::new("mock", 0);

        coord.begin_turn(&channel, "chat1").await;

        assert_eq!(channel.sent.lock().await.as_slice(), ["Thinking..."]);
        assert!(coord.take_typing_stop("mock", "chat1").is_some());
        assert_eq!(coord.take_placeholder("mock", "chat1").as_deref(), Some("msg-1"));
    }

    #[tokio::test]
    async fn begin_turn_without_capabilities_is_noop() {
        let coord = ChannelCoordinator::new();
        let channel = MockChannel::new("mock", 0).without_capabilities();

        coord.begin_turn(&channel, "chat1").await;

        assert!(coord.take_typing_stop("mock", "chat1").is_none());
        assert!(coord.take_placeholder("mock", "chat1").is_none());
    }

    // ── Outbound half (deliver) ─────────────────────────────────────

    #[tokio::test]
    async fn deliver_stops_typing_and_edits_placeholder() {
        let coord = coordinator_with_placeholder("...");
        let channel = MockChannel::new("mock", 0);

        coord.begin_turn(&channel, "chat1").await;
        coord.deliver(&channel, "chat1", "final answer").await.unwrap();

        assert_eq!(channel.typing_stops.load(Ordering::SeqCst), 1);
        let edits = channel.edits.lock().await;
        assert_eq!(edits.as_slice(), [("msg-1".to_string(), "final answer".to_string())]);
        // Only the placeholder itself was sent as a message.
        assert_eq!(channel.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn deliver_splits_and_sends_remaining_chunks() {
        let coord = coordinator_with_placeholder("...");
        let channel = MockChannel::new("mock", 2000);

        coord.begin_turn(&channel, "chat1").await;
        let long = "a".repeat(2500);
        coord.deliver(&channel, "chat1", &long).await.unwrap();

        let edits = channel.edits.lock().await;
        assert_eq!(edits.len(), 1, "first chunk should edit the placeholder");
        let sent = channel.sent.lock().await;
        // Placeholder plus the second chunk.
        assert_eq!(sent.len(), 2);
        assert_eq!(edits[0].1.chars().count() + sent[1].chars().count(), 2500);
    }

    #[tokio::test]
    async fn deliver_uses_configured_fallback_limit() {
        let coord = ChannelCoordinator::with_config(DeliveryConfig {
            max_message_len: 2000,
            placeholder_text: None,
        });
        // Channel reports no limit of its own.
        let channel = MockChannel::new("mock", 0).without_capabilities();

        let long = "a".repeat(2500);
        coord.deliver(&channel, "chat1", &long).await.unwrap();

        let sent = channel.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|c| c.chars().count() <= 2000));
    }

    #[tokio::test]
    async fn deliver_without_editor_sends_all_chunks() {
        let coord = ChannelCoordinator::new();
        let channel = MockChannel::new("mock", 2000).without_capabilities();

        coord.record_placeholder("mock", "chat1", "msg-99");
        let long = "a".repeat(2500);
        coord.deliver(&channel, "chat1", &long).await.unwrap();

        assert!(channel.edits.lock().await.is_empty());
        assert_eq!(channel.sent.lock().await.len(), 2);
        // Placeholder consumed even though editing was impossible.
        assert!(coord.take_placeholder("mock", "chat1").is_none());
    }

    #[tokio::test]
    async fn deliver_falls_back_to_send_when_edit_fails() {
        let coord = ChannelCoordinator::new();
        let mut channel = MockChannel::new("mock", 0);
        channel.fail_edits = true;

        coord.record_placeholder("mock", "chat1", "msg-1");
        coord.deliver(&channel, "chat1", "hello").await.unwrap();

        assert_eq!(channel.sent.lock().await.as_slice(), ["hello"]);
    }

    #[tokio::test]
    async fn deliver_empty_text_still_stops_typing() {
        let coord = ChannelCoordinator::new();
        let channel = MockChannel::new("mock", 2000);

        coord.begin_turn(&channel, "chat1").await;
        coord.deliver(&channel, "chat1", "").await.unwrap();

        assert_eq!(channel.typing_stops.load(Ordering::SeqCst), 1);
        assert!(channel.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_conversations_do_not_interfere() {
        let coord = Arc::new(ChannelCoordinator::new());

        let mut handles = Vec::new();
        for i in 0..32 {
            let coord = coord.clone();
            handles.push(tokio::spawn(async move {
                let chat = format!("chat-{i}");
                coord.record_placeholder("mock", &chat, format!("msg-{i}"));
                coord.record_typing_stop("mock", &chat, Box::new(|| {}));
                assert_eq!(
                    coord.take_placeholder("mock", &chat),
                    Some(format!("msg-{i}"))
                );
                assert!(coord.take_typing_stop("mock", &chat).is_some());
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }
}

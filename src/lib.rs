//! AI Relay — outbound delivery core for a chat-integrated assistant.
//!
//! Turns long agent responses into platform-safe chunks, coordinates
//! per-conversation typing/placeholder state across channels, and manages
//! transient media files scoped to a processing turn.

pub mod api;
pub mod channels;
pub mod config;
pub mod error;
pub mod media;
pub mod split;

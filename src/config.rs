//! Configuration types.

use crate::error::ConfigError;

/// Outbound delivery configuration.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Fallback chunk ceiling (in Unicode chars) for channels that do not
    /// report their own limit. 0 disables splitting entirely.
    pub max_message_len: usize,
    /// Text of the immediate placeholder message sent on inbound, if any.
    pub placeholder_text: Option<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_message_len: 4096, // common platform ceiling (Telegram et al.)
            placeholder_text: None,
        }
    }
}

impl DeliveryConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(text) = &self.placeholder_text {
            if text.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "placeholder_text".to_string(),
                    message: "placeholder text must not be blank".to_string(),
                });
            }
        }
        Ok(())
    }
}

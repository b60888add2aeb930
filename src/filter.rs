use crate::config::RuntimeConfig;
use crate::telemetry::ChatMessage;

/// Whether a message should be dropped before any other processing.
pub fn should_suppress(message: &ChatMessage, config: &RuntimeConfig) -> bool {
    (config.ignore_enemy && message.enemy)
        || config.ignore_senders.iter().any(|s| *s == message.sender)
}

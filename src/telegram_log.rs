use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Only INFO events with this target reach the log chat.
pub const PAYMENTS_TARGET: &str = "payments";

const MAX_MESSAGE_CHARS: usize = 4000;
const BATCH_SIZE: usize = 50;
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

enum LogMessage {
    /// WARN/ERROR, sent at once.
    Urgent(String),
    /// Payment INFO, batched.
    Info(String),
}

/// Mirrors warnings, errors and payment events into an admin chat.
pub struct LogChatLayer {
    tx: mpsc::UnboundedSender<LogMessage>,
}

impl LogChatLayer {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<LogMessage>();

        tokio::spawn(async move {
            let mut info_buffer: Vec<String> = Vec::new();
            let mut interval = tokio::time::interval(FLUSH_INTERVAL);

            loop {
                tokio::select! {
                    msg = rx.recv() => {
                        match msg {
                            Some(LogMessage::Urgent(text)) => {
                                send_log(&bot, chat_id, &text).await;
                            }
                            Some(LogMessage::Info(text)) => {
                                info_buffer.push(text);
                                if info_buffer.len() >= BATCH_SIZE {
                                    flush_buffer(&bot, chat_id, &mut info_buffer).await;
                                }
                            }
                            None => break,
                        }
                    }
                    _ = interval.tick() => {
                        flush_buffer(&bot, chat_id, &mut info_buffer).await;
                    }
                }
            }
        });

        Self { tx }
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() > MAX_MESSAGE_CHARS {
        let truncated: String = text.chars().take(MAX_MESSAGE_CHARS).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}

async fn send_log(bot: &Bot, chat_id: ChatId, text: &str) {
    // eprintln: logging here would feed back into this layer
    if let Err(e) = bot.send_message(chat_id, truncate(text)).await {
        eprintln!("Failed to send log to Telegram: {e}");
    }
}

async fn flush_buffer(bot: &Bot, chat_id: ChatId, buffer: &mut Vec<String>) {
    if buffer.is_empty() {
        return;
    }
    let combined = buffer.join("\n");
    buffer.clear();
    send_log(bot, chat_id, &combined).await;
}

struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else if self.message.is_empty() {
            self.message = format!("{} = {:?}", field.name(), value);
        } else {
            self.message
                .push_str(&format!(", {} = {:?}", field.name(), value));
        }
    }
}

fn classify(level: Level, target: &str, message: String) -> Option<LogMessage> {
    match level {
        Level::ERROR => Some(LogMessage::Urgent(format!("❌ {}", message))),
        Level::WARN => Some(LogMessage::Urgent(format!("⚠️ {}", message))),
        Level::INFO if target == PAYMENTS_TARGET => Some(LogMessage::Info(message)),
        _ => None,
    }
}

impl<S: Subscriber> Layer<S> for LogChatLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // Our own HTTP traffic would otherwise echo back through the layer.
        if metadata.target().starts_with("teloxide") || metadata.target().starts_with("reqwest") {
            return;
        }

        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);

        let Some(msg) = classify(*metadata.level(), metadata.target(), visitor.message) else {
            return;
        };
        if self.tx.send(msg).is_err() {
            eprintln!("Log channel closed, message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert!(matches!(classify(Level::ERROR, "animebot", "x".into()), Some(LogMessage::Urgent(m)) if m == "❌ x"));
        assert!(matches!(classify(Level::WARN, "animebot", "x".into()), Some(LogMessage::Urgent(_))));
        assert!(matches!(classify(Level::INFO, PAYMENTS_TARGET, "paid".into()), Some(LogMessage::Info(m)) if m == "paid"));
        assert!(classify(Level::INFO, "animebot::bot", "hi".into()).is_none());
        assert!(classify(Level::DEBUG, PAYMENTS_TARGET, "x".into()).is_none());
    }

    #[test]
    fn test_truncate_is_char_aware() {
        let long = "я".repeat(MAX_MESSAGE_CHARS + 10);
        let out = truncate(&long);
        assert_eq!(out.chars().count(), MAX_MESSAGE_CHARS + 3);
        assert!(out.ends_with("..."));
        assert_eq!(truncate("short"), "short");
    }
}

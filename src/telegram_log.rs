//! Mirrors the bot's own log into a Telegram chat.
//!
//! Problems (WARN, ERROR) go out one by one as they happen. Routine INFO lines
//! are collected into a digest that is posted every few seconds.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::scheduling::transport::Transport;
use crate::scheduling::views::escape;

/// Events from the transport itself are not mirrored, or a failing chat
/// would report its own failures forever.
const SKIPPED_TARGET: &str = "tutorbot::scheduling::transport";

/// Telegram caps messages at 4096 characters.
const MAX_CHARS: usize = 4000;
const DIGEST_EVERY: Duration = Duration::from_secs(5);
const DIGEST_MAX_LINES: usize = 50;

enum LogLine {
    Problem(String),
    Routine(String),
}

/// `tracing` layer that mirrors INFO and above into `chat_id`.
pub struct ChatLogLayer {
    lines: mpsc::UnboundedSender<LogLine>,
}

impl ChatLogLayer {
    /// Spawns the forwarding task, so it needs a running Tokio runtime.
    pub fn new(transport: Arc<dyn Transport>, chat_id: i64) -> Self {
        let (lines, rx) = mpsc::unbounded_channel();
        tokio::spawn(LogForwarder { transport, chat_id, digest: Vec::new() }.run(rx));
        Self { lines }
    }
}

struct LogForwarder {
    transport: Arc<dyn Transport>,
    chat_id: i64,
    digest: Vec<String>,
}

impl LogForwarder {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<LogLine>) {
        let mut tick = tokio::time::interval(DIGEST_EVERY);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                line = rx.recv() => match line {
                    Some(LogLine::Problem(text)) => self.post(&text).await,
                    Some(LogLine::Routine(text)) => {
                        self.digest.push(text);
                        if self.digest.len() >= DIGEST_MAX_LINES {
                            self.post_digest().await;
                        }
                    }
                    None => break,
                },
                _ = tick.tick() => self.post_digest().await,
            }
        }
        self.post_digest().await;
    }

    async fn post_digest(&mut self) {
        if self.digest.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.digest).join("\n");
        self.post(&text).await;
    }

    async fn post(&self, text: &str) {
        let body = escape(&clip(text));
        if let Err(e) = self.transport.send(self.chat_id, &body, None).await {
            // The log chat is the thing that failed; stderr is all that is left.
            eprintln!("log chat {} unreachable: {e}", self.chat_id);
        }
    }
}

fn clip(text: &str) -> String {
    match text.char_indices().nth(MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Renders an event as `message, key = value, ...`.
#[derive(Default)]
struct EventText {
    message: Option<String>,
    fields: Vec<String>,
}

impl Visit for EventText {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push(format!("{} = {value}", field.name()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.fields.push(format!("{} = {value:?}", field.name()));
        }
    }
}

impl EventText {
    fn render(self) -> String {
        let mut out = self.message.unwrap_or_default();
        for field in self.fields {
            if !out.is_empty() {
                out.push_str(", ");
            }
            out.push_str(&field);
        }
        out
    }
}

impl<S: Subscriber> Layer<S> for ChatLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > Level::INFO || meta.target().starts_with(SKIPPED_TARGET) {
            return;
        }

        let mut text = EventText::default();
        event.record(&mut text);
        let text = text.render();

        let line = match *meta.level() {
            Level::ERROR => LogLine::Problem(format!("❌ {text}")),
            Level::WARN => LogLine::Problem(format!("⚠️ {text}")),
            _ => LogLine::Routine(text),
        };
        // Closed only when the forwarder is gone, e.g. during runtime shutdown.
        let _ = self.lines.send(line);
    }
}

//! Outbound messaging: the `Transport` seam and its teloxide implementation.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode};
use teloxide::{ApiError, RequestError};
use tracing::{debug, warn};

use crate::scheduling::callback::Callback;
use crate::scheduling::error::{Error, Result};

/// Inline button: a label and the callback it sends back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, callback: Callback) -> Self {
        Self { label: label.into(), data: callback.to_string() }
    }
}

/// Inline keyboard as rows of buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style row append.
    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.push_row(buttons);
        self
    }

    pub fn push_row(&mut self, buttons: Vec<Button>) {
        if !buttons.is_empty() {
            self.rows.push(buttons);
        }
    }

    /// Lay buttons out `per_row` to a row.
    pub fn grid(buttons: Vec<Button>, per_row: usize) -> Self {
        let mut keyboard = Self::new();
        let mut row = Vec::with_capacity(per_row);
        for button in buttons {
            row.push(button);
            if row.len() == per_row {
                keyboard.push_row(std::mem::take(&mut row));
            }
        }
        keyboard.push_row(row);
        keyboard
    }

    /// All callback payloads, row by row.
    pub fn payloads(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().flatten().map(|b| b.data.as_str())
    }
}

/// The messaging operations the bot relies on. Text is HTML.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message and return its id.
    async fn send(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<i64>;

    /// Replace text and keyboard of an existing message.
    async fn edit(&self, chat_id: i64, message_id: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<()>;

    async fn delete(&self, chat_id: i64, message_id: i64) -> Result<()>;
}

/// Telegram Bot API transport using teloxide.
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn markup(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.data.clone()))
            .collect::<Vec<_>>()
    }))
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<i64> {
        let mut request = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html);

        if let Some(keyboard) = keyboard {
            request = request.reply_markup(markup(keyboard));
        }

        request.await.map(|msg| msg.id.0 as i64).map_err(|e| {
            let msg = format!("Failed to send to {chat_id}: {e}");
            warn!("{}", msg);
            Error::Transport(msg)
        })
    }

    async fn edit(&self, chat_id: i64, message_id: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<()> {
        let mut request = self
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id as i32), text)
            .parse_mode(ParseMode::Html);

        if let Some(keyboard) = keyboard {
            request = request.reply_markup(markup(keyboard));
        }

        match request.await {
            Ok(_) => Ok(()),
            Err(RequestError::Api(ApiError::MessageNotModified)) => {
                debug!("Message {} in {} unchanged", message_id, chat_id);
                Ok(())
            }
            Err(e) => Err(Error::Transport(format!("Failed to edit {message_id} in {chat_id}: {e}"))),
        }
    }

    async fn delete(&self, chat_id: i64, message_id: i64) -> Result<()> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id as i32))
            .await
            .map(|_| ())
            .map_err(|e| Error::Transport(format!("Failed to delete {message_id} in {chat_id}: {e}")))
    }
}

//! In-memory `Transport` for tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::scheduling::error::{Error, Result};
use crate::scheduling::transport::{Keyboard, Transport};

#[derive(Debug, Clone)]
pub struct Sent {
    pub chat_id: i64,
    pub message_id: i64,
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

#[derive(Default)]
struct State {
    next_id: i64,
    visible: Vec<Sent>,
    history: Vec<Sent>,
    fail_sends: bool,
    fail_deletes: bool,
}

/// Records every call and keeps track of which messages are still visible.
#[derive(Default)]
pub struct RecordingTransport {
    state: Mutex<State>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state().fail_sends = fail;
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.state().fail_deletes = fail;
    }

    /// Ids of messages currently visible in a chat, oldest first.
    pub fn visible(&self, chat_id: i64) -> Vec<i64> {
        self.state()
            .visible
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .map(|m| m.message_id)
            .collect()
    }

    pub fn visible_messages(&self, chat_id: i64) -> Vec<Sent> {
        self.state()
            .visible
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect()
    }

    pub fn text_of(&self, chat_id: i64, message_id: i64) -> Option<String> {
        self.state()
            .visible
            .iter()
            .find(|m| m.chat_id == chat_id && m.message_id == message_id)
            .map(|m| m.text.clone())
    }

    /// Everything ever sent to a chat, including deleted messages.
    pub fn sent_to(&self, chat_id: i64) -> Vec<Sent> {
        self.state()
            .history
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<i64> {
        let mut state = self.state();
        if state.fail_sends {
            return Err(Error::Transport("send refused".into()));
        }
        state.next_id += 1;
        let sent = Sent {
            chat_id,
            message_id: state.next_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        };
        state.visible.push(sent.clone());
        state.history.push(sent);
        Ok(state.next_id)
    }

    async fn edit(&self, chat_id: i64, message_id: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<()> {
        let mut state = self.state();
        let message = state
            .visible
            .iter_mut()
            .find(|m| m.chat_id == chat_id && m.message_id == message_id)
            .ok_or_else(|| Error::Transport("message to edit not found".into()))?;
        message.text = text.to_string();
        message.keyboard = keyboard.cloned();
        Ok(())
    }

    async fn delete(&self, chat_id: i64, message_id: i64) -> Result<()> {
        let mut state = self.state();
        if state.fail_deletes {
            return Err(Error::Transport("delete refused".into()));
        }
        let before = state.visible.len();
        state
            .visible
            .retain(|m| !(m.chat_id == chat_id && m.message_id == message_id));
        if state.visible.len() == before {
            return Err(Error::Transport("message to delete not found".into()));
        }
        Ok(())
    }
}

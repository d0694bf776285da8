//! Single visible bot message per chat.
//!
//! `SessionStore` maps a chat to the id of the bot message currently shown
//! there. Each chat has its own async lock, held for the whole
//! delete/send/record sequence, so concurrent handlers and scanners cannot
//! leave two bot messages visible in one chat.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::scheduling::error::Result;
use crate::scheduling::transport::Transport;
use crate::scheduling::views::Screen;

type ChatSlot = Arc<AsyncMutex<Option<i64>>>;

/// Chat id -> last shown message id. Process lifetime only.
#[derive(Default)]
pub struct SessionStore {
    chats: Mutex<HashMap<i64, ChatSlot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn chat(&self, chat_id: i64) -> ChatSlot {
        let mut chats = self.chats.lock().unwrap_or_else(|e| e.into_inner());
        chats.entry(chat_id).or_default().clone()
    }

    /// Recorded message for a chat, if any.
    pub async fn current(&self, chat_id: i64) -> Option<i64> {
        *self.chat(chat_id).lock().await
    }

    /// Number of chats that currently have an entry.
    pub fn tracked_chats(&self) -> usize {
        self.chats.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Forget a chat's entry once it records nothing and no task holds its lock.
    /// New holders can only appear through `chat`, which needs the map lock.
    fn prune(&self, chat_id: i64) {
        let mut chats = self.chats.lock().unwrap_or_else(|e| e.into_inner());
        let idle = chats.get(&chat_id).is_some_and(|slot| {
            Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|current| current.is_none())
        });
        if idle {
            chats.remove(&chat_id);
        }
    }
}

pub struct SessionNavigator {
    transport: Arc<dyn Transport>,
    sessions: SessionStore,
    transient_ttl: Duration,
}

impl SessionNavigator {
    pub fn new(transport: Arc<dyn Transport>, transient_ttl: Duration) -> Self {
        Self { transport, sessions: SessionStore::new(), transient_ttl }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Replace whatever the chat shows with `screen`.
    ///
    /// The old message is deleted best-effort. If sending fails the record is
    /// left empty and the error is returned.
    pub async fn present(&self, chat_id: i64, screen: &Screen) -> Result<i64> {
        let slot = self.sessions.chat(chat_id);
        let mut current = slot.lock().await;
        self.present_locked(chat_id, &mut current, screen).await
    }

    async fn present_locked(&self, chat_id: i64, current: &mut Option<i64>, screen: &Screen) -> Result<i64> {
        if let Some(old) = current.take() {
            if let Err(e) = self.transport.delete(chat_id, old).await {
                warn!("Could not delete message {} in {}: {}", old, chat_id, e);
            }
        }

        let id = self
            .transport
            .send(chat_id, &screen.text, screen.keyboard.as_ref())
            .await?;
        *current = Some(id);
        debug!("Chat {} now shows message {}", chat_id, id);
        Ok(id)
    }

    /// Edit the recorded message in place, or present when nothing is recorded.
    pub async fn mutate(&self, chat_id: i64, screen: &Screen) -> Result<i64> {
        let slot = self.sessions.chat(chat_id);
        let mut current = slot.lock().await;

        match *current {
            Some(id) => {
                if let Err(e) = self
                    .transport
                    .edit(chat_id, id, &screen.text, screen.keyboard.as_ref())
                    .await
                {
                    warn!("Could not edit message {} in {}: {}", id, chat_id, e);
                }
                Ok(id)
            }
            None => self.present_locked(chat_id, &mut current, screen).await,
        }
    }

    /// Delete the recorded message and forget it.
    pub async fn clear(&self, chat_id: i64) {
        {
            let slot = self.sessions.chat(chat_id);
            let mut current = slot.lock().await;

            if let Some(old) = current.take() {
                if let Err(e) = self.transport.delete(chat_id, old).await {
                    warn!("Could not delete message {} in {}: {}", old, chat_id, e);
                }
            }
        }
        self.sessions.prune(chat_id);
    }

    /// Delete a specific message, e.g. the one a button was pressed on.
    /// Forgets the record if it pointed at that message.
    pub async fn discard(&self, chat_id: i64, message_id: i64) {
        let slot = self.sessions.chat(chat_id);
        let mut current = slot.lock().await;

        if let Err(e) = self.transport.delete(chat_id, message_id).await {
            warn!("Could not delete message {} in {}: {}", message_id, chat_id, e);
        }
        if *current == Some(message_id) {
            *current = None;
        }
    }

    /// Send a message that is not recorded and disappears after the transient TTL.
    pub async fn flash(&self, chat_id: i64, screen: &Screen) -> Result<i64> {
        let id = self
            .transport
            .send(chat_id, &screen.text, screen.keyboard.as_ref())
            .await?;

        let transport = self.transport.clone();
        let ttl = self.transient_ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Err(e) = transport.delete(chat_id, id).await {
                warn!("Could not delete transient message {} in {}: {}", id, chat_id, e);
            }
        });
        Ok(id)
    }

    /// Plain send for chats without a session, e.g. a broadcast channel.
    pub async fn post(&self, chat_id: i64, screen: &Screen) -> Result<i64> {
        self.transport
            .send(chat_id, &screen.text, screen.keyboard.as_ref())
            .await
    }
}

//! Shared bot state
//!
//! Event broadcaster plus the last announcement and presence published by the
//! bot. The chat presentation layer is an external collaborator: it observes
//! these through the SSE stream.

use async_trait::async_trait;
use chrono::Utc;
use sxm_common::events::{BotEvent, Presence};
use tokio::sync::{broadcast, RwLock};
use tracing::info;

/// Presentation side effects requested by the core
#[async_trait]
pub trait BotOutput: Send + Sync {
    /// Post a message to the configured status output channel
    async fn announce(&self, message: &str);

    /// Replace the bot presence (None clears it)
    async fn set_presence(&self, presence: Option<Presence>);
}

/// Shared state accessible by all components
pub struct SharedState {
    /// Channel announcements are addressed to (None means log only)
    pub output_channel_id: Option<String>,

    /// Most recent announcement
    pub last_announcement: RwLock<Option<String>>,

    /// Currently published presence
    pub presence: RwLock<Option<Presence>>,

    /// Event broadcaster for SSE events
    pub event_tx: broadcast::Sender<BotEvent>,
}

impl SharedState {
    /// Create new shared state with default values
    pub fn new(output_channel_id: Option<String>) -> Self {
        let (event_tx, _) = broadcast::channel(100); // Buffer up to 100 events
        Self {
            output_channel_id,
            last_announcement: RwLock::new(None),
            presence: RwLock::new(None),
            event_tx,
        }
    }

    /// Broadcast an event to all SSE listeners
    pub fn broadcast_event(&self, event: BotEvent) {
        // Ignore send errors (no receivers is OK)
        let _ = self.event_tx.send(event);
    }

    /// Subscribe to event stream for SSE
    pub fn subscribe_events(&self) -> broadcast::Receiver<BotEvent> {
        self.event_tx.subscribe()
    }

    pub async fn get_presence(&self) -> Option<Presence> {
        self.presence.read().await.clone()
    }

    pub async fn get_last_announcement(&self) -> Option<String> {
        self.last_announcement.read().await.clone()
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl BotOutput for SharedState {
    async fn announce(&self, message: &str) {
        info!("Bot output: {}", message);
        *self.last_announcement.write().await = Some(message.to_string());

        if self.output_channel_id.is_some() {
            self.broadcast_event(BotEvent::Announcement {
                message: message.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    async fn set_presence(&self, presence: Option<Presence>) {
        let mut current = self.presence.write().await;
        if *current == presence {
            return;
        }
        *current = presence.clone();
        drop(current);

        self.broadcast_event(BotEvent::PresenceChanged {
            presence,
            timestamp: Utc::now(),
        });
    }
}

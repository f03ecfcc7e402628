//! Event types exchanged between the bot and its collaborators
//!
//! - [`InboundEvent`]: produced by the stream-acquisition side, drained by the
//!   status reconciler
//! - [`OutboundEvent`]: produced by the audio player, consumed by the
//!   stream-acquisition side
//! - [`BotEvent`]: broadcast to observers (SSE clients, chat presentation)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{LiveSnapshot, XmChannel};

/// Transport requested for live stream playback
pub const DEFAULT_STREAM_TRANSPORT: &str = "udp";

/// Status/update messages from the stream-acquisition side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEvent {
    /// Upstream connectivity changed
    SxmStatus { running: bool },

    /// A previously requested live stream is ready at `locator`
    StreamStarted { channel_id: String, locator: String },

    /// Channel catalog refreshed
    UpdateChannels { channels: Vec<XmChannel> },

    /// Live metadata for the streaming channel refreshed
    UpdateLive { snapshot: LiveSnapshot },
}

impl InboundEvent {
    /// Event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::SxmStatus { .. } => "SxmStatus",
            InboundEvent::StreamStarted { .. } => "StreamStarted",
            InboundEvent::UpdateChannels { .. } => "UpdateChannels",
            InboundEvent::UpdateLive { .. } => "UpdateLive",
        }
    }
}

/// Requests sent to the stream-acquisition side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundEvent {
    /// Start streaming `channel_id` over `transport`
    TriggerStream { channel_id: String, transport: String },

    /// Tear down the active stream
    KillStream,
}

/// Kind of presence shown for the bot account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresenceKind {
    Listening,
}

/// Presence descriptor published by the reconciler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub kind: PresenceKind,
    pub name: String,
    pub details: Option<String>,
    pub state: String,
    pub large_image_url: Option<String>,
    pub large_image_text: Option<String>,
    pub start: Option<DateTime<Utc>>,
}

/// Events broadcast to observers of the bot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BotEvent {
    /// Message for the configured status output channel
    Announcement {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Presence changed (None clears it)
    PresenceChanged {
        presence: Option<Presence>,
        timestamp: DateTime<Utc>,
    },

    /// An outbound request was handed to the stream-acquisition side
    StreamRequested {
        event: OutboundEvent,
        timestamp: DateTime<Utc>,
    },

    /// The consumption loop started playing an item
    TrackStarted {
        description: String,
        timestamp: DateTime<Utc>,
    },
}

impl BotEvent {
    /// Event type string (used as the SSE event field)
    pub fn event_type(&self) -> &'static str {
        match self {
            BotEvent::Announcement { .. } => "Announcement",
            BotEvent::PresenceChanged { .. } => "PresenceChanged",
            BotEvent::StreamRequested { .. } => "StreamRequested",
            BotEvent::TrackStarted { .. } => "TrackStarted",
        }
    }
}

//! Externally-fed player state
//!
//! Mutated only by the status reconciler; everyone else reads clones.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sxm_common::{LiveCut, LiveSnapshot, XmChannel};

/// Live channel to resume once upstream connectivity returns
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingLive {
    pub channel: XmChannel,
    /// Output target the stream was playing on
    pub target: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlayerState {
    /// Upstream connectivity
    pub sxm_running: bool,
    /// Known channel catalog
    pub channels: Vec<XmChannel>,
    /// Live metadata for the streaming channel
    pub live: Option<LiveSnapshot>,
    /// Id of the channel the live metadata belongs to
    pub stream_channel: Option<String>,
    /// Pending-resume descriptor
    pub pending: Option<PendingLive>,
}

impl PlayerState {
    pub fn get_channel(&self, id: &str) -> Option<&XmChannel> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Channel the live metadata refers to
    pub fn stream_xm_channel(&self) -> Option<&XmChannel> {
        self.stream_channel
            .as_deref()
            .and_then(|id| self.get_channel(id))
    }

    pub fn update_channels(&mut self, channels: Vec<XmChannel>) {
        self.channels = channels;
    }

    pub fn set_live(&mut self, snapshot: LiveSnapshot) {
        self.stream_channel = Some(snapshot.channel_id.clone());
        self.live = Some(snapshot);
    }

    pub fn radio_time(&self) -> Option<DateTime<Utc>> {
        self.live.as_ref().and_then(|l| l.radio_time)
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.live.as_ref().and_then(|l| l.start_time)
    }

    /// Up to `count` recent cuts plus the one currently airing
    pub fn recent_cuts(&self, count: usize) -> (Vec<LiveCut>, Option<LiveCut>) {
        let Some(live) = &self.live else {
            return (Vec::new(), None);
        };
        let cuts = live.recent_cuts(count);
        let latest = cuts.first().cloned();
        (cuts, latest)
    }

    /// Find a channel by id, channel number, or name substring (case-insensitive)
    ///
    /// Each channel is tested against all three in turn; the first channel in
    /// catalog order that matches any of them wins.
    pub fn parse_channel(&self, input: &str) -> Option<&XmChannel> {
        let needle = input.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }

        self.channels.iter().find(|channel| {
            channel.id.to_lowercase() == needle
                || channel.channel_number == needle
                || channel.name.to_lowercase().contains(&needle)
        })
    }

    /// Comma-separated list of channel specifications; unknown parts are skipped
    pub fn parse_channels(&self, input: &str) -> Vec<XmChannel> {
        let mut result: Vec<XmChannel> = Vec::new();
        for part in input.split(',') {
            if let Some(channel) = self.parse_channel(part) {
                if !result.iter().any(|c| c.id == channel.id) {
                    result.push(channel.clone());
                }
            }
        }
        result
    }
}

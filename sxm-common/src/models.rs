//! Domain models shared by the repository, the player and the presentation layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Archived song recorded from a live channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub guid: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub air_time: DateTime<Utc>,
    pub channel: String,
    pub file_path: String,
    pub image_url: Option<String>,
}

/// Archived show episode recorded from a live channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub guid: String,
    pub title: String,
    pub show: String,
    pub air_time: DateTime<Utc>,
    pub channel: String,
    pub file_path: String,
    pub image_url: Option<String>,
}

/// A playable archived file: either a song or an episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaFile {
    Song(Song),
    Episode(Episode),
}

impl MediaFile {
    pub fn guid(&self) -> &str {
        match self {
            MediaFile::Song(s) => &s.guid,
            MediaFile::Episode(e) => &e.guid,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            MediaFile::Song(s) => &s.title,
            MediaFile::Episode(e) => &e.title,
        }
    }

    pub fn file_path(&self) -> &str {
        match self {
            MediaFile::Song(s) => &s.file_path,
            MediaFile::Episode(e) => &e.file_path,
        }
    }

    pub fn channel(&self) -> &str {
        match self {
            MediaFile::Song(s) => &s.channel,
            MediaFile::Episode(e) => &e.channel,
        }
    }

    pub fn air_time(&self) -> DateTime<Utc> {
        match self {
            MediaFile::Song(s) => s.air_time,
            MediaFile::Episode(e) => e.air_time,
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        match self {
            MediaFile::Song(s) => s.image_url.as_deref(),
            MediaFile::Episode(e) => e.image_url.as_deref(),
        }
    }

    /// Display name used in presence and chat replies
    ///
    /// Songs render as `"Title" by Artist`, episodes as `"Title" from Show`.
    pub fn pretty_name(&self) -> String {
        match self {
            MediaFile::Song(s) => format!("\"{}\" by {}", s.title, s.artist),
            MediaFile::Episode(e) => format!("\"{}\" from {}", e.title, e.show),
        }
    }

    /// `pretty_name` with markdown bold applied to the title
    pub fn bold_name(&self) -> String {
        match self {
            MediaFile::Song(s) => format!("**\"{}\"** by **{}**", s.title, s.artist),
            MediaFile::Episode(e) => format!("**\"{}\"** from **{}**", e.title, e.show),
        }
    }
}

impl From<Song> for MediaFile {
    fn from(song: Song) -> Self {
        MediaFile::Song(song)
    }
}

impl From<Episode> for MediaFile {
    fn from(episode: Episode) -> Self {
        MediaFile::Episode(episode)
    }
}

/// Live channel in the SXM catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmChannel {
    pub id: String,
    pub channel_number: String,
    pub name: String,
    #[serde(default)]
    pub short_description: String,
}

impl XmChannel {
    pub fn pretty_name(&self) -> String {
        format!("#{} {}", self.channel_number, self.name)
    }

    /// Channel number as an integer for sorting (unparseable numbers sort last)
    pub fn number(&self) -> u32 {
        self.channel_number.parse().unwrap_or(u32::MAX)
    }
}

/// A song marker ("cut") in a live channel's timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveCut {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub image_url: Option<String>,
    pub time: DateTime<Utc>,
}

/// A show marker in a live channel's timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveEpisode {
    pub long_title: String,
    pub time: DateTime<Utc>,
}

/// Snapshot of the live metadata for the channel currently streaming
///
/// Cuts and episodes are kept newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSnapshot {
    pub channel_id: String,
    pub start_time: Option<DateTime<Utc>>,
    pub radio_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cuts: Vec<LiveCut>,
    #[serde(default)]
    pub episodes: Vec<LiveEpisode>,
}

impl LiveSnapshot {
    /// Most recent cut that started at or before `now`
    pub fn latest_cut(&self, now: Option<DateTime<Utc>>) -> Option<&LiveCut> {
        match now {
            Some(now) => self.cuts.iter().find(|c| c.time <= now),
            None => self.cuts.first(),
        }
    }

    /// Most recent episode that started at or before `now`
    pub fn latest_episode(&self, now: Option<DateTime<Utc>>) -> Option<&LiveEpisode> {
        match now {
            Some(now) => self.episodes.iter().find(|e| e.time <= now),
            None => self.episodes.first(),
        }
    }

    /// Up to `count` most recent cuts
    pub fn recent_cuts(&self, count: usize) -> Vec<LiveCut> {
        self.cuts.iter().take(count).cloned().collect()
    }
}

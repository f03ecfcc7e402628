//! Ephemeral paginated result sessions ("carousels")
//!
//! A carousel is created when a command produces several results and is
//! navigated one item at a time. Sessions expire once idle for longer than
//! the TTL: expired entries are dropped lazily on lookup and by a periodic
//! sweep, and the registry never holds more than `max_sessions` entries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sxm_common::human_time::natural_delta;
use sxm_common::{LiveCut, MediaFile, XmChannel};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::CarouselSettings;

/// One displayable result
#[derive(Debug, Clone, PartialEq)]
pub enum CarouselItem {
    Archived(MediaFile),
    Cut(LiveCut),
}

/// What the carousel shows; decides the footer text
#[derive(Debug, Clone, PartialEq)]
pub enum CarouselKind {
    /// Archive search results or the recent-file history
    ArchivedSongs,

    /// Recent songs on a live channel
    LiveCuts {
        channel: XmChannel,
        latest: Option<LiveCut>,
        radio_time: Option<DateTime<Utc>>,
    },

    /// Queue lookahead; `latest` marks the item being played
    Upcoming { latest: Option<MediaFile> },
}

/// Navigation input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Previous,
    Next,
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "previous" | "prev" | "left" => Ok(Direction::Previous),
            "next" | "right" => Ok(Direction::Next),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

/// Result of a navigation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Navigation {
    Moved,
    Unhandled,
}

/// Rendered page of a carousel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarouselView {
    pub body: String,
    pub title: String,
    pub description: String,
    pub footer: String,
    pub index: usize,
    pub total: usize,
}

/// State of one carousel
///
/// Invariant: `index < items.len()` and `items` is never empty.
#[derive(Debug, Clone)]
pub struct CarouselSession {
    items: Vec<CarouselItem>,
    index: usize,
    message_id: Option<String>,
    body: String,
    kind: CarouselKind,
    created_at: Instant,
    last_interaction: Instant,
}

impl CarouselSession {
    /// None when there is nothing to show
    pub fn new(body: impl Into<String>, kind: CarouselKind, items: Vec<CarouselItem>) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        let now = Instant::now();
        Some(Self {
            items,
            index: 0,
            message_id: None,
            body: body.into(),
            kind,
            created_at: now,
            last_interaction: now,
        })
    }

    pub fn current(&self) -> &CarouselItem {
        &self.items[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn kind(&self) -> &CarouselKind {
        &self.kind
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn set_message_id(&mut self, id: impl Into<String>) {
        self.message_id = Some(id.into());
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_interaction(&self) -> Instant {
        self.last_interaction
    }

    pub fn touch(&mut self) {
        self.last_interaction = Instant::now();
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.last_interaction.elapsed() > ttl
    }

    /// Footer line for the current page
    pub fn footer(&self, now: DateTime<Utc>) -> String {
        let position = format!("{}/{}", self.index + 1, self.items.len());

        match (&self.kind, self.current()) {
            (CarouselKind::LiveCuts { latest, radio_time, .. }, CarouselItem::Cut(cut)) => {
                if latest.as_ref() == Some(cut) {
                    format!("Now Playing | {} Recent Songs", position)
                } else {
                    let now = radio_time.unwrap_or(now);
                    let delta = natural_delta((now - cut.time).num_seconds());
                    format!("About {} ago | {} Recent Songs", delta, position)
                }
            }
            (CarouselKind::Upcoming { latest }, CarouselItem::Archived(media)) => {
                let message = if latest.as_ref() == Some(media) {
                    "Playing Next".to_string()
                } else {
                    format!("{} Away", self.index + 1)
                };
                format!("{} | {} Songs", message, position)
            }
            (_, CarouselItem::Archived(media)) => {
                format!("GUID: {} | {} Songs", media.guid(), position)
            }
            (_, CarouselItem::Cut(_)) => format!("{} Songs", position),
        }
    }

    /// Render the current page
    pub fn view(&self, now: DateTime<Utc>) -> CarouselView {
        let (title, description) = match self.current() {
            CarouselItem::Archived(MediaFile::Song(song)) => {
                let mut description = format!("**{}**", song.artist);
                if let Some(album) = &song.album {
                    description.push_str(&format!("\nAlbum: {}", album));
                }
                description.push_str(&format!("\nChannel: {}", song.channel));
                (song.title.clone(), description)
            }
            CarouselItem::Archived(MediaFile::Episode(episode)) => (
                episode.title.clone(),
                format!("Show: {}\nChannel: {}", episode.show, episode.channel),
            ),
            CarouselItem::Cut(cut) => {
                let mut description = format!("**{}**", cut.artist);
                if let Some(album) = &cut.album {
                    description.push_str(&format!("\nAlbum: {}", album));
                }
                if let CarouselKind::LiveCuts { channel, .. } = &self.kind {
                    description.push_str(&format!("\nChannel: {}", channel.pretty_name()));
                }
                (cut.title.clone(), description)
            }
        };

        CarouselView {
            body: self.body.clone(),
            title,
            description,
            footer: self.footer(now),
            index: self.index,
            total: self.items.len(),
        }
    }
}

/// Move the current index one step
///
/// At either edge nothing changes and `Unhandled` is returned; the
/// interaction time is only refreshed by a successful move.
pub fn navigate(session: &mut CarouselSession, direction: Direction) -> Navigation {
    match direction {
        Direction::Previous if session.index > 0 => session.index -= 1,
        Direction::Next if session.index + 1 < session.items.len() => session.index += 1,
        _ => return Navigation::Unhandled,
    }
    session.touch();
    Navigation::Moved
}

/// Bounded, TTL-evicted carousel storage keyed by message id
pub struct CarouselRegistry {
    sessions: Mutex<HashMap<String, CarouselSession>>,
    settings: CarouselSettings,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CarouselRegistry {
    pub fn new(settings: CarouselSettings) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            settings,
            sweeper: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CarouselSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the periodic sweep task
    pub fn start(self: &Arc<Self>) {
        let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if sweeper.is_some() {
            return;
        }

        let registry = Arc::downgrade(self);
        let period = self.settings.sweep_interval();
        *sweeper = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.sweep();
            }
        }));
        debug!("Carousel sweeper started");
    }

    /// Stop the sweep task and drop every session
    pub fn stop(&self) {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = sweeper {
            handle.abort();
        }
        self.lock().clear();
    }

    /// Register a session (an existing id is overwritten)
    pub fn add(&self, id: impl Into<String>, session: CarouselSession) {
        let id = id.into();
        let ttl = self.settings.ttl();
        let mut sessions = self.lock();

        if !sessions.contains_key(&id) && sessions.len() >= self.settings.max_sessions {
            sessions.retain(|_, s| !s.is_expired(ttl));

            if sessions.len() >= self.settings.max_sessions {
                let oldest = sessions
                    .iter()
                    .min_by_key(|(_, s)| s.last_interaction)
                    .map(|(id, _)| id.clone());
                if let Some(oldest) = oldest {
                    debug!("Carousel registry full, evicting {}", oldest);
                    sessions.remove(&oldest);
                }
            }
        }

        sessions.insert(id, session);
    }

    /// Look up a live session; an expired one is removed and not returned
    pub fn get(&self, id: &str) -> Option<CarouselSession> {
        let ttl = self.settings.ttl();
        let mut sessions = self.lock();

        if sessions.get(id)?.is_expired(ttl) {
            debug!("Removing expired carousel {}", id);
            sessions.remove(id);
            return None;
        }
        sessions.get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<CarouselSession> {
        self.lock().remove(id)
    }

    /// Navigate a registered session and render its new page
    pub fn navigate(&self, id: &str, direction: Direction) -> Option<(Navigation, CarouselView)> {
        let ttl = self.settings.ttl();
        let mut sessions = self.lock();

        if sessions.get(id)?.is_expired(ttl) {
            sessions.remove(id);
            return None;
        }

        let session = sessions.get_mut(id)?;
        let outcome = navigate(session, direction);
        Some((outcome, session.view(Utc::now())))
    }

    /// Remove every session idle past the TTL; returns how many were removed
    pub fn sweep(&self) -> usize {
        let ttl = self.settings.ttl();
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(ttl));
        let removed = before - sessions.len();

        if removed > 0 {
            info!("Removed {} expired carousel(s)", removed);
        }
        removed
    }

    /// Number of sessions currently held
    pub fn count(&self) -> usize {
        self.lock().len()
    }
}

impl Drop for CarouselRegistry {
    fn drop(&mut self) {
        if let Some(handle) = self
            .sweeper
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

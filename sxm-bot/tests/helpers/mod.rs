//! Shared fakes for sxm-bot integration tests
//!
//! - [`MockSourceFactory`] / [`MockSource`]: count opens and native frees
//! - [`MockConnector`] / [`MockSink`]: record sink calls; playback only ends
//!   when the test calls [`MockSink::finish`] or the player stops it;
//!   disconnects can be slowed down
//! - [`MemoryRepository`]: in-memory song archive with call counters; lookups
//!   can be made to hang
//! - [`RecordingOutput`]: captures announcements and presence updates

#![allow(dead_code)]

use std::collections::HashSet;
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sxm_bot::audio::{
    AudioSource, OutputConnector, OutputSink, PlaybackCompletion, SourceFactory, SourceSpec,
};
use sxm_bot::config::PlayerTimings;
use sxm_bot::error::{PlayerError, SinkError};
use sxm_bot::player::{AudioPlayer, PlayerDeps};
use sxm_bot::state::BotOutput;
use sxm_common::db::SongRepository;
use sxm_common::events::{BotEvent, OutboundEvent, Presence};
use sxm_common::{MediaFile, Song, XmChannel};
use tokio::sync::{broadcast, mpsc};

// ============================================================================
// Sources
// ============================================================================

pub struct MockSource {
    label: String,
    released: AtomicBool,
    frees: AtomicUsize,
}

impl MockSource {
    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl AudioSource for MockSource {
    fn describe(&self) -> &str {
        &self.label
    }

    fn take_output(&self) -> Option<Box<dyn Read + Send>> {
        None
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.frees.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct MockSourceFactory {
    opened: Mutex<Vec<Arc<MockSource>>>,
    specs: Mutex<Vec<SourceSpec>>,
    failing: Mutex<HashSet<String>>,
}

impl MockSourceFactory {
    pub fn opened(&self) -> Vec<Arc<MockSource>> {
        self.opened.lock().unwrap().clone()
    }

    pub fn specs(&self) -> Vec<SourceSpec> {
        self.specs.lock().unwrap().clone()
    }

    /// Make opening `input` fail
    pub fn fail_on(&self, input: &str) {
        self.failing.lock().unwrap().insert(input.to_string());
    }

    /// Every opened source was freed exactly once
    pub fn all_released_once(&self) -> bool {
        self.opened().iter().all(|s| s.frees() == 1)
    }
}

impl SourceFactory for MockSourceFactory {
    fn open(&self, spec: &SourceSpec) -> Result<Arc<dyn AudioSource>, PlayerError> {
        self.specs.lock().unwrap().push(spec.clone());
        if self.failing.lock().unwrap().contains(&spec.input) {
            return Err(PlayerError::Playback(format!("cannot open {}", spec.input)));
        }

        let source = Arc::new(MockSource {
            label: spec.input.clone(),
            released: AtomicBool::new(false),
            frees: AtomicUsize::new(0),
        });
        self.opened.lock().unwrap().push(source.clone());
        Ok(source)
    }
}

// ============================================================================
// Sinks
// ============================================================================

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub struct MockSink {
    target: Mutex<String>,
    log: CallLog,
    active: AtomicBool,
    playing: AtomicBool,
    listeners: AtomicUsize,
    plays: AtomicUsize,
    fail_next_play: AtomicBool,
    disconnect_delay: Mutex<Option<Duration>>,
    completion: Mutex<Option<PlaybackCompletion>>,
}

impl MockSink {
    fn new(target: &str, log: CallLog) -> Self {
        Self {
            target: Mutex::new(target.to_string()),
            log,
            active: AtomicBool::new(true),
            playing: AtomicBool::new(false),
            listeners: AtomicUsize::new(1),
            plays: AtomicUsize::new(0),
            fail_next_play: AtomicBool::new(false),
            disconnect_delay: Mutex::new(None),
            completion: Mutex::new(None),
        }
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    /// Successful `play` calls so far
    pub fn play_count(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn set_listeners(&self, count: usize) {
        self.listeners.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_play(&self) {
        self.fail_next_play.store(true, Ordering::SeqCst);
    }

    /// Make every disconnect take `delay` before it lets go
    pub fn delay_disconnect(&self, delay: Duration) {
        *self.disconnect_delay.lock().unwrap() = Some(delay);
    }

    /// End the current track naturally, from another thread
    pub fn finish(&self) -> bool {
        let completion = self.completion.lock().unwrap().take();
        match completion {
            Some(done) => {
                self.playing.store(false, Ordering::SeqCst);
                std::thread::spawn(move || done.complete(None))
                    .join()
                    .unwrap();
                true
            }
            None => false,
        }
    }

    fn end_playback(&self) {
        self.playing.store(false, Ordering::SeqCst);
        if let Some(done) = self.completion.lock().unwrap().take() {
            done.complete(None);
        }
    }
}

#[async_trait]
impl OutputSink for MockSink {
    fn target(&self) -> String {
        self.target.lock().unwrap().clone()
    }

    async fn move_to(&self, target: &str) -> Result<(), SinkError> {
        self.record(format!("move:{}", target));
        *self.target.lock().unwrap() = target.to_string();
        Ok(())
    }

    async fn disconnect(&self, _force: bool) -> Result<(), SinkError> {
        self.record("disconnect".to_string());
        let delay = *self.disconnect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.active.store(false, Ordering::SeqCst);
        self.end_playback();
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn listeners(&self) -> usize {
        self.listeners.load(Ordering::SeqCst)
    }

    fn play(&self, source: Arc<dyn AudioSource>, done: PlaybackCompletion) -> Result<(), SinkError> {
        if !self.is_active() {
            return Err(SinkError::Disconnected);
        }
        if self.fail_next_play.swap(false, Ordering::SeqCst) {
            self.record(format!("play-failed:{}", source.describe()));
            return Err(SinkError::Rejected("mock failure".to_string()));
        }

        self.record(format!("play:{}", source.describe()));
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.playing.store(true, Ordering::SeqCst);
        *self.completion.lock().unwrap() = Some(done);
        Ok(())
    }

    fn stop(&self) {
        self.record("stop".to_string());
        self.end_playback();
    }
}

#[derive(Default)]
pub struct MockConnector {
    log: CallLog,
    sinks: Mutex<Vec<Arc<MockSink>>>,
    delay: Mutex<Option<Duration>>,
}

impl MockConnector {
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }

    pub fn last_sink(&self) -> Option<Arc<MockSink>> {
        self.sinks.lock().unwrap().last().cloned()
    }

    /// Delay every connect by `delay`
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl OutputConnector for MockConnector {
    async fn connect(&self, target: &str) -> Result<Arc<dyn OutputSink>, SinkError> {
        self.log.lock().unwrap().push(format!("connect:{}", target));

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let sink = Arc::new(MockSink::new(target, self.log.clone()));
        self.sinks.lock().unwrap().push(sink.clone());
        Ok(sink)
    }
}

// ============================================================================
// Repository
// ============================================================================

#[derive(Default)]
pub struct MemoryRepository {
    songs: Mutex<Vec<Song>>,
    distinct_calls: AtomicUsize,
    hang: AtomicBool,
}

impl MemoryRepository {
    pub fn with_songs(songs: Vec<Song>) -> Self {
        Self {
            songs: Mutex::new(songs),
            distinct_calls: AtomicUsize::new(0),
            hang: AtomicBool::new(false),
        }
    }

    pub fn distinct_calls(&self) -> usize {
        self.distinct_calls.load(Ordering::SeqCst)
    }

    /// Make every later pair lookup wait forever
    pub fn hang_lookups(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    fn in_channels(&self, channels: &[String]) -> Vec<Song> {
        self.songs
            .lock()
            .unwrap()
            .iter()
            .filter(|s| channels.contains(&s.channel))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SongRepository for MemoryRepository {
    async fn distinct_title_artist(
        &self,
        channels: &[String],
    ) -> sxm_common::Result<Vec<(String, String)>> {
        self.distinct_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let mut pairs: Vec<(String, String)> = self
            .in_channels(channels)
            .into_iter()
            .map(|s| (s.title, s.artist))
            .collect();
        pairs.sort();
        pairs.dedup();
        Ok(pairs)
    }

    async fn count_distinct(&self, channels: &[String]) -> sxm_common::Result<i64> {
        let mut pairs: Vec<(String, String)> = self
            .in_channels(channels)
            .into_iter()
            .map(|s| (s.title, s.artist))
            .collect();
        pairs.sort();
        pairs.dedup();
        Ok(pairs.len() as i64)
    }

    async fn find_song(
        &self,
        channels: &[String],
        title: &str,
        artist: &str,
    ) -> sxm_common::Result<Option<Song>> {
        Ok(self
            .in_channels(channels)
            .into_iter()
            .find(|s| s.title == title && s.artist == artist))
    }

    async fn song_by_guid(&self, guid: &str) -> sxm_common::Result<Option<Song>> {
        Ok(self.songs.lock().unwrap().iter().find(|s| s.guid == guid).cloned())
    }

    async fn search(&self, query: &str, limit: i64) -> sxm_common::Result<Vec<Song>> {
        let needle = query.to_lowercase();
        let mut found: Vec<Song> = self
            .songs
            .lock()
            .unwrap()
            .iter()
            .filter(|s| {
                s.guid.starts_with(query)
                    || s.title.to_lowercase().contains(&needle)
                    || s.artist.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| b.air_time.cmp(&a.air_time));
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn insert_song(&self, song: &Song) -> sxm_common::Result<()> {
        let mut songs = self.songs.lock().unwrap();
        songs.retain(|s| s.guid != song.guid);
        songs.push(song.clone());
        Ok(())
    }
}

// ============================================================================
// Bot output
// ============================================================================

#[derive(Default)]
pub struct RecordingOutput {
    announcements: Mutex<Vec<String>>,
    presences: Mutex<Vec<Option<Presence>>>,
}

impl RecordingOutput {
    pub fn announcements(&self) -> Vec<String> {
        self.announcements.lock().unwrap().clone()
    }

    pub fn presences(&self) -> Vec<Option<Presence>> {
        self.presences.lock().unwrap().clone()
    }
}

#[async_trait]
impl BotOutput for RecordingOutput {
    async fn announce(&self, message: &str) {
        self.announcements.lock().unwrap().push(message.to_string());
    }

    async fn set_presence(&self, presence: Option<Presence>) {
        self.presences.lock().unwrap().push(presence);
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub struct Fixture {
    pub deps: PlayerDeps,
    pub connector: Arc<MockConnector>,
    pub sources: Arc<MockSourceFactory>,
    pub outbound: mpsc::Receiver<OutboundEvent>,
    pub events: broadcast::Receiver<BotEvent>,
}

pub fn fixture(timings: PlayerTimings) -> Fixture {
    let connector = Arc::new(MockConnector::default());
    let sources = Arc::new(MockSourceFactory::default());
    let (outbound_tx, outbound) = mpsc::channel(16);
    let (events_tx, events) = broadcast::channel(64);

    let deps = PlayerDeps {
        timings,
        connector: connector.clone(),
        sources: sources.clone(),
        outbound: outbound_tx,
        events: events_tx,
    };

    Fixture {
        deps,
        connector,
        sources,
        outbound,
        events,
    }
}

/// Started player plus its fakes
pub fn started_player(timings: PlayerTimings) -> (Arc<AudioPlayer>, Fixture) {
    let fixture = fixture(timings);
    let player = Arc::new(AudioPlayer::new(fixture.deps.clone()));
    player.start();
    (player, fixture)
}

pub fn song(guid: &str, title: &str, artist: &str, channel: &str, hour: u32) -> Song {
    Song {
        guid: guid.to_string(),
        title: title.to_string(),
        artist: artist.to_string(),
        album: None,
        air_time: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
        channel: channel.to_string(),
        file_path: format!("/archive/{}.mp3", guid),
        image_url: None,
    }
}

pub fn media(guid: &str) -> MediaFile {
    MediaFile::Song(song(guid, &format!("Title {}", guid), "Artist", "70s", 1))
}

pub fn channel(id: &str, number: &str, name: &str) -> XmChannel {
    XmChannel {
        id: id.to_string(),
        channel_number: number.to_string(),
        name: name.to_string(),
        short_description: format!("{} description", name),
    }
}

/// Poll `condition` every 10ms (auto-advanced under a paused clock)
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..2000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

/// Let background tasks run for `duration`
pub async fn settle(duration: Duration) {
    tokio::time::sleep(duration).await;
}

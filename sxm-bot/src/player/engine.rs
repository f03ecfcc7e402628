//! Audio player engine
//!
//! Orchestrates the playback queue, the single output sink and the background
//! consumption loop.
//!
//! **Play types:** at most one of File, Live or Random is active. A request
//! for a conflicting type is rejected and enqueues nothing.
//!
//! **Resource lifetime:** every dequeued item is installed in the current slot
//! and released by a drop guard, whichever way the iteration ends (completion,
//! skip, stop, error, or the loop task being cancelled).
//!
//! **Completion hand-off:** the sink fires a [`PlaybackCompletion`] from its
//! own thread; the loop suspends on the receiving half and does nothing else
//! until it fires or shutdown is requested.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::FutureExt;
use rand::seq::SliceRandom;
use serde::Serialize;
use sxm_common::db::SongRepository;
use sxm_common::events::{BotEvent, OutboundEvent, DEFAULT_STREAM_TRANSPORT};
use sxm_common::{MediaFile, XmChannel};
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::history::BoundedHistory;
use super::item::{ItemKind, QueuedItem};
use super::lock;
use super::queue::PlaybackQueue;
use crate::audio::{OutputConnector, OutputSink, PlaybackCompletion, SourceFactory};
use crate::config::PlayerTimings;
use crate::error::PlayerError;

/// Kind of playback currently claimed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlayType {
    File,
    Live,
    Random,
}

/// Consumption state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlayerStatus {
    Idle,
    Loading,
    Playing,
    Stopping,
}

/// Everything needed to build a player
#[derive(Clone)]
pub struct PlayerDeps {
    pub timings: PlayerTimings,
    pub connector: Arc<dyn OutputConnector>,
    pub sources: Arc<dyn SourceFactory>,
    /// Requests for the stream-acquisition side
    pub outbound: mpsc::Sender<OutboundEvent>,
    /// Observer broadcast (track changes)
    pub events: broadcast::Sender<BotEvent>,
}

/// Channels and repository handle a random playlist draws from
#[derive(Clone)]
struct PlaylistSession {
    channels: Vec<String>,
    repository: Arc<dyn SongRepository>,
}

struct PlaybackFlags {
    play_type: Option<PlayType>,
    status: PlayerStatus,
    repeat: bool,
    /// Channel whose stream locator has been requested but not yet delivered
    pending_stream: Option<String>,
    recent: BoundedHistory<MediaFile>,
    upcoming: BoundedHistory<MediaFile>,
    playlist: Option<PlaylistSession>,
}

/// Serializable view of the player for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct PlayerSnapshot {
    pub play_type: Option<PlayType>,
    pub status: PlayerStatus,
    pub repeat: bool,
    pub playing: bool,
    pub queue_len: usize,
    pub output_target: Option<String>,
    pub current: Option<String>,
    pub recent: Vec<String>,
    pub upcoming: Vec<String>,
}

/// Playback state machine and consumption loop
pub struct AudioPlayer {
    deps: PlayerDeps,
    queue: PlaybackQueue,
    flags: Mutex<PlaybackFlags>,
    current: Mutex<Option<QueuedItem>>,
    /// Guards every connect/move/disconnect/readback of the sink reference
    sink: tokio::sync::Mutex<Option<Arc<dyn OutputSink>>>,
    shutdown: AtomicBool,
    shutdown_notify: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Releases the current item when dropped
struct CurrentRelease<'a> {
    player: &'a AudioPlayer,
}

impl Drop for CurrentRelease<'_> {
    fn drop(&mut self) {
        let item = lock(&self.player.current).take();
        if let Some(mut item) = item {
            item.release();
        }
    }
}

fn pick_random(pairs: &[(String, String)]) -> Option<(String, String)> {
    pairs.choose(&mut rand::thread_rng()).cloned()
}

impl AudioPlayer {
    pub fn new(deps: PlayerDeps) -> Self {
        let queue = PlaybackQueue::new(deps.timings.queue_capacity);
        let flags = PlaybackFlags {
            play_type: None,
            status: PlayerStatus::Idle,
            repeat: false,
            pending_stream: None,
            recent: BoundedHistory::new(deps.timings.recent_capacity),
            upcoming: BoundedHistory::new(deps.timings.upcoming_capacity),
            playlist: None,
        };

        Self {
            deps,
            queue,
            flags: Mutex::new(flags),
            current: Mutex::new(None),
            sink: tokio::sync::Mutex::new(None),
            shutdown: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
            task: Mutex::new(None),
        }
    }

    /// Spawn the consumption loop (no-op if it is running or the player was cleaned up)
    pub fn start(self: &Arc<Self>) {
        if self.is_shutting_down() {
            warn!("Cannot start player after cleanup");
            return;
        }

        let mut task = lock(&self.task);
        if task.as_ref().map(|t| !t.is_finished()).unwrap_or(false) {
            return;
        }

        let player = self.clone();
        *task = Some(tokio::spawn(async move { player.run_loop().await }));
        debug!("Audio player started");
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn play_type(&self) -> Option<PlayType> {
        lock(&self.flags).play_type
    }

    pub fn status(&self) -> PlayerStatus {
        lock(&self.flags).status
    }

    pub fn repeat(&self) -> bool {
        lock(&self.flags).repeat
    }

    pub fn set_repeat(&self, enabled: bool) {
        lock(&self.flags).repeat = enabled;
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Most recently played first
    pub fn recent(&self) -> Vec<MediaFile> {
        lock(&self.flags).recent.snapshot()
    }

    /// Next to play first
    pub fn upcoming(&self) -> Vec<MediaFile> {
        lock(&self.flags).upcoming.snapshot()
    }

    /// Media of the item currently playing (file playback only)
    pub fn current(&self) -> Option<MediaFile> {
        lock(&self.current).as_ref().and_then(|item| item.media().cloned())
    }

    /// Channel of the item currently playing (live playback only)
    pub fn current_channel(&self) -> Option<XmChannel> {
        lock(&self.current).as_ref().and_then(|item| item.channel().cloned())
    }

    pub fn has_current(&self) -> bool {
        lock(&self.current).is_some()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// True while the loop task exists and has not finished
    pub fn is_running(&self) -> bool {
        lock(&self.task)
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    /// Playing means an item is installed and the sink reports playback
    pub async fn is_playing(&self) -> bool {
        if !self.has_current() {
            return false;
        }
        self.sink
            .lock()
            .await
            .as_ref()
            .map(|s| s.is_playing())
            .unwrap_or(false)
    }

    pub async fn has_output(&self) -> bool {
        self.sink.lock().await.is_some()
    }

    pub async fn output_target(&self) -> Option<String> {
        self.sink.lock().await.as_ref().map(|s| s.target())
    }

    pub async fn listeners(&self) -> usize {
        self.sink
            .lock()
            .await
            .as_ref()
            .map(|s| s.listeners())
            .unwrap_or(0)
    }

    pub async fn snapshot(&self) -> PlayerSnapshot {
        let playing = self.is_playing().await;
        let output_target = self.output_target().await;
        let current = {
            let current = lock(&self.current);
            current.as_ref().map(|item| match item.kind() {
                ItemKind::File(media) => media.pretty_name(),
                ItemKind::Stream { channel, .. } => channel.pretty_name(),
            })
        };
        let flags = lock(&self.flags);

        PlayerSnapshot {
            play_type: flags.play_type,
            status: flags.status,
            repeat: flags.repeat,
            playing,
            queue_len: self.queue.len(),
            output_target,
            current,
            recent: flags.recent.snapshot().iter().map(MediaFile::pretty_name).collect(),
            upcoming: flags.upcoming.snapshot().iter().map(MediaFile::pretty_name).collect(),
        }
    }

    fn set_status(&self, status: PlayerStatus) {
        lock(&self.flags).status = status;
    }

    // ========================================================================
    // Output sink
    // ========================================================================

    /// Establish or move the output sink
    ///
    /// Bounded by the connect timeout; timeouts and sink rejections surface
    /// as [`PlayerError::VoiceConnection`].
    pub async fn set_output(&self, target: &str) -> Result<(), PlayerError> {
        let mut guard = self.sink.lock().await;
        let bound = self.deps.timings.connect_timeout();

        match guard.clone() {
            Some(sink) if sink.is_active() => {
                if sink.target() != target {
                    timeout(bound, sink.move_to(target))
                        .await
                        .map_err(|_| {
                            PlayerError::VoiceConnection(format!("Timeout moving to {}", target))
                        })?
                        .map_err(|e| PlayerError::VoiceConnection(format!("Failed to move: {}", e)))?;
                    info!("Output moved to {}", target);
                }
            }
            _ => {
                let sink = timeout(bound, self.deps.connector.connect(target))
                    .await
                    .map_err(|_| {
                        PlayerError::VoiceConnection(format!("Timeout connecting to {}", target))
                    })?
                    .map_err(|e| PlayerError::VoiceConnection(format!("Failed to connect: {}", e)))?;
                *guard = Some(sink);
                info!("Output connected to {}", target);
            }
        }

        Ok(())
    }

    /// Detach the sink without disconnecting it (handed to a successor player)
    pub async fn take_output(&self) -> Option<Arc<dyn OutputSink>> {
        self.sink.lock().await.take()
    }

    /// Install a sink taken from a previous player, then bind it to `target`
    ///
    /// With no sink to adopt, a new one is connected.
    pub async fn adopt_output(
        &self,
        sink: Option<Arc<dyn OutputSink>>,
        target: &str,
    ) -> Result<(), PlayerError> {
        if let Some(sink) = sink {
            let mut guard = self.sink.lock().await;
            if guard.is_none() {
                *guard = Some(sink);
            }
        }
        self.set_output(target).await
    }

    // ========================================================================
    // Playback requests
    // ========================================================================

    /// Queue an archived file
    ///
    /// Rejected while a live stream is active. Returns false if the item was
    /// not accepted (no sink, conflicting play type, queue full or closed).
    pub async fn add_file(&self, media: MediaFile) -> bool {
        if !self.has_output().await {
            warn!("Discarding item: output sink not set");
            return false;
        }

        let claimed = {
            let mut flags = lock(&self.flags);
            match flags.play_type {
                Some(PlayType::Live) => {
                    warn!("Cannot add file, live stream is playing");
                    return false;
                }
                None => {
                    flags.play_type = Some(PlayType::File);
                    true
                }
                Some(_) => false,
            }
        };

        debug!("Adding file: {}", media.file_path());
        let guid = media.guid().to_string();
        lock(&self.flags).upcoming.push_back(media.clone());

        if self.enqueue(QueuedItem::file(media)).await {
            return true;
        }

        let idle = self.queue.is_empty() && !self.has_current();
        let mut flags = lock(&self.flags);
        flags.upcoming.pop_back_if(|m| m.guid() == guid);
        if claimed && idle && flags.play_type == Some(PlayType::File) {
            flags.play_type = None;
        }
        false
    }

    /// Request or queue a live stream
    ///
    /// Without a locator, claims Live, records the channel as pending and asks
    /// the stream-acquisition side to start it; nothing is enqueued. With a
    /// locator, the stream is enqueued when nothing else is active or when it
    /// fulfils the pending request for the same channel.
    pub async fn add_live_stream(&self, channel: &XmChannel, locator: Option<&str>) -> bool {
        if !self.has_output().await {
            warn!("Discarding live stream: output sink not set");
            return false;
        }

        match locator {
            None => {
                {
                    let mut flags = lock(&self.flags);
                    if let Some(active) = flags.play_type {
                        warn!("Cannot add live stream, already playing: {:?}", active);
                        return false;
                    }
                    flags.play_type = Some(PlayType::Live);
                    flags.pending_stream = Some(channel.id.clone());
                }

                debug!("Triggering live stream for channel {}", channel.id);
                let request = OutboundEvent::TriggerStream {
                    channel_id: channel.id.clone(),
                    transport: DEFAULT_STREAM_TRANSPORT.to_string(),
                };

                if !self.send_outbound(request) {
                    let mut flags = lock(&self.flags);
                    flags.play_type = None;
                    flags.pending_stream = None;
                    return false;
                }
                true
            }
            Some(locator) => {
                {
                    let mut flags = lock(&self.flags);
                    let accepted = match flags.play_type {
                        None => true,
                        Some(PlayType::Live) => {
                            flags.pending_stream.as_deref() == Some(channel.id.as_str())
                        }
                        Some(_) => false,
                    };
                    if !accepted {
                        warn!(
                            "Cannot add live stream for {}, already playing: {:?}",
                            channel.id, flags.play_type
                        );
                        return false;
                    }
                    flags.play_type = Some(PlayType::Live);
                    flags.pending_stream = None;
                }

                debug!("Adding live stream: {} at {}", channel.id, locator);
                self.enqueue(QueuedItem::stream(channel.clone(), locator)).await
            }
        }
    }

    /// Start a random playlist drawn from `channels`
    ///
    /// Pre-fills up to the configured number of songs. Returns false (and
    /// claims nothing) if no song could be queued.
    pub async fn add_playlist(
        &self,
        channels: &[XmChannel],
        repository: Arc<dyn SongRepository>,
    ) -> bool {
        if !self.has_output().await {
            warn!("Discarding playlist: output sink not set");
            return false;
        }

        {
            let mut flags = lock(&self.flags);
            if let Some(active) = flags.play_type {
                warn!("Cannot add playlist, already playing: {:?}", active);
                return false;
            }
            flags.play_type = Some(PlayType::Random);
            flags.playlist = Some(PlaylistSession {
                channels: channels.iter().map(|c| c.id.clone()).collect(),
                repository,
            });
        }

        debug!(
            "Adding playlist for channels: {:?}",
            channels.iter().map(|c| c.id.as_str()).collect::<Vec<_>>()
        );

        let mut added = 0;
        for _ in 0..self.deps.timings.playlist_prefill {
            if !self.add_random_song().await {
                break;
            }
            added += 1;
        }

        if added == 0 {
            warn!("Playlist has no playable songs");
            let mut flags = lock(&self.flags);
            flags.play_type = None;
            flags.playlist = None;
            return false;
        }
        true
    }

    /// Skip the current track
    ///
    /// With nothing queued behind it, a skip is a full stop.
    pub async fn skip(&self) -> bool {
        debug!("Skipping track");

        let sink = self.sink.lock().await.clone();
        let Some(sink) = sink else {
            return false;
        };

        if self.queue.is_empty() {
            self.stop(true, true).await;
        } else {
            sink.stop();
        }
        true
    }

    /// Stop playback and release everything held
    ///
    /// The sink is only disconnected when `disconnect` is set; a live stream
    /// is torn down upstream only when both flags are set.
    pub async fn stop(&self, disconnect: bool, kill_upstream: bool) {
        debug!(
            "Stopping player (disconnect={}, kill_upstream={})",
            disconnect, kill_upstream
        );
        self.set_status(PlayerStatus::Stopping);

        // Cleared first so a track ending mid-stop triggers no refill or repeat
        let play_type = {
            let mut flags = lock(&self.flags);
            flags.recent.clear();
            flags.upcoming.clear();
            // Dropping the session releases the repository handle
            flags.playlist = None;
            flags.pending_stream = None;
            flags.play_type.take()
        };

        let mut guard = self.sink.lock().await;

        if let Some(sink) = guard.as_ref() {
            if sink.is_playing() {
                sink.stop();
            }
        }

        for mut item in self.queue.drain() {
            item.release();
        }
        let current = lock(&self.current).take();
        if let Some(mut item) = current {
            item.release();
        }

        if disconnect {
            if let Some(sink) = guard.take() {
                match timeout(self.deps.timings.cleanup_timeout(), sink.disconnect(true)).await {
                    Ok(Ok(())) => debug!("Output sink disconnected"),
                    Ok(Err(e)) => error!("Error stopping output: {}", e),
                    Err(_) => warn!("Timeout disconnecting output sink"),
                }

                if play_type == Some(PlayType::Live) && kill_upstream {
                    self.send_outbound(OutboundEvent::KillStream);
                }
            }
        }
        drop(guard);

        self.set_status(PlayerStatus::Idle);
    }

    /// Full shutdown of the consumption loop
    ///
    /// Sets the shutdown flag, closes the queue, waits up to the cleanup
    /// timeout for the loop to exit and cancels it past the deadline. Items
    /// still queued and the current item are released.
    pub async fn cleanup(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_waiters();
        self.queue.close();

        let handle = lock(&self.task).take();
        if let Some(mut handle) = handle {
            if timeout(self.deps.timings.cleanup_timeout(), &mut handle)
                .await
                .is_err()
            {
                warn!("Player task did not stop in time, cancelling");
                handle.abort();
                if let Err(e) = handle.await {
                    if !e.is_cancelled() {
                        error!("Player task failed: {}", e);
                    }
                }
            }
        }

        for mut item in self.queue.drain() {
            item.release();
        }
        let current = lock(&self.current).take();
        if let Some(mut item) = current {
            item.release();
        }
        self.set_status(PlayerStatus::Idle);
        debug!("Audio player cleaned up");
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Enqueue with the bounded timeout; a rejected item is released here
    async fn enqueue(&self, item: QueuedItem) -> bool {
        match self.queue.put(item, self.deps.timings.enqueue_timeout()).await {
            Ok(()) => true,
            Err(rejected) => {
                let reason = rejected.reason();
                let mut item = rejected.into_item();
                warn!("Discarding {} ({})", item.describe(), reason);
                item.release();
                false
            }
        }
    }

    /// Best-effort send to the stream-acquisition side
    fn send_outbound(&self, event: OutboundEvent) -> bool {
        match self.deps.outbound.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send outbound event: {}", e);
                false
            }
        }
    }

    /// Queue one random song from the active playlist
    async fn add_random_song(&self) -> bool {
        let session = lock(&self.flags).playlist.clone();
        let Some(session) = session else {
            warn!("Playlist data missing");
            return false;
        };

        let pairs = match session.repository.distinct_title_artist(&session.channels).await {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!("Error adding random song: {}", e);
                return false;
            }
        };

        let Some((title, artist)) = pick_random(&pairs) else {
            warn!("No songs found in playlist channels");
            return false;
        };

        match session
            .repository
            .find_song(&session.channels, &title, &artist)
            .await
        {
            Ok(Some(song)) => self.add_file(song.into()).await,
            Ok(None) => false,
            Err(e) => {
                warn!("Error adding random song: {}", e);
                false
            }
        }
    }

    async fn wait_for_shutdown(&self) {
        loop {
            let notified = self.shutdown_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_shutting_down() {
                return;
            }
            notified.await;
        }
    }

    /// Consumption loop; exits only once shutdown is requested
    async fn run_loop(self: Arc<Self>) {
        debug!("Audio player loop started");

        while !self.is_shutting_down() {
            let outcome = AssertUnwindSafe(self.iteration()).catch_unwind().await;

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some("iteration panicked".to_string()),
            };

            if let Some(reason) = failure {
                error!("Error in audio player loop: {}", reason);
                self.set_status(PlayerStatus::Idle);
                tokio::select! {
                    _ = tokio::time::sleep(self.deps.timings.error_backoff()) => {}
                    _ = self.wait_for_shutdown() => {}
                }
            }
        }

        debug!("Audio player loop exited");
    }

    /// One dequeue-validate-play-wait cycle
    async fn iteration(&self) -> Result<(), PlayerError> {
        let Some(mut item) = self.queue.get(self.deps.timings.queue_poll()).await else {
            return Ok(());
        };

        debug!("Processing queued item: {:?}", item);

        if self.is_shutting_down() {
            item.release();
            return Ok(());
        }

        let sink = self.sink.lock().await.clone();
        let Some(sink) = sink else {
            warn!("Discarding item: no output sink");
            return Ok(());
        };

        // No suspension point from here until playback has started
        let play_type = self.play_type();
        let valid = matches!(
            (play_type, item.kind()),
            (Some(PlayType::Live), ItemKind::Stream { .. })
                | (Some(PlayType::File | PlayType::Random), ItemKind::File(_))
        );
        if !valid {
            warn!(
                "Discarding {}: not playable while play type is {:?}",
                item.describe(),
                play_type
            );
            return Ok(());
        }

        self.set_status(PlayerStatus::Loading);

        if let ItemKind::File(media) = item.kind() {
            let mut flags = lock(&self.flags);
            flags.upcoming.pop_front_if(|m| m == media);
            flags.recent.push_front(media.clone());
        }

        let source = match self.deps.sources.open(&item.source_spec()) {
            Ok(source) => source,
            Err(e) => {
                warn!("Discarding {}: {}", item.describe(), e);
                self.set_status(PlayerStatus::Idle);
                return Ok(());
            }
        };
        item.attach_source(source.clone());

        let description = match item.kind() {
            ItemKind::File(media) => media.pretty_name(),
            ItemKind::Stream { channel, .. } => format!("SXM {}", channel.pretty_name()),
        };
        let log_item = item.describe();
        let finished = item.media().cloned();

        *lock(&self.current) = Some(item);
        let _release = CurrentRelease { player: self };

        let (done, waiter) = PlaybackCompletion::new();
        sink.play(source, done)
            .map_err(|e| PlayerError::Playback(format!("{}: {}", log_item, e)))?;

        self.set_status(PlayerStatus::Playing);
        info!("Playing: {}", log_item);
        let _ = self.deps.events.send(BotEvent::TrackStarted {
            description,
            timestamp: Utc::now(),
        });

        tokio::select! {
            outcome = waiter => {
                if let Ok(Some(e)) = outcome {
                    error!("Track playback error: {}", e);
                }
                debug!("Track ended");
            }
            _ = self.wait_for_shutdown() => {
                sink.stop();
                return Ok(());
            }
        }

        self.set_status(PlayerStatus::Loading);
        self.after_track(finished).await;
        self.set_status(PlayerStatus::Idle);
        Ok(())
    }

    /// Post-track policy: playlist refill or file repeat
    async fn after_track(&self, finished: Option<MediaFile>) {
        if self.is_shutting_down() {
            return;
        }

        let (play_type, repeat) = {
            let flags = lock(&self.flags);
            (flags.play_type, flags.repeat)
        };

        match play_type {
            Some(PlayType::Random) if self.queue.len() < self.deps.timings.refill_threshold => {
                self.add_random_song().await;
            }
            Some(PlayType::File) if repeat => {
                if let Some(media) = finished {
                    if !self.add_file(media).await {
                        warn!("Error re-adding song for repeat");
                    }
                }
            }
            _ => {}
        }
    }
}

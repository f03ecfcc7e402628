//! Status reconciler
//!
//! Periodic loop translating events from the stream-acquisition side into
//! player state transitions:
//! - connectivity changes (announce, stop live playback on loss, resume the
//!   pending live channel on recovery)
//! - channel catalog and live metadata updates
//! - "stream ready" notifications, which turn a pending live request into an
//!   enqueued stream
//!
//! Each tick drains at most one event per inbound queue. Presence is
//! refreshed from the same tick, but only once the refresh interval has
//! elapsed. A second, slower loop disconnects the output after a long period
//! without listeners.

pub mod presence;
pub mod state;

pub use state::{PendingLive, PlayerState};

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use sxm_common::events::InboundEvent;
use sxm_common::XmChannel;
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::ReconcilerTimings;
use crate::player::{lock, PlayType, PlayerSlot};
use crate::state::BotOutput;

/// Capacity of each inbound queue
const INBOUND_CAPACITY: usize = 100;

/// Grace period for the background loops to exit before they are aborted
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Producer handle for the reconciler's inbound queues
///
/// Stream-ready notifications go to their own queue; all other events share
/// the status queue.
#[derive(Clone)]
pub struct InboundSender {
    status: mpsc::Sender<InboundEvent>,
    stream: mpsc::Sender<InboundEvent>,
}

impl InboundSender {
    /// Non-blocking send; a full or closed queue is a logged soft failure
    pub fn send(&self, event: InboundEvent) -> bool {
        let queue = match event {
            InboundEvent::StreamStarted { .. } => &self.stream,
            _ => &self.status,
        };

        match queue.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping inbound event: {}", e);
                false
            }
        }
    }
}

pub struct StatusReconciler {
    timings: ReconcilerTimings,
    slot: Arc<PlayerSlot>,
    output: Arc<dyn BotOutput>,
    state: RwLock<PlayerState>,
    status_rx: Mutex<mpsc::Receiver<InboundEvent>>,
    stream_rx: Mutex<mpsc::Receiver<InboundEvent>>,
    last_presence: std::sync::Mutex<Option<Instant>>,
    last_voice_activity: std::sync::Mutex<Instant>,
    shutdown: AtomicBool,
    shutdown_notify: Notify,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl StatusReconciler {
    pub fn new(
        timings: ReconcilerTimings,
        slot: Arc<PlayerSlot>,
        output: Arc<dyn BotOutput>,
        initial: PlayerState,
    ) -> (Self, InboundSender) {
        let (status_tx, status_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (stream_tx, stream_rx) = mpsc::channel(INBOUND_CAPACITY);

        let reconciler = Self {
            timings,
            slot,
            output,
            state: RwLock::new(initial),
            status_rx: Mutex::new(status_rx),
            stream_rx: Mutex::new(stream_rx),
            last_presence: std::sync::Mutex::new(None),
            last_voice_activity: std::sync::Mutex::new(Instant::now()),
            shutdown: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
            tasks: std::sync::Mutex::new(Vec::new()),
        };

        let sender = InboundSender {
            status: status_tx,
            stream: stream_tx,
        };
        (reconciler, sender)
    }

    pub fn slot(&self) -> &Arc<PlayerSlot> {
        &self.slot
    }

    /// Clone of the current state
    pub async fn snapshot(&self) -> PlayerState {
        self.state.read().await.clone()
    }

    pub async fn sxm_running(&self) -> bool {
        self.state.read().await.sxm_running
    }

    pub async fn pending(&self) -> Option<PendingLive> {
        self.state.read().await.pending.clone()
    }

    /// Record the live channel to resume after an upstream outage
    pub async fn remember_live(&self, channel: XmChannel, target: String) {
        debug!("Remembering live channel {} on {}", channel.id, target);
        self.state.write().await.pending = Some(PendingLive { channel, target });
    }

    pub async fn forget_live(&self) {
        self.state.write().await.pending = None;
    }

    /// Someone joined the output target
    pub fn note_voice_activity(&self) {
        *lock(&self.last_voice_activity) = Instant::now();
    }

    /// Startup notices
    pub async fn announce_ready(&self, root_command: &str) {
        self.output
            .announce(&format!("Accepting `/{}` commands", root_command))
            .await;

        let state = self.state.read().await;
        if state.sxm_running {
            let count = state.channels.len();
            drop(state);
            self.running_message(count).await;
        }
    }

    async fn running_message(&self, channel_count: usize) {
        self.output
            .announce(&format!(
                "SXM now available for streaming. {} channels available",
                channel_count
            ))
            .await;
    }

    // ========================================================================
    // Event processing
    // ========================================================================

    /// One reconciliation pass
    pub async fn tick(&self) {
        let was_connected = self.state.read().await.sxm_running;

        let status = self.status_rx.lock().await.try_recv().ok();
        if let Some(event) = status {
            self.handle_event(event).await;
        }
        let stream = self.stream_rx.lock().await.try_recv().ok();
        if let Some(event) = stream {
            self.handle_event(event).await;
        }

        let (connected, pending, channel_count) = {
            let state = self.state.read().await;
            (state.sxm_running, state.pending.clone(), state.channels.len())
        };

        if connected && !was_connected {
            self.running_message(channel_count).await;
            if let Some(pending) = pending {
                self.output
                    .announce(&format!(
                        "Automatically resuming previous channel: `{}`",
                        pending.channel.id
                    ))
                    .await;
                self.resume_live(&pending).await;
            }
        } else if !connected && was_connected {
            self.output
                .announce("Connection to SXM was lost. Will automatically reconnect")
                .await;

            let player = self.slot.get();
            if player.play_type() == Some(PlayType::Live) && player.is_playing().await {
                player.stop(false, true).await;
            }
        }

        self.refresh_presence_if_due().await;
    }

    /// Apply a single inbound event
    pub async fn handle_event(&self, event: InboundEvent) {
        debug!("Received event: {}", event.name());

        match event {
            InboundEvent::SxmStatus { running } => {
                self.state.write().await.sxm_running = running;
            }
            InboundEvent::StreamStarted { channel_id, locator } => {
                let channel = self.state.read().await.get_channel(&channel_id).cloned();
                match channel {
                    Some(channel) => {
                        let player = self.slot.get();
                        if !player.add_live_stream(&channel, Some(&locator)).await {
                            warn!("Stream for {} was not accepted", channel_id);
                        }
                    }
                    None => warn!("Stream started for unknown channel: {}", channel_id),
                }
            }
            InboundEvent::UpdateChannels { channels } => {
                debug!("Channel catalog updated: {} channels", channels.len());
                self.state.write().await.update_channels(channels);
            }
            InboundEvent::UpdateLive { snapshot } => {
                self.state.write().await.set_live(snapshot);
            }
        }
    }

    /// Replay the live start sequence on a fresh player
    ///
    /// Stops the current player without tearing down upstream, replaces it,
    /// waits for the settle delay, rebinds the previous output and requests
    /// the channel again.
    pub async fn resume_live(&self, pending: &PendingLive) -> bool {
        info!("Resuming live channel {}", pending.channel.id);

        let old = self.slot.get();
        old.stop(false, false).await;
        old.cleanup().await;
        let sink = old.take_output().await;

        let player = self.slot.recreate();
        tokio::time::sleep(self.timings.settle_delay()).await;

        if let Err(e) = player.adopt_output(sink, &pending.target).await {
            error!("Failed to rebind output for {}: {}", pending.channel.id, e);
            return false;
        }

        if !player.add_live_stream(&pending.channel, None).await {
            warn!("Failed to request live channel {}", pending.channel.id);
            return false;
        }
        true
    }

    async fn refresh_presence_if_due(&self) {
        let last = *lock(&self.last_presence);
        let due = last
            .map(|last| last.elapsed() >= self.timings.presence_interval())
            .unwrap_or(true);

        if due {
            self.update_presence().await;
            *lock(&self.last_presence) = Some(Instant::now());
        }
    }

    /// Recompute and publish the presence descriptor
    pub async fn update_presence(&self) {
        let player = self.slot.get();

        let descriptor = match player.play_type() {
            Some(PlayType::Live) => {
                let state = self.state.read().await;
                match (state.stream_xm_channel(), state.live.as_ref()) {
                    (Some(channel), Some(live)) => {
                        Some(presence::live_presence(channel, live, state.start_time()))
                    }
                    _ => return,
                }
            }
            Some(PlayType::File | PlayType::Random) => match player.current() {
                Some(media) => Some(presence::song_presence(&media)),
                None => return,
            },
            None => None,
        };

        self.output.set_presence(descriptor).await;
    }

    /// Disconnect when nobody has been listening for the idle timeout
    ///
    /// Returns true if playback was stopped.
    pub async fn check_idle_voice(&self) -> bool {
        let player = self.slot.get();
        if !player.is_playing().await || player.listeners().await > 0 {
            return false;
        }

        let idle_for = lock(&self.last_voice_activity).elapsed();
        if idle_for <= self.timings.idle_timeout() {
            return false;
        }

        info!("Voice timeout - disconnecting");
        self.forget_live().await;
        player.stop(true, true).await;
        self.output.announce("Disconnected due to inactivity").await;
        true
    }

    // ========================================================================
    // Background loops
    // ========================================================================

    /// Spawn the tick loop and the idle-voice loop
    pub fn start(self: &Arc<Self>) {
        let mut tasks = lock(&self.tasks);
        if !tasks.is_empty() {
            return;
        }

        let reconciler = self.clone();
        tasks.push(tokio::spawn(async move { reconciler.run_ticks().await }));

        let reconciler = self.clone();
        tasks.push(tokio::spawn(async move { reconciler.run_idle_checks().await }));

        debug!("Status reconciler started");
    }

    /// Stop both loops (bounded wait, then abort)
    pub async fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_waiters();

        let tasks: Vec<_> = lock(&self.tasks).drain(..).collect();
        for mut task in tasks {
            if tokio::time::timeout(TASK_STOP_TIMEOUT, &mut task).await.is_err() {
                warn!("Reconciler task did not stop in time, cancelling");
                task.abort();
            }
        }
        debug!("Status reconciler stopped");
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
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

    async fn run_ticks(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.timings.tick());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.wait_for_shutdown() => break,
            }

            if AssertUnwindSafe(self.tick()).catch_unwind().await.is_err() {
                error!("Error in event loop");
            }
        }
        debug!("Reconciler tick loop exited");
    }

    async fn run_idle_checks(self: Arc<Self>) {
        let period = self.timings.idle_check();
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.wait_for_shutdown() => break,
            }
            self.check_idle_voice().await;
        }
    }
}

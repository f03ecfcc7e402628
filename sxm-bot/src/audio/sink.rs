//! Output sink abstraction
//!
//! The sink is the single audio output connection. `play` hands playback to
//! the sink's own execution context; the end of playback is reported back
//! through a [`PlaybackCompletion`], which may be fired from any thread.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::audio::source::AudioSource;
use crate::error::SinkError;

/// One-shot, thread-safe end-of-playback signal
///
/// Dropping it without calling [`complete`](Self::complete) also wakes the
/// waiter, so a sink that dies mid-track cannot strand the consumption loop.
#[derive(Debug)]
pub struct PlaybackCompletion {
    tx: oneshot::Sender<Option<String>>,
}

/// Receiving half of a [`PlaybackCompletion`]
pub type CompletionWaiter = oneshot::Receiver<Option<String>>;

impl PlaybackCompletion {
    pub fn new() -> (Self, CompletionWaiter) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Signal that playback ended, optionally with an error description
    pub fn complete(self, error: Option<String>) {
        // Waiter may already be gone (player shut down)
        let _ = self.tx.send(error);
    }
}

/// Establishes output sinks
#[async_trait]
pub trait OutputConnector: Send + Sync {
    async fn connect(&self, target: &str) -> Result<Arc<dyn OutputSink>, SinkError>;
}

/// The active audio output connection
///
/// Timeouts are applied by the caller; implementations need not bound their
/// own operations.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Target the sink is currently bound to
    fn target(&self) -> String;

    async fn move_to(&self, target: &str) -> Result<(), SinkError>;

    async fn disconnect(&self, force: bool) -> Result<(), SinkError>;

    fn is_active(&self) -> bool;

    fn is_playing(&self) -> bool;

    /// Number of listeners currently attached to the target
    fn listeners(&self) -> usize;

    /// Start playing `source`; `done` fires when playback ends for any reason
    fn play(&self, source: Arc<dyn AudioSource>, done: PlaybackCompletion) -> Result<(), SinkError>;

    /// Halt current playback (completion still fires)
    fn stop(&self);
}

//! Player slot
//!
//! Owns the current [`AudioPlayer`] and the dependencies to build a fresh one.
//! Callers clone the `Arc` they get from [`PlayerSlot::get`]; after a
//! recreation, the old instance keeps working until its holder drops it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::info;

use super::engine::{AudioPlayer, PlayerDeps};

pub struct PlayerSlot {
    deps: PlayerDeps,
    current: RwLock<Arc<AudioPlayer>>,
    generation: AtomicU64,
}

impl PlayerSlot {
    /// Build and start the first player (must run inside the tokio runtime)
    pub fn new(deps: PlayerDeps) -> Self {
        let player = Arc::new(AudioPlayer::new(deps.clone()));
        player.start();

        Self {
            deps,
            current: RwLock::new(player),
            generation: AtomicU64::new(0),
        }
    }

    pub fn deps(&self) -> &PlayerDeps {
        &self.deps
    }

    /// The current player
    pub fn get(&self) -> Arc<AudioPlayer> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the current player with a freshly started one
    ///
    /// The previous player is not touched; callers stop and clean it up first.
    pub fn recreate(&self) -> Arc<AudioPlayer> {
        let player = Arc::new(AudioPlayer::new(self.deps.clone()));
        player.start();

        match self.current.write() {
            Ok(mut guard) => *guard = player.clone(),
            Err(poisoned) => *poisoned.into_inner() = player.clone(),
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Audio player recreated (generation {})", generation);
        player
    }

    /// Number of recreations so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Shut down the current player for good
    pub async fn shutdown(&self) {
        let player = self.get();
        player.cleanup().await;
        player.stop(true, true).await;
    }
}

//! Audio playback
//!
//! **Components:**
//! - [`AudioPlayer`]: playback state machine, public operations and the
//!   background consumption loop
//! - [`PlaybackQueue`]: bounded FIFO feeding the loop
//! - [`BoundedHistory`]: recent/upcoming ring buffers
//! - [`PlayerSlot`]: owner of the current player instance, able to recreate it

pub mod engine;
pub mod history;
pub mod item;
pub mod queue;
pub mod slot;

pub use engine::{AudioPlayer, PlayType, PlayerDeps, PlayerSnapshot, PlayerStatus};
pub use history::BoundedHistory;
pub use item::{ItemKind, QueuedItem};
pub use queue::{PlaybackQueue, Rejected};
pub use slot::PlayerSlot;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a std mutex, recovering the data if a panicking holder poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

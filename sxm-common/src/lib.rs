//! # SXM Common Library
//!
//! Shared code for the SXM bot crates including:
//! - Domain models (songs, episodes, channels, live snapshots)
//! - Event types exchanged with the stream-acquisition side
//! - Song repository (SQLite)
//! - Configuration file discovery
//! - Relative time formatting

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod human_time;
pub mod models;

pub use error::{Error, Result};
pub use models::{Episode, LiveCut, LiveEpisode, LiveSnapshot, MediaFile, Song, XmChannel};

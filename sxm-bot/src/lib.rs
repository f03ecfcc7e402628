//! # sxm-bot
//!
//! Playback engine for an SXM radio chat bot:
//! - [`player`]: single-sink playback queue and state machine
//! - [`carousel`]: TTL-bounded paginated result sessions
//! - [`reconciler`]: translation of upstream status events into player transitions
//! - [`commands`]: chat command groups over a shared playback capability
//! - [`api`]: HTTP control surface and SSE event stream
//! - [`audio`]: ffmpeg sources and file-backed output sinks

pub mod api;
pub mod audio;
pub mod carousel;
pub mod commands;
pub mod config;
pub mod error;
pub mod player;
pub mod reconciler;
pub mod state;

pub use error::{Error, Result};

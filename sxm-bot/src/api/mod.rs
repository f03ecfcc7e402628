//! HTTP control surface
//!
//! Stands in for the chat client: commands and carousel navigation come in
//! over HTTP, bot output (announcements, presence, track changes) goes out
//! over SSE.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{create_router, run, AppContext};

//! Queued playback items
//!
//! A [`QueuedItem`] owns at most one native audio source. The source is
//! released exactly once: by an explicit [`QueuedItem::release`] on the
//! normal exit paths, or by `Drop` if the item is discarded any other way.

use std::sync::Arc;

use sxm_common::{MediaFile, XmChannel};
use tokio::time::Instant;

use crate::audio::{AudioSource, SourceSpec};

/// What a queued item plays
#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    /// Archived song or episode
    File(MediaFile),

    /// Live channel at a resolved stream locator
    Stream { channel: XmChannel, locator: String },
}

/// A unit of playable work
pub struct QueuedItem {
    kind: ItemKind,
    source: Option<Arc<dyn AudioSource>>,
    created_at: Instant,
}

impl QueuedItem {
    pub fn file(media: MediaFile) -> Self {
        Self::new(ItemKind::File(media))
    }

    pub fn stream(channel: XmChannel, locator: impl Into<String>) -> Self {
        Self::new(ItemKind::Stream {
            channel,
            locator: locator.into(),
        })
    }

    fn new(kind: ItemKind) -> Self {
        Self {
            kind,
            source: None,
            created_at: Instant::now(),
        }
    }

    pub fn kind(&self) -> &ItemKind {
        &self.kind
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Media reference for file items
    pub fn media(&self) -> Option<&MediaFile> {
        match &self.kind {
            ItemKind::File(media) => Some(media),
            ItemKind::Stream { .. } => None,
        }
    }

    /// Channel for stream items
    pub fn channel(&self) -> Option<&XmChannel> {
        match &self.kind {
            ItemKind::File(_) => None,
            ItemKind::Stream { channel, .. } => Some(channel),
        }
    }

    /// Source options for materializing this item
    pub fn source_spec(&self) -> SourceSpec {
        match &self.kind {
            ItemKind::File(media) => SourceSpec::file(media.file_path()),
            ItemKind::Stream { locator, .. } => SourceSpec::live(locator),
        }
    }

    /// Short description for logs
    pub fn describe(&self) -> String {
        match &self.kind {
            ItemKind::File(media) => media.file_path().to_string(),
            ItemKind::Stream { channel, .. } => channel.id.clone(),
        }
    }

    /// Attach the materialized native source
    ///
    /// A previously attached source is released first.
    pub fn attach_source(&mut self, source: Arc<dyn AudioSource>) {
        self.release();
        self.source = Some(source);
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Release the native source; later calls are no-ops
    pub fn release(&mut self) {
        if let Some(source) = self.source.take() {
            source.release();
        }
    }
}

impl Drop for QueuedItem {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for QueuedItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedItem")
            .field("kind", &self.kind)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

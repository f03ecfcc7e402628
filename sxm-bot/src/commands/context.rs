//! Playback capability shared by every command group

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sxm_common::db::SongRepository;
use sxm_common::{MediaFile, XmChannel};
use tracing::{info, warn};
use uuid::Uuid;

use super::{Caller, CarouselReply, Reply};
use crate::carousel::{CarouselRegistry, CarouselSession};
use crate::player::{AudioPlayer, PlayType};
use crate::reconciler::{PlayerState, StatusReconciler};

/// What command groups may do to the player and its surroundings
#[async_trait]
pub trait Playback: Send + Sync {
    /// Configured command root (e.g. "music")
    fn root_command(&self) -> &str;

    /// The current player instance
    fn player(&self) -> Arc<AudioPlayer>;

    /// Replace the player with a fresh instance
    fn recreate_player(&self) -> Arc<AudioPlayer>;

    /// Snapshot of upstream state
    async fn player_state(&self) -> PlayerState;

    fn repository(&self) -> Option<Arc<dyn SongRepository>>;

    /// Bind the output to the caller's voice channel
    ///
    /// Err holds the reply to send back instead.
    async fn summon(&self, caller: &Caller) -> Result<String, Reply>;

    /// Make the player ready for a new request of `play_type`
    ///
    /// Conflicting playback is stopped (output kept) followed by the switch
    /// delay; an idle player is summoned to the caller.
    async fn prepare(&self, caller: &Caller, play_type: PlayType) -> Result<(), Reply>;

    /// Queue an archived file, preparing the player first
    async fn play_file(&self, caller: &Caller, media: MediaFile) -> Reply;

    async fn remember_live(&self, channel: XmChannel, target: String);

    async fn forget_live(&self);

    /// Render `session`; multi-item sessions are registered for navigation
    fn show_carousel(&self, session: CarouselSession) -> Reply;
}

/// Production [`Playback`] implementation
pub struct BotContext {
    root_command: String,
    reconciler: Arc<StatusReconciler>,
    repository: Option<Arc<dyn SongRepository>>,
    carousels: Arc<CarouselRegistry>,
    switch_delay: Duration,
}

impl BotContext {
    pub fn new(
        root_command: impl Into<String>,
        reconciler: Arc<StatusReconciler>,
        repository: Option<Arc<dyn SongRepository>>,
        carousels: Arc<CarouselRegistry>,
        switch_delay: Duration,
    ) -> Self {
        Self {
            root_command: root_command.into(),
            reconciler,
            repository,
            carousels,
            switch_delay,
        }
    }

    pub fn carousels(&self) -> &Arc<CarouselRegistry> {
        &self.carousels
    }

    pub fn reconciler(&self) -> &Arc<StatusReconciler> {
        &self.reconciler
    }
}

#[async_trait]
impl Playback for BotContext {
    fn root_command(&self) -> &str {
        &self.root_command
    }

    fn player(&self) -> Arc<AudioPlayer> {
        self.reconciler.slot().get()
    }

    fn recreate_player(&self) -> Arc<AudioPlayer> {
        self.reconciler.slot().recreate()
    }

    async fn player_state(&self) -> PlayerState {
        self.reconciler.snapshot().await
    }

    fn repository(&self) -> Option<Arc<dyn SongRepository>> {
        self.repository.clone()
    }

    async fn summon(&self, caller: &Caller) -> Result<String, Reply> {
        let Some(target) = caller.voice_channel.clone() else {
            return Err(Reply::ephemeral("You must be in a voice channel."));
        };

        if let Err(e) = self.player().set_output(&target).await {
            warn!("Failed to join {}: {}", target, e);
            return Err(Reply::ephemeral(format!("Could not join {}.", target)));
        }

        self.reconciler.note_voice_activity();
        Ok(target)
    }

    async fn prepare(&self, caller: &Caller, play_type: PlayType) -> Result<(), Reply> {
        let player = self.player();

        let busy = player.is_playing().await || player.play_type().is_some();
        if !busy {
            return self.summon(caller).await.map(|_| ());
        }

        // Files join an active file queue; everything else replaces playback
        let joins_queue = play_type == PlayType::File && player.play_type() == Some(PlayType::File);
        if !joins_queue {
            self.forget_live().await;
            player.stop(false, true).await;
            tokio::time::sleep(self.switch_delay).await;
        }

        // A stopped player may have lost its output
        if !player.has_output().await {
            self.summon(caller).await?;
        }
        Ok(())
    }

    async fn play_file(&self, caller: &Caller, media: MediaFile) -> Reply {
        if let Err(reply) = self.prepare(caller, PlayType::File).await {
            return reply;
        }

        info!("Playing: {}", media.file_path());
        let bold = media.bold_name();
        if self.player().add_file(media).await {
            Reply::public(format!("Added {} to now playing queue", bold))
        } else {
            Reply::public("Failed to add to queue")
        }
    }

    async fn remember_live(&self, channel: XmChannel, target: String) {
        self.reconciler.remember_live(channel, target).await;
    }

    async fn forget_live(&self) {
        self.reconciler.forget_live().await;
    }

    fn show_carousel(&self, session: CarouselSession) -> Reply {
        let view = session.view(Utc::now());
        let content = view.body.clone();

        let id = if session.len() > 1 {
            let id = Uuid::new_v4().to_string();
            let mut session = session;
            session.set_message_id(id.clone());
            self.carousels.add(id.clone(), session);
            Some(id)
        } else {
            None
        };

        Reply {
            content,
            carousel: Some(CarouselReply { id, view }),
            ..Default::default()
        }
    }
}

//! General playback commands

use std::sync::Arc;

use async_trait::async_trait;

use super::{CommandGroup, CommandRequest, Playback, Reply};
use crate::carousel::{CarouselItem, CarouselKind, CarouselSession};
use crate::player::PlayType;

/// Default and bounds for `recent count`
const RECENT_DEFAULT: i64 = 3;
const RECENT_MAX: i64 = 10;

pub struct CoreCommands {
    playback: Arc<dyn Playback>,
}

impl CoreCommands {
    pub fn new(playback: Arc<dyn Playback>) -> Self {
        Self { playback }
    }

    async fn playing(&self) -> Reply {
        let player = self.playback.player();
        if !player.is_playing().await {
            return Reply::public("Nothing is currently playing.");
        }

        let target = player
            .output_target()
            .await
            .unwrap_or_else(|| "Unknown".to_string());

        if player.play_type() == Some(PlayType::Live) {
            let state = self.playback.player_state().await;
            let Some(channel) = state.stream_xm_channel() else {
                return Reply::public("Live stream information unavailable.");
            };

            let mut content = format!("Currently playing **{}** on {}", channel.pretty_name(), target);
            if let Some(cut) = state
                .live
                .as_ref()
                .and_then(|live| live.latest_cut(state.radio_time()))
            {
                content.push_str(&format!("\nNow playing: **\"{}\"** by **{}**", cut.title, cut.artist));
            }
            return Reply::public(content);
        }

        match player.current() {
            Some(media) => Reply::public(format!(
                "Currently playing {} on {}",
                media.bold_name(),
                target
            )),
            None => Reply::public("Unable to determine what's playing."),
        }
    }

    async fn recent(&self, request: &CommandRequest) -> Reply {
        let count: i64 = match request.arg_i64("count") {
            None => RECENT_DEFAULT,
            Some(Ok(n)) if (1..=RECENT_MAX).contains(&n) => n,
            Some(_) => {
                return Reply::ephemeral(format!("Count must be between 1 and {}.", RECENT_MAX))
            }
        };
        let count = count as usize;

        let player = self.playback.player();
        if !player.is_playing().await {
            return Reply::public("Nothing is currently playing.");
        }

        if player.play_type() == Some(PlayType::Live) {
            let state = self.playback.player_state().await;
            let Some(channel) = state.stream_xm_channel().cloned() else {
                return Reply::public("No channel information available.");
            };

            let (cuts, latest) = state.recent_cuts(count);
            if cuts.is_empty() {
                return Reply::public("No recent songs played.");
            }

            let body = if cuts.len() == 1 {
                format!("Most recent song for **{}**:", channel.pretty_name())
            } else {
                format!("{} most recent songs for **{}**:", cuts.len(), channel.pretty_name())
            };

            let kind = CarouselKind::LiveCuts {
                channel,
                latest,
                radio_time: state.radio_time(),
            };
            let items = cuts.into_iter().map(CarouselItem::Cut).collect();
            return match CarouselSession::new(body, kind, items) {
                Some(session) => self.playback.show_carousel(session),
                None => Reply::public("No recent songs played."),
            };
        }

        let items: Vec<CarouselItem> = player
            .recent()
            .into_iter()
            .take(count)
            .map(CarouselItem::Archived)
            .collect();

        match CarouselSession::new("Recent songs/shows", CarouselKind::ArchivedSongs, items) {
            Some(session) => self.playback.show_carousel(session),
            None => Reply::public("No recent songs."),
        }
    }

    async fn stop(&self) -> Reply {
        self.playback.forget_live().await;
        self.playback.player().stop(true, true).await;
        Reply::public("Stopped playing music.")
    }

    async fn summon(&self, request: &CommandRequest) -> Reply {
        match self.playback.summon(&request.caller).await {
            Ok(target) => Reply::public(format!("Joined {}", target)),
            Err(reply) => reply,
        }
    }

    async fn reset(&self, request: &CommandRequest) -> Reply {
        if request.caller.voice_channel.is_none() {
            return Reply::ephemeral("You must be in a voice channel.");
        }

        self.playback.forget_live().await;
        let old = self.playback.player();
        old.stop(true, true).await;
        old.cleanup().await;
        self.playback.recreate_player();

        match self.playback.summon(&request.caller).await {
            Ok(_) => Reply::public("Bot reset successfully."),
            Err(reply) => reply,
        }
    }

    async fn repeat(&self, request: &CommandRequest) -> Reply {
        let player = self.playback.player();
        if !player.is_playing().await {
            return Reply::public("Nothing is currently playing.");
        }

        let enabled = match request.arg_bool("enabled") {
            None => {
                let status = if player.repeat() { "on" } else { "off" };
                return Reply::public(format!("Repeat is currently {}.", status));
            }
            Some(Ok(enabled)) => enabled,
            Some(Err(raw)) => return Reply::ephemeral(format!("Invalid value for repeat: `{}`", raw)),
        };

        match player.play_type() {
            Some(PlayType::Live) => Reply::public("Cannot change repeat while playing live SXM."),
            Some(PlayType::Random) => {
                Reply::public("Cannot change repeat while playing random playlist.")
            }
            _ => {
                player.set_repeat(enabled);
                let status = if enabled { "on" } else { "off" };
                Reply::public(format!("Set repeat to {}.", status))
            }
        }
    }
}

#[async_trait]
impl CommandGroup for CoreCommands {
    fn names(&self) -> &'static [&'static str] {
        &["playing", "recent", "stop", "summon", "reset", "repeat"]
    }

    async fn dispatch(&self, request: &CommandRequest) -> Option<Reply> {
        let reply = match request.name.as_str() {
            "playing" => self.playing().await,
            "recent" => self.recent(request).await,
            "stop" => self.stop().await,
            "summon" => self.summon(request).await,
            "reset" => self.reset(request).await,
            "repeat" => self.repeat(request).await,
            _ => return None,
        };
        Some(reply)
    }
}

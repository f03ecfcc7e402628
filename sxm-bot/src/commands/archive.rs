//! Archived-content commands
//!
//! Only registered when an archive folder is configured.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};

use super::{missing_arg, CommandGroup, CommandRequest, Playback, Reply};
use crate::carousel::{CarouselItem, CarouselKind, CarouselSession};
use crate::player::PlayType;

/// Minimum distinct songs a playlist needs unless the caller overrides it
const PLAYLIST_THRESHOLD: i64 = 40;

const SEARCH_LIMIT: i64 = 10;

/// Channel names listed in a playlist confirmation before "+N more"
const PLAYLIST_NAMES_SHOWN: usize = 3;

pub struct ArchiveCommands {
    playback: Arc<dyn Playback>,
}

impl ArchiveCommands {
    pub fn new(playback: Arc<dyn Playback>) -> Self {
        Self { playback }
    }

    async fn skip(&self) -> Reply {
        let player = self.playback.player();
        if !player.is_playing().await {
            return Reply::public("Nothing is playing.");
        }
        if player.play_type() == Some(PlayType::Live) {
            return Reply::public("Cannot skip live SXM radio.");
        }

        player.skip().await;
        Reply::public("Song skipped.")
    }

    async fn upcoming(&self) -> Reply {
        let player = self.playback.player();
        if !player.is_playing().await {
            return Reply::public("Nothing is playing.");
        }
        if player.play_type() == Some(PlayType::Live) {
            return Reply::public("Live radio playing - no queue.");
        }

        let items: Vec<CarouselItem> = player
            .upcoming()
            .into_iter()
            .map(CarouselItem::Archived)
            .collect();
        let kind = CarouselKind::Upcoming {
            latest: player.current(),
        };

        match CarouselSession::new("Upcoming songs/shows:", kind, items) {
            Some(session) => self.playback.show_carousel(session),
            None => Reply::public("Queue is empty."),
        }
    }

    async fn playlist(&self, request: &CommandRequest) -> Reply {
        let Some(input) = request.arg_str("channels") else {
            return missing_arg("channels");
        };
        let threshold = match request.arg_i64("threshold") {
            None => PLAYLIST_THRESHOLD,
            Some(Ok(n)) if n >= 0 => n,
            Some(_) => return Reply::ephemeral("Threshold must be a non-negative number."),
        };

        if request.caller.voice_channel.is_none() {
            return Reply::ephemeral("You must be in a voice channel to use this command.");
        }

        let channels = self.playback.player_state().await.parse_channels(&input);
        if channels.is_empty() {
            return Reply::ephemeral(format!("No valid channels found in: `{}`", input));
        }

        let Some(repository) = self.playback.repository() else {
            return Reply::ephemeral("No database connection available.");
        };

        let ids: Vec<String> = channels.iter().map(|c| c.id.clone()).collect();
        let unique_songs = match repository.count_distinct(&ids).await {
            Ok(count) => count,
            Err(e) => {
                error!("Error counting archived songs: {}", e);
                return Reply::public("Failed to create playlist.");
            }
        };
        if unique_songs < threshold {
            return Reply::ephemeral(format!(
                "Not enough archived songs ({} < {}).",
                unique_songs, threshold
            ));
        }

        if let Err(reply) = self.playback.prepare(&request.caller, PlayType::Random).await {
            return reply;
        }

        let player = self.playback.player();
        if !player.add_playlist(&channels, repository).await {
            error!("Error creating playlist for {:?}", ids);
            player.stop(true, true).await;
            return Reply::public("Failed to create playlist.");
        }

        let mut names = channels
            .iter()
            .take(PLAYLIST_NAMES_SHOWN)
            .map(|c| c.pretty_name())
            .collect::<Vec<_>>()
            .join(", ");
        if channels.len() > PLAYLIST_NAMES_SHOWN {
            names.push_str(&format!(" (+{} more)", channels.len() - PLAYLIST_NAMES_SHOWN));
        }

        Reply::public(format!("Started random playlist from **{}**", names))
    }

    async fn search(&self, request: &CommandRequest) -> Reply {
        let Some(query) = request.arg_str("query") else {
            return missing_arg("query");
        };
        let Some(repository) = self.playback.repository() else {
            return Reply::ephemeral("No database connection available.");
        };

        let songs = match repository.search(&query, SEARCH_LIMIT).await {
            Ok(songs) => songs,
            Err(e) => {
                error!("Error searching archive: {}", e);
                Vec::new()
            }
        };

        let items = songs
            .into_iter()
            .map(|song| CarouselItem::Archived(song.into()))
            .collect();

        match CarouselSession::new(
            format!("Songs matching `{}`:", query),
            CarouselKind::ArchivedSongs,
            items,
        ) {
            Some(session) => self.playback.show_carousel(session),
            None => Reply::public(format!("No songs found matching: `{}`", query)),
        }
    }

    async fn play(&self, request: &CommandRequest) -> Reply {
        let Some(guid) = request.arg_str("guid") else {
            return missing_arg("guid");
        };

        if request.caller.voice_channel.is_none() {
            return Reply::ephemeral("You must be in a voice channel to use this command.");
        }

        let Some(repository) = self.playback.repository() else {
            return Reply::ephemeral("No database connection available.");
        };

        let song = match repository.song_by_guid(&guid).await {
            Ok(Some(song)) => song,
            Ok(None) => return Reply::ephemeral(format!("Song not found: `{}`", guid)),
            Err(e) => {
                error!("Error looking up song {}: {}", guid, e);
                return Reply::ephemeral(format!("Song not found: `{}`", guid));
            }
        };

        if !Path::new(&song.file_path).exists() {
            warn!("File not found: {}", song.file_path);
            return Reply::ephemeral("Song file not found on disk.");
        }

        self.playback.play_file(&request.caller, song.into()).await
    }
}

#[async_trait]
impl CommandGroup for ArchiveCommands {
    fn names(&self) -> &'static [&'static str] {
        &["skip", "upcoming", "playlist", "search", "play"]
    }

    async fn dispatch(&self, request: &CommandRequest) -> Option<Reply> {
        let reply = match request.name.as_str() {
            "skip" => self.skip().await,
            "upcoming" => self.upcoming().await,
            "playlist" => self.playlist(request).await,
            "search" => self.search(request).await,
            "play" => self.play(request).await,
            _ => return None,
        };
        Some(reply)
    }
}

//! Chat commands dispatched through the router over the production context

mod helpers;

use std::io::Write;
use std::sync::Arc;

use helpers::*;
use sxm_bot::carousel::{CarouselRegistry, Direction, Navigation};
use sxm_bot::commands::{BotContext, Caller, CommandRequest, CommandRouter, Playback, Reply};
use sxm_bot::config::{CarouselSettings, PlayerTimings, ReconcilerTimings};
use sxm_bot::player::{PlayType, PlayerSlot};
use sxm_bot::reconciler::{PlayerState, StatusReconciler};
use sxm_common::db::SongRepository;
use sxm_common::events::OutboundEvent;
use sxm_common::{MediaFile, Song, XmChannel};
use tokio::sync::mpsc;

struct Bot {
    router: CommandRouter,
    context: Arc<BotContext>,
    connector: Arc<MockConnector>,
    sources: Arc<MockSourceFactory>,
    outbound: mpsc::Receiver<OutboundEvent>,
}

fn catalog() -> Vec<XmChannel> {
    vec![channel("octane", "37", "Octane"), channel("70s", "7", "70s on 7")]
}

fn archive() -> Vec<Song> {
    vec![
        song("aaa1", "Dreams", "Fleetwood Mac", "70s", 1),
        song("aaa2", "Dreams (Live)", "Fleetwood Mac", "70s", 5),
        song("bbb1", "Hotel California", "Eagles", "70s", 3),
    ]
}

fn bot_with(state: PlayerState, songs: Option<Vec<Song>>) -> Bot {
    let fixture = fixture(PlayerTimings::default());
    let slot = Arc::new(PlayerSlot::new(fixture.deps.clone()));
    let (reconciler, _inbound) = StatusReconciler::new(
        ReconcilerTimings::default(),
        slot,
        Arc::new(RecordingOutput::default()),
        state,
    );

    let archive_enabled = songs.is_some();
    let repository =
        songs.map(|songs| Arc::new(MemoryRepository::with_songs(songs)) as Arc<dyn SongRepository>);
    let context = Arc::new(BotContext::new(
        "music",
        Arc::new(reconciler),
        repository,
        Arc::new(CarouselRegistry::new(CarouselSettings::default())),
        ReconcilerTimings::default().switch_delay(),
    ));

    Bot {
        router: CommandRouter::for_playback(context.clone(), archive_enabled),
        context,
        connector: fixture.connector,
        sources: fixture.sources,
        outbound: fixture.outbound,
    }
}

fn bot() -> Bot {
    bot_with(
        PlayerState {
            sxm_running: true,
            channels: catalog(),
            ..PlayerState::default()
        },
        Some(archive()),
    )
}

fn in_voice() -> Caller {
    Caller {
        user_id: "u1".to_string(),
        voice_channel: Some("lounge".to_string()),
    }
}

fn not_in_voice() -> Caller {
    Caller {
        user_id: "u1".to_string(),
        voice_channel: None,
    }
}

impl Bot {
    async fn run(&self, request: CommandRequest) -> Reply {
        self.router.dispatch(&request).await
    }

    async fn say(&self, name: &str) -> Reply {
        self.run(CommandRequest::new(name, in_voice())).await
    }

    /// Start file playback of `guid` directly on the player
    async fn play_direct(&self, guid: &str) -> Arc<MockSink> {
        let player = self.context.player();
        player.set_output("lounge").await.unwrap();
        assert!(player.add_file(media(guid)).await);
        let sink = self.connector.last_sink().unwrap();
        let plays = sink.play_count();
        wait_until(|| sink.play_count() > plays).await;
        sink
    }
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_root_prefix_and_case_are_normalized() {
    let bot = bot();
    for name in ["/music playing", "music playing", "PLAYING"] {
        assert_eq!(bot.say(name).await.content, "Nothing is currently playing.");
    }
}

#[tokio::test(start_paused = true)]
async fn test_archive_commands_absent_without_archive() {
    let bot = bot_with(PlayerState::default(), None);

    let reply = bot.say("skip").await;
    assert!(reply.ephemeral);
    assert!(reply.content.starts_with("Unknown command: `skip`. Available:"));
    assert!(reply.content.contains("channel"));
}

// ============================================================================
// Live channels
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_channel_requires_connection_and_voice() {
    let bot = bot_with(
        PlayerState {
            channels: catalog(),
            ..PlayerState::default()
        },
        None,
    );
    let request = CommandRequest::new("channel", in_voice()).with_arg("channel", "octane");
    assert_eq!(
        bot.run(request).await.content,
        "SXM is not currently connected. Please wait..."
    );

    let bot = self::bot();
    let request = CommandRequest::new("channel", not_in_voice()).with_arg("channel", "octane");
    assert_eq!(
        bot.run(request).await.content,
        "You must be in a voice channel to use this command."
    );

    let request = CommandRequest::new("channel", in_voice());
    assert_eq!(bot.run(request).await.content, "Missing argument: `channel`");
}

#[tokio::test(start_paused = true)]
async fn test_unknown_channel_points_at_listing() {
    let bot = bot();
    let request = CommandRequest::new("channel", in_voice()).with_arg("channel", "jazz");

    let reply = bot.run(request).await;
    assert!(reply.ephemeral);
    assert_eq!(
        reply.content,
        "Could not find channel: `jazz`\nUse `/music channels` to see available channels."
    );
}

#[tokio::test(start_paused = true)]
async fn test_channel_starts_stream_and_remembers_it() {
    let mut bot = bot();
    let request = CommandRequest::new("channel", in_voice()).with_arg("channel", 37);

    let reply = bot.run(request).await;
    assert_eq!(reply.content, "Started playing **#37 Octane** in lounge");
    assert!(!reply.ephemeral);

    match bot.outbound.try_recv() {
        Ok(OutboundEvent::TriggerStream { channel_id, .. }) => assert_eq!(channel_id, "octane"),
        other => panic!("unexpected outbound event: {:?}", other),
    }
    assert_eq!(bot.context.player().play_type(), Some(PlayType::Live));

    let pending = bot.context.reconciler().pending().await.unwrap();
    assert_eq!(pending.channel.id, "octane");
    assert_eq!(pending.target, "lounge");
}

#[tokio::test(start_paused = true)]
async fn test_channel_replaces_file_playback() {
    let bot = bot();
    bot.play_direct("a").await;

    let request = CommandRequest::new("channel", in_voice()).with_arg("channel", "octane");
    assert_eq!(
        bot.run(request).await.content,
        "Started playing **#37 Octane** in lounge"
    );

    wait_until(|| bot.sources.all_released_once()).await;
    assert_eq!(bot.connector.connects(), 1);
    assert_eq!(bot.context.player().play_type(), Some(PlayType::Live));
}

#[tokio::test(start_paused = true)]
async fn test_channels_list_is_sent_privately() {
    let bot = bot();

    let reply = bot.say("channels").await;
    assert!(reply.ephemeral);
    assert_eq!(reply.content, "Sending channel list via DM...");
    assert_eq!(reply.direct_messages[0], "**SXM Channels:**");
    assert!(reply.direct_messages[1].starts_with("```\nID"));
    assert!(reply.direct_messages[1].ends_with("\n```"));

    let lines: Vec<&str> = reply.direct_messages[1].lines().collect();
    assert!(lines[3].starts_with("70s"));
    assert!(lines[4].starts_with("octane"));
}

#[tokio::test(start_paused = true)]
async fn test_stop_forgets_pending_and_disconnects() {
    let mut bot = bot();
    let request = CommandRequest::new("channel", in_voice()).with_arg("channel", "octane");
    bot.run(request).await;
    let _ = bot.outbound.try_recv();

    assert_eq!(bot.say("stop").await.content, "Stopped playing music.");

    assert!(bot.context.reconciler().pending().await.is_none());
    assert!(!bot.context.player().has_output().await);
    assert!(matches!(bot.outbound.try_recv(), Ok(OutboundEvent::KillStream)));
}

// ============================================================================
// General commands
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_playing_describes_current_file() {
    let bot = bot();
    bot.play_direct("a").await;

    assert_eq!(
        bot.say("playing").await.content,
        format!("Currently playing {} on lounge", media("a").bold_name())
    );
}

#[tokio::test(start_paused = true)]
async fn test_summon_joins_caller() {
    let bot = bot();

    let reply = bot.run(CommandRequest::new("summon", not_in_voice())).await;
    assert_eq!(reply.content, "You must be in a voice channel.");

    assert_eq!(bot.say("summon").await.content, "Joined lounge");
    assert_eq!(
        bot.context.player().output_target().await.as_deref(),
        Some("lounge")
    );
}

#[tokio::test(start_paused = true)]
async fn test_repeat_reports_and_sets() {
    let bot = bot();
    assert_eq!(bot.say("repeat").await.content, "Nothing is currently playing.");

    bot.play_direct("a").await;
    assert_eq!(bot.say("repeat").await.content, "Repeat is currently off.");

    let request = CommandRequest::new("repeat", in_voice()).with_arg("enabled", "on");
    assert_eq!(bot.run(request).await.content, "Set repeat to on.");
    assert!(bot.context.player().repeat());

    let request = CommandRequest::new("repeat", in_voice()).with_arg("enabled", "maybe");
    assert_eq!(
        bot.run(request).await.content,
        "Invalid value for repeat: `maybe`"
    );
}

#[tokio::test(start_paused = true)]
async fn test_reset_recreates_player_and_rejoins() {
    let bot = bot();
    let old = bot.context.player();
    bot.play_direct("a").await;

    assert_eq!(bot.say("reset").await.content, "Bot reset successfully.");

    assert!(old.is_shutting_down());
    assert_eq!(bot.context.reconciler().slot().generation(), 1);
    let player = bot.context.player();
    assert!(!Arc::ptr_eq(&old, &player));
    assert_eq!(player.output_target().await.as_deref(), Some("lounge"));
    assert!(bot.sources.all_released_once());
}

#[tokio::test(start_paused = true)]
async fn test_recent_validates_count_and_lists_history() {
    let bot = bot();

    let request = CommandRequest::new("recent", in_voice()).with_arg("count", 11);
    assert_eq!(bot.run(request).await.content, "Count must be between 1 and 10.");

    bot.play_direct("a").await;
    let reply = bot.say("recent").await;
    assert_eq!(reply.content, "Recent songs/shows");
    let carousel = reply.carousel.unwrap();
    assert!(carousel.id.is_none());
    assert_eq!(carousel.view.footer, "GUID: a | 1/1 Songs");
}

// ============================================================================
// Archive commands
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_search_registers_navigable_carousel() {
    let bot = bot();
    let request = CommandRequest::new("search", in_voice()).with_arg("query", "dreams");

    let reply = bot.run(request).await;
    assert_eq!(reply.content, "Songs matching `dreams`:");
    let carousel = reply.carousel.unwrap();
    assert_eq!(carousel.view.footer, "GUID: aaa2 | 1/2 Songs");
    assert_eq!(carousel.view.title, "Dreams (Live)");

    let id = carousel.id.unwrap();
    let registry = bot.context.carousels();
    assert_eq!(registry.count(), 1);

    let (outcome, view) = registry.navigate(&id, Direction::Next).unwrap();
    assert_eq!(outcome, Navigation::Moved);
    assert_eq!(view.footer, "GUID: aaa1 | 2/2 Songs");

    let (outcome, _) = registry.navigate(&id, Direction::Next).unwrap();
    assert_eq!(outcome, Navigation::Unhandled);
}

#[tokio::test(start_paused = true)]
async fn test_search_single_and_empty_results() {
    let bot = bot();

    let request = CommandRequest::new("search", in_voice()).with_arg("query", "hotel");
    let reply = bot.run(request).await;
    assert!(reply.carousel.unwrap().id.is_none());
    assert_eq!(bot.context.carousels().count(), 0);

    let request = CommandRequest::new("search", in_voice()).with_arg("query", "zzz");
    assert_eq!(
        bot.run(request).await.content,
        "No songs found matching: `zzz`"
    );
}

#[tokio::test(start_paused = true)]
async fn test_playlist_threshold_and_start() {
    let bot = bot();

    let request = CommandRequest::new("playlist", in_voice()).with_arg("channels", "70s");
    assert_eq!(
        bot.run(request).await.content,
        "Not enough archived songs (3 < 40)."
    );

    let request = CommandRequest::new("playlist", in_voice()).with_arg("channels", "nothing");
    assert_eq!(
        bot.run(request).await.content,
        "No valid channels found in: `nothing`"
    );

    let request = CommandRequest::new("playlist", in_voice())
        .with_arg("channels", "70s")
        .with_arg("threshold", 1);
    assert_eq!(
        bot.run(request).await.content,
        "Started random playlist from **#7 70s on 7**"
    );
    assert_eq!(bot.context.player().play_type(), Some(PlayType::Random));
}

#[tokio::test(start_paused = true)]
async fn test_play_checks_song_and_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"not really audio").unwrap();
    let on_disk = Song {
        file_path: file.path().to_string_lossy().into_owned(),
        ..song("ccc1", "Go Your Own Way", "Fleetwood Mac", "70s", 2)
    };

    let mut songs = archive();
    songs.push(on_disk.clone());
    let bot = bot_with(
        PlayerState {
            sxm_running: true,
            channels: catalog(),
            ..PlayerState::default()
        },
        Some(songs),
    );

    let request = CommandRequest::new("play", in_voice()).with_arg("guid", "nope");
    assert_eq!(bot.run(request).await.content, "Song not found: `nope`");

    let request = CommandRequest::new("play", in_voice()).with_arg("guid", "aaa1");
    assert_eq!(bot.run(request).await.content, "Song file not found on disk.");

    let request = CommandRequest::new("play", in_voice()).with_arg("guid", "ccc1");
    assert_eq!(
        bot.run(request).await.content,
        format!(
            "Added {} to now playing queue",
            MediaFile::from(on_disk).bold_name()
        )
    );
    assert_eq!(bot.context.player().play_type(), Some(PlayType::File));
}

#[tokio::test(start_paused = true)]
async fn test_skip_and_upcoming() {
    let bot = bot();
    assert_eq!(bot.say("skip").await.content, "Nothing is playing.");

    let sink = bot.play_direct("a").await;
    assert!(bot.context.player().add_file(media("b")).await);

    let reply = bot.say("upcoming").await;
    assert_eq!(reply.content, "Upcoming songs/shows:");
    assert_eq!(reply.carousel.unwrap().view.footer, "1 Away | 1/1 Songs");

    assert_eq!(bot.say("skip").await.content, "Song skipped.");
    wait_until(|| sink.play_count() == 2).await;
    assert_eq!(
        bot.context.player().current().map(|m| m.guid().to_string()),
        Some("b".to_string())
    );
}

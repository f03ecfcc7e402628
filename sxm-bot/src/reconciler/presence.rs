//! Presence descriptors for the bot account

use chrono::{DateTime, Utc};
use sxm_common::events::{Presence, PresenceKind};
use sxm_common::{LiveSnapshot, MediaFile, XmChannel};

/// Presence for archived file playback
pub fn song_presence(media: &MediaFile) -> Presence {
    let pretty = media.pretty_name();
    let large_image_text = match media {
        MediaFile::Song(song) => song
            .album
            .as_ref()
            .map(|album| format!("{} by {}", album, song.artist)),
        MediaFile::Episode(_) => None,
    };

    Presence {
        kind: PresenceKind::Listening,
        name: pretty.clone(),
        details: Some(pretty),
        state: "Playing music".to_string(),
        large_image_url: media.image_url().map(str::to_string),
        large_image_text,
        start: None,
    }
}

/// Presence for live playback of `channel`
///
/// Names the cut airing at the snapshot's radio time; falls back to the
/// current episode and then to the bare channel name.
pub fn live_presence(
    channel: &XmChannel,
    snapshot: &LiveSnapshot,
    start: Option<DateTime<Utc>>,
) -> Presence {
    let suffix = format!("SXM {}", channel.pretty_name());
    let radio_time = snapshot.radio_time;

    let mut presence = Presence {
        kind: PresenceKind::Listening,
        name: suffix.clone(),
        details: None,
        state: "Playing music from SXM".to_string(),
        large_image_url: None,
        large_image_text: None,
        start,
    };

    if let Some(cut) = snapshot.latest_cut(radio_time) {
        let pretty = format!("\"{}\" by {}", cut.title, cut.artist);
        presence.name = format!("{} on {}", pretty, suffix);
        presence.details = Some(pretty);
        presence.large_image_url = cut.image_url.clone();
        presence.large_image_text = cut
            .album
            .as_ref()
            .map(|album| format!("{} by {}", album, cut.artist));
    } else if let Some(episode) = snapshot.latest_episode(radio_time) {
        presence.name = format!("\"{}\" on {}", episode.long_title, suffix);
    }

    presence
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sxm_common::{LiveCut, LiveEpisode, Song};

    fn channel() -> XmChannel {
        XmChannel {
            id: "octane".to_string(),
            channel_number: "37".to_string(),
            name: "Octane".to_string(),
            short_description: String::new(),
        }
    }

    #[test]
    fn test_song_presence_uses_album_art_text() {
        let media = MediaFile::Song(Song {
            guid: "g1".to_string(),
            title: "Heroes".to_string(),
            artist: "David Bowie".to_string(),
            album: Some("Heroes".to_string()),
            air_time: Utc::now(),
            channel: "70s".to_string(),
            file_path: "/archive/heroes.mp3".to_string(),
            image_url: Some("http://art/heroes.jpg".to_string()),
        });

        let presence = song_presence(&media);
        assert_eq!(presence.name, "\"Heroes\" by David Bowie");
        assert_eq!(presence.large_image_text.as_deref(), Some("Heroes by David Bowie"));
        assert_eq!(presence.large_image_url.as_deref(), Some("http://art/heroes.jpg"));
        assert_eq!(presence.state, "Playing music");
    }

    #[test]
    fn test_live_presence_prefers_cut_then_episode() {
        let at = |minute| Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap();
        let mut snapshot = LiveSnapshot {
            channel_id: "octane".to_string(),
            radio_time: Some(at(30)),
            episodes: vec![LiveEpisode {
                long_title: "Morning Show".to_string(),
                time: at(0),
            }],
            ..Default::default()
        };

        let presence = live_presence(&channel(), &snapshot, None);
        assert_eq!(presence.name, "\"Morning Show\" on SXM #37 Octane");
        assert!(presence.details.is_none());

        snapshot.cuts.push(LiveCut {
            title: "Bleed".to_string(),
            artist: "Meshuggah".to_string(),
            album: None,
            image_url: None,
            time: at(25),
        });
        let presence = live_presence(&channel(), &snapshot, Some(at(0)));
        assert_eq!(presence.name, "\"Bleed\" by Meshuggah on SXM #37 Octane");
        assert_eq!(presence.start, Some(at(0)));
        assert_eq!(presence.state, "Playing music from SXM");
    }
}

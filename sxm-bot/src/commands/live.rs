//! Live SXM channel commands

use std::sync::Arc;

use async_trait::async_trait;
use sxm_common::XmChannel;
use tracing::{error, info};

use super::{missing_arg, CommandGroup, CommandRequest, Playback, Reply};
use crate::player::PlayType;

/// Direct messages stay below the chat message size limit
const MESSAGE_CHUNK: usize = 1900;

/// Channel descriptions are cut to this many characters in listings
const DESCRIPTION_WIDTH: usize = 40;

pub struct LiveCommands {
    playback: Arc<dyn Playback>,
}

impl LiveCommands {
    pub fn new(playback: Arc<dyn Playback>) -> Self {
        Self { playback }
    }

    async fn channel(&self, request: &CommandRequest) -> Reply {
        let Some(input) = request.arg_str("channel") else {
            return missing_arg("channel");
        };

        let state = self.playback.player_state().await;
        if !state.sxm_running {
            return Reply::ephemeral("SXM is not currently connected. Please wait...");
        }

        if request.caller.voice_channel.is_none() {
            return Reply::ephemeral("You must be in a voice channel to use this command.");
        }

        let Some(channel) = state.parse_channel(&input).cloned() else {
            return Reply::ephemeral(format!(
                "Could not find channel: `{}`\nUse `/{} channels` to see available channels.",
                input,
                self.playback.root_command()
            ));
        };

        if let Err(reply) = self.playback.prepare(&request.caller, PlayType::Live).await {
            return reply;
        }

        info!("Playing SXM channel: {}", channel.id);
        let player = self.playback.player();
        if !player.add_live_stream(&channel, None).await {
            error!("Error starting stream for {}", channel.id);
            player.stop(true, true).await;
            return Reply::public("Something went wrong starting the stream.");
        }

        let target = player
            .output_target()
            .await
            .unwrap_or_else(|| "voice".to_string());
        self.playback.remember_live(channel.clone(), target.clone()).await;

        Reply::public(format!(
            "Started playing **{}** in {}",
            channel.pretty_name(),
            target
        ))
    }

    async fn channels(&self) -> Reply {
        let state = self.playback.player_state().await;
        if !state.sxm_running {
            return Reply::ephemeral("SXM is not currently connected.");
        }

        let table = channel_table(&state.channels);
        let mut messages = vec!["**SXM Channels:**".to_string()];
        messages.extend(
            chunk_lines(&table, MESSAGE_CHUNK)
                .into_iter()
                .map(|chunk| format!("```\n{}\n```", chunk)),
        );

        Reply {
            content: "Sending channel list via DM...".to_string(),
            ephemeral: true,
            direct_messages: messages,
            ..Default::default()
        }
    }
}

#[async_trait]
impl CommandGroup for LiveCommands {
    fn names(&self) -> &'static [&'static str] {
        &["channel", "channels"]
    }

    async fn dispatch(&self, request: &CommandRequest) -> Option<Reply> {
        let reply = match request.name.as_str() {
            "channel" => self.channel(request).await,
            "channels" => self.channels().await,
            _ => return None,
        };
        Some(reply)
    }
}

fn truncate_description(description: &str) -> String {
    if description.chars().count() > DESCRIPTION_WIDTH {
        let cut: String = description.chars().take(DESCRIPTION_WIDTH).collect();
        format!("{}...", cut)
    } else {
        description.to_string()
    }
}

/// Plain-text table of channels sorted by channel number
pub fn channel_table(channels: &[XmChannel]) -> String {
    let mut sorted: Vec<&XmChannel> = channels.iter().collect();
    sorted.sort_by_key(|c| c.number());

    let headers = ["ID", "#", "Name", "Description"];
    let rows: Vec<[String; 4]> = sorted
        .iter()
        .map(|c| {
            [
                c.id.clone(),
                c.channel_number.clone(),
                c.name.clone(),
                truncate_description(&c.short_description),
            ]
        })
        .collect();

    let mut widths = headers.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let render = |cells: [&str; 4]| -> String {
        let line = cells
            .iter()
            .zip(widths.iter())
            .enumerate()
            .map(|(i, (cell, width))| {
                // Channel numbers are right-aligned
                if i == 1 {
                    format!("{:>width$}", cell, width = *width)
                } else {
                    format!("{:<width$}", cell, width = *width)
                }
            })
            .collect::<Vec<_>>()
            .join("  ");
        line.trim_end().to_string()
    };

    let mut lines = vec![
        render(headers),
        render(widths.map(|w| "-".repeat(w)).each_ref().map(String::as_str)),
    ];
    for row in &rows {
        lines.push(render(row.each_ref().map(String::as_str)));
    }
    lines.join("\n")
}

/// Split `text` into pieces shorter than `limit` bytes, breaking at newlines
pub fn chunk_lines(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        if rest.len() < limit {
            chunks.push(rest.to_string());
            break;
        }

        let mut boundary = limit;
        while !rest.is_char_boundary(boundary) {
            boundary -= 1;
        }

        match rest[..boundary].rfind('\n') {
            Some(idx) if idx > 0 => {
                chunks.push(rest[..idx].to_string());
                rest = &rest[idx + 1..];
            }
            _ => {
                chunks.push(rest[..boundary].to_string());
                rest = &rest[boundary..];
            }
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: &str, number: &str, name: &str, description: &str) -> XmChannel {
        XmChannel {
            id: id.to_string(),
            channel_number: number.to_string(),
            name: name.to_string(),
            short_description: description.to_string(),
        }
    }

    #[test]
    fn test_channel_table_sorted_by_number() {
        let table = channel_table(&[
            channel("octane", "37", "Octane", "Hard rock"),
            channel("70s", "7", "70s on 7", &"x".repeat(50)),
        ]);
        let lines: Vec<&str> = table.lines().collect();

        assert!(lines[0].starts_with("ID"));
        assert!(lines[1].starts_with("---"));
        assert!(lines[2].starts_with("70s"));
        assert!(lines[2].ends_with(&format!("{}...", "x".repeat(40))));
        assert!(lines[3].starts_with("octane"));
    }

    #[test]
    fn test_chunk_lines_breaks_on_newlines() {
        let text = (0..300).map(|n| format!("line {:03}", n)).collect::<Vec<_>>().join("\n");
        let chunks = chunk_lines(&text, 1900);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() < 1900));
        assert_eq!(chunks.join("\n"), text);
    }

    #[test]
    fn test_chunk_lines_short_text_is_single_chunk() {
        assert_eq!(chunk_lines("abc", 1900), vec!["abc".to_string()]);
        assert!(chunk_lines("", 1900).is_empty());
    }
}

//! Chat command surface
//!
//! Command groups are composed over a single [`Playback`] capability
//! implementation instead of sharing state through inheritance:
//! - [`CoreCommands`]: playing, recent, stop, summon, reset, repeat
//! - [`LiveCommands`]: channel, channels
//! - [`ArchiveCommands`]: skip, upcoming, playlist, search, play
//!   (registered only when an archive folder is configured)

pub mod archive;
pub mod context;
pub mod general;
pub mod live;

pub use archive::ArchiveCommands;
pub use context::{BotContext, Playback};
pub use general::CoreCommands;
pub use live::LiveCommands;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::carousel::CarouselView;

/// Who issued a command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: String,
    /// Output target the caller is currently in, if any
    #[serde(default)]
    pub voice_channel: Option<String>,
}

/// A parsed command invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandRequest {
    pub name: String,
    #[serde(default)]
    pub args: HashMap<String, Value>,
    #[serde(default)]
    pub caller: Caller,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>, caller: Caller) -> Self {
        Self {
            name: name.into(),
            args: HashMap::new(),
            caller,
        }
    }

    pub fn with_arg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.args.insert(key.to_string(), value.into());
        self
    }

    /// String argument (numbers and booleans are rendered as text)
    pub fn arg_str(&self, key: &str) -> Option<String> {
        match self.args.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Integer argument; Err carries the raw text when it does not parse
    pub fn arg_i64(&self, key: &str) -> Option<Result<i64, String>> {
        match self.args.get(key)? {
            Value::Number(n) => Some(n.as_i64().ok_or_else(|| n.to_string())),
            Value::String(s) => Some(s.trim().parse().map_err(|_| s.clone())),
            other => Some(Err(other.to_string())),
        }
    }

    /// Boolean argument; accepts true/false, on/off, yes/no
    pub fn arg_bool(&self, key: &str) -> Option<Result<bool, String>> {
        match self.args.get(key)? {
            Value::Bool(b) => Some(Ok(*b)),
            Value::String(s) => Some(match s.trim().to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => Ok(true),
                "false" | "off" | "no" | "0" => Ok(false),
                _ => Err(s.clone()),
            }),
            other => Some(Err(other.to_string())),
        }
    }
}

/// Carousel attached to a reply
#[derive(Debug, Clone, Serialize)]
pub struct CarouselReply {
    /// Registry id for navigation (None for single-item results)
    pub id: Option<String>,
    pub view: CarouselView,
}

/// Response to a command
#[derive(Debug, Clone, Default, Serialize)]
pub struct Reply {
    pub content: String,
    pub ephemeral: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carousel: Option<CarouselReply>,
    /// Messages delivered privately to the caller
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub direct_messages: Vec<String>,
}

impl Reply {
    pub fn public(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
            ..Default::default()
        }
    }
}

/// A set of commands sharing the playback capability
#[async_trait]
pub trait CommandGroup: Send + Sync {
    fn names(&self) -> &'static [&'static str];

    /// Handle `request`; None if the name is not one of ours
    async fn dispatch(&self, request: &CommandRequest) -> Option<Reply>;
}

/// Routes requests to the registered command groups
pub struct CommandRouter {
    root_command: String,
    groups: Vec<Box<dyn CommandGroup>>,
}

impl CommandRouter {
    pub fn new(root_command: impl Into<String>) -> Self {
        Self {
            root_command: root_command.into(),
            groups: Vec::new(),
        }
    }

    /// Standard command set over `playback`
    pub fn for_playback(playback: Arc<dyn Playback>, archive_enabled: bool) -> Self {
        let mut router = Self::new(playback.root_command());
        router.register(Box::new(CoreCommands::new(playback.clone())));
        router.register(Box::new(LiveCommands::new(playback.clone())));
        if archive_enabled {
            router.register(Box::new(ArchiveCommands::new(playback)));
        }
        router
    }

    pub fn register(&mut self, group: Box<dyn CommandGroup>) {
        self.groups.push(group);
    }

    pub fn root_command(&self) -> &str {
        &self.root_command
    }

    /// Every registered command name
    pub fn command_names(&self) -> Vec<&'static str> {
        self.groups.iter().flat_map(|g| g.names().iter().copied()).collect()
    }

    /// Normalize the command name: `/music channel`, `music channel` and
    /// `channel` all resolve to `channel`
    fn command_name<'a>(&self, raw: &'a str) -> &'a str {
        let raw = raw.trim();
        let raw = raw.strip_prefix('/').unwrap_or(raw);
        match raw.strip_prefix(self.root_command.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with(' ') => rest.trim(),
            _ => raw,
        }
    }

    pub async fn dispatch(&self, request: &CommandRequest) -> Reply {
        let name = self.command_name(&request.name).to_ascii_lowercase();
        debug!("Dispatching command: {}", name);

        let mut normalized = request.clone();
        normalized.name = name.clone();

        for group in &self.groups {
            if !group.names().contains(&name.as_str()) {
                continue;
            }
            if let Some(reply) = group.dispatch(&normalized).await {
                return reply;
            }
        }

        Reply::ephemeral(format!(
            "Unknown command: `{}`. Available: {}",
            name,
            self.command_names().join(", ")
        ))
    }
}

/// Shorthand for the "missing argument" reply
pub(crate) fn missing_arg(name: &str) -> Reply {
    Reply::ephemeral(format!("Missing argument: `{}`", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl CommandGroup for Echo {
        fn names(&self) -> &'static [&'static str] {
            &["echo"]
        }

        async fn dispatch(&self, request: &CommandRequest) -> Option<Reply> {
            Some(Reply::public(request.arg_str("text").unwrap_or_default()))
        }
    }

    fn router() -> CommandRouter {
        let mut router = CommandRouter::new("music");
        router.register(Box::new(Echo));
        router
    }

    #[tokio::test]
    async fn test_root_prefix_is_optional() {
        let router = router();
        for name in ["echo", "/music echo", "music echo", "ECHO"] {
            let request = CommandRequest::new(name, Caller::default()).with_arg("text", "hi");
            assert_eq!(router.dispatch(&request).await.content, "hi", "{}", name);
        }
    }

    #[tokio::test]
    async fn test_unknown_command_is_ephemeral() {
        let reply = router()
            .dispatch(&CommandRequest::new("dance", Caller::default()))
            .await;
        assert!(reply.ephemeral);
        assert!(reply.content.contains("Unknown command: `dance`"));
        assert!(reply.content.contains("echo"));
    }

    #[test]
    fn test_argument_coercion() {
        let request = CommandRequest::new("recent", Caller::default())
            .with_arg("count", "5")
            .with_arg("number", 7)
            .with_arg("enabled", "off")
            .with_arg("bad", "x");

        assert_eq!(request.arg_i64("count"), Some(Ok(5)));
        assert_eq!(request.arg_i64("number"), Some(Ok(7)));
        assert_eq!(request.arg_str("number").as_deref(), Some("7"));
        assert_eq!(request.arg_bool("enabled"), Some(Ok(false)));
        assert_eq!(request.arg_i64("bad"), Some(Err("x".to_string())));
        assert_eq!(request.arg_i64("missing"), None);
    }

    #[test]
    fn test_request_deserializes_without_optional_fields() {
        let request: CommandRequest = serde_json::from_str(r#"{"name":"playing"}"#).unwrap();
        assert_eq!(request.name, "playing");
        assert!(request.args.is_empty());
        assert!(request.caller.voice_channel.is_none());
    }
}

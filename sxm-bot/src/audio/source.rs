//! Native audio sources
//!
//! Decoding is delegated to an `ffmpeg` subprocess that writes raw PCM
//! (48kHz, stereo, s16le) to its stdout. An [`AudioSource`] wraps that handle:
//! the sink takes the PCM reader, and the owner releases the process.

use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::error::PlayerError;

/// PCM sample rate produced by sources
pub const SAMPLE_RATE: u32 = 48_000;

/// PCM channel count produced by sources
pub const CHANNELS: u16 = 2;

/// A materialized native audio handle
///
/// `release()` must be safe to call any number of times; only the first call
/// frees the underlying resource.
pub trait AudioSource: Send + Sync {
    /// Human-readable description for logs
    fn describe(&self) -> &str;

    /// Take the PCM reader (available once)
    fn take_output(&self) -> Option<Box<dyn Read + Send>>;

    /// Free the native resource (idempotent)
    fn release(&self);

    fn is_released(&self) -> bool;
}

/// What to open: input plus the demux/output options for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub input: String,
    pub before_options: Vec<String>,
    pub options: Vec<String>,
}

impl SourceSpec {
    /// Archived file on disk
    pub fn file(path: &str) -> Self {
        Self {
            input: path.to_string(),
            before_options: Vec::new(),
            options: Vec::new(),
        }
    }

    /// Live stream locator (MPEG-TS over the acquisition transport)
    pub fn live(locator: &str) -> Self {
        Self {
            input: locator.to_string(),
            before_options: vec!["-f".to_string(), "mpegts".to_string()],
            options: vec!["-loglevel".to_string(), "fatal".to_string()],
        }
    }
}

/// Creates native audio sources
pub trait SourceFactory: Send + Sync {
    fn open(&self, spec: &SourceSpec) -> Result<Arc<dyn AudioSource>, PlayerError>;
}

/// [`SourceFactory`] spawning one `ffmpeg` process per source
pub struct FfmpegSourceFactory {
    ffmpeg_path: String,
}

impl FfmpegSourceFactory {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Full argument list passed to ffmpeg for `spec`
    pub fn arguments(spec: &SourceSpec) -> Vec<String> {
        let mut args = spec.before_options.clone();
        args.push("-i".to_string());
        args.push(spec.input.clone());
        args.push("-f".to_string());
        args.push("s16le".to_string());
        args.push("-ar".to_string());
        args.push(SAMPLE_RATE.to_string());
        args.push("-ac".to_string());
        args.push(CHANNELS.to_string());
        args.extend(spec.options.iter().cloned());
        args.push("pipe:1".to_string());
        args
    }
}

impl SourceFactory for FfmpegSourceFactory {
    fn open(&self, spec: &SourceSpec) -> Result<Arc<dyn AudioSource>, PlayerError> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(Self::arguments(spec))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                PlayerError::Playback(format!("Failed to spawn {}: {}", self.ffmpeg_path, e))
            })?;

        let stdout = child.stdout.take();
        debug!("Spawned ffmpeg (pid {}) for {}", child.id(), spec.input);

        Ok(Arc::new(FfmpegSource {
            description: spec.input.clone(),
            child: Mutex::new(Some(child)),
            stdout: Mutex::new(stdout),
        }))
    }
}

/// An `ffmpeg` child process producing PCM on stdout
pub struct FfmpegSource {
    description: String,
    child: Mutex<Option<Child>>,
    stdout: Mutex<Option<ChildStdout>>,
}

impl AudioSource for FfmpegSource {
    fn describe(&self) -> &str {
        &self.description
    }

    fn take_output(&self) -> Option<Box<dyn Read + Send>> {
        self.stdout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|stdout| Box::new(stdout) as Box<dyn Read + Send>)
    }

    fn release(&self) {
        let child = self
            .child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(mut child) = child {
            // Process may already have exited on its own
            if let Err(e) = child.kill() {
                debug!("Error killing ffmpeg for {}: {}", self.description, e);
            }
            if let Err(e) = child.wait() {
                debug!("Error reaping ffmpeg for {}: {}", self.description, e);
            }
            debug!("Released source: {}", self.description);
        }
    }

    fn is_released(&self) -> bool {
        self.child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.release();
    }
}

//! File/FIFO output sink
//!
//! Writes the PCM produced by a source to `<output_root>/<target>.pcm`. The
//! target may be a named pipe read by an external streamer. Copying happens
//! on a dedicated OS thread, which also fires the playback completion.
//!
//! A named pipe is opened and written without blocking so a missing or
//! stalled reader never outlives `stop()`. A regular file is always counted
//! as one listener; a named pipe counts only while a reader holds it open.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::audio::sink::{OutputConnector, OutputSink, PlaybackCompletion};
use crate::audio::source::AudioSource;
use crate::error::SinkError;

const COPY_CHUNK: usize = 8192;

/// Wait between attempts while a named pipe has no reader or is full
const PIPE_RETRY: Duration = Duration::from_millis(20);

/// Connects [`PipeSink`]s under an output directory
pub struct PipeConnector {
    output_root: PathBuf,
}

impl PipeConnector {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }
}

#[async_trait]
impl OutputConnector for PipeConnector {
    async fn connect(&self, target: &str) -> Result<Arc<dyn OutputSink>, SinkError> {
        validate_target(target)?;
        tokio::fs::create_dir_all(&self.output_root).await?;
        info!("Output sink connected: {}", target);
        Ok(Arc::new(PipeSink::new(self.output_root.clone(), target)))
    }
}

fn validate_target(target: &str) -> Result<(), SinkError> {
    let valid = !target.is_empty()
        && target
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SinkError::Rejected(format!("invalid target name: {:?}", target)))
    }
}

/// Sink writing PCM to a file per target
pub struct PipeSink {
    output_root: PathBuf,
    target: Mutex<String>,
    active: AtomicBool,
    playing: Arc<AtomicBool>,
    /// Last known reader state of a named-pipe target
    reader_present: Arc<AtomicBool>,
    /// Stop flag of the playback in progress
    current_stop: Mutex<Option<Arc<AtomicBool>>>,
}

impl PipeSink {
    fn new(output_root: PathBuf, target: &str) -> Self {
        Self {
            output_root,
            target: Mutex::new(target.to_string()),
            active: AtomicBool::new(true),
            playing: Arc::new(AtomicBool::new(false)),
            reader_present: Arc::new(AtomicBool::new(true)),
            current_stop: Mutex::new(None),
        }
    }

    /// File the current target writes to
    pub fn output_path(&self) -> PathBuf {
        self.output_root.join(format!("{}.pcm", self.target()))
    }

    fn signal_stop(&self) {
        let stop = self
            .current_stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(stop) = stop {
            stop.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl OutputSink for PipeSink {
    fn target(&self) -> String {
        self.target
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn move_to(&self, target: &str) -> Result<(), SinkError> {
        if !self.is_active() {
            return Err(SinkError::Disconnected);
        }
        validate_target(target)?;
        *self.target.lock().unwrap_or_else(PoisonError::into_inner) = target.to_string();
        info!("Output sink moved to {}", target);
        Ok(())
    }

    async fn disconnect(&self, force: bool) -> Result<(), SinkError> {
        debug!("Disconnecting output sink (force={})", force);
        self.signal_stop();
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn listeners(&self) -> usize {
        if !self.is_active() {
            return 0;
        }
        if is_fifo(&self.output_path()) {
            usize::from(self.reader_present.load(Ordering::SeqCst))
        } else {
            1
        }
    }

    fn play(&self, source: Arc<dyn AudioSource>, done: PlaybackCompletion) -> Result<(), SinkError> {
        if !self.is_active() {
            return Err(SinkError::Disconnected);
        }
        if self.is_playing() {
            return Err(SinkError::Rejected("already playing".to_string()));
        }

        let reader = source
            .take_output()
            .ok_or_else(|| SinkError::Rejected(format!("no output for {}", source.describe())))?;

        let path = self.output_path();
        let stop = Arc::new(AtomicBool::new(false));
        *self
            .current_stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(stop.clone());

        let playing = self.playing.clone();
        playing.store(true, Ordering::SeqCst);
        let reader_present = self.reader_present.clone();

        let spawned = std::thread::Builder::new()
            .name("pipe-sink".to_string())
            .spawn(move || {
                let error = copy_pcm(reader, &path, &stop, &reader_present).err();
                if let Some(e) = &error {
                    warn!("Pipe sink playback error: {}", e);
                }
                playing.store(false, Ordering::SeqCst);
                done.complete(error);
            });

        if let Err(e) = spawned {
            self.playing.store(false, Ordering::SeqCst);
            return Err(SinkError::Io(e));
        }
        Ok(())
    }

    fn stop(&self) {
        self.signal_stop();
    }
}

/// Copy PCM until EOF or until `stop` is raised
fn copy_pcm(
    mut reader: Box<dyn Read + Send>,
    path: &Path,
    stop: &AtomicBool,
    reader_present: &AtomicBool,
) -> Result<(), String> {
    let Some(mut file) = open_output(path, stop, reader_present)? else {
        debug!("Stopped before a reader opened {}", path.display());
        return Ok(());
    };

    let mut buf = [0u8; COPY_CHUNK];
    loop {
        if stop.load(Ordering::SeqCst) {
            return Ok(());
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(format!("Read failed: {}", e)),
        };
        if !write_chunk(&mut file, &buf[..n], stop, reader_present)
            .map_err(|e| format!("Write to {} failed: {}", path.display(), e))?
        {
            return Ok(());
        }
    }
}

/// Open the target for writing; `None` if stopped while waiting for a reader
fn open_output(
    path: &Path,
    stop: &AtomicBool,
    reader_present: &AtomicBool,
) -> Result<Option<File>, String> {
    if !is_fifo(path) {
        return OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(Some)
            .map_err(|e| format!("Failed to open {}: {}", path.display(), e));
    }

    loop {
        match open_fifo_writer(path) {
            Ok(file) => {
                reader_present.store(true, Ordering::SeqCst);
                return Ok(Some(file));
            }
            Err(e) if is_no_reader(&e) => {
                reader_present.store(false, Ordering::SeqCst);
                if stop.load(Ordering::SeqCst) {
                    return Ok(None);
                }
                std::thread::sleep(PIPE_RETRY);
            }
            Err(e) => return Err(format!("Failed to open {}: {}", path.display(), e)),
        }
    }
}

/// Write all of `data`; `Ok(false)` if stopped while the pipe was full
fn write_chunk(
    file: &mut File,
    mut data: &[u8],
    stop: &AtomicBool,
    reader_present: &AtomicBool,
) -> std::io::Result<bool> {
    while !data.is_empty() {
        match file.write(data) {
            Ok(0) => return Err(ErrorKind::WriteZero.into()),
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                if stop.load(Ordering::SeqCst) {
                    return Ok(false);
                }
                std::thread::sleep(PIPE_RETRY);
            }
            Err(e) => {
                if e.kind() == ErrorKind::BrokenPipe {
                    reader_present.store(false, Ordering::SeqCst);
                }
                return Err(e);
            }
        }
    }
    Ok(true)
}

#[cfg(unix)]
fn is_fifo(path: &Path) -> bool {
    use std::os::unix::fs::FileTypeExt;
    std::fs::metadata(path)
        .map(|m| m.file_type().is_fifo())
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_fifo(_path: &Path) -> bool {
    false
}

#[cfg(unix)]
fn open_fifo_writer(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

#[cfg(not(unix))]
fn open_fifo_writer(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).open(path)
}

/// Opening a named pipe for writing without a reader fails with ENXIO
#[cfg(unix)]
fn is_no_reader(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::ENXIO)
}

#[cfg(not(unix))]
fn is_no_reader(_e: &std::io::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct BytesSource {
        data: Mutex<Option<Vec<u8>>>,
    }

    impl AudioSource for BytesSource {
        fn describe(&self) -> &str {
            "bytes"
        }

        fn take_output(&self) -> Option<Box<dyn Read + Send>> {
            self.data
                .lock()
                .unwrap()
                .take()
                .map(|d| Box::new(Cursor::new(d)) as Box<dyn Read + Send>)
        }

        fn release(&self) {}

        fn is_released(&self) -> bool {
            false
        }
    }

    fn bytes_source(data: &[u8]) -> Arc<dyn AudioSource> {
        Arc::new(BytesSource {
            data: Mutex::new(Some(data.to_vec())),
        })
    }

    #[tokio::test]
    async fn test_play_writes_pcm_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let sink = PipeConnector::new(dir.path()).connect("lounge").await.unwrap();

        let (done, waiter) = PlaybackCompletion::new();
        sink.play(bytes_source(b"pcm-data"), done).unwrap();

        assert!(waiter.await.unwrap().is_none());
        assert!(!sink.is_playing());
        let written = std::fs::read(dir.path().join("lounge.pcm")).unwrap();
        assert_eq!(written, b"pcm-data");
    }

    #[tokio::test]
    async fn test_move_changes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = PipeConnector::new(dir.path()).connect("lounge").await.unwrap();

        sink.move_to("studio").await.unwrap();
        assert_eq!(sink.target(), "studio");

        let (done, waiter) = PlaybackCompletion::new();
        sink.play(bytes_source(b"abc"), done).unwrap();
        waiter.await.unwrap();
        assert!(dir.path().join("studio.pcm").exists());
    }

    #[tokio::test]
    async fn test_disconnected_sink_rejects_play() {
        let dir = tempfile::tempdir().unwrap();
        let sink = PipeConnector::new(dir.path()).connect("lounge").await.unwrap();

        sink.disconnect(true).await.unwrap();
        assert!(!sink.is_active());
        assert_eq!(sink.listeners(), 0);

        let (done, _waiter) = PlaybackCompletion::new();
        assert!(matches!(
            sink.play(bytes_source(b"abc"), done),
            Err(SinkError::Disconnected)
        ));
    }

    /// Source producing silence forever
    struct EndlessSource {
        taken: AtomicBool,
    }

    struct Silence;

    impl Read for Silence {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            buf.fill(0);
            Ok(buf.len())
        }
    }

    impl AudioSource for EndlessSource {
        fn describe(&self) -> &str {
            "endless"
        }

        fn take_output(&self) -> Option<Box<dyn Read + Send>> {
            if self.taken.swap(true, Ordering::SeqCst) {
                None
            } else {
                Some(Box::new(Silence))
            }
        }

        fn release(&self) {}

        fn is_released(&self) -> bool {
            false
        }
    }

    fn endless_source() -> Arc<dyn AudioSource> {
        Arc::new(EndlessSource {
            taken: AtomicBool::new(false),
        })
    }

    #[cfg(unix)]
    fn make_fifo(path: &Path) {
        use std::os::unix::ffi::OsStrExt;
        let c_path = std::ffi::CString::new(path.as_os_str().as_bytes()).unwrap();
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o644) };
        assert_eq!(rc, 0, "mkfifo failed");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_completes_while_fifo_has_no_reader() {
        let dir = tempfile::tempdir().unwrap();
        make_fifo(&dir.path().join("lounge.pcm"));
        let sink = PipeConnector::new(dir.path()).connect("lounge").await.unwrap();

        let (done, waiter) = PlaybackCompletion::new();
        sink.play(endless_source(), done).unwrap();

        // Nobody reads the pipe, so nobody is listening
        let mut waited = 0;
        while sink.listeners() != 0 {
            assert!(waited < 100, "reader never reported absent");
            tokio::time::sleep(Duration::from_millis(20)).await;
            waited += 1;
        }

        sink.stop();
        let outcome = tokio::time::timeout(Duration::from_secs(3), waiter).await;
        assert!(outcome.expect("completion after stop").unwrap().is_none());
        assert!(!sink.is_playing());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_completes_while_fifo_reader_stalls() {
        use std::os::unix::fs::OpenOptionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lounge.pcm");
        make_fifo(&path);
        // Held open but never read
        let _reader = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
            .unwrap();
        let sink = PipeConnector::new(dir.path()).connect("lounge").await.unwrap();

        let (done, waiter) = PlaybackCompletion::new();
        sink.play(endless_source(), done).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(sink.is_playing());
        assert_eq!(sink.listeners(), 1);

        sink.stop();
        let outcome = tokio::time::timeout(Duration::from_secs(3), waiter).await;
        assert!(outcome.expect("completion after stop").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_regular_file_counts_one_listener() {
        let dir = tempfile::tempdir().unwrap();
        let sink = PipeConnector::new(dir.path()).connect("lounge").await.unwrap();
        assert_eq!(sink.listeners(), 1);
    }

    #[tokio::test]
    async fn test_invalid_target_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = PipeConnector::new(dir.path()).connect("../escape").await;
        assert!(matches!(result, Err(SinkError::Rejected(_))));
    }
}

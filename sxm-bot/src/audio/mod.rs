//! Audio sources and output sinks

pub mod pipe;
pub mod sink;
pub mod source;

pub use pipe::{PipeConnector, PipeSink};
pub use sink::{CompletionWaiter, OutputConnector, OutputSink, PlaybackCompletion};
pub use source::{AudioSource, FfmpegSourceFactory, SourceFactory, SourceSpec};

pub mod file;

use crossbeam::channel::Sender;

use us_probe::{Frame, ProbeParameters};

/// Message from an acquisition source to the pipeline.
///
/// A source always announces its settings before the first frame, and
/// again whenever they change.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    Settings(ProbeParameters),
    Frame(Frame),
}

/// Common trait for all frame sources (live transport, dataset replay).
pub trait FrameSource: Send {
    /// Start streaming events into the channel.
    /// Runs until the data is exhausted, stop() is called, or the
    /// receiver is dropped.
    fn start(&mut self, tx: Sender<SourceEvent>) -> Result<(), String>;

    /// Signal the source to stop streaming.
    fn stop(&mut self);
}

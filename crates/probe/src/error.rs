use thiserror::Error;

/// Pipeline error taxonomy.
///
/// Everything except a `Configuration` failure on the very first
/// settings message is recovered locally: the frame (or update) is
/// dropped and the pipeline keeps running.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Invalid probe or region parameters. The settings update is
    /// rejected and any previously established geometry is retained.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A frame arrived before any geometry was established.
    #[error("no geometry for frame tagged {settings_id:?}")]
    NoGeometry { settings_id: String },

    /// A frame's settings identifier does not match the geometry it
    /// would be processed against.
    #[error("stale frame: tagged {frame:?}, current geometry {current:?}")]
    StaleFrame { frame: String, current: String },

    /// Bounded in-flight queue is full; the rejected frame is the
    /// newest one (backpressure, not buildup).
    #[error("frame queue full ({capacity} in flight), frame dropped")]
    QueueFull { capacity: usize },

    /// Amplitude min == max while mapping to intensity. The mapper
    /// emits a flat image instead of dividing by zero.
    #[error("degenerate amplitude range while mapping to intensity")]
    DegenerateRange,

    /// A frame's sample buffer does not have the length implied by its
    /// probe parameters.
    #[error("malformed frame: {got} samples, expected {expected}")]
    MalformedFrame { got: usize, expected: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

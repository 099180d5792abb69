pub mod error;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};

/// Acquisition setup for one transducer configuration.
///
/// Arrives as a settings message and is immutable afterwards; a new
/// settings message replaces the whole struct. The `settings_id` is the
/// opaque token that binds frames to the geometry they must be
/// processed against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeParameters {
    pub settings_id: String,
    /// Number of active receive elements (e.g. 128).
    pub element_count: usize,
    /// Samples recorded per channel per transmit event.
    pub samples_per_channel: usize,
    pub sampling_frequency_hz: f32,
    pub central_frequency_hz: f32,
    /// Fixed acoustic-lens delay, in samples.
    #[serde(default)]
    pub lens_correction: f32,
    pub element_pitch_mm: f32,
    /// One steering angle per compounding plane wave, in radians.
    /// A single-angle acquisition uses `[0.0]`.
    #[serde(default)]
    pub steering_angles_rad: Vec<f32>,
}

impl ProbeParameters {
    pub fn angle_count(&self) -> usize {
        self.steering_angles_rad.len()
    }

    /// Lateral position of element `e` in millimeters, centered on the
    /// array midpoint.
    pub fn element_position_mm(&self, e: usize) -> f32 {
        self.element_pitch_mm * (e as f32 - (self.element_count as f32 - 1.0) / 2.0)
    }

    /// Expected `channel_samples` length for a frame captured with
    /// these parameters (interleaved I,Q pairs).
    pub fn expected_frame_len(&self) -> usize {
        self.angle_count() * self.element_count * self.samples_per_channel * 2
    }
}

/// Display/imaging configuration, settable by the user at any time.
///
/// Changing a geometry-affecting field (ranges, speed of sound,
/// f-number) invalidates the current delay table; `gain` and
/// `dynamic_range_db` are read by the display mapper per frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImagingRegion {
    /// Lateral extent in millimeters, (lower, upper).
    pub x_range_mm: (f32, f32),
    /// Axial (depth) extent in millimeters, (lower, upper).
    pub z_range_mm: (f32, f32),
    pub speed_of_sound_mm_s: f32,
    /// Receive aperture ratio; `0.0` disables aperture gating.
    pub f_number: f32,
    /// Additive display gain, in output levels.
    pub gain: f32,
    pub dynamic_range_db: f32,
}

impl Default for ImagingRegion {
    fn default() -> Self {
        Self {
            x_range_mm: (-20.0, 20.0),
            z_range_mm: (5.0, 60.0),
            // 1540 m/s, the usual soft-tissue assumption.
            speed_of_sound_mm_s: 1_540_000.0,
            f_number: 0.0,
            gain: 0.0,
            dynamic_range_db: 60.0,
        }
    }
}

/// One captured frame of raw per-channel I/Q data.
///
/// `channel_samples` is interleaved I,Q pairs as i16, laid out
/// angle-major, then element, then sample:
/// index `((angle * elements + element) * samples + n) * 2`.
#[derive(Debug, Clone)]
pub struct Frame {
    pub settings_id: String,
    pub channel_samples: Vec<i16>,
}

impl Frame {
    /// Offset of the first interleaved I/Q value of channel
    /// `(angle, element)` within `channel_samples`.
    #[inline]
    pub fn sample_base(angle: usize, element: usize, element_count: usize, samples: usize) -> usize {
        ((angle * element_count + element) * samples) * 2
    }
}

/// Where the dynamic-range window is anchored when mapping decibel
/// amplitudes to display levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GainPolicy {
    /// Window the top `dynamic_range_db` dB below the in-frame peak.
    PeakAnchored,
    /// Map upward from the in-frame floor.
    FloorAnchored,
}

/// Final 8-bit grayscale image delivered to the display collaborator.
///
/// Pixel index is `x * height + z` (x-major), matching the complex
/// image vector it was mapped from.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl IntensityImage {
    pub fn flat(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width * height],
        }
    }

    #[inline]
    pub fn at(&self, x: usize, z: usize) -> u8 {
        self.pixels[x * self.height + z]
    }
}

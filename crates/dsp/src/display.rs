use num_complex::Complex32;

use us_probe::{Error, GainPolicy, IntensityImage, Result};

/// Map a complex image vector to the 8-bit display image.
///
/// Fixed stage order (reordering changes the output numerically):
/// magnitude, normalize to `[1, 256]`, convert to decibels, window
/// into `[0, 255]` with `gain` as an additive level offset, clamp,
/// round, truncate to u8.
///
/// A degenerate amplitude range (max == min, e.g. an all-silence
/// frame) produces a flat zero image instead of dividing by zero.
pub fn map_to_intensity(
    image: &[Complex32],
    width: usize,
    height: usize,
    gain: f32,
    dynamic_range_db: f32,
    policy: GainPolicy,
) -> Result<IntensityImage> {
    assert_eq!(
        image.len(),
        width * height,
        "image vector length {} != {}x{}",
        image.len(),
        width,
        height
    );
    if dynamic_range_db <= 0.0 {
        return Err(Error::Configuration(format!(
            "dynamic_range_db must be > 0, got {}",
            dynamic_range_db
        )));
    }

    let amplitude: Vec<f32> = image.iter().map(|c| c.norm()).collect();

    let db = match decibels(&amplitude) {
        Ok(db) => db,
        Err(Error::DegenerateRange) => {
            log::debug!("degenerate amplitude range, emitting flat image");
            return Ok(IntensityImage::flat(width, height, 0));
        }
        Err(e) => return Err(e),
    };

    // Window anchor per policy; db_min is 0 and db_max 20*log10(256)
    // by construction, but both are taken from the data per the
    // re-normalization rule.
    let db_max = db.iter().cloned().fold(f32::MIN, f32::max);
    let db_min = db.iter().cloned().fold(f32::MAX, f32::min);
    let floor = match policy {
        GainPolicy::PeakAnchored => db_max - dynamic_range_db,
        GainPolicy::FloorAnchored => db_min,
    };

    let pixels: Vec<u8> = db
        .iter()
        .map(|&v| {
            let mapped = (v - floor) / dynamic_range_db * 255.0 + gain;
            mapped.clamp(0.0, 255.0).round() as u8
        })
        .collect();

    Ok(IntensityImage {
        width,
        height,
        pixels,
    })
}

/// Normalize amplitudes to `[1, 256]` and convert to decibels
/// (reference = 1, so the result spans `[0, 20*log10(256)]`).
fn decibels(amplitude: &[f32]) -> Result<Vec<f32>> {
    let max = amplitude.iter().cloned().fold(f32::MIN, f32::max);
    let min = amplitude.iter().cloned().fold(f32::MAX, f32::min);
    if max <= min {
        return Err(Error::DegenerateRange);
    }
    let span = max - min;
    Ok(amplitude
        .iter()
        .map(|&a| {
            let scaled = (a - min) / span * 255.0 + 1.0;
            20.0 * scaled.log10()
        })
        .collect())
}

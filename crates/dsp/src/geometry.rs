use num_complex::Complex32;
use std::f64::consts::PI;

use us_probe::{Error, ImagingRegion, ProbeParameters, Result};

/// Output pixel lattice, spaced at lambda/2 in both axes.
///
/// Pixel index is `ix * nz + iz` (x-major), the same ordering the
/// complex image vector and intensity image use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelGrid {
    pub nx: usize,
    pub nz: usize,
    /// Physical position of pixel (0, 0), in millimeters.
    pub x0: f32,
    pub z0: f32,
    /// Grid spacing (lambda/2), in millimeters.
    pub spacing: f32,
}

impl PixelGrid {
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.nx * self.nz
    }

    #[inline]
    pub fn x_at(&self, ix: usize) -> f32 {
        self.x0 + ix as f32 * self.spacing
    }

    #[inline]
    pub fn z_at(&self, iz: usize) -> f32 {
        self.z0 + iz as f32 * self.spacing
    }
}

/// Precomputed round-trip delays and carrier corrections.
///
/// One (pixel x element) plane per steering angle, since the transmit
/// delay depends on the angle. Tagged with the settings identifier of
/// the `ProbeParameters` it was computed from; published as an
/// immutable snapshot and replaced wholesale on any parameter change.
#[derive(Debug, Clone)]
pub struct DelayTable {
    pub settings_id: String,
    pub grid: PixelGrid,
    pub element_count: usize,
    pub angle_count: usize,
    pub samples_per_channel: usize,
    /// Fractional delay in samples, indexed `(angle * pixels + pixel) * elements + element`.
    /// Aperture-gated taps hold `f32::INFINITY` and contribute silence.
    pub(crate) delays: Vec<f32>,
    /// Unit carrier correction, same indexing.
    pub(crate) phases: Vec<Complex32>,
}

impl DelayTable {
    #[inline]
    fn idx(&self, angle: usize, pixel: usize, element: usize) -> usize {
        (angle * self.grid.pixel_count() + pixel) * self.element_count + element
    }

    #[inline]
    pub fn delay(&self, angle: usize, pixel: usize, element: usize) -> f32 {
        self.delays[self.idx(angle, pixel, element)]
    }

    #[inline]
    pub fn phase(&self, angle: usize, pixel: usize, element: usize) -> Complex32 {
        self.phases[self.idx(angle, pixel, element)]
    }
}

fn validate(probe: &ProbeParameters, region: &ImagingRegion) -> Result<()> {
    let bad = |msg: String| Err(Error::Configuration(msg));
    if probe.element_count == 0 {
        return bad("element_count must be > 0".into());
    }
    if probe.samples_per_channel == 0 {
        return bad("samples_per_channel must be > 0".into());
    }
    if probe.sampling_frequency_hz <= 0.0 {
        return bad(format!(
            "sampling_frequency_hz must be > 0, got {}",
            probe.sampling_frequency_hz
        ));
    }
    if probe.central_frequency_hz <= 0.0 {
        return bad(format!(
            "central_frequency_hz must be > 0, got {}",
            probe.central_frequency_hz
        ));
    }
    if probe.element_pitch_mm <= 0.0 {
        return bad(format!(
            "element_pitch_mm must be > 0, got {}",
            probe.element_pitch_mm
        ));
    }
    if probe.steering_angles_rad.is_empty() {
        return bad("at least one steering angle required".into());
    }
    if region.speed_of_sound_mm_s <= 0.0 {
        return bad(format!(
            "speed_of_sound_mm_s must be > 0, got {}",
            region.speed_of_sound_mm_s
        ));
    }
    if region.x_range_mm.1 <= region.x_range_mm.0 {
        return bad(format!("empty x range {:?}", region.x_range_mm));
    }
    if region.z_range_mm.1 <= region.z_range_mm.0 {
        return bad(format!("empty z range {:?}", region.z_range_mm));
    }
    Ok(())
}

/// Compute the per-(angle, pixel, element) delay table for one
/// (probe, region) snapshot.
///
/// Pure function of its inputs: the same inputs always produce a
/// bit-for-bit identical table. All intermediate math is f64 and
/// truncated to f32 once, on store.
pub fn compute_delay_table(probe: &ProbeParameters, region: &ImagingRegion) -> Result<DelayTable> {
    validate(probe, region)?;

    let c = region.speed_of_sound_mm_s as f64;
    let f0 = probe.central_frequency_hz as f64;
    let fs = probe.sampling_frequency_hz as f64;
    let lens = probe.lens_correction as f64;

    let lambda = c / f0;
    let spacing = lambda / 2.0;
    let x_extent = (region.x_range_mm.1 - region.x_range_mm.0) as f64;
    let z_extent = (region.z_range_mm.1 - region.z_range_mm.0) as f64;
    let nx = (x_extent / spacing).round() as usize;
    let nz = (z_extent / spacing).round() as usize;
    if nx == 0 || nz == 0 {
        return Err(Error::Configuration(format!(
            "pixel grid degenerates to {}x{} for spacing {:.4} mm",
            nx, nz, spacing
        )));
    }

    let grid = PixelGrid {
        nx,
        nz,
        x0: region.x_range_mm.0,
        z0: region.z_range_mm.0,
        spacing: spacing as f32,
    };

    let elements = probe.element_count;
    let angles = probe.angle_count();
    let pixels = grid.pixel_count();
    let mut delays = vec![0.0f32; angles * pixels * elements];
    let mut phases = vec![Complex32::new(0.0, 0.0); angles * pixels * elements];

    // Half-aperture limit per unit depth; <= 0 disables gating.
    let half_aperture = if region.f_number > 0.0 {
        Some(1.0 / (2.0 * region.f_number as f64))
    } else {
        None
    };

    let element_pos: Vec<f64> = (0..elements)
        .map(|e| probe.element_position_mm(e) as f64)
        .collect();

    for (a, &angle) in probe.steering_angles_rad.iter().enumerate() {
        let (sin_a, cos_a) = (angle as f64).sin_cos();
        for ix in 0..nx {
            let x = region.x_range_mm.0 as f64 + ix as f64 * spacing;
            for iz in 0..nz {
                let z = region.z_range_mm.0 as f64 + iz as f64 * spacing;
                let px = ix * nz + iz;
                let tx_delay = (z * cos_a + x * sin_a) / c;
                let base = (a * pixels + px) * elements;
                for (e, &xe) in element_pos.iter().enumerate() {
                    if let Some(h) = half_aperture {
                        if (x - xe).abs() > z * h {
                            // Outside the receive aperture: silent tap.
                            delays[base + e] = f32::INFINITY;
                            continue;
                        }
                    }
                    let dx = x - xe;
                    let rx_delay = (z * z + dx * dx).sqrt() / c;
                    let d = (tx_delay + rx_delay) * fs + lens;
                    let phi = -2.0 * PI * f0 * d / fs;
                    delays[base + e] = d as f32;
                    phases[base + e] = Complex32::new(phi.cos() as f32, phi.sin() as f32);
                }
            }
        }
    }

    log::debug!(
        "delay table for {:?}: {}x{} pixels, {} elements, {} angles",
        probe.settings_id,
        nx,
        nz,
        elements,
        angles
    );

    Ok(DelayTable {
        settings_id: probe.settings_id.clone(),
        grid,
        element_count: elements,
        angle_count: angles,
        samples_per_channel: probe.samples_per_channel,
        delays,
        phases,
    })
}

use num_complex::Complex32;
use rayon::prelude::*;

use crate::geometry::DelayTable;
use us_probe::{Error, Frame, ProbeParameters, Result};

/// Coherent delay-and-sum over all elements and transmit angles.
///
/// For each pixel, every (angle, element) channel is sampled at its
/// precomputed fractional delay with linear interpolation, rotated by
/// the carrier correction and accumulated. Taps whose index falls
/// outside `[0, samples_per_channel)` read as exactly zero; no
/// wraparound, no edge clamping.
///
/// Pixels are independent, so the outer loop parallelizes per pixel.
pub fn beamform(
    frame: &Frame,
    table: &DelayTable,
    probe: &ProbeParameters,
) -> Result<Vec<Complex32>> {
    if frame.settings_id != table.settings_id || frame.settings_id != probe.settings_id {
        return Err(Error::StaleFrame {
            frame: frame.settings_id.clone(),
            current: table.settings_id.clone(),
        });
    }
    let expected = probe.expected_frame_len();
    if frame.channel_samples.len() != expected {
        return Err(Error::MalformedFrame {
            got: frame.channel_samples.len(),
            expected,
        });
    }

    let samples = &frame.channel_samples;
    let s = table.samples_per_channel;
    let elements = table.element_count;
    let angles = table.angle_count;
    let pixels = table.grid.pixel_count();

    let image: Vec<Complex32> = (0..pixels)
        .into_par_iter()
        .map(|px| {
            let mut acc = Complex32::new(0.0, 0.0);
            for a in 0..angles {
                for e in 0..elements {
                    let d = table.delay(a, px, e);
                    if !d.is_finite() {
                        continue; // aperture-gated tap
                    }
                    let n0 = d.floor();
                    let n1 = d.ceil();
                    let alpha = n1 - d;
                    let base = Frame::sample_base(a, e, elements, s);
                    let lo = fetch(samples, base, n0, s);
                    let hi = fetch(samples, base, n1, s);
                    let interp = lo * alpha + hi * (1.0 - alpha);
                    acc += interp * table.phase(a, px, e);
                }
            }
            acc
        })
        .collect();

    Ok(image)
}

/// Complex sample at integer tap `n`, or zero if `n` is outside
/// `[0, samples_per_channel)`.
#[inline]
fn fetch(samples: &[i16], base: usize, n: f32, samples_per_channel: usize) -> Complex32 {
    if n < 0.0 || n >= samples_per_channel as f32 {
        return Complex32::new(0.0, 0.0);
    }
    let i = base + n as usize * 2;
    Complex32::new(samples[i] as f32, samples[i + 1] as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PixelGrid;

    /// Hand-built one-angle table over a 1x`npx` grid.
    fn table(delays: Vec<f32>, phases: Vec<Complex32>, elements: usize, s: usize) -> DelayTable {
        let pixels = delays.len() / elements;
        DelayTable {
            settings_id: "t".into(),
            grid: PixelGrid {
                nx: pixels,
                nz: 1,
                x0: 0.0,
                z0: 0.0,
                spacing: 0.1,
            },
            element_count: elements,
            angle_count: 1,
            samples_per_channel: s,
            delays,
            phases,
        }
    }

    fn probe(elements: usize, s: usize) -> ProbeParameters {
        ProbeParameters {
            settings_id: "t".into(),
            element_count: elements,
            samples_per_channel: s,
            sampling_frequency_hz: 1.0,
            central_frequency_hz: 1.0,
            lens_correction: 0.0,
            element_pitch_mm: 0.3,
            steering_angles_rad: vec![0.0],
        }
    }

    /// One channel whose I samples are the ramp 0, 1, 2, ... (Q = 0).
    fn ramp_frame(s: usize) -> Frame {
        let mut data = Vec::with_capacity(s * 2);
        for n in 0..s {
            data.push(n as i16);
            data.push(0);
        }
        Frame {
            settings_id: "t".into(),
            channel_samples: data,
        }
    }

    fn one() -> Complex32 {
        Complex32::new(1.0, 0.0)
    }

    #[test]
    fn fractional_delay_interpolates_linearly() {
        let t = table(vec![2.5], vec![one()], 1, 8);
        let img = beamform(&ramp_frame(8), &t, &probe(1, 8)).unwrap();
        // alpha = ceil(2.5) - 2.5 = 0.5 -> 0.5 * s[2] + 0.5 * s[3]
        assert!((img[0].re - 2.5).abs() < 1e-6, "got {}", img[0].re);
        assert!(img[0].im.abs() < 1e-6);
    }

    #[test]
    fn integer_delay_hits_single_tap() {
        let t = table(vec![3.0], vec![one()], 1, 8);
        let img = beamform(&ramp_frame(8), &t, &probe(1, 8)).unwrap();
        assert!((img[0].re - 3.0).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_taps_read_as_zero() {
        for d in [-4.0, -1.5, 8.0, 8.5, 100.0, f32::INFINITY] {
            let t = table(vec![d], vec![one()], 1, 8);
            let img = beamform(&ramp_frame(8), &t, &probe(1, 8)).unwrap();
            assert_eq!(img[0], Complex32::new(0.0, 0.0), "delay {} leaked", d);
        }
    }

    #[test]
    fn straddling_delay_takes_only_the_in_range_tap() {
        // floor(7.5) = 7 is the last valid sample, ceil = 8 is out.
        let t = table(vec![7.5], vec![one()], 1, 8);
        let img = beamform(&ramp_frame(8), &t, &probe(1, 8)).unwrap();
        assert!((img[0].re - 3.5).abs() < 1e-6, "got {}", img[0].re);

        // floor(-0.5) = -1 is out, ceil = 0 contributes (1 - alpha) = 0.5.
        let mut f = ramp_frame(8);
        f.channel_samples[0] = 4; // s[0] = 4
        let t = table(vec![-0.5], vec![one()], 1, 8);
        let img = beamform(&f, &t, &probe(1, 8)).unwrap();
        assert!((img[0].re - 2.0).abs() < 1e-6, "got {}", img[0].re);
    }

    #[test]
    fn carrier_correction_rotates_the_sample() {
        let j = Complex32::new(0.0, 1.0);
        let t = table(vec![2.0], vec![j], 1, 8);
        let img = beamform(&ramp_frame(8), &t, &probe(1, 8)).unwrap();
        assert!(img[0].re.abs() < 1e-6);
        assert!((img[0].im - 2.0).abs() < 1e-6);
    }

    #[test]
    fn contributions_sum_across_elements() {
        // Two identical channels, same delay: amplitude doubles.
        let mut data = Vec::new();
        for _ in 0..2 {
            for n in 0..8i16 {
                data.push(n);
                data.push(0);
            }
        }
        let f = Frame {
            settings_id: "t".into(),
            channel_samples: data,
        };
        let t = table(vec![3.0, 3.0], vec![one(), one()], 2, 8);
        let img = beamform(&f, &t, &probe(2, 8)).unwrap();
        assert!((img[0].re - 6.0).abs() < 1e-6);
    }

    #[test]
    fn zero_frame_yields_exactly_zero_image() {
        let t = table(vec![2.5, 4.0, 6.5], vec![one(), one(), one()], 1, 8);
        let f = Frame {
            settings_id: "t".into(),
            channel_samples: vec![0; 16],
        };
        let img = beamform(&f, &t, &probe(1, 8)).unwrap();
        assert!(img.iter().all(|c| c.re == 0.0 && c.im == 0.0));
    }

    #[test]
    fn stale_settings_id_is_rejected() {
        let t = table(vec![2.0], vec![one()], 1, 8);
        let mut f = ramp_frame(8);
        f.settings_id = "other".into();
        match beamform(&f, &t, &probe(1, 8)) {
            Err(Error::StaleFrame { frame, current }) => {
                assert_eq!(frame, "other");
                assert_eq!(current, "t");
            }
            other => panic!("expected StaleFrame, got {:?}", other),
        }
    }

    #[test]
    fn wrong_sample_count_is_rejected() {
        let t = table(vec![2.0], vec![one()], 1, 8);
        let f = Frame {
            settings_id: "t".into(),
            channel_samples: vec![0; 10],
        };
        assert!(matches!(
            beamform(&f, &t, &probe(1, 8)),
            Err(Error::MalformedFrame { got: 10, expected: 16 })
        ));
    }
}

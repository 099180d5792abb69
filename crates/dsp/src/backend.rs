use num_complex::Complex32;

use crate::{beamform, compute_delay_table, DelayTable};
use us_probe::{Frame, ImagingRegion, ProbeParameters, Result};

/// Compute capability behind the coordinator.
///
/// The coordinator depends only on this trait; a GPU dispatch variant
/// would implement the same two operations over device buffers.
pub trait BeamformingBackend: Send + Sync {
    fn compute_delay_table(
        &self,
        probe: &ProbeParameters,
        region: &ImagingRegion,
    ) -> Result<DelayTable>;

    fn beamform(
        &self,
        frame: &Frame,
        table: &DelayTable,
        probe: &ProbeParameters,
    ) -> Result<Vec<Complex32>>;
}

/// CPU backend: rayon-parallel per-pixel delay-and-sum.
#[derive(Debug, Default)]
pub struct CpuBackend;

impl BeamformingBackend for CpuBackend {
    fn compute_delay_table(
        &self,
        probe: &ProbeParameters,
        region: &ImagingRegion,
    ) -> Result<DelayTable> {
        compute_delay_table(probe, region)
    }

    fn beamform(
        &self,
        frame: &Frame,
        table: &DelayTable,
        probe: &ProbeParameters,
    ) -> Result<Vec<Complex32>> {
        beamform(frame, table, probe)
    }
}

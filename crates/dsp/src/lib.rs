pub mod backend;
pub mod beamform;
pub mod display;
pub mod geometry;

pub use backend::{BeamformingBackend, CpuBackend};
pub use beamform::beamform;
pub use display::map_to_intensity;
pub use geometry::{compute_delay_table, DelayTable, PixelGrid};

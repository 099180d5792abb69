//! Frame/settings coordinator.
//!
//! Owns the relationship between settings updates and queued frames:
//! frames travel through a bounded channel to a worker thread, which
//! takes an immutable snapshot of (probe, delay table, region) per
//! frame and beamforms against it. Settings and region changes publish
//! new snapshots; a table is never mutated while a frame may be
//! reading it, and a frame already dequeued finishes against the
//! snapshot it was dequeued with.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use us_dsp::display::map_to_intensity;
use us_dsp::{BeamformingBackend, DelayTable};
use us_probe::{
    Error, Frame, GainPolicy, ImagingRegion, IntensityImage, ProbeParameters, Result,
};

/// Delivered for every beamformed frame, with the compute time spent
/// on it (beamforming + display mapping).
pub type FrameCallback = Box<dyn FnMut(IntensityImage, Duration) + Send>;

/// Delivered when a geometry recomputation changes the pixel-grid
/// dimensions; arguments are (width, height).
pub type ViewportCallback = Box<dyn FnMut(usize, usize) + Send>;

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Maximum frames in flight; enqueueing beyond this drops the
    /// newest frame.
    pub queue_capacity: usize,
    pub gain_policy: GainPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4,
            gain_policy: GainPolicy::PeakAnchored,
        }
    }
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    dropped_no_geometry: AtomicU64,
    dropped_stale: AtomicU64,
    dropped_queue_full: AtomicU64,
    failed: AtomicU64,
}

/// Telemetry snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    pub processed: u64,
    pub dropped_no_geometry: u64,
    pub dropped_stale: u64,
    pub dropped_queue_full: u64,
    pub failed: u64,
}

/// What the worker snapshots per frame. Replaced wholesale on any
/// settings/region change; never mutated mid-use.
struct Published {
    probe: Option<Arc<ProbeParameters>>,
    table: Option<Arc<DelayTable>>,
    region: ImagingRegion,
}

pub struct Engine {
    shared: Arc<Mutex<Published>>,
    backend: Arc<dyn BeamformingBackend>,
    tx: Option<Sender<Frame>>,
    worker: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    counters: Arc<Counters>,
    on_viewport: Option<ViewportCallback>,
    queue_capacity: usize,
}

impl Engine {
    pub fn new(
        backend: Arc<dyn BeamformingBackend>,
        region: ImagingRegion,
        config: EngineConfig,
        on_frame: FrameCallback,
    ) -> Self {
        let shared = Arc::new(Mutex::new(Published {
            probe: None,
            table: None,
            region,
        }));
        let stop = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());
        let (tx, rx) = channel::bounded(config.queue_capacity);

        let worker = {
            let shared = Arc::clone(&shared);
            let backend = Arc::clone(&backend);
            let stop = Arc::clone(&stop);
            let counters = Arc::clone(&counters);
            let policy = config.gain_policy;
            std::thread::spawn(move || {
                worker_loop(rx, shared, backend, stop, counters, on_frame, policy)
            })
        };

        Self {
            shared,
            backend,
            tx: Some(tx),
            worker: Some(worker),
            stop,
            counters,
            on_viewport: None,
            queue_capacity: config.queue_capacity,
        }
    }

    pub fn set_viewport_callback(&mut self, cb: ViewportCallback) {
        self.on_viewport = Some(cb);
    }

    /// Install a new probe configuration and recompute the geometry
    /// for it. On failure the previous geometry (if any) is retained
    /// and keeps serving matching frames.
    pub fn update_settings(&mut self, probe: ProbeParameters) -> Result<()> {
        let region = self.shared.lock().unwrap().region;
        let table = self.backend.compute_delay_table(&probe, &region)?;
        log::info!(
            "geometry ready for {:?}: {}x{} pixels",
            probe.settings_id,
            table.grid.nx,
            table.grid.nz
        );
        self.publish(probe, table);
        Ok(())
    }

    fn publish(&mut self, probe: ProbeParameters, table: DelayTable) {
        let dims = (table.grid.nx, table.grid.nz);
        let changed = {
            let mut g = self.shared.lock().unwrap();
            let prev = g.table.as_ref().map(|t| (t.grid.nx, t.grid.nz));
            g.probe = Some(Arc::new(probe));
            g.table = Some(Arc::new(table));
            prev != Some(dims)
        };
        if changed {
            if let Some(cb) = &mut self.on_viewport {
                cb(dims.0, dims.1);
            }
        }
    }

    /// Mutate the imaging region. Geometry-affecting edits recompute
    /// the delay table against the current probe; if recomputation
    /// fails, the edit is rolled back.
    fn edit_region(
        &mut self,
        affects_geometry: bool,
        edit: impl FnOnce(&mut ImagingRegion),
    ) -> Result<()> {
        let (old, probe, region) = {
            let mut g = self.shared.lock().unwrap();
            let old = g.region;
            edit(&mut g.region);
            (old, g.probe.clone(), g.region)
        };
        if !affects_geometry {
            return Ok(());
        }
        let Some(probe) = probe else {
            return Ok(()); // no geometry yet, nothing to recompute
        };
        match self.backend.compute_delay_table(&probe, &region) {
            Ok(table) => {
                self.publish((*probe).clone(), table);
                Ok(())
            }
            Err(e) => {
                self.shared.lock().unwrap().region = old;
                log::warn!("region edit rejected: {}", e);
                Err(e)
            }
        }
    }

    pub fn set_x_range(&mut self, lower_mm: f32, upper_mm: f32) -> Result<()> {
        self.edit_region(true, |r| r.x_range_mm = (lower_mm, upper_mm))
    }

    pub fn set_z_range(&mut self, lower_mm: f32, upper_mm: f32) -> Result<()> {
        self.edit_region(true, |r| r.z_range_mm = (lower_mm, upper_mm))
    }

    pub fn set_speed_of_sound(&mut self, mm_per_s: f32) -> Result<()> {
        self.edit_region(true, |r| r.speed_of_sound_mm_s = mm_per_s)
    }

    pub fn set_f_number(&mut self, f_number: f32) -> Result<()> {
        self.edit_region(true, |r| r.f_number = f_number)
    }

    pub fn set_gain(&mut self, gain: f32) {
        let _ = self.edit_region(false, |r| r.gain = gain);
    }

    pub fn set_dynamic_range(&mut self, db: f32) -> Result<()> {
        if db <= 0.0 {
            return Err(Error::Configuration(format!(
                "dynamic_range_db must be > 0, got {}",
                db
            )));
        }
        self.edit_region(false, |r| r.dynamic_range_db = db)
    }

    pub fn region(&self) -> ImagingRegion {
        self.shared.lock().unwrap().region
    }

    /// Hand a frame to the pipeline. Rejections are per-frame and
    /// non-fatal: `NoGeometry` before the first settings message,
    /// `QueueFull` when all in-flight slots are taken (the newest
    /// frame, i.e. this one, is the one dropped).
    pub fn enqueue_frame(&self, frame: Frame) -> Result<()> {
        if self.shared.lock().unwrap().table.is_none() {
            self.counters
                .dropped_no_geometry
                .fetch_add(1, Ordering::Relaxed);
            return Err(Error::NoGeometry {
                settings_id: frame.settings_id,
            });
        }
        let Some(tx) = &self.tx else {
            return Err(Error::Configuration("engine is shut down".into()));
        };
        match tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.counters
                    .dropped_queue_full
                    .fetch_add(1, Ordering::Relaxed);
                Err(Error::QueueFull {
                    capacity: self.queue_capacity,
                })
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(Error::Configuration("engine worker is gone".into()))
            }
        }
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            dropped_no_geometry: self.counters.dropped_no_geometry.load(Ordering::Relaxed),
            dropped_stale: self.counters.dropped_stale.load(Ordering::Relaxed),
            dropped_queue_full: self.counters.dropped_queue_full.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Finish every queued frame, then stop the worker.
    pub fn drain(mut self) -> EngineStats {
        self.close(false);
        self.stats()
    }

    /// Stop now: queued-but-unstarted frames are discarded; a frame
    /// already being computed runs to completion.
    pub fn shutdown(mut self) -> EngineStats {
        self.close(true);
        self.stats()
    }

    fn close(&mut self, cancel: bool) {
        if cancel {
            self.stop.store(true, Ordering::SeqCst);
        }
        self.tx = None; // closes the channel, worker loop ends
        if let Some(h) = self.worker.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.close(true);
    }
}

fn worker_loop(
    rx: Receiver<Frame>,
    shared: Arc<Mutex<Published>>,
    backend: Arc<dyn BeamformingBackend>,
    stop: Arc<AtomicBool>,
    counters: Arc<Counters>,
    mut on_frame: FrameCallback,
    policy: GainPolicy,
) {
    for frame in rx.iter() {
        if stop.load(Ordering::SeqCst) {
            continue; // canceled: discard the backlog
        }
        let (probe, table, region) = {
            let g = shared.lock().unwrap();
            (g.probe.clone(), g.table.clone(), g.region)
        };
        let (Some(probe), Some(table)) = (probe, table) else {
            counters.dropped_no_geometry.fetch_add(1, Ordering::Relaxed);
            continue;
        };
        if frame.settings_id != table.settings_id {
            counters.dropped_stale.fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "dropping stale frame {:?} (current geometry {:?})",
                frame.settings_id,
                table.settings_id
            );
            continue;
        }

        let started = Instant::now();
        let image = match backend.beamform(&frame, &table, &probe) {
            Ok(v) => v,
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("beamforming failed: {}", e);
                continue;
            }
        };
        let intensity = match map_to_intensity(
            &image,
            table.grid.nx,
            table.grid.nz,
            region.gain,
            region.dynamic_range_db,
            policy,
        ) {
            Ok(img) => img,
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("display mapping failed: {}", e);
                continue;
            }
        };

        counters.processed.fetch_add(1, Ordering::Relaxed);
        on_frame(intensity, started.elapsed());
    }
}

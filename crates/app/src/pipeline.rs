use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam::channel;

use us_acq::file::FileSource;
use us_acq::{FrameSource, SourceEvent};
use us_dsp::CpuBackend;
use us_engine::{Engine, EngineConfig};
use us_output::PngWriter;
use us_probe::{Error, GainPolicy, ImagingRegion, ProbeParameters};

#[derive(Default)]
struct Telemetry {
    frames: u64,
    total_compute: Duration,
    last_compute: Duration,
}

/// Run the full pipeline from a raw I/Q file to per-frame PNGs.
pub fn run_file(
    settings_path: &Path,
    input_path: &Path,
    out_dir: &Path,
    region: ImagingRegion,
    policy: GainPolicy,
    queue_capacity: usize,
    print_stats: bool,
) -> Result<(), String> {
    let json = std::fs::read_to_string(settings_path)
        .map_err(|e| format!("failed to read {}: {}", settings_path.display(), e))?;
    let mut probe: ProbeParameters = serde_json::from_str(&json)
        .map_err(|e| format!("bad settings file {}: {}", settings_path.display(), e))?;
    if probe.steering_angles_rad.is_empty() {
        probe.steering_angles_rad.push(0.0); // single-angle imaging
    }

    let mut writer = PngWriter::new(out_dir)
        .map_err(|e| format!("failed to create {}: {}", out_dir.display(), e))?;
    let telemetry = Arc::new(Mutex::new(Telemetry::default()));

    let mut engine = Engine::new(
        Arc::new(CpuBackend),
        region,
        EngineConfig {
            queue_capacity,
            gain_policy: policy,
        },
        Box::new({
            let telemetry = Arc::clone(&telemetry);
            move |img, compute_time| {
                if let Err(e) = writer.write(&img) {
                    log::error!("failed to write frame: {}", e);
                }
                let mut t = telemetry.lock().unwrap();
                t.frames += 1;
                t.total_compute += compute_time;
                t.last_compute = compute_time;
            }
        }),
    );
    engine.set_viewport_callback(Box::new(|w, h| {
        log::info!("viewport: {}x{} pixels", w, h);
    }));

    let (tx, rx) = channel::bounded(8);
    let mut source = FileSource::new(input_path.to_string_lossy(), probe);
    let reader_thread = std::thread::spawn(move || {
        if let Err(e) = source.start(tx) {
            log::error!("file reader error: {}", e);
        }
    });

    let run_start = Instant::now();
    let mut last_stats = Instant::now();

    for event in rx.iter() {
        match event {
            SourceEvent::Settings(p) => {
                // A configuration failure with no prior geometry is the
                // one fatal case: nothing can ever be processed.
                engine
                    .update_settings(p)
                    .map_err(|e| format!("settings rejected: {}", e))?;
            }
            SourceEvent::Frame(frame) => match engine.enqueue_frame(frame) {
                Ok(()) => {}
                Err(Error::QueueFull { .. }) => {
                    log::debug!("queue full, dropped newest frame");
                }
                Err(e) => log::warn!("frame rejected: {}", e),
            },
        }

        if print_stats && last_stats.elapsed().as_secs() >= 5 {
            let stats = engine.stats();
            let t = telemetry.lock().unwrap();
            eprintln!(
                "[{:.1}s] frames: {} dropped: {} (stale {}, full {}) last compute: {:.2} ms",
                run_start.elapsed().as_secs_f64(),
                t.frames,
                stats.dropped_stale + stats.dropped_queue_full + stats.dropped_no_geometry,
                stats.dropped_stale,
                stats.dropped_queue_full,
                t.last_compute.as_secs_f64() * 1000.0,
            );
            last_stats = Instant::now();
        }
    }

    let _ = reader_thread.join();
    let stats = engine.drain();

    if print_stats {
        let t = telemetry.lock().unwrap();
        let mean_ms = if t.frames > 0 {
            t.total_compute.as_secs_f64() * 1000.0 / t.frames as f64
        } else {
            0.0
        };
        eprintln!(
            "done ({:.1}s): {} frames, {:.2} ms/frame mean, dropped: stale {} full {} no-geometry {} failed {}",
            run_start.elapsed().as_secs_f64(),
            t.frames,
            mean_ms,
            stats.dropped_stale,
            stats.dropped_queue_full,
            stats.dropped_no_geometry,
            stats.failed,
        );
    }

    Ok(())
}

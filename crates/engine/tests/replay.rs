//! End-to-end replay: raw I/Q file -> FileSource -> Engine -> images.

use std::io::Write;
use std::sync::{mpsc, Arc};

use crossbeam::channel;

use us_acq::file::FileSource;
use us_acq::{FrameSource, SourceEvent};
use us_dsp::CpuBackend;
use us_engine::{Engine, EngineConfig};
use us_probe::{ImagingRegion, ProbeParameters};

fn probe() -> ProbeParameters {
    ProbeParameters {
        settings_id: "replay".into(),
        element_count: 2,
        samples_per_channel: 16,
        sampling_frequency_hz: 1_000_000.0,
        central_frequency_hz: 1_000_000.0,
        lens_correction: 0.0,
        element_pitch_mm: 0.3,
        steering_angles_rad: vec![0.0],
    }
}

/// lambda = 1.54 mm -> 0.77 mm spacing -> 2x2 grid; round-trip delays
/// land inside the 16-sample channel window.
fn region() -> ImagingRegion {
    ImagingRegion {
        x_range_mm: (0.0, 1.54),
        z_range_mm: (0.77, 2.31),
        speed_of_sound_mm_s: 1_540_000.0,
        f_number: 0.0,
        gain: 0.0,
        dynamic_range_db: 60.0,
    }
}

#[test]
fn file_replay_produces_one_image_per_frame() {
    // 2 elements x 16 samples x 2 = 64 values per frame; three frames
    // with varying content plus a partial tail that must be dropped.
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for v in 0..(3 * 64 + 10) as i32 {
        file.write_all(&((v % 251) as i16).to_le_bytes()).unwrap();
    }
    file.flush().unwrap();

    let (img_tx, img_rx) = mpsc::channel();
    let mut engine = Engine::new(
        Arc::new(CpuBackend),
        region(),
        EngineConfig::default(),
        Box::new(move |img, _compute_time| {
            img_tx.send(img).unwrap();
        }),
    );

    let (tx, rx) = channel::bounded(8);
    let mut source = FileSource::new(file.path().to_string_lossy(), probe());
    let reader = std::thread::spawn(move || source.start(tx).unwrap());

    for event in rx.iter() {
        match event {
            SourceEvent::Settings(p) => engine.update_settings(p).unwrap(),
            SourceEvent::Frame(f) => engine.enqueue_frame(f).unwrap(),
        }
    }
    reader.join().unwrap();

    let stats = engine.drain();
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.dropped_stale, 0);
    assert_eq!(stats.failed, 0);

    let images: Vec<_> = img_rx.try_iter().collect();
    assert_eq!(images.len(), 3);
    for img in &images {
        assert_eq!(img.width, 2);
        assert_eq!(img.height, 2);
        assert_eq!(img.pixels.len(), 4);
    }
}

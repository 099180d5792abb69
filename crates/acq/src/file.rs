use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crossbeam::channel::Sender;

use crate::{FrameSource, SourceEvent};
use us_probe::{Frame, ProbeParameters};

/// Dataset replay source: reads raw little-endian interleaved i16 I/Q
/// samples from a file and emits one frame per complete
/// `angles * elements * samples * 2` block of values, preceded by a
/// single settings event.
pub struct FileSource {
    path: String,
    probe: ProbeParameters,
    running: bool,
}

impl FileSource {
    pub fn new(path: impl Into<String>, probe: ProbeParameters) -> Self {
        Self {
            path: path.into(),
            probe,
            running: false,
        }
    }

    /// Read one frame-sized block. Returns `Ok(None)` at end of file;
    /// a trailing partial block is discarded.
    fn read_frame(reader: &mut BufReader<File>, values: usize) -> std::io::Result<Option<Vec<i16>>> {
        let mut buf = vec![0u8; values * 2];
        let mut filled = 0;
        while filled < buf.len() {
            let n = reader.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < buf.len() {
            log::warn!("discarding trailing partial frame ({} of {} bytes)", filled, buf.len());
            return Ok(None);
        }
        let mut out = Vec::with_capacity(values);
        for pair in buf.chunks_exact(2) {
            out.push(i16::from_le_bytes([pair[0], pair[1]]));
        }
        Ok(Some(out))
    }
}

impl FrameSource for FileSource {
    fn start(&mut self, tx: Sender<SourceEvent>) -> Result<(), String> {
        let path = Path::new(&self.path);
        let file = File::open(path).map_err(|e| format!("failed to open {}: {}", self.path, e))?;
        let mut reader = BufReader::with_capacity(1024 * 1024, file);

        let values = self.probe.expected_frame_len();
        if values == 0 {
            return Err(format!("probe {:?} implies empty frames", self.probe.settings_id));
        }

        self.running = true;
        log::info!(
            "replaying {} ({} elements, {} samples/ch, {} angles)",
            self.path,
            self.probe.element_count,
            self.probe.samples_per_channel,
            self.probe.angle_count()
        );

        if tx.send(SourceEvent::Settings(self.probe.clone())).is_err() {
            return Ok(()); // receiver dropped before we started
        }

        let mut frames = 0u64;
        while self.running {
            match Self::read_frame(&mut reader, values) {
                Ok(Some(samples)) => {
                    let frame = Frame {
                        settings_id: self.probe.settings_id.clone(),
                        channel_samples: samples,
                    };
                    if tx.send(SourceEvent::Frame(frame)).is_err() {
                        break; // receiver dropped
                    }
                    frames += 1;
                }
                Ok(None) => {
                    log::info!("end of file: {} ({} frames)", self.path, frames);
                    break;
                }
                Err(e) => {
                    return Err(format!("read error: {}", e));
                }
            }
        }

        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }
}

use std::io;
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};

use us_probe::IntensityImage;

/// Writes each intensity image as a numbered grayscale PNG
/// (`frame_000000.png`, ...) into an output directory.
pub struct PngWriter {
    dir: PathBuf,
    count: u64,
}

impl PngWriter {
    /// Create the writer, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, count: 0 })
    }

    /// Materialize one image. Pixel index is `x * height + z`, so x is
    /// the horizontal (lateral) axis and z the vertical (depth) axis.
    pub fn write(&mut self, image: &IntensityImage) -> io::Result<PathBuf> {
        let mut img = GrayImage::new(image.width as u32, image.height as u32);
        for x in 0..image.width {
            for z in 0..image.height {
                img.put_pixel(x as u32, z as u32, Luma([image.at(x, z)]));
            }
        }
        let path = self.dir.join(format!("frame_{:06}.png", self.count));
        img.save(&path)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        self.count += 1;
        log::debug!("wrote {}", path.display());
        Ok(path)
    }

    pub fn frames_written(&self) -> u64 {
        self.count
    }
}

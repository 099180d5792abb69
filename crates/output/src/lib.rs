pub mod png;

pub use png::PngWriter;

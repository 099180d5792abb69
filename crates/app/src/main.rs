mod pipeline;

use clap::Parser;
use std::path::PathBuf;

use us_probe::GainPolicy;

#[derive(Parser, Debug)]
#[command(name = "bmode")]
#[command(about = "Ultrasound B-mode delay-and-sum beamformer (file replay)")]
struct Cli {
    /// Probe settings JSON file
    #[arg(short = 'p', long)]
    settings: PathBuf,

    /// Raw I/Q input file (interleaved little-endian i16)
    #[arg(short = 'f', long)]
    input: PathBuf,

    /// Directory for per-frame PNG output
    #[arg(short = 'o', long, default_value = "frames")]
    out_dir: PathBuf,

    /// Lateral image range lower bound in mm
    #[arg(long, default_value = "-20", allow_hyphen_values = true)]
    x_min: f32,

    /// Lateral image range upper bound in mm
    #[arg(long, default_value = "20")]
    x_max: f32,

    /// Depth image range lower bound in mm
    #[arg(long, default_value = "5")]
    z_min: f32,

    /// Depth image range upper bound in mm
    #[arg(long, default_value = "60")]
    z_max: f32,

    /// Speed of sound in mm/s
    #[arg(long, default_value = "1540000")]
    speed_of_sound: f32,

    /// Receive f-number (0 disables aperture gating)
    #[arg(long, default_value = "0")]
    f_number: f32,

    /// Display gain in output levels
    #[arg(short = 'g', long, default_value = "0")]
    gain: f32,

    /// Dynamic range in dB
    #[arg(short = 'd', long, default_value = "60")]
    dynamic_range: f32,

    /// Dynamic-range window anchor: peak, floor
    #[arg(long, default_value = "peak")]
    gain_policy: String,

    /// Frames in flight before drop-newest backpressure
    #[arg(long, default_value = "4")]
    queue_capacity: usize,

    /// Print statistics
    #[arg(long)]
    stats: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let policy = match cli.gain_policy.as_str() {
        "peak" => GainPolicy::PeakAnchored,
        "floor" => GainPolicy::FloorAnchored,
        other => {
            eprintln!("unknown gain policy: {} (use peak or floor)", other);
            std::process::exit(1);
        }
    };

    let region = us_probe::ImagingRegion {
        x_range_mm: (cli.x_min, cli.x_max),
        z_range_mm: (cli.z_min, cli.z_max),
        speed_of_sound_mm_s: cli.speed_of_sound,
        f_number: cli.f_number,
        gain: cli.gain,
        dynamic_range_db: cli.dynamic_range,
    };

    if let Err(e) = pipeline::run_file(
        &cli.settings,
        &cli.input,
        &cli.out_dir,
        region,
        policy,
        cli.queue_capacity,
        cli.stats,
    ) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use parking_vision::core_modules::frame_processor::FilterSettings;
use parking_vision::core_modules::occupancy_engine::{EngineSettings, OCCUPANCY_THRESHOLD};
use parking_vision::core_modules::region::{REGION_HEIGHT, REGION_WIDTH};
use parking_vision::core_modules::verifier::PositionalVerifier;
use parking_vision::pipeline::MonitorConfig;

// Some defaults; all of which can be overriden via CLI args
const REGIONS_FILE_PATH: &str = "./CarParkPos.json";
const OUTPUT_PATH: &str = "./parking_output";

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Recorded footage: a directory of still frames, or a video file (needs the `opencv` feature)
    pub input: PathBuf,

    /// Where annotated frames are written (a directory for still frames, a file for video)
    #[arg(long, default_value = OUTPUT_PATH)]
    pub output: PathBuf,

    /// JSON list of [x, y] top-left corners, one per parking space
    #[arg(long, default_value = REGIONS_FILE_PATH)]
    pub regions: PathBuf,

    /// Frame rate recorded for still-frame input
    #[arg(long, default_value_t = 30.0)]
    pub fps: f64,

    /// TrueType/OpenType font for labels and banners; without it only outlines are drawn
    #[arg(long)]
    pub font: Option<PathBuf>,

    #[arg(long = "regionWidth", default_value_t = REGION_WIDTH)]
    pub region_width: u32,

    #[arg(long = "regionHeight", default_value_t = REGION_HEIGHT)]
    pub region_height: u32,

    /// Foreground pixels needed for a space to count as occupied
    #[arg(long, default_value_t = OCCUPANCY_THRESHOLD)]
    pub threshold: u32,

    /// Minimum seconds between two alarms
    #[arg(long = "cooldown", default_value_t = 3.0)]
    pub cooldown_secs: f64,

    /// Spaces before this index are treated as correctly occupied
    #[arg(long = "correctPrefix", default_value_t = 15)]
    pub correct_prefix: usize,

    /// Only every n-th space raises alarms (0 disables alarms)
    #[arg(long = "alarmStride", default_value_t = 5)]
    pub alarm_stride: usize,

    /// Log progress every n frames
    #[arg(long = "progressEvery", default_value_t = 30)]
    pub progress_interval: u64,

    /// Show a live preview window; ESC stops the run
    #[cfg(feature = "opencv")]
    #[arg(long)]
    pub display: bool,

    #[arg(long = "loglevel", default_value_t = String::from("info"))]
    pub log_level: String,
}

impl Cli {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            filter: FilterSettings::default(),
            engine: EngineSettings {
                occupancy_threshold: self.threshold,
                alarm_cooldown: Duration::from_secs_f64(self.cooldown_secs.max(0.0)),
                ..EngineSettings::default()
            },
            progress_interval: self.progress_interval,
        }
    }

    pub fn verifier(&self) -> PositionalVerifier {
        PositionalVerifier {
            correct_prefix: self.correct_prefix,
            alarm_stride: self.alarm_stride,
        }
    }
}

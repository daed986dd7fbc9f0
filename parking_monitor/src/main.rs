mod cli;
#[cfg(feature = "opencv")]
mod video;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::{debug, info};
use parking_vision::core_modules::canvas::load_font;
use parking_vision::core_modules::region::{DEFAULT_LABELS, RegionLayout, load_positions};
use parking_vision::monitor::{self, RunSummary};
use parking_vision::pipeline::ParkingPipeline;
use parking_vision::stream::{FrameSink, FrameSource, ImageSequenceSink, ImageSequenceSource};
use tokio::sync::watch;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    debug!("Started; args: {:?}", cli);

    // --- 1. Static layout ---
    let positions = load_positions(&cli.regions)?;
    let layout = RegionLayout::new(
        &positions,
        (cli.region_width, cli.region_height),
        &DEFAULT_LABELS,
    )?;

    // --- 2. Pipeline ---
    let mut pipeline = ParkingPipeline::with_verifier(cli.monitor_config(), layout, Box::new(cli.verifier()));
    if let Some(font_path) = &cli.font {
        pipeline = pipeline.with_font(load_font(font_path)?);
    }

    // --- 3. Stop signal ---
    let (stop_tx, stop_rx) = watch::channel(false);
    let interrupt_tx = stop_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received; stopping after the current frame");
            interrupt_tx.send_replace(true);
        }
    });

    // --- 4. Frame loop ---
    // Sources and sinks are opened on the blocking thread that uses them.
    let summary = tokio::task::spawn_blocking(move || -> Result<RunSummary> {
        let (mut source, mut sink) = open_streams(&cli, stop_tx)?;
        monitor::run(&mut pipeline, source.as_mut(), sink.as_mut(), &stop_rx)
    })
    .await??;

    println!("\nParking Monitoring Summary:");
    println!("Total Parking Spaces: {}", summary.total_regions);
    println!("Maximum Violations Detected: {}", summary.max_violations);
    println!("Frames Processed: {}", summary.frames_processed);
    println!("Output saved as: {}", summary.output);
    Ok(())
}

type Streams = (Box<dyn FrameSource>, Box<dyn FrameSink>);

fn open_streams(cli: &Cli, stop_tx: watch::Sender<bool>) -> Result<Streams> {
    if cli.input.is_dir() {
        let source = ImageSequenceSource::open(&cli.input, cli.fps)?;
        let sink = ImageSequenceSink::create(&cli.output)?;
        // Still-frame runs stop on Ctrl-C only.
        drop(stop_tx);
        return Ok((Box::new(source), Box::new(sink)));
    }
    open_video_streams(cli, stop_tx)
}

#[cfg(feature = "opencv")]
fn open_video_streams(cli: &Cli, stop_tx: watch::Sender<bool>) -> Result<Streams> {
    use crate::video::{DisplaySink, VideoFileSink, VideoFileSource};

    let source = VideoFileSource::open(&cli.input)?;
    let info = source.info();
    let mut sink: Box<dyn FrameSink> = Box::new(VideoFileSink::create(&cli.output, &info)?);
    if cli.display {
        sink = Box::new(DisplaySink::new(sink, "Parking Space Detection", stop_tx)?);
    }
    Ok((Box::new(source), sink))
}

#[cfg(not(feature = "opencv"))]
fn open_video_streams(cli: &Cli, _stop_tx: watch::Sender<bool>) -> Result<Streams> {
    anyhow::bail!(
        "{} is not a directory of frames; video files need the `opencv` feature",
        cli.input.display()
    )
}

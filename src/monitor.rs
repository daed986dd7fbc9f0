// THEORY:
// The monitor loop is the batch driver around a `ParkingPipeline`: pull a frame,
// process it, push the annotated frame out, repeat. It stops in exactly two
// ways: the source runs dry, or the stop flag was raised. The flag is only read
// between frames, so a frame is either fully processed and written or not
// touched at all.
//
// The flag is a `tokio::sync::watch` receiver so that whoever owns the sender
// (a Ctrl-C handler, a display window listening for ESC) can raise it from any
// thread while the loop runs on a blocking one.

use crate::pipeline::ParkingPipeline;
use crate::stream::{FrameSink, FrameSource};
use anyhow::{Context, Result};
use log::{debug, info};
use std::time::Instant;
use tokio::sync::watch;

/// What a finished run reports.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub total_regions: usize,
    /// Largest wrong-occupant count seen in any single frame.
    pub max_violations: usize,
    /// Alarms that fired over the whole run.
    pub alarms_fired: usize,
    /// True when the stop flag ended the run before the source was exhausted.
    pub stopped_early: bool,
    pub output: String,
}

/// Runs the pipeline over `source` until it is exhausted or `stop` is raised.
pub fn run(
    pipeline: &mut ParkingPipeline,
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    stop: &watch::Receiver<bool>,
) -> Result<RunSummary> {
    run_with_clock(pipeline, source, sink, stop, Instant::now)
}

/// Same as [`run`], with `clock` stamping each frame.
pub fn run_with_clock(
    pipeline: &mut ParkingPipeline,
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    stop: &watch::Receiver<bool>,
    mut clock: impl FnMut() -> Instant,
) -> Result<RunSummary> {
    let total_frames = source.info().total_frames;
    let progress_interval = pipeline.config().progress_interval;
    let mut frames_processed = 0u64;
    let mut alarms_fired = 0usize;
    let mut stopped_early = false;

    info!("Processing video... Please wait.");
    loop {
        if *stop.borrow() {
            info!("Stop requested after {} frames", frames_processed);
            stopped_early = true;
            break;
        }
        let Some(mut frame) = source.next_frame() else {
            debug!("Frame source exhausted");
            break;
        };

        let report = pipeline.process_frame(&mut frame, clock());
        alarms_fired += report.alarms.len();
        sink.write(&frame)
            .with_context(|| format!("failed to write frame {}", frames_processed))?;
        frames_processed += 1;

        if progress_interval > 0 && frames_processed % progress_interval == 0 {
            match total_frames {
                Some(total) if total > 0 => {
                    let progress = frames_processed as f64 / total as f64 * 100.0;
                    info!("Progress: {:.1}%", progress);
                }
                _ => info!("Processed {} frames", frames_processed),
            }
        }
    }
    sink.finish().context("failed to finalise output")?;

    let summary = RunSummary {
        frames_processed,
        total_regions: pipeline.layout().len(),
        max_violations: pipeline.max_violations(),
        alarms_fired,
        stopped_early,
        output: sink.location(),
    };
    info!("Processing complete! Output saved to '{}'", summary.output);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::region::RegionLayout;
    use crate::pipeline::MonitorConfig;
    use crate::stream::StreamInfo;
    use image::{Rgb, RgbImage};
    use std::collections::VecDeque;

    struct VecSource {
        frames: VecDeque<RgbImage>,
    }

    impl FrameSource for VecSource {
        fn info(&self) -> StreamInfo {
            StreamInfo {
                width: 32,
                height: 32,
                fps: 10.0,
                total_frames: Some(self.frames.len() as u64),
            }
        }

        fn next_frame(&mut self) -> Option<RgbImage> {
            self.frames.pop_front()
        }
    }

    #[derive(Default)]
    struct CountingSink {
        written: usize,
        finished: bool,
    }

    impl FrameSink for CountingSink {
        fn write(&mut self, _frame: &RgbImage) -> Result<()> {
            self.written += 1;
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }

        fn location(&self) -> String {
            "memory".to_string()
        }
    }

    struct FailingSink;

    impl FrameSink for FailingSink {
        fn write(&mut self, _frame: &RgbImage) -> Result<()> {
            anyhow::bail!("disk full")
        }

        fn location(&self) -> String {
            "nowhere".to_string()
        }
    }

    fn source(n: usize) -> VecSource {
        VecSource {
            frames: (0..n)
                .map(|_| RgbImage::from_pixel(32, 32, Rgb([90, 90, 90])))
                .collect(),
        }
    }

    fn pipeline() -> ParkingPipeline {
        let layout = RegionLayout::new(&[(0, 0), (16, 16)], (16, 16), &["A"]).unwrap();
        ParkingPipeline::new(MonitorConfig::default(), layout)
    }

    #[test]
    fn runs_until_the_source_is_exhausted() {
        let (_tx, rx) = watch::channel(false);
        let mut sink = CountingSink::default();

        let summary = run(&mut pipeline(), &mut source(4), &mut sink, &rx).unwrap();

        assert_eq!(summary.frames_processed, 4);
        assert_eq!(summary.total_regions, 2);
        assert_eq!(summary.max_violations, 0);
        assert!(!summary.stopped_early);
        assert_eq!(summary.output, "memory");
        assert_eq!(sink.written, 4);
        assert!(sink.finished);
    }

    #[test]
    fn raised_stop_flag_ends_the_run_between_frames() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let mut sink = CountingSink::default();

        let summary = run(&mut pipeline(), &mut source(4), &mut sink, &rx).unwrap();

        assert!(summary.stopped_early);
        assert_eq!(summary.frames_processed, 0);
        assert_eq!(sink.written, 0);
        assert!(sink.finished);
    }

    #[test]
    fn sink_failure_is_an_error() {
        let (_tx, rx) = watch::channel(false);
        assert!(run(&mut pipeline(), &mut source(2), &mut FailingSink, &rx).is_err());
    }

    #[test]
    fn fixed_clock_is_used_for_every_frame() {
        let (_tx, rx) = watch::channel(false);
        let start = Instant::now();
        let mut calls = 0;

        run_with_clock(
            &mut pipeline(),
            &mut source(3),
            &mut CountingSink::default(),
            &rx,
            || {
                calls += 1;
                start
            },
        )
        .unwrap();

        assert_eq!(calls, 3);
    }
}

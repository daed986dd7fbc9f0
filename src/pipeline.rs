// THEORY:
// The `pipeline` module is the top-level API of the occupancy engine. It bundles
// the static region layout, the two processing stages, and the state that has
// to survive between frames into one object with a single per-frame call.
//
// The `ParkingPipeline` is the only owner of `MonitorState`. Each frame it hands
// the state to the engine by value and stores whatever comes back, so there is
// no hidden, process-wide mutation anywhere below it.

use crate::core_modules::canvas::{Canvas, RasterCanvas};
use crate::core_modules::frame_processor::{FilterSettings, FrameProcessor, OccupancyMask};
use crate::core_modules::occupancy_engine::{EngineSettings, MonitorState, OccupancyEngine};
use crate::core_modules::region::RegionLayout;
use crate::core_modules::verifier::{OccupantVerifier, PositionalVerifier};
use ab_glyph::FontArc;
use image::RgbImage;
use std::mem;
use std::time::Instant;

// Re-export key data structures for the public API.
pub use crate::core_modules::alarm::AlarmEvent;
pub use crate::core_modules::occupancy_engine::{FrameReport, Occupant, RegionStatus};

/// Configuration for the ParkingPipeline and the loop that drives it.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub filter: FilterSettings,
    pub engine: EngineSettings,
    /// Log progress every this many frames (0 disables progress lines).
    pub progress_interval: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            filter: FilterSettings::default(),
            engine: EngineSettings::default(),
            progress_interval: 30,
        }
    }
}

/// The main, top-level struct for the occupancy engine.
pub struct ParkingPipeline {
    config: MonitorConfig,
    layout: RegionLayout,
    processor: FrameProcessor,
    engine: OccupancyEngine,
    state: MonitorState,
    font: Option<FontArc>,
}

impl ParkingPipeline {
    /// A pipeline that uses the position-based occupant verifier.
    pub fn new(config: MonitorConfig, layout: RegionLayout) -> Self {
        Self::with_verifier(config, layout, Box::new(PositionalVerifier::default()))
    }

    pub fn with_verifier(
        config: MonitorConfig,
        layout: RegionLayout,
        verifier: Box<dyn OccupantVerifier + Send>,
    ) -> Self {
        let processor = FrameProcessor::new(config.filter.clone());
        let engine = OccupancyEngine::new(config.engine.clone(), verifier);
        let state = MonitorState::new(layout.len());
        Self {
            config,
            layout,
            processor,
            engine,
            state,
            font: None,
        }
    }

    /// Font used for labels and banners; without one only outlines are drawn.
    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    /// Processes one frame and annotates it in place.
    pub fn process_frame(&mut self, frame: &mut RgbImage, now: Instant) -> FrameReport {
        let mask = self.processor.process(frame);
        let mut canvas = RasterCanvas::new(frame, self.font.as_ref());
        Self::run_engine(&self.engine, &self.layout, &mut self.state, &mask, &mut canvas, now)
    }

    /// Processes one frame but draws onto `canvas` instead of the frame itself.
    pub fn process_frame_with_canvas(
        &mut self,
        frame: &RgbImage,
        canvas: &mut dyn Canvas,
        now: Instant,
    ) -> FrameReport {
        let mask = self.processor.process(frame);
        Self::run_engine(&self.engine, &self.layout, &mut self.state, &mask, canvas, now)
    }

    /// Evaluates an already computed mask, skipping the filter chain.
    pub fn evaluate_mask(
        &mut self,
        mask: &OccupancyMask,
        canvas: &mut dyn Canvas,
        now: Instant,
    ) -> FrameReport {
        Self::run_engine(&self.engine, &self.layout, &mut self.state, mask, canvas, now)
    }

    fn run_engine(
        engine: &OccupancyEngine,
        layout: &RegionLayout,
        state: &mut MonitorState,
        mask: &OccupancyMask,
        canvas: &mut dyn Canvas,
        now: Instant,
    ) -> FrameReport {
        let previous = mem::take(state);
        let (report, next) = engine.evaluate(mask, layout, canvas, previous, now);
        *state = next;
        report
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn layout(&self) -> &RegionLayout {
        &self.layout
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// Largest wrong-occupant count seen in any single frame so far.
    pub fn max_violations(&self) -> usize {
        self.state.violations.max()
    }
}

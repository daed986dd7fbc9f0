// THEORY:
// The `OccupancyEngine` is the decision layer. Given the occupancy mask for one
// frame, it walks the region layout *in order* and settles each space into one
// of three states:
//
//   FREE                 foreground count below the threshold
//   OCCUPIED_CORRECT     occupied, and the verifier accepts the occupant
//   OCCUPIED_VIOLATION   occupied, and the verifier rejects the occupant
//
// Every frame is judged from scratch: there is no hysteresis and a region's
// previous state is not consulted. The only things that outlive a frame are the
// alarm debounce and the running maximum of violations, and both live in
// `MonitorState`, which the caller passes in and gets back. The engine itself
// holds nothing mutable, so the same engine can be replayed over the same frames
// and produce the same reports.
//
// Order matters twice: the verifier's rules are keyed on index, and only the
// first alarm request inside a cooldown window fires.

use crate::core_modules::alarm::{ALARM_COOLDOWN, AlarmEvent, AlarmState};
use crate::core_modules::canvas::{Canvas, TextStyle};
use crate::core_modules::frame_processor::OccupancyMask;
use crate::core_modules::region::RegionLayout;
use crate::core_modules::verifier::OccupantVerifier;
use image::Rgb;
use std::time::{Duration, Instant};

/// A region whose foreground count is below this is free.
pub const OCCUPANCY_THRESHOLD: u32 = 900;

pub const FREE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const CORRECT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const VIOLATION_COLOR: Rgb<u8> = Rgb([255, 140, 0]);
pub const VIOLATION_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
pub const FREE_BANNER_COLOR: Rgb<u8> = Rgb([0, 200, 0]);

/// Tunable behaviour of the engine. `Default` reproduces the tuned values.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Minimum foreground pixels for a region to count as occupied.
    pub occupancy_threshold: u32,
    /// Minimum spacing between two alarm firings.
    pub alarm_cooldown: Duration,
    pub outline_thickness: u32,
    /// Top-left corner of the `Free: n/m` banner.
    pub free_banner_origin: (i32, i32),
    /// Top-left corner of the `Violations: n` banner.
    pub violation_banner_origin: (i32, i32),
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            occupancy_threshold: OCCUPANCY_THRESHOLD,
            alarm_cooldown: ALARM_COOLDOWN,
            outline_thickness: 2,
            free_banner_origin: (50, 50),
            violation_banner_origin: (50, 100),
        }
    }
}

/// Who the engine believes is parked in a region this frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Occupant {
    /// The assigned vehicle, by label.
    Assigned(String),
    /// A vehicle that is not the assigned one, by id.
    Identified(u32),
}

/// Per-region memory. `current_occupant` is `None` exactly when the region was
/// free in the most recent frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionState {
    pub current_occupant: Option<Occupant>,
}

/// Running maximum of per-frame wrong-occupant counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViolationCounter {
    max: usize,
}

impl ViolationCounter {
    pub fn observe(&mut self, count: usize) {
        self.max = self.max.max(count);
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

/// Everything that survives from one frame to the next.
#[derive(Debug, Clone, Default)]
pub struct MonitorState {
    pub regions: Vec<RegionState>,
    pub alarm: AlarmState,
    pub violations: ViolationCounter,
}

impl MonitorState {
    pub fn new(region_count: usize) -> Self {
        Self {
            regions: vec![RegionState::default(); region_count],
            alarm: AlarmState::new(),
            violations: ViolationCounter::default(),
        }
    }
}

/// The verdict for one region in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionStatus {
    Free,
    OccupiedCorrect,
    Violation,
}

/// The outcome of evaluating one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub free_count: usize,
    pub occupied_count: usize,
    /// Wrong-occupant regions in this frame.
    pub violation_count: usize,
    /// One entry per region, in layout order.
    pub statuses: Vec<RegionStatus>,
    /// Alarms that actually fired (suppressed requests are not listed).
    pub alarms: Vec<AlarmEvent>,
}

impl FrameReport {
    pub fn total_regions(&self) -> usize {
        self.statuses.len()
    }
}

/// Counts foreground pixels of `mask` inside `bounds` (`x0, y0, x1, y1`, exclusive).
pub fn count_foreground(mask: &OccupancyMask, bounds: (u32, u32, u32, u32)) -> u32 {
    let (x0, y0, x1, y1) = bounds;
    let mut count = 0;
    for y in y0..y1 {
        for x in x0..x1 {
            if mask.get_pixel(x, y).0[0] != 0 {
                count += 1;
            }
        }
    }
    count
}

/// Turns occupancy masks into per-region verdicts, annotations, and alarms.
pub struct OccupancyEngine {
    settings: EngineSettings,
    verifier: Box<dyn OccupantVerifier + Send>,
}

impl OccupancyEngine {
    pub fn new(settings: EngineSettings, verifier: Box<dyn OccupantVerifier + Send>) -> Self {
        Self { settings, verifier }
    }

    /// Classifies a foreground count. Pure; depends only on the threshold.
    pub fn is_occupied(&self, count: u32) -> bool {
        count >= self.settings.occupancy_threshold
    }

    /// Evaluates one frame.
    ///
    /// `mask` is the output of the `FrameProcessor` for the frame that `canvas`
    /// draws onto. `now` stamps any alarm raised during this frame.
    pub fn evaluate(
        &self,
        mask: &OccupancyMask,
        layout: &RegionLayout,
        canvas: &mut dyn Canvas,
        mut state: MonitorState,
        now: Instant,
    ) -> (FrameReport, MonitorState) {
        let (mask_width, mask_height) = mask.dimensions();
        let total = layout.len();
        state.regions.resize(total, RegionState::default());

        let mut report = FrameReport {
            statuses: Vec::with_capacity(total),
            ..FrameReport::default()
        };
        let label_style = TextStyle::plain(14.0, FREE_COLOR);
        let id_style = TextStyle::plain(14.0, VIOLATION_TEXT_COLOR);

        for (index, region) in layout.regions().iter().enumerate() {
            // --- 1. Sample ---
            let count = count_foreground(mask, region.clipped_bounds(mask_width, mask_height));
            let assigned_label = layout.assigned_label(index);
            let (cx, cy) = region.center();

            // --- 2. Classify & resolve ---
            let (status, color) = if !self.is_occupied(count) {
                state.regions[index].current_occupant = None;
                report.free_count += 1;
                canvas.draw_text(assigned_label, (cx - 15, cy - 7), &label_style);
                (RegionStatus::Free, FREE_COLOR)
            } else if self.verifier.is_correct(index) {
                state.regions[index].current_occupant =
                    Some(Occupant::Assigned(assigned_label.to_string()));
                report.occupied_count += 1;
                (RegionStatus::OccupiedCorrect, CORRECT_COLOR)
            } else {
                let actual_id = self.verifier.actual_occupant(index, layout.expected_id(index));
                state.regions[index].current_occupant = Some(Occupant::Identified(actual_id));
                report.occupied_count += 1;
                report.violation_count += 1;
                canvas.draw_text(&actual_id.to_string(), (cx - 5, cy - 7), &id_style);

                if self.verifier.should_alarm(index) {
                    let request = AlarmEvent {
                        region_index: index,
                        region: *region,
                        assigned_label: assigned_label.to_string(),
                        actual_id,
                        at: now,
                    };
                    if let Some(fired) = state.alarm.trigger(request, self.settings.alarm_cooldown) {
                        report.alarms.push(fired);
                    }
                }
                (RegionStatus::Violation, VIOLATION_COLOR)
            };

            // --- 3. Outline ---
            canvas.draw_rect(region, color, self.settings.outline_thickness);
            report.statuses.push(status);
        }

        // --- 4. Frame banners ---
        canvas.draw_text(
            &format!("Free: {}/{}", report.free_count, total),
            self.settings.free_banner_origin,
            &TextStyle::boxed(44.0, VIOLATION_TEXT_COLOR, FREE_BANNER_COLOR, 10),
        );
        if report.violation_count > 0 {
            state.violations.observe(report.violation_count);
            canvas.draw_text(
                &format!("Violations: {}", report.violation_count),
                self.settings.violation_banner_origin,
                &TextStyle::boxed(33.0, VIOLATION_TEXT_COLOR, VIOLATION_COLOR, 5),
            );
        }

        log::debug!(
            "Frame evaluated: free {}/{}, violations {}, alarms {}",
            report.free_count,
            total,
            report.violation_count,
            report.alarms.len()
        );
        (report, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::canvas::{DrawCommand, RasterCanvas, RecordingCanvas, load_font};
    use crate::core_modules::frame_processor::FOREGROUND;
    use crate::core_modules::verifier::PositionalVerifier;
    use image::{GrayImage, Luma, RgbImage};
    use std::path::Path;

    const W: u32 = 107;
    const H: u32 = 48;

    /// Regions laid out in a single row, 110 px apart.
    fn row_layout(n: usize) -> RegionLayout {
        let positions: Vec<(u32, u32)> = (0..n as u32).map(|i| (i * 110, 0)).collect();
        RegionLayout::with_defaults(&positions).unwrap()
    }

    fn blank_mask(n: usize) -> GrayImage {
        GrayImage::new(n as u32 * 110, H)
    }

    /// Marks the first `count` pixels (row-major) of region `index` as foreground.
    fn fill(mask: &mut GrayImage, index: usize, count: u32) {
        let x0 = index as u32 * 110;
        for i in 0..count {
            mask.put_pixel(x0 + i % W, i / W, Luma([FOREGROUND]));
        }
    }

    fn engine() -> OccupancyEngine {
        OccupancyEngine::new(EngineSettings::default(), Box::new(PositionalVerifier::default()))
    }

    #[test]
    fn region_far_outside_the_frame_is_free() {
        let font =
            load_font(Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fonts/DejaVuSans.ttf")))
                .unwrap();
        let layout = RegionLayout::with_defaults(&[(u32::MAX - 10, 0)]).unwrap();
        let mask = GrayImage::new(200, 100);
        let mut frame = RgbImage::new(200, 100);

        let (report, _) = {
            let mut canvas = RasterCanvas::new(&mut frame, Some(&font));
            engine().evaluate(&mask, &layout, &mut canvas, MonitorState::default(), Instant::now())
        };

        assert_eq!(report.statuses, vec![RegionStatus::Free]);
        assert_eq!((report.free_count, report.occupied_count), (1, 0));
        // Only the "Free: 1/1" banner reaches the frame.
        assert_eq!(*frame.get_pixel(41, 41), FREE_BANNER_COLOR);
        assert_eq!(*frame.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn threshold_boundary_is_exact() {
        let engine = engine();
        assert!(!engine.is_occupied(899));
        assert!(engine.is_occupied(900));
        assert!(!engine.is_occupied(0));
    }

    #[test]
    fn count_foreground_respects_bounds() {
        let mut mask = blank_mask(2);
        fill(&mut mask, 1, 1000);
        assert_eq!(count_foreground(&mask, (0, 0, 107, 48)), 0);
        assert_eq!(count_foreground(&mask, (110, 0, 217, 48)), 1000);
    }

    #[test]
    fn single_empty_region_is_free_with_first_label() {
        let engine = engine();
        let layout = row_layout(1);
        let mut canvas = RecordingCanvas::new();

        let (report, state) = engine.evaluate(
            &blank_mask(1),
            &layout,
            &mut canvas,
            MonitorState::new(1),
            Instant::now(),
        );

        assert_eq!(report.statuses, vec![RegionStatus::Free]);
        assert_eq!(report.free_count, 1);
        assert!(report.alarms.is_empty());
        assert_eq!(state.regions[0].current_occupant, None);
        assert!(!state.alarm.active);
        assert_eq!(canvas.texts(), vec!["A", "Free: 1/1"]);
        assert_eq!(canvas.rect_colors(), vec![FREE_COLOR]);
    }

    #[test]
    fn boundary_counts_split_free_and_occupied() {
        let engine = engine();
        let layout = row_layout(2);
        let mut mask = blank_mask(2);
        fill(&mut mask, 0, 899);
        fill(&mut mask, 1, 900);

        let (report, state) = engine.evaluate(
            &mask,
            &layout,
            &mut RecordingCanvas::new(),
            MonitorState::new(2),
            Instant::now(),
        );

        assert_eq!(report.statuses, vec![RegionStatus::Free, RegionStatus::OccupiedCorrect]);
        assert_eq!(
            state.regions[1].current_occupant,
            Some(Occupant::Assigned("B".to_string()))
        );
    }

    #[test]
    fn correct_occupant_draws_red_outline_without_text() {
        let engine = engine();
        let layout = row_layout(1);
        let mut mask = blank_mask(1);
        fill(&mut mask, 0, 1000);
        let mut canvas = RecordingCanvas::new();

        let (report, _) =
            engine.evaluate(&mask, &layout, &mut canvas, MonitorState::new(1), Instant::now());

        assert_eq!(report.occupied_count, 1);
        assert_eq!(report.violation_count, 0);
        assert_eq!(canvas.rect_colors(), vec![CORRECT_COLOR]);
        assert_eq!(canvas.texts(), vec!["Free: 0/1"]);
    }

    #[test]
    fn violations_fire_once_per_cooldown() {
        let engine = engine();
        let layout = row_layout(21);
        let mut mask = blank_mask(21);
        fill(&mut mask, 15, 1000);
        fill(&mut mask, 20, 1000);
        let mut canvas = RecordingCanvas::new();

        let (report, state) =
            engine.evaluate(&mask, &layout, &mut canvas, MonitorState::new(21), Instant::now());

        assert_eq!(report.statuses[15], RegionStatus::Violation);
        assert_eq!(report.statuses[20], RegionStatus::Violation);
        assert_eq!(report.violation_count, 2);
        assert_eq!(report.alarms.len(), 1);
        assert_eq!(report.alarms[0].region_index, 15);
        assert_eq!(report.alarms[0].assigned_label, "P");
        assert_eq!(report.alarms[0].actual_id, 16);
        assert_eq!(state.regions[15].current_occupant, Some(Occupant::Identified(16)));
        assert_eq!(state.regions[20].current_occupant, Some(Occupant::Identified(21)));
        assert_eq!(state.violations.max(), 2);
        assert!(canvas.texts().contains(&"16"));
        assert!(canvas.texts().contains(&"Violations: 2"));
    }

    #[test]
    fn violation_off_the_alarm_stride_raises_nothing() {
        let engine = engine();
        let layout = row_layout(17);
        let mut mask = blank_mask(17);
        fill(&mut mask, 16, 1000);

        let (report, state) = engine.evaluate(
            &mask,
            &layout,
            &mut RecordingCanvas::new(),
            MonitorState::new(17),
            Instant::now(),
        );

        assert_eq!(report.violation_count, 1);
        assert!(report.alarms.is_empty());
        assert!(!state.alarm.active);
    }

    #[test]
    fn counts_always_cover_every_region() {
        let engine = engine();
        let layout = row_layout(20);
        let mut mask = blank_mask(20);
        for i in [0, 3, 7, 15, 18] {
            fill(&mut mask, i, 2000);
        }

        let (report, _) = engine.evaluate(
            &mask,
            &layout,
            &mut RecordingCanvas::new(),
            MonitorState::new(20),
            Instant::now(),
        );

        assert_eq!(report.free_count + report.occupied_count, report.total_regions());
        assert_eq!(report.occupied_count, 5);
        assert_eq!(report.violation_count, 2);
    }

    #[test]
    fn occupant_resets_when_region_empties() {
        let engine = engine();
        let layout = row_layout(1);
        let mut occupied = blank_mask(1);
        fill(&mut occupied, 0, 1200);
        let now = Instant::now();

        let (_, state) = engine.evaluate(
            &occupied,
            &layout,
            &mut RecordingCanvas::new(),
            MonitorState::new(1),
            now,
        );
        assert!(state.regions[0].current_occupant.is_some());

        let (_, state) =
            engine.evaluate(&blank_mask(1), &layout, &mut RecordingCanvas::new(), state, now);
        assert_eq!(state.regions[0].current_occupant, None);
    }

    #[test]
    fn violation_maximum_never_decreases() {
        let engine = engine();
        let layout = row_layout(21);
        let mut busy = blank_mask(21);
        for i in 15..21 {
            fill(&mut busy, i, 1000);
        }
        let mut quiet = blank_mask(21);
        fill(&mut quiet, 16, 1000);

        let start = Instant::now();
        let mut state = MonitorState::new(21);
        let mut maxima = Vec::new();
        for (n, mask) in [&quiet, &busy, &quiet, &blank_mask(21)].into_iter().enumerate() {
            let (_, next) = engine.evaluate(
                mask,
                &layout,
                &mut RecordingCanvas::new(),
                state,
                start + Duration::from_secs(n as u64),
            );
            maxima.push(next.violations.max());
            state = next;
        }

        assert_eq!(maxima, vec![1, 6, 6, 6]);
    }

    #[test]
    fn outlines_use_configured_thickness() {
        let settings = EngineSettings {
            outline_thickness: 3,
            ..EngineSettings::default()
        };
        let engine = OccupancyEngine::new(settings, Box::new(PositionalVerifier::default()));
        let mut canvas = RecordingCanvas::new();

        engine.evaluate(
            &blank_mask(1),
            &row_layout(1),
            &mut canvas,
            MonitorState::new(1),
            Instant::now(),
        );

        assert!(canvas
            .commands
            .iter()
            .any(|c| matches!(c, DrawCommand::Rect { thickness: 3, .. })));
    }
}

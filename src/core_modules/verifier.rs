// THEORY:
// An `OccupantVerifier` answers the one question the pixel mask cannot: *who* is
// parked in an occupied space. The engine only asks three things of it:
// whether the occupant matches the assignment, whether a mismatch here is
// worth an alarm, and which id to record for the occupant.
//
// The shipped `PositionalVerifier` does no recognition at all. It stands in for
// real identity checks with a fixed rule keyed on the region's index, which
// makes whole runs reproducible. A plate reader or tag scanner can replace it
// without touching the engine.

/// Decides occupant correctness for occupied regions.
pub trait OccupantVerifier {
    /// Whether the occupant of the region at `index` matches its assignment.
    fn is_correct(&self, index: usize) -> bool;

    /// Whether a mismatch in the region at `index` should attempt an alarm.
    fn should_alarm(&self, index: usize) -> bool;

    /// The id recorded for the occupant of a mismatched region.
    ///
    /// Defaults to the region's own expected id: without a real identity source
    /// the "actual" occupant is indistinguishable from the expected one.
    fn actual_occupant(&self, _index: usize, expected_id: u32) -> u32 {
        expected_id
    }
}

/// Treats the first `correct_prefix` regions as correctly occupied and every
/// `alarm_stride`-th region as alarm-worthy.
#[derive(Debug, Clone)]
pub struct PositionalVerifier {
    pub correct_prefix: usize,
    pub alarm_stride: usize,
}

impl Default for PositionalVerifier {
    fn default() -> Self {
        Self {
            correct_prefix: 15,
            alarm_stride: 5,
        }
    }
}

impl OccupantVerifier for PositionalVerifier {
    fn is_correct(&self, index: usize) -> bool {
        index < self.correct_prefix
    }

    fn should_alarm(&self, index: usize) -> bool {
        // A zero stride disables alarms instead of dividing by zero.
        self.alarm_stride != 0 && index % self.alarm_stride == 0
    }
}

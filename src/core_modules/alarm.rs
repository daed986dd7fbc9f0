// THEORY:
// The alarm is a single, lot-wide debounce. Any region may *request* an alarm,
// but the request only fires when the alarm is idle or the last firing is at
// least one cooldown in the past. There is no per-region memory: two different
// spaces violating within the same cooldown window produce one alarm.
//
// `AlarmState` is plain data owned by `MonitorState`; the caller supplies `now`
// so the cooldown can be exercised without sleeping.

use crate::core_modules::region::Region;
use std::time::{Duration, Instant};

/// Minimum spacing between two alarm firings.
pub const ALARM_COOLDOWN: Duration = Duration::from_secs(3);

/// One alarm that actually fired.
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmEvent {
    pub region_index: usize,
    pub region: Region,
    pub assigned_label: String,
    pub actual_id: u32,
    pub at: Instant,
}

/// Debounce state shared by every region.
#[derive(Debug, Clone, Default)]
pub struct AlarmState {
    pub active: bool,
    pub last_triggered_at: Option<Instant>,
}

impl AlarmState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires `request` unless a previous alarm is still inside `cooldown`.
    /// Returns the event when it fired, `None` when it was suppressed.
    pub fn trigger(&mut self, request: AlarmEvent, cooldown: Duration) -> Option<AlarmEvent> {
        let cooled_down = match self.last_triggered_at {
            Some(last) => request.at.saturating_duration_since(last) >= cooldown,
            None => true,
        };
        if self.active && !cooled_down {
            log::debug!(
                "Alarm for region {} suppressed by cooldown",
                request.region_index
            );
            return None;
        }

        log::warn!(
            "ALARM: Space for vehicle {} occupied by vehicle {}!",
            request.assigned_label,
            request.actual_id
        );
        self.active = true;
        self.last_triggered_at = Some(request.at);
        Some(request)
    }
}

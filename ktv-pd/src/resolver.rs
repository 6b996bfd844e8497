//! Playhead resolution
//!
//! Answers "what is on air right now, and how far into it" from a day's grid
//! and a wall-clock time. Resolution is a pure function of its inputs, so
//! any number of viewers joining at the same moment see the same frame.

use chrono::NaiveTime;
use ktv_common::time::seconds_since_midnight;
use ktv_common::OffAirReason;
use serde::Serialize;
use tracing::warn;

use crate::schedule::ScheduledProgram;

/// What the channel is showing at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayheadState {
    pub current: Option<ScheduledProgram>,
    /// Seconds since the current program started
    pub elapsed_seconds: u32,
    pub segment_start: u32,
    pub segment_end: u32,
    /// Offset into the content where playback should be
    pub video_position: u32,
    pub is_off_air: bool,
    /// First program starting after the resolved instant
    pub next: Option<ScheduledProgram>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub off_air_reason: Option<OffAirReason>,
}

impl PlayheadState {
    fn off_air(reason: OffAirReason, next: Option<ScheduledProgram>) -> Self {
        Self {
            current: None,
            elapsed_seconds: 0,
            segment_start: 0,
            segment_end: 0,
            video_position: 0,
            is_off_air: true,
            next,
            off_air_reason: Some(reason),
        }
    }

    /// Content currently on air, if any
    pub fn content_id(&self) -> Option<&str> {
        self.current.as_ref().map(|p| p.content_id.as_str())
    }
}

/// Resolve the playhead at wall-clock `now`
pub fn resolve(schedule: &[ScheduledProgram], now: NaiveTime) -> PlayheadState {
    resolve_at(schedule, seconds_since_midnight(now))
}

/// Resolve the playhead at `now` seconds since midnight
///
/// **Algorithm:**
/// 1. The candidate is the last program with `start_time <= now`
/// 2. Its segment length is `segment_end - segment_start`
/// 3. Past the end of the segment the channel is off air
/// 4. Otherwise `video_position = segment_start + elapsed`
///
/// `schedule` must be sorted by start time.
pub fn resolve_at(schedule: &[ScheduledProgram], now: u32) -> PlayheadState {
    if schedule.is_empty() {
        return PlayheadState::off_air(OffAirReason::EmptySchedule, None);
    }

    // Programs starting at or before `now` form a prefix of the grid
    let started = schedule.partition_point(|p| p.start_time <= now);
    let next = schedule.get(started).cloned();

    let Some(program) = started.checked_sub(1).and_then(|i| schedule.get(i)) else {
        return PlayheadState::off_air(OffAirReason::BeforeFirstProgram, next);
    };

    let elapsed = now - program.start_time;
    if elapsed >= program.segment_duration() {
        let reason = if next.is_some() {
            OffAirReason::BetweenPrograms
        } else {
            OffAirReason::AfterLastProgram
        };
        return PlayheadState::off_air(reason, next);
    }

    let segment_start = program.segment_start();
    PlayheadState {
        current: Some(program.clone()),
        elapsed_seconds: elapsed,
        segment_start,
        segment_end: program.segment_end(),
        video_position: segment_start + elapsed,
        is_off_air: false,
        next,
        off_air_reason: None,
    }
}

/// Resolve, treating programs whose content is unavailable as off air
pub fn resolve_available<F>(schedule: &[ScheduledProgram], now: u32, is_available: F) -> PlayheadState
where
    F: Fn(&str) -> bool,
{
    let state = resolve_at(schedule, now);
    match state.content_id() {
        Some(id) if !is_available(id) => {
            warn!("Scheduled content {} is not available, going off air", id);
            PlayheadState::off_air(OffAirReason::ContentUnavailable, state.next)
        }
        _ => state,
    }
}

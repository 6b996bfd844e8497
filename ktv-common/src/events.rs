//! Event types for the KTV event system
//!
//! Provides the channel event enum and the EventBus the tuner publishes on.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::category::Category;

/// Why nothing is on air
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffAirReason {
    /// The day's schedule has no programs at all (empty catalog). Permanent
    /// for the whole day.
    EmptySchedule,
    /// Before the first program of the day
    BeforeFirstProgram,
    /// A program has finished and the next one has not started yet
    BetweenPrograms,
    /// After the last program of the day
    AfterLastProgram,
    /// The scheduled content is missing from the current catalog
    ContentUnavailable,
}

impl OffAirReason {
    /// True when waiting will not bring anything back on air today
    pub fn is_permanent(&self) -> bool {
        matches!(self, OffAirReason::EmptySchedule | OffAirReason::AfterLastProgram)
    }
}

/// KTV channel events
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChannelEvent {
    /// A day's grid was (re)generated
    ScheduleGenerated {
        /// Broadcast date of the grid
        date: NaiveDate,
        /// Weekday index, 0 = Sunday
        weekday: u32,
        /// Number of programs in the grid
        program_count: usize,
        /// Generation stopped early because nothing was selectable
        exhausted: bool,
        timestamp: NaiveDateTime,
    },

    /// A program came on air (including tuning in mid-program)
    ProgramStarted {
        content_id: String,
        category: Category,
        /// Scheduled start, seconds since midnight
        start_time: u32,
        /// Offset into the content at the moment of tune-in
        position_seconds: u32,
        segment_start: u32,
        segment_end: u32,
        timestamp: NaiveDateTime,
    },

    /// A program went off air
    ProgramEnded {
        content_id: String,
        category: Category,
        start_time: u32,
        /// Content offset reached when the program was last observed
        position_seconds: u32,
        /// False when the observer stopped watching before the segment end
        completed: bool,
        timestamp: NaiveDateTime,
    },

    /// Nothing is on air
    WentOffAir {
        reason: OffAirReason,
        /// Start of the next program today, if any
        next_start_time: Option<u32>,
        timestamp: NaiveDateTime,
    },
}

impl ChannelEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            ChannelEvent::ScheduleGenerated { .. } => "ScheduleGenerated",
            ChannelEvent::ProgramStarted { .. } => "ProgramStarted",
            ChannelEvent::ProgramEnded { .. } => "ProgramEnded",
            ChannelEvent::WentOffAir { .. } => "WentOffAir",
        }
    }
}

/// Broadcast channel for [`ChannelEvent`]s
///
/// Cloning the bus shares the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChannelEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per
    /// lagging subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)`, or `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ChannelEvent,
    ) -> Result<usize, broadcast::error::SendError<ChannelEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ChannelEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

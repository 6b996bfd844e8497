//! Playback recording
//!
//! The recorder is the only component that writes rotation history and
//! resume positions to the persisted store. It is fed by the tuner as
//! programs come on and go off air.

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use ktv_common::time::at_clock;
use ktv_common::{Category, Result};
use tracing::{debug, info};

use crate::rotation::RotationTracker;
use crate::schedule::ScheduledProgram;
use crate::segment::SegmentPlanner;

/// Serialized writer of airing history
pub struct PlaybackRecorder {
    tracker: RotationTracker,
    planner: SegmentPlanner,
    lock: Mutex<()>,
}

impl PlaybackRecorder {
    pub fn new(tracker: RotationTracker, planner: SegmentPlanner) -> Arc<Self> {
        Arc::new(Self {
            tracker,
            planner,
            lock: Mutex::new(()),
        })
    }

    pub fn tracker(&self) -> &RotationTracker {
        &self.tracker
    }

    pub fn planner(&self) -> &SegmentPlanner {
        &self.planner
    }

    /// A program came on air on `date`
    ///
    /// The play is recorded at the program's scheduled start, so reporting
    /// the same airing twice (a restarted tuner, say) changes nothing.
    /// Commercials are not tracked.
    pub fn record_started(&self, program: &ScheduledProgram, date: NaiveDate) -> Result<()> {
        if program.category == Category::Commercial {
            return Ok(());
        }
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let minutes = f64::from(program.segment_duration()) / 60.0;
        self.tracker.record_play_at(
            &program.show_key,
            &program.content_id,
            minutes,
            at_clock(date, program.start_time),
        )?;
        debug!("Recorded play of {} ({:.1} min)", program.content_id, minutes);
        Ok(())
    }

    /// A program ran to the end of its segment
    ///
    /// Split programs move the resume point to the end of the block.
    pub fn record_completed(&self, program: &ScheduledProgram, date: NaiveDate) -> Result<()> {
        let Some(end) = program.block_end else {
            return Ok(());
        };
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        self.planner.save_position_on(&program.content_id, end, date)?;
        info!("Resume point of {} is now {} s", program.content_id, end);
        Ok(())
    }

    /// Playback stopped part way through a split program
    pub fn record_progress(&self, program: &ScheduledProgram, position: u32, date: NaiveDate) -> Result<()> {
        if !program.is_split() || position <= program.segment_start() {
            return Ok(());
        }
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let position = position.min(program.segment_end());
        self.planner.save_position_on(&program.content_id, position, date)?;
        info!("Saved progress of {} at {} s", program.content_id, position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ContentItem;
    use ktv_common::{FixedClock, MemoryStore};

    fn recorder() -> (Arc<PlaybackRecorder>, NaiveDate) {
        let date = NaiveDate::from_ymd_opt(2025, 11, 4).unwrap();
        let clock = Arc::new(FixedClock::new(date.and_hms_opt(9, 0, 0).unwrap()));
        let store = Arc::new(MemoryStore::new());
        let tracker = RotationTracker::new(store.clone(), clock.clone(), 720);
        let planner = SegmentPlanner::new(store, clock, 1200);
        (PlaybackRecorder::new(tracker, planner), date)
    }

    #[test]
    fn test_started_twice_counts_once() {
        let (recorder, date) = recorder();
        let episode = ContentItem::new("bluey-001", Category::Cartoon, 420);
        let program = ScheduledProgram::whole(25_200, &episode);

        recorder.record_started(&program, date).unwrap();
        recorder.record_started(&program, date).unwrap();

        assert_eq!(recorder.tracker().minutes_on("bluey", date), 7.0);
    }

    #[test]
    fn test_commercials_are_not_tracked() {
        let (recorder, date) = recorder();
        let ad = ContentItem::new("ad-001", Category::Commercial, 30);
        recorder
            .record_started(&ScheduledProgram::whole(25_200, &ad), date)
            .unwrap();
        assert!(recorder.tracker().history("ad").is_empty());
    }

    #[test]
    fn test_completed_block_moves_resume_point() {
        let (recorder, date) = recorder();
        let movie = ContentItem::new("movie-1", Category::Movie, 3600);

        recorder
            .record_completed(&ScheduledProgram::whole(0, &movie), date)
            .unwrap();
        assert_eq!(recorder.planner().resume_position("movie-1"), 0);

        recorder
            .record_completed(&ScheduledProgram::block(0, &movie, 0, 1200), date)
            .unwrap();
        assert_eq!(recorder.planner().resume_position("movie-1"), 1200);
    }

    #[test]
    fn test_progress_is_clamped_to_segment() {
        let (recorder, date) = recorder();
        let movie = ContentItem::new("movie-1", Category::Movie, 3600);
        let program = ScheduledProgram::block(0, &movie, 1200, 2400);

        recorder.record_progress(&program, 1000, date).unwrap();
        assert_eq!(recorder.planner().resume_position("movie-1"), 0);

        recorder.record_progress(&program, 1500, date).unwrap();
        assert_eq!(recorder.planner().resume_position("movie-1"), 1500);

        recorder.record_progress(&program, 9000, date).unwrap();
        assert_eq!(recorder.planner().resume_position("movie-1"), 2400);
    }
}

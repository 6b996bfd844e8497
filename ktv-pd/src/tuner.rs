//! Tuner
//!
//! Watches the playhead on a fixed period and turns changes into channel
//! events. It is also what feeds the playback recorder: a program counts
//! as aired once the tuner has seen it on air.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use ktv_common::time::seconds_since_midnight;
use ktv_common::{ChannelEvent, OffAirReason, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::resolver::PlayheadState;
use crate::schedule::ScheduledProgram;
use crate::service::ChannelService;

/// Program the tuner last saw on air
#[derive(Debug, Clone)]
struct OnAir {
    program: ScheduledProgram,
    date: NaiveDate,
    position: u32,
}

impl OnAir {
    fn is(&self, program: &ScheduledProgram, date: NaiveDate) -> bool {
        self.date == date
            && self.program.start_time == program.start_time
            && self.program.content_id == program.content_id
    }
}

pub struct Tuner {
    service: Arc<ChannelService>,
    on_air: Option<OnAir>,
    off_air: Option<OffAirReason>,
}

impl Tuner {
    pub fn new(service: Arc<ChannelService>) -> Self {
        Self {
            service,
            on_air: None,
            off_air: None,
        }
    }

    /// Observe the playhead once and return what changed
    pub async fn poll(&mut self) -> Result<Vec<ChannelEvent>> {
        let now = self.service.clock().now();
        let date = now.date();
        let (_, state) = self.service.playhead_at(now).await?;
        let mut events = Vec::new();

        if let (Some(seen), Some(current)) = (self.on_air.as_mut(), state.current.as_ref()) {
            if seen.is(current, date) {
                seen.position = state.video_position;
                return Ok(events);
            }
        }

        if let Some(previous) = self.on_air.take() {
            let finished = previous.date != date || seconds_since_midnight(now.time()) >= previous.program.end_time();
            events.push(self.leave(previous, finished));
        }

        match state.current.clone() {
            Some(program) => {
                events.push(self.enter(program, date, &state));
                self.off_air = None;
            }
            None => {
                if self.off_air != state.off_air_reason {
                    if let Some(reason) = state.off_air_reason {
                        info!("Off air: {:?}", reason);
                        events.push(ChannelEvent::WentOffAir {
                            reason,
                            next_start_time: state.next.as_ref().map(|p| p.start_time),
                            timestamp: now,
                        });
                    }
                    self.off_air = state.off_air_reason;
                }
            }
        }

        Ok(events)
    }

    /// Stop watching; a program still on air is recorded as interrupted
    pub fn stop(&mut self) -> Option<ChannelEvent> {
        let previous = self.on_air.take()?;
        Some(self.leave(previous, false))
    }

    fn enter(&mut self, program: ScheduledProgram, date: NaiveDate, state: &PlayheadState) -> ChannelEvent {
        info!(
            "On air: {} ({} s into the content)",
            program.content_id, state.video_position
        );
        if let Err(e) = self.service.recorder().record_started(&program, date) {
            warn!("Failed to record start of {}: {}", program.content_id, e);
        }

        let event = ChannelEvent::ProgramStarted {
            content_id: program.content_id.clone(),
            category: program.category,
            start_time: program.start_time,
            position_seconds: state.video_position,
            segment_start: state.segment_start,
            segment_end: state.segment_end,
            timestamp: self.service.clock().now(),
        };
        self.on_air = Some(OnAir {
            program,
            date,
            position: state.video_position,
        });
        event
    }

    fn leave(&self, previous: OnAir, finished: bool) -> ChannelEvent {
        let recorder = self.service.recorder();
        let OnAir { program, date, position } = previous;

        let position = if finished {
            if let Err(e) = recorder.record_completed(&program, date) {
                warn!("Failed to record completion of {}: {}", program.content_id, e);
            }
            program.segment_end()
        } else {
            if let Err(e) = recorder.record_progress(&program, position, date) {
                warn!("Failed to record progress of {}: {}", program.content_id, e);
            }
            position
        };
        debug!("{} left the air at {} s", program.content_id, position);

        ChannelEvent::ProgramEnded {
            content_id: program.content_id,
            category: program.category,
            start_time: program.start_time,
            position_seconds: position,
            completed: finished,
            timestamp: self.service.clock().now(),
        }
    }

    /// Poll every `period` until `shutdown` flips, publishing on the
    /// service's event bus
    pub async fn run(mut self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!("Tuner started, polling every {:?}", period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.poll().await {
                        Ok(events) => {
                            for event in events {
                                self.service.bus().emit_lossy(event);
                            }
                        }
                        Err(e) => warn!("Tuner poll failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Some(event) = self.stop() {
            self.service.bus().emit_lossy(event);
        }
        info!("Tuner stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ContentItem, StaticCatalog};
    use crate::config::{BroadcastConfig, ChannelConfig};
    use chrono::Duration as ChronoDuration;
    use ktv_common::{Category, EventBus, FixedClock, MemoryStore};

    fn tuner() -> (Tuner, Arc<FixedClock>, Arc<ChannelService>) {
        let date = NaiveDate::from_ymd_opt(2025, 11, 4).unwrap();
        let clock = Arc::new(FixedClock::new(date.and_hms_opt(6, 59, 0).unwrap()));
        let config = ChannelConfig {
            broadcast: BroadcastConfig {
                start: 7 * 3600,
                end: 8 * 3600,
                ..BroadcastConfig::default()
            },
            ..ChannelConfig::default()
        };
        let service = ChannelService::new(
            config,
            Arc::new(StaticCatalog::new(vec![
                ContentItem::new("bluey-001", Category::Cartoon, 420),
                ContentItem::new("ad-001", Category::Commercial, 30),
            ])),
            Arc::new(MemoryStore::new()),
            clock.clone(),
            EventBus::new(16),
        );
        (Tuner::new(service.clone()), clock, service)
    }

    #[tokio::test]
    async fn test_poll_reports_transitions_once() {
        let (mut tuner, clock, service) = tuner();

        let events = tuner.poll().await.unwrap();
        assert!(matches!(
            events.as_slice(),
            [ChannelEvent::WentOffAir { reason: OffAirReason::BeforeFirstProgram, next_start_time: Some(25_200), .. }]
        ));
        assert!(tuner.poll().await.unwrap().is_empty());

        // 07:00:10, ten seconds into the first commercial
        clock.advance(ChronoDuration::seconds(70));
        let events = tuner.poll().await.unwrap();
        assert!(matches!(
            events.as_slice(),
            [ChannelEvent::ProgramStarted { position_seconds: 10, .. }]
        ));
        assert!(tuner.poll().await.unwrap().is_empty());

        // 07:01:00, cartoon on air after the commercial
        clock.advance(ChronoDuration::seconds(50));
        let events = tuner.poll().await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ChannelEvent::ProgramEnded { completed: true, .. }));
        assert!(matches!(&events[1], ChannelEvent::ProgramStarted { content_id, .. } if content_id == "bluey-001"));

        let date = NaiveDate::from_ymd_opt(2025, 11, 4).unwrap();
        assert_eq!(service.recorder().tracker().minutes_on("bluey", date), 7.0);
    }

    #[tokio::test]
    async fn test_stop_reports_interrupted_program() {
        let (mut tuner, clock, _) = tuner();
        clock.advance(ChronoDuration::seconds(180));
        tuner.poll().await.unwrap();

        match tuner.stop() {
            Some(ChannelEvent::ProgramEnded { completed, content_id, position_seconds, .. }) => {
                assert!(!completed);
                assert_eq!(content_id, "bluey-001");
                assert_eq!(position_seconds, 60);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(tuner.stop().is_none());
    }
}

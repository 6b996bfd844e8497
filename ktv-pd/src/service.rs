//! Channel service
//!
//! Owns the week's grids and wires the catalog, persisted history and
//! clock together. The HTTP layer and the tuner both go through here.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use ktv_common::time::{next_date_for_weekday, seconds_since_midnight, weekday_index};
use ktv_common::{ChannelEvent, Clock, EventBus, KeyValueStore, Result};
use tokio::sync::RwLock;
use tracing::info;

use crate::catalog::{log_census, ContentCatalog, ContentItem};
use crate::config::ChannelConfig;
use crate::generator::ScheduleGenerator;
use crate::recorder::PlaybackRecorder;
use crate::resolver::{resolve_available, PlayheadState};
use crate::rotation::RotationTracker;
use crate::schedule::{DaySchedule, WeekSchedule};
use crate::segment::SegmentPlanner;

pub struct ChannelService {
    config: ChannelConfig,
    catalog: Arc<dyn ContentCatalog>,
    clock: Arc<dyn Clock>,
    recorder: Arc<PlaybackRecorder>,
    week: RwLock<WeekSchedule>,
    bus: EventBus,
}

impl ChannelService {
    pub fn new(
        config: ChannelConfig,
        catalog: Arc<dyn ContentCatalog>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        bus: EventBus,
    ) -> Arc<Self> {
        let broadcast = &config.broadcast;
        let tracker = RotationTracker::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            broadcast.episode_cooldown_minutes,
        );
        let planner = SegmentPlanner::new(store, Arc::clone(&clock), broadcast.max_block);

        Arc::new(Self {
            recorder: PlaybackRecorder::new(tracker, planner),
            config,
            catalog,
            clock,
            week: RwLock::new(WeekSchedule::new()),
            bus,
        })
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn recorder(&self) -> &Arc<PlaybackRecorder> {
        &self.recorder
    }

    pub fn catalog_items(&self) -> Result<Vec<ContentItem>> {
        self.catalog.list_content()
    }

    /// Generate seven days starting at `week_start`, replacing all grids
    pub async fn generate_week(&self, week_start: NaiveDate) -> Result<()> {
        let items = self.catalog_items()?;
        log_census(&items);

        let generated = ScheduleGenerator::new(&self.config).generate_week(
            &items,
            self.recorder.tracker(),
            self.recorder.planner(),
            week_start,
        );
        for day in generated.values() {
            self.announce(day);
        }

        *self.week.write().await = generated;
        info!("Generated week starting {}", week_start);
        Ok(())
    }

    /// Regenerate the grid for the next `weekday` (today included)
    pub async fn regenerate_day(&self, weekday: Weekday) -> Result<DaySchedule> {
        self.generate_date(next_date_for_weekday(self.clock.today(), weekday)).await
    }

    async fn generate_date(&self, date: NaiveDate) -> Result<DaySchedule> {
        let items = self.catalog_items()?;
        let day = ScheduleGenerator::new(&self.config).generate_day(
            &items,
            self.recorder.tracker(),
            self.recorder.planner(),
            date,
        );
        self.announce(&day);

        self.week.write().await.insert(day.weekday, day.clone());
        Ok(day)
    }

    /// Grid for a weekday index (0 = Sunday), if generated
    pub async fn schedule_for(&self, weekday: u32) -> Option<DaySchedule> {
        self.week.read().await.get(&weekday).cloned()
    }

    /// Grid for `date`, generated on demand when missing or stale
    pub async fn day_for(&self, date: NaiveDate) -> Result<DaySchedule> {
        if let Some(day) = self.schedule_for(weekday_index(date.weekday())).await {
            if day.date == date {
                return Ok(day);
            }
        }
        info!("No grid for {}, generating", date);
        self.generate_date(date).await
    }

    pub async fn today(&self) -> Result<DaySchedule> {
        self.day_for(self.clock.today()).await
    }

    /// Playhead at `now` against that day's grid
    ///
    /// Content missing from the current catalog resolves as off air.
    pub async fn playhead_at(&self, now: NaiveDateTime) -> Result<(DaySchedule, PlayheadState)> {
        let day = self.day_for(now.date()).await?;
        let items = self.catalog_items()?;
        let available: HashSet<&str> = items
            .iter()
            .chain(day.extra_items.iter())
            .map(|item| item.id.as_str())
            .collect();

        let state = resolve_available(&day.programs, seconds_since_midnight(now.time()), |id| {
            available.contains(id)
        });
        Ok((day, state))
    }

    pub async fn playhead_now(&self) -> Result<(DaySchedule, PlayheadState)> {
        self.playhead_at(self.clock.now()).await
    }

    fn announce(&self, day: &DaySchedule) {
        self.bus.emit_lossy(ChannelEvent::ScheduleGenerated {
            date: day.date,
            weekday: day.weekday,
            program_count: day.programs.len(),
            exhausted: day.report.exhausted_at.is_some(),
            timestamp: self.clock.now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use ktv_common::{Category, FixedClock, MemoryStore};

    fn service(items: Vec<ContentItem>) -> (Arc<ChannelService>, Arc<FixedClock>) {
        let now = NaiveDate::from_ymd_opt(2025, 11, 4)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let clock = Arc::new(FixedClock::new(now));
        let service = ChannelService::new(
            ChannelConfig::default(),
            Arc::new(StaticCatalog::new(items)),
            Arc::new(MemoryStore::new()),
            clock.clone(),
            EventBus::new(16),
        );
        (service, clock)
    }

    #[tokio::test]
    async fn test_today_is_generated_on_demand() {
        let (service, _) = service(vec![
            ContentItem::new("bluey-001", Category::Cartoon, 420),
            ContentItem::new("ad-001", Category::Commercial, 30),
        ]);
        let mut rx = service.bus().subscribe();

        let day = service.today().await.unwrap();
        assert_eq!(day.date, NaiveDate::from_ymd_opt(2025, 11, 4).unwrap());
        assert!(!day.programs.is_empty());
        assert!(matches!(rx.try_recv(), Ok(ChannelEvent::ScheduleGenerated { .. })));

        // Second call reuses the stored grid
        service.today().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stale_grid_is_replaced() {
        let (service, clock) = service(vec![ContentItem::new("bluey-001", Category::Cartoon, 420)]);
        service.today().await.unwrap();

        clock.advance(chrono::Duration::days(7));
        let day = service.today().await.unwrap();
        assert_eq!(day.date, NaiveDate::from_ymd_opt(2025, 11, 11).unwrap());
    }

    #[tokio::test]
    async fn test_generation_leaves_history_untouched() {
        let (service, _) = service(vec![ContentItem::new("bluey-001", Category::Cartoon, 420)]);
        service
            .generate_week(NaiveDate::from_ymd_opt(2025, 11, 2).unwrap())
            .await
            .unwrap();

        assert!(service.schedule_for(0).await.is_some());
        assert!(service.schedule_for(6).await.is_some());
        assert!(service.recorder().tracker().history("bluey").is_empty());
    }
}

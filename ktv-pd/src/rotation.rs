//! Episode rotation tracking
//!
//! Persistent per-show play history. Answers two questions for the
//! generator: "which episode of this show should air next" and "has this
//! show used up its minutes for the day".
//!
//! History lives in the key-value store under `rotation/<showKey>`, one
//! JSON object per show mapping content id to its last play. Day buckets
//! are lazy: an entry remembers the calendar date of its last play and its
//! minutes only count toward that date. Nothing is ever cleared.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use ktv_common::store::{get_setting, rotation_key, set_setting, ROTATION_PREFIX};
use ktv_common::{Clock, KeyValueStore, MemoryStore, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::ContentItem;

/// Last play of one content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodePlay {
    pub last_played_at: NaiveDateTime,
    /// Calendar date the minutes below belong to
    pub played_on: NaiveDate,
    pub minutes_played_today: f64,
}

/// Play history of one show, keyed by content id
pub type ShowHistory = BTreeMap<String, EpisodePlay>;

/// Per-show rotation history on top of the persistence port
#[derive(Clone)]
pub struct RotationTracker {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    cooldown: chrono::Duration,
}

impl RotationTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, cooldown_minutes: u32) -> Self {
        Self {
            store,
            clock,
            cooldown: chrono::Duration::minutes(i64::from(cooldown_minutes)),
        }
    }

    /// History of one show; unreadable history is treated as empty
    pub fn history(&self, show_key: &str) -> ShowHistory {
        match get_setting::<ShowHistory>(self.store.as_ref(), &rotation_key(show_key)) {
            Ok(Some(history)) => history,
            Ok(None) => ShowHistory::new(),
            Err(e) => {
                warn!("Ignoring unreadable rotation history for {}: {}", show_key, e);
                ShowHistory::new()
            }
        }
    }

    /// Record that `content` aired for `minutes`, now
    pub fn record_play(&self, content: &ContentItem, minutes: f64) -> Result<()> {
        self.record_play_at(&content.show_key, &content.id, minutes, self.clock.now())
    }

    /// Record a play at an explicit instant
    ///
    /// Replaying the same airing (same content, same instant) is a no-op, so
    /// an observer that re-reports a program it already reported does not
    /// double-count minutes. A second airing on the same date adds to that
    /// date's minutes; the first airing on a new date starts a new bucket.
    pub fn record_play_at(
        &self,
        show_key: &str,
        content_id: &str,
        minutes: f64,
        at: NaiveDateTime,
    ) -> Result<()> {
        let mut history = self.history(show_key);
        let today = at.date();

        match history.get_mut(content_id) {
            Some(play) if play.last_played_at == at => {
                debug!("Play of {} at {} already recorded", content_id, at);
                return Ok(());
            }
            Some(play) => {
                if play.played_on == today {
                    play.minutes_played_today += minutes;
                } else {
                    play.played_on = today;
                    play.minutes_played_today = minutes;
                }
                play.last_played_at = at;
            }
            None => {
                history.insert(
                    content_id.to_string(),
                    EpisodePlay {
                        last_played_at: at,
                        played_on: today,
                        minutes_played_today: minutes,
                    },
                );
            }
        }

        set_setting(self.store.as_ref(), &rotation_key(show_key), &history)
    }

    /// Minutes a show has aired on `date`
    pub fn minutes_on(&self, show_key: &str, date: NaiveDate) -> f64 {
        self.history(show_key)
            .values()
            .filter(|play| play.played_on == date)
            .map(|play| play.minutes_played_today)
            .sum()
    }

    /// True iff the show has aired at least `cap_minutes` today
    pub fn has_reached_daily_limit(&self, show_key: &str, cap_minutes: u32) -> bool {
        self.has_reached_daily_limit_on(show_key, cap_minutes, self.clock.today())
    }

    pub fn has_reached_daily_limit_on(&self, show_key: &str, cap_minutes: u32, date: NaiveDate) -> bool {
        self.minutes_on(show_key, date) >= f64::from(cap_minutes)
    }

    /// Next episode of a show, judged at the current time
    pub fn get_next_episode<'a>(
        &self,
        show_key: &str,
        episodes: &[&'a ContentItem],
    ) -> Option<&'a ContentItem> {
        self.get_next_episode_at(show_key, episodes, self.clock.now())
    }

    /// Next episode of a show, judged at `now`
    ///
    /// **Algorithm:**
    /// 1. Eligible episodes: never played, or rested longer than the cooldown
    /// 2. Among eligible, the lowest episode order wins
    /// 3. If nothing is eligible, the episode played longest ago wins
    ///    (ties by episode order)
    ///
    /// Returns `None` only when `episodes` is empty.
    pub fn get_next_episode_at<'a>(
        &self,
        show_key: &str,
        episodes: &[&'a ContentItem],
        now: NaiveDateTime,
    ) -> Option<&'a ContentItem> {
        let history = self.history(show_key);
        let last_played = |item: &ContentItem| history.get(&item.id).map(|p| p.last_played_at);

        let eligible = episodes
            .iter()
            .copied()
            .filter(|item| match last_played(*item) {
                None => true,
                Some(at) => now - at > self.cooldown,
            })
            .min_by(|a, b| a.episode_order.cmp(&b.episode_order).then_with(|| a.id.cmp(&b.id)));

        if eligible.is_some() {
            return eligible;
        }

        episodes.iter().copied().min_by(|a, b| {
            last_played(*a)
                .cmp(&last_played(*b))
                .then_with(|| a.episode_order.cmp(&b.episode_order))
                .then_with(|| a.id.cmp(&b.id))
        })
    }

    /// In-memory copy of all rotation history
    ///
    /// The copy shares the clock but none of the storage; writes to it never
    /// reach the original store.
    pub fn fork(&self) -> RotationTracker {
        let scratch = MemoryStore::new();
        match self.store.keys_with_prefix(ROTATION_PREFIX) {
            Ok(keys) => {
                for key in keys {
                    match self.store.get(&key) {
                        Ok(Some(value)) => {
                            // MemoryStore writes are infallible
                            let _ = scratch.put(&key, value);
                        }
                        Ok(None) => {}
                        Err(e) => warn!("Skipping rotation key {} in fork: {}", key, e),
                    }
                }
            }
            Err(e) => warn!("Cannot list rotation history, forking empty: {}", e),
        }

        RotationTracker {
            store: Arc::new(scratch),
            clock: Arc::clone(&self.clock),
            cooldown: self.cooldown,
        }
    }
}

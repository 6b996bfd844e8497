//! Channel configuration
//!
//! Loaded once from TOML (or compiled defaults), validated, and immutable
//! afterwards. All times and durations are converted to whole seconds here
//! so that nothing downstream parses strings at tick time.
//!
//! # Settings Sources Priority
//!
//! 1. `--config` command-line argument
//! 2. `KTV_CONFIG` environment variable
//! 3. `~/.config/ktv/config.toml` (platform config dir)
//! 4. Compiled defaults

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use ktv_common::config::{load_toml_or_default, LoggingConfig};
use ktv_common::time::{parse_clock, SECONDS_PER_DAY};
use ktv_common::{Category, Error, Result};
use serde::Deserialize;

const MINUTES_PER_DAY: u32 = SECONDS_PER_DAY / 60;

/// Weighted time-of-day range for one category
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSlot {
    /// Seconds since midnight, inclusive
    pub start: u32,
    /// Seconds since midnight, exclusive
    pub end: u32,
    pub weight: f64,
}

impl TimeSlot {
    pub fn contains(&self, seconds: u32) -> bool {
        seconds >= self.start && seconds < self.end
    }
}

/// Scheduling rules for one category
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryPolicy {
    /// Shortest acceptable program, seconds
    pub min_duration: u32,
    /// Longest acceptable program, seconds
    pub max_duration: u32,
    /// Maximum programs of this category per day
    pub daily_quota: u32,
    /// 1 (lowest) to 5 (highest)
    pub priority: u8,
    pub time_slots: Vec<TimeSlot>,
    /// Carve items into bounded blocks and resume them across programs
    pub split_long_form: bool,
}

impl CategoryPolicy {
    /// Weight of the first slot containing `seconds`, 1.0 outside every slot
    pub fn slot_weight(&self, seconds: u32) -> f64 {
        self.time_slots
            .iter()
            .find(|slot| slot.contains(seconds))
            .map(|slot| slot.weight)
            .unwrap_or(1.0)
    }

    pub fn accepts_duration(&self, seconds: u32) -> bool {
        seconds >= self.min_duration && seconds <= self.max_duration
    }
}

/// Policies for every category
///
/// Always holds an entry for each [`Category`].
#[derive(Debug, Clone, PartialEq)]
pub struct PolicySet {
    policies: BTreeMap<Category, CategoryPolicy>,
}

impl PolicySet {
    pub fn get(&self, category: Category) -> &CategoryPolicy {
        // Every constructor fills all four categories
        &self.policies[&category]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &CategoryPolicy)> {
        self.policies.iter().map(|(c, p)| (*c, p))
    }

    /// Replace one category's policy
    pub fn with(mut self, category: Category, policy: CategoryPolicy) -> Self {
        self.policies.insert(category, policy);
        self
    }
}

impl Default for PolicySet {
    fn default() -> Self {
        let policies = Category::ALL
            .iter()
            .map(|c| (*c, default_policy(*c)))
            .collect();
        Self { policies }
    }
}

fn slot(start_hour: u32, end_hour: u32, weight: f64) -> TimeSlot {
    TimeSlot {
        start: start_hour * 3600,
        end: end_hour * 3600,
        weight,
    }
}

/// Compiled default policy for a category
pub fn default_policy(category: Category) -> CategoryPolicy {
    match category {
        Category::Cartoon => CategoryPolicy {
            min_duration: 5 * 60,
            max_duration: 25 * 60,
            daily_quota: 15,
            priority: 4,
            time_slots: vec![slot(7, 12, 9.0), slot(12, 14, 6.0), slot(17, 20, 8.0)],
            split_long_form: true,
        },
        Category::EducationalClip => CategoryPolicy {
            min_duration: 3 * 60,
            max_duration: 15 * 60,
            daily_quota: 12,
            priority: 5,
            time_slots: vec![
                slot(7, 9, 10.0),
                slot(9, 11, 8.0),
                slot(14, 16, 7.0),
                slot(16, 18, 5.0),
            ],
            split_long_form: false,
        },
        Category::Commercial => CategoryPolicy {
            min_duration: 30,
            max_duration: 2 * 60,
            daily_quota: 20,
            priority: 2,
            time_slots: vec![slot(7, 20, 5.0)],
            split_long_form: false,
        },
        Category::Movie => CategoryPolicy {
            min_duration: 45 * 60,
            max_duration: 120 * 60,
            daily_quota: 1,
            priority: 3,
            time_slots: vec![slot(14, 16, 10.0), slot(18, 20, 8.0)],
            split_long_form: false,
        },
    }
}

/// Broadcast window and generator rules, all in seconds
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastConfig {
    pub start: u32,
    pub end: u32,
    pub commercial_interval: u32,
    pub max_consecutive_same_show: u32,
    pub max_minutes_per_show_per_day: u32,
    pub episode_cooldown_minutes: u32,
    pub max_block: u32,
    pub small_step: u32,
    pub large_step: u32,
    pub max_retries: u32,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            start: 7 * 3600,
            end: 20 * 3600,
            commercial_interval: 10 * 60,
            max_consecutive_same_show: 2,
            max_minutes_per_show_per_day: 60,
            episode_cooldown_minutes: 720,
            max_block: 20 * 60,
            small_step: 60,
            large_step: 5 * 60,
            max_retries: 5,
        }
    }
}

/// Movie announcement rules
#[derive(Debug, Clone, PartialEq)]
pub struct AnnouncementConfig {
    /// Announce a movie on each of the N days before it airs
    pub days_before: u32,
    /// Airings of each announcement per day
    pub per_day: u32,
    pub duration_seconds: u32,
}

impl Default for AnnouncementConfig {
    fn default() -> Self {
        Self {
            days_before: 5,
            per_day: 5,
            duration_seconds: 30,
        }
    }
}

/// A movie pinned to a fixed date and time
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledMovie {
    /// Catalog id of the movie
    pub id: String,
    pub title: Option<String>,
    pub date: NaiveDate,
    /// Seconds since midnight
    pub start: u32,
}

/// Complete, validated channel configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Base seed for deterministic selection
    pub seed: u64,
    pub broadcast: BroadcastConfig,
    pub policies: PolicySet,
    pub announcements: AnnouncementConfig,
    pub movies: Vec<ScheduledMovie>,
    pub logging: LoggingConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            broadcast: BroadcastConfig::default(),
            policies: PolicySet::default(),
            announcements: AnnouncementConfig::default(),
            movies: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ChannelConfig {
    /// Load from a TOML file; `None` or a missing file yields the compiled
    /// defaults (with a warning)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let raw: RawChannelConfig = load_toml_or_default(path)?;
        raw.validate()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: RawChannelConfig = toml::from_str(text)?;
        raw.validate()
    }

    /// Scheduled movies airing on `date`, ordered by start time
    pub fn movies_on(&self, date: NaiveDate) -> Vec<&ScheduledMovie> {
        let mut movies: Vec<&ScheduledMovie> = self.movies.iter().filter(|m| m.date == date).collect();
        movies.sort_by_key(|m| m.start);
        movies
    }
}

// ============================================================================
// TOML representation
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawChannelConfig {
    seed: u64,
    broadcast: RawBroadcast,
    policies: BTreeMap<String, RawPolicy>,
    announcements: RawAnnouncements,
    movies: Vec<RawMovie>,
    logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawBroadcast {
    start: String,
    end: String,
    commercial_interval_minutes: u32,
    max_consecutive_same_show: u32,
    max_minutes_per_show_per_day: u32,
    episode_cooldown_minutes: u32,
    max_block_minutes: u32,
    small_step_minutes: u32,
    large_step_minutes: u32,
    max_retries: u32,
}

impl Default for RawBroadcast {
    fn default() -> Self {
        let d = BroadcastConfig::default();
        Self {
            start: "07:00".to_string(),
            end: "20:00".to_string(),
            commercial_interval_minutes: d.commercial_interval / 60,
            max_consecutive_same_show: d.max_consecutive_same_show,
            max_minutes_per_show_per_day: d.max_minutes_per_show_per_day,
            episode_cooldown_minutes: d.episode_cooldown_minutes,
            max_block_minutes: d.max_block / 60,
            small_step_minutes: d.small_step / 60,
            large_step_minutes: d.large_step / 60,
            max_retries: d.max_retries,
        }
    }
}

/// Partial policy; unset fields keep the category default
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPolicy {
    min_duration_minutes: Option<f64>,
    max_duration_minutes: Option<f64>,
    daily_quota: Option<u32>,
    priority: Option<u8>,
    split_long_form: Option<bool>,
    time_slots: Option<Vec<RawTimeSlot>>,
}

#[derive(Debug, Deserialize)]
struct RawTimeSlot {
    start: String,
    end: String,
    weight: f64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawAnnouncements {
    days_before: u32,
    per_day: u32,
    duration_seconds: u32,
}

impl Default for RawAnnouncements {
    fn default() -> Self {
        let d = AnnouncementConfig::default();
        Self {
            days_before: d.days_before,
            per_day: d.per_day,
            duration_seconds: d.duration_seconds,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMovie {
    id: String,
    #[serde(default)]
    title: Option<String>,
    date: NaiveDate,
    time: String,
}

fn minutes_to_seconds(minutes: f64, field: &str, category: Category) -> Result<u32> {
    if !minutes.is_finite() || minutes <= 0.0 {
        return Err(Error::Config(format!(
            "policies.{}.{} must be positive, got {}",
            category, field, minutes
        )));
    }
    if minutes > f64::from(MINUTES_PER_DAY) {
        return Err(Error::Config(format!(
            "policies.{}.{} must be at most {} minutes, got {}",
            category, field, MINUTES_PER_DAY, minutes
        )));
    }
    Ok((minutes * 60.0).round() as u32)
}

impl RawChannelConfig {
    fn validate(self) -> Result<ChannelConfig> {
        let broadcast = self.broadcast.validate()?;

        let mut policies = PolicySet::default();
        for (name, raw) in self.policies {
            let category: Category = name
                .parse()
                .map_err(|_| Error::Config(format!("Unknown category in [policies]: {}", name)))?;
            let policy = raw.merge(category, default_policy(category))?;
            policies = policies.with(category, policy);
        }

        let announcements = AnnouncementConfig {
            days_before: self.announcements.days_before,
            per_day: self.announcements.per_day,
            duration_seconds: self.announcements.duration_seconds,
        };
        let commercial = policies.get(Category::Commercial);
        if announcements.per_day > 0 && !commercial.accepts_duration(announcements.duration_seconds) {
            return Err(Error::Config(format!(
                "announcements.duration_seconds ({}) must lie within the commercial bounds {}..={} s",
                announcements.duration_seconds, commercial.min_duration, commercial.max_duration
            )));
        }

        let mut movies = Vec::with_capacity(self.movies.len());
        for raw in self.movies {
            let start = parse_clock(&raw.time)?;
            if start >= SECONDS_PER_DAY {
                return Err(Error::Config(format!("Movie {} starts at end of day", raw.id)));
            }
            movies.push(ScheduledMovie {
                id: raw.id,
                title: raw.title,
                date: raw.date,
                start,
            });
        }

        Ok(ChannelConfig {
            seed: self.seed,
            broadcast,
            policies,
            announcements,
            movies,
            logging: self.logging,
        })
    }
}

impl RawBroadcast {
    fn validate(self) -> Result<BroadcastConfig> {
        let start = parse_clock(&self.start)?;
        let end = parse_clock(&self.end)?;
        if start >= end {
            return Err(Error::Config(format!(
                "broadcast.start ({}) must be before broadcast.end ({})",
                self.start, self.end
            )));
        }

        let positive = |value: u32, field: &str| {
            if value == 0 {
                Err(Error::Config(format!("broadcast.{} must be positive", field)))
            } else {
                Ok(value)
            }
        };
        // Minute fields are at most one day, so seconds always fit in u32
        let minutes = |value: u32, field: &str| {
            let value = positive(value, field)?;
            if value > MINUTES_PER_DAY {
                return Err(Error::Config(format!(
                    "broadcast.{} must be at most {} minutes, got {}",
                    field, MINUTES_PER_DAY, value
                )));
            }
            Ok(value)
        };

        Ok(BroadcastConfig {
            start,
            end,
            commercial_interval: minutes(self.commercial_interval_minutes, "commercial_interval_minutes")? * 60,
            max_consecutive_same_show: positive(self.max_consecutive_same_show, "max_consecutive_same_show")?,
            max_minutes_per_show_per_day: minutes(self.max_minutes_per_show_per_day, "max_minutes_per_show_per_day")?,
            episode_cooldown_minutes: self.episode_cooldown_minutes,
            max_block: minutes(self.max_block_minutes, "max_block_minutes")? * 60,
            small_step: minutes(self.small_step_minutes, "small_step_minutes")? * 60,
            large_step: minutes(self.large_step_minutes, "large_step_minutes")? * 60,
            max_retries: positive(self.max_retries, "max_retries")?,
        })
    }
}

impl RawPolicy {
    fn merge(self, category: Category, base: CategoryPolicy) -> Result<CategoryPolicy> {
        let min_duration = match self.min_duration_minutes {
            Some(m) => minutes_to_seconds(m, "min_duration_minutes", category)?,
            None => base.min_duration,
        };
        let max_duration = match self.max_duration_minutes {
            Some(m) => minutes_to_seconds(m, "max_duration_minutes", category)?,
            None => base.max_duration,
        };
        if min_duration > max_duration {
            return Err(Error::Config(format!(
                "policies.{}: min duration exceeds max duration",
                category
            )));
        }

        let daily_quota = self.daily_quota.unwrap_or(base.daily_quota);
        if daily_quota == 0 {
            return Err(Error::Config(format!(
                "policies.{}.daily_quota must be positive",
                category
            )));
        }

        let priority = self.priority.unwrap_or(base.priority);
        if !(1..=5).contains(&priority) {
            return Err(Error::Config(format!(
                "policies.{}.priority must be between 1 and 5, got {}",
                category, priority
            )));
        }

        let time_slots = match self.time_slots {
            Some(raw_slots) => {
                let mut slots = Vec::with_capacity(raw_slots.len());
                for raw in raw_slots {
                    let slot = TimeSlot {
                        start: parse_clock(&raw.start)?,
                        end: parse_clock(&raw.end)?,
                        weight: raw.weight,
                    };
                    if slot.start >= slot.end {
                        return Err(Error::Config(format!(
                            "policies.{}: time slot {}-{} is empty",
                            category, raw.start, raw.end
                        )));
                    }
                    if !slot.weight.is_finite() || slot.weight <= 0.0 {
                        return Err(Error::Config(format!(
                            "policies.{}: time slot weight must be positive",
                            category
                        )));
                    }
                    slots.push(slot);
                }
                slots
            }
            None => base.time_slots,
        };

        Ok(CategoryPolicy {
            min_duration,
            max_duration,
            daily_quota,
            priority,
            time_slots,
            split_long_form: self.split_long_form.unwrap_or(base.split_long_form),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiled_defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.broadcast.start, 25_200);
        assert_eq!(config.broadcast.end, 72_000);
        assert_eq!(config.broadcast.commercial_interval, 600);
        assert_eq!(config.broadcast.max_block, 1200);

        let cartoon = config.policies.get(Category::Cartoon);
        assert_eq!(cartoon.daily_quota, 15);
        assert!(cartoon.split_long_form);
        assert_eq!(config.policies.get(Category::Commercial).min_duration, 30);
    }

    #[test]
    fn test_empty_document_equals_defaults() {
        assert_eq!(ChannelConfig::from_toml_str("").unwrap(), ChannelConfig::default());
    }

    #[test]
    fn test_slot_weight_first_match_and_default() {
        let policy = default_policy(Category::EducationalClip);
        assert_eq!(policy.slot_weight(7 * 3600), 10.0);
        assert_eq!(policy.slot_weight(9 * 3600 - 1), 10.0);
        assert_eq!(policy.slot_weight(9 * 3600), 8.0);
        assert_eq!(policy.slot_weight(12 * 3600), 1.0);
    }

    #[test]
    fn test_partial_policy_override() {
        let config = ChannelConfig::from_toml_str(
            r#"
            seed = 7
            [broadcast]
            start = "08:00"
            commercial_interval_minutes = 15

            [policies.show]
            daily_quota = 4
            time_slots = [{ start = "08:00", end = "10:00", weight = 3 }]
            "#,
        )
        .unwrap();

        assert_eq!(config.seed, 7);
        assert_eq!(config.broadcast.start, 8 * 3600);
        assert_eq!(config.broadcast.end, 20 * 3600);
        assert_eq!(config.broadcast.commercial_interval, 900);

        let cartoon = config.policies.get(Category::Cartoon);
        assert_eq!(cartoon.daily_quota, 4);
        assert_eq!(cartoon.priority, 4);
        assert_eq!(cartoon.time_slots.len(), 1);
        assert_eq!(cartoon.slot_weight(9 * 3600), 3.0);
    }

    #[test]
    fn test_rejects_malformed_configuration() {
        let bad = [
            "[broadcast]\nstart = \"7am\"",
            "[broadcast]\nstart = \"20:00\"\nend = \"07:00\"",
            "[broadcast]\ncommercial_interval_minutes = 0",
            "[broadcast]\ncommercial_interval_minutes = 100000000",
            "[broadcast]\nmax_block_minutes = 4294967295",
            "[broadcast]\nlarge_step_minutes = 1441",
            "[broadcast]\nmax_minutes_per_show_per_day = 100000",
            "[policies.movie]\nmax_duration_minutes = 1e12",
            "[policies.cartoon]\ndaily_quota = 0",
            "[policies.cartoon]\nmin_duration_minutes = 0",
            "[policies.cartoon]\nmin_duration_minutes = 30\nmax_duration_minutes = 10",
            "[policies.cartoon]\npriority = 9",
            "[policies.podcast]\ndaily_quota = 1",
            "[policies.cartoon]\ntime_slots = [{ start = \"10:00\", end = \"09:00\", weight = 1 }]",
            "[policies.cartoon]\ntime_slots = [{ start = \"09:00\", end = \"10:00\", weight = 0 }]",
            "[announcements]\nduration_seconds = 15",
            "[[movies]]\nid = \"m\"\ndate = \"2025-11-04\"\ntime = \"25:00\"",
        ];
        for text in bad {
            assert!(ChannelConfig::from_toml_str(text).is_err(), "accepted: {}", text);
        }
    }

    #[test]
    fn test_movies_on_date() {
        let config = ChannelConfig::from_toml_str(
            r#"
            [[movies]]
            id = "movie-b"
            date = "2025-11-04"
            time = "18:00"

            [[movies]]
            id = "movie-a"
            date = "2025-11-04"
            time = "14:00"

            [[movies]]
            id = "movie-c"
            date = "2025-11-05"
            time = "14:00"
            "#,
        )
        .unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 11, 4).unwrap();
        let ids: Vec<&str> = config.movies_on(date).iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["movie-a", "movie-b"]);
    }
}

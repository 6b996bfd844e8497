//! Schedule data model
//!
//! A day's grid is an ordered, non-overlapping list of [`ScheduledProgram`]s
//! plus the report of how it was generated. Grids are created by the
//! generator and read-only afterwards.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use ktv_common::time::{format_clock, format_duration, seconds_since_midnight};
use ktv_common::Category;
use serde::{Deserialize, Serialize};

use crate::catalog::ContentItem;

/// One airing of content at a fixed time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledProgram {
    /// Seconds since midnight
    pub start_time: u32,
    pub content_id: String,
    pub category: Category,
    pub show_key: String,
    /// Full length of the content item, seconds
    pub content_duration: u32,
    /// Offset into the content where this program starts, when split
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_start: Option<u32>,
    /// Offset into the content where this program ends, when split
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_end: Option<u32>,
}

impl ScheduledProgram {
    /// Program airing `content` from start to finish
    pub fn whole(start_time: u32, content: &ContentItem) -> Self {
        Self {
            start_time,
            content_id: content.id.clone(),
            category: content.category,
            show_key: content.show_key.clone(),
            content_duration: content.duration_seconds,
            block_start: None,
            block_end: None,
        }
    }

    /// Program airing `[block_start, block_end)` of `content`
    pub fn block(start_time: u32, content: &ContentItem, block_start: u32, block_end: u32) -> Self {
        Self {
            block_start: Some(block_start),
            block_end: Some(block_end),
            ..Self::whole(start_time, content)
        }
    }

    /// First content offset aired
    pub fn segment_start(&self) -> u32 {
        self.block_start.unwrap_or(0)
    }

    /// Content offset where the program stops
    pub fn segment_end(&self) -> u32 {
        self.block_end.unwrap_or(self.content_duration)
    }

    /// Airtime of this program, seconds
    pub fn segment_duration(&self) -> u32 {
        self.segment_end().saturating_sub(self.segment_start())
    }

    /// Seconds since midnight at which the program goes off air
    pub fn end_time(&self) -> u32 {
        self.start_time + self.segment_duration()
    }

    /// True when the program reaches the end of its content
    pub fn completes_content(&self) -> bool {
        self.segment_end() >= self.content_duration
    }

    pub fn is_split(&self) -> bool {
        self.block_start.is_some() || self.block_end.is_some()
    }
}

/// How one day's generation went
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationReport {
    /// Programs per category
    pub counts: BTreeMap<Category, u32>,
    /// Airtime skipped because nothing could be placed, seconds
    pub skipped_seconds: u32,
    /// Candidates rejected by the consecutive-show guard
    pub guard_rejections: u32,
    /// Set when generation stopped early because nothing was selectable
    pub exhausted_at: Option<u32>,
    /// The catalog had no items at all
    pub empty_catalog: bool,
}

impl GenerationReport {
    pub fn count(&self, category: Category) -> u32 {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }
}

/// One day's grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub date: NaiveDate,
    /// 0 = Sunday
    pub weekday: u32,
    /// Sorted by start time, non-overlapping
    pub programs: Vec<ScheduledProgram>,
    /// Items created for this day only (movie announcements)
    #[serde(default)]
    pub extra_items: Vec<ContentItem>,
    pub report: GenerationReport,
}

impl DaySchedule {
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// First program starting strictly after `now`
    pub fn next_program(&self, now: NaiveTime) -> Option<&ScheduledProgram> {
        let now = seconds_since_midnight(now);
        self.programs.iter().find(|p| p.start_time > now)
    }

    /// Item referenced by a program, from `catalog` or this day's extras
    pub fn lookup<'a>(&'a self, catalog: &'a [ContentItem], content_id: &str) -> Option<&'a ContentItem> {
        catalog
            .iter()
            .chain(self.extra_items.iter())
            .find(|item| item.id == content_id)
    }

    /// Plain-text grid listing, one program per line
    pub fn render(&self) -> String {
        let mut out = format!(
            "{} (weekday {}): {} programs\n",
            self.date,
            self.weekday,
            self.programs.len()
        );
        for program in &self.programs {
            let block = match (program.block_start, program.block_end) {
                (Some(start), Some(end)) => format!(" [{}-{}]", format_duration(start), format_duration(end)),
                _ => String::new(),
            };
            out.push_str(&format!(
                "{}  {:<16} {:>8}  {}{}\n",
                format_clock(program.start_time),
                program.category.as_str(),
                format_duration(program.segment_duration()),
                program.content_id,
                block
            ));
        }
        out
    }
}

/// Seven grids keyed by weekday (0 = Sunday)
pub type WeekSchedule = BTreeMap<u32, DaySchedule>;

//! Segment planning for long-form content
//!
//! Long items are carved into bounded blocks so other categories can be
//! interleaved, and a viewer coming back later continues where the last
//! block ended. Resume positions live in the key-value store under
//! `resume/<contentId>`.

use std::sync::Arc;

use chrono::NaiveDate;
use ktv_common::store::{get_setting, resume_key, set_setting, RESUME_PREFIX};
use ktv_common::{Clock, KeyValueStore, MemoryStore, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::catalog::ContentItem;

/// Width used when a block would otherwise be empty
pub const MIN_BLOCK_SECONDS: u32 = 5;

/// Half-open range `[start, end)` of content offsets, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub start: u32,
    pub end: u32,
}

impl Block {
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// True when the block covers the whole item
    pub fn is_whole(&self, duration: u32) -> bool {
        self.start == 0 && self.end >= duration
    }
}

/// Persisted resume point of one content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeState {
    pub position: u32,
    pub saved_on: NaiveDate,
}

/// Next block of an item of `duration` seconds, starting at `prior_position`
///
/// Returns `None` when the item is exhausted (`prior_position >= duration`,
/// including stale positions past the end). A non-`None` block is never
/// empty.
///
/// ```
/// use ktv_pd::segment::{plan_block, Block};
///
/// assert_eq!(plan_block(3600, 0, 1200), Some(Block { start: 0, end: 1200 }));
/// assert_eq!(plan_block(3600, 1200, 1200), Some(Block { start: 1200, end: 2400 }));
/// assert_eq!(plan_block(3600, 3600, 1200), None);
/// ```
pub fn plan_block(duration: u32, prior_position: u32, max_block: u32) -> Option<Block> {
    if prior_position >= duration {
        return None;
    }

    let start = prior_position;
    let mut end = duration.min(start.saturating_add(max_block));
    if end <= start {
        end = duration.min(start.saturating_add(MIN_BLOCK_SECONDS));
    }

    Some(Block { start, end })
}

/// Block planning on top of persisted resume state
#[derive(Clone)]
pub struct SegmentPlanner {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    max_block: u32,
}

impl SegmentPlanner {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, max_block: u32) -> Self {
        Self {
            store,
            clock,
            max_block,
        }
    }

    pub fn max_block(&self) -> u32 {
        self.max_block
    }

    /// Block of `content` starting at `prior_position`
    pub fn plan_block(&self, content: &ContentItem, prior_position: u32) -> Option<Block> {
        plan_block(content.duration_seconds, prior_position, self.max_block)
    }

    /// Block of `content` starting at its saved resume position
    pub fn next_block(&self, content: &ContentItem) -> Option<Block> {
        self.plan_block(content, self.resume_position(&content.id))
    }

    pub fn resume_state(&self, content_id: &str) -> Option<ResumeState> {
        match get_setting::<ResumeState>(self.store.as_ref(), &resume_key(content_id)) {
            Ok(state) => state,
            Err(e) => {
                warn!("Ignoring unreadable resume state for {}: {}", content_id, e);
                None
            }
        }
    }

    /// Saved position, 0 when never saved
    pub fn resume_position(&self, content_id: &str) -> u32 {
        self.resume_state(content_id).map(|s| s.position).unwrap_or(0)
    }

    /// Persist `position` as the new resume point, dated today
    pub fn save_position(&self, content_id: &str, position: u32) -> Result<()> {
        self.save_position_on(content_id, position, self.clock.today())
    }

    pub fn save_position_on(&self, content_id: &str, position: u32, date: NaiveDate) -> Result<()> {
        set_setting(
            self.store.as_ref(),
            &resume_key(content_id),
            &ResumeState {
                position,
                saved_on: date,
            },
        )
    }

    /// In-memory copy of all resume state
    pub fn fork(&self) -> SegmentPlanner {
        let scratch = MemoryStore::new();
        match self.store.keys_with_prefix(RESUME_PREFIX) {
            Ok(keys) => {
                for key in keys {
                    if let Ok(Some(value)) = self.store.get(&key) {
                        let _ = scratch.put(&key, value);
                    }
                }
            }
            Err(e) => warn!("Cannot list resume state, forking empty: {}", e),
        }

        SegmentPlanner {
            store: Arc::new(scratch),
            clock: Arc::clone(&self.clock),
            max_block: self.max_block,
        }
    }
}

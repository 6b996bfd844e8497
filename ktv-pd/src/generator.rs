//! Schedule generation
//!
//! Builds one day's grid by sweeping the broadcast window minute by minute
//! and filling it with programs.
//!
//! **Per step:**
//! 1. Commercial gate: a commercial is due when none has aired yet or the
//!    last one started at least `commercial_interval` ago
//! 2. Otherwise the category with the best score wins, where
//!    `score = priority × slot weight × (1 − count/quota) × remaining quota`.
//!    Ties go to the category declared first
//! 3. Content is selected within the category (rotation for cartoons, seeded
//!    pick for clips and movies, announcements first for commercials). If a
//!    due commercial is unavailable the best-scoring category is tried next,
//!    then the others in declaration order. Commercials are never filler
//! 4. A cartoon that would exceed `max_consecutive_same_show` is rejected.
//!    If nothing else fits, the clock moves a small step (a large step after
//!    `max_retries` rejections in a row)
//! 5. The program is committed and the clock moves by its length rounded up
//!    to whole minutes
//! 6. Generation ends at the end of the window, or early when nothing in the
//!    catalog is selectable any more
//!
//! Generation runs against in-memory forks of the rotation and resume state.
//! The persisted history only changes when programs actually air.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Datelike, NaiveDate, Weekday};
use ktv_common::time::{at_clock, format_clock, next_date_for_weekday, weekday_index, SECONDS_PER_DAY};
use ktv_common::Category;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::announcements::{announcements_for, distribute_announcement_times, is_announcement};
use crate::catalog::ContentItem;
use crate::config::{CategoryPolicy, ChannelConfig};
use crate::rotation::RotationTracker;
use crate::schedule::{DaySchedule, GenerationReport, ScheduledProgram, WeekSchedule};
use crate::segment::{Block, SegmentPlanner};

/// Content grouped the way selection needs it
struct Pool<'c> {
    by_category: BTreeMap<Category, Vec<&'c ContentItem>>,
    shows: BTreeMap<&'c str, Vec<&'c ContentItem>>,
    announcements: Vec<&'c ContentItem>,
}

impl<'c> Pool<'c> {
    /// `reserved` ids only air at their pinned times
    fn new(items: &'c [ContentItem], announcements: &'c [ContentItem], reserved: &HashSet<&str>) -> Self {
        let mut by_category: BTreeMap<Category, Vec<&'c ContentItem>> = BTreeMap::new();
        let mut shows: BTreeMap<&'c str, Vec<&'c ContentItem>> = BTreeMap::new();

        for item in items.iter().filter(|item| !reserved.contains(item.id.as_str())) {
            by_category.entry(item.category).or_default().push(item);
            if item.category == Category::Cartoon {
                shows.entry(item.show_key.as_str()).or_default().push(item);
            }
        }
        for list in by_category.values_mut() {
            list.sort_by(|a, b| a.id.cmp(&b.id));
        }

        Self {
            by_category,
            shows,
            announcements: announcements.iter().collect(),
        }
    }

    fn of(&self, category: Category) -> &[&'c ContentItem] {
        self.by_category.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Outcome of planning one item under its category policy
enum Segment {
    /// Airable; `None` means the whole item
    Ready(Option<Block>),
    /// Nothing left to resume
    Exhausted,
    /// Length outside the category bounds
    OutOfBounds,
}

struct Candidate<'c> {
    item: &'c ContentItem,
    block: Option<Block>,
}

enum Pick<'c> {
    Found(Candidate<'c>),
    /// Only the consecutive-show guard stood in the way
    GuardBlocked,
    /// Candidates exist but do not fit at this time of day
    TimeBlocked,
    Nothing,
}

/// Mutable state of one day's sweep
struct DayState {
    date: NaiveDate,
    clock: u32,
    programs: Vec<ScheduledProgram>,
    pinned: Vec<(u32, u32)>,
    last_commercial_start: Option<u32>,
    last_show: Option<String>,
    consecutive: u32,
    retries: u32,
    completed: HashSet<String>,
    announcement_airings: HashMap<String, u32>,
    rng: StdRng,
    report: GenerationReport,
}

impl DayState {
    fn count(&self, category: Category) -> u32 {
        self.report.count(category)
    }

    /// End of the pinned program covering `at`, if any
    fn inside_pin(&self, at: u32) -> Option<u32> {
        self.pinned
            .iter()
            .find(|(start, end)| at >= *start && at < *end)
            .map(|(_, end)| *end)
    }

    fn next_pin_after(&self, at: u32) -> Option<u32> {
        self.pinned.iter().map(|(start, _)| *start).filter(|s| *s > at).min()
    }

    /// A program of `len` seconds can start at the current clock
    fn fits(&self, len: u32) -> bool {
        let start = self.clock;
        match start.checked_add(len) {
            Some(end) => end <= SECONDS_PER_DAY && !self.pinned.iter().any(|(ps, pe)| start < *pe && *ps < end),
            None => false,
        }
    }
}

/// Builds day and week grids from a catalog snapshot
pub struct ScheduleGenerator<'a> {
    config: &'a ChannelConfig,
}

impl<'a> ScheduleGenerator<'a> {
    pub fn new(config: &'a ChannelConfig) -> Self {
        Self { config }
    }

    /// Seed of the deterministic source for `date`
    pub fn seed_for(&self, date: NaiveDate) -> u64 {
        self.config
            .seed
            .wrapping_add((date.num_days_from_ce() as u64).wrapping_mul(1000))
    }

    /// Generate the grid for `date` without touching persisted history
    pub fn generate_day(
        &self,
        items: &[ContentItem],
        tracker: &RotationTracker,
        planner: &SegmentPlanner,
        date: NaiveDate,
    ) -> DaySchedule {
        let tracker = tracker.fork();
        let planner = planner.fork();
        self.generate_with(items, &tracker, &planner, date)
    }

    /// Generate the grid for the next `weekday` on or after `today`
    pub fn generate_for_weekday(
        &self,
        items: &[ContentItem],
        tracker: &RotationTracker,
        planner: &SegmentPlanner,
        today: NaiveDate,
        weekday: Weekday,
    ) -> DaySchedule {
        self.generate_day(items, tracker, planner, next_date_for_weekday(today, weekday))
    }

    /// Generate seven consecutive days starting at `week_start`
    ///
    /// Rotation and resume state carry over from one day to the next, so
    /// series keep progressing through the week.
    pub fn generate_week(
        &self,
        items: &[ContentItem],
        tracker: &RotationTracker,
        planner: &SegmentPlanner,
        week_start: NaiveDate,
    ) -> WeekSchedule {
        let tracker = tracker.fork();
        let planner = planner.fork();

        (0..7)
            .map(|offset| {
                let date = week_start + chrono::Duration::days(offset);
                let day = self.generate_with(items, &tracker, &planner, date);
                (weekday_index(date.weekday()), day)
            })
            .collect()
    }

    /// Generate the grid for `date`, writing plays into `tracker` and
    /// `planner` as they are scheduled
    ///
    /// Callers normally pass forks; see [`generate_day`](Self::generate_day).
    pub fn generate_with(
        &self,
        items: &[ContentItem],
        tracker: &RotationTracker,
        planner: &SegmentPlanner,
        date: NaiveDate,
    ) -> DaySchedule {
        let broadcast = &self.config.broadcast;
        let announcements = if items.is_empty() {
            Vec::new()
        } else {
            announcements_for(&self.config.movies, &self.config.announcements, date)
        };
        let reserved: HashSet<&str> = self.config.movies.iter().map(|m| m.id.as_str()).collect();
        let pool = Pool::new(items, &announcements, &reserved);

        let mut st = DayState {
            date,
            clock: broadcast.start,
            programs: Vec::new(),
            pinned: Vec::new(),
            last_commercial_start: None,
            last_show: None,
            consecutive: 0,
            retries: 0,
            completed: HashSet::new(),
            announcement_airings: HashMap::new(),
            rng: StdRng::seed_from_u64(self.seed_for(date)),
            report: GenerationReport::default(),
        };

        if items.is_empty() {
            warn!("Catalog is empty, {} stays off air", date);
            st.report.empty_catalog = true;
            return self.finish(st, announcements);
        }

        self.place_pinned_movies(&mut st, items, tracker);

        while st.clock < broadcast.end {
            if let Some(pin_end) = st.inside_pin(st.clock) {
                st.clock = pin_end;
                continue;
            }

            match self.pick(&mut st, &pool, tracker, planner) {
                Pick::Found(candidate) => {
                    self.commit(&mut st, candidate, tracker, planner);
                    st.retries = 0;
                }
                Pick::GuardBlocked => {
                    st.retries += 1;
                    if st.retries >= broadcast.max_retries {
                        self.skip(&mut st, broadcast.large_step);
                        st.retries = 0;
                    } else {
                        self.skip(&mut st, broadcast.small_step);
                    }
                }
                Pick::TimeBlocked => {
                    let step = match st.next_pin_after(st.clock) {
                        Some(pin_start) => broadcast.large_step.min(pin_start - st.clock),
                        None => broadcast.large_step,
                    };
                    self.skip(&mut st, step);
                }
                Pick::Nothing => {
                    warn!(
                        "Nothing selectable at {} on {}, ending grid early",
                        format_clock(st.clock),
                        date
                    );
                    st.report.exhausted_at = Some(st.clock);
                    break;
                }
            }
        }

        self.finish(st, announcements)
    }

    fn finish(&self, mut st: DayState, announcements: Vec<ContentItem>) -> DaySchedule {
        st.programs.sort_by_key(|p| p.start_time);

        let report = &st.report;
        info!(
            "Grid for {}: {} programs (cartoon {}, educational {}, commercial {}, movie {}), {} s skipped, {} guard rejections{}",
            st.date,
            st.programs.len(),
            report.count(Category::Cartoon),
            report.count(Category::EducationalClip),
            report.count(Category::Commercial),
            report.count(Category::Movie),
            report.skipped_seconds,
            report.guard_rejections,
            match report.exhausted_at {
                Some(at) => format!(", exhausted at {}", format_clock(at)),
                None => String::new(),
            }
        );

        DaySchedule {
            date: st.date,
            weekday: weekday_index(st.date.weekday()),
            programs: st.programs,
            extra_items: announcements,
            report: st.report,
        }
    }

    fn skip(&self, st: &mut DayState, step: u32) {
        let step = step.max(1);
        let skipped = step.min(self.config.broadcast.end.saturating_sub(st.clock));
        st.report.skipped_seconds += skipped;
        st.clock += step;
    }

    fn remaining_quota(&self, st: &DayState, category: Category) -> u32 {
        self.config
            .policies
            .get(category)
            .daily_quota
            .saturating_sub(st.count(category))
    }

    fn score(&self, st: &DayState, category: Category) -> f64 {
        let policy = self.config.policies.get(category);
        let quota = f64::from(policy.daily_quota);
        let count = f64::from(st.count(category));
        let remaining = f64::from(self.remaining_quota(st, category));
        f64::from(policy.priority) * policy.slot_weight(st.clock) * (1.0 - count / quota) * remaining
    }

    fn commercial_due(&self, st: &DayState) -> bool {
        match st.last_commercial_start {
            None => true,
            Some(last) => st.clock - last >= self.config.broadcast.commercial_interval,
        }
    }

    /// Categories to try at the current clock, best first
    fn category_order(&self, st: &DayState) -> Vec<Category> {
        let available: Vec<Category> = Category::ALL
            .iter()
            .copied()
            .filter(|c| self.remaining_quota(st, *c) > 0)
            .collect();

        let mut best: Option<(Category, f64)> = None;
        for category in available.iter().copied() {
            let score = self.score(st, category);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((category, score));
            }
        }
        let Some((best, _)) = best else {
            return Vec::new();
        };

        let mut order = Vec::with_capacity(available.len());
        if available.contains(&Category::Commercial) && self.commercial_due(st) {
            order.push(Category::Commercial);
        }
        if !order.contains(&best) {
            order.push(best);
        }
        let rest: Vec<Category> = available
            .into_iter()
            .filter(|c| !order.contains(c) && *c != Category::Commercial)
            .collect();
        order.extend(rest);
        order
    }

    fn pick<'c>(
        &self,
        st: &mut DayState,
        pool: &Pool<'c>,
        tracker: &RotationTracker,
        planner: &SegmentPlanner,
    ) -> Pick<'c> {
        let mut guard_blocked = false;
        let mut time_blocked = false;

        for category in self.category_order(st) {
            let pick = match category {
                Category::Cartoon => self.select_cartoon(st, pool, tracker, planner),
                Category::Commercial => self.select_commercial(st, pool),
                Category::EducationalClip | Category::Movie => {
                    self.select_seeded(st, pool, category, planner)
                }
            };
            match pick {
                Pick::Found(candidate) => return Pick::Found(candidate),
                Pick::GuardBlocked => guard_blocked = true,
                Pick::TimeBlocked => time_blocked = true,
                Pick::Nothing => {}
            }
        }

        if guard_blocked {
            Pick::GuardBlocked
        } else if time_blocked {
            Pick::TimeBlocked
        } else {
            Pick::Nothing
        }
    }

    /// Plan `item` under `policy`; `restart` ignores the saved resume point
    fn plan_segment(
        &self,
        item: &ContentItem,
        policy: &CategoryPolicy,
        planner: &SegmentPlanner,
        restart: bool,
    ) -> Segment {
        if !policy.split_long_form {
            return if policy.accepts_duration(item.duration_seconds) {
                Segment::Ready(None)
            } else {
                Segment::OutOfBounds
            };
        }

        let prior = if restart { 0 } else { planner.resume_position(&item.id) };
        let Some(block) = planner.plan_block(item, prior) else {
            return Segment::Exhausted;
        };

        if !policy.accepts_duration(block.len()) {
            // A tail too short to air on its own ends the item
            return if prior > 0 && block.len() < policy.min_duration {
                Segment::Exhausted
            } else {
                Segment::OutOfBounds
            };
        }

        if block.is_whole(item.duration_seconds) {
            Segment::Ready(None)
        } else {
            Segment::Ready(Some(block))
        }
    }

    fn segment_len(item: &ContentItem, block: Option<Block>) -> u32 {
        block.map(|b| b.len()).unwrap_or(item.duration_seconds)
    }

    fn select_cartoon<'c>(
        &self,
        st: &mut DayState,
        pool: &Pool<'c>,
        tracker: &RotationTracker,
        planner: &SegmentPlanner,
    ) -> Pick<'c> {
        let broadcast = &self.config.broadcast;
        let policy = self.config.policies.get(Category::Cartoon);
        let now = at_clock(st.date, st.clock);

        let mut shows: Vec<(&'c str, f64)> = pool
            .shows
            .keys()
            .copied()
            .filter(|show| !tracker.has_reached_daily_limit_on(show, broadcast.max_minutes_per_show_per_day, st.date))
            .map(|show| (show, tracker.minutes_on(show, st.date)))
            .collect();
        shows.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));

        let mut guard_blocked = false;
        let mut time_blocked = false;

        for (show, _) in shows {
            if st.last_show.as_deref() == Some(show) && st.consecutive >= broadcast.max_consecutive_same_show {
                debug!("Guard: {} already aired {} times in a row", show, st.consecutive);
                st.report.guard_rejections += 1;
                guard_blocked = true;
                continue;
            }

            let episodes: Vec<&'c ContentItem> = pool.shows[show]
                .iter()
                .copied()
                .filter(|item| !st.completed.contains(&item.id))
                .collect();

            let mut remaining = episodes;
            let mut exhausted: Vec<&'c ContentItem> = Vec::new();

            while let Some(episode) = tracker.get_next_episode_at(show, &remaining, now) {
                remaining.retain(|item| item.id != episode.id);
                match self.plan_segment(episode, policy, planner, false) {
                    Segment::Ready(block) => {
                        if st.fits(Self::segment_len(episode, block)) {
                            return Pick::Found(Candidate { item: episode, block });
                        }
                        time_blocked = true;
                    }
                    Segment::Exhausted => exhausted.push(episode),
                    Segment::OutOfBounds => {}
                }
            }

            // The whole show has been seen through: start it over
            while let Some(episode) = tracker.get_next_episode_at(show, &exhausted, now) {
                exhausted.retain(|item| item.id != episode.id);
                if let Segment::Ready(block) = self.plan_segment(episode, policy, planner, true) {
                    if st.fits(Self::segment_len(episode, block)) {
                        debug!("Restarting {} from the beginning", episode.id);
                        return Pick::Found(Candidate { item: episode, block });
                    }
                    time_blocked = true;
                }
            }
        }

        if guard_blocked {
            Pick::GuardBlocked
        } else if time_blocked {
            Pick::TimeBlocked
        } else {
            Pick::Nothing
        }
    }

    /// Clips and movies: unused today, within bounds, seeded pick
    fn select_seeded<'c>(
        &self,
        st: &mut DayState,
        pool: &Pool<'c>,
        category: Category,
        planner: &SegmentPlanner,
    ) -> Pick<'c> {
        let policy = self.config.policies.get(category);

        let ready: Vec<Candidate<'c>> = pool
            .of(category)
            .iter()
            .copied()
            .filter(|item| !st.completed.contains(&item.id))
            .filter_map(|item| match self.plan_segment(item, policy, planner, false) {
                Segment::Ready(block) => Some(Candidate { item, block }),
                _ => None,
            })
            .collect();

        if ready.is_empty() {
            return Pick::Nothing;
        }

        let fitting: Vec<&Candidate<'c>> = ready
            .iter()
            .filter(|c| st.fits(Self::segment_len(c.item, c.block)))
            .collect();

        match fitting.choose(&mut st.rng) {
            Some(chosen) => Pick::Found(Candidate {
                item: chosen.item,
                block: chosen.block,
            }),
            None => Pick::TimeBlocked,
        }
    }

    /// Commercials may repeat; announcements take their turn when due
    fn select_commercial<'c>(&self, st: &mut DayState, pool: &Pool<'c>) -> Pick<'c> {
        let per_day = self.config.announcements.per_day;
        let due_times = distribute_announcement_times(
            self.config.broadcast.start,
            self.config.broadcast.end,
            per_day,
        );
        let airings = |st: &DayState, item: &ContentItem| {
            st.announcement_airings.get(&item.id).copied().unwrap_or(0)
        };

        let mut time_blocked = false;

        for item in pool.announcements.iter().copied() {
            let aired = airings(&*st, item);
            let due = due_times
                .get(aired as usize)
                .map_or(false, |due_at| st.clock >= *due_at);
            if due {
                if st.fits(item.duration_seconds) {
                    return Pick::Found(Candidate { item, block: None });
                }
                time_blocked = true;
            }
        }

        let policy = self.config.policies.get(Category::Commercial);
        let regular: Vec<&'c ContentItem> = pool
            .of(Category::Commercial)
            .iter()
            .copied()
            .filter(|item| policy.accepts_duration(item.duration_seconds))
            .collect();

        if regular.is_empty() {
            // No regular commercials: any announcement with airings left
            for item in pool.announcements.iter().copied() {
                if airings(&*st, item) < per_day {
                    if st.fits(item.duration_seconds) {
                        return Pick::Found(Candidate { item, block: None });
                    }
                    time_blocked = true;
                }
            }
            return if time_blocked { Pick::TimeBlocked } else { Pick::Nothing };
        }

        let fitting: Vec<&'c ContentItem> = regular
            .into_iter()
            .filter(|item| st.fits(item.duration_seconds))
            .collect();

        match fitting.choose(&mut st.rng) {
            Some(item) => Pick::Found(Candidate { item: *item, block: None }),
            None => Pick::TimeBlocked,
        }
    }

    fn place_pinned_movies(&self, st: &mut DayState, items: &[ContentItem], tracker: &RotationTracker) {
        let broadcast = &self.config.broadcast;
        let policy = self.config.policies.get(Category::Movie);
        let quota = policy.daily_quota;

        for movie in self.config.movies_on(st.date) {
            let Some(item) = items.iter().find(|i| i.id == movie.id) else {
                warn!("Scheduled movie {} is not in the catalog, skipping", movie.id);
                continue;
            };
            if item.category != Category::Movie {
                warn!("Scheduled movie {} is a {}, skipping", movie.id, item.category);
                continue;
            }
            if st.count(Category::Movie) >= quota {
                warn!("Movie quota reached, not pinning {} on {}", movie.id, st.date);
                continue;
            }

            if !policy.accepts_duration(item.duration_seconds) {
                warn!(
                    "Scheduled movie {} runs {} s, outside the movie bounds {}..={} s, skipping",
                    movie.id, item.duration_seconds, policy.min_duration, policy.max_duration
                );
                continue;
            }

            let start = movie.start;
            if start < broadcast.start || start >= broadcast.end {
                warn!(
                    "Scheduled movie {} at {} is outside the broadcast window {}-{}, skipping",
                    movie.id,
                    format_clock(start),
                    format_clock(broadcast.start),
                    format_clock(broadcast.end)
                );
                continue;
            }

            let end = match start.checked_add(item.duration_seconds) {
                Some(end) if end <= SECONDS_PER_DAY => end,
                _ => {
                    warn!(
                        "Scheduled movie {} at {} would cross midnight, skipping",
                        movie.id,
                        format_clock(start)
                    );
                    continue;
                }
            };
            if st.pinned.iter().any(|(ps, pe)| start < *pe && *ps < end) {
                warn!(
                    "Scheduled movie {} at {} would overlap another movie, skipping",
                    movie.id,
                    format_clock(start)
                );
                continue;
            }

            info!("Pinned {} at {} on {}", movie.id, format_clock(start), st.date);
            st.programs.push(ScheduledProgram::whole(start, item));
            st.pinned.push((start, end));
            st.completed.insert(item.id.clone());
            *st.report.counts.entry(Category::Movie).or_insert(0) += 1;

            if let Err(e) = tracker.record_play_at(
                &item.show_key,
                &item.id,
                item.duration_minutes(),
                at_clock(st.date, start),
            ) {
                warn!("Could not record pinned movie {}: {}", item.id, e);
            }
        }
    }

    fn commit(
        &self,
        st: &mut DayState,
        candidate: Candidate<'_>,
        tracker: &RotationTracker,
        planner: &SegmentPlanner,
    ) {
        let Candidate { item, block } = candidate;
        let program = match block {
            Some(b) => ScheduledProgram::block(st.clock, item, b.start, b.end),
            None => ScheduledProgram::whole(st.clock, item),
        };
        let len = program.segment_duration();

        debug!(
            "{} {} {} ({} s)",
            format_clock(st.clock),
            item.category,
            item.id,
            len
        );

        *st.report.counts.entry(item.category).or_insert(0) += 1;

        match item.category {
            Category::Commercial => {
                st.last_commercial_start = Some(st.clock);
                if is_announcement(&item.id) {
                    *st.announcement_airings.entry(item.id.clone()).or_insert(0) += 1;
                }
            }
            category => {
                if category == Category::Cartoon {
                    if st.last_show.as_deref() == Some(item.show_key.as_str()) {
                        st.consecutive += 1;
                    } else {
                        st.last_show = Some(item.show_key.clone());
                        st.consecutive = 1;
                    }
                }

                let at = at_clock(st.date, st.clock);
                if let Err(e) = tracker.record_play_at(&item.show_key, &item.id, f64::from(len) / 60.0, at) {
                    warn!("Could not record play of {}: {}", item.id, e);
                }
                if let Some(b) = block {
                    if let Err(e) = planner.save_position_on(&item.id, b.end, st.date) {
                        warn!("Could not save resume point of {}: {}", item.id, e);
                    }
                }
                if program.completes_content() {
                    st.completed.insert(item.id.clone());
                }
            }
        }

        st.clock += len.div_ceil(60) * 60;
        st.programs.push(program);
    }
}

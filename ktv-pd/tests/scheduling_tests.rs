//! Integration tests for day and week generation
//!
//! Tests cover:
//! - Grid invariants (no overlap, quotas, duration bounds, show rotation)
//! - Commercial spacing
//! - Determinism under a fixed seed
//! - Series progression across a week
//! - Pinned movies and their announcements, and pins that are dropped
//! - Consecutive-show guard skipping and out-of-bounds episodes

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use ktv_common::{Category, FixedClock, MemoryStore};
use ktv_pd::config::{default_policy, BroadcastConfig, CategoryPolicy, PolicySet, ScheduledMovie};
use ktv_pd::{ChannelConfig, ContentItem, DaySchedule, RotationTracker, ScheduleGenerator, SegmentPlanner};

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, day).unwrap()
}

/// Test helper: empty history at 06:00 on `day`
fn fresh_state(day: u32, config: &ChannelConfig) -> (RotationTracker, SegmentPlanner) {
    let clock = Arc::new(FixedClock::new(date(day).and_hms_opt(6, 0, 0).unwrap()));
    let store = Arc::new(MemoryStore::new());
    (
        RotationTracker::new(store.clone(), clock.clone(), config.broadcast.episode_cooldown_minutes),
        SegmentPlanner::new(store, clock, config.broadcast.max_block),
    )
}

fn policy(min: u32, max: u32, quota: u32, priority: u8) -> CategoryPolicy {
    CategoryPolicy {
        min_duration: min,
        max_duration: max,
        daily_quota: quota,
        priority,
        time_slots: Vec::new(),
        split_long_form: false,
    }
}

/// Test helper: assert every invariant a generated grid must hold
fn assert_grid_invariants(day: &DaySchedule, config: &ChannelConfig) {
    for pair in day.programs.windows(2) {
        assert!(
            pair[1].start_time >= pair[0].end_time(),
            "{} overlaps {}",
            pair[0].content_id,
            pair[1].content_id
        );
    }

    let mut counts: BTreeMap<Category, u32> = BTreeMap::new();
    for program in &day.programs {
        *counts.entry(program.category).or_insert(0) += 1;
    }
    for (category, count) in counts {
        assert!(count <= config.policies.get(category).daily_quota, "{} over quota", category);
    }

    for program in day.programs.iter().filter(|p| !ktv_pd::announcements::is_announcement(&p.content_id)) {
        let policy = config.policies.get(program.category);
        assert!(
            policy.accepts_duration(program.segment_duration()),
            "{} has {} s outside its bounds",
            program.content_id,
            program.segment_duration()
        );
    }

    let cartoons: Vec<&str> = day
        .programs
        .iter()
        .filter(|p| p.category == Category::Cartoon)
        .map(|p| p.show_key.as_str())
        .collect();
    let max_run = config.broadcast.max_consecutive_same_show as usize;
    for window in cartoons.windows(max_run + 1) {
        assert!(
            window.iter().any(|show| *show != window[0]),
            "{} aired more than {} times in a row",
            window[0],
            max_run
        );
    }
}

/// Three shows of one 400 s episode, one commercial, one clip, 30 minutes
fn small_channel() -> (ChannelConfig, Vec<ContentItem>) {
    let config = ChannelConfig {
        broadcast: BroadcastConfig {
            start: 0,
            end: 1800,
            commercial_interval: 600,
            max_consecutive_same_show: 1,
            ..BroadcastConfig::default()
        },
        policies: PolicySet::default()
            .with(Category::Cartoon, policy(60, 1500, 10, 4))
            .with(Category::EducationalClip, policy(60, 600, 5, 5))
            .with(Category::Commercial, policy(10, 120, 10, 2)),
        ..ChannelConfig::default()
    };
    let items = vec![
        ContentItem::new("showa-001", Category::Cartoon, 400),
        ContentItem::new("showb-001", Category::Cartoon, 400),
        ContentItem::new("showc-001", Category::Cartoon, 400),
        ContentItem::new("ad-001", Category::Commercial, 30),
        ContentItem::new("edu-001", Category::EducationalClip, 180),
    ];
    (config, items)
}

#[test]
fn test_small_channel_grid() {
    let (config, items) = small_channel();
    let (tracker, planner) = fresh_state(4, &config);
    let day = ScheduleGenerator::new(&config).generate_day(&items, &tracker, &planner, date(4));

    assert_grid_invariants(&day, &config);

    let shows: Vec<&str> = day
        .programs
        .iter()
        .filter(|p| p.category == Category::Cartoon)
        .map(|p| p.show_key.as_str())
        .collect();
    assert_eq!(shows, vec!["showa", "showb", "showc"]);

    let commercials: Vec<u32> = day
        .programs
        .iter()
        .filter(|p| p.category == Category::Commercial)
        .map(|p| p.start_time)
        .collect();
    assert_eq!(commercials[0], 0);
    for pair in commercials.windows(2) {
        assert!(pair[1] - pair[0] >= 600);
    }
    // One break lands after each 600 s mark
    assert!(commercials.iter().any(|t| (600..1200).contains(t)));
    assert!(commercials.iter().any(|t| (1200..1800).contains(t)));

    assert!(day.programs.iter().any(|p| p.content_id == "edu-001"));
    assert!(day.report.exhausted_at.is_some());
}

#[test]
fn test_generation_is_deterministic() {
    let (config, _) = small_channel();
    let mut items: Vec<ContentItem> = (1..=20)
        .map(|i| ContentItem::new(format!("edu-{:03}", i), Category::EducationalClip, 120 + i * 7))
        .collect();
    items.extend((1..=4).map(|i| ContentItem::new(format!("ad-{:03}", i), Category::Commercial, 30)));

    let generator = ScheduleGenerator::new(&config);
    let (tracker, planner) = fresh_state(4, &config);
    let first = generator.generate_day(&items, &tracker, &planner, date(4));
    let second = generator.generate_day(&items, &tracker, &planner, date(4));
    assert_eq!(first.programs, second.programs);

    let reseeded = ChannelConfig {
        seed: 99,
        ..config.clone()
    };
    let third = ScheduleGenerator::new(&reseeded).generate_day(&items, &tracker, &planner, date(4));
    assert_grid_invariants(&third, &reseeded);
}

#[test]
fn test_default_policies_on_a_full_catalog() {
    let config = ChannelConfig::default();
    let mut items = Vec::new();
    for show in ["bluey", "peppa", "pocoyo", "doki", "tromba", "lupi"] {
        for episode in 1..=6 {
            items.push(ContentItem::new(format!("{}-{:03}", show, episode), Category::Cartoon, 660));
        }
    }
    for i in 1..=20 {
        items.push(ContentItem::new(format!("edu-{:03}", i), Category::EducationalClip, 300));
    }
    for i in 1..=5 {
        items.push(ContentItem::new(format!("ad-{:03}", i), Category::Commercial, 45));
    }
    items.push(ContentItem::new("movie-aventureiro", Category::Movie, 5400));

    let (tracker, planner) = fresh_state(4, &config);
    let day = ScheduleGenerator::new(&config).generate_day(&items, &tracker, &planner, date(4));

    assert_grid_invariants(&day, &config);
    assert!(day.report.count(Category::Cartoon) > 0);
    assert!(day.report.count(Category::EducationalClip) > 0);
    assert!(day.programs.iter().all(|p| p.start_time >= config.broadcast.start));
    assert!(day.programs.iter().all(|p| p.end_time() <= 86_400));

    // The cap is checked before each airing, so the last episode may overrun it
    let mut per_show: BTreeMap<&str, u32> = BTreeMap::new();
    for program in day.programs.iter().filter(|p| p.category == Category::Cartoon) {
        *per_show.entry(program.show_key.as_str()).or_insert(0) += program.segment_duration();
    }
    let cap = config.broadcast.max_minutes_per_show_per_day * 60;
    for (show, seconds) in per_show {
        assert!(seconds < cap + 25 * 60, "{} aired {} s", show, seconds);
    }
}

#[test]
fn test_long_form_progresses_through_the_week() {
    let config = ChannelConfig {
        broadcast: BroadcastConfig {
            start: 0,
            end: 7200,
            ..BroadcastConfig::default()
        },
        policies: PolicySet::default().with(
            Category::Movie,
            CategoryPolicy {
                split_long_form: true,
                ..policy(600, 7200, 1, 3)
            },
        ),
        ..ChannelConfig::default()
    };
    let items = vec![ContentItem::new("movie-1", Category::Movie, 3600)];

    let (tracker, planner) = fresh_state(2, &config);
    let week = ScheduleGenerator::new(&config).generate_week(&items, &tracker, &planner, date(2));
    assert_eq!(week.len(), 7);

    let mut days: Vec<&DaySchedule> = week.values().collect();
    days.sort_by_key(|d| d.date);

    let blocks: Vec<Option<(Option<u32>, Option<u32>)>> = days
        .iter()
        .map(|d| d.programs.first().map(|p| (p.block_start, p.block_end)))
        .collect();
    assert_eq!(blocks[0], Some((Some(0), Some(1200))));
    assert_eq!(blocks[1], Some((Some(1200), Some(2400))));
    assert_eq!(blocks[2], Some((Some(2400), Some(3600))));
    assert_eq!(blocks[3], None);

    // Persisted state is untouched by generation
    assert_eq!(planner.resume_position("movie-1"), 0);
}

#[test]
fn test_pinned_movie_and_announcements() {
    let mut config = ChannelConfig {
        movies: vec![ScheduledMovie {
            id: "movie-aventureiro".to_string(),
            title: Some("O Aventureiro".to_string()),
            date: date(6),
            start: 18 * 3600,
        }],
        ..ChannelConfig::default()
    };
    config.broadcast.commercial_interval = 300;
    config.policies = config.policies.with(
        Category::Commercial,
        CategoryPolicy {
            daily_quota: 60,
            ..default_policy(Category::Commercial)
        },
    );

    let mut items = vec![ContentItem::new("movie-aventureiro", Category::Movie, 5400)];
    for show in ["bluey", "peppa", "pocoyo", "doki"] {
        for episode in 1..=4 {
            items.push(ContentItem::new(format!("{}-{:03}", show, episode), Category::Cartoon, 600));
        }
    }
    for i in 1..=12 {
        items.push(ContentItem::new(format!("edu-{:03}", i), Category::EducationalClip, 300));
    }
    items.push(ContentItem::new("ad-001", Category::Commercial, 30));

    let generator = ScheduleGenerator::new(&config);

    // Two days ahead: announcements share the commercial breaks
    let (tracker, planner) = fresh_state(4, &config);
    let before = generator.generate_day(&items, &tracker, &planner, date(4));
    let announcements: Vec<u32> = before
        .programs
        .iter()
        .filter(|p| p.content_id == "announcement-movie-aventureiro-2")
        .map(|p| p.start_time)
        .collect();
    assert!(!announcements.is_empty());
    assert!(announcements.len() <= config.announcements.per_day as usize);
    assert!(announcements.iter().all(|t| *t >= 33_000));
    assert!(before.lookup(&items, "announcement-movie-aventureiro-2").is_some());
    assert!(before.programs.iter().all(|p| p.content_id != "movie-aventureiro"));

    // Movie day: pinned at 18:00 and nothing overlaps it
    let (tracker, planner) = fresh_state(6, &config);
    let movie_day = generator.generate_day(&items, &tracker, &planner, date(6));
    assert_grid_invariants(&movie_day, &config);
    let movie = movie_day
        .programs
        .iter()
        .find(|p| p.content_id == "movie-aventureiro")
        .unwrap();
    assert_eq!(movie.start_time, 64_800);
    assert!(movie_day.extra_items.is_empty());

    // Pins that break the movie bounds or the broadcast window are dropped
    let pin = |id: &str, start: u32| ScheduledMovie {
        id: id.to_string(),
        title: None,
        date: date(6),
        start,
    };
    let rejected = ChannelConfig {
        movies: vec![
            pin("movie-short", 18 * 3600),
            pin("movie-late", 21 * 3600),
            pin("movie-early", 6 * 3600),
            pin("movie-endless", 18 * 3600),
        ],
        ..ChannelConfig::default()
    };
    items.push(ContentItem::new("movie-short", Category::Movie, 600));
    items.push(ContentItem::new("movie-late", Category::Movie, 5400));
    items.push(ContentItem::new("movie-early", Category::Movie, 5400));
    items.push(ContentItem::new("movie-endless", Category::Movie, u32::MAX - 10));

    let (tracker, planner) = fresh_state(6, &rejected);
    let day = ScheduleGenerator::new(&rejected).generate_day(&items, &tracker, &planner, date(6));
    assert_grid_invariants(&day, &rejected);
    for id in ["movie-short", "movie-late", "movie-early", "movie-endless"] {
        assert!(day.programs.iter().all(|p| p.content_id != id), "{} was pinned", id);
    }
    let movie_bounds = rejected.policies.get(Category::Movie);
    for program in day.programs.iter().filter(|p| p.category == Category::Movie) {
        assert!(movie_bounds.accepts_duration(program.segment_duration()));
        assert!(program.start_time >= rejected.broadcast.start);
        assert!(program.start_time < rejected.broadcast.end);
    }
}

/// Single show, guard of one: the slot after each episode can only be skipped
fn single_show_config(end: u32) -> ChannelConfig {
    ChannelConfig {
        broadcast: BroadcastConfig {
            start: 0,
            end,
            max_consecutive_same_show: 1,
            small_step: 60,
            large_step: 300,
            max_retries: 3,
            ..BroadcastConfig::default()
        },
        policies: PolicySet::default().with(Category::Cartoon, policy(60, 1500, 10, 4)),
        ..ChannelConfig::default()
    }
}

#[test]
fn test_guard_skips_small_then_large_steps() {
    let items = vec![
        ContentItem::new("bluey-001", Category::Cartoon, 400),
        ContentItem::new("bluey-002", Category::Cartoon, 400),
        ContentItem::new("bluey-003", Category::Cartoon, 400),
    ];

    // bluey-001 airs 0..420; then 60, 60, 300 (after three rejections), 60, 60, 300...
    let expected = [(480, 60, 1), (540, 120, 2), (840, 420, 3), (900, 480, 4), (1200, 780, 6)];
    for (end, skipped, rejections) in expected {
        let config = single_show_config(end);
        let (tracker, planner) = fresh_state(4, &config);
        let day = ScheduleGenerator::new(&config).generate_day(&items, &tracker, &planner, date(4));

        assert_eq!(day.programs.len(), 1, "end {}", end);
        assert_eq!(day.programs[0].content_id, "bluey-001");
        assert_eq!(day.report.skipped_seconds, skipped, "end {}", end);
        assert_eq!(day.report.guard_rejections, rejections, "end {}", end);
        assert!(day.report.exhausted_at.is_none());
    }
}

#[test]
fn test_out_of_bounds_episode_passes_to_next_show() {
    let config = ChannelConfig {
        broadcast: BroadcastConfig {
            start: 0,
            end: 1800,
            max_consecutive_same_show: 2,
            ..BroadcastConfig::default()
        },
        policies: PolicySet::default().with(Category::Cartoon, policy(60, 1500, 10, 4)),
        ..ChannelConfig::default()
    };
    // "alpha" sorts first among equally unaired shows but is too short to air
    let items = vec![
        ContentItem::new("alpha-001", Category::Cartoon, 30),
        ContentItem::new("beta-001", Category::Cartoon, 400),
        ContentItem::new("beta-002", Category::Cartoon, 400),
    ];

    let (tracker, planner) = fresh_state(4, &config);
    let day = ScheduleGenerator::new(&config).generate_day(&items, &tracker, &planner, date(4));

    assert_grid_invariants(&day, &config);
    let aired: Vec<&str> = day.programs.iter().map(|p| p.content_id.as_str()).collect();
    assert_eq!(aired[..2], ["beta-001", "beta-002"]);
    assert!(aired.iter().all(|id| *id != "alpha-001"));
}

#[test]
fn test_empty_catalog_is_permanently_off_air() {
    let config = ChannelConfig::default();
    let (tracker, planner) = fresh_state(4, &config);
    let day = ScheduleGenerator::new(&config).generate_day(&[], &tracker, &planner, date(4));
    assert!(day.is_empty());
    assert!(day.report.empty_catalog);

    let state = ktv_pd::resolve_at(&day.programs, 36_000);
    assert!(state.is_off_air);
    assert!(state.off_air_reason.unwrap().is_permanent());
}

//! Movie announcements
//!
//! On each of the days leading up to a scheduled movie the channel airs a
//! short announcement in the commercial breaks. Announcements are not part
//! of the catalog; they are built per day from the movie list and carried
//! by the day's grid as extra items.

use chrono::NaiveDate;
use ktv_common::time::format_clock;
use ktv_common::Category;

use crate::catalog::{ContentItem, EpisodeOrder};
use crate::config::{AnnouncementConfig, ScheduledMovie};

const ANNOUNCEMENT_PREFIX: &str = "announcement-";

/// Id of the announcement aired `days` days before `movie_id`
pub fn announcement_id(movie_id: &str, days: i64) -> String {
    format!("{}{}-{}", ANNOUNCEMENT_PREFIX, movie_id, days)
}

pub fn is_announcement(content_id: &str) -> bool {
    content_id.starts_with(ANNOUNCEMENT_PREFIX)
}

/// On-screen text of an announcement
pub fn announcement_text(movie: &ScheduledMovie, days: i64) -> String {
    let title = movie.title.as_deref().unwrap_or(&movie.id);
    let unit = if days == 1 { "day" } else { "days" };
    format!(
        "MOVIE TIME! {} on {} at {} ({} {} to go)",
        title.to_uppercase(),
        movie.date.format("%d %B"),
        &format_clock(movie.start)[..5],
        days,
        unit
    )
}

/// Announcement items to air on `date`
///
/// One item per movie scheduled 1..=`days_before` days after `date`,
/// ordered by movie date then id.
pub fn announcements_for(
    movies: &[ScheduledMovie],
    config: &AnnouncementConfig,
    date: NaiveDate,
) -> Vec<ContentItem> {
    if config.per_day == 0 {
        return Vec::new();
    }

    let mut upcoming: Vec<(&ScheduledMovie, i64)> = movies
        .iter()
        .map(|movie| (movie, (movie.date - date).num_days()))
        .filter(|(_, days)| *days >= 1 && *days <= i64::from(config.days_before))
        .collect();
    upcoming.sort_by(|a, b| a.0.date.cmp(&b.0.date).then_with(|| a.0.id.cmp(&b.0.id)));

    upcoming
        .into_iter()
        .map(|(movie, days)| {
            let id = announcement_id(&movie.id, days);
            ContentItem::new(id, Category::Commercial, config.duration_seconds)
                .with_title(announcement_text(movie, days))
                .with_show(format!("{}{}", ANNOUNCEMENT_PREFIX, movie.id))
                .with_episode_order(EpisodeOrder::Number(days as u32))
        })
        .collect()
}

/// Spread `count` instants evenly over `[start, end)`
///
/// The window is cut into `count + 1` equal intervals (whole minutes) and
/// an instant placed at each inner boundary.
///
/// ```
/// use ktv_pd::announcements::distribute_announcement_times;
///
/// // 07:00-20:00, 5 airings: every 130 minutes from 09:10
/// let times = distribute_announcement_times(25_200, 72_000, 5);
/// assert_eq!(times, vec![33_000, 40_800, 48_600, 56_400, 64_200]);
/// ```
pub fn distribute_announcement_times(start: u32, end: u32, count: u32) -> Vec<u32> {
    if count == 0 || end <= start {
        return Vec::new();
    }
    let interval_minutes = (end - start) / 60 / (count + 1);
    (1..=count)
        .map(|i| start + interval_minutes * 60 * i)
        .collect()
}

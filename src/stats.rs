use crate::models::{
    normalize_brand, BoxEntryView, BoxOpen, BoxView, DailyPoint, SmokeEvent, SmokeStatsResponse,
    SmokeView, Timestamped, WeeklyPoint,
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike};
use std::collections::{BTreeMap, HashSet};

pub const MINUTE_MS: i64 = 60 * 1000;
pub const HOUR_MS: i64 = 60 * MINUTE_MS;
pub const DAY_MS: i64 = 24 * HOUR_MS;
pub const BOX_WINDOW_MS: i64 = 30 * DAY_MS;
pub const ASSUMED_SMOKE_DURATION_MS: i64 = 7 * MINUTE_MS;
pub const RECENT_BRAND_COUNT: usize = 4;

pub fn elapsed_since(timestamp: i64, now_ms: i64) -> i64 {
    now_ms.saturating_sub(timestamp).max(0)
}

/// `HH:MM:SS`; hours keep growing past a day.
pub fn format_clock(ms: i64) -> String {
    let ms = ms.max(0);
    let hours = ms / HOUR_MS;
    let minutes = (ms % HOUR_MS) / MINUTE_MS;
    let seconds = (ms % MINUTE_MS) / 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Two largest non-zero units: `3d 4h`, `2h 15m`, `45m`.
pub fn format_compact(ms: i64) -> String {
    if ms <= 0 {
        return "0m".to_string();
    }

    let total_minutes = ms / MINUTE_MS;
    let days = total_minutes / (60 * 24);
    let hours = (total_minutes % (60 * 24)) / 60;
    let minutes = total_minutes % 60;

    if days > 0 {
        if hours > 0 {
            format!("{days}d {hours}h")
        } else {
            format!("{days}d")
        }
    } else if hours > 0 {
        if minutes > 0 {
            format!("{hours}h {minutes}m")
        } else {
            format!("{hours}h")
        }
    } else {
        format!("{minutes}m")
    }
}

/// `dd.mm.yy h:mmAM` in the zone of `tz`.
pub fn format_timestamp_compact<Tz: TimeZone>(timestamp: i64, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    match tz.timestamp_millis_opt(timestamp).single() {
        Some(at) => at.format("%d.%m.%y %-I:%M%p").to_string(),
        None => "--".to_string(),
    }
}

pub fn start_of_local_day<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
    let midnight = now.date_naive().and_hms_opt(0, 0, 0);
    match midnight.and_then(|at| now.timezone().from_local_datetime(&at).earliest()) {
        Some(start) => start.timestamp_millis(),
        // midnight skipped by a DST jump: fall back to wall-clock arithmetic
        None => {
            let since_midnight = i64::from(now.num_seconds_from_midnight()) * 1000
                + i64::from(now.timestamp_subsec_millis());
            now.timestamp_millis() - since_midnight
        }
    }
}

pub fn same_day_count<E: Timestamped, Tz: TimeZone>(events: &[E], now: &DateTime<Tz>) -> usize {
    let start = start_of_local_day(now);
    let now_ms = now.timestamp_millis();
    events
        .iter()
        .filter(|event| (start..=now_ms).contains(&event.timestamp()))
        .count()
}

pub fn rolling_window_sum<E: Timestamped>(
    events: &[E],
    now_ms: i64,
    window_ms: i64,
    quantity_of: impl Fn(&E) -> u64,
) -> u64 {
    let start = now_ms.saturating_sub(window_ms);
    events
        .iter()
        .filter(|event| event.timestamp() >= start)
        .fold(0u64, |sum, event| sum.saturating_add(quantity_of(event)))
}

/// First older entry (after `index` in a newest-first list) in the same group.
pub fn previous_same_group<'a, E, K: PartialEq>(
    events_desc: &'a [E],
    index: usize,
    group_key: impl Fn(&E) -> K,
) -> Option<&'a E> {
    let key = group_key(events_desc.get(index)?);
    events_desc
        .iter()
        .skip(index + 1)
        .find(|event| group_key(*event) == key)
}

/// Mean of the positive gaps between consecutive events, in ms.
pub fn average_interval<'a, E: Timestamped + 'a>(
    events: impl IntoIterator<Item = &'a E>,
) -> Option<f64> {
    let mut timestamps: Vec<i64> = events.into_iter().map(Timestamped::timestamp).collect();
    if timestamps.len() < 2 {
        return None;
    }
    timestamps.sort_unstable();

    let diffs: Vec<i64> = timestamps
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .filter(|diff| *diff > 0)
        .collect();
    if diffs.is_empty() {
        return None;
    }

    let total: f64 = diffs.iter().map(|diff| *diff as f64).sum();
    Some(total / diffs.len() as f64)
}

/// Brands in order of first appearance in a newest-first log.
pub fn distinct_brands(entries: &[BoxOpen]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut brands = Vec::new();
    for entry in entries {
        if seen.insert(entry.brand.as_str()) {
            brands.push(entry.brand.clone());
        }
    }
    brands
}

/// Time since the assumed end of the last smoke, and whether it is still lit.
pub fn since_last_finished(last: i64, now_ms: i64) -> (i64, bool) {
    let finished_at = last.saturating_add(ASSUMED_SMOKE_DURATION_MS);
    let raw = now_ms.saturating_sub(finished_at);
    (raw.max(0), raw < 0)
}

pub fn format_days(days: Option<f64>) -> String {
    match days {
        Some(days) => format!("{days:.1}d"),
        None => "--".to_string(),
    }
}

pub fn build_smoke_view<Tz: TimeZone>(
    events: &[SmokeEvent],
    now: &DateTime<Tz>,
    degraded: bool,
) -> SmokeView {
    let now_ms = now.timestamp_millis();
    let last_timestamp = events.iter().map(|event| event.timestamp).max();
    let (since_last_finished, assumed_smoking) = match last_timestamp {
        Some(last) => {
            let (elapsed, smoking) = since_last_finished(last, now_ms);
            (format_clock(elapsed), smoking)
        }
        None => ("--:--:--".to_string(), false),
    };

    SmokeView {
        events: events.to_vec(),
        today_count: same_day_count(events, now),
        last_timestamp,
        since_last_finished,
        assumed_smoking,
        persistence_degraded: degraded,
    }
}

/// `selected` of `None` picks the most recently used brand; an empty string
/// means all brands.
pub fn build_box_view<Tz: TimeZone>(
    entries: &[BoxOpen],
    selected: Option<&str>,
    now: &DateTime<Tz>,
    degraded: bool,
) -> BoxView
where
    Tz::Offset: std::fmt::Display,
{
    let now_ms = now.timestamp_millis();
    let brands = distinct_brands(entries);
    let selected_brand = match selected.map(str::trim) {
        Some("") => None,
        Some(brand) => Some(normalize_brand(brand)),
        None => brands.first().cloned(),
    };

    let filtered: Vec<BoxOpen> = match &selected_brand {
        Some(brand) => entries
            .iter()
            .filter(|entry| &entry.brand == brand)
            .cloned()
            .collect(),
        None => entries.to_vec(),
    };

    let tz = now.timezone();
    let rows = filtered
        .iter()
        .enumerate()
        .map(|(index, entry)| BoxEntryView {
            entry: entry.clone(),
            logged_at: format_timestamp_compact(entry.timestamp, &tz),
            previous_lasted: previous_same_group(&filtered, index, |e| e.brand.clone())
                .map(|previous| format_compact(entry.timestamp - previous.timestamp)),
        })
        .collect();

    BoxView {
        recent_brands: brands.iter().take(RECENT_BRAND_COUNT).cloned().collect(),
        since_last_open: filtered
            .first()
            .map(|last| format_compact(elapsed_since(last.timestamp, now_ms))),
        boxes_last_30_days: rolling_window_sum(&filtered, now_ms, BOX_WINDOW_MS, |entry| {
            u64::from(entry.boxes)
        }),
        avg_days_per_box: average_interval(&filtered).map(|ms| ms / DAY_MS as f64),
        total_entries: entries.len(),
        entries: rows,
        brands,
        selected_brand,
        persistence_degraded: degraded,
    }
}

pub fn build_smoke_stats<Tz: TimeZone>(events: &[SmokeEvent], now: &DateTime<Tz>) -> SmokeStatsResponse {
    let tz = now.timezone();
    let mut per_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for event in events {
        if let Some(at) = tz.timestamp_millis_opt(event.timestamp).single() {
            *per_day.entry(at.date_naive()).or_default() += 1;
        }
    }

    let mut stats = build_stats_at(now.date_naive(), &per_day);
    stats.average_interval_ms = average_interval(events);
    stats
}

pub fn build_stats_at(today: NaiveDate, per_day: &BTreeMap<NaiveDate, u64>) -> SmokeStatsResponse {
    const WEEK_COUNT: usize = 8;

    let count_on = |date: NaiveDate| per_day.get(&date).copied().unwrap_or_default();

    let mut last_7_days = Vec::with_capacity(7);
    for offset in (0..7).rev() {
        let date = today - Duration::days(offset as i64);
        last_7_days.push(DailyPoint {
            date: date.to_string(),
            count: count_on(date),
        });
    }

    let current_week_start = week_start(today);
    let mut weekly = Vec::with_capacity(WEEK_COUNT);

    for offset in (0..WEEK_COUNT).rev() {
        let start = current_week_start - Duration::weeks(offset as i64);
        let end = start + Duration::days(6);

        let mut sum = 0u64;
        for day_offset in 0..7 {
            sum = sum.saturating_add(count_on(start + Duration::days(day_offset)));
        }

        let days_counted = if today < start {
            0
        } else if today > end {
            7
        } else {
            (today - start).num_days() as u8 + 1
        };

        let denom = if days_counted == 0 { 1.0 } else { f64::from(days_counted) };

        weekly.push(WeeklyPoint {
            week: week_label(start),
            start_date: start.to_string(),
            end_date: end.to_string(),
            count: sum,
            days_counted,
            avg_per_day: sum as f64 / denom,
        });
    }

    SmokeStatsResponse {
        last_7_days,
        weekly,
        average_interval_ms: None,
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

fn week_label(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}

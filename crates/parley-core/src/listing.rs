//! Calendar-based grouping of sessions for the session list.
//!
//! Buckets are computed against local midnights of the caller's time zone, so
//! "yesterday" is the previous calendar day rather than "within 48 hours".
//! Favorites go to their own bucket regardless of age.

use crate::record::{DbObject, Timestamp};
use chrono::{DateTime, Days, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone};
use serde::Serialize;
use strum::{Display, EnumIter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecencyBucket {
    Favorites,
    Today,
    Yesterday,
    LastWeek,
    Older,
}

impl RecencyBucket {
    /// Heading shown above the bucket in a session list.
    pub fn title(self) -> &'static str {
        match self {
            Self::Favorites => "Favorites",
            Self::Today => "Today",
            Self::Yesterday => "Yesterday",
            Self::LastWeek => "Previous 7 days",
            Self::Older => "Older",
        }
    }
}

/// Sessions partitioned by [`RecencyBucket`], each bucket newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionGroups<T> {
    pub favorites: Vec<T>,
    pub today: Vec<T>,
    pub yesterday: Vec<T>,
    pub last_week: Vec<T>,
    pub older: Vec<T>,
}

impl<T> Default for SessionGroups<T> {
    fn default() -> Self {
        Self {
            favorites: Vec::new(),
            today: Vec::new(),
            yesterday: Vec::new(),
            last_week: Vec::new(),
            older: Vec::new(),
        }
    }
}

impl<T> SessionGroups<T> {
    pub fn bucket(&self, bucket: RecencyBucket) -> &[T] {
        match bucket {
            RecencyBucket::Favorites => &self.favorites,
            RecencyBucket::Today => &self.today,
            RecencyBucket::Yesterday => &self.yesterday,
            RecencyBucket::LastWeek => &self.last_week,
            RecencyBucket::Older => &self.older,
        }
    }

    fn bucket_mut(&mut self, bucket: RecencyBucket) -> &mut Vec<T> {
        match bucket {
            RecencyBucket::Favorites => &mut self.favorites,
            RecencyBucket::Today => &mut self.today,
            RecencyBucket::Yesterday => &mut self.yesterday,
            RecencyBucket::LastWeek => &mut self.last_week,
            RecencyBucket::Older => &mut self.older,
        }
    }

    pub fn len(&self) -> usize {
        self.favorites.len()
            + self.today.len()
            + self.yesterday.len()
            + self.last_week.len()
            + self.older.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts every entry, keeping bucket membership and order.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> SessionGroups<U> {
        SessionGroups {
            favorites: self.favorites.into_iter().map(&mut f).collect(),
            today: self.today.into_iter().map(&mut f).collect(),
            yesterday: self.yesterday.into_iter().map(&mut f).collect(),
            last_week: self.last_week.into_iter().map(&mut f).collect(),
            older: self.older.into_iter().map(&mut f).collect(),
        }
    }
}

/// Local-midnight boundaries for one reference instant.
#[derive(Debug, Clone, Copy)]
struct Boundaries {
    today: Timestamp,
    yesterday: Timestamp,
    last_week: Timestamp,
}

impl Boundaries {
    fn at<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let tz = now.timezone();
        let date = now.date_naive();
        let days_back = |n: u64| date.checked_sub_days(Days::new(n)).unwrap_or(date);
        Self {
            today: midnight_millis(&tz, date),
            yesterday: midnight_millis(&tz, days_back(1)),
            last_week: midnight_millis(&tz, days_back(7)),
        }
    }

    fn classify(&self, last_edited: Timestamp) -> RecencyBucket {
        if last_edited >= self.today {
            RecencyBucket::Today
        } else if last_edited >= self.yesterday {
            RecencyBucket::Yesterday
        } else if last_edited >= self.last_week {
            RecencyBucket::LastWeek
        } else {
            RecencyBucket::Older
        }
    }
}

/// Epoch millis of local midnight starting `date` in `tz`.
fn midnight_millis<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Timestamp {
    let naive = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.timestamp_millis(),
        LocalResult::Ambiguous(earliest, _) => earliest.timestamp_millis(),
        // Midnight skipped by a DST transition: the day starts at the first
        // local minute after the gap.
        LocalResult::None => (1..=MAX_GAP_MINUTES)
            .find_map(|minutes| {
                tz.from_local_datetime(&(naive + Duration::minutes(minutes)))
                    .earliest()
            })
            .map_or_else(
                || naive.and_utc().timestamp_millis(),
                |start| start.timestamp_millis(),
            ),
    }
}

/// Longest clock jump searched past a skipped midnight.
const MAX_GAP_MINUTES: i64 = 24 * 60;

/// Bucket of one session at reference time `now`.
pub fn bucket_for<Tz: TimeZone>(
    last_edited: Timestamp,
    favorite: bool,
    now: &DateTime<Tz>,
) -> RecencyBucket {
    if favorite {
        return RecencyBucket::Favorites;
    }
    Boundaries::at(now).classify(last_edited)
}

/// Partitions `records` into recency buckets, newest first within each.
pub fn group_by_recency<R, C, Tz: TimeZone>(
    mut records: Vec<DbObject<R, C>>,
    now: &DateTime<Tz>,
) -> SessionGroups<DbObject<R, C>> {
    records.sort_by(|a, b| b.last_edited.cmp(&a.last_edited));

    let boundaries = Boundaries::at(now);
    let mut groups = SessionGroups::default();
    for record in records {
        let bucket = if record.is_favorite() {
            RecencyBucket::Favorites
        } else {
            boundaries.classify(record.last_edited)
        };
        groups.bucket_mut(bucket).push(record);
    }
    groups
}

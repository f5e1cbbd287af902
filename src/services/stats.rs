//! src/services/stats.rs
//!
//! StatsService: read-only aggregates over the whole item table for the
//! dashboard. The individual reads run concurrently and are not a single
//! snapshot: a write landing mid-computation can make the counters disagree
//! slightly with each other, which is acceptable for a dashboard. Any read
//! failing fails the whole computation.

use crate::{
    models::item::{ItemStatus, ItemView},
    services::{
        clock::Clock,
        error::{FieldErrors, ItemError, ItemResult},
        item_store::{GroupField, ItemPredicate, ItemSort, ItemStore},
        query::{end_of_day, parse_date_bound},
    },
};
use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MONTHS_IN_SERIES: u32 = 12;
const RECENT_ACTIVITY_DAYS: i64 = 7;
const RECENT_ACTIVITY_LIMIT: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_items: i64,
    pub active_items: i64,
    pub collected_items: i64,
    pub archived_items: i64,
    pub this_month_items: i64,
    pub collection_rate: f64,
}

/// Items created and collected during one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyEntry {
    /// e.g. `Oct 2026`
    pub month: String,
    pub total: i64,
    pub collected: i64,
    /// `total - collected`. Not the number of items still active at the
    /// end of the month.
    pub active: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub overview: Overview,
    pub monthly_data: Vec<MonthlyEntry>,
    pub category_stats: Vec<CategoryCount>,
    pub recent_activity: Vec<ItemView>,
}

/// Raw `startDate`/`endDate` query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub active: usize,
    pub collected: usize,
    pub archived: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeEcho {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeReport {
    pub items: Vec<ItemView>,
    pub stats: StatusCounts,
    pub date_range: DateRangeEcho,
}

#[derive(Clone, Debug)]
pub struct StatsService {
    store: ItemStore,
    clock: Arc<dyn Clock>,
}

impl StatsService {
    pub fn new(store: ItemStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Every dashboard aggregate at once.
    pub async fn dashboard(&self) -> ItemResult<Dashboard> {
        let now = self.clock.now();
        let (overview, monthly_data, category_stats, recent_activity) = futures::try_join!(
            self.overview(now),
            self.monthly_series(now),
            self.category_distribution(),
            self.recent_activity(now),
        )?;

        Ok(Dashboard {
            overview,
            monthly_data,
            category_stats,
            recent_activity,
        })
    }

    pub async fn overview(&self, now: DateTime<Utc>) -> ItemResult<Overview> {
        let this_month = ItemPredicate {
            created_from: Some(month_start(now)),
            ..Default::default()
        };
        let (by_status, this_month_items) = futures::try_join!(
            self.store.aggregate_by_field(GroupField::Status),
            self.store.count_where(&this_month),
        )?;

        let count = |status: ItemStatus| by_status.get(status.as_str()).copied().unwrap_or(0);
        let total_items: i64 = by_status.values().sum();
        let collected_items = count(ItemStatus::Collected);

        Ok(Overview {
            total_items,
            active_items: count(ItemStatus::Active),
            collected_items,
            archived_items: count(ItemStatus::Archived),
            this_month_items,
            collection_rate: collection_rate(collected_items, total_items),
        })
    }

    /// Twelve consecutive calendar months, oldest first, ending with the
    /// month containing `now`.
    pub async fn monthly_series(&self, now: DateTime<Utc>) -> ItemResult<Vec<MonthlyEntry>> {
        let buckets = month_buckets(now);
        let entries = try_join_all(
            buckets
                .into_iter()
                .map(|(start, end)| self.month_entry(start, end)),
        )
        .await?;
        Ok(entries)
    }

    async fn month_entry(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ItemResult<MonthlyEntry> {
        let created = ItemPredicate {
            created_from: Some(start),
            created_before: Some(end),
            ..Default::default()
        };
        let collected = ItemPredicate {
            status: Some(ItemStatus::Collected),
            collected_from: Some(start),
            collected_before: Some(end),
            ..Default::default()
        };
        let (total, collected) = futures::try_join!(
            self.store.count_where(&created),
            self.store.count_where(&collected),
        )?;

        Ok(MonthlyEntry {
            month: start.format("%b %Y").to_string(),
            total,
            collected,
            active: (total - collected).max(0),
        })
    }

    /// Item count per category present in the store, largest first.
    pub async fn category_distribution(&self) -> ItemResult<Vec<CategoryCount>> {
        let counts = self.store.aggregate_by_field(GroupField::Category).await?;
        let mut stats: Vec<CategoryCount> = counts
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect();
        stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
        Ok(stats)
    }

    /// Up to ten items created during the last seven days, newest first.
    pub async fn recent_activity(&self, now: DateTime<Utc>) -> ItemResult<Vec<ItemView>> {
        let predicate = ItemPredicate {
            created_from: Some(now - Duration::days(RECENT_ACTIVITY_DAYS)),
            ..Default::default()
        };
        let (items, _) = self
            .store
            .find(&predicate, ItemSort::NewestFirst, 0, Some(RECENT_ACTIVITY_LIMIT))
            .await?;
        Ok(items)
    }

    /// Every item created between `startDate` and the end of `endDate`'s day.
    ///
    /// Unlike the listing filter, the upper bound here is widened to
    /// 23:59:59.999 so the whole end date is included.
    pub async fn date_range(&self, query: &DateRangeQuery) -> ItemResult<DateRangeReport> {
        let mut errors = FieldErrors::new();
        let start = bound(&mut errors, "startDate", query.start_date.as_deref());
        let end = bound(&mut errors, "endDate", query.end_date.as_deref());
        let (Some((start_raw, start)), Some((end_raw, end))) = (start, end) else {
            return Err(ItemError::Validation(errors));
        };

        let predicate = ItemPredicate {
            created_from: Some(start),
            created_to: Some(end_of_day(end)),
            ..Default::default()
        };
        let (items, _) = self.store.find(&predicate, ItemSort::NewestFirst, 0, None).await?;

        let mut stats = StatusCounts {
            total: items.len(),
            ..Default::default()
        };
        for view in &items {
            match view.item.status {
                ItemStatus::Active => stats.active += 1,
                ItemStatus::Collected => stats.collected += 1,
                ItemStatus::Archived => stats.archived += 1,
            }
        }

        Ok(DateRangeReport {
            items,
            stats,
            date_range: DateRangeEcho {
                start_date: start_raw,
                end_date: end_raw,
            },
        })
    }
}

/// Percentage of items collected, one decimal place; zero for an empty store.
pub fn collection_rate(collected: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (collected as f64 / total as f64 * 1000.0).round() / 10.0
}

/// Midnight UTC on the first day of `now`'s month.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let first = now.date_naive() - Days::new(u64::from(now.day0()));
    first.and_time(NaiveTime::MIN).and_utc()
}

/// `[start, end)` bounds of the last twelve calendar months, oldest first.
fn month_buckets(now: DateTime<Utc>) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let current = month_start(now);
    (0..MONTHS_IN_SERIES)
        .rev()
        .map(|back| {
            let start = current - Months::new(back);
            (start, start + Months::new(1))
        })
        .collect()
}

fn bound(
    errors: &mut FieldErrors,
    field: &str,
    raw: Option<&str>,
) -> Option<(String, DateTime<Utc>)> {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        None => {
            errors.push(field, format!("{} is required", field));
            None
        }
        Some(raw) => match parse_date_bound(raw) {
            Some(instant) => Some((raw.to_string(), instant)),
            None => {
                errors.push(field, format!("{} must be an ISO-8601 date", field));
                None
            }
        },
    }
}

//! Filter specification parsing, validation and paging for item listings.

use crate::{
    models::item::{Category, ItemStatus, ItemView},
    services::{
        error::{FieldErrors, ItemResult},
        item_store::{ItemPredicate, ItemSort, ItemStore},
    },
};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Raw listing parameters as they arrive from a query string.
///
/// Everything is kept as text so that every bad field can be reported at
/// once instead of failing on the first one that does not parse.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFilter {
    pub status: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    /// `newest` (default) or `oldest`.
    pub sort: Option<String>,
}

/// A validated filter.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub status: ItemStatus,
    pub category: Option<Category>,
    pub search: Option<String>,
    /// Inclusive lower bound on `created_at`.
    pub date_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`, compared as an exact instant.
    pub date_to: Option<DateTime<Utc>>,
    pub page: u32,
    pub limit: u32,
    pub sort: ItemSort,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            status: ItemStatus::Active,
            category: None,
            search: None,
            date_from: None,
            date_to: None,
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            sort: ItemSort::NewestFirst,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPage {
    pub items: Vec<ItemView>,
    pub total_pages: i64,
    pub current_page: u32,
    pub total: i64,
}

impl ItemFilter {
    /// Check every field and build the typed filter.
    ///
    /// Empty strings count as "not given". `status` falls back to `active`.
    pub fn validate(&self) -> ItemResult<FilterSpec> {
        let mut errors = FieldErrors::new();
        let mut spec = FilterSpec::default();

        if let Some(raw) = non_empty(&self.status) {
            match raw.parse::<ItemStatus>() {
                Ok(status) => spec.status = status,
                Err(msg) => errors.push("status", msg),
            }
        }
        if let Some(raw) = non_empty(&self.category) {
            match raw.parse::<Category>() {
                Ok(category) => spec.category = Some(category),
                Err(msg) => errors.push("category", msg),
            }
        }
        spec.search = non_empty(&self.search).map(str::to_string);

        if let Some(raw) = non_empty(&self.date_from) {
            match parse_date_bound(raw) {
                Some(from) => spec.date_from = Some(from),
                None => errors.push("dateFrom", "dateFrom must be an ISO-8601 date"),
            }
        }
        if let Some(raw) = non_empty(&self.date_to) {
            match parse_date_bound(raw) {
                Some(to) => spec.date_to = Some(to),
                None => errors.push("dateTo", "dateTo must be an ISO-8601 date"),
            }
        }
        if let Some(raw) = non_empty(&self.page) {
            match parse_positive(raw) {
                Some(page) => spec.page = page,
                None => errors.push("page", "page must be a positive integer"),
            }
        }
        if let Some(raw) = non_empty(&self.limit) {
            match parse_positive(raw) {
                Some(limit) => spec.limit = limit.min(MAX_PAGE_SIZE),
                None => errors.push("limit", "limit must be a positive integer"),
            }
        }
        if let Some(raw) = non_empty(&self.sort) {
            match raw.to_ascii_lowercase().as_str() {
                "newest" => spec.sort = ItemSort::NewestFirst,
                "oldest" => spec.sort = ItemSort::OldestFirst,
                _ => errors.push("sort", "sort must be one of: newest, oldest"),
            }
        }

        errors.into_result()?;
        Ok(spec)
    }
}

impl FilterSpec {
    pub fn predicate(&self) -> ItemPredicate {
        ItemPredicate {
            status: Some(self.status),
            category: self.category,
            search: self.search.clone(),
            created_from: self.date_from,
            created_to: self.date_to,
            ..Default::default()
        }
    }
}

/// Run a validated filter, sliced to the requested page.
pub async fn run_query(store: &ItemStore, spec: &FilterSpec) -> ItemResult<ItemPage> {
    let limit = i64::from(spec.limit.max(1));
    let skip = (i64::from(spec.page.max(1)) - 1) * limit;

    let (items, total) = store
        .find(&spec.predicate(), spec.sort, skip, Some(limit))
        .await?;
    let total_pages = (total + limit - 1) / limit;

    tracing::debug!(
        "query status={} page={} limit={} matched={}",
        spec.status,
        spec.page,
        spec.limit,
        total
    );

    Ok(ItemPage {
        items,
        total_pages,
        current_page: spec.page,
        total,
    })
}

/// Parse a date bound. Accepted forms, all read as UTC unless they carry
/// an offset: RFC 3339, `YYYY-MM-DDTHH:MM[:SS[.fff]]` (a space works in
/// place of the `T`), `YYYY-MM-DD`, `YYYY-MM` and `YYYY`. Partial dates
/// start at midnight of their first day.
pub fn parse_date_bound(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(&Utc));
    }
    for format in NAIVE_INSTANT_FORMATS {
        if let Ok(instant) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(instant.and_utc());
        }
    }
    let date = match raw.len() {
        4 => raw
            .parse::<i32>()
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1)),
        7 => NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d").ok(),
        _ => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok(),
    }?;
    Some(date.and_time(NaiveTime::MIN).and_utc())
}

const NAIVE_INSTANT_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Last millisecond of the UTC day containing `instant`.
pub fn end_of_day(instant: DateTime<Utc>) -> DateTime<Utc> {
    let next_day = instant.date_naive().and_time(NaiveTime::MIN).and_utc() + Duration::days(1);
    next_day - Duration::milliseconds(1)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_positive(raw: &str) -> Option<u32> {
    raw.parse::<u32>().ok().filter(|n| *n >= 1)
}

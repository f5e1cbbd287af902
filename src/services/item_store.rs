//! src/services/item_store.rs
//!
//! ItemStore: durable item records in SQLite. Knows nothing about
//! lifecycle rules; callers decide which changes are legal and this layer
//! applies them with single-statement updates.

use crate::{
    models::{
        item::{Category, Item, ItemStatus, ItemView},
        user::User,
    },
    services::image_store::normalize_image_path,
};
use chrono::{DateTime, Utc};
use sqlx::{
    QueryBuilder, SqliteConnection, SqlitePool,
    sqlite::Sqlite,
    types::Json,
};
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

const ITEM_SELECT: &str = "SELECT i.id, i.description, i.found_location, i.collection_location, \
     i.category, i.tags, i.image_path, i.status, i.collected_by, i.collected_at, \
     i.uploaded_by, i.created_at, i.updated_at, u.username AS uploader_name \
     FROM items i LEFT JOIN users u ON u.id = i.uploaded_by";

/// Joins the text fields inside `search_text` so a search cannot match
/// across two of them.
const FIELD_SEPARATOR: &str = "\u{1f}";

/// Conjunction of constraints over item rows. Unset fields match everything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ItemPredicate {
    pub status: Option<ItemStatus>,
    pub category: Option<Category>,
    /// Case-insensitive substring over the text fields and tags. A tag also
    /// matches when it equals one whole word of the search.
    pub search: Option<String>,
    /// `created_at >= created_from`
    pub created_from: Option<DateTime<Utc>>,
    /// `created_at <= created_to`
    pub created_to: Option<DateTime<Utc>>,
    /// `created_at < created_before`
    pub created_before: Option<DateTime<Utc>>,
    /// `collected_at >= collected_from`
    pub collected_from: Option<DateTime<Utc>>,
    /// `collected_at < collected_before`
    pub collected_before: Option<DateTime<Utc>>,
}

impl ItemPredicate {
    fn push_where(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        builder.push(" WHERE 1 = 1");

        if let Some(status) = self.status {
            builder.push(" AND i.status = ");
            builder.push_bind(status);
        }
        if let Some(category) = self.category {
            builder.push(" AND i.category = ");
            builder.push_bind(category);
        }
        if let Some(from) = self.created_from {
            builder.push(" AND i.created_at >= ");
            builder.push_bind(from);
        }
        if let Some(to) = self.created_to {
            builder.push(" AND i.created_at <= ");
            builder.push_bind(to);
        }
        if let Some(before) = self.created_before {
            builder.push(" AND i.created_at < ");
            builder.push_bind(before);
        }
        if let Some(from) = self.collected_from {
            builder.push(" AND i.collected_at >= ");
            builder.push_bind(from);
        }
        if let Some(before) = self.collected_before {
            builder.push(" AND i.collected_at < ");
            builder.push_bind(before);
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            // Both sides are lowercased in Rust; SQLite's LIKE only folds ASCII.
            let folded = search.to_lowercase();
            let pattern = format!("%{}%", escape_like(&folded));
            builder.push(" AND (i.search_text LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(
                " ESCAPE '\\' OR EXISTS (SELECT 1 FROM json_each(i.tags_folded) t WHERE t.value LIKE ",
            );
            builder.push_bind(pattern);
            builder.push(" ESCAPE '\\'");

            let words = search_words(&folded);
            if words.len() > 1 {
                builder.push(" OR t.value IN (");
                let mut list = builder.separated(", ");
                for word in words {
                    list.push_bind(word);
                }
                list.push_unseparated(")");
            }
            builder.push("))");
        }
    }
}

/// Result ordering on `created_at`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ItemSort {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl ItemSort {
    fn order_by(&self) -> &'static str {
        match self {
            Self::NewestFirst => " ORDER BY i.created_at DESC",
            Self::OldestFirst => " ORDER BY i.created_at ASC",
        }
    }
}

/// Columns that can be grouped on for histogram queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupField {
    Status,
    Category,
}

impl GroupField {
    fn column(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Category => "category",
        }
    }
}

/// Field assignments for one update. `updated_at` is always written.
#[derive(Clone, Debug, PartialEq)]
pub struct ItemChanges {
    pub description: Option<String>,
    pub found_location: Option<String>,
    pub collection_location: Option<String>,
    pub category: Option<Category>,
    pub tags: Option<Vec<String>>,
    pub image_path: Option<String>,
    pub status: Option<ItemStatus>,
    pub collected_by: Option<String>,
    pub collected_at: Option<DateTime<Utc>>,
    /// Archive the row, but only if it is still active when the write lands.
    pub archive_if_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl ItemChanges {
    pub fn at(updated_at: DateTime<Utc>) -> Self {
        Self {
            description: None,
            found_location: None,
            collection_location: None,
            category: None,
            tags: None,
            image_path: None,
            status: None,
            collected_by: None,
            collected_at: None,
            archive_if_active: false,
            updated_at,
        }
    }

    fn touches_search(&self) -> bool {
        self.description.is_some()
            || self.found_location.is_some()
            || self.collection_location.is_some()
            || self.tags.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct ItemStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl ItemStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Insert a fully built item and return its id.
    pub async fn insert(&self, item: &Item) -> Result<Uuid, sqlx::Error> {
        sqlx::query(
            "INSERT INTO items (
                id, description, found_location, collection_location, category, tags,
                image_path, status, collected_by, collected_at, uploaded_by,
                created_at, updated_at, search_text, tags_folded
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(item.id)
        .bind(&item.description)
        .bind(&item.found_location)
        .bind(&item.collection_location)
        .bind(item.category)
        .bind(Json(&item.tags))
        .bind(&item.image_path)
        .bind(item.status)
        .bind(&item.collected_by)
        .bind(item.collected_at)
        .bind(item.uploaded_by)
        .bind(item.created_at)
        .bind(item.updated_at)
        .bind(search_text(item))
        .bind(Json(fold_tags(&item.tags)))
        .execute(&*self.db)
        .await?;

        Ok(item.id)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<ItemView>, sqlx::Error> {
        let mut conn = self.db.acquire().await?;
        fetch_view(&mut conn, id).await
    }

    /// Matching rows in `sort` order, plus the total number of matches
    /// ignoring `skip`/`limit`. `limit = None` returns every match.
    pub async fn find(
        &self,
        predicate: &ItemPredicate,
        sort: ItemSort,
        skip: i64,
        limit: Option<i64>,
    ) -> Result<(Vec<ItemView>, i64), sqlx::Error> {
        let mut builder = QueryBuilder::<Sqlite>::new(ITEM_SELECT);
        predicate.push_where(&mut builder);
        builder.push(sort.order_by());
        if let Some(limit) = limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
            builder.push(" OFFSET ");
            builder.push_bind(skip);
        }

        let rows: Vec<ItemView> = builder.build_query_as().fetch_all(&*self.db).await?;
        let matched = self.count_where(predicate).await?;

        Ok((rows.into_iter().map(normalized).collect(), matched))
    }

    pub async fn count_where(&self, predicate: &ItemPredicate) -> Result<i64, sqlx::Error> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM items i");
        predicate.push_where(&mut builder);
        builder
            .build_query_scalar::<i64>()
            .fetch_one(&*self.db)
            .await
    }

    /// Apply `changes` and return the refreshed row, or `None` if the id is unknown.
    pub async fn update_by_id(
        &self,
        id: Uuid,
        changes: &ItemChanges,
    ) -> Result<Option<ItemView>, sqlx::Error> {
        self.update_guarded(id, None, changes).await
    }

    /// Like [`update_by_id`](Self::update_by_id) but only touches the row
    /// while it still has `expected` status. The check and the write are one
    /// statement, so of two racing callers only one can succeed.
    pub async fn update_by_id_when(
        &self,
        id: Uuid,
        expected: ItemStatus,
        changes: &ItemChanges,
    ) -> Result<Option<ItemView>, sqlx::Error> {
        self.update_guarded(id, Some(expected), changes).await
    }

    async fn update_guarded(
        &self,
        id: Uuid,
        expected: Option<ItemStatus>,
        changes: &ItemChanges,
    ) -> Result<Option<ItemView>, sqlx::Error> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE items SET updated_at = ");
        builder.push_bind(changes.updated_at);

        if let Some(description) = &changes.description {
            builder.push(", description = ");
            builder.push_bind(description.clone());
        }
        if let Some(found_location) = &changes.found_location {
            builder.push(", found_location = ");
            builder.push_bind(found_location.clone());
        }
        if let Some(collection_location) = &changes.collection_location {
            builder.push(", collection_location = ");
            builder.push_bind(collection_location.clone());
        }
        if let Some(category) = changes.category {
            builder.push(", category = ");
            builder.push_bind(category);
        }
        if let Some(tags) = &changes.tags {
            builder.push(", tags = ");
            builder.push_bind(Json(tags.clone()));
        }
        if let Some(image_path) = &changes.image_path {
            builder.push(", image_path = ");
            builder.push_bind(image_path.clone());
        }
        if let Some(status) = changes.status {
            builder.push(", status = ");
            builder.push_bind(status);
        }
        if let Some(collected_by) = &changes.collected_by {
            builder.push(", collected_by = ");
            builder.push_bind(collected_by.clone());
        }
        if let Some(collected_at) = changes.collected_at {
            builder.push(", collected_at = ");
            builder.push_bind(collected_at);
        }
        if changes.archive_if_active {
            builder.push(", status = CASE WHEN status = ");
            builder.push_bind(ItemStatus::Active);
            builder.push(" THEN ");
            builder.push_bind(ItemStatus::Archived);
            builder.push(" ELSE status END");
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);
        if let Some(expected) = expected {
            builder.push(" AND status = ");
            builder.push_bind(expected);
        }

        let mut tx = self.db.begin().await?;
        let result = builder.build().execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let view = fetch_view(&mut tx, id).await?;
        if let Some(view) = view.as_ref().filter(|_| changes.touches_search()) {
            sqlx::query("UPDATE items SET search_text = ?, tags_folded = ? WHERE id = ?")
                .bind(search_text(&view.item))
                .bind(Json(fold_tags(&view.item.tags)))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(view)
    }

    /// Archive every active item created before `cutoff` in one statement.
    /// Returns how many rows changed.
    pub async fn archive_created_before(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE items SET status = ?, updated_at = ? WHERE status = ? AND created_at < ?",
        )
        .bind(ItemStatus::Archived)
        .bind(now)
        .bind(ItemStatus::Active)
        .bind(cutoff)
        .execute(&*self.db)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete_by_id(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Row count per distinct value of `field`.
    pub async fn aggregate_by_field(
        &self,
        field: GroupField,
    ) -> Result<HashMap<String, i64>, sqlx::Error> {
        let column = field.column();
        let sql = format!(
            "SELECT {column} AS value, COUNT(*) AS count FROM items GROUP BY {column}"
        );
        let rows: Vec<(String, i64)> = sqlx::query_as(&sql).fetch_all(&*self.db).await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn insert_user(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (id, username, created_at) VALUES (?, ?, ?)
             RETURNING id, username, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(now)
        .fetch_one(&*self.db)
        .await
    }
}

async fn fetch_view(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<ItemView>, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new(ITEM_SELECT);
    builder.push(" WHERE i.id = ");
    builder.push_bind(id);

    let row: Option<ItemView> = builder.build_query_as().fetch_optional(&mut *conn).await?;
    Ok(row.map(normalized))
}

/// Lowercased text fields as stored in `search_text`.
fn search_text(item: &Item) -> String {
    [
        item.description.as_str(),
        item.found_location.as_str(),
        item.collection_location.as_str(),
    ]
    .map(str::to_lowercase)
    .join(FIELD_SEPARATOR)
}

fn fold_tags(tags: &[String]) -> Vec<String> {
    tags.iter().map(|t| t.to_lowercase()).collect()
}

/// Distinct words of a (lowercased) search, stripped of surrounding punctuation.
fn search_words(folded: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for word in folded.split_whitespace() {
        let word = word.trim_matches(|c: char| !c.is_alphanumeric());
        if !word.is_empty() && !words.iter().any(|w| w == word) {
            words.push(word.to_string());
        }
    }
    words
}

fn normalized(mut view: ItemView) -> ItemView {
    view.item.image_path = normalize_image_path(&view.item.image_path);
    view
}

/// Escape LIKE wildcards so user input only ever matches literally.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

//! src/services/lifecycle.rs
//!
//! ItemService: the only way item records change. It owns the status
//! rules (active → collected by explicit action, active → archived once an
//! item is more than a calendar month old) and keeps each record's photo in
//! step with the record itself.

use crate::{
    models::item::{Category, Item, ItemStatus, ItemView},
    services::{
        clock::Clock,
        error::{FieldErrors, ItemError, ItemResult},
        image_store::ImageStore,
        item_store::{ItemChanges, ItemStore},
        query::{FilterSpec, ItemPage, run_query},
    },
};
use bytes::Bytes;
use chrono::{DateTime, Months, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_DESCRIPTION_LEN: usize = 500;
const MAX_LOCATION_LEN: usize = 200;
const MAX_COLLECTED_BY_LEN: usize = 100;
const MAX_TAG_LEN: usize = 50;

/// Fields supplied when registering an item. `category` stays raw text so
/// a bad value is reported alongside any other invalid field.
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub description: String,
    pub found_location: String,
    pub collection_location: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

/// Partial update. `None` leaves the field untouched; `Some("")` for a
/// required text field is rejected. `Some(vec![])` clears the tags.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub description: Option<String>,
    pub found_location: Option<String>,
    pub collection_location: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// An accepted photo upload, already checked for size and type.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Bytes,
    pub file_name: String,
}

/// The photo part of a create or update request.
#[derive(Debug, Clone, Default)]
pub enum ImageField {
    #[default]
    Absent,
    Accepted(ImageUpload),
    /// The upload was refused for this reason. Reported with the other
    /// field errors of the same request.
    Rejected(String),
}

impl From<ImageUpload> for ImageField {
    fn from(upload: ImageUpload) -> Self {
        Self::Accepted(upload)
    }
}

impl ImageField {
    /// The usable upload, recording a refusal in `errors`.
    fn accepted(self, errors: &mut FieldErrors) -> Option<ImageUpload> {
        match self {
            Self::Absent => None,
            Self::Accepted(upload) => Some(upload),
            Self::Rejected(reason) => {
                errors.push("image", reason);
                None
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct ItemService {
    store: ItemStore,
    images: ImageStore,
    clock: Arc<dyn Clock>,
}

impl ItemService {
    pub fn new(store: ItemStore, images: ImageStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            images,
            clock,
        }
    }

    pub fn store(&self) -> &ItemStore {
        &self.store
    }

    /// Register a new item. Inputs are validated before anything is
    /// written; the photo is stored first and discarded again if the
    /// record cannot be inserted.
    pub async fn create(
        &self,
        new: NewItem,
        image: ImageField,
        uploaded_by: Uuid,
    ) -> ItemResult<ItemView> {
        let mut errors = FieldErrors::new();
        let description = required_text(
            &mut errors,
            "description",
            &new.description,
            MAX_DESCRIPTION_LEN,
        );
        let found_location = required_text(
            &mut errors,
            "foundLocation",
            &new.found_location,
            MAX_LOCATION_LEN,
        );
        let collection_location = required_text(
            &mut errors,
            "collectionLocation",
            &new.collection_location,
            MAX_LOCATION_LEN,
        );
        let category = match new.category.as_deref().map(str::trim) {
            None | Some("") => Some(Category::default()),
            Some(raw) => parse_category(&mut errors, raw),
        };
        let tags = clean_tags(&mut errors, &new.tags);
        if matches!(image, ImageField::Absent) {
            errors.push("image", "Image is required");
        }
        let image = image.accepted(&mut errors);
        errors.into_result()?;
        let Some(image) = image else {
            return Err(ItemError::invalid("image", "Image is required"));
        };

        let image_path = self.images.store(image.bytes, &image.file_name).await?;

        let now = self.clock.now();
        let item = apply_passive_archival(
            Item {
                id: Uuid::new_v4(),
                description: description.unwrap_or_default(),
                found_location: found_location.unwrap_or_default(),
                collection_location: collection_location.unwrap_or_default(),
                category: category.unwrap_or_default(),
                tags,
                image_path,
                status: ItemStatus::Active,
                collected_by: None,
                collected_at: None,
                uploaded_by,
                created_at: now,
                updated_at: now,
            },
            now,
        );

        if let Err(err) = self.store.insert(&item).await {
            self.release_quietly(&item.image_path).await;
            return Err(err.into());
        }
        info!("registered item {} ({})", item.id, item.category);

        self.store
            .find_by_id(item.id)
            .await?
            .ok_or_else(|| ItemError::NotFound(item.id.to_string()))
    }

    pub async fn get(&self, id: &str) -> ItemResult<ItemView> {
        let uuid = parse_item_id(id)?;
        self.store
            .find_by_id(uuid)
            .await?
            .ok_or_else(|| ItemError::NotFound(id.to_string()))
    }

    pub async fn list(&self, spec: &FilterSpec) -> ItemResult<ItemPage> {
        run_query(&self.store, spec).await
    }

    /// Hand an active item over to its owner.
    ///
    /// The status check and the write happen in one conditional update, so
    /// when two requests race only the first one wins; the other sees
    /// `InvalidTransition`.
    pub async fn collect(&self, id: &str, collected_by: &str) -> ItemResult<ItemView> {
        let mut errors = FieldErrors::new();
        let name = required_text(&mut errors, "collectedBy", collected_by, MAX_COLLECTED_BY_LEN);
        errors.into_result()?;
        let uuid = parse_item_id(id)?;

        let now = self.clock.now();
        let mut changes = ItemChanges::at(now);
        changes.status = Some(ItemStatus::Collected);
        changes.collected_by = name;
        changes.collected_at = Some(now);

        if let Some(view) = self
            .store
            .update_by_id_when(uuid, ItemStatus::Active, &changes)
            .await?
        {
            info!("item {} collected", uuid);
            return Ok(view);
        }

        match self.store.find_by_id(uuid).await? {
            None => Err(ItemError::NotFound(id.to_string())),
            Some(current) => Err(ItemError::InvalidTransition {
                id: id.to_string(),
                status: current.item.status,
            }),
        }
    }

    /// Apply a partial update, optionally swapping the photo.
    ///
    /// Photo swap order: the new file is written, the record is pointed at
    /// it, and only then is the old file removed. If the record update
    /// fails the new file is removed instead, so the record never points at
    /// a missing photo.
    pub async fn update(
        &self,
        id: &str,
        patch: ItemPatch,
        image: ImageField,
    ) -> ItemResult<ItemView> {
        let now = self.clock.now();
        let mut changes = ItemChanges::at(now);
        let mut errors = FieldErrors::new();

        if let Some(raw) = &patch.description {
            changes.description =
                required_text(&mut errors, "description", raw, MAX_DESCRIPTION_LEN);
        }
        if let Some(raw) = &patch.found_location {
            changes.found_location =
                required_text(&mut errors, "foundLocation", raw, MAX_LOCATION_LEN);
        }
        if let Some(raw) = &patch.collection_location {
            changes.collection_location =
                required_text(&mut errors, "collectionLocation", raw, MAX_LOCATION_LEN);
        }
        if let Some(raw) = patch.category.as_deref().map(str::trim) {
            if !raw.is_empty() {
                changes.category = parse_category(&mut errors, raw);
            }
        }
        if let Some(raw) = &patch.tags {
            changes.tags = Some(clean_tags(&mut errors, raw));
        }
        let image = image.accepted(&mut errors);
        errors.into_result()?;

        let uuid = parse_item_id(id)?;
        let current = self
            .store
            .find_by_id(uuid)
            .await?
            .ok_or_else(|| ItemError::NotFound(id.to_string()))?;

        // Every write re-checks the age rule. The status is only changed if
        // the row is still active when the write lands, so a collection
        // that slips in after the read above is kept.
        changes.archive_if_active =
            apply_passive_archival(current.item.clone(), now).status != current.item.status;

        let staged = match image {
            Some(upload) => Some(self.images.store(upload.bytes, &upload.file_name).await?),
            None => None,
        };
        changes.image_path = staged.clone();

        let updated = match self.store.update_by_id(uuid, &changes).await {
            Ok(Some(view)) => view,
            Ok(None) => {
                if let Some(path) = &staged {
                    self.release_quietly(path).await;
                }
                return Err(ItemError::NotFound(id.to_string()));
            }
            Err(err) => {
                if let Some(path) = &staged {
                    self.release_quietly(path).await;
                }
                return Err(err.into());
            }
        };

        if staged.is_some() {
            self.release_quietly(&current.item.image_path).await;
        }
        info!("item {} updated", uuid);
        Ok(updated)
    }

    /// Remove the record, then its photo.
    pub async fn delete(&self, id: &str) -> ItemResult<ItemView> {
        let uuid = parse_item_id(id)?;
        let current = self
            .store
            .find_by_id(uuid)
            .await?
            .ok_or_else(|| ItemError::NotFound(id.to_string()))?;

        if !self.store.delete_by_id(uuid).await? {
            return Err(ItemError::NotFound(id.to_string()));
        }
        self.release_quietly(&current.item.image_path).await;

        info!("item {} deleted", uuid);
        Ok(current)
    }

    /// Archive every active item created more than one calendar month ago.
    /// Safe to run repeatedly; returns how many items changed this time.
    pub async fn archive_stale(&self) -> ItemResult<u64> {
        let now = self.clock.now();
        let cutoff = archival_cutoff(now);
        let archived = self.store.archive_created_before(cutoff, now).await?;
        info!("archived {} item(s) created before {}", archived, cutoff);
        Ok(archived)
    }

    /// The record is already consistent at this point, so a file that
    /// cannot be removed is only logged.
    async fn release_quietly(&self, path: &str) {
        if let Err(err) = self.images.release(path).await {
            warn!("failed to release image {}: {}", path, err);
        }
    }
}

/// Items created strictly before this instant are due for archival.
///
/// Calendar-month subtraction: March 15 → February 15. Days that do not
/// exist in the earlier month clamp to its last day (March 31 → February 28).
pub fn archival_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(1)).unwrap_or(now)
}

/// The passive archival rule: an active item older than one calendar month
/// becomes archived. Anything else is returned unchanged.
pub fn apply_passive_archival(mut item: Item, now: DateTime<Utc>) -> Item {
    if item.status == ItemStatus::Active && item.created_at < archival_cutoff(now) {
        item.status = ItemStatus::Archived;
    }
    item
}

/// Split a comma-separated tag list, trimming entries and dropping blanks.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Unknown or malformed ids are reported the same way as missing ones.
fn parse_item_id(id: &str) -> ItemResult<Uuid> {
    Uuid::parse_str(id.trim()).map_err(|_| ItemError::NotFound(id.to_string()))
}

fn required_text(
    errors: &mut FieldErrors,
    field: &str,
    raw: &str,
    max_len: usize,
) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() {
        errors.push(field, format!("{} is required", field));
        return None;
    }
    if value.chars().count() > max_len {
        errors.push(
            field,
            format!("{} must be at most {} characters", field, max_len),
        );
        return None;
    }
    Some(value.to_string())
}

fn parse_category(errors: &mut FieldErrors, raw: &str) -> Option<Category> {
    match raw.parse::<Category>() {
        Ok(category) => Some(category),
        Err(msg) => {
            errors.push("category", msg);
            None
        }
    }
}

fn clean_tags(errors: &mut FieldErrors, raw: &[String]) -> Vec<String> {
    let tags: Vec<String> = raw
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    if tags.iter().any(|t| t.chars().count() > MAX_TAG_LEN) {
        errors.push(
            "tags",
            format!("each tag must be at most {} characters", MAX_TAG_LEN),
        );
    }
    tags
}

//! HTTP handlers for item registration, browsing and lifecycle changes.
//! All rules live in `ItemService`; these functions only decode requests
//! and shape responses.

use crate::{
    errors::AppError,
    handlers::image_handlers::validate_image,
    services::{
        AppState,
        lifecycle::{ImageField, ImageUpload, ItemPatch, NewItem, parse_tags},
        query::ItemFilter,
    },
};
use axum::{
    Json,
    extract::{FromRequestParts, Multipart, Path, Query, State},
    http::{StatusCode, request::Parts},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

/// Header carrying the acting account's id, set by the identity layer in
/// front of this service. The value is trusted as-is.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The account performing a mutating request.
#[derive(Debug, Clone, Copy)]
pub struct ActingUser(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for ActingUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(ActingUser)
            .ok_or_else(|| AppError::new(StatusCode::UNAUTHORIZED, "Authentication required"))
    }
}

/// Body of `PATCH /api/items/{id}/collect`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectRequest {
    #[serde(default)]
    pub collected_by: String,
}

/// Text fields and photo of an item form, each `None` when not sent. A
/// refused photo is kept as [`ImageField::Rejected`] so the service reports
/// it together with any bad text field.
#[derive(Debug, Default)]
struct ItemForm {
    description: Option<String>,
    found_location: Option<String>,
    collection_location: Option<String>,
    category: Option<String>,
    tags: Option<String>,
    image: ImageField,
}

/// `GET /api/items`: filtered, paged listing.
pub async fn list_items(
    State(state): State<AppState>,
    Query(filter): Query<ItemFilter>,
) -> Result<impl IntoResponse, AppError> {
    let spec = filter.validate()?;
    let page = state.items.list(&spec).await?;
    Ok(Json(page))
}

/// `GET /api/items/{id}`
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let view = state.items.get(&id).await?;
    Ok(Json(view))
}

/// `POST /api/items`: multipart form with an `image` file part.
pub async fn create_item(
    State(state): State<AppState>,
    ActingUser(user): ActingUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = read_item_form(multipart).await?;
    let new = NewItem {
        description: form.description.unwrap_or_default(),
        found_location: form.found_location.unwrap_or_default(),
        collection_location: form.collection_location.unwrap_or_default(),
        category: form.category,
        tags: form.tags.as_deref().map(parse_tags).unwrap_or_default(),
    };

    let item = state.items.create(new, form.image, user).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Item added successfully", "item": item })),
    ))
}

/// `PATCH /api/items/{id}/collect`
pub async fn collect_item(
    State(state): State<AppState>,
    ActingUser(_user): ActingUser,
    Path(id): Path<String>,
    Json(req): Json<CollectRequest>,
) -> Result<impl IntoResponse, AppError> {
    let item = state.items.collect(&id, &req.collected_by).await?;
    Ok(Json(
        json!({ "message": "Item marked as collected", "item": item }),
    ))
}

/// `PUT /api/items/{id}`: multipart partial update; the photo is optional.
pub async fn update_item(
    State(state): State<AppState>,
    ActingUser(_user): ActingUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = read_item_form(multipart).await?;
    let patch = ItemPatch {
        description: form.description,
        found_location: form.found_location,
        collection_location: form.collection_location,
        category: form.category,
        tags: form.tags.as_deref().map(parse_tags),
    };

    let item = state.items.update(&id, patch, form.image).await?;
    Ok(Json(
        json!({ "message": "Item updated successfully", "item": item }),
    ))
}

/// `DELETE /api/items/{id}`
pub async fn delete_item(
    State(state): State<AppState>,
    ActingUser(_user): ActingUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.items.delete(&id).await?;
    Ok(Json(json!({ "message": "Item deleted successfully" })))
}

/// `POST /api/items/archive-old`: run the archival sweep now.
pub async fn archive_old_items(
    State(state): State<AppState>,
    ActingUser(_user): ActingUser,
) -> Result<impl IntoResponse, AppError> {
    let archived = state.items.archive_stale().await?;
    Ok(Json(json!({
        "message": "Old items archived successfully",
        "archivedCount": archived
    })))
}

/// Drain a multipart body into an [`ItemForm`]. Unknown parts are skipped.
async fn read_item_form(mut multipart: Multipart) -> Result<ItemForm, AppError> {
    let mut form = ItemForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|err| AppError::bad_request(err.body_text()))?;
            let upload = ImageUpload { bytes, file_name };
            form.image = match validate_image(&upload, content_type.as_deref()) {
                Ok(()) => ImageField::Accepted(upload),
                Err(reason) => ImageField::Rejected(reason),
            };
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|err| AppError::bad_request(err.body_text()))?;
        match name.as_str() {
            "description" => form.description = Some(text),
            "foundLocation" => form.found_location = Some(text),
            "collectionLocation" => form.collection_location = Some(text),
            "category" => form.category = Some(text),
            "tags" => form.tags = Some(text),
            other => tracing::debug!("ignoring unknown form field `{}`", other),
        }
    }

    Ok(form)
}

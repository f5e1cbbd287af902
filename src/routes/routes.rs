//! Route table for the lost-and-found API.
//!
//! ## Structure
//! - **Health checks**
//!   - `GET    /healthz`, `GET /readyz`
//!
//! - **Items** (mutations require the `X-User-Id` header)
//!   - `GET    /api/items`: filtered, paged listing
//!   - `POST   /api/items`: register a found item (multipart with photo)
//!   - `POST   /api/items/archive-old`: run the archival sweep
//!   - `GET    /api/items/{id}`: one item
//!   - `PUT    /api/items/{id}`: partial update, optional new photo
//!   - `DELETE /api/items/{id}`: remove item and photo
//!   - `PATCH  /api/items/{id}/collect`: hand the item over
//!
//! - **Statistics**
//!   - `GET    /api/stats`, `GET /api/stats/date-range`
//!
//! - **Photos**
//!   - `GET    /uploads/{*path}`

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        image_handlers::serve_image,
        item_handlers::{
            archive_old_items, collect_item, create_item, delete_item, get_item, list_items,
            update_item,
        },
        stats_handlers::{get_date_range, get_stats},
    },
    services::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
};

/// Request bodies above this are rejected before multipart parsing. Leaves
/// headroom over the photo limit for the text fields.
pub const MAX_BODY_BYTES: usize = 6 * 1024 * 1024;

/// Build the router. Shared state (`AppState`) is attached by the caller.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/items", get(list_items).post(create_item))
        .route("/api/items/archive-old", post(archive_old_items))
        .route(
            "/api/items/{id}",
            get(get_item).put(update_item).delete(delete_item),
        )
        .route("/api/items/{id}/collect", patch(collect_item))
        .route("/api/stats", get(get_stats))
        .route("/api/stats/date-range", get(get_date_range))
        .route("/uploads/{*path}", get(serve_image))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::memory_pool,
        services::{clock::FixedClock, image_store::ImageStore, item_store::ItemStore},
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use chrono::{TimeZone, Utc};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;
    use uuid::Uuid;

    const BOUNDARY: &str = "lost-found-test-boundary";

    struct TestApp {
        router: Router,
        user: Uuid,
        _dir: TempDir,
    }

    async fn app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, 0).unwrap();
        let db = Arc::new(memory_pool().await);
        let user = ItemStore::new(db.clone())
            .insert_user("desk", now)
            .await
            .unwrap()
            .id;
        let images = ImageStore::new(dir.path());
        tokio::fs::create_dir_all(images.upload_dir()).await.unwrap();
        let state = AppState::new(db, images, Arc::new(FixedClock::new(now)));
        TestApp {
            router: routes().with_state(state),
            user,
            _dir: dir,
        }
    }

    fn multipart_body(fields: &[(&str, &str)], image: Option<(&str, &str)>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, content_type)) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(b"\x89PNG not really");
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn form_request(method: &str, uri: &str, user: Option<Uuid>, body: Vec<u8>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri).header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
        if let Some(user) = user {
            builder = builder.header("x-user-id", user.to_string());
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn create_wallet(app: &TestApp) -> Value {
        let body = multipart_body(
            &[
                ("description", "Brown leather wallet"),
                ("foundLocation", "Library"),
                ("collectionLocation", "Front desk"),
                ("category", "accessories"),
                ("tags", "wallet, leather"),
            ],
            Some(("wallet.png", "image/png")),
        );
        let (status, json) = send(app, form_request("POST", "/api/items", Some(app.user), body)).await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json["item"].clone()
    }

    #[tokio::test]
    async fn health_checks_report_ok() {
        let app = app().await;
        let (status, body) = send(&app, get("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send(&app, get("/readyz")).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["checks"]["sqlite"]["ok"], true);
        assert_eq!(body["checks"]["uploads"]["ok"], true);
    }

    #[tokio::test]
    async fn mutations_require_an_acting_user() {
        let app = app().await;
        let body = multipart_body(&[("description", "Umbrella")], None);
        let (status, _) = send(&app, form_request("POST", "/api/items", None, body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn created_item_is_listed_and_its_photo_served() {
        let app = app().await;
        let item = create_wallet(&app).await;
        assert_eq!(item["status"], "active");
        assert_eq!(item["tags"], json!(["wallet", "leather"]));
        assert_eq!(item["uploaderName"], "desk");

        let (status, page) = send(&app, get("/api/items?search=red%20wallet")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], 1);
        assert_eq!(page["items"][0]["id"], item["id"]);

        let image_path = item["imagePath"].as_str().unwrap();
        assert!(image_path.starts_with("uploads/"));
        let response = app
            .router
            .clone()
            .oneshot(get(&format!("/{image_path}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    }

    #[tokio::test]
    async fn incomplete_form_reports_every_missing_field() {
        let app = app().await;
        let body = multipart_body(&[("foundLocation", "Gym")], None);
        let (status, json) = send(&app, form_request("POST", "/api/items", Some(app.user), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let fields: Vec<&str> = json["errors"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|e| e["field"].as_str())
            .collect();
        assert!(fields.contains(&"description"));
        assert!(fields.contains(&"collectionLocation"));
        assert!(fields.contains(&"image"));
    }

    #[tokio::test]
    async fn non_image_upload_is_rejected() {
        let app = app().await;
        let body = multipart_body(
            &[
                ("description", "Notes"),
                ("foundLocation", "Lab"),
                ("collectionLocation", "Desk"),
            ],
            Some(("notes.pdf", "application/pdf")),
        );
        let (status, json) = send(&app, form_request("POST", "/api/items", Some(app.user), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"][0]["field"], "image");
        assert_eq!(json["errors"][0]["message"], "Only image files are allowed!");
        assert_eq!(json["errors"].as_array().unwrap().len(), 1);

        // a refused photo does not hide missing text fields
        let body = multipart_body(&[], Some(("notes.pdf", "application/pdf")));
        let (status, json) = send(&app, form_request("POST", "/api/items", Some(app.user), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let fields: Vec<&str> = json["errors"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|e| e["field"].as_str())
            .collect();
        assert_eq!(
            fields,
            vec!["description", "foundLocation", "collectionLocation", "image"]
        );
    }

    #[tokio::test]
    async fn search_ignores_case_beyond_ascii() {
        let app = app().await;
        let body = multipart_body(
            &[
                ("description", "Écharpe rouge"),
                ("foundLocation", "Hall"),
                ("collectionLocation", "Desk"),
            ],
            Some(("scarf.png", "image/png")),
        );
        let (status, _) = send(&app, form_request("POST", "/api/items", Some(app.user), body)).await;
        assert_eq!(status, StatusCode::CREATED);

        for search in ["%C3%A9charpe", "%C3%89charpe", "%C3%89CHARPE"] {
            let (status, page) = send(&app, get(&format!("/api/items?search={search}"))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(page["total"], 1, "search {search}");
        }
    }

    #[tokio::test]
    async fn bad_listing_parameters_are_rejected() {
        let app = app().await;
        let (status, json) = send(&app, get("/api/items?status=lost&page=0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn collection_happens_once() {
        let app = app().await;
        let item = create_wallet(&app).await;
        let uri = format!("/api/items/{}/collect", item["id"].as_str().unwrap());

        let collect = |who: &str| {
            Request::builder()
                .method("PATCH")
                .uri(&uri)
                .header("x-user-id", app.user.to_string())
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "collectedBy": who }).to_string()))
                .unwrap()
        };

        let (status, json) = send(&app, collect("Alex")).await;
        assert_eq!(status, StatusCode::OK, "{json}");
        assert_eq!(json["item"]["status"], "collected");
        assert_eq!(json["item"]["collectedBy"], "Alex");

        let (status, _) = send(&app, collect("Sam")).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn update_and_delete_round_trip() {
        let app = app().await;
        let item = create_wallet(&app).await;
        let uri = format!("/api/items/{}", item["id"].as_str().unwrap());

        let body = multipart_body(&[("description", "Black wallet"), ("tags", "")], None);
        let (status, json) = send(&app, form_request("PUT", &uri, Some(app.user), body)).await;
        assert_eq!(status, StatusCode::OK, "{json}");
        assert_eq!(json["item"]["description"], "Black wallet");
        assert_eq!(json["item"]["foundLocation"], "Library");
        assert_eq!(json["item"]["tags"], json!([]));

        let delete = Request::builder()
            .method("DELETE")
            .uri(&uri)
            .header("x-user-id", app.user.to_string())
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, delete).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let app = app().await;
        let (status, _) = send(&app, get("/api/items/not-a-uuid")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, get(&format!("/api/items/{}", Uuid::new_v4()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, get("/uploads/../Cargo.toml")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn archive_sweep_reports_count() {
        let app = app().await;
        create_wallet(&app).await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/items/archive-old")
            .header("x-user-id", app.user.to_string())
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["archivedCount"], 0);
    }

    #[tokio::test]
    async fn stats_endpoints_respond() {
        let app = app().await;
        create_wallet(&app).await;

        let (status, json) = send(&app, get("/api/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["overview"]["totalItems"], 1);
        assert_eq!(json["monthlyData"].as_array().unwrap().len(), 12);

        let (status, _) = send(&app, get("/api/stats/date-range?startDate=2026-10-01")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = send(
            &app,
            get("/api/stats/date-range?startDate=2026-10-01&endDate=2026-10-17"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["stats"]["total"], 1);
        assert_eq!(json["stats"]["active"], 1);
    }
}

pub mod clock;
pub mod error;
pub mod image_store;
pub mod item_store;
pub mod lifecycle;
pub mod query;
pub mod stats;

use clock::Clock;
use image_store::ImageStore;
use item_store::ItemStore;
use lifecycle::ItemService;
use sqlx::SqlitePool;
use stats::StatsService;
use std::sync::Arc;

/// Shared handler state. Cheap to clone; everything inside is reference counted.
#[derive(Clone, Debug)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub images: ImageStore,
    pub items: ItemService,
    pub stats: StatsService,
}

impl AppState {
    pub fn new(db: Arc<SqlitePool>, images: ImageStore, clock: Arc<dyn Clock>) -> Self {
        let store = ItemStore::new(db.clone());
        Self {
            items: ItemService::new(store.clone(), images.clone(), clock.clone()),
            stats: StatsService::new(store, clock),
            images,
            db,
        }
    }
}

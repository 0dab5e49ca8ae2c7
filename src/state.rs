use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    services::{
        links::Links,
        mail::Notifier,
        store::SqliteStore,
        trips::TripService,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub trips: TripService,
}

impl AppState {
    pub fn new(config: &AppConfig, db: DbPool, notifier: Arc<dyn Notifier>) -> Self {
        let store = SqliteStore::new(db.clone());
        let trips = TripService::new(Arc::new(store), notifier, Links::from_config(config));
        Self { db, trips }
    }
}

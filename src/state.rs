use std::sync::Arc;

use sqlx::PgPool;

use crate::users::{
    repo::{PgUserStore, UserStore},
    services::UserService,
};

#[derive(Clone)]
pub struct AppState {
    pub users: UserService,
}

impl AppState {
    pub fn from_pool(db: PgPool) -> Self {
        Self::from_store(Arc::new(PgUserStore::new(db)))
    }

    pub fn from_store(store: Arc<dyn UserStore>) -> Self {
        Self {
            users: UserService::new(store),
        }
    }
}

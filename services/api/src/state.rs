//! Application state shared across handlers

use std::sync::Arc;

use catalog::{CatalogQueryService, PreferenceService};

use crate::{middleware::JwtConfig, repositories::UserRepository};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogQueryService,
    pub preferences: PreferenceService,
    pub users: Arc<dyn UserRepository>,
    pub jwt: JwtConfig,
}

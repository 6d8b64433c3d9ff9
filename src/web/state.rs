//! Shared application state for the HTTP surface.

use std::sync::Arc;

use sqlx::PgPool;

use crate::campaigns::CampaignLifecycle;
use crate::config::MeshConfig;
use crate::ingestion::InboundProcessor;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub lifecycle: CampaignLifecycle,
    pub processor: Arc<InboundProcessor>,
    pub config: Arc<MeshConfig>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        processor: Arc<InboundProcessor>,
        config: Arc<MeshConfig>,
    ) -> Self {
        let lifecycle = CampaignLifecycle::new(pool.clone());
        Self {
            pool,
            lifecycle,
            processor,
            config,
        }
    }
}

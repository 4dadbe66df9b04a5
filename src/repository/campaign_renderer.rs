use async_trait::async_trait;
use sqlx::PgPool;

use crate::dispatch::store::{CampaignRenderer, CampaignStore, StoreError};
use crate::domain::campaign::CampaignId;
use crate::domain::rendered_campaign::RenderedCampaign;
use crate::repository::PgCampaignStore;

#[derive(Clone)]
pub struct PgCampaignRenderer {
    campaigns: PgCampaignStore,
}

impl PgCampaignRenderer {
    pub fn new(db_pool: PgPool) -> PgCampaignRenderer {
        PgCampaignRenderer {
            campaigns: PgCampaignStore::new(db_pool),
        }
    }
}

#[async_trait]
impl CampaignRenderer for PgCampaignRenderer {
    #[tracing::instrument(name = "Render a campaign", skip(self))]
    async fn render_campaign(&self, id: CampaignId) -> Result<RenderedCampaign, StoreError> {
        let campaign = self
            .campaigns
            .load_campaign(id)
            .await?
            .ok_or(StoreError::MissingCampaign(id))?;

        Ok(RenderedCampaign::render(&campaign))
    }
}

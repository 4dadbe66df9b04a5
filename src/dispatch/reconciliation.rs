use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::dispatch::store::{CampaignStore, StoreError};
use crate::domain::campaign::CampaignId;
use crate::domain::campaign_status::CampaignStatus;

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub failed_campaign_ids: Vec<CampaignId>,
}

/// Forces campaigns stuck in `Sending` for longer than `stuck_after` to `Failed`.
///
/// Only campaigns still in `Sending` are touched, so a dispatch that finalizes
/// concurrently keeps its own result.
pub struct Reconciler {
    store: Arc<dyn CampaignStore>,
    stuck_after: Duration,
}

impl Reconciler {
    pub fn new(store: Arc<dyn CampaignStore>, stuck_after: Duration) -> Reconciler {
        Reconciler { store, stuck_after }
    }

    #[tracing::instrument(
        name = "Reconcile campaigns stuck in sending",
        skip(self),
        fields(stuck_after_seconds = self.stuck_after.as_secs())
    )]
    pub async fn reconcile(&self) -> Result<ReconciliationReport, StoreError> {
        let now = Utc::now();
        let stuck_after = chrono::Duration::from_std(self.stuck_after)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        let cutoff = now
            .checked_sub_signed(stuck_after)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

        let mut report = ReconciliationReport::default();

        for campaign_id in self.store.list_stuck_campaigns(cutoff).await? {
            let failed = self
                .store
                .finalize_campaign(campaign_id, CampaignStatus::Failed, 0, now)
                .await?;

            if failed {
                tracing::warn!(%campaign_id, "Campaign was stuck in sending, marked as failed");
                report.failed_campaign_ids.push(campaign_id);
            }
        }

        Ok(report)
    }
}

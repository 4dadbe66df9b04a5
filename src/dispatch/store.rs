use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::campaign::{Campaign, CampaignId};
use crate::domain::campaign_status::CampaignStatus;
use crate::domain::rendered_campaign::RenderedCampaign;
use crate::domain::subscriber_email::SubscriberEmail;

#[derive(thiserror::Error)]
pub enum StoreError {
    #[error("Failed to execute a query against the database.")]
    Database(#[from] sqlx::Error),
    #[error("Campaign {0} does not exist.")]
    MissingCampaign(CampaignId),
    #[error("Stored data is not valid: {0}")]
    Corrupted(String),
    #[error("A campaign cannot move from {from} to {to}.")]
    IllegalTransition {
        from: CampaignStatus,
        to: CampaignStatus,
    },
}

/// Rejects any status write the campaign lifecycle does not allow.
pub fn ensure_transition(from: CampaignStatus, to: CampaignStatus) -> Result<(), StoreError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(StoreError::IllegalTransition { from, to })
    }
}

impl std::fmt::Debug for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)?;
        if let StoreError::Database(err) = self {
            write!(f, "\nCaused by:\n\t{}", err)?;
        }
        Ok(())
    }
}

/// Durable record of campaigns. Status writes are guarded so that a claimed
/// campaign has a single writer until it reaches a terminal status.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn load_campaign(&self, id: CampaignId) -> Result<Option<Campaign>, StoreError>;

    /// Moves `id` from `expected` to `next` only if it is currently `expected`.
    /// Entering `Sending` also stamps `sending_started_at`. Pairs the lifecycle
    /// does not allow fail with [`StoreError::IllegalTransition`].
    async fn compare_and_set_status(
        &self,
        id: CampaignId,
        expected: CampaignStatus,
        next: CampaignStatus,
    ) -> Result<bool, StoreError>;

    /// Writes the terminal status, `sent_count` and `sent_at` in one update.
    /// Returns `false` when the campaign was no longer `Sending`; a non-terminal
    /// `status` fails with [`StoreError::IllegalTransition`].
    async fn finalize_campaign(
        &self,
        id: CampaignId,
        status: CampaignStatus,
        sent_count: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Campaigns that entered `Sending` before `started_before`.
    async fn list_stuck_campaigns(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<CampaignId>, StoreError>;

    /// Deletes the campaign only while it is still a draft.
    async fn delete_draft(&self, id: CampaignId) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait RosterProvider: Send + Sync {
    async fn get_active_subscribers(&self) -> Result<Vec<SubscriberEmail>, StoreError>;
}

#[async_trait]
pub trait CampaignRenderer: Send + Sync {
    async fn render_campaign(&self, id: CampaignId) -> Result<RenderedCampaign, StoreError>;
}

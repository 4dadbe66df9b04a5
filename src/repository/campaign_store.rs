use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::dispatch::store::{ensure_transition, CampaignStore, StoreError};
use crate::domain::campaign::{Campaign, CampaignId};
use crate::domain::campaign_status::CampaignStatus;

#[derive(Clone)]
pub struct PgCampaignStore {
    db_pool: PgPool,
}

impl PgCampaignStore {
    pub fn new(db_pool: PgPool) -> PgCampaignStore {
        PgCampaignStore { db_pool }
    }
}

fn campaign_from_row(row: PgRow) -> Result<Campaign, StoreError> {
    let status = CampaignStatus::parse(row.try_get("status")?).map_err(StoreError::Corrupted)?;

    Ok(Campaign {
        id: row.try_get("id")?,
        subject: row.try_get("subject")?,
        content: row.try_get("content")?,
        preview_text: row.try_get("preview_text")?,
        status,
        sent_count: row.try_get("sent_count")?,
        sent_at: row.try_get("sent_at")?,
        sending_started_at: row.try_get("sending_started_at")?,
    })
}

#[async_trait]
impl CampaignStore for PgCampaignStore {
    #[tracing::instrument(name = "Load a campaign from the database", skip(self))]
    async fn load_campaign(&self, id: CampaignId) -> Result<Option<Campaign>, StoreError> {
        sqlx::query(
            r#"
            SELECT id, subject, content, preview_text, status, sent_count, sent_at, sending_started_at
            FROM newsletter_campaigns
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?
        .map(campaign_from_row)
        .transpose()
    }

    #[tracing::instrument(
        name = "Compare and set the status of a campaign",
        skip(self),
        fields(expected = %expected, next = %next)
    )]
    async fn compare_and_set_status(
        &self,
        id: CampaignId,
        expected: CampaignStatus,
        next: CampaignStatus,
    ) -> Result<bool, StoreError> {
        ensure_transition(expected, next)?;

        let result = sqlx::query(
            r#"
            UPDATE newsletter_campaigns
            SET status = $3,
                sending_started_at = CASE WHEN $3 = 'SENDING' THEN now() ELSE sending_started_at END
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(expected.as_ref())
        .bind(next.as_ref())
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(name = "Finalize a campaign", skip(self), fields(status = %status))]
    async fn finalize_campaign(
        &self,
        id: CampaignId,
        status: CampaignStatus,
        sent_count: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        ensure_transition(CampaignStatus::Sending, status)?;

        let result = sqlx::query(
            r#"
            UPDATE newsletter_campaigns
            SET status = $2, sent_count = GREATEST(sent_count, $3), sent_at = $4
            WHERE id = $1 AND status = 'SENDING'
            "#,
        )
        .bind(id)
        .bind(status.as_ref())
        .bind(sent_count)
        .bind(sent_at)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(name = "List campaigns stuck in sending", skip(self))]
    async fn list_stuck_campaigns(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<CampaignId>, StoreError> {
        let ids: Vec<CampaignId> = sqlx::query(
            r#"
            SELECT id
            FROM newsletter_campaigns
            WHERE status = 'SENDING' AND sending_started_at < $1
            "#,
        )
        .bind(started_before)
        .map(|row: PgRow| row.get("id"))
        .fetch_all(&self.db_pool)
        .await?;

        Ok(ids)
    }

    #[tracing::instrument(name = "Delete a draft campaign", skip(self))]
    async fn delete_draft(&self, id: CampaignId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM newsletter_campaigns
            WHERE id = $1 AND status = 'DRAFT'
            "#,
        )
        .bind(id)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

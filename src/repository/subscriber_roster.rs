use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::dispatch::store::{RosterProvider, StoreError};
use crate::domain::subscriber_email::SubscriberEmail;

#[derive(Clone)]
pub struct PgSubscriberRoster {
    db_pool: PgPool,
}

impl PgSubscriberRoster {
    pub fn new(db_pool: PgPool) -> PgSubscriberRoster {
        PgSubscriberRoster { db_pool }
    }
}

#[async_trait]
impl RosterProvider for PgSubscriberRoster {
    #[tracing::instrument(name = "Snapshot the active subscribers", skip(self))]
    async fn get_active_subscribers(&self) -> Result<Vec<SubscriberEmail>, StoreError> {
        let emails: Vec<String> = sqlx::query(
            r#"
            SELECT DISTINCT email
            FROM subscribers
            WHERE is_active
            "#,
        )
        .map(|row: PgRow| row.get("email"))
        .fetch_all(&self.db_pool)
        .await?;

        // A malformed stored address must not block everybody else.
        Ok(emails
            .into_iter()
            .filter_map(|email| match SubscriberEmail::parse(email) {
                Ok(email) => Some(email),
                Err(err) => {
                    tracing::warn!("Skipping an active subscriber: {}", err);
                    None
                }
            })
            .collect())
    }
}

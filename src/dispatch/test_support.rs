//! In-memory collaborators for exercising the engine without Postgres or a mail API.
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::dispatch::store::{
    ensure_transition, CampaignRenderer, CampaignStore, RosterProvider, StoreError,
};
use crate::dispatch::transport::{MailTransport, SendError, SendErrorKind};
use crate::domain::campaign::{Campaign, CampaignId};
use crate::domain::campaign_status::CampaignStatus;
use crate::domain::rendered_campaign::RenderedCampaign;
use crate::domain::subscriber_email::SubscriberEmail;

#[derive(Default)]
pub struct InMemoryCampaignStore {
    campaigns: Mutex<HashMap<CampaignId, Campaign>>,
}

impl InMemoryCampaignStore {
    pub fn insert(&self, campaign: Campaign) {
        self.campaigns.lock().unwrap().insert(campaign.id, campaign);
    }

    pub fn get(&self, id: CampaignId) -> Campaign {
        self.campaigns.lock().unwrap()[&id].clone()
    }

    pub fn set_status(&self, id: CampaignId, status: CampaignStatus) {
        self.campaigns.lock().unwrap().get_mut(&id).unwrap().status = status;
    }

    pub fn set_sending_started_at(&self, id: CampaignId, at: DateTime<Utc>) {
        self.campaigns
            .lock()
            .unwrap()
            .get_mut(&id)
            .unwrap()
            .sending_started_at = Some(at);
    }
}

#[async_trait]
impl CampaignStore for InMemoryCampaignStore {
    async fn load_campaign(&self, id: CampaignId) -> Result<Option<Campaign>, StoreError> {
        Ok(self.campaigns.lock().unwrap().get(&id).cloned())
    }

    async fn compare_and_set_status(
        &self,
        id: CampaignId,
        expected: CampaignStatus,
        next: CampaignStatus,
    ) -> Result<bool, StoreError> {
        ensure_transition(expected, next)?;

        let mut campaigns = self.campaigns.lock().unwrap();
        match campaigns.get_mut(&id) {
            Some(campaign) if campaign.status == expected => {
                campaign.status = next;
                if next == CampaignStatus::Sending {
                    campaign.sending_started_at = Some(Utc::now());
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finalize_campaign(
        &self,
        id: CampaignId,
        status: CampaignStatus,
        sent_count: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        ensure_transition(CampaignStatus::Sending, status)?;

        let mut campaigns = self.campaigns.lock().unwrap();
        match campaigns.get_mut(&id) {
            Some(campaign) if campaign.status == CampaignStatus::Sending => {
                campaign.status = status;
                campaign.sent_count = sent_count;
                campaign.sent_at = Some(sent_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_stuck_campaigns(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<CampaignId>, StoreError> {
        Ok(self
            .campaigns
            .lock()
            .unwrap()
            .values()
            .filter(|campaign| campaign.status == CampaignStatus::Sending)
            .filter(|campaign| matches!(campaign.sending_started_at, Some(at) if at < started_before))
            .map(|campaign| campaign.id)
            .collect())
    }

    async fn delete_draft(&self, id: CampaignId) -> Result<bool, StoreError> {
        let mut campaigns = self.campaigns.lock().unwrap();
        match campaigns.get(&id) {
            Some(campaign) if campaign.status.is_draft() => {
                campaigns.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

pub struct StaticRoster {
    emails: Option<Vec<SubscriberEmail>>,
}

impl StaticRoster {
    pub fn new(emails: &[&str]) -> StaticRoster {
        StaticRoster {
            emails: Some(
                emails
                    .iter()
                    .map(|email| SubscriberEmail::parse(email.to_string()).unwrap())
                    .collect(),
            ),
        }
    }

    pub fn broken() -> StaticRoster {
        StaticRoster { emails: None }
    }
}

#[async_trait]
impl RosterProvider for StaticRoster {
    async fn get_active_subscribers(&self) -> Result<Vec<SubscriberEmail>, StoreError> {
        self.emails
            .clone()
            .ok_or_else(|| StoreError::Corrupted("roster is unavailable".into()))
    }
}

pub struct StoreRenderer {
    store: Arc<InMemoryCampaignStore>,
}

impl StoreRenderer {
    pub fn new(store: Arc<InMemoryCampaignStore>) -> StoreRenderer {
        StoreRenderer { store }
    }
}

#[async_trait]
impl CampaignRenderer for StoreRenderer {
    async fn render_campaign(&self, id: CampaignId) -> Result<RenderedCampaign, StoreError> {
        let campaign = self
            .store
            .load_campaign(id)
            .await?
            .ok_or(StoreError::MissingCampaign(id))?;

        Ok(RenderedCampaign::render(&campaign))
    }
}

pub struct BrokenRenderer;

#[async_trait]
impl CampaignRenderer for BrokenRenderer {
    async fn render_campaign(&self, _id: CampaignId) -> Result<RenderedCampaign, StoreError> {
        Err(StoreError::Corrupted("template is unavailable".into()))
    }
}

/// Delegates to an in-memory store but fails the first `failures` finalize calls.
pub struct FlakyFinalizeStore {
    inner: Arc<InMemoryCampaignStore>,
    failures: AtomicUsize,
    finalize_attempts: AtomicUsize,
}

impl FlakyFinalizeStore {
    pub fn new(inner: Arc<InMemoryCampaignStore>, failures: usize) -> FlakyFinalizeStore {
        FlakyFinalizeStore {
            inner,
            failures: AtomicUsize::new(failures),
            finalize_attempts: AtomicUsize::new(0),
        }
    }

    pub fn finalize_attempts(&self) -> usize {
        self.finalize_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CampaignStore for FlakyFinalizeStore {
    async fn load_campaign(&self, id: CampaignId) -> Result<Option<Campaign>, StoreError> {
        self.inner.load_campaign(id).await
    }

    async fn compare_and_set_status(
        &self,
        id: CampaignId,
        expected: CampaignStatus,
        next: CampaignStatus,
    ) -> Result<bool, StoreError> {
        self.inner.compare_and_set_status(id, expected, next).await
    }

    async fn finalize_campaign(
        &self,
        id: CampaignId,
        status: CampaignStatus,
        sent_count: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.finalize_attempts.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }

        self.inner
            .finalize_campaign(id, status, sent_count, sent_at)
            .await
    }

    async fn list_stuck_campaigns(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<CampaignId>, StoreError> {
        self.inner.list_stuck_campaigns(started_before).await
    }

    async fn delete_draft(&self, id: CampaignId) -> Result<bool, StoreError> {
        self.inner.delete_draft(id).await
    }
}

enum Script {
    Fail(SendErrorKind),
    Hang,
}

/// Succeeds for every recipient unless told otherwise.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: HashMap<String, Script>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn failing(mut self, email: &str, kind: SendErrorKind) -> Self {
        self.scripts.insert(email.to_string(), Script::Fail(kind));
        self
    }

    pub fn hanging(mut self, email: &str) -> Self {
        self.scripts.insert(email.to_string(), Script::Hang);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailTransport for ScriptedTransport {
    async fn send(
        &self,
        recipient: &SubscriberEmail,
        _subject: &str,
        _html: &str,
        _text: &str,
    ) -> Result<(), SendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = match self.scripts.get(recipient.as_ref()) {
            None => Ok(()),
            Some(Script::Fail(SendErrorKind::Transient)) => Err(SendError::transient("503")),
            Some(Script::Fail(SendErrorKind::Permanent)) => Err(SendError::permanent("400")),
            Some(Script::Hang) => std::future::pending().await,
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

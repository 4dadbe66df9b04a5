use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::dispatch::aggregator::{DispatchSummary, FailureReason, ResultAggregator};
use crate::dispatch::store::{CampaignRenderer, CampaignStore, RosterProvider, StoreError};
use crate::dispatch::transport::{MailTransport, SendOutcome};
use crate::domain::campaign::CampaignId;
use crate::domain::campaign_status::CampaignStatus;
use crate::domain::rendered_campaign::RenderedCampaign;
use crate::domain::subscriber_email::SubscriberEmail;

const FINALIZE_ATTEMPTS: u32 = 3;
const FINALIZE_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    /// Number of send workers of a single dispatch.
    pub max_concurrency: usize,
    /// How long a dispatch waits for outcomes before giving up on the rest.
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub status: CampaignStatus,
    pub success_count: usize,
    pub failure_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

#[derive(thiserror::Error)]
pub enum DispatchError {
    #[error("Campaign {0} does not exist.")]
    CampaignNotFound(CampaignId),
    #[error("Campaign {0} has already been dispatched or is being dispatched.")]
    AlreadyDispatchedOrInProgress(CampaignId),
    #[error("Campaign {0} was finalized by someone else while it was being dispatched.")]
    ClaimLost(CampaignId),
    #[error("Failed to read or write campaign dispatch state.")]
    Store(#[from] StoreError),
}

impl std::fmt::Debug for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)?;
        if let DispatchError::Store(err) = self {
            write!(f, "\nCaused by:\n\t{:?}", err)?;
        }
        Ok(())
    }
}

/// Drives a campaign from `Draft` to a terminal status and sends it to the
/// active roster on the way.
pub struct Orchestrator {
    store: Arc<dyn CampaignStore>,
    roster: Arc<dyn RosterProvider>,
    renderer: Arc<dyn CampaignRenderer>,
    transport: Arc<dyn MailTransport>,
    settings: DispatchSettings,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        roster: Arc<dyn RosterProvider>,
        renderer: Arc<dyn CampaignRenderer>,
        transport: Arc<dyn MailTransport>,
        settings: DispatchSettings,
    ) -> Orchestrator {
        Orchestrator {
            store,
            roster,
            renderer,
            transport,
            settings: DispatchSettings {
                max_concurrency: settings.max_concurrency.max(1),
                ..settings
            },
        }
    }

    pub fn store(&self) -> Arc<dyn CampaignStore> {
        Arc::clone(&self.store)
    }

    #[tracing::instrument(name = "Dispatch a newsletter campaign", skip(self))]
    pub async fn dispatch(&self, campaign_id: CampaignId) -> Result<DispatchReport, DispatchError> {
        let campaign = self
            .store
            .load_campaign(campaign_id)
            .await?
            .ok_or(DispatchError::CampaignNotFound(campaign_id))?;

        if !campaign.status.is_draft() {
            tracing::info!(status = %campaign.status, "Campaign is not a draft, refusing to dispatch");
            return Err(DispatchError::AlreadyDispatchedOrInProgress(campaign_id));
        }

        let claimed = self
            .store
            .compare_and_set_status(campaign_id, CampaignStatus::Draft, CampaignStatus::Sending)
            .await?;

        if !claimed {
            tracing::info!("Another dispatch claimed the campaign first");
            return Err(DispatchError::AlreadyDispatchedOrInProgress(campaign_id));
        }

        let summary = match self.send_to_roster(campaign_id).await {
            Ok(summary) => summary,
            Err(err) => {
                self.abandon(campaign_id).await;
                return Err(err);
            }
        };

        self.finalize(campaign_id, summary).await
    }

    async fn send_to_roster(
        &self,
        campaign_id: CampaignId,
    ) -> Result<DispatchSummary, DispatchError> {
        let roster = dedup(self.roster.get_active_subscribers().await?);

        tracing::info!(roster_size = roster.len(), "Campaign claimed");

        if roster.is_empty() {
            tracing::warn!("No active subscribers, the campaign is marked as failed");
            return Ok(ResultAggregator::new(0).summary());
        }

        let rendered = Arc::new(self.renderer.render_campaign(campaign_id).await?);

        Ok(self.fan_out(rendered, roster).await)
    }

    /// Persists the outcome of the sends. Retries keep the same status and
    /// count; when every attempt fails the campaign stays `Sending` for
    /// reconciliation.
    async fn finalize(
        &self,
        campaign_id: CampaignId,
        summary: DispatchSummary,
    ) -> Result<DispatchReport, DispatchError> {
        let status = summary.terminal_status();
        let sent_count = i64::try_from(summary.success_count).unwrap_or_else(|_| {
            tracing::error!(
                success_count = summary.success_count,
                "Delivered count does not fit in the store, clamping it"
            );
            i64::MAX
        });
        let sent_at = Utc::now();
        let mut attempt = 1;

        let finalized = loop {
            match self
                .store
                .finalize_campaign(campaign_id, status, sent_count, sent_at)
                .await
            {
                Ok(finalized) => break finalized,
                Err(err) if attempt < FINALIZE_ATTEMPTS => {
                    tracing::warn!(
                        attempt,
                        %status,
                        sent_count,
                        "Failed to finalize the campaign, retrying: {:?}",
                        err
                    );
                    tokio::time::sleep(FINALIZE_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(
                        %status,
                        sent_count,
                        "Failed to finalize the campaign, it stays in sending until reconciled: {:?}",
                        err
                    );
                    return Err(err.into());
                }
            }
        };

        if !finalized {
            tracing::error!(
                %status,
                success_count = summary.success_count,
                "Campaign left the sending state before the dispatch could finalize it"
            );
            return Err(DispatchError::ClaimLost(campaign_id));
        }

        tracing::info!(
            %status,
            success_count = summary.success_count,
            failure_count = summary.failure_count,
            transient_failures = summary.transient_failures,
            permanent_failures = summary.permanent_failures,
            unreported = summary.unreported,
            "Campaign dispatch finished"
        );

        Ok(DispatchReport {
            status,
            success_count: summary.success_count,
            failure_count: summary.failure_count,
            reason: summary.failure_reason(),
        })
    }

    async fn fan_out(
        &self,
        rendered: Arc<RenderedCampaign>,
        roster: Vec<SubscriberEmail>,
    ) -> DispatchSummary {
        let aggregator = Arc::new(ResultAggregator::new(roster.len()));
        let workers = self.settings.max_concurrency.min(roster.len());
        let queue = Arc::new(Mutex::new(VecDeque::from(roster)));
        let mut join_set = JoinSet::new();

        for _ in 0..workers {
            join_set.spawn(
                send_worker(
                    Arc::clone(&queue),
                    Arc::clone(&self.transport),
                    Arc::clone(&rendered),
                    Arc::clone(&aggregator),
                )
                .in_current_span(),
            );
        }

        let completed =
            tokio::time::timeout(self.settings.timeout, aggregator.wait_until_complete())
                .await
                .is_ok();

        if !completed {
            tracing::warn!(
                timeout_seconds = self.settings.timeout.as_secs(),
                "Dispatch timed out, abandoning outstanding sends"
            );
            queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
            join_set.abort_all();
        }

        // No worker can record once the set is drained.
        while let Some(joined) = join_set.join_next().await {
            if let Err(err) = joined {
                if err.is_panic() {
                    tracing::error!("A send worker panicked: {}", err);
                }
            }
        }

        aggregator.summary()
    }

    /// Best effort for failures before any email went out: the campaign must
    /// not linger in `Sending`. If this write fails too, reconciliation picks it up.
    async fn abandon(&self, campaign_id: CampaignId) {
        match self
            .store
            .finalize_campaign(campaign_id, CampaignStatus::Failed, 0, Utc::now())
            .await
        {
            Ok(true) => tracing::warn!("Dispatch aborted, campaign marked as failed"),
            Ok(false) => {}
            Err(err) => tracing::error!(
                "Dispatch aborted and the campaign could not be marked as failed: {:?}",
                err
            ),
        }
    }
}

async fn send_worker(
    queue: Arc<Mutex<VecDeque<SubscriberEmail>>>,
    transport: Arc<dyn MailTransport>,
    rendered: Arc<RenderedCampaign>,
    aggregator: Arc<ResultAggregator>,
) {
    loop {
        let next = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some(recipient) = next else {
            return;
        };

        let outcome = match transport
            .send(&recipient, &rendered.subject, &rendered.html, &rendered.text)
            .await
        {
            Ok(()) => SendOutcome::delivered(recipient),
            Err(err) => {
                tracing::warn!(
                    recipient = %recipient,
                    error_kind = ?err.kind,
                    "Failed to send campaign email: {}",
                    err.message
                );
                SendOutcome::failed(recipient, err.kind)
            }
        };

        aggregator.record(outcome);
    }
}

fn dedup(roster: Vec<SubscriberEmail>) -> Vec<SubscriberEmail> {
    let mut seen = HashSet::with_capacity(roster.len());

    roster
        .into_iter()
        .filter(|email| seen.insert(email.as_ref().to_lowercase()))
        .collect()
}

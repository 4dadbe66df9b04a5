use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::dispatch::transport::{SendErrorKind, SendOutcome};
use crate::domain::campaign_status::CampaignStatus;

#[derive(Debug, Default)]
struct Tally {
    recorded: usize,
    delivered: usize,
    transient_failures: usize,
    permanent_failures: usize,
}

/// Collects the outcome of every send of one dispatch.
///
/// Workers call [`ResultAggregator::record`] concurrently; the orchestrator
/// parks on [`ResultAggregator::wait_until_complete`] until every roster member
/// has reported and only then reads the [`DispatchSummary`].
#[derive(Debug)]
pub struct ResultAggregator {
    expected: usize,
    tally: Mutex<Tally>,
    complete: Notify,
}

/// Why a dispatch ended up `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum FailureReason {
    NoRecipients,
    AllSendsFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub roster_size: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub transient_failures: usize,
    pub permanent_failures: usize,
    /// Sends that never reported before the dispatch timed out.
    pub unreported: usize,
}

impl ResultAggregator {
    pub fn new(expected: usize) -> ResultAggregator {
        ResultAggregator {
            expected,
            tally: Mutex::new(Tally::default()),
            complete: Notify::new(),
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn record(&self, outcome: SendOutcome) {
        let mut tally = self.lock();

        if tally.recorded == self.expected {
            tracing::warn!(
                recipient = %outcome.recipient,
                "Dropping an outcome recorded after every recipient had reported"
            );
            return;
        }

        tally.recorded += 1;
        match outcome.error_kind {
            None => tally.delivered += 1,
            Some(SendErrorKind::Transient) => tally.transient_failures += 1,
            Some(SendErrorKind::Permanent) => tally.permanent_failures += 1,
        }

        if tally.recorded == self.expected {
            // notify_one keeps a permit if the orchestrator is not parked yet.
            self.complete.notify_one();
        }
    }

    pub fn is_complete(&self) -> bool {
        self.lock().recorded == self.expected
    }

    pub async fn wait_until_complete(&self) {
        while !self.is_complete() {
            self.complete.notified().await;
        }
    }

    /// Counts outcomes so far; recipients that have not reported yet count as failures.
    pub fn summary(&self) -> DispatchSummary {
        let tally = self.lock();
        let unreported = self.expected - tally.recorded;

        DispatchSummary {
            roster_size: self.expected,
            success_count: tally.delivered,
            failure_count: tally.transient_failures + tally.permanent_failures + unreported,
            transient_failures: tally.transient_failures,
            permanent_failures: tally.permanent_failures,
            unreported,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tally> {
        // The tally holds plain counters, a panic mid-update cannot leave it torn.
        self.tally.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DispatchSummary {
    /// A campaign counts as sent as soon as one recipient got it.
    pub fn terminal_status(&self) -> CampaignStatus {
        if self.failure_count == self.roster_size {
            CampaignStatus::Failed
        } else {
            CampaignStatus::Sent
        }
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        if self.roster_size == 0 {
            Some(FailureReason::NoRecipients)
        } else if self.failure_count == self.roster_size {
            Some(FailureReason::AllSendsFailed)
        } else {
            None
        }
    }
}

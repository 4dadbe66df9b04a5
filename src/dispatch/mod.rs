pub mod aggregator;
pub mod orchestrator;
pub mod reconciliation;
pub mod store;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use aggregator::{DispatchSummary, FailureReason, ResultAggregator};
pub use orchestrator::{DispatchError, DispatchReport, DispatchSettings, Orchestrator};
pub use reconciliation::{ReconciliationReport, Reconciler};
pub use store::{ensure_transition, CampaignRenderer, CampaignStore, RosterProvider, StoreError};
pub use transport::{MailTransport, SendError, SendErrorKind, SendOutcome};

mod campaigns;
mod health_check;
mod reconciliation;

pub use campaigns::{handle_delete_draft_campaign, handle_dispatch_campaign};
pub use health_check::health_check;
pub use reconciliation::handle_reconcile_campaigns;

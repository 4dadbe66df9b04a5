mod campaign_renderer;
mod campaign_store;
mod subscriber_roster;

pub use campaign_renderer::PgCampaignRenderer;
pub use campaign_store::PgCampaignStore;
pub use subscriber_roster::PgSubscriberRoster;

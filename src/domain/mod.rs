pub mod campaign;
pub mod campaign_status;
pub mod rendered_campaign;
pub mod subscriber_email;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::campaign_status::CampaignStatus;

pub type CampaignId = Uuid;

#[derive(Debug, Clone)]
pub struct Campaign {
    pub id: CampaignId,
    pub subject: String,
    pub content: String,
    pub preview_text: Option<String>,
    pub status: CampaignStatus,
    /// Only authoritative once `status` is terminal.
    pub sent_count: i64,
    pub sent_at: Option<DateTime<Utc>>,
    pub sending_started_at: Option<DateTime<Utc>>,
}

impl Campaign {
    pub fn new_draft(subject: &str, content: &str, preview_text: Option<&str>) -> Campaign {
        Campaign {
            id: Uuid::new_v4(),
            subject: subject.to_string(),
            content: content.to_string(),
            preview_text: preview_text.map(String::from),
            status: CampaignStatus::Draft,
            sent_count: 0,
            sent_at: None,
            sending_started_at: None,
        }
    }
}

use std::fmt;

/// Lifecycle of a campaign: `Draft -> Sending -> {Sent, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Draft,
    Sending,
    Sent,
    Failed,
}

impl CampaignStatus {
    pub fn is_draft(&self) -> bool {
        matches!(self, CampaignStatus::Draft)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Sent | CampaignStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: CampaignStatus) -> bool {
        matches!(
            (self, next),
            (CampaignStatus::Draft, CampaignStatus::Sending)
                | (CampaignStatus::Sending, CampaignStatus::Sent)
                | (CampaignStatus::Sending, CampaignStatus::Failed)
        )
    }

    pub fn parse(status: String) -> Result<CampaignStatus, String> {
        match status.as_str() {
            "DRAFT" => Ok(CampaignStatus::Draft),
            "SENDING" => Ok(CampaignStatus::Sending),
            "SENT" => Ok(CampaignStatus::Sent),
            "FAILED" => Ok(CampaignStatus::Failed),
            _ => Err(format!("{} is not a valid campaign status", status)),
        }
    }
}

impl AsRef<str> for CampaignStatus {
    fn as_ref(&self) -> &str {
        match self {
            CampaignStatus::Draft => "DRAFT",
            CampaignStatus::Sending => "SENDING",
            CampaignStatus::Sent => "SENT",
            CampaignStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

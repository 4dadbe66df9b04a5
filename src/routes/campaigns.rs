use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use uuid::Uuid;

use crate::dispatch::{DispatchError, Orchestrator, StoreError};

#[tracing::instrument(
    name = "Dispatching a newsletter campaign to all active subscribers",
    skip(orchestrator),
    fields(campaign_id = %campaign_id)
)]
pub async fn handle_dispatch_campaign(
    campaign_id: web::Path<Uuid>,
    orchestrator: web::Data<Orchestrator>,
) -> Result<HttpResponse, DispatchError> {
    let report = orchestrator.dispatch(campaign_id.into_inner()).await?;

    Ok(HttpResponse::Ok().json(report))
}

#[tracing::instrument(
    name = "Deleting a draft campaign",
    skip(orchestrator),
    fields(campaign_id = %campaign_id)
)]
pub async fn handle_delete_draft_campaign(
    campaign_id: web::Path<Uuid>,
    orchestrator: web::Data<Orchestrator>,
) -> Result<HttpResponse, DispatchError> {
    let campaign_id = campaign_id.into_inner();
    let store = orchestrator.store();

    let campaign = store
        .load_campaign(campaign_id)
        .await?
        .ok_or(DispatchError::CampaignNotFound(campaign_id))?;

    if !campaign.status.is_draft() || !store.delete_draft(campaign_id).await? {
        return Err(DispatchError::AlreadyDispatchedOrInProgress(campaign_id));
    }

    Ok(HttpResponse::NoContent().finish())
}

impl ResponseError for DispatchError {
    fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::CampaignNotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::AlreadyDispatchedOrInProgress(_) => StatusCode::CONFLICT,
            DispatchError::ClaimLost(_) => StatusCode::CONFLICT,
            DispatchError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ResponseError for StoreError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

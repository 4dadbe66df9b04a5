use actix_web::{web, HttpResponse};

use crate::dispatch::{Reconciler, StoreError};

/// Manual re-check for campaigns a crashed or interrupted dispatch left in `SENDING`.
#[tracing::instrument(name = "Reconciling stuck campaigns", skip(reconciler))]
pub async fn handle_reconcile_campaigns(
    reconciler: web::Data<Reconciler>,
) -> Result<HttpResponse, StoreError> {
    let report = reconciler.reconcile().await?;

    Ok(HttpResponse::Ok().json(report))
}

use actix_web::{HttpResponse, Responder};

/// Endpoint used by clients to know if the server is working
#[tracing::instrument(name = "Health Check handler")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().finish()
}

use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Pool, Postgres};
use std::net::TcpListener;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

use crate::config::{DatabaseSettings, Settings};
use crate::dispatch::{Orchestrator, Reconciler};
use crate::email_client::EmailClient;
use crate::repository::{PgCampaignRenderer, PgCampaignStore, PgSubscriberRoster};
use crate::routes::{
    handle_delete_draft_campaign, handle_dispatch_campaign, handle_reconcile_campaigns,
    health_check,
};

pub struct Application {
    pub port: u16,
    pub server: Server,
}

#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    #[error("Sender email is not valid: {0}")]
    InvalidSender(String),
    #[error("Failed to build the email client.")]
    EmailClient(#[from] reqwest::Error),
    #[error("Failed to bind the address.")]
    Io(#[from] std::io::Error),
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, StartupError> {
        let db_pool = get_connection_db_pool(&config.database);
        let sender_email = config
            .get_email_client_sender()
            .map_err(StartupError::InvalidSender)?;
        let email_client = EmailClient::new(
            config.get_email_client_base_url(),
            sender_email,
            config.get_email_client_api(),
            Some(config.get_email_client_timeout()),
        )?;

        let store = Arc::new(PgCampaignStore::new(db_pool.clone()));
        let orchestrator = Orchestrator::new(
            store.clone(),
            Arc::new(PgSubscriberRoster::new(db_pool.clone())),
            Arc::new(PgCampaignRenderer::new(db_pool)),
            Arc::new(email_client),
            config.get_dispatch_settings(),
        );
        let reconciler = Reconciler::new(store, config.get_stuck_after());

        let listener = TcpListener::bind(config.get_address())?;
        let port = listener.local_addr()?.port();
        let server = run(listener, orchestrator, reconciler)?;

        Ok(Self { port, server })
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stop(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

pub fn run(
    listener: TcpListener,
    orchestrator: Orchestrator,
    reconciler: Reconciler,
) -> Result<Server, std::io::Error> {
    let orchestrator = web::Data::new(orchestrator);
    let reconciler = web::Data::new(reconciler);

    let server = HttpServer::new(move || {
        // App is where your application logic lives: routing, middlewares, request handler, etc
        App::new()
            // 'wrap' method adds a middleware to the App. This specific middleware provide incoming
            // request logger
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .route(
                "/campaigns/{campaign_id}/dispatch",
                web::post().to(handle_dispatch_campaign),
            )
            .route(
                "/campaigns/{campaign_id}",
                web::delete().to(handle_delete_draft_campaign),
            )
            .route(
                "/admin/campaigns/reconcile",
                web::post().to(handle_reconcile_campaigns),
            )
            .app_data(orchestrator.clone())
            .app_data(reconciler.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}

pub fn get_connection_db_pool(config: &DatabaseSettings) -> Pool<Postgres> {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect_lazy_with(config.get_db_options())
}

pub async fn run_migrations(db_pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(db_pool).await
}

use chrono::Utc;
use reqwest::Response;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use std::sync::LazyLock;
use uuid::Uuid;
use wiremock::MockServer;

use campaign_dispatch::{
    config::{get_configuration, DatabaseSettings, Settings},
    dispatch::CampaignStore,
    domain::{campaign::Campaign, campaign_status::CampaignStatus},
    repository::PgCampaignStore,
    startup::{get_connection_db_pool, run_migrations, Application},
    telemetry::{get_subscriber, init_subscriber},
};

// Logs are only printed when TEST_LOG is set, e.g. `TEST_LOG=true cargo test | bunyan`
static TRACING: LazyLock<()> = LazyLock::new(|| {
    let name = String::from("test");
    let env_filter = String::from("debug");

    let _ = if std::env::var("TEST_LOG").is_ok() {
        init_subscriber(get_subscriber(name, env_filter, std::io::stdout))
    } else {
        init_subscriber(get_subscriber(name, env_filter, std::io::sink))
    };
});

pub struct TestApp {
    pub config: Settings,
    pub address: String,
    pub db_pool: PgPool,
    pub email_server: MockServer,
}

impl TestApp {
    pub async fn spawn_app() -> TestApp {
        LazyLock::force(&TRACING);

        let mut config = get_configuration().expect("Missing configuration file.");
        let db_test_name = format!("db_{}", Uuid::new_v4().to_string().replace('-', "_"));
        let email_server = MockServer::start().await;

        // We are using port 0 as way to define a different port per each test. Port 0 is a special case that operating systems
        // take into account: when port is 0, the OS will search for the first available port
        config.set_app_port(0);
        config.set_email_client_base_url(email_server.uri());
        config.dispatch.max_concurrency = 4;

        let db_pool = configure_db(&mut config.database, db_test_name).await;

        let application = Application::build(config.clone())
            .await
            .expect("Failed to build application.");

        let address = format!("http://127.0.0.1:{}", application.get_port());

        tokio::spawn(application.run_until_stop());

        TestApp {
            address,
            config,
            db_pool,
            email_server,
        }
    }

    pub async fn insert_campaign(&self, status: CampaignStatus) -> Uuid {
        let campaign = Campaign::new_draft(
            "New courses this spring",
            "<h1>Spring</h1><p>Three new Rust courses.</p>",
            Some("Three new courses"),
        );

        sqlx::query(
            r#"
            INSERT INTO newsletter_campaigns (id, subject, content, preview_text, status)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(campaign.id)
        .bind(&campaign.subject)
        .bind(&campaign.content)
        .bind(&campaign.preview_text)
        .bind(status.as_ref())
        .execute(&self.db_pool)
        .await
        .expect("Failed to insert campaign.");

        campaign.id
    }

    pub async fn insert_stuck_campaign(&self, minutes_in_sending: i32) -> Uuid {
        let id = self.insert_campaign(CampaignStatus::Sending).await;

        sqlx::query(
            r#"
            UPDATE newsletter_campaigns
            SET sending_started_at = now() - make_interval(mins => $2)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(minutes_in_sending)
        .execute(&self.db_pool)
        .await
        .expect("Failed to backdate campaign.");

        id
    }

    pub async fn insert_subscriber(&self, email: &str, is_active: bool) {
        sqlx::query(
            r#"
            INSERT INTO subscribers (id, email, name, is_active, subscribed_at)
            VALUES ($1, $2, 'Frank', $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(is_active)
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await
        .expect("Failed to insert subscriber.");
    }

    pub async fn load_campaign(&self, id: Uuid) -> Campaign {
        PgCampaignStore::new(self.db_pool.clone())
            .load_campaign(id)
            .await
            .expect("Failed to load campaign.")
            .expect("Campaign does not exist.")
    }

    pub async fn dispatch_campaign(&self, id: Uuid) -> Response {
        reqwest::Client::new()
            .post(&format!("{}/campaigns/{}/dispatch", self.address, id))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn delete_campaign(&self, id: Uuid) -> Response {
        reqwest::Client::new()
            .delete(&format!("{}/campaigns/{}", self.address, id))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn reconcile(&self) -> Response {
        reqwest::Client::new()
            .post(&format!("{}/admin/campaigns/reconcile", self.address))
            .send()
            .await
            .expect("Failed to execute request.")
    }
}

async fn configure_db(db_config: &mut DatabaseSettings, db_test_name: String) -> PgPool {
    // Create database
    let mut connection = PgConnection::connect_with(&db_config.get_server_options())
        .await
        .expect("Failed to connect to Postgres.");

    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, db_test_name))
        .await
        .expect("Failed to create database.");

    connection
        .close()
        .await
        .expect("Failed to close connection.");

    // Execute migrations
    db_config.set_name(db_test_name);

    let db_pool = get_connection_db_pool(db_config);

    run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations.");

    db_pool
}

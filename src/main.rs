use campaign_dispatch::config::get_configuration;
use campaign_dispatch::startup::{get_connection_db_pool, run_migrations, Application};
use campaign_dispatch::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let subscriber = get_subscriber(
        String::from("campaign_dispatch"),
        String::from("info"),
        std::io::stdout,
    );

    init_subscriber(subscriber)?;

    let config = get_configuration()?;

    run_migrations(&get_connection_db_pool(&config.database)).await?;

    let application = Application::build(config.clone()).await?;

    tracing::info!("Server listening on {}", config.get_address());

    application.run_until_stop().await?;

    Ok(())
}

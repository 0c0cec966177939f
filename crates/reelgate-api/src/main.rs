use reelgate_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    // Database, storage, services, background tasks and routes
    let app = reelgate_api::setup::initialize_app(config.clone()).await?;

    reelgate_api::setup::server::start_server(&config, app).await?;

    Ok(())
}

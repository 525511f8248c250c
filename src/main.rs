use blueboard_irrops::{
    api::{ScheduleProvider, ScheduleSource},
    config::Config,
    hubs::HubDirectory,
    irrops::{IrropsService, IrropsSettings},
    logging,
    schedule::ScheduleService,
    server::{self, AppState},
};
use color_eyre::Result;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let (config, config_problem) = Config::load(&Config::path());
    let _log_guard = logging::initialize_logging(&config.logging);
    if let Some(e) = config_problem {
        warn!("{}. Using defaults.", e);
    }

    // One upstream client shared by both endpoints so request spacing applies to all of them
    let provider: Arc<dyn ScheduleSource> = Arc::new(ScheduleProvider::new(&config.upstream)?);

    let hubs = HubDirectory::from_config(&config.irrops);
    info!(
        "Monitoring {} hubs: {}",
        hubs.hubs().len(),
        hubs.hubs().iter().map(|h| h.code.as_str()).collect::<Vec<_>>().join(", ")
    );

    let irrops = Arc::new(IrropsService::new(
        Arc::clone(&provider),
        hubs,
        IrropsSettings::from(&config.irrops),
    ));
    let schedule = Arc::new(ScheduleService::new(provider, config.schedule.clone()));
    let app = server::router(AppState::new(&config.server, irrops, schedule));

    let addr: SocketAddr = config.server.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down.");
        })
        .await?;

    Ok(())
}

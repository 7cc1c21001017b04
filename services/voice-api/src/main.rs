use std::net::SocketAddr;
use std::sync::Arc;

use common_config::load;
use common_obs::ObsInit;
use tokio::net::TcpListener;
use voice_api::config::VoiceApiConfig;
use voice_api::{build_router, AppState, SERVICE_NAME};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn build_sha() -> &'static str {
    option_env!("BUILD_SHA").unwrap_or("unknown")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ObsInit::init(SERVICE_NAME).map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;

    let config = load::<VoiceApiConfig>()?;
    let addr = config.socket_addr()?;
    tracing::info!(
        event = "service_start",
        service = SERVICE_NAME,
        version = VERSION,
        build_sha = build_sha(),
        listen_addr = %addr,
        sesame = ?config.sesame,
        "starting service"
    );

    let state = Arc::new(AppState::connect(&config.sesame));
    let router = build_router(state);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!(event = "service_stop", service = SERVICE_NAME);

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

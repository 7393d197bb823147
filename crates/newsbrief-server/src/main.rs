mod api;
mod jobs;
mod middleware;

use std::sync::Arc;

use newsbrief_sched::SchedulerService;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = newsbrief_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let scheduler = Arc::new(SchedulerService::new(jobs::registry(&config)?));

    let auth = AuthState::from_env(matches!(
        config.env,
        newsbrief_core::Environment::Development
    ))?;
    let app = build_app(
        AppState {
            scheduler: Arc::clone(&scheduler),
        },
        auth,
    );

    let shutdown = install_shutdown_handler();

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "listening");

    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    // Blocks until a shutdown signal arrives, then drains in-flight runs.
    scheduler.run_until_cancelled(shutdown).await;

    server.await??;
    Ok(())
}

/// Translate SIGINT/SIGTERM into a cancellation token.
///
/// The first signal cancels the token; later signals are absorbed so they
/// cannot cut the graceful drain short.
fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let handler = token.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut interrupt =
                signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
            let mut terminate =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            loop {
                tokio::select! {
                    _ = interrupt.recv() => {},
                    _ = terminate.recv() => {},
                }
                if handler.is_cancelled() {
                    tracing::debug!("shutdown already in progress");
                } else {
                    tracing::info!("received shutdown signal, starting graceful shutdown");
                    handler.cancel();
                }
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for ctrl-c");
            tracing::info!("received shutdown signal, starting graceful shutdown");
            handler.cancel();
        }
    });

    token
}

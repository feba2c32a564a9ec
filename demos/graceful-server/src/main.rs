use armature::prelude::*;
use axum::{Router, extract, routing::get};
use std::time::Duration;

mod pool;
mod server;

use pool::ConnectionPool;
use server::HttpServer;

async fn health(extract::State(app): extract::State<Application>) -> String {
    format!("{}\n", app.state())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,armature=debug".into()),
        )
        .init();

    tracing::info!("🚀 Starting Graceful Server...");

    // 1. Lifecycle configuration from the environment, with demo defaults
    let env = ConfigService::new();
    let mut config = ApplicationConfig::from_service(&env)?;
    if env.get("SHUTDOWN_SIGNALS").is_none() {
        config.shutdown.signals = vec![Signal::Term, Signal::Int];
    }
    config.shutdown.grace_period.get_or_insert(Duration::from_secs(10));
    if config.observers.ordered_groups.is_empty() {
        config.observers = ObserverOptions {
            ordered_groups: vec!["datasource".into(), "server".into()],
            ..config.observers
        };
    }

    // 2. Application with its observers
    let app = Application::builder()
        .container(ContainerBuilder::new().build())
        .config(config)
        .observer_in_group(
            Arc::new(RwLock::new(ConnectionPool::new(8))),
            "ConnectionPool",
            "datasource",
        )
        .build()?;

    // 3. The HTTP server needs the application for its health route
    let host = env.get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
    let port = env.get("PORT").unwrap_or_else(|| "3000".to_string());
    let router = Router::new()
        .route("/health", get(health))
        .with_state(app.clone());
    app.lifecycle_observer_in_group(
        Arc::new(RwLock::new(HttpServer::new(format!("{host}:{port}"), router))),
        "HttpServer",
        "server",
    )?;

    // 4. Run until a shutdown signal stops the application
    app.start().await?;
    app.wait_for(State::Stopped).await;

    tracing::info!("👋 Server stopped");
    Ok(())
}

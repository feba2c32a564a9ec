use armature::lifecycle::{LifecycleError, LifecycleObserver};
use async_trait::async_trait;
use axum::Router;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// An axum server that binds on start and drains in-flight requests on stop
pub struct HttpServer {
    addr: String,
    router: Router,
    running: Option<Running>,
}

struct Running {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl HttpServer {
    pub fn new(addr: impl Into<String>, router: Router) -> Self {
        Self {
            addr: addr.into(),
            router,
            running: None,
        }
    }
}

#[async_trait]
impl LifecycleObserver for HttpServer {
    async fn start(&mut self) -> Result<(), LifecycleError> {
        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .map_err(|e| LifecycleError::init_failed(format!("bind {}: {}", self.addr, e)))?;
        tracing::info!("✅ Server listening on http://{}", self.addr);

        let (shutdown, rx) = oneshot::channel();
        let serve = axum::serve(listener, self.router.clone()).with_graceful_shutdown(async move {
            let _ = rx.await;
        });
        self.running = Some(Running {
            shutdown,
            handle: tokio::spawn(async move { serve.await }),
        });
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LifecycleError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        tracing::info!("🛑 Draining HTTP connections...");
        let _ = running.shutdown.send(());
        running
            .handle
            .await
            .map_err(|e| LifecycleError::shutdown_failed(e.to_string()))?
            .map_err(|e| LifecycleError::shutdown_failed(e.to_string()))?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

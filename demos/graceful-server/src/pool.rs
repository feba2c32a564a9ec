use armature::lifecycle::{LifecycleError, LifecycleObserver};
use async_trait::async_trait;
use std::time::Duration;

/// Stand-in for a database connection pool
pub struct ConnectionPool {
    size: usize,
    open: usize,
}

impl ConnectionPool {
    pub fn new(size: usize) -> Self {
        Self { size, open: 0 }
    }
}

#[async_trait]
impl LifecycleObserver for ConnectionPool {
    async fn start(&mut self) -> Result<(), LifecycleError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.open = self.size;
        tracing::info!("Opened {} database connections", self.open);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LifecycleError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        tracing::info!("Closed {} database connections", self.open);
        self.open = 0;
        Ok(())
    }
}

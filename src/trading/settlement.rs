use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ArbError, Result};

/// Waits until a submitted buy has settled before the sell leg starts.
#[async_trait]
pub trait Settlement: Send + Sync {
    /// Returns `ArbError::Cancelled` if `shutdown` fires first.
    async fn wait(&self, shutdown: &CancellationToken) -> Result<()>;
}

/// Fixed wall-clock delay.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

#[async_trait]
impl Settlement for FixedDelay {
    async fn wait(&self, shutdown: &CancellationToken) -> Result<()> {
        debug!(delay_ms = self.0.as_millis() as u64, "Waiting for settlement");
        tokio::select! {
            _ = shutdown.cancelled() => Err(ArbError::Cancelled),
            _ = tokio::time::sleep(self.0) => Ok(()),
        }
    }
}

/// Confirms at once unless already cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

#[async_trait]
impl Settlement for Immediate {
    async fn wait(&self, shutdown: &CancellationToken) -> Result<()> {
        if shutdown.is_cancelled() {
            return Err(ArbError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fixed_delay_elapses() {
        let token = CancellationToken::new();
        assert!(FixedDelay(Duration::from_secs(10)).wait(&token).await.is_ok());
    }

    #[tokio::test]
    async fn fixed_delay_stops_on_cancel() {
        let token = CancellationToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { FixedDelay(Duration::from_secs(3600)).wait(&token).await })
        };
        token.cancel();
        assert!(matches!(waiter.await.unwrap(), Err(ArbError::Cancelled)));
    }

    #[tokio::test]
    async fn immediate_respects_cancellation() {
        let token = CancellationToken::new();
        assert!(Immediate.wait(&token).await.is_ok());
        token.cancel();
        assert!(matches!(Immediate.wait(&token).await, Err(ArbError::Cancelled)));
    }
}

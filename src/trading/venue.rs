use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::VenueError;
use crate::security::SealedPayload;

/// Execution venue accepting sealed buy and sell orders.
#[async_trait]
pub trait Venue: Send + Sync {
    async fn submit_buy(&self, amount: Decimal, payload: &SealedPayload) -> Result<(), VenueError>;

    async fn submit_sell(&self, amount: Decimal, payload: &SealedPayload)
        -> Result<(), VenueError>;
}

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    amount: Decimal,
    payload: &'a str,
}

/// Venue reached over HTTP: orders are POSTed as JSON with a hex payload.
#[derive(Debug, Clone)]
pub struct HttpVenue {
    client: Client,
    base_url: String,
}

impl HttpVenue {
    /// Every request, connect included, is cut off after `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, VenueError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post_order(
        &self,
        side: &str,
        amount: Decimal,
        payload: &SealedPayload,
    ) -> Result<(), VenueError> {
        let url = format!("{}/orders/{}", self.base_url, side);
        let hex_payload = payload.to_hex();
        debug!(%url, %amount, "Submitting order");

        let response = self
            .client
            .post(&url)
            .json(&OrderRequest {
                amount,
                payload: &hex_payload,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VenueError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Venue for HttpVenue {
    async fn submit_buy(&self, amount: Decimal, payload: &SealedPayload) -> Result<(), VenueError> {
        self.post_order("buy", amount, payload).await
    }

    async fn submit_sell(
        &self,
        amount: Decimal,
        payload: &SealedPayload,
    ) -> Result<(), VenueError> {
        self.post_order("sell", amount, payload).await
    }
}

/// Logs orders instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct SimulatedVenue;

#[async_trait]
impl Venue for SimulatedVenue {
    async fn submit_buy(&self, amount: Decimal, payload: &SealedPayload) -> Result<(), VenueError> {
        info!(
            "[SIMULATION] Would buy {} with encrypted data: {}",
            amount,
            payload.to_hex()
        );
        Ok(())
    }

    async fn submit_sell(
        &self,
        amount: Decimal,
        payload: &SealedPayload,
    ) -> Result<(), VenueError> {
        info!(
            "[SIMULATION] Would sell {} with encrypted data: {}",
            amount,
            payload.to_hex()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn simulated_venue_accepts_everything() {
        let venue = SimulatedVenue;
        let payload = SealedPayload::from(vec![1, 2, 3]);
        assert!(venue.submit_buy(dec!(1), &payload).await.is_ok());
        assert!(venue.submit_sell(dec!(1), &payload).await.is_ok());
    }

    #[tokio::test]
    async fn unreachable_http_venue_is_a_transport_error() {
        let venue = HttpVenue::new("http://127.0.0.1:9/", Duration::from_secs(2)).unwrap();
        let payload = SealedPayload::from(vec![0xab]);
        let err = venue.submit_buy(dec!(1), &payload).await.unwrap_err();
        assert!(matches!(err, VenueError::Transport(_)));
    }

    #[tokio::test]
    async fn stalled_http_venue_times_out() {
        // Accepts the connection but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let venue = HttpVenue::new(format!("http://{addr}"), Duration::from_millis(200)).unwrap();
        let payload = SealedPayload::from(vec![0xab]);
        let err = tokio::time::timeout(
            Duration::from_secs(5),
            venue.submit_sell(dec!(1), &payload),
        )
        .await
        .expect("request was not cut off by the client timeout")
        .unwrap_err();

        assert!(matches!(err, VenueError::Transport(_)));
        server.abort();
    }
}

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Transaction;
use crate::error::{ArbError, Result};

/// Streams pending transactions from a WebSocket feed into a channel.
#[derive(Debug, Clone)]
pub struct MempoolScanner {
    feed_url: String,
    tx_sender: mpsc::Sender<Transaction>,
}

impl MempoolScanner {
    pub fn new(feed_url: String, tx_sender: mpsc::Sender<Transaction>) -> Self {
        Self {
            feed_url,
            tx_sender,
        }
    }

    /// Runs until the feed closes, the receiving side goes away, or
    /// `shutdown` is cancelled.
    pub async fn start_scanning(&self, shutdown: CancellationToken) -> Result<()> {
        info!(url = %self.feed_url, "Connecting to mempool feed");

        let (ws, _) = connect_async(self.feed_url.as_str())
            .await
            .map_err(|e| ArbError::feed_error(format!("Failed to connect to mempool: {e}")))?;
        let (_write, mut read) = ws.split();

        info!("Connected to mempool, monitoring for transactions...");

        loop {
            let frame = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Mempool scanner stopping on shutdown");
                    return Ok(());
                }
                frame = read.next() => frame,
            };

            let text = match frame {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Skipping non UTF-8 binary frame: {}", e);
                        continue;
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "Mempool feed closed by server");
                    return Ok(());
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(ArbError::feed_error(format!("Mempool stream error: {e}")));
                }
                None => {
                    info!("Mempool stream ended");
                    return Ok(());
                }
            };

            match parse_frame(&text) {
                Ok(Some(tx)) => {
                    if self.tx_sender.send(tx).await.is_err() {
                        debug!("Transaction receiver dropped, stopping scanner");
                        return Ok(());
                    }
                }
                Ok(None) => continue,
                Err(e) => error!("Failed to parse transaction: {}", e),
            }
        }
    }
}

/// Blank frames are keep-alives and yield `None`.
pub fn parse_frame(text: &str) -> Result<Option<Transaction>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_transaction_frame() {
        let tx = parse_frame(r#" {"from":"a","to":"b","amount_x":"1.5","amount_y":2} "#)
            .unwrap()
            .unwrap();
        assert_eq!(tx.amount_x, dec!(1.5));
        assert_eq!(tx.amount_y, dec!(2));
    }

    #[test]
    fn keepalive_frames_are_skipped() {
        assert!(parse_frame("").unwrap().is_none());
        assert!(parse_frame("  \n").unwrap().is_none());
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(matches!(
            parse_frame("{not json"),
            Err(ArbError::Serialization(_))
        ));
    }
}

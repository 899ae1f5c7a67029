use anyhow::Result;
use reqwest::Client;
use tracing::{debug, error, info};

use super::Reporter;
use crate::error::ArbError;
use crate::trading::{TradeReport, TradeState};

/// Pushes trade outcomes and errors to a Telegram chat.
///
/// Sending happens on a spawned task; without a bot token and chat id every
/// call is a no-op.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    bot_token: Option<String>,
    chat_id: Option<String>,
    environment: String,
    client: Client,
}

impl TelegramNotifier {
    pub fn new(
        bot_token: Option<String>,
        chat_id: Option<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            bot_token,
            chat_id,
            environment: environment.into(),
            client: Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }

    pub async fn send_notification(&self, message: &str) -> Result<()> {
        let (bot_token, chat_id) = match (&self.bot_token, &self.chat_id) {
            (Some(token), Some(chat)) => (token, chat),
            _ => {
                debug!("Telegram notification skipped: Bot token or chat ID not configured");
                return Ok(());
            }
        };

        let url = format!("https://api.telegram.org/bot{}/sendMessage", bot_token);

        let response = self
            .client
            .post(&url)
            .form(&[
                ("chat_id", chat_id.as_str()),
                ("text", message),
                ("parse_mode", "HTML"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(anyhow::anyhow!("Telegram API error: {}", error_text));
        }

        info!("Telegram notification sent successfully");
        Ok(())
    }

    pub fn format_trade_message(&self, report: &TradeReport) -> Option<String> {
        let headline = match report.state {
            TradeState::Completed => "✅ Arbitrage Completed",
            TradeState::BuyFailed => "❌ Buy Leg Failed",
            TradeState::SellFailed => "⚠️ Sell Leg Failed - Position Open",
            TradeState::Abandoned if report.open_position() => "⚠️ Trade Abandoned - Position Open",
            _ => return None,
        };

        let mut message = format!(
            "<b>{}</b> [{}]\n\n\
            From: <code>{}</code>\n\
            Amount Y: <b>{}</b>\n\
            Elapsed: <b>{} ms</b>",
            headline,
            self.environment,
            report.tx.source_address,
            report.tx.amount_y,
            report.elapsed.as_millis(),
        );
        if let Some(err) = &report.error {
            message.push_str(&format!("\nError: <code>{}</code>", err));
        }
        Some(message)
    }

    pub fn format_error_message(&self, context: &str, err: &ArbError) -> String {
        format!(
            "<b>🚨 Trade Error</b> [{}]\n\n\
            Stage: <b>{}</b>\n\
            Kind: <b>{}</b>\n\
            Detail: <code>{}</code>",
            self.environment,
            context,
            err.kind(),
            err
        )
    }

    fn spawn_send(&self, message: String) {
        if !self.is_configured() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime available, dropping Telegram notification");
            return;
        };
        let notifier = self.clone();
        handle.spawn(async move {
            if let Err(e) = notifier.send_notification(&message).await {
                error!("Failed to send Telegram notification: {}", e);
            }
        });
    }
}

impl Reporter for TelegramNotifier {
    fn report_error(&self, context: &str, err: &ArbError) {
        // Abandonment on shutdown is expected and would only add noise.
        if matches!(err, ArbError::Cancelled) {
            return;
        }
        self.spawn_send(self.format_error_message(context, err));
    }

    fn report_trade(&self, report: &TradeReport) {
        if let Some(message) = self.format_trade_message(report) {
            self.spawn_send(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VenueError;

    #[tokio::test]
    async fn unconfigured_notifier_is_a_no_op() {
        let notifier = TelegramNotifier::new(None, None, "test");
        assert!(!notifier.is_configured());
        assert!(notifier.send_notification("hello").await.is_ok());
        notifier.report_error("buy", &ArbError::DecryptFailed);
    }

    #[test]
    fn error_message_names_stage_and_kind() {
        let notifier = TelegramNotifier::new(None, None, "production");
        let err = ArbError::Venue(VenueError::Unavailable("maintenance".into()));
        let msg = notifier.format_error_message("sell", &err);

        assert!(msg.contains("[production]"));
        assert!(msg.contains("Stage: <b>sell</b>"));
        assert!(msg.contains("Kind: <b>venue</b>"));
    }
}

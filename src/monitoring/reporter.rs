use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::ArbError;
use crate::trading::{TradeReport, TradeState};

/// Observability side channel handed to each component at construction.
///
/// Calls run inline on the execution context and never fail. Network sinks
/// spawn their I/O; local sinks such as the trade journal may do one short
/// blocking write. Sinks swallow and log their own errors.
pub trait Reporter: Send + Sync {
    fn report_error(&self, context: &str, err: &ArbError);

    fn report_trade(&self, report: &TradeReport);
}

/// Structured log lines through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report_error(&self, context: &str, err: &ArbError) {
        error!(context, kind = err.kind(), "Trade error: {}", err);
    }

    fn report_trade(&self, report: &TradeReport) {
        let elapsed_ms = report.elapsed.as_millis() as u64;
        match report.state {
            TradeState::Completed => info!(
                amount = %report.tx.amount_y,
                elapsed_ms,
                "Arbitrage completed"
            ),
            state if report.open_position() => warn!(
                %state,
                amount = %report.tx.amount_y,
                elapsed_ms,
                "Arbitrage ended with an open position"
            ),
            state => warn!(%state, elapsed_ms, "Arbitrage did not complete"),
        }
    }
}

/// Fans every report out to a list of sinks.
#[derive(Clone, Default)]
pub struct Reporters {
    sinks: Vec<Arc<dyn Reporter>>,
}

impl Reporters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn Reporter>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Reporter for Reporters {
    fn report_error(&self, context: &str, err: &ArbError) {
        for sink in &self.sinks {
            sink.report_error(context, err);
        }
    }

    fn report_trade(&self, report: &TradeReport) {
        for sink in &self.sinks {
            sink.report_trade(report);
        }
    }
}

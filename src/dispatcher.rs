use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use crate::mempool::Transaction;
use crate::trading::{ArbitrageExecutor, TradeState};

/// Counts of how execution contexts ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub received: u64,
    pub completed: u64,
    pub skipped: u64,
    pub buy_failed: u64,
    pub sell_failed: u64,
    pub abandoned: u64,
    pub panicked: u64,
    pub open_positions: u64,
}

impl DispatchSummary {
    pub fn finished(&self) -> u64 {
        self.completed
            + self.skipped
            + self.buy_failed
            + self.sell_failed
            + self.abandoned
            + self.panicked
    }

    fn record(&mut self, outcome: Result<(TradeState, bool), JoinError>) {
        match outcome {
            Ok((state, open_position)) => {
                match state {
                    TradeState::Completed => self.completed += 1,
                    TradeState::Skipped => self.skipped += 1,
                    TradeState::BuyFailed => self.buy_failed += 1,
                    TradeState::SellFailed => self.sell_failed += 1,
                    _ => self.abandoned += 1,
                }
                if open_position {
                    self.open_positions += 1;
                }
            }
            Err(e) => {
                error!("Execution context panicked: {}", e);
                self.panicked += 1;
            }
        }
    }
}

/// Fans transactions out to isolated execution contexts, at most
/// `max_in_flight` at a time. Contexts start in feed order and may finish in
/// any order.
pub struct TransactionDispatcher {
    executor: Arc<ArbitrageExecutor>,
    permits: Arc<Semaphore>,
    max_in_flight: usize,
    shutdown: CancellationToken,
}

impl TransactionDispatcher {
    pub fn new(
        executor: Arc<ArbitrageExecutor>,
        max_in_flight: usize,
        shutdown: CancellationToken,
    ) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            executor,
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            shutdown,
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Consumes `feed` until it closes or shutdown is signalled, then waits
    /// for every in-flight context to finish or abandon.
    pub async fn run(&self, feed: mpsc::Receiver<Transaction>) -> DispatchSummary {
        self.dispatch(feed)
            .instrument(info_span!("process.transactions"))
            .await
    }

    async fn dispatch(&self, mut feed: mpsc::Receiver<Transaction>) -> DispatchSummary {
        let mut tasks = JoinSet::new();
        let mut summary = DispatchSummary::default();

        info!(max_in_flight = self.max_in_flight, "Dispatcher started");

        loop {
            // Wait for capacity before pulling from the feed so a fast
            // producer backs up into the channel instead of spawning.
            let permit = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let tx = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                tx = feed.recv() => match tx {
                    Some(tx) => tx,
                    None => {
                        info!("Transaction feed closed");
                        break;
                    }
                },
            };
            summary.received += 1;

            // Each transaction gets its own context holding one permit
            let executor = Arc::clone(&self.executor);
            let shutdown = self.shutdown.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let report = executor.process_transaction(tx, &shutdown).await;
                (report.state, report.open_position())
            });

            // Reap whatever already finished so the set stays small
            while let Some(outcome) = tasks.try_join_next() {
                summary.record(outcome);
            }
        }

        // Contexts observe the same token, so this drain is bounded by the
        // venue timeout and the sell grace.
        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "Waiting for in-flight trades");
        }
        while let Some(outcome) = tasks.join_next().await {
            summary.record(outcome);
        }

        // Log summary
        info!(
            received = summary.received,
            completed = summary.completed,
            skipped = summary.skipped,
            failed = summary.buy_failed + summary.sell_failed + summary.panicked,
            abandoned = summary.abandoned,
            open_positions = summary.open_positions,
            "Dispatcher stopped"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionConfig;
    use crate::monitoring::TracingReporter;
    use crate::trading::{Immediate, SimulatedVenue};
    use rust_decimal_macros::dec;

    fn dispatcher(max_in_flight: usize, shutdown: CancellationToken) -> TransactionDispatcher {
        let config = ExecutionConfig {
            min_amount: dec!(10),
            difficulty: 1,
            max_attempts: 10_000,
            encryption_key: [3u8; 32],
        };
        let executor = ArbitrageExecutor::new(
            &config,
            Arc::new(SimulatedVenue),
            Arc::new(Immediate),
            Arc::new(TracingReporter),
        )
        .unwrap();
        TransactionDispatcher::new(Arc::new(executor), max_in_flight, shutdown)
    }

    #[tokio::test]
    async fn drains_feed_and_counts_outcomes() {
        let (sender, feed) = mpsc::channel(16);
        for amount in [dec!(20), dec!(5), dec!(30)] {
            sender
                .send(Transaction::new("a", "b", amount, amount))
                .await
                .unwrap();
        }
        drop(sender);

        let summary = dispatcher(2, CancellationToken::new()).run(feed).await;

        assert_eq!(summary.received, 3);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.finished(), 3);
    }

    #[tokio::test]
    async fn stops_on_shutdown_with_open_feed() {
        let (_sender, feed) = mpsc::channel::<Transaction>(1);
        let token = CancellationToken::new();
        token.cancel();

        let summary = dispatcher(4, token).run(feed).await;
        assert_eq!(summary, DispatchSummary::default());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        assert_eq!(dispatcher(0, CancellationToken::new()).max_in_flight(), 1);
    }
}

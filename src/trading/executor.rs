use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use super::order::OrderPayload;
use super::settlement::Settlement;
use super::venue::Venue;
use crate::config::ExecutionConfig;
use crate::error::{ArbError, Result};
use crate::mempool::{OpportunityDetector, Transaction};
use crate::monitoring::Reporter;
use crate::security::pow::{self, PuzzleSolution, PuzzleSolver};
use crate::security::{SealedPayload, SecureEnvelope};

pub const DEFAULT_SELL_GRACE: Duration = Duration::from_secs(5);

/// Where a trade attempt currently is, or where it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeState {
    /// Not eligible; nothing was submitted.
    Skipped,
    Detected,
    Buying,
    AwaitingSettlement,
    Selling,
    Completed,
    BuyFailed,
    SellFailed,
    /// Shutdown observed before the sell leg started.
    Abandoned,
}

impl TradeState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Skipped | Self::Completed | Self::BuyFailed | Self::SellFailed | Self::Abandoned
        )
    }

    /// A buy went through but no sell followed.
    pub fn leaves_open_position(self, bought: bool) -> bool {
        bought && matches!(self, Self::SellFailed | Self::Abandoned)
    }
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Skipped => "skipped",
            Self::Detected => "detected",
            Self::Buying => "buying",
            Self::AwaitingSettlement => "awaiting_settlement",
            Self::Selling => "selling",
            Self::Completed => "completed",
            Self::BuyFailed => "buy_failed",
            Self::SellFailed => "sell_failed",
            Self::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

/// PoW proof attached to the buy leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowProof {
    pub challenge: String,
    pub solution: PuzzleSolution,
}

/// Outcome of one execution context.
#[derive(Debug)]
pub struct TradeReport {
    pub tx: Transaction,
    pub state: TradeState,
    pub pow: Option<PowProof>,
    pub bought: bool,
    pub error: Option<ArbError>,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl TradeReport {
    fn new(tx: Transaction, state: TradeState) -> Self {
        Self {
            tx,
            state,
            pow: None,
            bought: false,
            error: None,
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == TradeState::Completed
    }

    pub fn open_position(&self) -> bool {
        self.state.leaves_open_position(self.bought)
    }
}

/// Runs the detect, PoW, seal, buy, settle, seal, sell pipeline for one
/// transaction at a time. Shared read-only across execution contexts.
pub struct ArbitrageExecutor {
    detector: OpportunityDetector,
    solver: Arc<PuzzleSolver>,
    envelope: SecureEnvelope,
    venue: Arc<dyn Venue>,
    settlement: Arc<dyn Settlement>,
    reporter: Arc<dyn Reporter>,
    sell_grace: Duration,
}

impl ArbitrageExecutor {
    pub fn new(
        config: &ExecutionConfig,
        venue: Arc<dyn Venue>,
        settlement: Arc<dyn Settlement>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self> {
        Ok(Self {
            detector: OpportunityDetector::new(config.min_amount),
            solver: Arc::new(PuzzleSolver::new(config.difficulty, config.max_attempts)?),
            envelope: SecureEnvelope::new(&config.encryption_key)?,
            venue,
            settlement,
            reporter,
            sell_grace: DEFAULT_SELL_GRACE,
        })
    }

    pub fn with_sell_grace(mut self, grace: Duration) -> Self {
        self.sell_grace = grace;
        self
    }

    pub fn solver(&self) -> &PuzzleSolver {
        &self.solver
    }

    pub fn envelope(&self) -> &SecureEnvelope {
        &self.envelope
    }

    /// Ineligible transactions come back as `Skipped` without touching the
    /// venue or the reporter.
    #[instrument(name = "process.transaction", skip_all, fields(from = %tx.source_address))]
    pub async fn process_transaction(
        &self,
        tx: Transaction,
        shutdown: &CancellationToken,
    ) -> TradeReport {
        if !self.detector.is_opportunity(&tx) {
            debug!("Transaction below threshold, skipping");
            return TradeReport::new(tx, TradeState::Skipped);
        }

        info!(
            amount_x = %tx.amount_x,
            amount_y = %tx.amount_y,
            "Arbitrage opportunity detected"
        );
        self.execute_arbitrage(tx, shutdown).await
    }

    pub async fn execute_arbitrage(
        &self,
        tx: Transaction,
        shutdown: &CancellationToken,
    ) -> TradeReport {
        let started = Instant::now();
        let mut report = TradeReport::new(tx, TradeState::Detected);

        let outcome = self
            .run_legs(&mut report, shutdown)
            .instrument(info_span!("execute.arbitrage"))
            .await;

        // The state still names the leg that failed; map it to a terminal one
        if let Err(err) = outcome {
            let stage = failure_stage(report.state);
            report.state = match (report.state, &err) {
                (TradeState::Buying, ArbError::Cancelled) => TradeState::Abandoned,
                (TradeState::Buying, _) => TradeState::BuyFailed,
                (TradeState::Selling, _) => TradeState::SellFailed,
                _ => TradeState::Abandoned,
            };
            self.log_failure(&report, &err);
            self.reporter.report_error(stage, &err);
            report.error = Some(err);
        }

        // Every eligible attempt is reported, success or not
        report.elapsed = started.elapsed();
        self.reporter.report_trade(&report);
        report
    }

    /// Advances `report.state` as it goes; on error the state names the leg
    /// that failed.
    async fn run_legs(&self, report: &mut TradeReport, shutdown: &CancellationToken) -> Result<()> {
        if shutdown.is_cancelled() {
            return Err(ArbError::Cancelled);
        }
        let amount = report.tx.amount_y;

        // Buy leg: PoW, then seal and submit
        report.state = TradeState::Buying;
        let proof = self.solve_pow(shutdown).await?;

        // Shutdown during the search must not open a new position
        if shutdown.is_cancelled() {
            report.pow = Some(proof);
            return Err(ArbError::Cancelled);
        }

        let result = self.buy(amount, &proof, shutdown).await;
        report.pow = Some(proof);
        result?;
        report.bought = true;
        info!(%amount, "Purchased crypto Y");

        // Hold the position until the buy settles
        report.state = TradeState::AwaitingSettlement;
        self.settlement.wait(shutdown).await?;

        // Sell leg: no PoW
        report.state = TradeState::Selling;
        self.sell(amount, shutdown).await?;
        info!(%amount, "Sold crypto Y");

        report.state = TradeState::Completed;
        Ok(())
    }

    /// Search runs on the blocking pool so it never stalls other contexts.
    async fn solve_pow(&self, shutdown: &CancellationToken) -> Result<PowProof> {
        let challenge = pow::new_challenge();
        let solver = Arc::clone(&self.solver);
        let task_challenge = challenge.clone();
        let task_shutdown = shutdown.clone();

        let solution = tokio::task::spawn_blocking(move || {
            solver.solve_cancellable(&task_challenge, &task_shutdown)
        })
        .await
        .map_err(|e| ArbError::TaskFailed(format!("PoW task: {e}")))??;

        Ok(PowProof {
            challenge,
            solution,
        })
    }

    /// A buy still in flight at shutdown is dropped; whether the venue saw
    /// it is unknown.
    #[instrument(name = "crypto.buy", skip_all, fields(amount = %amount))]
    async fn buy(
        &self,
        amount: Decimal,
        proof: &PowProof,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        let order = OrderPayload::buy(
            amount,
            proof.challenge.clone(),
            proof.solution.nonce.clone(),
        );
        let sealed = self.seal(&order)?;

        // Submit, unless shutdown wins first
        tokio::select! {
            result = self.venue.submit_buy(amount, &sealed) => result?,
            _ = shutdown.cancelled() => {
                warn!("Shutdown requested, dropping in-flight buy");
                return Err(ArbError::Cancelled);
            }
        }
        Ok(())
    }

    /// A sell in flight at shutdown gets `sell_grace` to finish before it is
    /// dropped and the position reported open.
    #[instrument(name = "crypto.sell", skip_all, fields(amount = %amount))]
    async fn sell(&self, amount: Decimal, shutdown: &CancellationToken) -> Result<()> {
        let sealed = self.seal(&OrderPayload::sell(amount))?;

        // Race the submission against shutdown; a late shutdown only starts the grace clock
        let mut submit = self.venue.submit_sell(amount, &sealed);

        let finished = tokio::select! {
            result = &mut submit => Some(result),
            _ = shutdown.cancelled() => None,
        };

        match finished {
            Some(result) => result?,
            None => {
                warn!(grace = ?self.sell_grace, "Shutdown requested, waiting for in-flight sell");
                tokio::time::timeout(self.sell_grace, submit)
                    .await
                    .map_err(|_| ArbError::Cancelled)??
            }
        }
        Ok(())
    }

    fn seal(&self, order: &OrderPayload) -> Result<SealedPayload> {
        self.envelope.seal(&order.to_bytes()?)
    }

    fn log_failure(&self, report: &TradeReport, err: &ArbError) {
        match report.state {
            TradeState::BuyFailed => error!("Failed to buy crypto Y: {}", err),
            TradeState::SellFailed => error!(
                amount = %report.tx.amount_y,
                "Failed to sell crypto Y, position left open: {}", err
            ),
            _ if report.open_position() => warn!(
                amount = %report.tx.amount_y,
                "Trade abandoned after buy, position left open: {}", err
            ),
            _ => warn!("Trade abandoned: {}", err),
        }
    }
}

fn failure_stage(state: TradeState) -> &'static str {
    match state {
        TradeState::Buying => "buy",
        TradeState::AwaitingSettlement => "settlement",
        TradeState::Selling => "sell",
        _ => "start",
    }
}

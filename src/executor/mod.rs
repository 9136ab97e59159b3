//! Idempotent order execution
//!
//! Turns a strategy decision into exchange orders and confirmed ledger
//! entries. The hard requirement is exactly-once semantics under an
//! unreliable network: every logical order carries a caller-generated
//! client_order_id, an ambiguous outcome is always reconciled by querying
//! that id before anything is resubmitted, and a fresh id is used only
//! once the prior one is confirmed terminal or confirmed never-received.
//!
//! # State machine per leg
//! `CREATED -> SUBMITTED -> {ACCEPTED -> FILLED | PARTIALLY_FILLED
//! (remainder becomes a new leg) | REJECTED | UNKNOWN (reconcile by id)}`
//!
//! A partial fill appends a trade for the filled quantity and retries the
//! remainder as a new leg under the same parent context. Exhausting the
//! retry budget abandons the attempt as a recoverable error; the next tick
//! re-evaluates from scratch instead of resuming a half-finished attempt.

pub mod backoff;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::gateway::types::{OrderAck, OrderRequest, OrderSide, OrderStatus};
use crate::gateway::ExchangeGateway;
use crate::ledger::{Trade, TradeLedger};
use crate::strategy::{Action, Decision};

pub use backoff::RetryConfig;

/// Quantities below this are treated as fully filled
const QUANTITY_EPSILON: f64 = 1e-9;

/// Upper bound on partial-fill continuation legs per decision
const MAX_LEGS: u32 = 4;

/// Outcome of one order leg
#[derive(Debug)]
enum LegOutcome {
    /// Confirmed fill (possibly partial) — quantity and average price
    Filled { quantity: f64, price: f64 },
    /// Exchange refused the order; no retry
    Rejected { reason: String },
    /// Cancelled with nothing filled
    Cancelled,
}

/// Executes decisions against the exchange gateway
pub struct OrderExecutor {
    gateway: Arc<dyn ExchangeGateway>,
    retry: RetryConfig,
}

impl OrderExecutor {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, retry: RetryConfig) -> Self {
        Self { gateway, retry }
    }

    /// Execute a decision, appending one trade per confirmed fill.
    ///
    /// Hold decisions are a no-op. Returns the appended trades; an
    /// `OrderAbandoned` error means the retry budget ran out with no
    /// terminal outcome (already-appended partial fills are kept — the
    /// ledger, not this attempt, is the source of truth).
    pub async fn execute(&self, decision: &Decision, ledger: &mut TradeLedger) -> Result<Vec<Trade>> {
        let side = match decision.action {
            Action::Buy => OrderSide::Buy,
            Action::Sell => OrderSide::Sell,
            Action::Hold => return Ok(Vec::new()),
        };

        let parent_id = Uuid::new_v4();
        let mut remaining = decision.quantity;
        let mut trades = Vec::new();

        for leg in 0..MAX_LEGS {
            if remaining <= QUANTITY_EPSILON {
                break;
            }
            let client_order_id = format!("{parent_id}-{leg}");
            let request = OrderRequest::market(
                client_order_id.clone(),
                decision.instrument.clone(),
                side,
                remaining,
            );

            match self.run_leg(request).await? {
                LegOutcome::Filled { quantity, price } => {
                    let trade = ledger.append(
                        &client_order_id,
                        &decision.instrument,
                        side,
                        quantity,
                        price,
                        Utc::now(),
                    )?;
                    info!(
                        instrument = %decision.instrument,
                        client_order_id = %client_order_id,
                        side = %side,
                        filled_quantity = quantity,
                        fill_price = price,
                        trade_id = trade.trade_id,
                        reason = %decision.reason,
                        "Fill confirmed and recorded"
                    );
                    trades.push(trade);
                    remaining -= quantity;
                }
                LegOutcome::Rejected { reason } => {
                    warn!(
                        instrument = %decision.instrument,
                        client_order_id = %client_order_id,
                        reason = %reason,
                        "Order rejected, dropping decision"
                    );
                    break;
                }
                LegOutcome::Cancelled => {
                    warn!(
                        instrument = %decision.instrument,
                        client_order_id = %client_order_id,
                        "Order cancelled with no fill, dropping decision"
                    );
                    break;
                }
            }
        }

        Ok(trades)
    }

    /// Drive a single leg to a terminal outcome.
    ///
    /// The client_order_id is fixed for the whole leg: a retry after a
    /// confirmed never-received submission reuses it (the exchange
    /// de-duplicates), and nothing is ever resubmitted while the id may
    /// still be live.
    async fn run_leg(&self, request: OrderRequest) -> Result<LegOutcome> {
        let id = request.client_order_id.clone();

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                self.retry.wait(attempt - 1).await;
            }

            match self.gateway.submit_order(request.clone()).await {
                Ok(ack) => return self.settle(ack).await,
                Err(e) if e.is_transient() => {
                    debug!(
                        client_order_id = %id,
                        attempt,
                        error = %e,
                        "Ambiguous submit outcome, reconciling by id"
                    );
                    // The order may have reached the exchange. Query before
                    // assuming failure.
                    match self.reconcile(&id).await? {
                        Some(ack) => return self.settle(ack).await,
                        // Confirmed never-received: the same id is safe to
                        // resubmit and dedupes if we are wrong.
                        None => continue,
                    }
                }
                Err(crate::gateway::errors::GatewayError::Rejected(reason)) => {
                    return Ok(LegOutcome::Rejected { reason });
                }
                Err(e) => {
                    return Ok(LegOutcome::Rejected {
                        reason: e.to_string(),
                    });
                }
            }
        }

        Err(AppError::OrderAbandoned {
            client_order_id: id,
            attempts: self.retry.max_attempts,
        })
    }

    /// Poll a live order until it reaches a terminal status.
    async fn settle(&self, mut ack: OrderAck) -> Result<LegOutcome> {
        let id = ack.client_order_id.clone();

        for attempt in 0..self.retry.max_attempts {
            match ack.status {
                OrderStatus::Filled => {
                    return Ok(LegOutcome::Filled {
                        quantity: ack.filled_quantity,
                        price: ack.fill_price,
                    });
                }
                // The gateway reports PartiallyFilled only once the order is
                // closed (unfilled remainder cancelled), so the reported
                // quantity is final for this leg.
                OrderStatus::PartiallyFilled => {
                    return Ok(LegOutcome::Filled {
                        quantity: ack.filled_quantity,
                        price: ack.fill_price,
                    });
                }
                OrderStatus::Rejected => {
                    return Ok(LegOutcome::Rejected {
                        reason: "exchange rejected order".to_string(),
                    });
                }
                OrderStatus::Cancelled => {
                    if ack.filled_quantity > QUANTITY_EPSILON {
                        return Ok(LegOutcome::Filled {
                            quantity: ack.filled_quantity,
                            price: ack.fill_price,
                        });
                    }
                    return Ok(LegOutcome::Cancelled);
                }
                OrderStatus::Pending | OrderStatus::Accepted | OrderStatus::Unknown => {
                    self.retry.wait(attempt).await;
                    match self.reconcile(&id).await? {
                        Some(latest) => ack = latest,
                        None => {
                            // The exchange lost track of an order it acked.
                            // Treat as unknown and keep polling.
                            debug!(client_order_id = %id, "Status query returned no record");
                        }
                    }
                }
            }
        }

        Err(AppError::OrderAbandoned {
            client_order_id: id,
            attempts: self.retry.max_attempts,
        })
    }

    /// Query order status by id, retrying transient query failures.
    async fn reconcile(&self, client_order_id: &str) -> Result<Option<OrderAck>> {
        let mut last_transient = None;
        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                self.retry.wait(attempt - 1).await;
            }
            match self.gateway.get_order(client_order_id).await {
                Ok(ack) => return Ok(ack),
                Err(e) if e.is_transient() => {
                    last_transient = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        warn!(
            client_order_id,
            error = %last_transient.map(|e| e.to_string()).unwrap_or_default(),
            "Could not reconcile order status"
        );
        Err(AppError::OrderAbandoned {
            client_order_id: client_order_id.to_string(),
            attempts: self.retry.max_attempts,
        })
    }
}

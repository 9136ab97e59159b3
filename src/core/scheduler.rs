//! Tick scheduler
//!
//! Drives the recurring control cycle: refresh cache entries for every
//! configured instrument (concurrently across instruments, serially within
//! one), evaluate the strategy against the latest reconstructed position,
//! execute any non-Hold decision, fold confirmed fills into position state,
//! then update the heartbeat.
//!
//! Ticks never overlap: the interval uses delay-on-miss semantics and the
//! next tick is not polled until the current one has fully settled,
//! including the executor's retry sequence. Shutdown is cooperative and
//! observed at tick boundaries only, so no order is ever abandoned in an
//! unknown state by cancellation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::MarketHours;
use crate::core::events::{log_event, TradingEvent};
use crate::core::heartbeat::Heartbeat;
use crate::error::Result;
use crate::executor::OrderExecutor;
use crate::ledger::{Position, TradeLedger};
use crate::market::{CacheStore, CachedBar, HistoricalStore};
use crate::strategy::{evaluate_guarded, EvalContext, RiskLimits, Strategy};

/// Cache sweep cadence, in ticks
const SWEEP_EVERY_TICKS: u64 = 60;

pub struct Scheduler {
    instruments: Vec<String>,
    tick_interval: std::time::Duration,
    refresh_concurrency: usize,
    market_hours: Option<MarketHours>,
    cache: Arc<CacheStore>,
    history: HistoricalStore,
    strategy: Box<dyn Strategy>,
    risk: RiskLimits,
    executor: OrderExecutor,
    ledger: TradeLedger,
    heartbeat: Heartbeat,
    /// Process-scoped position state, hydrated from the ledger at startup
    /// and kept in lockstep with it afterwards
    positions: HashMap<String, Position>,
    tick_count: u64,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instruments: Vec<String>,
        tick_interval: std::time::Duration,
        refresh_concurrency: usize,
        market_hours: Option<MarketHours>,
        cache: Arc<CacheStore>,
        history: HistoricalStore,
        strategy: Box<dyn Strategy>,
        risk: RiskLimits,
        executor: OrderExecutor,
        ledger: TradeLedger,
        heartbeat: Heartbeat,
    ) -> Self {
        let positions = ledger.reconstruct_positions();
        for position in positions.values() {
            if !position.is_flat() {
                info!(
                    instrument = %position.instrument,
                    quantity = position.quantity,
                    average_entry_price = position.average_entry_price,
                    "Position hydrated from ledger"
                );
            }
        }
        Self {
            instruments,
            tick_interval,
            refresh_concurrency,
            market_hours,
            cache,
            history,
            strategy,
            risk,
            executor,
            ledger,
            heartbeat,
            positions,
            tick_count: 0,
        }
    }

    /// Run the tick loop until a shutdown signal arrives.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(
            instruments = self.instruments.len(),
            strategy = self.strategy.name(),
            tick_interval_secs = self.tick_interval.as_secs(),
            "Scheduler starting"
        );
        log_event(&TradingEvent::bot_started(self.instruments.len()));

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Shutdown is only observed here, between fully settled ticks
                _ = shutdown_rx.recv() => {
                    log_event(&TradingEvent::bot_shutdown("shutdown_signal"));
                    break;
                }
                _ = interval.tick() => {
                    self.tick(Utc::now()).await;
                }
            }
        }
        Ok(())
    }

    /// One full cycle across all configured instruments.
    pub async fn tick(&mut self, now: DateTime<Utc>) {
        let started = Instant::now();
        let tick = self.tick_count;
        self.tick_count += 1;

        if let Some(hours) = &self.market_hours {
            if !hours.is_open(now) {
                log_event(&TradingEvent::tick_skipped(tick, "market-closed"));
                self.beat(tick, now);
                return;
            }
        }

        // Phase 1: refresh, bounded concurrency across instruments.
        // Within one instrument the refresh is a single sequential call.
        let lookback = self.strategy.lookback();
        let cache = Arc::clone(&self.cache);
        let fetched: Vec<(String, Result<Vec<CachedBar>>)> =
            stream::iter(self.instruments.clone())
                .map(|instrument| {
                    let cache = Arc::clone(&cache);
                    async move {
                        let bars = cache.get(&instrument, lookback, now).await;
                        (instrument, bars)
                    }
                })
                .buffer_unordered(self.refresh_concurrency)
                .collect()
                .await;
        let mut by_instrument: HashMap<String, Result<Vec<CachedBar>>> =
            fetched.into_iter().collect();

        // Phase 2+3: evaluate and execute, serially, in configured order.
        // One instrument's failure never aborts the others.
        for instrument in self.instruments.clone() {
            match by_instrument.remove(instrument.as_str()) {
                Some(Ok(bars)) => {
                    if let Err(e) = self.evaluate_and_execute(&instrument, &bars, now).await {
                        error!(
                            instrument = %instrument,
                            error = %e,
                            "Instrument tick work failed"
                        );
                        log_event(&TradingEvent::instrument_skipped(
                            &instrument,
                            &e.to_string(),
                        ));
                    }
                }
                Some(Err(e)) => {
                    error!(instrument = %instrument, error = %e, "Cache refresh failed");
                    log_event(&TradingEvent::instrument_skipped(&instrument, &e.to_string()));
                }
                None => {}
            }
        }

        // Phase 4: housekeeping
        if tick % SWEEP_EVERY_TICKS == 0 {
            if let Err(e) = self.cache.evict_expired(now).await {
                warn!(error = %e, "Cache sweep failed");
            }
        }
        self.beat(tick, now);

        log_event(&TradingEvent::tick_completed(
            tick,
            started.elapsed().as_millis() as u64,
        ));
    }

    async fn evaluate_and_execute(
        &mut self,
        instrument: &str,
        bars: &[CachedBar],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let history = match self.history.backfill(instrument, self.strategy.warmup()) {
            Ok(history) => history,
            Err(e) => {
                // Conservative fallback: evaluate with no archive; the
                // strategy holds if the window is too short.
                warn!(instrument, error = %e, "Historical backfill failed");
                Vec::new()
            }
        };

        let position = self
            .positions
            .get(instrument)
            .cloned()
            .unwrap_or_else(|| Position::flat(instrument));
        let ctx = EvalContext {
            instrument,
            position: &position,
            recent: bars,
            history: &history,
            now,
            position_opened_at: self.ledger.position_opened_at(instrument),
        };

        let decision = evaluate_guarded(self.strategy.as_ref(), &ctx);
        let decision = self.risk.clamp(decision, &position);
        log_event(&TradingEvent::decision_made(
            instrument,
            &decision.action.to_string(),
            decision.quantity,
            &decision.reason,
        ));
        if decision.is_hold() {
            return Ok(());
        }

        let trades = self.executor.execute(&decision, &mut self.ledger).await?;
        for trade in &trades {
            let position = self
                .positions
                .entry(trade.instrument.clone())
                .or_insert_with(|| Position::flat(trade.instrument.clone()));
            position.apply(trade.side, trade.filled_quantity, trade.fill_price);
            log_event(&TradingEvent::trade_recorded(
                &trade.instrument,
                &decision.action.to_string(),
                trade.filled_quantity,
                trade.fill_price,
                trade.trade_id,
            ));
        }
        Ok(())
    }

    fn beat(&self, tick: u64, now: DateTime<Utc>) {
        if let Err(e) = self.heartbeat.beat(tick, self.instruments.len(), now) {
            // Liveness reporting must not take down trading
            warn!(error = %e, "Heartbeat update failed");
        }
    }

    /// Current position for an instrument (flat if never traded)
    pub fn position(&self, instrument: &str) -> Position {
        self.positions
            .get(instrument)
            .cloned()
            .unwrap_or_else(|| Position::flat(instrument))
    }

    pub fn ledger(&self) -> &TradeLedger {
        &self.ledger
    }
}

//! Structured trading events
//!
//! Every material state transition is logged through one consistent schema
//! so a timeline can be reconstructed from the log stream alone. Events
//! are emitted as structured `tracing` fields, not free-form messages.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

/// Current Unix time in milliseconds
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Trading event types for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingEventType {
    // Scheduler events
    TickCompleted,
    TickSkipped,

    // Decision / trade events
    DecisionMade,
    TradeRecorded,
    InstrumentSkipped,

    // Process lifecycle
    BotStarted,
    BotShutdown,
}

impl fmt::Display for TradingEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingEventType::TickCompleted => write!(f, "TICK_COMPLETED"),
            TradingEventType::TickSkipped => write!(f, "TICK_SKIPPED"),
            TradingEventType::DecisionMade => write!(f, "DECISION_MADE"),
            TradingEventType::TradeRecorded => write!(f, "TRADE_RECORDED"),
            TradingEventType::InstrumentSkipped => write!(f, "INSTRUMENT_SKIPPED"),
            TradingEventType::BotStarted => write!(f, "BOT_STARTED"),
            TradingEventType::BotShutdown => write!(f, "BOT_SHUTDOWN"),
        }
    }
}

/// Trading event with context fields for structured logging
#[derive(Debug, Clone)]
pub struct TradingEvent {
    pub event_type: TradingEventType,
    pub timestamp_ms: u64,
    pub instrument: Option<String>,
    pub action: Option<String>,
    pub quantity: Option<f64>,
    pub reason: Option<String>,
    pub trade_id: Option<u64>,
    pub fill_price: Option<f64>,
    pub tick: Option<u64>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

impl TradingEvent {
    fn new(event_type: TradingEventType) -> Self {
        Self {
            event_type,
            timestamp_ms: current_timestamp_ms(),
            instrument: None,
            action: None,
            quantity: None,
            reason: None,
            trade_id: None,
            fill_price: None,
            tick: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn tick_completed(tick: u64, duration_ms: u64) -> Self {
        let mut event = Self::new(TradingEventType::TickCompleted);
        event.tick = Some(tick);
        event.duration_ms = Some(duration_ms);
        event
    }

    pub fn tick_skipped(tick: u64, reason: &str) -> Self {
        let mut event = Self::new(TradingEventType::TickSkipped);
        event.tick = Some(tick);
        event.reason = Some(reason.to_string());
        event
    }

    pub fn decision_made(instrument: &str, action: &str, quantity: f64, reason: &str) -> Self {
        let mut event = Self::new(TradingEventType::DecisionMade);
        event.instrument = Some(instrument.to_string());
        event.action = Some(action.to_string());
        event.quantity = Some(quantity);
        event.reason = Some(reason.to_string());
        event
    }

    pub fn trade_recorded(
        instrument: &str,
        action: &str,
        quantity: f64,
        fill_price: f64,
        trade_id: u64,
    ) -> Self {
        let mut event = Self::new(TradingEventType::TradeRecorded);
        event.instrument = Some(instrument.to_string());
        event.action = Some(action.to_string());
        event.quantity = Some(quantity);
        event.fill_price = Some(fill_price);
        event.trade_id = Some(trade_id);
        event
    }

    pub fn instrument_skipped(instrument: &str, error: &str) -> Self {
        let mut event = Self::new(TradingEventType::InstrumentSkipped);
        event.instrument = Some(instrument.to_string());
        event.error = Some(error.to_string());
        event
    }

    pub fn bot_started(instruments: usize) -> Self {
        let mut event = Self::new(TradingEventType::BotStarted);
        event.quantity = Some(instruments as f64);
        event
    }

    pub fn bot_shutdown(reason: &str) -> Self {
        let mut event = Self::new(TradingEventType::BotShutdown);
        event.reason = Some(reason.to_string());
        event
    }
}

/// Emit an event through tracing with a consistent field schema.
/// Tick completions and decisions are routine; everything else is info.
pub fn log_event(event: &TradingEvent) {
    match event.event_type {
        TradingEventType::TickCompleted | TradingEventType::DecisionMade => {
            debug!(
                event_type = %event.event_type,
                timestamp_ms = event.timestamp_ms,
                instrument = event.instrument.as_deref().unwrap_or(""),
                action = event.action.as_deref().unwrap_or(""),
                quantity = event.quantity.unwrap_or(0.0),
                reason = event.reason.as_deref().unwrap_or(""),
                tick = event.tick.unwrap_or(0),
                duration_ms = event.duration_ms.unwrap_or(0),
                "trading event"
            );
        }
        _ => {
            info!(
                event_type = %event.event_type,
                timestamp_ms = event.timestamp_ms,
                instrument = event.instrument.as_deref().unwrap_or(""),
                action = event.action.as_deref().unwrap_or(""),
                quantity = event.quantity.unwrap_or(0.0),
                reason = event.reason.as_deref().unwrap_or(""),
                trade_id = event.trade_id.unwrap_or(0),
                fill_price = event.fill_price.unwrap_or(0.0),
                tick = event.tick.unwrap_or(0),
                error = event.error.as_deref().unwrap_or(""),
                "trading event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_display_names() {
        assert_eq!(TradingEventType::TickCompleted.to_string(), "TICK_COMPLETED");
        assert_eq!(TradingEventType::TradeRecorded.to_string(), "TRADE_RECORDED");
        assert_eq!(TradingEventType::BotShutdown.to_string(), "BOT_SHUTDOWN");
    }

    #[test]
    fn test_decision_made_factory() {
        let event = TradingEvent::decision_made("AAPL", "BUY", 10.0, "fast-over-slow");
        assert_eq!(event.event_type, TradingEventType::DecisionMade);
        assert_eq!(event.instrument.as_deref(), Some("AAPL"));
        assert_eq!(event.action.as_deref(), Some("BUY"));
        assert_eq!(event.quantity, Some(10.0));
        assert!(event.timestamp_ms > 0);
    }

    #[test]
    fn test_trade_recorded_factory() {
        let event = TradingEvent::trade_recorded("AAPL", "SELL", 5.0, 187.25, 42);
        assert_eq!(event.trade_id, Some(42));
        assert_eq!(event.fill_price, Some(187.25));
    }

    #[test]
    fn test_tick_completed_factory() {
        let event = TradingEvent::tick_completed(7, 1200);
        assert_eq!(event.tick, Some(7));
        assert_eq!(event.duration_ms, Some(1200));
        assert!(event.instrument.is_none());
    }

    #[test]
    fn test_log_event_does_not_panic() {
        log_event(&TradingEvent::bot_started(3));
        log_event(&TradingEvent::instrument_skipped("AAPL", "gateway down"));
        log_event(&TradingEvent::tick_completed(1, 10));
    }
}

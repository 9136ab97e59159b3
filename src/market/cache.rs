//! Market-data cache with TTL-based staleness
//!
//! The cache store sits between the scheduler and the market data gateway.
//! `get()` returns the requested lookback window of bars, refreshing any
//! bucket that is missing or stale before returning. A transient fetch
//! failure degrades the result (stale bars are served tagged `Degraded`)
//! instead of failing the call, so the strategy engine can fall back to
//! Hold; permanent failures propagate to the caller.
//!
//! Observed bars are spilled to per-instrument JSONL files under the cache
//! directory and warmed from them at startup. The on-disk layout is an
//! implementation detail, not an interface.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::Result;
use crate::gateway::MarketDataGateway;
use crate::market::bar::PriceBar;

/// Freshness tag attached to every bar served by the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Freshness {
    /// Entry is within its TTL
    Fresh,
    /// Entry is past its TTL but refresh failed; serve with caution
    Degraded,
}

/// A price bar as served by the cache, tagged with its freshness
#[derive(Debug, Clone)]
pub struct CachedBar {
    pub bar: PriceBar,
    pub fetched_at: DateTime<Utc>,
    pub freshness: Freshness,
}

impl CachedBar {
    pub fn is_fresh(&self) -> bool {
        self.freshness == Freshness::Fresh
    }
}

/// On-disk spill record: bar plus its fetch timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SpillRecord {
    bar: PriceBar,
    fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Entry {
    bar: PriceBar,
    fetched_at: DateTime<Utc>,
}

/// Cache store: instrument -> bucket start (epoch seconds) -> entry
pub struct CacheStore {
    gateway: Arc<dyn MarketDataGateway>,
    inner: RwLock<HashMap<String, BTreeMap<i64, Entry>>>,
    /// Per-instrument TTL, resolved from instrument class at config time
    ttls: HashMap<String, Duration>,
    default_ttl: Duration,
    bucket_secs: i64,
    /// Number of buckets retained per instrument before the sweep evicts
    retention_bars: usize,
    dir: Option<PathBuf>,
}

impl CacheStore {
    pub fn new(
        gateway: Arc<dyn MarketDataGateway>,
        ttls: HashMap<String, Duration>,
        default_ttl: Duration,
        bucket_secs: i64,
        retention_bars: usize,
        dir: Option<PathBuf>,
    ) -> Self {
        Self {
            gateway,
            inner: RwLock::new(HashMap::new()),
            ttls,
            default_ttl,
            bucket_secs,
            retention_bars,
            dir,
        }
    }

    fn ttl_for(&self, instrument: &str) -> Duration {
        self.ttls
            .get(instrument)
            .copied()
            .unwrap_or(self.default_ttl)
    }

    /// Align a timestamp down to the start of its bucket.
    fn align(&self, ts: DateTime<Utc>) -> i64 {
        let secs = ts.timestamp();
        secs - secs.rem_euclid(self.bucket_secs)
    }

    /// Insert a single validated bar, stamped with `now` as fetch time.
    pub async fn put(&self, bar: PriceBar, now: DateTime<Utc>) -> Result<()> {
        bar.validate()?;
        let key = self.align(bar.bucket_start);
        let instrument = bar.instrument.clone();
        {
            let mut inner = self.inner.write().await;
            inner.entry(instrument).or_default().insert(
                key,
                Entry {
                    bar,
                    fetched_at: now,
                },
            );
        }
        Ok(())
    }

    /// Return the `lookback` most recent complete buckets for `instrument`,
    /// refreshing missing or stale buckets through the gateway first.
    ///
    /// Missing buckets stay absent in the result (gaps are not synthesized);
    /// entries that could not be refreshed are tagged `Degraded`.
    pub async fn get(
        &self,
        instrument: &str,
        lookback: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<CachedBar>> {
        let ttl = self.ttl_for(instrument);
        let current_bucket = self.align(now);
        let window_start = current_bucket - self.bucket_secs * lookback as i64;

        let needs_refresh = {
            let inner = self.inner.read().await;
            let by_bucket = inner.get(instrument);
            (0..lookback).any(|i| {
                let key = window_start + self.bucket_secs * i as i64;
                match by_bucket.and_then(|m| m.get(&key)) {
                    Some(entry) => now - entry.fetched_at >= ttl,
                    None => true,
                }
            })
        };

        let mut refresh_failed = false;
        if needs_refresh {
            let start = Utc
                .timestamp_opt(window_start, 0)
                .single()
                .unwrap_or(now - Duration::seconds(self.bucket_secs * lookback as i64));
            match self.gateway.fetch(instrument, start, now).await {
                Ok(bars) => {
                    let mut fetched = 0usize;
                    for bar in bars {
                        if bar.instrument != instrument {
                            continue;
                        }
                        if let Err(e) = bar.validate() {
                            warn!(instrument, error = %e, "Discarding invalid bar from gateway");
                            continue;
                        }
                        self.put(bar, now).await?;
                        fetched += 1;
                    }
                    self.spill(instrument).await?;
                    debug!(instrument, bars = fetched, "Cache refreshed");
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        instrument,
                        error = %e,
                        "Transient fetch failure, serving cached data as degraded"
                    );
                    refresh_failed = true;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let inner = self.inner.read().await;
        let by_bucket = match inner.get(instrument) {
            Some(m) => m,
            None => return Ok(Vec::new()),
        };
        let mut out = Vec::with_capacity(lookback);
        for i in 0..lookback {
            let key = window_start + self.bucket_secs * i as i64;
            if let Some(entry) = by_bucket.get(&key) {
                let fresh = !refresh_failed && now - entry.fetched_at < ttl;
                out.push(CachedBar {
                    bar: entry.bar.clone(),
                    fetched_at: entry.fetched_at,
                    freshness: if fresh {
                        Freshness::Fresh
                    } else {
                        Freshness::Degraded
                    },
                });
            }
        }
        Ok(out)
    }

    /// Periodic sweep: drop buckets older than the retention window.
    /// Returns the number of entries evicted. Also compacts the spill
    /// files so they do not grow without bound.
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let horizon = self.align(now) - self.bucket_secs * self.retention_bars as i64;
        let mut evicted = 0usize;
        let instruments: Vec<String> = {
            let mut inner = self.inner.write().await;
            for by_bucket in inner.values_mut() {
                let keep = by_bucket.split_off(&horizon);
                evicted += by_bucket.len();
                *by_bucket = keep;
            }
            inner.keys().cloned().collect()
        };
        if evicted > 0 {
            for instrument in &instruments {
                self.spill(instrument).await?;
            }
            debug!(evicted, "Cache sweep complete");
        }
        Ok(evicted)
    }

    /// Number of cached entries across all instruments (for stats logging).
    pub async fn len(&self) -> usize {
        self.inner.read().await.values().map(|m| m.len()).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Warm the cache from the spill files for the given instruments.
    /// A torn final line (crash during append) is discarded with a warning;
    /// entries past the retention window are dropped on load.
    pub async fn warm(&self, instruments: &[String], now: DateTime<Utc>) -> Result<usize> {
        let dir = match &self.dir {
            Some(d) => d.clone(),
            None => return Ok(0),
        };
        let horizon = self.align(now) - self.bucket_secs * self.retention_bars as i64;
        let mut loaded = 0usize;
        for instrument in instruments {
            let path = dir.join(format!("{instrument}.jsonl"));
            let contents = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let mut inner = self.inner.write().await;
            let by_bucket = inner.entry(instrument.clone()).or_default();
            for (idx, line) in contents.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<SpillRecord>(line) {
                    Ok(rec) => {
                        let key = self.align(rec.bar.bucket_start);
                        if key < horizon || rec.bar.validate().is_err() {
                            continue;
                        }
                        by_bucket.insert(
                            key,
                            Entry {
                                bar: rec.bar,
                                fetched_at: rec.fetched_at,
                            },
                        );
                        loaded += 1;
                    }
                    Err(e) => {
                        // Torn trailing line from a crash mid-append is
                        // expected; anything else is quarantined the same way.
                        warn!(
                            instrument = %instrument,
                            line = idx + 1,
                            error = %e,
                            "Skipping unreadable cache record"
                        );
                    }
                }
            }
        }
        Ok(loaded)
    }

    /// Rewrite the spill file for one instrument from the in-memory state.
    async fn spill(&self, instrument: &str) -> Result<()> {
        let dir = match &self.dir {
            Some(d) => d.clone(),
            None => return Ok(()),
        };
        std::fs::create_dir_all(&dir)?;
        let records: Vec<SpillRecord> = {
            let inner = self.inner.read().await;
            match inner.get(instrument) {
                Some(by_bucket) => by_bucket
                    .values()
                    .map(|e| SpillRecord {
                        bar: e.bar.clone(),
                        fetched_at: e.fetched_at,
                    })
                    .collect(),
                None => Vec::new(),
            }
        };
        let path = dir.join(format!("{instrument}.jsonl"));
        let mut buf = Vec::with_capacity(records.len() * 128);
        for rec in &records {
            serde_json::to_writer(&mut buf, rec)?;
            buf.push(b'\n');
        }
        let mut file = std::fs::File::create(&path)?;
        file.write_all(&buf)?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::errors::{GatewayError, GatewayResult};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BUCKET: i64 = 60;

    /// Mock market data gateway with scriptable outcomes
    struct MockMarketData {
        bars: Vec<PriceBar>,
        fail_transient: bool,
        fail_permanent: bool,
        fetch_count: AtomicUsize,
    }

    impl MockMarketData {
        fn with_bars(bars: Vec<PriceBar>) -> Self {
            Self {
                bars,
                fail_transient: false,
                fail_permanent: false,
                fetch_count: AtomicUsize::new(0),
            }
        }

        fn failing_transient() -> Self {
            Self {
                bars: Vec::new(),
                fail_transient: true,
                fail_permanent: false,
                fetch_count: AtomicUsize::new(0),
            }
        }

        fn failing_permanent() -> Self {
            Self {
                bars: Vec::new(),
                fail_transient: false,
                fail_permanent: true,
                fetch_count: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MarketDataGateway for MockMarketData {
        async fn fetch(
            &self,
            instrument: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> GatewayResult<Vec<PriceBar>> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            if self.fail_transient {
                return Err(GatewayError::Timeout(3000));
            }
            if self.fail_permanent {
                return Err(GatewayError::InvalidResponse("bad payload".into()));
            }
            Ok(self
                .bars
                .iter()
                .filter(|b| {
                    b.instrument == instrument && b.bucket_start >= start && b.bucket_start < end
                })
                .cloned()
                .collect())
        }

        fn gateway_name(&self) -> &'static str {
            "mock"
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap()
    }

    fn bar_at(offset_buckets: i64) -> PriceBar {
        PriceBar {
            instrument: "XYZ".to_string(),
            bucket_start: t0() + Duration::seconds(BUCKET * offset_buckets),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 10.0,
        }
    }

    fn store(gateway: Arc<dyn MarketDataGateway>) -> CacheStore {
        CacheStore::new(
            gateway,
            HashMap::new(),
            Duration::seconds(120),
            BUCKET,
            100,
            None,
        )
    }

    #[tokio::test]
    async fn test_get_refreshes_missing_buckets() {
        let bars: Vec<PriceBar> = (0..5).map(bar_at).collect();
        let gateway = Arc::new(MockMarketData::with_bars(bars));
        let cache = store(gateway.clone());

        let now = t0() + Duration::seconds(BUCKET * 5);
        let result = cache.get("XYZ", 5, now).await.unwrap();
        assert_eq!(result.len(), 5);
        assert!(result.iter().all(|b| b.is_fresh()));
        assert_eq!(gateway.fetch_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_serves_cached_without_refetch() {
        let bars: Vec<PriceBar> = (0..5).map(bar_at).collect();
        let gateway = Arc::new(MockMarketData::with_bars(bars));
        let cache = store(gateway.clone());

        let now = t0() + Duration::seconds(BUCKET * 5);
        cache.get("XYZ", 5, now).await.unwrap();
        // Second call within TTL must not hit the gateway again
        cache.get("XYZ", 5, now).await.unwrap();
        assert_eq!(gateway.fetch_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_serves_degraded() {
        let gateway = Arc::new(MockMarketData::with_bars(
            (0..5).map(bar_at).collect::<Vec<_>>(),
        ));
        let cache = store(gateway);
        let now = t0() + Duration::seconds(BUCKET * 5);
        cache.get("XYZ", 5, now).await.unwrap();

        // Age the entries past TTL and swap in a gateway that times out
        let failing = Arc::new(MockMarketData::failing_transient());
        let aged = now + Duration::seconds(600);
        let cache = CacheStore {
            gateway: failing,
            inner: RwLock::new(cache.inner.into_inner()),
            ttls: HashMap::new(),
            default_ttl: Duration::seconds(120),
            bucket_secs: BUCKET,
            retention_bars: 100,
            dir: None,
        };
        let result = cache.get("XYZ", 20, aged).await.unwrap();
        assert!(!result.is_empty());
        assert!(result.iter().all(|b| b.freshness == Freshness::Degraded));
    }

    #[tokio::test]
    async fn test_permanent_failure_propagates() {
        let gateway = Arc::new(MockMarketData::failing_permanent());
        let cache = store(gateway);
        let now = t0() + Duration::seconds(BUCKET * 5);
        let result = cache.get("XYZ", 5, now).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_buckets_are_absent_not_synthesized() {
        // Gateway only has bars 0, 1 and 3 — bucket 2 is a gap
        let bars = vec![bar_at(0), bar_at(1), bar_at(3)];
        let gateway = Arc::new(MockMarketData::with_bars(bars));
        let cache = store(gateway);
        let now = t0() + Duration::seconds(BUCKET * 4);
        let result = cache.get("XYZ", 4, now).await.unwrap();
        assert_eq!(result.len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_bar_from_gateway_is_discarded() {
        let mut bad = bar_at(0);
        bad.high = bad.low - 1.0;
        let gateway = Arc::new(MockMarketData::with_bars(vec![bad, bar_at(1)]));
        let cache = store(gateway);
        let now = t0() + Duration::seconds(BUCKET * 2);
        let result = cache.get("XYZ", 2, now).await.unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn test_evict_expired_sweeps_old_buckets() {
        let gateway = Arc::new(MockMarketData::with_bars(Vec::new()));
        let cache = CacheStore::new(
            gateway,
            HashMap::new(),
            Duration::seconds(120),
            BUCKET,
            2,
            None,
        );
        let now = t0() + Duration::seconds(BUCKET * 10);
        for i in 0..5 {
            cache.put(bar_at(i), now).await.unwrap();
        }
        assert_eq!(cache.len().await, 5);
        let evicted = cache.evict_expired(now).await.unwrap();
        assert_eq!(evicted, 5);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_warm_from_spill_files() {
        let tmp = tempfile::tempdir().unwrap();
        let now = t0() + Duration::seconds(BUCKET * 5);
        {
            let gateway = Arc::new(MockMarketData::with_bars((0..5).map(bar_at).collect()));
            let cache = CacheStore::new(
                gateway,
                HashMap::new(),
                Duration::seconds(120),
                BUCKET,
                100,
                Some(tmp.path().to_path_buf()),
            );
            cache.get("XYZ", 5, now).await.unwrap();
        }
        // New store warms from disk without touching the gateway
        let gateway = Arc::new(MockMarketData::with_bars(Vec::new()));
        let cache = CacheStore::new(
            gateway.clone(),
            HashMap::new(),
            Duration::seconds(120),
            BUCKET,
            100,
            Some(tmp.path().to_path_buf()),
        );
        let loaded = cache.warm(&["XYZ".to_string()], now).await.unwrap();
        assert_eq!(loaded, 5);
        assert_eq!(gateway.fetch_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_warm_skips_torn_trailing_line() {
        let tmp = tempfile::tempdir().unwrap();
        let now = t0() + Duration::seconds(BUCKET);
        let rec = SpillRecord {
            bar: bar_at(0),
            fetched_at: now,
        };
        let mut contents = serde_json::to_string(&rec).unwrap();
        contents.push('\n');
        contents.push_str("{\"bar\":{\"instrument\":\"XYZ\""); // torn write
        std::fs::write(tmp.path().join("XYZ.jsonl"), contents).unwrap();

        let gateway = Arc::new(MockMarketData::with_bars(Vec::new()));
        let cache = CacheStore::new(
            gateway,
            HashMap::new(),
            Duration::seconds(120),
            BUCKET,
            100,
            Some(tmp.path().to_path_buf()),
        );
        let loaded = cache.warm(&["XYZ".to_string()], now).await.unwrap();
        assert_eq!(loaded, 1);
    }
}

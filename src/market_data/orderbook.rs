// =============================================================================
// Order Book Store — live ladders, metrics and calibration per symbol
// =============================================================================
//
// Each accepted update replaces the symbol's snapshot wholesale, recomputes
// the microstructure metrics against the thresholds currently in force, and
// folds the snapshot into the calibration window. All three steps run under
// one write lock, so metrics are never computed against a snapshot other
// than the one just stored.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};

use crate::app_state::AppState;
use crate::market_data::calibration::{CalibrationEngine, DynamicThresholds};
use crate::market_data::metrics::{compute_metrics, MicrostructureMetrics};
use crate::market_data::parse_string_f64;
use crate::types::{BookSide, PriceLevel};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Immutable full-depth view of one symbol's book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub symbol: String,
    /// Strictly descending by price.
    pub bids: Vec<PriceLevel>,
    /// Strictly ascending by price.
    pub asks: Vec<PriceLevel>,
    pub observed_at: DateTime<Utc>,
    /// Exchange sequence id, when the feed supplies one.
    pub last_update_id: Option<u64>,
}

impl OrderBookSnapshot {
    /// Build a snapshot from raw levels, normalising both ladders.
    pub fn from_levels(
        symbol: &str,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        last_update_id: Option<u64>,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            bids: normalize_ladder(bids, BookSide::Bid),
            asks: normalize_ladder(asks, BookSide::Ask),
            observed_at: Utc::now(),
            last_update_id,
        }
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }
}

/// Drop unusable levels, sort best-first and keep the first level seen at
/// each price.
pub fn normalize_ladder(mut levels: Vec<PriceLevel>, side: BookSide) -> Vec<PriceLevel> {
    levels.retain(PriceLevel::is_valid);
    match side {
        BookSide::Bid => levels.sort_by(|a, b| b.price.total_cmp(&a.price)),
        BookSide::Ask => levels.sort_by(|a, b| a.price.total_cmp(&b.price)),
    }
    levels.dedup_by(|later, kept| later.price == kept.price);
    levels
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// What happened to an incoming update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Snapshot replaced; carries the metrics derived from it.
    Applied(MicrostructureMetrics),
    /// Both sides empty. Nothing changed.
    Heartbeat,
    /// Snapshot replaced by a book with one empty side. Metrics are
    /// undefined until a two-sided book arrives.
    OneSided,
    /// Sequence id older than the stored one. Nothing changed.
    Stale,
}

/// Book-derived half of the indicator view, copied out atomically.
#[derive(Debug, Clone, Serialize)]
pub struct BookReading {
    pub observed_at: DateTime<Utc>,
    pub last_update_id: Option<u64>,
    pub metrics: MicrostructureMetrics,
}

#[derive(Debug, Clone)]
struct BookEntry {
    snapshot: OrderBookSnapshot,
    /// `None` while the stored book is one-sided.
    metrics: Option<MicrostructureMetrics>,
}

#[derive(Debug, Default)]
struct BookState {
    books: HashMap<String, BookEntry>,
    calibration: CalibrationEngine,
}

/// Owns the live snapshot of every symbol plus its calibration history.
pub struct OrderBookStore {
    inner: RwLock<BookState>,
}

impl OrderBookStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BookState::default()),
        }
    }

    /// Store with calibration state pre-created for `symbols`.
    pub fn with_symbols(symbols: &[String]) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write();
            for symbol in symbols {
                inner.calibration.register(symbol);
            }
        }
        store
    }

    /// Replace the snapshot for `symbol` with the given ladders.
    pub fn apply_update(
        &self,
        symbol: &str,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    ) -> UpdateOutcome {
        self.apply_sequenced(symbol, None, bids, asks)
    }

    /// Like [`apply_update`](Self::apply_update) but rejects updates whose
    /// `update_id` is lower than the one already stored. An update without an
    /// id keeps the stored id so later sequenced updates are still checked.
    pub fn apply_sequenced(
        &self,
        symbol: &str,
        update_id: Option<u64>,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    ) -> UpdateOutcome {
        let mut snapshot = OrderBookSnapshot::from_levels(symbol, bids, asks, update_id);
        if snapshot.bids.is_empty() && snapshot.asks.is_empty() {
            return UpdateOutcome::Heartbeat;
        }

        let mut inner = self.inner.write();

        let stored_id = inner.books.get(symbol).and_then(|e| e.snapshot.last_update_id);
        match (update_id, stored_id) {
            (Some(incoming), Some(stored)) if incoming < stored => {
                debug!(symbol, incoming, stored, "stale book update dropped");
                return UpdateOutcome::Stale;
            }
            (None, Some(stored)) => snapshot.last_update_id = Some(stored),
            _ => {}
        }

        let thresholds = inner.calibration.thresholds(symbol);
        let metrics = compute_metrics(&snapshot, &thresholds);
        if metrics.is_none() {
            debug!(symbol, "one-sided book stored, metrics undefined");
        }

        inner.calibration.fold(&snapshot);
        inner.books.insert(
            symbol.to_string(),
            BookEntry {
                snapshot,
                metrics: metrics.clone(),
            },
        );

        match metrics {
            Some(metrics) => UpdateOutcome::Applied(metrics),
            None => UpdateOutcome::OneSided,
        }
    }

    /// Copy of the current snapshot for `symbol`.
    pub fn current_snapshot(&self, symbol: &str) -> Option<OrderBookSnapshot> {
        self.inner.read().books.get(symbol).map(|e| e.snapshot.clone())
    }

    /// Metrics derived from the current snapshot, `None` while it is
    /// one-sided.
    pub fn metrics(&self, symbol: &str) -> Option<MicrostructureMetrics> {
        self.inner.read().books.get(symbol).and_then(|e| e.metrics.clone())
    }

    pub fn reading(&self, symbol: &str) -> Option<BookReading> {
        let inner = self.inner.read();
        let entry = inner.books.get(symbol)?;
        Some(BookReading {
            observed_at: entry.snapshot.observed_at,
            last_update_id: entry.snapshot.last_update_id,
            metrics: entry.metrics.clone()?,
        })
    }

    /// Thresholds that the next update for `symbol` will be measured against.
    pub fn thresholds(&self, symbol: &str) -> DynamicThresholds {
        self.inner.read().calibration.thresholds(symbol)
    }

    pub fn calibration_window_len(&self, symbol: &str) -> usize {
        self.inner.read().calibration.window_len(symbol)
    }
}

impl Default for OrderBookStore {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Depth WebSocket stream
// ---------------------------------------------------------------------------

/// One decoded depth message.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMessage {
    pub update_id: Option<u64>,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Connect to the Binance partial depth stream for `symbol` and feed every
/// message into the shared state.
///
/// `@depth20@100ms` delivers the top 20 levels of both sides on each message,
/// which matches the full-replacement model of the store.
///
/// Returns when the stream disconnects or errors so that the caller can
/// reconnect.
pub async fn run_depth_stream(symbol: &str, state: &Arc<AppState>) -> Result<()> {
    let lower = symbol.to_lowercase();
    let url = format!("wss://stream.binance.com:9443/ws/{lower}@depth20@100ms");
    info!(url = %url, symbol = %symbol, "connecting to depth WebSocket");

    let (ws_stream, _response) = connect_async(&url)
        .await
        .context("failed to connect to depth WebSocket")?;

    info!(symbol = %symbol, "depth WebSocket connected");
    let (_write, mut read) = ws_stream.split();

    loop {
        match read.next().await {
            Some(Ok(msg)) => {
                if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                    match parse_depth_message(&text) {
                        Ok(depth) => {
                            let outcome = state.apply_order_book_update_sequenced(
                                symbol,
                                depth.update_id,
                                depth.bids,
                                depth.asks,
                            );
                            if outcome == UpdateOutcome::Stale {
                                debug!(symbol = %symbol, "depth message out of sequence");
                            }
                        }
                        Err(e) => {
                            warn!(symbol = %symbol, error = %e, "failed to parse depth message");
                        }
                    }
                }
            }
            Some(Err(e)) => {
                error!(symbol = %symbol, error = %e, "depth WebSocket read error");
                return Err(e.into());
            }
            None => {
                warn!(symbol = %symbol, "depth WebSocket stream ended");
                return Ok(());
            }
        }
    }
}

/// Parse a Binance depth payload.
///
/// Accepts both the partial-depth shape
/// ```json
/// { "lastUpdateId": 12345, "bids": [["37000.00", "1.5"]], "asks": [["37001.00", "1.2"]] }
/// ```
/// and the diff-event shape (`u`, `b`, `a`). A side that is absent is read as
/// empty; a payload with neither side is rejected.
pub fn parse_depth_message(text: &str) -> Result<DepthMessage> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse depth JSON")?;

    let bids = root.get("bids").or_else(|| root.get("b"));
    let asks = root.get("asks").or_else(|| root.get("a"));
    if bids.is_none() && asks.is_none() {
        anyhow::bail!("depth message has neither bids nor asks");
    }

    let update_id = root
        .get("lastUpdateId")
        .or_else(|| root.get("u"))
        .and_then(serde_json::Value::as_u64);

    Ok(DepthMessage {
        update_id,
        bids: parse_levels(bids, "bids")?,
        asks: parse_levels(asks, "asks")?,
    })
}

fn parse_levels(side: Option<&serde_json::Value>, name: &str) -> Result<Vec<PriceLevel>> {
    let Some(side) = side else {
        return Ok(Vec::new());
    };
    let entries = side
        .as_array()
        .with_context(|| format!("field {name} is not an array"))?;

    entries
        .iter()
        .map(|entry| {
            let price = entry
                .get(0)
                .with_context(|| format!("{name} level missing price"))?;
            let size = entry
                .get(1)
                .with_context(|| format!("{name} level missing size"))?;
            Ok(PriceLevel::new(
                parse_string_f64(price, "price")?,
                parse_string_f64(size, "size")?,
            ))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(raw: &[(f64, f64)]) -> Vec<PriceLevel> {
        raw.iter().copied().map(PriceLevel::from).collect()
    }

    fn tight_book(store: &OrderBookStore, symbol: &str) -> UpdateOutcome {
        store.apply_update(
            symbol,
            levels(&[(99.9, 3.0), (100.0, 2.0), (99.8, 1.0)]),
            levels(&[(100.2, 1.0), (100.1, 4.0), (100.3, 2.0)]),
        )
    }

    #[test]
    fn ladders_are_sorted_on_ingestion() {
        let store = OrderBookStore::new();
        tight_book(&store, "SOLUSDT");
        let snap = store.current_snapshot("SOLUSDT").unwrap();

        assert!(snap.bids.windows(2).all(|w| w[0].price > w[1].price));
        assert!(snap.asks.windows(2).all(|w| w[0].price < w[1].price));
        assert_eq!(snap.best_bid(), Some(100.0));
        assert_eq!(snap.best_ask(), Some(100.1));
    }

    #[test]
    fn duplicate_and_invalid_levels_are_dropped() {
        let bids = normalize_ladder(
            levels(&[(100.0, 1.0), (100.0, 9.0), (99.0, 0.0), (f64::NAN, 1.0), (98.0, 2.0)]),
            BookSide::Bid,
        );
        assert_eq!(bids, levels(&[(100.0, 1.0), (98.0, 2.0)]));
    }

    #[test]
    fn heartbeat_is_a_no_op() {
        let store = OrderBookStore::new();
        tight_book(&store, "SOLUSDT");
        let before = store.current_snapshot("SOLUSDT").unwrap();

        assert_eq!(
            store.apply_update("SOLUSDT", Vec::new(), Vec::new()),
            UpdateOutcome::Heartbeat
        );
        assert_eq!(store.current_snapshot("SOLUSDT").unwrap(), before);
        assert_eq!(store.calibration_window_len("SOLUSDT"), 1);
    }

    #[test]
    fn one_sided_update_replaces_book_and_clears_metrics() {
        let store = OrderBookStore::new();
        tight_book(&store, "SOLUSDT");
        assert!(store.reading("SOLUSDT").is_some());

        let outcome = store.apply_update("SOLUSDT", levels(&[(90.0, 1.0)]), Vec::new());
        assert_eq!(outcome, UpdateOutcome::OneSided);

        let snap = store.current_snapshot("SOLUSDT").unwrap();
        assert_eq!(snap.best_bid(), Some(90.0));
        assert!(snap.asks.is_empty());
        assert!(store.metrics("SOLUSDT").is_none());
        assert!(store.reading("SOLUSDT").is_none());

        assert!(matches!(tight_book(&store, "SOLUSDT"), UpdateOutcome::Applied(_)));
        assert!(store.reading("SOLUSDT").is_some());
    }

    #[test]
    fn fully_invalid_payload_is_a_heartbeat() {
        let store = OrderBookStore::new();
        tight_book(&store, "SOLUSDT");
        let outcome = store.apply_update("SOLUSDT", levels(&[(0.0, 1.0)]), levels(&[(f64::NAN, 1.0)]));
        assert_eq!(outcome, UpdateOutcome::Heartbeat);
        assert_eq!(store.current_snapshot("SOLUSDT").unwrap().best_bid(), Some(100.0));
    }

    #[test]
    fn unsequenced_update_keeps_stored_id() {
        let store = OrderBookStore::new();
        let bids = levels(&[(100.0, 1.0)]);
        let asks = levels(&[(100.1, 1.0)]);

        store.apply_sequenced("SOLUSDT", Some(10), bids.clone(), asks.clone());
        assert!(matches!(
            store.apply_update("SOLUSDT", bids.clone(), asks.clone()),
            UpdateOutcome::Applied(_)
        ));
        assert_eq!(store.current_snapshot("SOLUSDT").unwrap().last_update_id, Some(10));
        assert_eq!(
            store.apply_sequenced("SOLUSDT", Some(9), bids, asks),
            UpdateOutcome::Stale
        );
    }

    #[test]
    fn identical_payload_yields_identical_metrics() {
        let store = OrderBookStore::new();
        let first = tight_book(&store, "SOLUSDT");
        let second = tight_book(&store, "SOLUSDT");
        assert!(matches!(first, UpdateOutcome::Applied(_)));
        assert_eq!(first, second);
    }

    #[test]
    fn stored_metrics_match_stored_snapshot() {
        let store = OrderBookStore::new();
        tight_book(&store, "SOLUSDT");
        let snap = store.current_snapshot("SOLUSDT").unwrap();
        let metrics = store.metrics("SOLUSDT").unwrap();
        let expected = compute_metrics(&snap, &DynamicThresholds::default()).unwrap();
        assert_eq!(metrics, expected);
    }

    #[test]
    fn fold_feeds_thresholds_for_next_update() {
        let store = OrderBookStore::with_symbols(&["SOLUSDT".to_string()]);
        assert_eq!(store.calibration_window_len("SOLUSDT"), 0);
        tight_book(&store, "SOLUSDT");
        tight_book(&store, "SOLUSDT");
        assert_eq!(store.calibration_window_len("SOLUSDT"), 2);
        assert_ne!(store.thresholds("SOLUSDT"), DynamicThresholds::default());
    }

    #[test]
    fn stale_sequence_is_rejected() {
        let store = OrderBookStore::new();
        let bids = levels(&[(100.0, 1.0)]);
        let asks = levels(&[(100.1, 1.0)]);

        assert!(matches!(
            store.apply_sequenced("SOLUSDT", Some(10), bids.clone(), asks.clone()),
            UpdateOutcome::Applied(_)
        ));
        assert_eq!(
            store.apply_sequenced("SOLUSDT", Some(9), bids.clone(), asks.clone()),
            UpdateOutcome::Stale
        );
        assert!(matches!(
            store.apply_sequenced("SOLUSDT", Some(10), bids, asks),
            UpdateOutcome::Applied(_)
        ));
        let snap = store.current_snapshot("SOLUSDT").unwrap();
        assert_eq!(snap.last_update_id, Some(10));
    }

    #[test]
    fn reads_are_detached_copies() {
        let store = OrderBookStore::new();
        tight_book(&store, "SOLUSDT");
        let held = store.current_snapshot("SOLUSDT").unwrap();
        store.apply_update("SOLUSDT", levels(&[(50.0, 1.0)]), levels(&[(51.0, 1.0)]));
        assert_eq!(held.best_bid(), Some(100.0));
        assert_eq!(store.current_snapshot("SOLUSDT").unwrap().best_bid(), Some(50.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers_keep_highest_sequence() {
        let store = Arc::new(OrderBookStore::new());
        let producers = 8u64;
        let per_producer = 125u64;

        let mut handles = Vec::new();
        for p in 0..producers {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..per_producer {
                    let tag = p * per_producer + i + 1;
                    let price = 100.0 + tag as f64 * 0.001;
                    store.apply_sequenced(
                        "SOLUSDT",
                        Some(tag),
                        vec![PriceLevel::new(price, 1.0)],
                        vec![PriceLevel::new(price + 0.01, 1.0)],
                    );
                    tokio::task::yield_now().await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let snap = store.current_snapshot("SOLUSDT").unwrap();
        let max_tag = producers * per_producer;
        assert_eq!(snap.last_update_id, Some(max_tag));
        // Snapshot and metrics were written together.
        let metrics = store.metrics("SOLUSDT").unwrap();
        assert!((metrics.mid_price - (snap.best_bid().unwrap() + snap.best_ask().unwrap()) / 2.0).abs() < 1e-12);
        assert!(store.calibration_window_len("SOLUSDT") <= 100);
    }

    #[test]
    fn parse_partial_depth_message() {
        let json = r#"{
            "lastUpdateId": 160,
            "bids": [["0.0024", "10"], ["0.0025", "5"]],
            "asks": [["0.0026", "100"]]
        }"#;
        let msg = parse_depth_message(json).unwrap();
        assert_eq!(msg.update_id, Some(160));
        assert_eq!(msg.bids.len(), 2);
        assert!((msg.asks[0].price - 0.0026).abs() < f64::EPSILON);
        assert!((msg.asks[0].size - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_diff_shaped_message() {
        let json = r#"{ "e": "depthUpdate", "u": 157, "b": [[100.5, 2.0]], "a": [] }"#;
        let msg = parse_depth_message(json).unwrap();
        assert_eq!(msg.update_id, Some(157));
        assert_eq!(msg.bids, vec![PriceLevel::new(100.5, 2.0)]);
        assert!(msg.asks.is_empty());
    }

    #[test]
    fn parse_rejects_non_depth_payload() {
        assert!(parse_depth_message(r#"{ "result": null, "id": 1 }"#).is_err());
        assert!(parse_depth_message("not json").is_err());
        assert!(parse_depth_message(r#"{ "bids": [["abc", "1"]], "asks": [] }"#).is_err());
    }
}

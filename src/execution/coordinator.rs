use std::sync::Arc;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tokio::task::JoinSet;

use crate::error::{ConfigError, OrderError, QuoteError};
use crate::models::{OrderResult, ProtectiveLegs, VenueId};
use crate::risk::{brackets_hold, RiskOverlay};
use crate::strategy::SignalEngine;
use crate::venue::SharedVenue;

/// Everything needed to trade one (venue, symbol) pair
pub struct PairSpec {
    pub adapter: SharedVenue,
    pub symbol: String,
    pub quantity: f64,
    pub engine: SignalEngine,
}

/// What happened to one pair during one round
#[derive(Debug)]
pub enum PairOutcome {
    QuoteFailed(QuoteError),
    NoSignal,
    InvalidIntent(ConfigError),
    Filled(OrderResult),
    Rejected(OrderResult),
    OrderFailed(OrderError),
    /// Previous round for this pair still in flight
    Busy,
    /// Shutdown requested before the order went out
    Cancelled,
    /// Pair task panicked or was aborted
    Aborted(String),
}

#[derive(Debug)]
pub struct PairReport {
    pub venue: VenueId,
    pub symbol: String,
    pub outcome: PairOutcome,
}

/// Per-pair state, only ever held by one task at a time
struct PairWorker {
    adapter: SharedVenue,
    symbol: String,
    quantity: f64,
    engine: SignalEngine,
}

struct PairHandle {
    venue: VenueId,
    symbol: String,
    worker: Arc<Mutex<PairWorker>>,
}

/// Drives quote → signal → intent → order for every configured pair
///
/// Pairs run in independent tasks: a slow or failing venue call on one pair
/// never holds up another. A pair whose previous round is still running is
/// skipped rather than run twice.
pub struct ExecutionCoordinator {
    pairs: Vec<PairHandle>,
    risk: RiskOverlay,
    shutdown: watch::Receiver<bool>,
}

impl ExecutionCoordinator {
    pub fn new(
        pairs: Vec<PairSpec>,
        risk: RiskOverlay,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let pairs = pairs
            .into_iter()
            .map(|spec| PairHandle {
                venue: spec.adapter.venue(),
                symbol: spec.symbol.clone(),
                worker: Arc::new(Mutex::new(PairWorker {
                    adapter: spec.adapter,
                    symbol: spec.symbol,
                    quantity: spec.quantity,
                    engine: spec.engine,
                })),
            })
            .collect();

        Self {
            pairs,
            risk,
            shutdown,
        }
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Start one round for every pair without waiting for it to finish
    ///
    /// Each pair's worker is claimed before this returns, so a later round
    /// sees it as busy until this one completes.
    pub fn dispatch_round(&self, tasks: &mut JoinSet<PairReport>) {
        for pair in &self.pairs {
            let claim = pair.worker.clone().try_lock_owned();
            let venue = pair.venue;
            let symbol = pair.symbol.clone();
            let risk = self.risk;
            let shutdown = self.shutdown.clone();

            tasks.spawn(async move {
                let outcome = match claim {
                    Ok(worker) => run_pair(worker, &risk, &shutdown).await,
                    Err(_) => {
                        tracing::warn!(
                            venue = %venue,
                            symbol = %symbol,
                            "Previous round still in flight, skipping"
                        );
                        PairOutcome::Busy
                    }
                };

                PairReport {
                    venue,
                    symbol,
                    outcome,
                }
            });
        }
    }

    /// Run one round for every pair and wait for all of them
    pub async fn run_round(&self) -> Vec<PairReport> {
        let mut tasks = JoinSet::new();
        self.dispatch_round(&mut tasks);

        let mut reports = Vec::with_capacity(self.pairs.len());
        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(error = %e, "Pair task failed");
                    failure = Some(e.to_string());
                }
            }
        }

        // A panicked task takes its report with it
        if let Some(reason) = failure {
            for pair in &self.pairs {
                let reported = reports
                    .iter()
                    .any(|r| r.venue == pair.venue && r.symbol == pair.symbol);
                if !reported {
                    reports.push(PairReport {
                        venue: pair.venue,
                        symbol: pair.symbol.clone(),
                        outcome: PairOutcome::Aborted(reason.clone()),
                    });
                }
            }
        }

        // Keep configuration order regardless of completion order
        reports.sort_by_key(|r| self.position_of(r.venue, &r.symbol));
        reports
    }

    fn position_of(&self, venue: VenueId, symbol: &str) -> usize {
        self.pairs
            .iter()
            .position(|p| p.venue == venue && p.symbol == symbol)
            .unwrap_or(usize::MAX)
    }
}

/// One sequential pass for a single pair
async fn run_pair(
    mut worker: OwnedMutexGuard<PairWorker>,
    risk: &RiskOverlay,
    shutdown: &watch::Receiver<bool>,
) -> PairOutcome {
    let worker = &mut *worker;
    let venue = worker.adapter.venue();
    let symbol = worker.symbol.as_str();

    // 1. Quote
    let sample = match worker.adapter.quote_price(symbol).await {
        Ok(sample) => {
            tracing::info!(venue = %venue, symbol = %symbol, price = sample.price, "Quote fetched");
            sample
        }
        Err(e) => {
            tracing::warn!(venue = %venue, symbol = %symbol, error = %e, "Quote failed");
            return PairOutcome::QuoteFailed(e);
        }
    };

    // 2. Signal
    let signal = worker.engine.observe(&sample);
    let Some(side) = signal.side() else {
        tracing::debug!(
            venue = %venue,
            symbol = %symbol,
            history = worker.engine.history_len(),
            warm = worker.engine.is_warm(),
            "No signal"
        );
        return PairOutcome::NoSignal;
    };

    tracing::info!(
        venue = %venue,
        symbol = %symbol,
        signal = ?signal,
        price = sample.price,
        "Signal emitted"
    );

    // 3. Bracketed intent
    let intent = match risk.build_intent(venue, symbol, side, sample.price, worker.quantity) {
        Ok(intent) => intent,
        Err(e) => {
            tracing::error!(venue = %venue, symbol = %symbol, error = %e, "Cannot build order intent");
            return PairOutcome::InvalidIntent(e);
        }
    };

    if *shutdown.borrow() {
        tracing::info!(venue = %venue, symbol = %symbol, "Shutdown requested, order not submitted");
        return PairOutcome::Cancelled;
    }

    // 4. Submit
    tracing::info!(
        venue = %venue,
        symbol = %symbol,
        side = %intent.side,
        quantity = intent.quantity,
        stop_loss = ?intent.stop_loss,
        take_profit = ?intent.take_profit,
        client_order_id = %intent.id,
        "Order submitted"
    );

    let result = match worker.adapter.place_market_order(&intent).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(venue = %venue, symbol = %symbol, error = %e, "Order error");
            return PairOutcome::OrderFailed(e);
        }
    };

    if !result.accepted {
        tracing::warn!(
            venue = %venue,
            symbol = %symbol,
            kind = ?result.error_kind,
            reason = result.message.as_deref().unwrap_or(""),
            "Order rejected"
        );
        return PairOutcome::Rejected(result);
    }

    // 5. Report the fill
    tracing::info!(
        venue = %venue,
        symbol = %symbol,
        filled_price = ?result.filled_price,
        venue_order_id = result.venue_order_id.as_deref().unwrap_or(""),
        "Order accepted"
    );

    if result.protective_legs == ProtectiveLegs::NotSupported {
        tracing::warn!(
            venue = %venue,
            symbol = %symbol,
            stop_loss = ?intent.stop_loss,
            take_profit = ?intent.take_profit,
            "Venue cannot attach brackets, protective legs not placed"
        );
    }

    if let Some(fill) = result.filled_price {
        if !brackets_hold(intent.side, fill, intent.stop_loss, intent.take_profit) {
            tracing::warn!(
                venue = %venue,
                symbol = %symbol,
                filled_price = fill,
                stop_loss = ?intent.stop_loss,
                take_profit = ?intent.take_profit,
                "Fill slipped past a bracket level"
            );
        }
    }

    PairOutcome::Filled(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderIntent, PriceSample, RejectionKind};
    use crate::venue::{VenueAdapter, VenueCapabilities};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted venue: pops one price per quote, records submitted intents
    struct ScriptedVenue {
        prices: std::sync::Mutex<Vec<f64>>,
        reject_with: Option<RejectionKind>,
        orders: AtomicUsize,
    }

    impl ScriptedVenue {
        fn new(prices: &[f64]) -> Self {
            Self {
                prices: std::sync::Mutex::new(prices.iter().rev().copied().collect()),
                reject_with: None,
                orders: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VenueAdapter for ScriptedVenue {
        fn venue(&self) -> VenueId {
            VenueId::Bybit
        }

        fn capabilities(&self) -> VenueCapabilities {
            VenueCapabilities {
                bracket_orders: false,
            }
        }

        async fn quote_price(&self, symbol: &str) -> Result<PriceSample, QuoteError> {
            let price = self
                .prices
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| QuoteError::Malformed("script exhausted".to_string()))?;
            PriceSample::new(VenueId::Bybit, symbol, price, Utc::now())
        }

        async fn place_market_order(
            &self,
            intent: &OrderIntent,
        ) -> Result<OrderResult, OrderError> {
            self.orders.fetch_add(1, Ordering::SeqCst);
            Ok(match self.reject_with {
                Some(kind) => OrderResult::rejected(kind, "scripted rejection"),
                None => OrderResult::accepted(
                    Some(intent.reference_price),
                    "1",
                    ProtectiveLegs::NotSupported,
                ),
            })
        }
    }

    fn coordinator(
        venue: Arc<ScriptedVenue>,
        window: usize,
    ) -> (ExecutionCoordinator, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let spec = PairSpec {
            adapter: venue,
            symbol: "BTCUSDT".to_string(),
            quantity: 0.01,
            engine: SignalEngine::new(window).unwrap(),
        };
        (
            ExecutionCoordinator::new(vec![spec], RiskOverlay::default(), rx),
            tx,
        )
    }

    #[tokio::test]
    async fn test_warm_up_then_fill() {
        let venue = Arc::new(ScriptedVenue::new(&[1.0, 2.0, 3.0, 4.0]));
        let (coordinator, _tx) = coordinator(venue.clone(), 2);

        for _ in 0..3 {
            let reports = coordinator.run_round().await;
            assert!(matches!(reports[0].outcome, PairOutcome::NoSignal));
        }

        let reports = coordinator.run_round().await;
        assert!(matches!(&reports[0].outcome, PairOutcome::Filled(r) if r.accepted));
        assert_eq!(venue.orders.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fill_without_bracket_support_still_filled() {
        let venue = Arc::new(ScriptedVenue::new(&[100.0, 101.0]));
        let (coordinator, _tx) = coordinator(venue.clone(), 1);

        coordinator.run_round().await;
        let reports = coordinator.run_round().await;

        // The entry stands even though its stop and target were not placed
        match &reports[0].outcome {
            PairOutcome::Filled(result) => {
                assert!(result.accepted);
                assert_eq!(result.protective_legs, ProtectiveLegs::NotSupported);
                assert_eq!(result.filled_price, Some(101.0));
            }
            other => panic!("expected a fill, got {:?}", other),
        }
        assert_eq!(venue.orders.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejection_is_reported_not_raised() {
        let mut scripted = ScriptedVenue::new(&[1.0, 2.0]);
        scripted.reject_with = Some(RejectionKind::InsufficientBalance);
        let venue = Arc::new(scripted);
        let (coordinator, _tx) = coordinator(venue, 1);

        coordinator.run_round().await;
        let reports = coordinator.run_round().await;
        assert!(matches!(
            &reports[0].outcome,
            PairOutcome::Rejected(r) if r.error_kind == Some(RejectionKind::InsufficientBalance)
        ));
    }

    #[tokio::test]
    async fn test_no_order_after_shutdown() {
        let venue = Arc::new(ScriptedVenue::new(&[1.0, 2.0]));
        let (coordinator, tx) = coordinator(venue.clone(), 1);

        coordinator.run_round().await;
        tx.send(true).unwrap();

        let reports = coordinator.run_round().await;
        assert!(matches!(reports[0].outcome, PairOutcome::Cancelled));
        assert_eq!(venue.orders.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_quote_failure_skips_pair() {
        let venue = Arc::new(ScriptedVenue::new(&[]));
        let (coordinator, _tx) = coordinator(venue, 1);

        let reports = coordinator.run_round().await;
        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0].outcome, PairOutcome::QuoteFailed(_)));
    }
}

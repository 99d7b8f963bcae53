//! The lifecycle sweeper. Periodically advances auction statuses based on
//! wall-clock time and ledger state: activates upcoming auctions, ends or
//! cancels expired ones (finalizing winner and bid statuses) and optionally
//! applies the time-based `ended -> sold` fallback. The payment-confirmed
//! `sold` transition also lives here since it is a status write.

use {
    crate::events::Notifying,
    anyhow::Result,
    bigdecimal::BigDecimal,
    chrono::{DateTime, Duration, Utc},
    model::{AuctionId, UserId, auction::Auction, events::AuctionEvent},
    std::sync::Arc,
    tokio::sync::RwLock,
};

#[derive(prometheus_metric_storage::MetricStorage, Clone, Debug)]
#[metric(subsystem = "lifecycle")]
struct Metrics {
    /// Number of applied status transitions, partitioned by kind.
    #[metric(labels("transition"))]
    transitions: prometheus::IntCounterVec,

    /// Number of per-auction sweep failures.
    sweep_failures: prometheus::IntCounter,

    /// Time a full sweep takes.
    #[metric(buckets(0.01, 0.05, 0.25, 1, 5, 15, 60))]
    sweep_duration_seconds: prometheus::Histogram,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}

/// A status transition that was actually committed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Transition {
    /// `upcoming -> active`.
    Activated,
    /// `active -> ended`; the auction had bids, the highest one won.
    Ended {
        winner: UserId,
        winning_bid: BigDecimal,
    },
    /// `active -> cancelled`; the auction expired without bids.
    Cancelled,
    /// `ended -> sold`.
    Sold,
}

impl Transition {
    fn label(&self) -> &'static str {
        match self {
            Self::Activated => "activated",
            Self::Ended { .. } => "ended",
            Self::Cancelled => "cancelled",
            Self::Sold => "sold",
        }
    }
}

/// Storage side of the sweep. Implementations re-evaluate the due transition
/// under the auction row lock before applying it, so racing bid commits and
/// concurrent sweeps can never move a status backwards or end an auction
/// twice.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LifecycleStoring: Send + Sync {
    /// A superset of the auctions that may be due a transition at `now`.
    async fn sweep_candidates(
        &self,
        now: DateTime<Utc>,
        sold_cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<Auction>>;

    /// Applies whatever transition is due for the auction at `now`, or
    /// nothing if the auction changed since it was selected as a candidate.
    async fn apply_lifecycle_step(
        &self,
        auction: AuctionId,
        now: DateTime<Utc>,
        sold_fallback: Option<Duration>,
    ) -> Result<Option<Transition>>;

    /// `ended -> sold` on payment confirmation. Returns false when the
    /// auction is not in a state that can be sold.
    async fn confirm_payment(&self, auction: AuctionId) -> Result<bool>;
}

pub struct LifecycleSweeper {
    storage: Arc<dyn LifecycleStoring>,
    notifier: Arc<dyn Notifying>,
    /// Grace period for the time-based `ended -> sold` safety net. `None`
    /// leaves `sold` purely payment-confirmed, which is the default.
    sold_fallback: Option<Duration>,
    last_successful_sweep: RwLock<Option<DateTime<Utc>>>,
}

impl LifecycleSweeper {
    pub fn new(
        storage: Arc<dyn LifecycleStoring>,
        notifier: Arc<dyn Notifying>,
        sold_fallback: Option<Duration>,
    ) -> Self {
        Self {
            storage,
            notifier,
            sold_fallback,
            last_successful_sweep: RwLock::new(None),
        }
    }

    /// Runs a sweep immediately and then on every interval tick.
    pub async fn run_forever(self: Arc<Self>, interval: std::time::Duration) -> ! {
        let mut interval = tokio::time::interval(interval);
        loop {
            interval.tick().await;
            let now = Utc::now();
            match self.run_sweep(now).await {
                Ok(swept) => {
                    tracing::debug!(%now, swept, "lifecycle sweep finished");
                    *self.last_successful_sweep.write().await = Some(now);
                }
                Err(err) => tracing::error!(?err, "lifecycle sweep failed"),
            }
        }
    }

    /// A single sweep tick. Processes each due auction independently; a
    /// failure on one auction is logged and does not abort the rest, the
    /// auction stays eligible for the next tick. Returns the number of
    /// applied transitions.
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        let _timer = Metrics::get().sweep_duration_seconds.start_timer();
        let sold_cutoff = self.sold_fallback.map(|grace| now - grace);
        let candidates = self.storage.sweep_candidates(now, sold_cutoff).await?;

        let mut swept = 0;
        for candidate in candidates {
            let applied = self
                .storage
                .apply_lifecycle_step(candidate.id, now, self.sold_fallback)
                .await;
            match applied {
                Ok(Some(transition)) => {
                    Metrics::get()
                        .transitions
                        .with_label_values(&[transition.label()])
                        .inc();
                    tracing::info!(
                        auction = %candidate.id,
                        transition = transition.label(),
                        "applied lifecycle transition"
                    );
                    self.emit(candidate.id, &transition).await;
                    swept += 1;
                }
                // Someone else (a bid commit or another sweeper) got there
                // first; nothing to do.
                Ok(None) => (),
                Err(err) => {
                    Metrics::get().sweep_failures.inc();
                    tracing::error!(auction = %candidate.id, ?err, "failed to sweep auction");
                }
            }
        }
        Ok(swept)
    }

    /// Payment collaborator reported a completed payment for the auction's
    /// winner. This is the authoritative `ended -> sold` trigger.
    pub async fn confirm_payment(&self, auction: AuctionId) -> Result<bool> {
        let sold = self.storage.confirm_payment(auction).await?;
        if sold {
            Metrics::get()
                .transitions
                .with_label_values(&["sold"])
                .inc();
            tracing::info!(%auction, "auction sold after payment confirmation");
            self.notifier
                .notify(AuctionEvent::AuctionSold {
                    auction_id: auction,
                })
                .await;
        }
        Ok(sold)
    }

    async fn emit(&self, auction: AuctionId, transition: &Transition) {
        match transition {
            // No event for activation; clients learn about it from the
            // auction page itself.
            Transition::Activated => (),
            Transition::Ended {
                winner,
                winning_bid,
            } => {
                self.notifier
                    .notify(AuctionEvent::AuctionEnded {
                        auction_id: auction,
                        winner_id: Some(*winner),
                        winning_bid: Some(winning_bid.clone()),
                    })
                    .await;
            }
            Transition::Cancelled => {
                self.notifier
                    .notify(AuctionEvent::AuctionEnded {
                        auction_id: auction,
                        winner_id: None,
                        winning_bid: None,
                    })
                    .await;
            }
            Transition::Sold => {
                self.notifier
                    .notify(AuctionEvent::AuctionSold {
                        auction_id: auction,
                    })
                    .await;
            }
        }
    }
}

#[async_trait::async_trait]
impl observe::metrics::LivenessChecking for LifecycleSweeper {
    async fn is_alive(&self) -> bool {
        // Accept a couple of missed ticks before reporting unhealthy.
        const MAX_SWEEP_AGE: Duration = Duration::minutes(5);
        match *self.last_successful_sweep.read().await {
            Some(last) => Utc::now() - last <= MAX_SWEEP_AGE,
            // Still starting up.
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::events::MockNotifying,
        model::auction::{AuctionStatus, Category, Condition},
    };

    fn auction(id: i64) -> Auction {
        let now = Utc::now();
        Auction {
            id: AuctionId(id),
            seller: UserId(1),
            title: "auction".to_string(),
            description: "auction".to_string(),
            category: Category::Other,
            condition: Condition::Good,
            starting_price: BigDecimal::from(10),
            current_price: BigDecimal::from(10),
            reserve_price: BigDecimal::from(0),
            status: AuctionStatus::Active,
            start_time: now - Duration::hours(2),
            end_time: now - Duration::minutes(1),
            extended_end_time: None,
            total_bids: 0,
            unique_bidders: 0,
            winner: None,
            winning_bid: None,
            auto_extend: true,
            ended_at: None,
            created_at: now - Duration::hours(3),
        }
    }

    #[tokio::test]
    async fn failure_on_one_auction_does_not_abort_the_sweep() {
        let mut storage = MockLifecycleStoring::new();
        storage
            .expect_sweep_candidates()
            .returning(|_, _| Ok(vec![auction(1), auction(2)]));
        storage
            .expect_apply_lifecycle_step()
            .withf(|auction, _, _| *auction == AuctionId(1))
            .returning(|_, _, _| Err(anyhow::anyhow!("deadlock")));
        storage
            .expect_apply_lifecycle_step()
            .withf(|auction, _, _| *auction == AuctionId(2))
            .returning(|_, _, _| Ok(Some(Transition::Cancelled)));

        let mut notifier = MockNotifying::new();
        notifier
            .expect_notify()
            .withf(|event| {
                matches!(
                    event,
                    AuctionEvent::AuctionEnded {
                        auction_id: AuctionId(2),
                        winner_id: None,
                        winning_bid: None,
                    }
                )
            })
            .times(1)
            .return_const(());

        let sweeper = LifecycleSweeper::new(Arc::new(storage), Arc::new(notifier), None);
        assert_eq!(sweeper.run_sweep(Utc::now()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ended_transition_announces_the_winner() {
        let mut storage = MockLifecycleStoring::new();
        storage
            .expect_sweep_candidates()
            .returning(|_, _| Ok(vec![auction(3)]));
        storage.expect_apply_lifecycle_step().returning(|_, _, _| {
            Ok(Some(Transition::Ended {
                winner: UserId(9),
                winning_bid: BigDecimal::from(25),
            }))
        });

        let mut notifier = MockNotifying::new();
        notifier
            .expect_notify()
            .withf(|event| {
                matches!(
                    event,
                    AuctionEvent::AuctionEnded {
                        auction_id: AuctionId(3),
                        winner_id: Some(UserId(9)),
                        winning_bid: Some(amount),
                    } if *amount == BigDecimal::from(25)
                )
            })
            .times(1)
            .return_const(());

        let sweeper = LifecycleSweeper::new(Arc::new(storage), Arc::new(notifier), None);
        sweeper.run_sweep(Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn activation_is_silent() {
        let mut storage = MockLifecycleStoring::new();
        storage
            .expect_sweep_candidates()
            .returning(|_, _| Ok(vec![auction(4)]));
        storage
            .expect_apply_lifecycle_step()
            .returning(|_, _, _| Ok(Some(Transition::Activated)));
        let mut notifier = MockNotifying::new();
        notifier.expect_notify().times(0);

        let sweeper = LifecycleSweeper::new(Arc::new(storage), Arc::new(notifier), None);
        assert_eq!(sweeper.run_sweep(Utc::now()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sold_cutoff_only_passed_when_fallback_enabled() {
        let now = Utc::now();
        let grace = Duration::hours(24);

        let mut storage = MockLifecycleStoring::new();
        storage
            .expect_sweep_candidates()
            .withf(move |_, cutoff| *cutoff == Some(now - grace))
            .returning(|_, _| Ok(vec![]));
        let sweeper = LifecycleSweeper::new(
            Arc::new(storage),
            Arc::new(MockNotifying::new()),
            Some(grace),
        );
        sweeper.run_sweep(now).await.unwrap();

        let mut storage = MockLifecycleStoring::new();
        storage
            .expect_sweep_candidates()
            .withf(|_, cutoff| cutoff.is_none())
            .returning(|_, _| Ok(vec![]));
        let sweeper = LifecycleSweeper::new(Arc::new(storage), Arc::new(MockNotifying::new()), None);
        sweeper.run_sweep(now).await.unwrap();
    }

    #[tokio::test]
    async fn payment_confirmation_emits_sold_only_when_applied() {
        let mut storage = MockLifecycleStoring::new();
        storage.expect_confirm_payment().returning(|_| Ok(true));
        let mut notifier = MockNotifying::new();
        notifier
            .expect_notify()
            .withf(|event| {
                matches!(
                    event,
                    AuctionEvent::AuctionSold {
                        auction_id: AuctionId(6)
                    }
                )
            })
            .times(1)
            .return_const(());
        let sweeper = LifecycleSweeper::new(Arc::new(storage), Arc::new(notifier), None);
        assert!(sweeper.confirm_payment(AuctionId(6)).await.unwrap());

        let mut storage = MockLifecycleStoring::new();
        storage.expect_confirm_payment().returning(|_| Ok(false));
        let mut notifier = MockNotifying::new();
        notifier.expect_notify().times(0);
        let sweeper = LifecycleSweeper::new(Arc::new(storage), Arc::new(notifier), None);
        assert!(!sweeper.confirm_payment(AuctionId(6)).await.unwrap());
    }
}

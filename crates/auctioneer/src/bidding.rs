//! The bid acceptance engine. Validates an incoming bid against the current
//! auction state, commits it as one atomic unit through the storage layer
//! and fans the resulting domain events out to the notification collaborator.

use {
    crate::events::Notifying,
    anyhow::Result,
    bigdecimal::BigDecimal,
    chrono::{DateTime, Utc},
    model::{
        AuctionId, UserId,
        auction::{AuctionStatus, BidRejection},
        bid::Bid,
        events::AuctionEvent,
    },
    std::sync::Arc,
    thiserror::Error,
};

#[derive(prometheus_metric_storage::MetricStorage, Clone, Debug)]
#[metric(subsystem = "bidding")]
struct Metrics {
    /// Number of accepted bids.
    bids_accepted: prometheus::IntCounter,

    /// Number of rejected bids, partitioned by rejection reason.
    #[metric(labels("reason"))]
    bids_rejected: prometheus::IntCounterVec,

    /// Number of anti-sniping extensions triggered by accepted bids.
    auctions_extended: prometheus::IntCounter,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}

#[derive(Debug, Error)]
pub enum PlaceBidError {
    #[error("auction not found")]
    NotFound,
    #[error("auction is not active (status: {status})")]
    NotActive { status: AuctionStatus },
    #[error("bid must be higher than the current price of {current_price}")]
    TooLow { current_price: BigDecimal },
    #[error("auction has ended")]
    Closed,
    /// The commit lost a race it should have won given the state it
    /// validated against, and revalidation no longer produces a specific
    /// rejection. Callers should refetch and retry.
    #[error("bid lost a concurrent update")]
    Conflict,
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

impl PlaceBidError {
    fn reason(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::NotActive { .. } => "not_active",
            Self::TooLow { .. } => "too_low",
            Self::Closed => "closed",
            Self::Conflict => "conflict",
            Self::Database(_) => "database",
        }
    }
}

impl From<BidRejection> for PlaceBidError {
    fn from(rejection: BidRejection) -> Self {
        match rejection {
            BidRejection::NotActive { status } => Self::NotActive { status },
            BidRejection::TooLow { current_price } => Self::TooLow { current_price },
            BidRejection::Closed => Self::Closed,
        }
    }
}

/// A bid request as it arrives from the request-handling layer.
#[derive(Clone, Debug)]
pub struct BidRequest {
    pub auction: AuctionId,
    pub bidder: UserId,
    pub amount: BigDecimal,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of the auction state right after a bid got committed. Everything
/// the engine needs to produce events without a second read.
#[derive(Clone, Debug)]
pub struct CommittedBid {
    pub bid: Bid,
    pub current_price: BigDecimal,
    pub total_bids: u32,
    pub unique_bidders: u32,
    /// Bidders whose winning bid was demoted by this commit.
    pub outbid: Vec<UserId>,
    /// Set when the commit triggered an anti-sniping extension.
    pub new_end_time: Option<DateTime<Utc>>,
}

/// The storage side of bid acceptance. The implementation must run the whole
/// unit in one transaction that holds the auction row lock and re-validates
/// against the locked state, so that of two racing bids exactly one wins and
/// the loser gets the rejection a fresh request would get.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait BidStoring: Send + Sync {
    async fn commit_bid(&self, request: &BidRequest) -> Result<CommittedBid, PlaceBidError>;

    /// Ledger accessor: bids of one auction, highest first, ties broken by
    /// earliest placement.
    async fn auction_bids(&self, auction: AuctionId, offset: i64, limit: i64)
    -> Result<Vec<Bid>>;

    /// Ledger accessor: a bidder's history, newest first.
    async fn bidder_bids(&self, bidder: UserId, offset: i64, limit: i64) -> Result<Vec<Bid>>;
}

pub struct BidEngine {
    storage: Arc<dyn BidStoring>,
    notifier: Arc<dyn Notifying>,
}

impl BidEngine {
    pub fn new(storage: Arc<dyn BidStoring>, notifier: Arc<dyn Notifying>) -> Self {
        Self { storage, notifier }
    }

    /// Validates and commits a single bid. On success the returned bid is
    /// the new winning bid of the auction.
    pub async fn place_bid(&self, request: BidRequest) -> Result<Bid, PlaceBidError> {
        let committed = match self.storage.commit_bid(&request).await {
            Ok(committed) => committed,
            Err(err) => {
                Metrics::get()
                    .bids_rejected
                    .with_label_values(&[err.reason()])
                    .inc();
                tracing::debug!(
                    auction = %request.auction,
                    bidder = %request.bidder,
                    %err,
                    "rejected bid"
                );
                return Err(err);
            }
        };
        Metrics::get().bids_accepted.inc();
        tracing::debug!(
            auction = %request.auction,
            bid = %committed.bid.id,
            price = %committed.current_price,
            "accepted bid"
        );

        self.notifier
            .notify(AuctionEvent::BidAccepted {
                auction_id: request.auction,
                current_price: committed.current_price.clone(),
                total_bids: committed.total_bids,
            })
            .await;
        for bidder in &committed.outbid {
            self.notifier
                .notify(AuctionEvent::BidderOutbid {
                    bidder_id: *bidder,
                    auction_id: request.auction,
                    current_price: committed.current_price.clone(),
                })
                .await;
        }
        if let Some(new_end) = committed.new_end_time {
            Metrics::get().auctions_extended.inc();
            tracing::debug!(auction = %request.auction, %new_end, "extended auction");
            self.notifier
                .notify(AuctionEvent::AuctionExtended {
                    auction_id: request.auction,
                    new_effective_end_time: new_end,
                })
                .await;
        }

        Ok(committed.bid)
    }

    /// Bids of one auction sorted for display, paginated.
    pub async fn auction_bids(
        &self,
        auction: AuctionId,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Bid>> {
        self.storage.auction_bids(auction, offset, limit).await
    }

    /// A bidder's own bid history, paginated.
    pub async fn bidder_bids(&self, bidder: UserId, offset: i64, limit: i64) -> Result<Vec<Bid>> {
        self.storage.bidder_bids(bidder, offset, limit).await
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::events::MockNotifying,
        chrono::Duration,
        model::{BidId, bid::BidStatus},
        mockall::predicate::eq,
    };

    fn committed(request: &BidRequest, outbid: Vec<UserId>) -> CommittedBid {
        CommittedBid {
            bid: Bid {
                id: BidId(1),
                auction: request.auction,
                bidder: request.bidder,
                amount: request.amount.clone(),
                is_winning: true,
                is_outbid: false,
                status: BidStatus::Active,
                placed_at: request.timestamp,
            },
            current_price: request.amount.clone(),
            total_bids: 3,
            unique_bidders: 2,
            outbid,
            new_end_time: None,
        }
    }

    fn request() -> BidRequest {
        BidRequest {
            auction: AuctionId(5),
            bidder: UserId(7),
            amount: BigDecimal::from(60),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn accepted_bid_emits_events_for_every_demoted_bidder() {
        let request = request();
        let result = committed(&request, vec![UserId(3), UserId(4)]);

        let mut storage = MockBidStoring::new();
        storage
            .expect_commit_bid()
            .returning(move |request| Ok(committed(request, vec![UserId(3), UserId(4)])));

        let mut notifier = MockNotifying::new();
        notifier
            .expect_notify()
            .with(eq(AuctionEvent::BidAccepted {
                auction_id: request.auction,
                current_price: result.current_price.clone(),
                total_bids: 3,
            }))
            .times(1)
            .return_const(());
        for bidder in [UserId(3), UserId(4)] {
            notifier
                .expect_notify()
                .with(eq(AuctionEvent::BidderOutbid {
                    bidder_id: bidder,
                    auction_id: request.auction,
                    current_price: result.current_price.clone(),
                }))
                .times(1)
                .return_const(());
        }

        let engine = BidEngine::new(Arc::new(storage), Arc::new(notifier));
        let bid = engine.place_bid(request).await.unwrap();
        assert!(bid.is_winning);
        assert_eq!(bid.amount, BigDecimal::from(60));
    }

    #[tokio::test]
    async fn extension_emits_auction_extended() {
        let request = request();
        let new_end = request.timestamp + Duration::minutes(2);

        let mut storage = MockBidStoring::new();
        storage.expect_commit_bid().returning(move |request| {
            Ok(CommittedBid {
                new_end_time: Some(new_end),
                ..committed(request, vec![])
            })
        });

        let mut notifier = MockNotifying::new();
        notifier
            .expect_notify()
            .withf(move |event| {
                matches!(
                    event,
                    AuctionEvent::AuctionExtended { auction_id, new_effective_end_time }
                        if *auction_id == AuctionId(5) && *new_effective_end_time == new_end
                )
            })
            .times(1)
            .return_const(());
        notifier
            .expect_notify()
            .withf(|event| matches!(event, AuctionEvent::BidAccepted { .. }))
            .times(1)
            .return_const(());

        let engine = BidEngine::new(Arc::new(storage), Arc::new(notifier));
        engine.place_bid(request).await.unwrap();
    }

    #[tokio::test]
    async fn rejection_is_propagated_without_events() {
        let mut storage = MockBidStoring::new();
        storage.expect_commit_bid().returning(|_| {
            Err(PlaceBidError::TooLow {
                current_price: BigDecimal::from(60),
            })
        });
        let mut notifier = MockNotifying::new();
        notifier.expect_notify().times(0);

        let engine = BidEngine::new(Arc::new(storage), Arc::new(notifier));
        let err = engine.place_bid(request()).await.unwrap_err();
        assert!(matches!(err, PlaceBidError::TooLow { .. }));
    }
}

//! Postgres-backed implementations of the storage traits. The database is
//! the single serialization point of the system: every unit that must be
//! atomic runs here in one transaction holding the auction row lock.

pub mod bids;
pub mod lifecycle;
pub mod listings;

use {
    anyhow::{Context, Result},
    model::{
        AuctionId, BidId, UserId,
        auction::{Auction, AuctionStatus},
        bid::{Bid, BidStatus},
    },
    sqlx::PgPool,
};

// The pool uses an Arc internally.
#[derive(Clone)]
pub struct Postgres {
    pub pool: PgPool,
}

impl Postgres {
    pub fn new(uri: &str) -> Result<Self> {
        Ok(Self {
            pool: PgPool::connect_lazy(uri)?,
        })
    }
}

#[derive(prometheus_metric_storage::MetricStorage, Clone, Debug)]
#[metric(subsystem = "database")]
struct Metrics {
    /// Timing of db queries.
    #[metric(labels("type"))]
    queries: prometheus::HistogramVec,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}

fn auction_status_from(status: database::auctions::AuctionStatus) -> AuctionStatus {
    match status {
        database::auctions::AuctionStatus::Draft => AuctionStatus::Draft,
        database::auctions::AuctionStatus::Upcoming => AuctionStatus::Upcoming,
        database::auctions::AuctionStatus::Active => AuctionStatus::Active,
        database::auctions::AuctionStatus::Ended => AuctionStatus::Ended,
        database::auctions::AuctionStatus::Cancelled => AuctionStatus::Cancelled,
        database::auctions::AuctionStatus::Sold => AuctionStatus::Sold,
    }
}

fn auction_status_into(status: AuctionStatus) -> database::auctions::AuctionStatus {
    match status {
        AuctionStatus::Draft => database::auctions::AuctionStatus::Draft,
        AuctionStatus::Upcoming => database::auctions::AuctionStatus::Upcoming,
        AuctionStatus::Active => database::auctions::AuctionStatus::Active,
        AuctionStatus::Ended => database::auctions::AuctionStatus::Ended,
        AuctionStatus::Cancelled => database::auctions::AuctionStatus::Cancelled,
        AuctionStatus::Sold => database::auctions::AuctionStatus::Sold,
    }
}

fn bid_status_from(status: database::bids::BidStatus) -> BidStatus {
    match status {
        database::bids::BidStatus::Active => BidStatus::Active,
        database::bids::BidStatus::Outbid => BidStatus::Outbid,
        database::bids::BidStatus::Won => BidStatus::Won,
        database::bids::BidStatus::Lost => BidStatus::Lost,
        database::bids::BidStatus::Cancelled => BidStatus::Cancelled,
    }
}

fn auction_from_row(row: database::auctions::Auction) -> Result<Auction> {
    Ok(Auction {
        id: AuctionId(row.id),
        seller: UserId(row.seller),
        category: row
            .category
            .parse()
            .with_context(|| format!("unknown category {:?}", row.category))?,
        condition: row
            .condition
            .parse()
            .with_context(|| format!("unknown condition {:?}", row.condition))?,
        title: row.title,
        description: row.description,
        starting_price: row.starting_price,
        current_price: row.current_price,
        reserve_price: row.reserve_price,
        status: auction_status_from(row.status),
        start_time: row.start_time,
        end_time: row.end_time,
        extended_end_time: row.extended_end_time,
        total_bids: u32::try_from(row.total_bids).context("total_bids out of range")?,
        unique_bidders: u32::try_from(row.unique_bidders).context("unique_bidders out of range")?,
        winner: row.winner.map(UserId),
        winning_bid: row.winning_bid,
        auto_extend: row.auto_extend,
        ended_at: row.ended_at,
        created_at: row.created_at,
    })
}

fn bid_from_row(row: database::bids::Bid) -> Bid {
    Bid {
        id: BidId(row.id),
        auction: AuctionId(row.auction),
        bidder: UserId(row.bidder),
        amount: row.amount,
        is_winning: row.is_winning,
        is_outbid: row.is_outbid,
        status: bid_status_from(row.status),
        placed_at: row.placed_at,
    }
}

//! Queries for the `bids` table, the append-only ledger. Rows are only ever
//! inserted; the winning/outbid flags and the status column flip through the
//! dedicated update statements below, nothing else mutates.

use {
    crate::{AuctionId, BidId, UserId},
    bigdecimal::BigDecimal,
    chrono::{DateTime, Utc},
    sqlx::PgConnection,
    tracing::instrument,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "BidStatus")]
#[sqlx(rename_all = "lowercase")]
pub enum BidStatus {
    Active,
    Outbid,
    Won,
    Lost,
    Cancelled,
}

#[derive(Clone, Debug, sqlx::FromRow, PartialEq)]
pub struct Bid {
    pub id: BidId,
    pub auction: AuctionId,
    pub bidder: UserId,
    pub amount: BigDecimal,
    pub is_winning: bool,
    pub is_outbid: bool,
    pub status: BidStatus,
    pub placed_at: DateTime<Utc>,
}

/// Inserts the new winning bid of an auction.
#[instrument(skip_all)]
pub async fn insert(
    ex: &mut PgConnection,
    auction: AuctionId,
    bidder: UserId,
    amount: &BigDecimal,
    placed_at: DateTime<Utc>,
) -> Result<BidId, sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO bids (auction, bidder, amount, is_winning, is_outbid, status, placed_at) \
        VALUES ($1, $2, $3, true, false, 'active', $4) \
        RETURNING id;";
    let (id,): (BidId,) = sqlx::query_as(QUERY)
        .bind(auction)
        .bind(bidder)
        .bind(amount)
        .bind(placed_at)
        .fetch_one(ex)
        .await?;
    Ok(id)
}

pub async fn read(ex: &mut PgConnection, id: BidId) -> Result<Option<Bid>, sqlx::Error> {
    const QUERY: &str = "SELECT * FROM bids WHERE id = $1;";
    sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await
}

/// Bids of one auction, highest first, ties broken by earliest placement.
pub async fn auction_bids(
    ex: &mut PgConnection,
    auction: AuctionId,
    offset: i64,
    limit: i64,
) -> Result<Vec<Bid>, sqlx::Error> {
    const QUERY: &str = "\
        SELECT * FROM bids WHERE auction = $1 \
        ORDER BY amount DESC, placed_at ASC \
        OFFSET $2 LIMIT $3;";
    sqlx::query_as(QUERY)
        .bind(auction)
        .bind(offset)
        .bind(limit)
        .fetch_all(ex)
        .await
}

/// A bidder's history across auctions, newest first.
pub async fn bidder_bids(
    ex: &mut PgConnection,
    bidder: UserId,
    offset: i64,
    limit: i64,
) -> Result<Vec<Bid>, sqlx::Error> {
    const QUERY: &str = "\
        SELECT * FROM bids WHERE bidder = $1 \
        ORDER BY placed_at DESC \
        OFFSET $2 LIMIT $3;";
    sqlx::query_as(QUERY)
        .bind(bidder)
        .bind(offset)
        .bind(limit)
        .fetch_all(ex)
        .await
}

pub async fn highest_bid(
    ex: &mut PgConnection,
    auction: AuctionId,
) -> Result<Option<Bid>, sqlx::Error> {
    const QUERY: &str = "\
        SELECT * FROM bids WHERE auction = $1 \
        ORDER BY amount DESC, placed_at ASC \
        LIMIT 1;";
    sqlx::query_as(QUERY).bind(auction).fetch_optional(ex).await
}

pub async fn count(ex: &mut PgConnection, auction: AuctionId) -> Result<i64, sqlx::Error> {
    const QUERY: &str = "SELECT COUNT(*) FROM bids WHERE auction = $1;";
    let (count,): (i64,) = sqlx::query_as(QUERY).bind(auction).fetch_one(ex).await?;
    Ok(count)
}

/// Distinct bidders that participated in an auction. Counts an in-flight
/// bidder passed as `including`, so the stats update of a bid commit can run
/// before the bid row is inserted.
pub async fn distinct_bidders(
    ex: &mut PgConnection,
    auction: AuctionId,
    including: UserId,
) -> Result<i64, sqlx::Error> {
    const QUERY: &str = "\
        SELECT COUNT(DISTINCT bidder) FROM \
        (SELECT bidder FROM bids WHERE auction = $1 UNION SELECT $2::bigint) AS bidders;";
    let (count,): (i64,) = sqlx::query_as(QUERY)
        .bind(auction)
        .bind(including)
        .fetch_one(ex)
        .await?;
    Ok(count)
}

/// Demotes the currently winning bid of an auction, returning the affected
/// bidders so the caller can notify them. Runs before the superseding bid is
/// inserted, hence no exclusion list.
#[instrument(skip_all)]
pub async fn demote_winning(
    ex: &mut PgConnection,
    auction: AuctionId,
) -> Result<Vec<UserId>, sqlx::Error> {
    const QUERY: &str = "\
        UPDATE bids \
        SET is_winning = false, is_outbid = true, status = 'outbid' \
        WHERE auction = $1 AND is_winning \
        RETURNING bidder;";
    let rows: Vec<(UserId,)> = sqlx::query_as(QUERY).bind(auction).fetch_all(ex).await?;
    Ok(rows.into_iter().map(|(bidder,)| bidder).collect())
}

/// End-of-auction finalization: the winning bid moves to `won`, every other
/// bid of the auction to `lost`.
#[instrument(skip_all)]
pub async fn finalize(
    ex: &mut PgConnection,
    auction: AuctionId,
    winning_bid: BidId,
) -> Result<(), sqlx::Error> {
    const LOST: &str = "\
        UPDATE bids SET status = 'lost', is_winning = false \
        WHERE auction = $2 AND id <> $1;";
    const WON: &str = "\
        UPDATE bids SET status = 'won', is_winning = true, is_outbid = false \
        WHERE id = $1 AND auction = $2;";
    // Demote the losers first so the winner flag is unique at every point.
    sqlx::query(LOST)
        .bind(winning_bid)
        .bind(auction)
        .execute(&mut *ex)
        .await?;
    sqlx::query(WON)
        .bind(winning_bid)
        .bind(auction)
        .execute(ex)
        .await?;
    Ok(())
}

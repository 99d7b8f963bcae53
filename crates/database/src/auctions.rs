//! Queries for the `auctions` table.
//!
//! The update statements that back the bid-acceptance commit and the
//! lifecycle sweep all carry their precondition in the `WHERE` clause and
//! report the affected row count, so a caller holding the row lock can tell
//! a lost race from a successful transition.

use {
    crate::{AuctionId, UserId},
    bigdecimal::BigDecimal,
    chrono::{DateTime, Utc},
    sqlx::PgConnection,
    tracing::instrument,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "AuctionStatus")]
#[sqlx(rename_all = "lowercase")]
pub enum AuctionStatus {
    Draft,
    Upcoming,
    Active,
    Ended,
    Cancelled,
    Sold,
}

#[derive(Clone, Debug, sqlx::FromRow, PartialEq)]
pub struct Auction {
    pub id: AuctionId,
    pub seller: UserId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub condition: String,
    pub starting_price: BigDecimal,
    pub current_price: BigDecimal,
    pub reserve_price: BigDecimal,
    pub status: AuctionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub extended_end_time: Option<DateTime<Utc>>,
    pub total_bids: i64,
    pub unique_bidders: i64,
    pub winner: Option<UserId>,
    pub winning_bid: Option<BigDecimal>,
    pub auto_extend: bool,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Seller-provided fields of a new auction row. Everything else is derived.
#[derive(Clone, Debug)]
pub struct NewAuction {
    pub seller: UserId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub condition: String,
    pub starting_price: BigDecimal,
    pub reserve_price: BigDecimal,
    pub status: AuctionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub auto_extend: bool,
}

#[instrument(skip_all)]
pub async fn insert(ex: &mut PgConnection, auction: &NewAuction) -> Result<AuctionId, sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO auctions ( \
            seller, title, description, category, condition, starting_price, \
            current_price, reserve_price, status, start_time, end_time, \
            auto_extend, created_at) \
        VALUES ($1, $2, $3, $4, $5, $6, $6, $7, $8, $9, $10, $11, NOW()) \
        RETURNING id;";
    let (id,): (AuctionId,) = sqlx::query_as(QUERY)
        .bind(auction.seller)
        .bind(&auction.title)
        .bind(&auction.description)
        .bind(&auction.category)
        .bind(&auction.condition)
        .bind(&auction.starting_price)
        .bind(&auction.reserve_price)
        .bind(auction.status)
        .bind(auction.start_time)
        .bind(auction.end_time)
        .bind(auction.auto_extend)
        .fetch_one(ex)
        .await?;
    Ok(id)
}

pub async fn read(ex: &mut PgConnection, id: AuctionId) -> Result<Option<Auction>, sqlx::Error> {
    const QUERY: &str = "SELECT * FROM auctions WHERE id = $1;";
    sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await
}

/// Reads the auction row and takes the row lock for the rest of the
/// surrounding transaction. Both the bid commit and the sweeper go through
/// this, which is what serializes them per auction.
pub async fn lock_for_update(
    ex: &mut PgConnection,
    id: AuctionId,
) -> Result<Option<Auction>, sqlx::Error> {
    const QUERY: &str = "SELECT * FROM auctions WHERE id = $1 FOR UPDATE;";
    sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await
}

/// Auctions that may be due for a lifecycle transition at `now`. The sweeper
/// re-checks each candidate under the row lock, so this query only has to be
/// a superset filter. `sold_cutoff` enables the time-based `ended -> sold`
/// fallback by including ended auctions whose `ended_at` is older.
pub async fn sweep_candidates(
    ex: &mut PgConnection,
    now: DateTime<Utc>,
    sold_cutoff: Option<DateTime<Utc>>,
) -> Result<Vec<Auction>, sqlx::Error> {
    const QUERY: &str = "\
        SELECT * FROM auctions \
        WHERE (status = 'upcoming' AND start_time <= $1) \
           OR (status = 'active' AND COALESCE(extended_end_time, end_time) < $1) \
           OR ($2::timestamptz IS NOT NULL AND status = 'ended' \
               AND winner IS NOT NULL AND ended_at <= $2) \
        ORDER BY id;";
    sqlx::query_as(QUERY)
        .bind(now)
        .bind(sold_cutoff)
        .fetch_all(ex)
        .await
}

/// Applies the pricing side of an accepted bid. The guards double-check the
/// validation that already ran under the row lock; affected row count 0
/// means the auction changed underneath the caller.
#[instrument(skip_all)]
pub async fn apply_accepted_bid(
    ex: &mut PgConnection,
    id: AuctionId,
    amount: &BigDecimal,
    unique_bidders: i64,
) -> Result<u64, sqlx::Error> {
    const QUERY: &str = "\
        UPDATE auctions \
        SET current_price = $2, total_bids = total_bids + 1, unique_bidders = $3 \
        WHERE id = $1 AND status = 'active' AND current_price < $2;";
    let result = sqlx::query(QUERY)
        .bind(id)
        .bind(amount)
        .bind(unique_bidders)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

/// Anti-sniping. Only ever moves the effective end time forward.
#[instrument(skip_all)]
pub async fn extend_end_time(
    ex: &mut PgConnection,
    id: AuctionId,
    new_end: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    const QUERY: &str = "\
        UPDATE auctions SET extended_end_time = $2 \
        WHERE id = $1 AND COALESCE(extended_end_time, end_time) < $2;";
    let result = sqlx::query(QUERY).bind(id).bind(new_end).execute(ex).await?;
    Ok(result.rows_affected())
}

/// `upcoming -> active`.
#[instrument(skip_all)]
pub async fn activate(ex: &mut PgConnection, id: AuctionId) -> Result<u64, sqlx::Error> {
    const QUERY: &str = "\
        UPDATE auctions SET status = 'active' \
        WHERE id = $1 AND status = 'upcoming';";
    let result = sqlx::query(QUERY).bind(id).execute(ex).await?;
    Ok(result.rows_affected())
}

/// `active -> ended` with winner finalization.
#[instrument(skip_all)]
pub async fn finalize_ended(
    ex: &mut PgConnection,
    id: AuctionId,
    winner: UserId,
    winning_bid: &BigDecimal,
    ended_at: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    const QUERY: &str = "\
        UPDATE auctions \
        SET status = 'ended', winner = $2, winning_bid = $3, ended_at = $4 \
        WHERE id = $1 AND status = 'active';";
    let result = sqlx::query(QUERY)
        .bind(id)
        .bind(winner)
        .bind(winning_bid)
        .bind(ended_at)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

/// `active -> cancelled`, only for auctions that never received a bid.
#[instrument(skip_all)]
pub async fn cancel_unsold(ex: &mut PgConnection, id: AuctionId) -> Result<u64, sqlx::Error> {
    const QUERY: &str = "\
        UPDATE auctions SET status = 'cancelled' \
        WHERE id = $1 AND status = 'active' AND total_bids = 0;";
    let result = sqlx::query(QUERY).bind(id).execute(ex).await?;
    Ok(result.rows_affected())
}

/// `ended -> sold`. Used by the payment confirmation path and the optional
/// grace-period fallback; both require a winner to be present.
#[instrument(skip_all)]
pub async fn mark_sold(ex: &mut PgConnection, id: AuctionId) -> Result<u64, sqlx::Error> {
    const QUERY: &str = "\
        UPDATE auctions SET status = 'sold' \
        WHERE id = $1 AND status = 'ended' AND winner IS NOT NULL;";
    let result = sqlx::query(QUERY).bind(id).execute(ex).await?;
    Ok(result.rows_affected())
}

/// Seller edits to a listing, restricted to auctions that haven't started
/// taking bids. The status field of `auction` is not applied; scheduling a
/// draft goes through the lifecycle instead.
#[instrument(skip_all)]
pub async fn update_details(
    ex: &mut PgConnection,
    id: AuctionId,
    auction: &NewAuction,
) -> Result<u64, sqlx::Error> {
    const QUERY: &str = "\
        UPDATE auctions \
        SET title = $2, description = $3, category = $4, condition = $5, \
            starting_price = $6, current_price = $6, reserve_price = $7, \
            start_time = $8, end_time = $9, auto_extend = $10 \
        WHERE id = $1 AND total_bids = 0 AND status IN ('draft', 'upcoming');";
    let result = sqlx::query(QUERY)
        .bind(id)
        .bind(&auction.title)
        .bind(&auction.description)
        .bind(&auction.category)
        .bind(&auction.condition)
        .bind(&auction.starting_price)
        .bind(&auction.reserve_price)
        .bind(auction.start_time)
        .bind(auction.end_time)
        .bind(auction.auto_extend)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

/// Deleting is restricted to auctions that never received a bid and are not
/// running.
#[instrument(skip_all)]
pub async fn delete(ex: &mut PgConnection, id: AuctionId) -> Result<u64, sqlx::Error> {
    const QUERY: &str = "\
        DELETE FROM auctions \
        WHERE id = $1 AND total_bids = 0 AND status <> 'active';";
    let result = sqlx::query(QUERY).bind(id).execute(ex).await?;
    Ok(result.rows_affected())
}

/// Number of auctions per status, for the operator statistics endpoint.
pub async fn status_counts(
    ex: &mut PgConnection,
) -> Result<Vec<(AuctionStatus, i64)>, sqlx::Error> {
    const QUERY: &str = "SELECT status, COUNT(*) FROM auctions GROUP BY status;";
    sqlx::query_as(QUERY).fetch_all(ex).await
}

//! Bid records of the append-only ledger.

use {
    crate::{AuctionId, BidId, UserId},
    bigdecimal::BigDecimal,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    strum::{Display, EnumString},
};

#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BidStatus {
    /// The currently winning bid of a running auction.
    #[default]
    Active,
    /// Superseded by a higher bid.
    Outbid,
    /// Highest bid of an auction that ended.
    Won,
    /// Any other bid of an auction that ended.
    Lost,
    Cancelled,
}

/// A single ledger entry. `amount` is immutable once accepted; only the
/// winning/outbid flags and `status` flip, and only as a side effect of a
/// later accepted bid or of end-of-auction finalization.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
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

//! Domain events emitted by the bidding core for the real-time and
//! notification collaborators. The serialized form is the wire contract the
//! frontend push channel consumes.

use {
    crate::{AuctionId, UserId},
    bigdecimal::BigDecimal,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum AuctionEvent {
    /// A bid got committed; carries the data a live auction page needs to
    /// update without a refetch.
    BidAccepted {
        auction_id: AuctionId,
        current_price: BigDecimal,
        total_bids: u32,
    },
    /// Sent once per bidder whose winning bid was just demoted.
    BidderOutbid {
        bidder_id: UserId,
        auction_id: AuctionId,
        current_price: BigDecimal,
    },
    /// Anti-sniping pushed the effective end time.
    AuctionExtended {
        auction_id: AuctionId,
        new_effective_end_time: DateTime<Utc>,
    },
    AuctionEnded {
        auction_id: AuctionId,
        winner_id: Option<UserId>,
        winning_bid: Option<BigDecimal>,
    },
    AuctionSold { auction_id: AuctionId },
}

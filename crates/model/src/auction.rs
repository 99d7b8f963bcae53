//! Auction record and the pure decision logic of the bidding core: bid
//! validation, anti-sniping extension and the status lifecycle.
//!
//! The functions here are deliberately side-effect free. The `auctioneer`
//! service re-runs them inside a database transaction that holds the auction
//! row lock, which is what turns these decisions into the atomic commit the
//! system requires.

use {
    crate::{BidId, UserId},
    bigdecimal::{BigDecimal, Zero},
    chrono::{DateTime, Duration, Utc},
    serde::{Deserialize, Serialize},
    strum::{Display, EnumString},
    thiserror::Error,
};

/// A bid arriving within this window of the effective end time qualifies for
/// an anti-sniping extension.
pub const SNIPE_WINDOW: Duration = Duration::minutes(5);
/// How far a qualifying bid pushes the effective end time. Extensions are
/// cumulative and uncapped; every late bid extends again.
pub const SNIPE_EXTENSION: Duration = Duration::minutes(2);

pub const MAX_TITLE_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 1000;

#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AuctionStatus {
    #[default]
    Draft,
    Upcoming,
    Active,
    Ended,
    Cancelled,
    Sold,
}

impl AuctionStatus {
    /// Whether the lifecycle sweeper can still move this auction forward.
    /// `draft` needs an explicit seller action to get scheduled and the
    /// remaining states are terminal for the sweeper.
    pub fn is_sweepable(&self) -> bool {
        matches!(self, Self::Upcoming | Self::Active | Self::Ended)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Condition {
    New,
    LikeNew,
    Good,
    Fair,
    Poor,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize, Display, EnumString)]
pub enum Category {
    Electronics,
    Fashion,
    #[serde(rename = "Home & Garden")]
    #[strum(serialize = "Home & Garden")]
    HomeAndGarden,
    Sports,
    Books,
    Collectibles,
    Automotive,
    Jewelry,
    Art,
    Antiques,
    #[serde(rename = "Toys & Games")]
    #[strum(serialize = "Toys & Games")]
    ToysAndGames,
    #[serde(rename = "Health & Beauty")]
    #[strum(serialize = "Health & Beauty")]
    HealthAndBeauty,
    Tools,
    Music,
    Other,
}

/// An auction as stored and exposed to collaborators.
///
/// Field ownership is strict: the bid acceptance engine is the only writer of
/// the pricing/extension/stats fields, the lifecycle sweeper (plus the
/// payment confirmation path) is the only writer of `status`, `winner`,
/// `winning_bid` and `ended_at`.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub id: crate::AuctionId,
    pub seller: UserId,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub condition: Condition,
    pub starting_price: BigDecimal,
    pub current_price: BigDecimal,
    pub reserve_price: BigDecimal,
    pub status: AuctionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub extended_end_time: Option<DateTime<Utc>>,
    pub total_bids: u32,
    pub unique_bidders: u32,
    #[serde(default)]
    pub winner: Option<UserId>,
    #[serde(default)]
    pub winning_bid: Option<BigDecimal>,
    pub auto_extend: bool,
    /// When the sweeper moved the auction to `ended`. Basis for the optional
    /// time-based `sold` fallback.
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Auction {
    /// `extended_end_time` if anti-sniping fired at least once, otherwise the
    /// scheduled `end_time`.
    pub fn effective_end_time(&self) -> DateTime<Utc> {
        self.extended_end_time.unwrap_or(self.end_time)
    }

    pub fn is_reserve_met(&self) -> bool {
        self.current_price >= self.reserve_price
    }

    /// Validates a prospective bid against this auction snapshot. The check
    /// order is part of the contract: status before amount before deadline,
    /// first failure wins.
    pub fn check_bid(&self, amount: &BigDecimal, now: DateTime<Utc>) -> Result<(), BidRejection> {
        if self.status != AuctionStatus::Active {
            return Err(BidRejection::NotActive {
                status: self.status,
            });
        }
        if *amount <= self.current_price {
            return Err(BidRejection::TooLow {
                current_price: self.current_price.clone(),
            });
        }
        if now > self.effective_end_time() {
            return Err(BidRejection::Closed);
        }
        Ok(())
    }

    /// The new `extended_end_time` an accepted bid at `now` would cause, or
    /// `None` when no extension applies. Only meaningful for a bid that
    /// passed [`Self::check_bid`].
    pub fn sniping_extension(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.auto_extend {
            return None;
        }
        let effective_end = self.effective_end_time();
        (effective_end - now <= SNIPE_WINDOW).then(|| effective_end + SNIPE_EXTENSION)
    }

    /// Which lifecycle transition is due at `now`, if any. `sold_fallback`
    /// enables the time-based `ended -> sold` safety net; payment
    /// confirmation is the authoritative trigger and goes through
    /// [`LifecycleStep::Sell`] directly.
    pub fn lifecycle_step(
        &self,
        now: DateTime<Utc>,
        sold_fallback: Option<Duration>,
    ) -> Option<LifecycleStep> {
        match self.status {
            AuctionStatus::Upcoming if now >= self.start_time => Some(LifecycleStep::Activate),
            AuctionStatus::Active if now > self.effective_end_time() => {
                if self.total_bids > 0 {
                    Some(LifecycleStep::End)
                } else {
                    Some(LifecycleStep::Cancel)
                }
            }
            AuctionStatus::Ended if self.winner.is_some() => {
                let grace = sold_fallback?;
                let ended_at = self.ended_at?;
                (now - ended_at >= grace).then_some(LifecycleStep::Sell)
            }
            _ => None,
        }
    }
}

/// A status transition the sweeper decided to apply.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LifecycleStep {
    /// `upcoming -> active`, start time reached.
    Activate,
    /// `active -> ended`, deadline passed with at least one bid. Finalizes
    /// winner and bid statuses.
    End,
    /// `active -> cancelled`, deadline passed without bids.
    Cancel,
    /// `ended -> sold`, payment confirmed (or grace period elapsed when the
    /// fallback is enabled).
    Sell,
}

/// Why a bid was not accepted. Mirrors the auction state a concurrent caller
/// would have observed after the losing commit, so clients can tell "you got
/// outbid" from "the auction is over".
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum BidRejection {
    #[error("auction is not active (status: {status})")]
    NotActive { status: AuctionStatus },
    #[error("bid must be higher than the current price of {current_price}")]
    TooLow { current_price: BigDecimal },
    #[error("auction has ended")]
    Closed,
}

/// Seller-provided fields of a new auction. Contract-checked before the
/// record is created; everything derived (current price, stats, status
/// timestamps) is filled in by the store.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionDraft {
    pub seller: UserId,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub condition: Condition,
    pub starting_price: BigDecimal,
    #[serde(default)]
    pub reserve_price: Option<BigDecimal>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default = "default_auto_extend")]
    pub auto_extend: bool,
}

fn default_auto_extend() -> bool {
    true
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum InvalidAuction {
    #[error("auction title is required")]
    MissingTitle,
    #[error("title cannot exceed {MAX_TITLE_LEN} characters")]
    TitleTooLong,
    #[error("auction description is required")]
    MissingDescription,
    #[error("description cannot exceed {MAX_DESCRIPTION_LEN} characters")]
    DescriptionTooLong,
    #[error("starting price cannot be negative")]
    NegativeStartingPrice,
    #[error("reserve price cannot be negative")]
    NegativeReservePrice,
    #[error("end time must be after start time")]
    EndBeforeStart,
}

impl AuctionDraft {
    pub fn validate(&self) -> Result<(), InvalidAuction> {
        if self.title.trim().is_empty() {
            return Err(InvalidAuction::MissingTitle);
        }
        if self.title.len() > MAX_TITLE_LEN {
            return Err(InvalidAuction::TitleTooLong);
        }
        if self.description.trim().is_empty() {
            return Err(InvalidAuction::MissingDescription);
        }
        if self.description.len() > MAX_DESCRIPTION_LEN {
            return Err(InvalidAuction::DescriptionTooLong);
        }
        if self.starting_price < BigDecimal::zero() {
            return Err(InvalidAuction::NegativeStartingPrice);
        }
        if matches!(&self.reserve_price, Some(reserve) if *reserve < BigDecimal::zero()) {
            return Err(InvalidAuction::NegativeReservePrice);
        }
        if self.end_time <= self.start_time {
            return Err(InvalidAuction::EndBeforeStart);
        }
        Ok(())
    }

    /// Scheduled auctions start `upcoming` (or `active` right away when the
    /// start time is already in the past); unscheduled ones stay `draft`.
    pub fn initial_status(&self, now: DateTime<Utc>) -> AuctionStatus {
        if now >= self.start_time {
            AuctionStatus::Active
        } else {
            AuctionStatus::Upcoming
        }
    }
}

/// A bid reference the sweeper uses to finalize an ending auction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WinningBid {
    pub bid: BidId,
    pub bidder: UserId,
    pub amount: BigDecimal,
}

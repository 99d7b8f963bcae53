//! Domain model for the auction marketplace: auctions, bids, the pure
//! decision logic behind bid acceptance and the status lifecycle, and the
//! domain events consumed by the real-time/notification collaborators.
//!
//! This crate performs no I/O. Everything that touches the database lives in
//! the `database` crate and the `auctioneer` service.

pub mod auction;
pub mod bid;
pub mod events;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Clone,
            Copy,
            Debug,
            Default,
            Eq,
            PartialEq,
            Ord,
            PartialOrd,
            Hash,
            Deserialize,
            Serialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(AuctionId);
id_type!(BidId);
id_type!(UserId);

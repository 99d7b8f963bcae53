//! The auction store surface used by the request-handling layer: creating,
//! reading and deleting listings plus operator statistics. Thin contract
//! checks only; everything stateful about pricing and status is owned by the
//! bidding engine and the lifecycle sweeper.

use {
    anyhow::Result,
    chrono::{DateTime, Utc},
    model::{
        AuctionId,
        auction::{Auction, AuctionDraft, AuctionStatus, InvalidAuction},
    },
    std::{collections::HashMap, sync::Arc},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum ListingError {
    #[error(transparent)]
    Invalid(#[from] InvalidAuction),
    #[error("auction not found")]
    NotFound,
    #[error("auctions with bids or still running cannot be deleted")]
    CannotDelete,
    #[error("auctions with bids or already running cannot be edited")]
    CannotEdit,
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ListingStoring: Send + Sync {
    /// Persists a validated draft with the given initial status and returns
    /// the new id.
    async fn create_auction(
        &self,
        draft: &AuctionDraft,
        status: AuctionStatus,
    ) -> Result<AuctionId>;

    async fn single_auction(&self, auction: AuctionId) -> Result<Option<Auction>>;

    /// Overwrites the seller-provided fields of an auction that hasn't
    /// started taking bids. Returns whether a row was changed.
    async fn update_auction(&self, auction: AuctionId, draft: &AuctionDraft) -> Result<bool>;

    /// Deletes the auction if it never received a bid and is not running.
    /// Returns whether a row was removed.
    async fn delete_auction(&self, auction: AuctionId) -> Result<bool>;

    async fn status_counts(&self) -> Result<HashMap<AuctionStatus, i64>>;
}

pub struct Listings {
    storage: Arc<dyn ListingStoring>,
}

impl Listings {
    pub fn new(storage: Arc<dyn ListingStoring>) -> Self {
        Self { storage }
    }

    /// Contract-checks and persists a new listing. Drafts scheduled in the
    /// future become `upcoming`, anything already past its start time goes
    /// straight to `active`.
    pub async fn create_auction(
        &self,
        draft: AuctionDraft,
        now: DateTime<Utc>,
    ) -> Result<AuctionId, ListingError> {
        draft.validate()?;
        let status = draft.initial_status(now);
        let id = self.storage.create_auction(&draft, status).await?;
        tracing::debug!(auction = %id, %status, "created auction");
        Ok(id)
    }

    pub async fn get_auction(&self, auction: AuctionId) -> Result<Auction, ListingError> {
        self.storage
            .single_auction(auction)
            .await?
            .ok_or(ListingError::NotFound)
    }

    /// Seller edits to a listing. Once an auction is active or has bids its
    /// seller-provided fields are frozen.
    pub async fn update_auction(
        &self,
        auction: AuctionId,
        draft: AuctionDraft,
    ) -> Result<(), ListingError> {
        draft.validate()?;
        if self.storage.update_auction(auction, &draft).await? {
            tracing::debug!(%auction, "updated auction");
            return Ok(());
        }
        match self.storage.single_auction(auction).await? {
            Some(_) => Err(ListingError::CannotEdit),
            None => Err(ListingError::NotFound),
        }
    }

    pub async fn delete_auction(&self, auction: AuctionId) -> Result<(), ListingError> {
        if self.storage.delete_auction(auction).await? {
            return Ok(());
        }
        // Distinguish "not there" from "not deletable" for the caller.
        match self.storage.single_auction(auction).await? {
            Some(_) => Err(ListingError::CannotDelete),
            None => Err(ListingError::NotFound),
        }
    }

    pub async fn auction_stats(&self) -> Result<HashMap<AuctionStatus, i64>, ListingError> {
        Ok(self.storage.status_counts().await?)
    }
}

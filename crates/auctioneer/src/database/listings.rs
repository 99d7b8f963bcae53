//! CRUD side of the auction store.

use {
    super::{Metrics, Postgres, auction_from_row, auction_status_from, auction_status_into},
    crate::listings::ListingStoring,
    anyhow::{Context, Result},
    bigdecimal::{BigDecimal, Zero},
    model::{
        AuctionId,
        auction::{Auction, AuctionDraft, AuctionStatus},
    },
    std::collections::HashMap,
};

fn new_auction(
    draft: &AuctionDraft,
    status: database::auctions::AuctionStatus,
) -> database::auctions::NewAuction {
    database::auctions::NewAuction {
        seller: draft.seller.0,
        title: draft.title.clone(),
        description: draft.description.clone(),
        category: draft.category.to_string(),
        condition: draft.condition.to_string(),
        starting_price: draft.starting_price.clone(),
        reserve_price: draft
            .reserve_price
            .clone()
            .unwrap_or_else(BigDecimal::zero),
        status,
        start_time: draft.start_time,
        end_time: draft.end_time,
        auto_extend: draft.auto_extend,
    }
}

#[async_trait::async_trait]
impl ListingStoring for Postgres {
    async fn create_auction(
        &self,
        draft: &AuctionDraft,
        status: AuctionStatus,
    ) -> Result<AuctionId> {
        let _timer = Metrics::get()
            .queries
            .with_label_values(&["create_auction"])
            .start_timer();
        let new = new_auction(draft, auction_status_into(status));
        let mut ex = self.pool.acquire().await?;
        let id = database::auctions::insert(&mut ex, &new)
            .await
            .context("insert auction")?;
        Ok(AuctionId(id))
    }

    async fn single_auction(&self, auction: AuctionId) -> Result<Option<Auction>> {
        let _timer = Metrics::get()
            .queries
            .with_label_values(&["single_auction"])
            .start_timer();
        let mut ex = self.pool.acquire().await?;
        database::auctions::read(&mut ex, auction.0)
            .await
            .context("read auction")?
            .map(auction_from_row)
            .transpose()
    }

    async fn update_auction(&self, auction: AuctionId, draft: &AuctionDraft) -> Result<bool> {
        let _timer = Metrics::get()
            .queries
            .with_label_values(&["update_auction"])
            .start_timer();
        // The status is carried but not applied by the update statement.
        let new = new_auction(draft, database::auctions::AuctionStatus::Draft);
        let mut ex = self.pool.acquire().await?;
        let updated = database::auctions::update_details(&mut ex, auction.0, &new)
            .await
            .context("update auction")?;
        Ok(updated == 1)
    }

    async fn delete_auction(&self, auction: AuctionId) -> Result<bool> {
        let _timer = Metrics::get()
            .queries
            .with_label_values(&["delete_auction"])
            .start_timer();
        let mut ex = self.pool.acquire().await?;
        let deleted = database::auctions::delete(&mut ex, auction.0)
            .await
            .context("delete auction")?;
        Ok(deleted == 1)
    }

    async fn status_counts(&self) -> Result<HashMap<AuctionStatus, i64>> {
        let _timer = Metrics::get()
            .queries
            .with_label_values(&["status_counts"])
            .start_timer();
        let mut ex = self.pool.acquire().await?;
        let counts = database::auctions::status_counts(&mut ex)
            .await
            .context("status counts")?;
        Ok(counts
            .into_iter()
            .map(|(status, count)| (auction_status_from(status), count))
            .collect())
    }
}

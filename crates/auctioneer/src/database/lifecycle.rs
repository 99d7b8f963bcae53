//! Status transitions, applied under the same per-auction row lock as bid
//! commits so the sweeper can never race a live bid.

use {
    super::{Metrics, Postgres, auction_from_row},
    crate::lifecycle::{LifecycleStoring, Transition},
    anyhow::{Context, Result, bail, ensure},
    chrono::{DateTime, Duration, Utc},
    model::{AuctionId, UserId, auction::Auction, auction::LifecycleStep},
};

#[async_trait::async_trait]
impl LifecycleStoring for Postgres {
    async fn sweep_candidates(
        &self,
        now: DateTime<Utc>,
        sold_cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<Auction>> {
        let _timer = Metrics::get()
            .queries
            .with_label_values(&["sweep_candidates"])
            .start_timer();
        let mut ex = self.pool.acquire().await?;
        database::auctions::sweep_candidates(&mut ex, now, sold_cutoff)
            .await
            .context("sweep_candidates")?
            .into_iter()
            .map(auction_from_row)
            .collect()
    }

    async fn apply_lifecycle_step(
        &self,
        auction: AuctionId,
        now: DateTime<Utc>,
        sold_fallback: Option<Duration>,
    ) -> Result<Option<Transition>> {
        let _timer = Metrics::get()
            .queries
            .with_label_values(&["apply_lifecycle_step"])
            .start_timer();

        let mut tx = self.pool.begin().await?;
        // Re-evaluate under the lock; the candidate query ran without one
        // and the auction may have moved on since (a late bid extending the
        // deadline, another sweeper instance).
        let Some(row) = database::auctions::lock_for_update(&mut tx, auction.0).await? else {
            return Ok(None);
        };
        let snapshot = auction_from_row(row)?;
        let Some(step) = snapshot.lifecycle_step(now, sold_fallback) else {
            return Ok(None);
        };

        let transition = match step {
            LifecycleStep::Activate => {
                let updated = database::auctions::activate(&mut tx, auction.0).await?;
                ensure!(updated == 1, "activation lost under lock");
                Transition::Activated
            }
            LifecycleStep::End => {
                let Some(highest) = database::bids::highest_bid(&mut tx, auction.0).await? else {
                    // total_bids said otherwise; refuse to end without a
                    // winner rather than papering over a corrupt ledger.
                    bail!("auction has {} bids but an empty ledger", snapshot.total_bids);
                };
                let updated = database::auctions::finalize_ended(
                    &mut tx,
                    auction.0,
                    highest.bidder,
                    &highest.amount,
                    now,
                )
                .await?;
                ensure!(updated == 1, "finalization lost under lock");
                database::bids::finalize(&mut tx, auction.0, highest.id).await?;
                Transition::Ended {
                    winner: UserId(highest.bidder),
                    winning_bid: highest.amount,
                }
            }
            LifecycleStep::Cancel => {
                let updated = database::auctions::cancel_unsold(&mut tx, auction.0).await?;
                ensure!(updated == 1, "cancellation lost under lock");
                Transition::Cancelled
            }
            LifecycleStep::Sell => {
                let updated = database::auctions::mark_sold(&mut tx, auction.0).await?;
                ensure!(updated == 1, "sold fallback lost under lock");
                Transition::Sold
            }
        };
        tx.commit().await?;
        Ok(Some(transition))
    }

    async fn confirm_payment(&self, auction: AuctionId) -> Result<bool> {
        let _timer = Metrics::get()
            .queries
            .with_label_values(&["confirm_payment"])
            .start_timer();
        let mut ex = self.pool.acquire().await?;
        let updated = database::auctions::mark_sold(&mut ex, auction.0).await?;
        Ok(updated == 1)
    }
}

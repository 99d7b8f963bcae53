pub mod auctions;
pub mod bids;

use sqlx::{Executor, PgPool};

// Design:
//
// Functions that run multiple statements take `&mut PgTransaction` to make it
// visible that the whole batch commits or rolls back together. Functions that
// run a single statement take `&mut PgConnection`. The parameter is usually
// called `ex` for `Executor`, the trait whose methods run the queries. This
// lets callers decide whether a function joins a bigger transaction or runs
// standalone; `PgTransaction` derefs to `PgConnection`. Callers are
// responsible for calling `commit`.
//
// For tests a useful pattern is to begin a transaction at the start of the
// test, run every query on it and never commit. The uncommitted transaction
// is rolled back when dropped, so postgres tests can run in parallel without
// clearing tables first.

pub type PgTransaction<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

pub type AuctionId = i64;
pub type BidId = i64;
pub type UserId = i64;

/// The names of the tables this crate uses.
pub const TABLES: &[&str] = &["bids", "auctions"];

/// Delete all data in the database. Only used by tests.
#[allow(non_snake_case)]
pub async fn clear_DANGER_(ex: &mut PgTransaction<'_>) -> sqlx::Result<()> {
    for table in TABLES {
        ex.execute(format!("TRUNCATE {table} CASCADE;").as_str())
            .await?;
    }
    Ok(())
}

/// Like above but more ergonomic for tests that use a pool.
#[allow(non_snake_case)]
pub async fn clear_DANGER(pool: &PgPool) -> sqlx::Result<()> {
    let mut transaction = pool.begin().await?;
    clear_DANGER_(&mut transaction).await?;
    transaction.commit().await
}

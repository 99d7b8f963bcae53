//! The auction service core: the bid acceptance engine and the auction
//! lifecycle sweeper, both backed by Postgres as the single serialization
//! point.
//!
//! The binary runs the sweeper plus the metrics endpoint.
//! [`bidding::BidEngine`] and [`listings::Listings`] are the library surface
//! the request-handling layer drives; they share the same
//! [`database::Postgres`] storage and [`events::Notifying`] collaborator.

pub mod arguments;
pub mod bidding;
pub mod database;
pub mod events;
pub mod lifecycle;
pub mod listings;

use {lifecycle::LifecycleSweeper, std::sync::Arc};

pub async fn main(args: arguments::Arguments) -> ! {
    let db = database::Postgres::new(args.db_url.as_str()).expect("failed to create database");
    let notifier = Arc::new(events::Broadcaster::new(args.event_buffer_size));
    let sold_fallback = args.enable_sold_fallback.then(|| {
        chrono::Duration::from_std(args.sold_fallback_grace)
            .expect("sold fallback grace out of range")
    });
    let sweeper = Arc::new(LifecycleSweeper::new(
        Arc::new(db),
        notifier,
        sold_fallback,
    ));

    let _metrics_task = observe::metrics::serve_metrics(sweeper.clone(), args.metrics_address);
    sweeper.run_forever(args.sweep_interval).await
}

use clap::Parser;

#[tokio::main]
async fn main() {
    let args = auctioneer::arguments::Arguments::parse();
    observe::tracing::initialize(&args.log_filter, tracing::Level::ERROR.into());
    observe::metrics::setup_registry(Some("auctioneer".to_string()));
    tracing::info!("running auctioneer with validated arguments:\n{}", args);
    auctioneer::main(args).await;
}

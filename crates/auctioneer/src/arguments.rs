use {
    clap::Parser,
    std::{net::SocketAddr, time::Duration},
    url::Url,
};

#[derive(Parser)]
pub struct Arguments {
    #[clap(long, env, default_value = "warn,auctioneer=debug,database=debug")]
    pub log_filter: String,

    #[clap(long, env, default_value = "0.0.0.0:9586")]
    pub metrics_address: SocketAddr,

    /// Url of the Postgres database. By default connects to locally running
    /// postgres.
    #[clap(long, env, default_value = "postgresql://")]
    pub db_url: Url,

    /// How often the lifecycle sweeper advances auction statuses. A sweep
    /// also runs once at startup.
    #[clap(long, env, default_value = "1m", value_parser = humantime::parse_duration)]
    pub sweep_interval: Duration,

    /// Enables the time-based `ended -> sold` safety net. Payment
    /// confirmation is the authoritative trigger; with this flag set,
    /// auctions that ended with a winner additionally get marked sold after
    /// the grace period below.
    #[clap(long, env)]
    pub enable_sold_fallback: bool,

    /// Grace period for the sold fallback, measured from when the auction
    /// ended.
    #[clap(long, env, default_value = "24h", value_parser = humantime::parse_duration)]
    pub sold_fallback_grace: Duration,

    /// Capacity of the domain event broadcast channel. Subscribers that lag
    /// behind further than this lose events.
    #[clap(long, env, default_value = "1024")]
    pub event_buffer_size: usize,
}

impl std::fmt::Display for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "log_filter: {}", self.log_filter)?;
        writeln!(f, "metrics_address: {}", self.metrics_address)?;
        writeln!(f, "db_url: SECRET")?;
        writeln!(f, "sweep_interval: {:?}", self.sweep_interval)?;
        writeln!(f, "enable_sold_fallback: {}", self.enable_sold_fallback)?;
        writeln!(f, "sold_fallback_grace: {:?}", self.sold_fallback_grace)?;
        writeln!(f, "event_buffer_size: {}", self.event_buffer_size)?;
        Ok(())
    }
}

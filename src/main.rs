use std::time::Duration;

use anyhow::{bail, Context};
use restaurant_aggregator::{init_tracing, AppConfig, RestaurantService};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = AppConfig::from_env();

    let mut regions: Vec<String> = std::env::args().skip(1).collect();
    if regions.is_empty() {
        regions = config.prefetch_regions.clone();
    }
    if regions.is_empty() {
        bail!("usage: restaurant-aggregator <region term>... (or set PREFETCH_REGIONS)");
    }

    let pause = Duration::from_millis(config.prefetch_interval_ms);
    let service = RestaurantService::initialize(config).context("failed to initialize")?;

    for (index, term) in regions.iter().enumerate() {
        if index > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        let outcome = service.fetch(term).await;
        let stored = service
            .stored_records(term)
            .with_context(|| format!("failed to read back region {term}"))?;
        info!(
            term = %term,
            region = outcome.region(),
            inserted = outcome.inserted(),
            stored = stored.len(),
            "prefetch finished"
        );
    }

    service.flush_telemetry().context("failed to flush telemetry")?;
    Ok(())
}

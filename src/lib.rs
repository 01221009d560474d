mod aggregator;
mod config;
mod db;
mod errors;
mod images;
mod kakao;
mod orchestrator;
mod places;
mod regions;
mod store;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::json;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::aggregator::{CollectionStats, PlaceAggregator};
pub use crate::config::{AppConfig, PublicAppConfig};
pub use crate::db::{bootstrap, open_in_memory, DatabaseContext};
pub use crate::errors::{AppError, AppResult, ProviderError, ProviderResult};
pub use crate::images::{
    is_acceptable_image, GooglePhotoProvider, ImageProvider, ImageResolver, ImageSource,
    NaverImageProvider, ResolvedImage,
};
pub use crate::kakao::{KakaoLocalClient, PlaceSearch};
pub use crate::orchestrator::{
    FetchOrchestrator, FetchOutcome, FetchQueue, FetchTicket, SerializationScope,
};
pub use crate::places::{
    normalize_region, NewPlace, PlaceKey, PlaceRecord, RawCandidate, SearchRewriter,
};
pub use crate::regions::{RegionLookup, RegionQueryService};
pub use crate::store::{PlaceStore, SqlitePlaceStore};
pub use crate::telemetry::TelemetryClient;

/// Fully wired aggregation stack backed by a SQLite file in `config.data_dir`.
pub struct RestaurantService {
    config: AppConfig,
    db_path: Option<PathBuf>,
    store: Arc<dyn PlaceStore>,
    orchestrator: Arc<FetchOrchestrator>,
    queue: FetchQueue,
    regions: RegionQueryService,
    telemetry: TelemetryClient,
}

impl RestaurantService {
    /// Must be called from within a tokio runtime; the fetch queue worker is
    /// spawned immediately.
    pub fn initialize(config: AppConfig) -> AppResult<Self> {
        let DatabaseContext { connection, path } =
            bootstrap(&config.data_dir, &config.database_file_name)?;
        let store: Arc<dyn PlaceStore> =
            Arc::new(SqlitePlaceStore::new(Arc::new(Mutex::new(connection))));
        let telemetry = TelemetryClient::new(&config.data_dir, &config)?;

        let http = build_http_client(&config)?;
        let search: Arc<dyn PlaceSearch> = Arc::new(KakaoLocalClient::new(http.clone(), &config));
        let images = ImageResolver::from_config(http, &config);
        let aggregator =
            PlaceAggregator::new(search, images, Arc::clone(&store), SearchRewriter::default());
        let orchestrator = Arc::new(
            FetchOrchestrator::new(aggregator, config.fetch_serialization)
                .with_telemetry(telemetry.clone()),
        );
        let queue = FetchQueue::spawn(Arc::clone(&orchestrator), config.fetch_queue_capacity);
        let regions = RegionQueryService::new(
            Arc::clone(&store),
            Arc::clone(&orchestrator),
            Some(queue.clone()),
        );

        if let Err(err) = telemetry.record(
            "app_start",
            json!({
                "version": env!("CARGO_PKG_VERSION"),
                "config": config.public_profile(),
            }),
        ) {
            warn!(?err, "failed to queue telemetry bootstrap event");
        }

        Ok(Self {
            config,
            db_path: path,
            store,
            orchestrator,
            queue,
            regions,
            telemetry,
        })
    }

    pub fn config(&self) -> PublicAppConfig {
        self.config.public_profile()
    }

    pub fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    pub fn store(&self) -> Arc<dyn PlaceStore> {
        Arc::clone(&self.store)
    }

    /// Stored records for `term` without triggering a fetch.
    pub fn stored_records(&self, term: &str) -> AppResult<Vec<PlaceRecord>> {
        self.store.find_by_region(&normalize_region(term))
    }

    pub fn regions(&self) -> &RegionQueryService {
        &self.regions
    }

    pub async fn fetch_and_save(&self, term: &str) {
        self.orchestrator.fetch_and_save(term).await;
    }

    pub async fn fetch(&self, term: &str) -> FetchOutcome {
        self.orchestrator.run(term).await
    }

    pub fn schedule_fetch(&self, term: &str) -> AppResult<FetchTicket> {
        self.queue.submit(term)
    }

    pub fn flush_telemetry(&self) -> AppResult<()> {
        self.telemetry.flush()
    }
}

fn build_http_client(config: &AppConfig) -> AppResult<Client> {
    let mut builder = Client::builder().user_agent(concat!(
        "restaurant-aggregator/",
        env!("CARGO_PKG_VERSION")
    ));
    if let Some(secs) = config.http_timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    Ok(builder.build()?)
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,restaurant_aggregator=debug"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}

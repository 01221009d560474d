use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::AppResult;
use crate::orchestrator::{FetchOrchestrator, FetchQueue, FetchTicket};
use crate::places::{normalize_region, PlaceRecord};
use crate::store::PlaceStore;

/// Result of a non-blocking region lookup.
pub struct RegionLookup {
    pub records: Vec<PlaceRecord>,
    /// Present when the lookup missed and a background fetch was queued.
    pub pending: Option<FetchTicket>,
}

/// Read side: serves persisted listings and triggers a fetch on a cache miss.
#[derive(Clone)]
pub struct RegionQueryService {
    store: Arc<dyn PlaceStore>,
    orchestrator: Arc<FetchOrchestrator>,
    queue: Option<FetchQueue>,
}

impl RegionQueryService {
    pub fn new(
        store: Arc<dyn PlaceStore>,
        orchestrator: Arc<FetchOrchestrator>,
        queue: Option<FetchQueue>,
    ) -> Self {
        Self {
            store,
            orchestrator,
            queue,
        }
    }

    pub fn all(&self) -> AppResult<Vec<PlaceRecord>> {
        self.store.find_all()
    }

    /// Looks up `term`'s normalized region, fetching synchronously on a miss.
    pub async fn by_region(&self, term: &str) -> AppResult<Vec<PlaceRecord>> {
        let region = normalize_region(term);
        let records = self.store.find_by_region(&region)?;
        if !records.is_empty() {
            debug!(%region, count = records.len(), "serving stored restaurants");
            return Ok(records);
        }

        info!(%region, "no stored restaurants; fetching from provider");
        self.orchestrator.fetch_and_save(term).await;
        self.store.find_by_region(&region)
    }

    /// Returns whatever is stored now and, on a miss, queues a background fetch.
    pub fn by_region_or_schedule(&self, term: &str) -> AppResult<RegionLookup> {
        let region = normalize_region(term);
        let records = self.store.find_by_region(&region)?;
        if !records.is_empty() {
            return Ok(RegionLookup {
                records,
                pending: None,
            });
        }

        let pending = match &self.queue {
            Some(queue) => match queue.submit(term) {
                Ok(ticket) => Some(ticket),
                Err(err) => {
                    warn!(%region, %err, "could not schedule background fetch");
                    None
                }
            },
            None => {
                warn!(%region, "no fetch queue configured; skipping background fetch");
                None
            }
        };
        Ok(RegionLookup { records, pending })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::tests::{candidate, FixedSearch, STOCK};
    use crate::aggregator::PlaceAggregator;
    use crate::images::ImageResolver;
    use crate::orchestrator::SerializationScope;
    use crate::places::SearchRewriter;
    use crate::store::tests::memory_store;

    fn service(search: Arc<FixedSearch>, with_queue: bool) -> RegionQueryService {
        let store: Arc<dyn PlaceStore> = Arc::new(memory_store());
        let aggregator = PlaceAggregator::new(
            search,
            ImageResolver::new(Vec::new(), STOCK),
            store.clone(),
            SearchRewriter::default(),
        );
        let orchestrator = Arc::new(FetchOrchestrator::new(
            aggregator,
            SerializationScope::Global,
        ));
        let queue = with_queue.then(|| FetchQueue::spawn(orchestrator.clone(), 4));
        RegionQueryService::new(store, orchestrator, queue)
    }

    #[tokio::test]
    async fn fetches_on_miss_then_serves_from_store() {
        let search = FixedSearch::new(vec![candidate("A", "123 St"), candidate("B", "456 Ave")]);
        let service = service(search.clone(), false);

        let first = service.by_region("홍대 맛집").await.unwrap();
        assert_eq!(first.len(), 2);
        let second = service.by_region("홍대맛집").await.unwrap();
        assert_eq!(second, first);
        assert_eq!(search.queries.lock().len(), 1);
        assert_eq!(service.all().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn schedules_background_fetch_on_miss() {
        let search = FixedSearch::new(vec![candidate("A", "123 St")]);
        let service = service(search, true);

        let lookup = service.by_region_or_schedule("강남 음식점").unwrap();
        assert!(lookup.records.is_empty());
        let outcome = lookup.pending.unwrap().completed().await.unwrap();
        assert_eq!(outcome.inserted(), 1);

        let hit = service.by_region_or_schedule("강남 음식점").unwrap();
        assert_eq!(hit.records.len(), 1);
        assert!(hit.pending.is_none());
    }

    #[tokio::test]
    async fn lookup_without_queue_returns_empty() {
        let service = service(FixedSearch::new(Vec::new()), false);
        let lookup = service.by_region_or_schedule("어딘가").unwrap();
        assert!(lookup.records.is_empty());
        assert!(lookup.pending.is_none());
    }
}

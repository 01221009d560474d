use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::AppResult;
use crate::images::{ImageResolver, ImageSource};
use crate::kakao::PlaceSearch;
use crate::places::{normalize_region, NewPlace, RawCandidate, SearchRewriter};
use crate::store::PlaceStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub region: String,
    pub query: String,
    pub candidates: usize,
    pub already_stored: usize,
    pub duplicates: usize,
    pub provider_images: usize,
    pub fallback_images: usize,
    pub raced: usize,
    pub inserted: usize,
}

/// Turns one region term into newly persisted, deduplicated listings.
#[derive(Clone)]
pub struct PlaceAggregator {
    search: Arc<dyn PlaceSearch>,
    images: ImageResolver,
    store: Arc<dyn PlaceStore>,
    rewriter: SearchRewriter,
}

impl PlaceAggregator {
    pub fn new(
        search: Arc<dyn PlaceSearch>,
        images: ImageResolver,
        store: Arc<dyn PlaceStore>,
        rewriter: SearchRewriter,
    ) -> Self {
        Self {
            search,
            images,
            store,
            rewriter,
        }
    }

    /// Returns the number of records inserted. Store failures propagate; search
    /// failures count as an empty result.
    pub async fn collect_and_persist(&self, term: &str) -> AppResult<usize> {
        Ok(self.collect(term).await?.inserted)
    }

    pub async fn collect(&self, term: &str) -> AppResult<CollectionStats> {
        let region = normalize_region(term);
        let query = self.rewriter.rewrite(term);
        let mut stats = CollectionStats {
            region: region.clone(),
            query: query.clone(),
            ..CollectionStats::default()
        };

        let raw = match self.search.search(&query).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%region, %query, kind = err.kind(), %err, "place search failed");
                Vec::new()
            }
        };
        stats.candidates = raw.len();
        if raw.is_empty() {
            debug!(%region, %query, "no candidates returned");
            return Ok(stats);
        }

        let mut fresh = Vec::with_capacity(raw.len());
        for candidate in raw {
            if self.store.exists_by_key(candidate.key())? {
                stats.already_stored += 1;
                continue;
            }
            fresh.push(candidate);
        }

        let unique = dedup_first_wins(fresh);
        stats.duplicates = stats.candidates - stats.already_stored - unique.len();

        let mut enriched = Vec::with_capacity(unique.len());
        for candidate in unique {
            let image = self.images.resolve(&candidate.name).await;
            match image.source {
                ImageSource::Provider(_) => stats.provider_images += 1,
                ImageSource::Fallback => stats.fallback_images += 1,
            }
            enriched.push(NewPlace::from_candidate(candidate, &region, image.url));
        }

        let mut survivors = Vec::with_capacity(enriched.len());
        for record in enriched {
            if self.store.exists_by_key(record.key())? {
                stats.raced += 1;
                continue;
            }
            survivors.push(record);
        }

        stats.inserted = self.store.bulk_insert(&survivors)?;
        stats.raced += survivors.len() - stats.inserted;
        if stats.inserted > 0 {
            info!(%region, %query, inserted = stats.inserted, "stored new restaurants");
        } else {
            debug!(%region, %query, "nothing new to store");
        }
        Ok(stats)
    }
}

/// Keeps the first candidate per `name_address` key, preserving provider order.
fn dedup_first_wins(candidates: Vec<RawCandidate>) -> Vec<RawCandidate> {
    let mut seen = HashSet::with_capacity(candidates.len());
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.key().joined()))
        .collect()
}

use serde::{Deserialize, Serialize};

/// Persisted restaurant listing. Written once by the aggregator, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub address: String,
    pub phone: String,
    pub longitude: f64,
    pub latitude: f64,
    pub region: String,
    pub source_url: String,
    pub image_url: String,
}

/// A record that survived dedup and is ready for insertion; the store assigns `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPlace {
    pub name: String,
    pub category: String,
    pub address: String,
    pub phone: String,
    pub longitude: f64,
    pub latitude: f64,
    pub region: String,
    pub source_url: String,
    pub image_url: String,
}

impl NewPlace {
    pub fn from_candidate(candidate: RawCandidate, region: &str, image_url: String) -> Self {
        Self {
            name: candidate.name,
            category: candidate.category,
            address: candidate.address,
            phone: candidate.phone,
            longitude: candidate.longitude,
            latitude: candidate.latitude,
            region: region.to_string(),
            source_url: candidate.place_url,
            image_url,
        }
    }

    pub fn key(&self) -> PlaceKey<'_> {
        PlaceKey::new(&self.name, &self.address)
    }
}

/// Provider-native search hit before enrichment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawCandidate {
    pub name: String,
    pub category: String,
    pub address: String,
    pub phone: String,
    pub longitude: f64,
    pub latitude: f64,
    pub place_url: String,
}

impl RawCandidate {
    pub fn key(&self) -> PlaceKey<'_> {
        PlaceKey::new(&self.name, &self.address)
    }
}

/// The soft-unique `(name, address)` identity of a place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaceKey<'a> {
    pub name: &'a str,
    pub address: &'a str,
}

impl<'a> PlaceKey<'a> {
    pub fn new(name: &'a str, address: &'a str) -> Self {
        Self { name, address }
    }

    /// `name_address`, the form used to order in-batch dedup.
    pub fn joined(&self) -> String {
        format!("{}_{}", self.name, self.address)
    }
}

/// Storage/lookup form of a region term: every whitespace character removed.
pub fn normalize_region(term: &str) -> String {
    term.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Rewrites user-facing search words to the ones the place-search provider
/// indexes better. Only the outgoing query is rewritten, never the stored region.
#[derive(Debug, Clone)]
pub struct SearchRewriter {
    synonyms: Vec<(String, String)>,
}

impl Default for SearchRewriter {
    fn default() -> Self {
        Self::new([("음식점", "맛집")])
    }
}

impl SearchRewriter {
    pub fn new<I, F, T>(synonyms: I) -> Self
    where
        I: IntoIterator<Item = (F, T)>,
        F: Into<String>,
        T: Into<String>,
    {
        Self {
            synonyms: synonyms
                .into_iter()
                .map(|(from, to)| (from.into(), to.into()))
                .filter(|(from, _)| !from.is_empty())
                .collect(),
        }
    }

    pub fn rewrite(&self, term: &str) -> String {
        let mut query = term.trim().to_string();
        for (from, to) in &self.synonyms {
            if query.contains(from.as_str()) {
                query = query.replace(from.as_str(), to);
            }
        }
        query
    }
}

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::config::AppConfig;
use crate::errors::{send_json, ProviderError, ProviderResult};
use crate::places::RawCandidate;

const PROVIDER: &str = "kakao_local";

#[async_trait]
pub trait PlaceSearch: Send + Sync {
    /// Returns the first page of provider hits for `term`, in provider order.
    async fn search(&self, term: &str) -> ProviderResult<Vec<RawCandidate>>;
}

pub struct KakaoLocalClient {
    http: Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl KakaoLocalClient {
    pub fn new(http: Client, config: &AppConfig) -> Self {
        Self {
            http,
            endpoint: config.kakao_search_endpoint.clone(),
            api_key: config.kakao_api_key.clone(),
        }
    }

    fn authorization(&self) -> ProviderResult<String> {
        let key = self
            .api_key
            .as_ref()
            .ok_or(ProviderError::MissingCredentials { provider: PROVIDER })?;
        let key = key.expose_secret();
        if key.starts_with("KakaoAK ") {
            Ok(key.to_string())
        } else {
            Ok(format!("KakaoAK {key}"))
        }
    }
}

#[async_trait]
impl PlaceSearch for KakaoLocalClient {
    async fn search(&self, term: &str) -> ProviderResult<Vec<RawCandidate>> {
        let authorization = self.authorization()?;
        let request = self
            .http
            .get(&self.endpoint)
            .query(&[("query", term)])
            .header(reqwest::header::AUTHORIZATION, authorization);

        let parsed: KeywordSearchResponse = send_json(PROVIDER, request).await?;
        let Some(documents) = parsed.documents else {
            debug!(query = term, "kakao response carried no documents");
            return Ok(Vec::new());
        };

        let candidates: Vec<RawCandidate> = documents
            .into_iter()
            .filter_map(|doc| {
                let candidate = doc.into_candidate();
                if candidate.is_none() {
                    trace!(query = term, "skipping kakao document without a name");
                }
                candidate
            })
            .collect();
        debug!(query = term, hits = candidates.len(), "kakao search finished");
        Ok(candidates)
    }
}

#[derive(Deserialize)]
struct KeywordSearchResponse {
    #[serde(default)]
    documents: Option<Vec<KeywordDocument>>,
}

#[derive(Deserialize)]
struct KeywordDocument {
    #[serde(default)]
    place_name: String,
    #[serde(default)]
    category_name: String,
    #[serde(default)]
    address_name: String,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,
    #[serde(default)]
    place_url: String,
}

impl KeywordDocument {
    fn into_candidate(self) -> Option<RawCandidate> {
        let name = self.place_name.trim().to_string();
        if name.is_empty() {
            return None;
        }
        Some(RawCandidate {
            name,
            category: self.category_name,
            address: self.address_name,
            phone: self.phone.unwrap_or_default(),
            longitude: parse_coordinate(self.x.as_deref()),
            latitude: parse_coordinate(self.y.as_deref()),
            place_url: self.place_url,
        })
    }
}

fn parse_coordinate(value: Option<&str>) -> f64 {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use httptest::matchers::{all_of, contains, key, request, url_decoded};
    use httptest::responders::{json_encoded, status_code};
    use httptest::{Expectation, Server};
    use serde_json::json;

    use super::*;

    fn client_for(server: &Server, key: Option<&str>) -> KakaoLocalClient {
        KakaoLocalClient {
            http: Client::new(),
            endpoint: server.url_str("/v2/local/search/keyword.json"),
            api_key: key.map(|k| SecretString::from(k.to_string())),
        }
    }

    #[tokio::test]
    async fn parses_documents_in_provider_order() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/v2/local/search/keyword.json"),
                request::query(url_decoded(contains(("query", "홍대 맛집")))),
                request::headers(contains(key("authorization"))),
            ])
            .respond_with(json_encoded(json!({
                "documents": [
                    {
                        "place_name": "감성타코 홍대점",
                        "category_name": "음식점 > 양식 > 멕시칸",
                        "address_name": "서울 마포구 서교동 1",
                        "phone": "02-000-0000",
                        "x": "126.9236",
                        "y": "37.5563",
                        "place_url": "http://place.map.kakao.com/1"
                    },
                    {
                        "place_name": "",
                        "address_name": "ignored"
                    },
                    {
                        "place_name": "연남동 국수",
                        "address_name": "서울 마포구 연남동 2",
                        "x": "not-a-number"
                    }
                ],
                "meta": { "total_count": 3 }
            }))),
        );

        let client = client_for(&server, Some("test-key"));
        let hits = client.search("홍대 맛집").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].name, "감성타코 홍대점");
        assert_eq!(hits[0].phone, "02-000-0000");
        assert!((hits[0].longitude - 126.9236).abs() < f64::EPSILON);
        assert_eq!(hits[1].name, "연남동 국수");
        assert_eq!(hits[1].phone, "");
        assert_eq!(hits[1].longitude, 0.0);
    }

    #[tokio::test]
    async fn missing_documents_field_yields_no_hits() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/v2/local/search/keyword.json"))
                .respond_with(json_encoded(json!({ "meta": {} }))),
        );

        let client = client_for(&server, Some("KakaoAK test-key"));
        assert!(client.search("부산 맛집").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn classifies_provider_failures() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/v2/local/search/keyword.json"))
                .respond_with(status_code(401)),
        );

        let client = client_for(&server, Some("bad-key"));
        let err = client.search("대구 맛집").await.unwrap_err();
        assert!(matches!(err, ProviderError::Status { .. }));

        let unconfigured = client_for(&server, None);
        let err = unconfigured.search("대구 맛집").await.unwrap_err();
        assert_eq!(err.kind(), "missing_credentials");
    }

    #[tokio::test]
    async fn non_array_documents_are_malformed() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/v2/local/search/keyword.json"))
                .respond_with(json_encoded(json!({ "documents": "nope" }))),
        );

        let client = client_for(&server, Some("test-key"));
        let err = client.search("x").await.unwrap_err();
        assert!(matches!(err, ProviderError::Malformed { .. }));
    }
}

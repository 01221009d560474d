use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::errors::{send_json, ProviderError, ProviderResult};

const GOOGLE_PROVIDER: &str = "google_places";
const NAVER_PROVIDER: &str = "naver_image";
const NAVER_QUERY_SUFFIX: &str = " 음식 메뉴";
const ACCEPTED_EXTENSIONS: &[&str] = &[".jpg", ".png"];
const REJECTED_HOST_MARKERS: &[&str] = &["blog", "naver.net"];

/// One step of the image fallback chain.
///
/// `Ok(None)` means the provider answered but had nothing usable; `Err` means
/// the call itself failed.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn find_image(&self, place_name: &str) -> ProviderResult<Option<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Provider(&'static str),
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub url: String,
    pub source: ImageSource,
}

/// Tries each provider in order and stops at the first usable URL, ending in
/// a fixed stock photo when every provider comes up empty.
#[derive(Clone)]
pub struct ImageResolver {
    providers: Vec<Arc<dyn ImageProvider>>,
    fallback_url: String,
}

impl ImageResolver {
    pub fn new(providers: Vec<Arc<dyn ImageProvider>>, fallback_url: impl Into<String>) -> Self {
        Self {
            providers,
            fallback_url: fallback_url.into(),
        }
    }

    pub fn from_config(http: Client, config: &AppConfig) -> Self {
        let google: Arc<dyn ImageProvider> = Arc::new(GooglePhotoProvider::new(http.clone(), config));
        let naver: Arc<dyn ImageProvider> = Arc::new(NaverImageProvider::new(http, config));
        Self::new(vec![google, naver], config.fallback_image_url.clone())
    }

    pub fn fallback_url(&self) -> &str {
        &self.fallback_url
    }

    pub async fn resolve_image(&self, place_name: &str) -> String {
        self.resolve(place_name).await.url
    }

    pub async fn resolve(&self, place_name: &str) -> ResolvedImage {
        for provider in &self.providers {
            match provider.find_image(place_name).await {
                Ok(Some(url)) if !url.trim().is_empty() => {
                    debug!(place = place_name, provider = provider.name(), "image resolved");
                    return ResolvedImage {
                        url,
                        source: ImageSource::Provider(provider.name()),
                    };
                }
                Ok(_) => {
                    debug!(place = place_name, provider = provider.name(), "provider had no image");
                }
                Err(err) => {
                    warn!(
                        place = place_name,
                        provider = provider.name(),
                        kind = err.kind(),
                        %err,
                        "image provider failed; trying next"
                    );
                }
            }
        }

        ResolvedImage {
            url: self.fallback_url.clone(),
            source: ImageSource::Fallback,
        }
    }
}

pub struct GooglePhotoProvider {
    http: Client,
    endpoint: String,
    media_base: String,
    api_key: Option<SecretString>,
    language_code: String,
    region_code: String,
    max_width: u32,
}

impl GooglePhotoProvider {
    pub fn new(http: Client, config: &AppConfig) -> Self {
        Self {
            http,
            endpoint: config.google_places_search_endpoint.clone(),
            media_base: config.google_places_media_base.clone(),
            api_key: config.google_places_api_key.clone(),
            language_code: config.google_language_code.clone(),
            region_code: config.google_region_code.clone(),
            max_width: config.google_photo_max_width,
        }
    }

    fn media_url(&self, photo_name: &str, api_key: &str) -> String {
        format!(
            "{}/{}/media?maxWidthPx={}&key={}",
            self.media_base,
            photo_name.trim_start_matches('/'),
            self.max_width,
            api_key
        )
    }
}

#[async_trait]
impl ImageProvider for GooglePhotoProvider {
    fn name(&self) -> &'static str {
        GOOGLE_PROVIDER
    }

    async fn find_image(&self, place_name: &str) -> ProviderResult<Option<String>> {
        #[derive(Serialize)]
        struct RequestBody<'a> {
            #[serde(rename = "textQuery")]
            text_query: &'a str,
            #[serde(rename = "languageCode")]
            language_code: &'a str,
            #[serde(rename = "regionCode")]
            region_code: &'a str,
        }

        #[derive(Deserialize)]
        struct Response {
            places: Option<Vec<ResponsePlace>>,
        }

        #[derive(Deserialize)]
        struct ResponsePlace {
            photos: Option<Vec<ResponsePhoto>>,
        }

        #[derive(Deserialize)]
        struct ResponsePhoto {
            name: Option<String>,
        }

        let api_key = self.api_key.as_ref().ok_or(ProviderError::MissingCredentials {
            provider: GOOGLE_PROVIDER,
        })?;

        let body = RequestBody {
            text_query: place_name,
            language_code: &self.language_code,
            region_code: &self.region_code,
        };
        let request = self
            .http
            .post(&self.endpoint)
            .header("X-Goog-Api-Key", api_key.expose_secret())
            .header("X-Goog-FieldMask", "places.photos,places.displayName")
            .json(&body);

        let parsed: Response = send_json(GOOGLE_PROVIDER, request).await?;
        let photo_name = parsed
            .places
            .and_then(|places| places.into_iter().next())
            .and_then(|place| place.photos)
            .and_then(|photos| photos.into_iter().next())
            .and_then(|photo| photo.name)
            .filter(|name| !name.trim().is_empty());

        Ok(photo_name.map(|name| self.media_url(&name, api_key.expose_secret())))
    }
}

pub struct NaverImageProvider {
    http: Client,
    endpoint: String,
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    display: u32,
}

impl NaverImageProvider {
    pub fn new(http: Client, config: &AppConfig) -> Self {
        Self {
            http,
            endpoint: config.naver_image_endpoint.clone(),
            client_id: config.naver_client_id.clone(),
            client_secret: config.naver_client_secret.clone(),
            display: config.naver_image_display,
        }
    }
}

#[async_trait]
impl ImageProvider for NaverImageProvider {
    fn name(&self) -> &'static str {
        NAVER_PROVIDER
    }

    async fn find_image(&self, place_name: &str) -> ProviderResult<Option<String>> {
        #[derive(Deserialize)]
        struct Response {
            #[serde(default)]
            items: Vec<ResponseItem>,
        }

        #[derive(Deserialize)]
        struct ResponseItem {
            #[serde(default)]
            link: String,
        }

        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) else {
            return Err(ProviderError::MissingCredentials {
                provider: NAVER_PROVIDER,
            });
        };

        let query = format!("{place_name}{NAVER_QUERY_SUFFIX}");
        let display = self.display.to_string();
        let request = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("query", query.as_str()),
                ("display", display.as_str()),
                ("sort", "sim"),
            ])
            .header("X-Naver-Client-Id", client_id)
            .header("X-Naver-Client-Secret", client_secret.expose_secret());

        let parsed: Response = send_json(NAVER_PROVIDER, request).await?;
        Ok(parsed
            .items
            .into_iter()
            .map(|item| item.link)
            .find(|link| is_acceptable_image(link)))
    }
}

/// Direct `.jpg`/`.png` links that are not served from blog or Naver CDN hosts.
pub fn is_acceptable_image(link: &str) -> bool {
    ACCEPTED_EXTENSIONS.iter().any(|ext| link.ends_with(ext))
        && !REJECTED_HOST_MARKERS
            .iter()
            .any(|marker| link.contains(marker))
}

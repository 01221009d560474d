use std::path::PathBuf;
use std::str::FromStr;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::{debug, warn};

use crate::orchestrator::SerializationScope;

pub const DEFAULT_KAKAO_SEARCH_ENDPOINT: &str =
    "https://dapi.kakao.com/v2/local/search/keyword.json";
pub const DEFAULT_GOOGLE_PLACES_SEARCH_ENDPOINT: &str =
    "https://places.googleapis.com/v1/places:searchText";
pub const DEFAULT_GOOGLE_PLACES_MEDIA_BASE: &str = "https://places.googleapis.com/v1";
pub const DEFAULT_NAVER_IMAGE_ENDPOINT: &str = "https://openapi.naver.com/v1/search/image";
pub const DEFAULT_FALLBACK_IMAGE_URL: &str =
    "https://images.unsplash.com/photo-1517248135467-4c7edcad34c4?w=800";

const DEFAULT_TELEMETRY_BUFFER_MAX_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_TELEMETRY_BUFFER_MAX_FILES: usize = 5;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub kakao_api_key: Option<SecretString>,
    pub google_places_api_key: Option<SecretString>,
    pub naver_client_id: Option<String>,
    pub naver_client_secret: Option<SecretString>,
    pub kakao_search_endpoint: String,
    pub google_places_search_endpoint: String,
    pub google_places_media_base: String,
    pub naver_image_endpoint: String,
    pub google_photo_max_width: u32,
    pub google_language_code: String,
    pub google_region_code: String,
    pub naver_image_display: u32,
    pub fallback_image_url: String,
    pub http_timeout_secs: Option<u64>,
    pub data_dir: PathBuf,
    pub database_file_name: String,
    pub fetch_serialization: SerializationScope,
    pub fetch_queue_capacity: usize,
    pub telemetry_enabled_by_default: bool,
    pub telemetry_batch_size: usize,
    pub telemetry_buffer_max_bytes: u64,
    pub telemetry_buffer_max_files: usize,
    pub prefetch_regions: Vec<String>,
    pub prefetch_interval_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub kakao_search_endpoint: String,
    pub google_places_search_endpoint: String,
    pub naver_image_endpoint: String,
    pub naver_image_display: u32,
    pub fallback_image_url: String,
    pub http_timeout_secs: Option<u64>,
    pub database_file_name: String,
    pub fetch_serialization: SerializationScope,
    pub fetch_queue_capacity: usize,
    pub telemetry_enabled_by_default: bool,
    pub has_kakao_key: bool,
    pub has_google_places_key: bool,
    pub has_naver_credentials: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            kakao_api_key: parse_secret("KAKAO_REST_API_KEY"),
            google_places_api_key: parse_secret("GOOGLE_PLACES_API_KEY"),
            naver_client_id: env::var("NAVER_CLIENT_ID")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            naver_client_secret: parse_secret("NAVER_CLIENT_SECRET"),
            kakao_search_endpoint: parse_string(
                "KAKAO_SEARCH_ENDPOINT",
                DEFAULT_KAKAO_SEARCH_ENDPOINT,
            ),
            google_places_search_endpoint: parse_string(
                "GOOGLE_PLACES_SEARCH_ENDPOINT",
                DEFAULT_GOOGLE_PLACES_SEARCH_ENDPOINT,
            ),
            google_places_media_base: parse_string(
                "GOOGLE_PLACES_MEDIA_BASE",
                DEFAULT_GOOGLE_PLACES_MEDIA_BASE,
            )
            .trim_end_matches('/')
            .to_string(),
            naver_image_endpoint: parse_string(
                "NAVER_IMAGE_ENDPOINT",
                DEFAULT_NAVER_IMAGE_ENDPOINT,
            ),
            google_photo_max_width: parse_u32("GOOGLE_PHOTO_MAX_WIDTH", 800).max(1),
            google_language_code: parse_string("GOOGLE_LANGUAGE_CODE", "ko"),
            google_region_code: parse_string("GOOGLE_REGION_CODE", "KR"),
            naver_image_display: parse_u32("NAVER_IMAGE_DISPLAY", 10).clamp(1, 100),
            fallback_image_url: parse_string("FALLBACK_IMAGE_URL", DEFAULT_FALLBACK_IMAGE_URL),
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0),
            data_dir: PathBuf::from(parse_string("DATA_DIR", "data")),
            database_file_name: parse_string("DATABASE_FILE_NAME", "restaurants.db"),
            fetch_serialization: parse_scope("FETCH_SERIALIZATION"),
            fetch_queue_capacity: parse_usize("FETCH_QUEUE_CAPACITY", 16).max(1),
            telemetry_enabled_by_default: parse_bool("TELEMETRY_ENABLED", true),
            telemetry_batch_size: parse_usize("TELEMETRY_BATCH_SIZE", 10).max(1),
            telemetry_buffer_max_bytes: parse_u64(
                "TELEMETRY_BUFFER_MAX_BYTES",
                DEFAULT_TELEMETRY_BUFFER_MAX_BYTES,
            ),
            telemetry_buffer_max_files: parse_usize(
                "TELEMETRY_BUFFER_MAX_FILES",
                DEFAULT_TELEMETRY_BUFFER_MAX_FILES,
            )
            .max(1),
            prefetch_regions: parse_list("PREFETCH_REGIONS"),
            prefetch_interval_ms: parse_u64("PREFETCH_INTERVAL_MS", 2_000),
        }
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            kakao_search_endpoint: self.kakao_search_endpoint.clone(),
            google_places_search_endpoint: self.google_places_search_endpoint.clone(),
            naver_image_endpoint: self.naver_image_endpoint.clone(),
            naver_image_display: self.naver_image_display,
            fallback_image_url: self.fallback_image_url.clone(),
            http_timeout_secs: self.http_timeout_secs,
            database_file_name: self.database_file_name.clone(),
            fetch_serialization: self.fetch_serialization,
            fetch_queue_capacity: self.fetch_queue_capacity,
            telemetry_enabled_by_default: self.telemetry_enabled_by_default,
            has_kakao_key: self.kakao_api_key.is_some(),
            has_google_places_key: self.google_places_api_key.is_some(),
            has_naver_credentials: self.naver_client_id.is_some()
                && self.naver_client_secret.is_some(),
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_secret(key: &str) -> Option<SecretString> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|v| SecretString::from(v.trim().to_string()))
}

fn parse_string(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_scope(key: &str) -> SerializationScope {
    match env::var(key) {
        Ok(value) => SerializationScope::from_str(&value).unwrap_or_else(|err| {
            warn!(%err, "falling back to global fetch serialization");
            SerializationScope::Global
        }),
        Err(_) => SerializationScope::Global,
    }
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

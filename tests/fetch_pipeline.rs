use httptest::matchers::{all_of, contains, key, request, url_decoded};
use httptest::responders::{json_encoded, status_code};
use httptest::{Expectation, Server};
use secrecy::SecretString;
use serde_json::json;
use tempfile::{tempdir, TempDir};

use restaurant_aggregator::{AppConfig, FetchOutcome, RestaurantService};

const KAKAO_PATH: &str = "/v2/local/search/keyword.json";
const GOOGLE_PATH: &str = "/v1/places:searchText";
const NAVER_PATH: &str = "/v1/search/image";
const STOCK: &str = "https://stock.example/restaurant.jpg";

fn config_for(server: &Server, dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::from_env();
    config.kakao_api_key = Some(SecretString::from("kakao-key".to_string()));
    config.google_places_api_key = Some(SecretString::from("google-key".to_string()));
    config.naver_client_id = Some("naver-id".into());
    config.naver_client_secret = Some(SecretString::from("naver-secret".to_string()));
    config.kakao_search_endpoint = server.url_str(KAKAO_PATH);
    config.google_places_search_endpoint = server.url_str(GOOGLE_PATH);
    config.google_places_media_base = "https://media.example/v1".into();
    config.naver_image_endpoint = server.url_str(NAVER_PATH);
    config.fallback_image_url = STOCK.into();
    config.data_dir = dir.path().to_path_buf();
    config.database_file_name = "pipeline.db".into();
    config.google_photo_max_width = 800;
    config.telemetry_enabled_by_default = true;
    config.telemetry_batch_size = 1;
    config
}

fn kakao_documents() -> serde_json::Value {
    json!({
        "documents": [
            {
                "place_name": "A",
                "category_name": "음식점 > 한식",
                "address_name": "123 St",
                "phone": "02-111-1111",
                "x": "127.0276",
                "y": "37.4979",
                "place_url": "http://place.map.kakao.com/1"
            },
            {
                "place_name": "A",
                "category_name": "음식점 > 한식",
                "address_name": "123 St",
                "phone": "02-111-1111",
                "x": "127.0276",
                "y": "37.4979",
                "place_url": "http://place.map.kakao.com/1"
            },
            {
                "place_name": "B",
                "category_name": "음식점 > 일식",
                "address_name": "456 Ave",
                "x": "127.0280",
                "y": "37.4990",
                "place_url": "http://place.map.kakao.com/2"
            }
        ]
    })
}

#[tokio::test]
async fn region_lookup_fetches_once_and_uses_secondary_images() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", KAKAO_PATH),
            request::query(url_decoded(contains(("query", "강남 맛집")))),
            request::headers(contains(key("authorization"))),
        ])
        .times(1)
        .respond_with(json_encoded(kakao_documents())),
    );
    server.expect(
        Expectation::matching(request::method_path("POST", GOOGLE_PATH))
            .times(2)
            .respond_with(status_code(503)),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", NAVER_PATH))
            .times(2)
            .respond_with(json_encoded(json!({
                "items": [
                    { "link": "https://blog.example.com/menu.jpg" },
                    { "link": "https://img.example.com/menu.png" }
                ]
            }))),
    );

    let dir = tempdir().unwrap();
    let service = RestaurantService::initialize(config_for(&server, &dir)).unwrap();

    let records = service.regions().by_region("강남 음식점").await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].name, "A");
    assert_eq!(records[1].name, "B");
    assert!(records.iter().all(|r| r.region == "강남음식점"));
    assert!(records
        .iter()
        .all(|r| r.image_url == "https://img.example.com/menu.png"));
    assert_eq!(records[1].phone, "");

    let again = service.regions().by_region("강남음식점").await.unwrap();
    assert_eq!(again, records);
    assert_eq!(service.regions().all().unwrap().len(), 2);
}

#[tokio::test]
async fn primary_photo_short_circuits_secondary() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", KAKAO_PATH))
            .respond_with(json_encoded(json!({
                "documents": [{
                    "place_name": "감성타코 홍대점",
                    "address_name": "서울 마포구 서교동 1",
                    "x": "126.92",
                    "y": "37.55",
                    "place_url": "http://place.map.kakao.com/3"
                }]
            }))),
    );
    server.expect(
        Expectation::matching(request::method_path("POST", GOOGLE_PATH)).respond_with(
            json_encoded(json!({
                "places": [{ "photos": [{ "name": "places/xyz/photos/p1" }] }]
            })),
        ),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", NAVER_PATH))
            .times(0)
            .respond_with(status_code(500)),
    );

    let dir = tempdir().unwrap();
    let service = RestaurantService::initialize(config_for(&server, &dir)).unwrap();

    let outcome = service.fetch("홍대 맛집").await;
    assert_eq!(
        outcome,
        FetchOutcome::Completed {
            region: "홍대맛집".into(),
            inserted: 1
        }
    );
    let stored = service.stored_records("홍대 맛집").unwrap();
    assert_eq!(
        stored[0].image_url,
        "https://media.example/v1/places/xyz/photos/p1/media?maxWidthPx=800&key=google-key"
    );
}

#[tokio::test]
async fn failing_providers_still_persist_with_stock_image() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", KAKAO_PATH))
            .respond_with(json_encoded(json!({
                "documents": [{ "place_name": "C", "address_name": "789 Rd" }]
            }))),
    );
    server.expect(
        Expectation::matching(request::method_path("POST", GOOGLE_PATH))
            .respond_with(json_encoded(json!({ "places": [] }))),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", NAVER_PATH))
            .respond_with(status_code(500)),
    );

    let dir = tempdir().unwrap();
    let service = RestaurantService::initialize(config_for(&server, &dir)).unwrap();

    let ticket = service.schedule_fetch("부산 맛집").unwrap();
    let outcome = ticket.completed().await.unwrap();
    assert_eq!(outcome.inserted(), 1);

    let stored = service.stored_records("부산맛집").unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].image_url, STOCK);

    service.flush_telemetry().unwrap();
    let events = std::fs::read_to_string(dir.path().join("telemetry-buffer.jsonl")).unwrap();
    assert!(events.contains("fetch_completed"));
    assert!(service.db_path().unwrap().exists());
}

#[tokio::test]
async fn search_outage_looks_like_no_results() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", KAKAO_PATH))
            .times(2)
            .respond_with(status_code(500)),
    );
    server.expect(
        Expectation::matching(request::method_path("POST", GOOGLE_PATH))
            .times(0)
            .respond_with(status_code(500)),
    );

    let dir = tempdir().unwrap();
    let service = RestaurantService::initialize(config_for(&server, &dir)).unwrap();

    service.fetch_and_save("대구 맛집").await;
    let lookup = service.regions().by_region_or_schedule("대구 맛집").unwrap();
    assert!(lookup.records.is_empty());
    let outcome = lookup.pending.unwrap().completed().await.unwrap();
    assert_eq!(outcome.inserted(), 0);
}

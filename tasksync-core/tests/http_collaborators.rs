use serde_json::json;
use tasksync_core::feed::{FeedSource, HttpFeed};
use tasksync_core::store::{CellRef, CellValue, RowStore, SheetsConfig, SheetsStore, TokenSource};
use tasksync_core::{CONTAINER_IDENTITY, FeedError, RowRef, StoreError};
use wiremock::matchers::{
    body_json, body_string_contains, header, method, path, path_regex, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED: &str = "BEGIN:VCALENDAR\r
VERSION:2.0\r
PRODID:-//Test//EN\r
X-WR-CALNAME:Student Calendar\r
BEGIN:VEVENT\r
UID:event-assignment-1\r
DTSTAMP:20240101T000000Z\r
DTSTART:20240102T090000Z\r
DTEND:20240102T100000Z\r
SUMMARY:Quiz 1 [CS 101]\r
URL:https://canvas.example.edu/courses/1/assignments/1\r
END:VEVENT\r
END:VCALENDAR\r
";

async fn sheets_server() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet-1"))
        .and(query_param("fields", "properties.title,sheets.properties"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "properties": { "title": "Coursework" },
            "sheets": [
                { "properties": { "title": "Events", "index": 0 } },
                { "properties": { "title": "Log", "index": 1 } }
            ]
        })))
        .mount(&server)
        .await;

    server
}

const SERVICE_ACCOUNT_EMAIL: &str = "sync-bot@project.iam.gserviceaccount.com";
const SERVICE_ACCOUNT_KEY: &str = include_str!("fixtures/service_account_key.pem");

fn service_account(server: &MockServer) -> TokenSource {
    TokenSource::from_service_account(SERVICE_ACCOUNT_EMAIL, SERVICE_ACCOUNT_KEY)
        .unwrap()
        .with_token_uri(format!("{}/token", server.uri()))
}

async fn mount_token_endpoint(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
        ))
        .and(body_string_contains("assertion="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn connect(server: &MockServer) -> SheetsStore {
    let config = SheetsConfig {
        spreadsheet: "https://docs.google.com/spreadsheets/d/sheet-1/edit".into(),
        api_base: Some(format!("{}/v4/", server.uri())),
        ..Default::default()
    };
    SheetsStore::connect(&config, TokenSource::Static("test-token".into()))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_http_feed_fetches_and_parses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feeds/user_abc.ics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .mount(&server)
        .await;

    let feed = HttpFeed::new(&format!("{}/feeds/user_abc.ics", server.uri())).unwrap();
    let records = feed.fetch_events().await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].uid, CONTAINER_IDENTITY);
    assert_eq!(records[1].uid, "event-assignment-1");
    assert_eq!(records[1].summary.as_deref(), Some("Quiz 1 [CS 101]"));
}

#[tokio::test]
async fn test_http_feed_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let feed = HttpFeed::new(&format!("{}/feeds/user_abc.ics", server.uri())).unwrap();

    assert!(matches!(feed.fetch_events().await, Err(FeedError::Status(500))));
}

#[tokio::test]
async fn test_connect_resolves_default_sheets() {
    let server = sheets_server().await;

    let store = connect(&server).await;

    assert_eq!(store.title(), "Coursework");
    assert_eq!(store.events_sheet().title(), "Events");
    assert_eq!(store.log_sheet().title(), "Log");
}

#[tokio::test]
async fn test_connect_with_missing_sheet_title() {
    let server = sheets_server().await;
    let config = SheetsConfig {
        spreadsheet: "sheet-1".into(),
        events_sheet: Some("Raw Upload".into()),
        api_base: Some(format!("{}/v4/", server.uri())),
        ..Default::default()
    };

    let result = SheetsStore::connect(&config, TokenSource::Static("test-token".into())).await;

    assert!(matches!(result, Err(StoreError::SheetNotFound(title)) if title == "Raw Upload"));
}

#[tokio::test]
async fn test_list_rows_numbers_from_row_two() {
    let server = sheets_server().await;
    Mock::given(method("GET"))
        .and(path_regex(r"/values/'Events'!A2:F$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "Events!A2:F3",
            "majorDimension": "ROWS",
            "values": [
                ["e1", "Quiz 1", "CS 101", "2024-01-02 9:00:00", "2024-01-02 10:00:00"],
                ["e2", "Essay", "ENG 1", "2024-01-03 9:00:00", "2024-01-03 10:00:00", "https://x"]
            ]
        })))
        .mount(&server)
        .await;
    let store = connect(&server).await;

    let rows = store.list_rows(store.events_sheet()).await.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].row, RowRef(2));
    assert_eq!(rows[0].link, "");
    assert_eq!(rows[1].row, RowRef(3));
    assert_eq!(rows[1].start, "2024-01-03 9:00:00");
}

#[tokio::test]
async fn test_append_rows_sends_raw_values() {
    let server = sheets_server().await;
    Mock::given(method("POST"))
        .and(path_regex(r"/values/'Events'!A1:F:append$"))
        .and(query_param("valueInputOption", "RAW"))
        .and(query_param("insertDataOption", "INSERT_ROWS"))
        .and(body_json(json!({
            "majorDimension": "ROWS",
            "values": [["e3", "Lab", "BIO", "2024-01-04 13:00:00", "2024-01-04 15:00:00", ""]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    let store = connect(&server).await;

    let rows = vec![vec![
        "e3".to_string(),
        "Lab".to_string(),
        "BIO".to_string(),
        "2024-01-04 13:00:00".to_string(),
        "2024-01-04 15:00:00".to_string(),
        String::new(),
    ]];
    store.append_rows(store.events_sheet(), &rows).await.unwrap();
}

#[tokio::test]
async fn test_log_row_keeps_numbers_numeric() {
    let server = sheets_server().await;
    Mock::given(method("POST"))
        .and(path_regex(r"/values/'Log'!A1:E:append$"))
        .and(body_json(json!({
            "majorDimension": "ROWS",
            "values": [["2024-01-04 13:00:00", 1, 0, "e1", ""]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    let store = connect(&server).await;

    let cells = vec![
        CellValue::from("2024-01-04 13:00:00"),
        CellValue::from(1usize),
        CellValue::from(0usize),
        CellValue::from("e1"),
        CellValue::from(""),
    ];
    store.append_log_row(store.log_sheet(), &cells).await.unwrap();
}

#[tokio::test]
async fn test_cell_writes_flush_in_one_batch() {
    let server = sheets_server().await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sheet-1/values:batchUpdate"))
        .and(body_json(json!({
            "valueInputOption": "RAW",
            "data": [{ "range": "'Log'!H1", "values": [["2024-01-04 13:00:00"]] }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    let store = connect(&server).await;
    let cell = CellRef::new(0, 7);

    store
        .set_cell(store.log_sheet(), cell, "2024-01-04 13:00:00".into())
        .await
        .unwrap();
    // buffered value is visible before the flush, without a request
    assert_eq!(
        store.get_cell(store.log_sheet(), cell).await.unwrap().as_deref(),
        Some("2024-01-04 13:00:00")
    );
    store.flush_cell_writes(store.log_sheet()).await.unwrap();
    // nothing left to send
    store.flush_cell_writes(store.log_sheet()).await.unwrap();
}

#[tokio::test]
async fn test_rate_limit_and_api_errors() {
    let server = sheets_server().await;
    Mock::given(method("PUT"))
        .and(path_regex(r"/values/'Events'!A2:F2$"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"/values/'Events'!A3:F3$"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": 400,
                "message": "Unable to parse range",
                "status": "INVALID_ARGUMENT"
            }
        })))
        .mount(&server)
        .await;
    let store = connect(&server).await;
    let cells: Vec<String> = ["e1", "T", "C", "s", "e", ""].iter().map(|c| c.to_string()).collect();

    let limited = store.update_row(store.events_sheet(), RowRef(2), &cells).await;
    let rejected = store.update_row(store.events_sheet(), RowRef(3), &cells).await;

    assert!(matches!(limited, Err(StoreError::RateLimited)));
    assert!(matches!(
        rejected,
        Err(StoreError::Api { status: 400, ref message }) if message == "Unable to parse range"
    ));
}

#[tokio::test]
async fn test_service_account_token_is_exchanged_once() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;

    let source = service_account(&server);

    assert_eq!(source.token().await.unwrap(), "test-token");
    assert_eq!(source.token().await.unwrap(), "test-token");
}

#[tokio::test]
async fn test_service_account_token_authorizes_sheet_requests() {
    let server = sheets_server().await;
    mount_token_endpoint(&server, 1).await;

    let config = SheetsConfig {
        spreadsheet: "sheet-1".into(),
        api_base: Some(format!("{}/v4/", server.uri())),
        ..Default::default()
    };
    let store = SheetsStore::connect(&config, service_account(&server)).await;

    assert!(store.is_ok());
}

#[tokio::test]
async fn test_rejected_assertion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid JWT Signature."
        })))
        .mount(&server)
        .await;

    let err = service_account(&server).token().await.unwrap_err();

    let StoreError::Credentials(message) = &err else {
        panic!("expected a credentials error, got {err:?}");
    };
    assert!(message.contains("400"));
    assert!(message.contains("invalid_grant"));
}

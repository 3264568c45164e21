use super::*;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn client() -> SheetsClient {
    SheetsClient::new().with_api_key("test-key")
}

/// Client wired to the stub, bypassing any ambient proxy configuration.
fn stub_client(addr: String) -> SheetsClient {
    let http = reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("http client");
    SheetsClient::new().with_base_url(addr).with_http_client(http)
}

#[test]
fn test_url_percent_encodes_segments() {
    let client = client();
    let url = client
        .url(&["v4", "spreadsheets", "sheet-1", "values", "My Topic!A2:B"])
        .unwrap();
    assert_eq!(
        url.path(),
        "/v4/spreadsheets/sheet-1/values/My%20Topic!A2:B"
    );
}

#[test]
fn test_url_appends_api_key_when_configured() {
    let with_key = client().url(&["v4", "spreadsheets", "sheet-1"]).unwrap();
    assert!(with_key.query().unwrap().contains("key=test-key"));

    let without_key = SheetsClient::new()
        .url(&["v4", "spreadsheets", "sheet-1"])
        .unwrap();
    assert!(without_key.query().is_none());
}

#[test]
fn test_base_url_override() {
    let client = SheetsClient::new().with_base_url("http://127.0.0.1:9999");
    let url = client.url(&["v4", "spreadsheets", "x"]).unwrap();
    assert!(url.as_str().starts_with("http://127.0.0.1:9999/v4/"));
}

// ============================================================
// Wire-level tests against a local stub server
// ============================================================

/// One recorded request: "METHOD path?query" plus the body.
#[derive(Debug, Clone)]
struct RecordedRequest {
    line: String,
    body: String,
}

/// Serve the scripted (status, body) responses in order, one connection per
/// request, recording what was asked.
async fn stub_server(
    responses: Vec<(u16, &'static str)>,
) -> (String, Arc<Mutex<Vec<RecordedRequest>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
    let addr = format!("http://{}", listener.local_addr().expect("stub addr"));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();

    tokio::spawn(async move {
        for (status, body) in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };

            // Read headers, then exactly Content-Length body bytes.
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            let header_end = loop {
                let Ok(n) = stream.read(&mut buf).await else {
                    return;
                };
                if n == 0 {
                    break raw.len();
                }
                raw.extend_from_slice(&buf[..n]);
                if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
            let content_length = head
                .lines()
                .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(str::trim).map(str::to_string))
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            while raw.len() < header_end + content_length {
                let Ok(n) = stream.read(&mut buf).await else {
                    return;
                };
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
            }

            seen.lock().unwrap().push(RecordedRequest {
                line: head.lines().next().unwrap_or_default().to_string(),
                body: String::from_utf8_lossy(&raw[header_end..]).to_string(),
            });

            let reason = if status < 400 { "OK" } else { "Error" };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (addr, requests)
}

#[tokio::test]
async fn test_list_topics_parses_sheet_properties() {
    let (addr, requests) = stub_server(vec![(
        200,
        r#"{"sheets": [{"properties": {"title": "Work", "sheetId": 0}}, {"properties": {"title": "Health", "sheetId": 42}}]}"#,
    )])
    .await;
    let client = stub_client(addr);

    let topics = client.list_topics("tok", "sheet-1").await.unwrap();
    assert_eq!(topics.len(), 2);
    assert_eq!(topics[1].title, "Health");
    assert_eq!(topics[1].sheet_id, 42);

    let line = requests.lock().unwrap()[0].line.clone();
    assert!(line.starts_with("GET /v4/spreadsheets/sheet-1?"));
    assert!(line.contains("fields=sheets"));
}

#[tokio::test]
async fn test_error_body_message_is_extracted() {
    let (addr, _) = stub_server(vec![(
        400,
        r#"{"error": {"code": 400, "message": "Unable to parse range: Nope!A2:B", "status": "INVALID_ARGUMENT"}}"#,
    )])
    .await;
    let client = stub_client(addr);

    let err = client
        .get_event_rows("tok", "sheet-1", "Nope", ReadWindow::TwoColumn)
        .await
        .unwrap_err();
    assert_eq!(err.status, Some(400));
    assert_eq!(err.message, "Unable to parse range: Nope!A2:B");
}

/// When the header write of the two-step creation fails, the freshly
/// created sheet is deleted again instead of surviving headerless.
#[tokio::test]
async fn test_create_topic_compensates_failed_header_write() {
    let (addr, requests) = stub_server(vec![
        (
            200,
            r#"{"replies": [{"addSheet": {"properties": {"title": "Work", "sheetId": 55}}}]}"#,
        ),
        (
            500,
            r#"{"error": {"code": 500, "message": "backend write failed", "status": "INTERNAL"}}"#,
        ),
        (200, r#"{"replies": [{}]}"#),
    ])
    .await;
    let client = stub_client(addr);

    let header_row: Vec<String> = vec!["Timestamp".to_string(), "Description".to_string()];
    let err = client
        .create_topic("tok", "sheet-1", "Work", &header_row)
        .await
        .unwrap_err();
    // The original header-write failure is reported, not the rollback.
    assert_eq!(err.status, Some(500));
    assert_eq!(err.message, "backend write failed");

    let recorded = requests.lock().unwrap().clone();
    assert_eq!(recorded.len(), 3);
    assert!(recorded[0].body.contains("addSheet"));
    assert!(recorded[0].body.contains("\"columnCount\":2"));
    assert!(recorded[1].line.starts_with("PUT /v4/spreadsheets/sheet-1/values/Work!A1?"));
    assert!(recorded[2].body.contains("deleteSheet"));
    assert!(recorded[2].body.contains("55"));
}

#[tokio::test]
async fn test_append_sends_user_entered_insert_rows() {
    let (addr, requests) = stub_server(vec![(200, r#"{"updates": {}}"#)]).await;
    let client = stub_client(addr);

    client
        .append_event_row(
            "tok",
            "sheet-1",
            "Work",
            vec!["2024-01-01 10:00:00".to_string(), "standup".to_string()],
        )
        .await
        .unwrap();

    let recorded = requests.lock().unwrap()[0].clone();
    assert!(recorded.line.starts_with("POST /v4/spreadsheets/sheet-1/values/Work:append?"));
    assert!(recorded.line.contains("valueInputOption=USER_ENTERED"));
    assert!(recorded.line.contains("insertDataOption=INSERT_ROWS"));
    assert!(recorded.body.contains("standup"));
}

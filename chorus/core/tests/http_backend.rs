//! Integration tests for the HTTP backend
//!
//! Each test runs a one-shot HTTP/1.1 server on a local `TcpListener`, so the
//! real `reqwest` client, status handling and body streaming are exercised.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use chorus_core::{
    ChatBackend, ChatConfig, Conductor, HttpBackend, ProviderResponse, SendOutcome, SessionId,
    StaticCredentials, SummarizeRequest, TransportError, TurnFailure, TurnId,
};

// =============================================================================
// One-shot server
// =============================================================================

/// Read one request (head and `Content-Length` body)
async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Serve one connection with the given raw response parts
async fn serve_once(parts: Vec<String>) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;
        for part in parts {
            stream.write_all(part.as_bytes()).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let _ = stream.shutdown().await;
        request
    });
    (format!("http://{addr}"), handle)
}

fn json_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\
         Connection: close\r\n\r\n{body}",
        body.len()
    )
}

const STREAM_HEAD: &str =
    "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";

fn backend(base_url: &str, token: Option<&str>) -> HttpBackend {
    let credentials = Arc::new(StaticCredentials::from_option(token.map(str::to_string)));
    HttpBackend::new(
        base_url,
        Duration::from_secs(5),
        Duration::from_secs(5),
        credentials,
    )
    .unwrap()
}

fn request() -> SummarizeRequest {
    SummarizeRequest::new("X", vec!["gemini".into(), "deepseek".into()])
}

fn request_body(raw: &str) -> serde_json::Value {
    let (_, body) = raw.split_once("\r\n\r\n").unwrap();
    serde_json::from_str(body).unwrap()
}

// =============================================================================
// Summarize
// =============================================================================

#[tokio::test]
async fn test_summarize_streams_body_and_sends_request() {
    let body = concat!(
        "data: {\"provider\":\"gemini\",\"chunk\":\"Hel\"}\n\n",
        "data: {\"provider\":\"gemini\",\"chunk\":\"lo\"}\n\n",
    );
    let (first, second) = body.split_at(20);
    let (url, server) = serve_once(vec![
        STREAM_HEAD.to_string(),
        first.to_string(),
        second.to_string(),
    ])
    .await;

    let backend = backend(&url, Some("secret"));
    let mut stream = backend
        .summarize(&request().with_session(Some(SessionId(7))))
        .await
        .unwrap();

    let mut received = Vec::new();
    while let Some(chunk) = stream.next().await {
        received.extend(chunk.unwrap());
    }
    assert_eq!(String::from_utf8(received).unwrap(), body);

    let raw = server.await.unwrap();
    let lower = raw.to_lowercase();
    assert!(lower.starts_with("post /api/summarize http/1.1"));
    assert!(lower.contains("authorization: bearer secret"));

    assert_eq!(
        request_body(&raw),
        serde_json::json!({
            "prompt": "X",
            "models": ["gemini", "deepseek"],
            "chatSession": 7,
            "summary_model": "gemini",
            "llm_anonymous": true
        })
    );
}

#[tokio::test]
async fn test_anonymous_request_has_no_authorization() {
    let (url, server) = serve_once(vec![STREAM_HEAD.to_string()]).await;
    let backend = backend(&url, None);
    let mut stream = backend.summarize(&request()).await.unwrap();
    while stream.next().await.is_some() {}

    let raw = server.await.unwrap();
    assert!(!raw.to_lowercase().contains("authorization:"));
    assert_eq!(request_body(&raw)["chatSession"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_status_error_uses_server_message() {
    let (url, _server) = serve_once(vec![json_response(
        "429 Too Many Requests",
        r#"{"message":"Rate limit exceeded","code":429}"#,
    )])
    .await;

    let err = backend(&url, None).summarize(&request()).await.err().unwrap();
    assert_eq!(
        err,
        TransportError::Status {
            status: 429,
            message: "Rate limit exceeded".into(),
        }
    );
}

#[tokio::test]
async fn test_status_error_without_json_is_generic() {
    let body = "<html>bad gateway</html>";
    let (url, _server) = serve_once(vec![format!(
        "HTTP/1.1 502 Bad Gateway\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\
         Connection: close\r\n\r\n{body}",
        body.len()
    )])
    .await;

    let err = backend(&url, None).summarize(&request()).await.err().unwrap();
    assert_eq!(err.user_message(), "Request failed.");
}

#[tokio::test]
async fn test_status_error_without_message_field() {
    let (url, _server) = serve_once(vec![json_response(
        "500 Internal Server Error",
        r#"{"code":500}"#,
    )])
    .await;

    let err = backend(&url, None).summarize(&request()).await.err().unwrap();
    assert_eq!(err.user_message(), "Something went wrong.");
}

#[tokio::test]
async fn test_no_content_is_missing_body() {
    let (url, _server) =
        serve_once(vec!["HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n".to_string()])
            .await;

    let err = backend(&url, None).summarize(&request()).await.err().unwrap();
    assert_eq!(err, TransportError::MissingBody);
}

#[tokio::test]
async fn test_connection_refused_is_request_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = backend(&format!("http://{addr}"), None)
        .summarize(&request())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TransportError::Request(_)));
}

// =============================================================================
// History
// =============================================================================

#[tokio::test]
async fn test_list_sessions() {
    let (url, server) = serve_once(vec![json_response(
        "200 OK",
        r#"[{"id":7,"title":"Lifetimes","last_used":"2024-01-01T00:00:00Z"},{"id":3,"title":"Borrowing"}]"#,
    )])
    .await;

    let sessions = backend(&url, Some("secret")).list_sessions().await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].id, SessionId(7));
    assert_eq!(sessions[1].last_used, None);

    let raw = server.await.unwrap().to_lowercase();
    assert!(raw.starts_with("get /api/sessions http/1.1"));
    assert!(raw.contains("authorization: bearer secret"));
}

#[tokio::test]
async fn test_load_session_not_found() {
    let (url, server) = serve_once(vec![json_response(
        "404 Not Found",
        r#"{"message":"Session not found"}"#,
    )])
    .await;

    let err = backend(&url, None)
        .load_session(SessionId(12))
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "Session not found");
    assert!(server
        .await
        .unwrap()
        .starts_with("GET /api/sessions/12 HTTP/1.1"));
}

#[tokio::test]
async fn test_load_session_bad_json_is_decode_error() {
    let (url, _server) = serve_once(vec![json_response("200 OK", r#"{"not":"a list"}"#)]).await;

    let err = backend(&url, None)
        .load_session(SessionId(1))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Decode(_)));
}

// =============================================================================
// End to end
// =============================================================================

#[tokio::test]
async fn test_conductor_over_http() {
    let body = concat!(
        "data: {\"provider\":\"gemini\",\"chunk\":\"Hel\"}\n\n",
        "data: {\"provider\":\"gemini\",\"chunk\":\"lo\"}\n\n",
        "data: {\"provider\":\"deepseek\",\"chunk\":\"Hi\"}\n\n",
        "data: {\"final\":{\"session_id\":7,\"turn_id\":42,",
        "\"created_at\":\"2024-01-01T00:00:00Z\",\"prompt\":\"X\"}}\n\n",
    );
    let (url, _server) = serve_once(vec![
        STREAM_HEAD.to_string(),
        body[..70].to_string(),
        body[70..].to_string(),
    ])
    .await;

    let (tx, _rx) = mpsc::channel(64);
    let mut conductor = Conductor::new(backend(&url, None), ChatConfig::default(), tx);

    assert_eq!(conductor.send("X").await, SendOutcome::Finalized(TurnId(42)));
    assert_eq!(
        conductor.turns()[0].responses,
        vec![
            ProviderResponse::new("gemini", "Hello"),
            ProviderResponse::new("deepseek", "Hi"),
        ]
    );
    assert_eq!(conductor.active_session(), Some(SessionId(7)));
}

#[tokio::test]
async fn test_conductor_over_http_truncated() {
    let (url, _server) = serve_once(vec![
        STREAM_HEAD.to_string(),
        "data: {\"provider\":\"gemini\",\"chunk\":\"Hel\"}\n\ndata: {\"prov".to_string(),
    ])
    .await;

    let (tx, _rx) = mpsc::channel(64);
    let mut conductor = Conductor::new(backend(&url, None), ChatConfig::default(), tx);

    let outcome = conductor.send("X").await;
    assert_eq!(
        outcome,
        SendOutcome::Failed(TurnFailure::Transport(
            TransportError::Truncated.user_message()
        ))
    );
    assert_eq!(conductor.turns()[0].response("gemini").unwrap().content, "Hel");
}

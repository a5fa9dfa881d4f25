#![allow(clippy::unwrap_used, clippy::expect_used)]

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tether_agent::{DriverConfig, ScriptedEngine};
use tether_coord::{CoordinationStore, MessageStash};
use tether_gateway::{AuthConfig, GatewayServer};
use tether_lifecycle::{LifecycleConfig, StreamOrchestrator};
use tether_session::{ConversationStore, FileConversationStore};
use tokio::net::TcpListener;

struct TestServer {
    addr: String,
    conversations: Arc<FileConversationStore>,
    _tmp: tempfile::TempDir,
}

/// Helper: build a test server on a random port.
async fn start_test_server(engine: ScriptedEngine, auth: AuthConfig) -> TestServer {
    let tmp = tempfile::tempdir().unwrap();
    let conversations = Arc::new(
        FileConversationStore::new(tmp.path().join("conversations"))
            .await
            .unwrap(),
    );
    let store = CoordinationStore::in_memory();
    let orchestrator = StreamOrchestrator::new(
        store.clone(),
        Arc::new(engine),
        conversations.clone(),
        LifecycleConfig::default(),
        DriverConfig::default(),
    );
    let app = GatewayServer::build_with_auth(orchestrator, MessageStash::new(store), auth);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr: format!("127.0.0.1:{}", addr.port()),
        conversations,
        _tmp: tmp,
    }
}

async fn open_server(engine: ScriptedEngine) -> TestServer {
    start_test_server(engine, AuthConfig::default()).await
}

fn slow(steps: Vec<Vec<&str>>, delay_ms: u64) -> ScriptedEngine {
    ScriptedEngine::new(steps).with_chunk_delay(Duration::from_millis(delay_ms))
}

fn user_message(text: &str) -> serde_json::Value {
    serde_json::json!({
        "message": {"role": "user", "parts": [{"type": "text", "text": text}]}
    })
}

/// Extracts the text deltas from an SSE body.
fn deltas(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data: "))
        .map(|json| {
            let value: serde_json::Value = serde_json::from_str(json).unwrap();
            assert_eq!(value["type"], "text-delta");
            value["delta"].as_str().unwrap().to_string()
        })
        .collect()
}

async fn status(server: &TestServer, session: &str) -> serde_json::Value {
    reqwest::get(format!("http://{}/api/sessions/{session}/status", server.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = open_server(ScriptedEngine::echo()).await;
    let resp = reqwest::get(format!("http://{}/health", server.addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "tether");
}

#[tokio::test]
async fn test_start_streams_generation() {
    let server = open_server(ScriptedEngine::new(vec![vec!["Hel", "lo"], vec!["!"]])).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{}/api/sessions/s1/messages", server.addr))
        .json(&user_message("hi"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let headers = resp.headers();
    assert_eq!(headers["content-type"], "text/event-stream");
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["x-vercel-ai-ui-message-stream"], "v1");
    assert_eq!(headers["x-accel-buffering"], "no");

    let body = resp.text().await.unwrap();
    assert_eq!(deltas(&body), vec!["Hel", "lo", "!"]);

    let status = status(&server, "s1").await;
    assert_eq!(status["session_id"], "s1");
    assert_eq!(status["running"], false);
    assert_eq!(status["state"], "idle");
}

#[tokio::test]
async fn test_invalid_message_is_bad_request() {
    let server = open_server(ScriptedEngine::echo()).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/api/sessions/s1/messages", server.addr);

    let empty = serde_json::json!({"message": {"role": "user", "parts": []}});
    let resp = client.post(&url).json(&empty).send().await.unwrap();
    assert_eq!(resp.status(), 400);

    let malformed = serde_json::json!({"msg": "hi"});
    let resp = client.post(&url).json(&malformed).send().await.unwrap();
    assert_eq!(resp.status(), 400);

    assert_eq!(status(&server, "s1").await["running"], false);
}

#[tokio::test]
async fn test_second_start_conflicts() {
    let server = open_server(slow(vec![vec!["a", "b", "c"]], 200)).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/api/sessions/busy/messages", server.addr);

    let first = client.post(&url).json(&user_message("one")).send().await.unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(status(&server, "busy").await["running"], true);

    let second = client.post(&url).json(&user_message("two")).send().await.unwrap();
    assert_eq!(second.status(), 409);

    assert_eq!(deltas(&first.text().await.unwrap()), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_resume_without_stream_is_no_content() {
    let server = open_server(ScriptedEngine::echo()).await;
    let resp = reqwest::get(format!("http://{}/api/sessions/nothing/stream", server.addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
}

#[tokio::test]
async fn test_resume_joins_live_stream() {
    let server = open_server(slow(vec![vec!["a", "b", "c", "d"]], 150)).await;
    let client = reqwest::Client::new();

    let first = client
        .post(format!("http://{}/api/sessions/live/messages", server.addr))
        .json(&user_message("go"))
        .send()
        .await
        .unwrap();
    let mut body = first.bytes_stream();
    let chunk = body.next().await.unwrap().unwrap();
    assert_eq!(deltas(std::str::from_utf8(&chunk).unwrap())[0], "a");

    let resumed = client
        .get(format!("http://{}/api/sessions/live/stream", server.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resumed.status(), 200);
    assert_eq!(resumed.headers()["content-type"], "text/event-stream");

    let rest = deltas(&resumed.text().await.unwrap());
    assert!(!rest.contains(&"a".to_string()));
    assert_eq!(rest.last().map(String::as_str), Some("d"));
}

#[tokio::test]
async fn test_stop_cancels_generation() {
    let server = open_server(slow(vec![vec!["a"], vec!["b"], vec!["c"], vec!["d"]], 200)).await;
    let client = reqwest::Client::new();

    let stream = client
        .post(format!("http://{}/api/sessions/stopme/messages", server.addr))
        .json(&user_message("go"))
        .send()
        .await
        .unwrap();
    assert_eq!(stream.status(), 200);

    let resp = client
        .post(format!("http://{}/api/sessions/stopme/stop", server.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "cancelling");

    let resp = client
        .post(format!("http://{}/api/sessions/stopme/stop?wait=true", server.addr))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "stopped");

    let delivered = deltas(&stream.text().await.unwrap());
    assert!(delivered.len() < 4);
    assert_eq!(status(&server, "stopme").await["running"], false);

    // Wait for the owner to reach its step boundary and clean up.
    for _ in 0..50 {
        if status(&server, "stopme").await["state"] == "idle" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(status(&server, "stopme").await["state"], "idle");
    let saved = server.conversations.read("stopme").await.unwrap();
    assert!(saved.len() <= 2);
}

#[tokio::test]
async fn test_initial_message_hand_off() {
    let server = open_server(ScriptedEngine::echo()).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/api/initial-message", server.addr);

    let resp = client
        .post(&url)
        .json(&serde_json::json!({
            "parts": [{"type": "text", "text": "build me a todo app"}],
            "templateId": "react"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    let id = body["messageId"].as_str().unwrap().to_string();
    assert!(id.starts_with("initial_msg_"));

    let resp = client
        .get(&url)
        .query(&[("messageId", &id)])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let message: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(message["templateId"], "react");
    assert_eq!(message["parts"][0]["text"], "build me a todo app");

    let resp = client
        .get(&url)
        .query(&[("messageId", &id)])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_initial_message_validation() {
    let server = open_server(ScriptedEngine::echo()).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/api/initial-message", server.addr);

    for body in [
        serde_json::json!({"templateId": "react"}),
        serde_json::json!({"parts": "text", "templateId": "react"}),
        serde_json::json!({"parts": [{"type": "text", "text": "hi"}]}),
        serde_json::json!({"parts": [], "templateId": "react"}),
    ] {
        let resp = client.post(&url).json(&body).send().await.unwrap();
        assert_eq!(resp.status(), 400, "body: {body}");
    }

    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_api_key_required_when_configured() {
    let server = start_test_server(
        ScriptedEngine::echo(),
        AuthConfig::new(vec!["secret".to_string()]),
    )
    .await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/api/sessions/s1/status", server.addr);

    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client.get(&url).bearer_auth("secret").send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{url}?api_key=secret"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use balance_gate::upstream::{BalanceClient, RpcBalanceClient};
use balance_gate::Error;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;

/// Serve `app` on an ephemeral port and return its URL
async fn spawn_rpc(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(url: String, timeout: Duration) -> RpcBalanceClient {
    RpcBalanceClient::new(url, "finalized", timeout).unwrap()
}

#[tokio::test]
async fn test_get_balance_request_and_response() {
    let app = Router::new().route(
        "/",
        post(|Json(request): Json<Value>| async move {
            assert_eq!(request["method"], "getBalance");
            assert_eq!(request["params"][1]["commitment"], "finalized");
            let lamports = if request["params"][0] == "11111111111111111111111111111111" {
                1_234_567_890u64
            } else {
                0
            };
            Json(json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "result": { "context": { "slot": 250_000_000u64 }, "value": lamports }
            }))
        }),
    );
    let url = spawn_rpc(app).await;

    let balance = client(url, Duration::from_secs(5))
        .fetch_balance("11111111111111111111111111111111")
        .await
        .unwrap();
    assert_eq!(balance, 1_234_567_890);
}

#[tokio::test]
async fn test_rpc_error_is_upstream_unavailable() {
    let app = Router::new().route(
        "/",
        post(|| async {
            Json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32602, "message": "Invalid param: WrongSize" }
            }))
        }),
    );
    let url = spawn_rpc(app).await;

    let err = client(url, Duration::from_secs(5))
        .fetch_balance("11111111111111111111111111111111")
        .await
        .unwrap_err();
    match err {
        Error::UpstreamUnavailable(message) => {
            assert!(message.contains("-32602"));
            assert!(message.contains("WrongSize"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_http_failure_is_upstream_unavailable() {
    let app = Router::new().route(
        "/",
        post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
    );
    let url = spawn_rpc(app).await;

    let err = client(url, Duration::from_secs(5))
        .fetch_balance("11111111111111111111111111111111")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UpstreamUnavailable(ref m) if m.contains("429")));
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let app = Router::new().route(
        "/",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({ "jsonrpc": "2.0", "id": 1, "result": { "value": 1 } }))
        }),
    );
    let url = spawn_rpc(app).await;

    let err = client(url, Duration::from_millis(100))
        .fetch_balance("11111111111111111111111111111111")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UpstreamUnavailable(_)));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_upstream_unavailable() {
    // Bind then drop to get a port nothing listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(format!("http://{}", addr), Duration::from_secs(1))
        .fetch_balance("11111111111111111111111111111111")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UpstreamUnavailable(_)));
}

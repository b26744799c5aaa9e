//! Exercises `HttpFullNodeClient` against a local axum stand-in for the
//! full node.

use std::time::Duration;

use axum::{http::StatusCode, routing::post, Json, Router};
use fastblocks_rpc::{BlockFetcher, HttpFullNodeClient, RpcError};
use serde_json::{json, Value};

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn block_json() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {
            "number": "0x1b4",
            "hash": "0xaa",
            "parentHash": "0x00",
            "timestamp": "0x5",
            "gasUsed": "0x10",
            "gasLimit": "0x20",
            "transactions": ["0x01", "0x02", "0x03"]
        }
    })
}

#[tokio::test]
async fn posts_get_block_by_number_and_decodes_result() {
    let router = Router::new().route(
        "/",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["method"], "eth_getBlockByNumber");
            assert_eq!(body["params"], json!(["latest", false]));
            assert_eq!(body["jsonrpc"], "2.0");
            Json(block_json())
        }),
    );
    let url = serve(router).await;

    let client = HttpFullNodeClient::new(url.clone(), Duration::from_secs(5)).unwrap();
    assert_eq!(client.endpoint(), url);

    let block = client.latest_block().await.unwrap();
    assert_eq!(block.number, "0x1b4");
    assert_eq!(block.decode().unwrap().number(), 436);
    assert_eq!(block.transactions.len(), 3);
}

#[tokio::test]
async fn server_error_status_is_reported() {
    let router = Router::new().route(
        "/",
        post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
    );
    let url = serve(router).await;

    let client = HttpFullNodeClient::new(url, Duration::from_secs(5)).unwrap();
    assert!(matches!(
        client.latest_block().await,
        Err(RpcError::Status(502))
    ));
}

#[tokio::test]
async fn slow_node_hits_request_timeout() {
    let router = Router::new().route(
        "/",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(block_json())
        }),
    );
    let url = serve(router).await;

    let client = HttpFullNodeClient::new(url, Duration::from_millis(200)).unwrap();
    let err = client.latest_block().await.unwrap_err();
    assert!(matches!(err, RpcError::Timeout { ms: 200 }), "got {err:?}");
}

#[tokio::test]
async fn refused_connection_is_an_http_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpFullNodeClient::new(format!("http://{addr}"), Duration::from_secs(2)).unwrap();
    let err = client.latest_block().await.unwrap_err();
    assert!(matches!(err, RpcError::Http(_)), "got {err:?}");
}

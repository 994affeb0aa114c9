use cadavre_web::server::{AppContext, WebServer};
use serde_json::json;
use std::time::Duration;
use warp::hyper::{self, body::HttpBody, Body, Client as HyperClient, Request};

async fn post_json(
    client: &HyperClient<hyper::client::HttpConnector>,
    uri: &str,
    body: serde_json::Value,
) -> serde_json::Value {
    let request = Request::builder()
        .method(hyper::Method::POST)
        .uri(uri)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request");
    let response = client.request(request).await.expect("issue request");
    let bytes = hyper::body::to_bytes(response.into_body())
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse body")
}

async fn get_json(
    client: &HyperClient<hyper::client::HttpConnector>,
    uri: &str,
) -> serde_json::Value {
    let response = client
        .get(uri.parse().expect("parse uri"))
        .await
        .expect("issue request");
    let bytes = hyper::body::to_bytes(response.into_body())
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse body")
}

/// Reads from the SSE body until `needle` shows up in the accumulated text.
async fn read_until(body: &mut Body, buffer: &mut String, needle: &str) {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            if buffer.contains(needle) {
                return;
            }
            match body.data().await {
                Some(Ok(chunk)) => {
                    buffer.push_str(&String::from_utf8_lossy(&chunk));
                }
                Some(Err(err)) => panic!("stream errored: {err}"),
                None => panic!("stream ended before `{needle}` arrived"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for `{needle}`, got: {buffer}"));
}

#[tokio::test]
async fn stream_delivers_marker_events_and_teardown() {
    let server = WebServer::from_context(AppContext::new_for_tests());
    let handle = server.start().await.expect("start server");
    let address = handle.address();
    let client = HyperClient::new();

    let created = post_json(
        &client,
        &format!("http://{address}/api/games"),
        json!({"game_type": "multiplayer"}),
    )
    .await;
    let session_id = created["session_id"].as_str().unwrap().to_string();

    let alice = post_json(
        &client,
        &format!("http://{address}/api/games/{session_id}/join"),
        json!({"player_name": "alice"}),
    )
    .await;

    // Open the stream with Alice's credentials.
    let stream_uri = format!(
        "http://{address}/api/games/{session_id}/events?player_id={}&player_token={}",
        alice["player_id"].as_str().unwrap(),
        alice["player_token"].as_str().unwrap()
    );
    let response = client
        .get(stream_uri.parse().expect("parse uri"))
        .await
        .expect("open stream");
    assert_eq!(response.status(), hyper::StatusCode::OK);
    let mut body = response.into_body();
    let mut buffer = String::new();

    // The connected marker arrives first, carrying the connection token.
    read_until(&mut body, &mut buffer, "connected").await;
    read_until(&mut body, &mut buffer, "connection_token").await;

    // Liveness flipped on via the stream's connect transaction.
    let snapshot = get_json(&client, &format!("http://{address}/api/games/{session_id}")).await;
    assert_eq!(snapshot["players"][0]["is_active"], true);
    assert_eq!(snapshot["players"][0]["connection_count"], 1);

    // Another player joining is pushed to the open stream.
    let _bob = post_json(
        &client,
        &format!("http://{address}/api/games/{session_id}/join"),
        json!({"player_name": "bob"}),
    )
    .await;
    read_until(&mut body, &mut buffer, "player_joined").await;

    // Closing the stream tears the connection down exactly once: liveness
    // drops, membership stays.
    drop(body);
    let mut deactivated = false;
    for _ in 0..50 {
        let snapshot =
            get_json(&client, &format!("http://{address}/api/games/{session_id}")).await;
        if snapshot["players"][0]["connection_count"] == 0 {
            assert_eq!(snapshot["players"][0]["is_active"], false);
            assert_eq!(snapshot["players"].as_array().unwrap().len(), 2);
            deactivated = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(deactivated, "disconnect never ran after stream close");

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn stream_requires_valid_player_identity() {
    let server = WebServer::from_context(AppContext::new_for_tests());
    let handle = server.start().await.expect("start server");
    let address = handle.address();
    let client = HyperClient::new();

    let created = post_json(
        &client,
        &format!("http://{address}/api/games"),
        json!({"game_type": "multiplayer"}),
    )
    .await;
    let session_id = created["session_id"].as_str().unwrap().to_string();
    let alice = post_json(
        &client,
        &format!("http://{address}/api/games/{session_id}/join"),
        json!({"player_name": "alice"}),
    )
    .await;

    // A spoofed token cannot open a stream (and so cannot affect liveness).
    let stream_uri = format!(
        "http://{address}/api/games/{session_id}/events?player_id={}&player_token=forged",
        alice["player_id"].as_str().unwrap()
    );
    let response = client
        .get(stream_uri.parse().expect("parse uri"))
        .await
        .expect("request stream");
    assert_eq!(response.status(), hyper::StatusCode::NOT_FOUND);

    let snapshot = get_json(&client, &format!("http://{address}/api/games/{session_id}")).await;
    assert_eq!(snapshot["players"][0]["connection_count"], 0);

    handle.shutdown().await.expect("shutdown");
}

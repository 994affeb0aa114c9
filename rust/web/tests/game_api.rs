use cadavre_web::server::{AppContext, WebServer};
use serde_json::json;
use std::time::Duration;
use warp::hyper::{self, Body, Client as HyperClient, Request};

async fn post_json(
    client: &HyperClient<hyper::client::HttpConnector>,
    uri: &str,
    body: serde_json::Value,
) -> (hyper::StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(hyper::Method::POST)
        .uri(uri)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request");
    let response = client.request(request).await.expect("issue request");
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body())
        .await
        .expect("read body");
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("parse body")
    };
    (status, value)
}

async fn get_json(
    client: &HyperClient<hyper::client::HttpConnector>,
    uri: &str,
) -> (hyper::StatusCode, serde_json::Value) {
    let response = client
        .get(uri.parse().expect("parse uri"))
        .await
        .expect("issue request");
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body())
        .await
        .expect("read body");
    let value = serde_json::from_slice(&bytes).expect("parse body");
    (status, value)
}

#[tokio::test]
async fn multiplayer_game_lifecycle() {
    let server = WebServer::from_context(AppContext::new_for_tests());
    let handle = server.start().await.expect("start server");
    let address = handle.address();
    let client = HyperClient::new();

    // Create a two-player game.
    let (status, created) = post_json(
        &client,
        &format!("http://{address}/api/games"),
        json!({"game_type": "multiplayer", "max_players": 2}),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::CREATED);
    let session_id = created["session_id"].as_str().expect("session id").to_string();
    assert_eq!(session_id.len(), 5);
    assert_eq!(created["turns"].as_array().unwrap().len(), 0);

    // Both players join and get secret tokens.
    let (status, alice) = post_json(
        &client,
        &format!("http://{address}/api/games/{session_id}/join"),
        json!({"player_name": "alice"}),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(alice["is_active"], false);

    let (status, bob) = post_json(
        &client,
        &format!("http://{address}/api/games/{session_id}/join"),
        json!({"player_name": "bob"}),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);

    // Capacity is bounded: a third join is rejected and membership stays.
    let (status, full) = post_json(
        &client,
        &format!("http://{address}/api/games/{session_id}/join"),
        json!({"player_name": "carol"}),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::BAD_REQUEST);
    assert_eq!(full["error"], "capacity_exceeded");

    let turns_uri = format!("http://{address}/api/games/{session_id}/turns");
    let fragment = json!({"points": [[10, 10], [60, 40]]});

    // Alice submits turn 0.
    let (status, accepted) = post_json(
        &client,
        &turns_uri,
        json!({
            "player_id": alice["player_id"],
            "player_token": alice["player_token"],
            "turn_number": 0,
            "turn_data": fragment,
        }),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::ACCEPTED);
    assert_eq!(accepted["turn_number"], 0);

    // A retried duplicate of turn 0 is a stale submission, not a turn-order
    // violation.
    let (status, stale) = post_json(
        &client,
        &turns_uri,
        json!({
            "player_id": alice["player_id"],
            "player_token": alice["player_token"],
            "turn_number": 0,
            "turn_data": fragment,
        }),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::CONFLICT);
    assert_eq!(stale["error"], "invalid_turn_number");
    assert_eq!(stale["details"]["expected"], 1);

    // Alice out of turn with the right number is forbidden.
    let (status, wrong) = post_json(
        &client,
        &turns_uri,
        json!({
            "player_id": alice["player_id"],
            "player_token": alice["player_token"],
            "turn_number": 1,
            "turn_data": fragment,
        }),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::FORBIDDEN);
    assert_eq!(wrong["error"], "not_your_turn");

    // Bob submits turn 1 and the rotation wraps back to Alice.
    let (status, _) = post_json(
        &client,
        &turns_uri,
        json!({
            "player_id": bob["player_id"],
            "player_token": bob["player_token"],
            "turn_number": 1,
            "turn_data": fragment,
        }),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::ACCEPTED);

    let (status, snapshot) =
        get_json(&client, &format!("http://{address}/api/games/{session_id}")).await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(snapshot["turns"].as_array().unwrap().len(), 2);
    assert_eq!(snapshot["current_player_id"], alice["player_id"]);
    let numbers: Vec<u64> = snapshot["turns"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["number"].as_u64().unwrap())
        .collect();
    assert_eq!(numbers, vec![0, 1]);
    // Tokens never leak through snapshots.
    assert!(snapshot["players"][0].get("player_token").is_none());
    assert!(snapshot["players"][0].get("token").is_none());

    // Bob leaves; membership shrinks but the session survives.
    let (status, left) = post_json(
        &client,
        &format!("http://{address}/api/games/{session_id}/leave"),
        json!({"player_id": bob["player_id"], "player_token": bob["player_token"]}),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(left["success"], true);

    let (_, snapshot) =
        get_json(&client, &format!("http://{address}/api/games/{session_id}")).await;
    assert_eq!(snapshot["players"].as_array().unwrap().len(), 1);

    // Nothing is idle long enough for the sweeper yet.
    let (status, cleaned) =
        post_json(&client, &format!("http://{address}/api/cleanup"), json!({})).await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(cleaned["cleaned_count"], 0);

    tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .expect("shutdown timed out")
        .expect("shutdown failed");
}

#[tokio::test]
async fn unknown_session_returns_not_found() {
    let server = WebServer::from_context(AppContext::new_for_tests());
    let handle = server.start().await.expect("start server");
    let address = handle.address();
    let client = HyperClient::new();

    let (status, body) = post_json(
        &client,
        &format!("http://{address}/api/games/ZZZZZ/join"),
        json!({"player_name": "ghost"}),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "game_not_found");

    let (status, _) = get_json(&client, &format!("http://{address}/api/games/ZZZZZ")).await;
    assert_eq!(status, hyper::StatusCode::NOT_FOUND);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn hybrid_game_generates_ai_turns() {
    let server = WebServer::from_context(AppContext::new_for_tests());
    let handle = server.start().await.expect("start server");
    let address = handle.address();
    let client = HyperClient::new();

    let (status, created) = post_json(
        &client,
        &format!("http://{address}/api/games"),
        json!({"game_type": "ai"}),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::CREATED);
    let session_id = created["session_id"].as_str().unwrap().to_string();

    let (_, player) = post_json(
        &client,
        &format!("http://{address}/api/games/{session_id}/join"),
        json!({"player_name": "alice"}),
    )
    .await;

    // Retrying before the rotation reaches the AI seat is a client error.
    let (status, body) = get_json(
        &client,
        &format!("http://{address}/api/games/{session_id}/retry-ai"),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "not_ai_turn");

    // Submitting the human turn hands the rotation to the AI, which commits
    // its fragment in the background.
    let (status, _) = post_json(
        &client,
        &format!("http://{address}/api/games/{session_id}/turns"),
        json!({
            "player_id": player["player_id"],
            "player_token": player["player_token"],
            "turn_number": 0,
            "turn_data": {"points": [[0, 0], [20, 30]]},
        }),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::ACCEPTED);

    let mut snapshot = serde_json::Value::Null;
    for _ in 0..50 {
        let (_, current) =
            get_json(&client, &format!("http://{address}/api/games/{session_id}")).await;
        if current["turns"].as_array().unwrap().len() == 2 {
            snapshot = current;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(
        snapshot["turns"].as_array().expect("ai turn committed").len(),
        2
    );
    assert_eq!(snapshot["turns"][1]["author"]["kind"], "ai");
    assert_eq!(snapshot["ai_turn_in_progress"], false);
    assert_eq!(snapshot["current_player_id"], player["player_id"]);

    handle.shutdown().await.expect("shutdown");
}

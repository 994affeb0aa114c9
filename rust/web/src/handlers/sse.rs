//! Streaming gateway: one long-lived SSE connection per client.
//!
//! On open the player's liveness is incremented and a `connected` marker
//! frame carrying the connection token is emitted; afterwards every bus
//! event for the session is forwarded as a `game_event` frame, with
//! heartbeat comments in between. Teardown runs exactly once no matter how
//! the stream ends (client abort, forwarding failure, session reaped) and
//! only decrements liveness; membership is untouched.

use crate::errors::IntoErrorResponse;
use crate::events::{EventBus, EventSubscription, GameEvent};
use crate::session::{ConnectionToken, SessionId, SessionStore};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use warp::http;
use warp::reply::{self, Response};
use warp::sse;
use warp::Reply;

/// Player identity for the stream. EventSource cannot set headers, so the
/// credentials ride in the query string.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub player_id: String,
    pub player_token: String,
}

pub async fn stream_events(
    session_id: SessionId,
    query: StreamQuery,
    store: Arc<SessionStore>,
    event_bus: Arc<EventBus>,
) -> Response {
    let connection_token =
        match store.connect(&session_id, &query.player_id, &query.player_token) {
            Ok(token) => token,
            Err(err) => return err.into_http_response(),
        };

    let mut subscription = event_bus.subscribe(session_id.clone());
    let receiver = subscription
        .take_receiver()
        .expect("fresh subscription has a receiver");
    let heartbeat = store.settings().heartbeat();
    let guard = ConnectionGuard::new(store, session_id, query.player_id, connection_token.clone());

    let stream = event_stream(subscription, guard, receiver, connection_token);
    let keep_alive = sse::keep_alive().interval(heartbeat).text(":heartbeat\n");

    let reply = sse::reply(keep_alive.stream(stream));
    reply::with_header(reply, http::header::CACHE_CONTROL, "no-cache").into_response()
}

/// Exactly-once teardown for one streaming connection. Held by the stream;
/// whichever way the stream ends, dropping the guard decrements liveness.
struct ConnectionGuard {
    store: Arc<SessionStore>,
    session_id: SessionId,
    player_id: String,
    connection_token: ConnectionToken,
    released: AtomicBool,
}

impl ConnectionGuard {
    fn new(
        store: Arc<SessionStore>,
        session_id: SessionId,
        player_id: String,
        connection_token: ConnectionToken,
    ) -> Self {
        Self {
            store,
            session_id,
            player_id,
            connection_token,
            released: AtomicBool::new(false),
        }
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(
            session_id = %self.session_id,
            player_id = %self.player_id,
            "stream closed, dropping connection"
        );
        if let Err(err) =
            self.store
                .disconnect(&self.session_id, &self.player_id, &self.connection_token)
        {
            tracing::error!(
                session_id = %self.session_id,
                error = %err,
                "failed to release connection"
            );
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

fn event_stream(
    subscription: EventSubscription,
    guard: ConnectionGuard,
    receiver: tokio::sync::mpsc::Receiver<GameEvent>,
    connection_token: ConnectionToken,
) -> impl tokio_stream::Stream<Item = Result<sse::Event, Infallible>> {
    // The subscription and guard live inside the map closure: when warp
    // drops the stream, both drop with it, unsubscribing and releasing the
    // connection in one place.
    let held = Arc::new((subscription, guard));

    let connected = tokio_stream::once(Ok(connected_frame(&connection_token)));
    let events = ReceiverStream::new(receiver).map(move |event| {
        let _held = Arc::clone(&held);
        Ok(render_event(&event))
    });
    connected.chain(events)
}

fn connected_frame(connection_token: &ConnectionToken) -> sse::Event {
    let body = serde_json::json!({ "connection_token": connection_token }).to_string();
    sse::Event::default().event("connected").data(body)
}

fn render_event(event: &GameEvent) -> sse::Event {
    match serde_json::to_string(event) {
        Ok(json) => sse::Event::default().event("game_event").data(json),
        Err(err) => {
            let fallback = serde_json::json!({
                "type": "error",
                "message": format!("failed to serialize game event: {err}"),
            })
            .to_string();
            sse::Event::default().event("game_event").data(fallback)
        }
    }
}

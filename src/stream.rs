use crate::events::Event;
use crate::server::AppState;
use axum::{
    extract::State,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use futures_util::stream::unfold;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::{Stream, StreamExt};
use tracing::{error, info};

/// Handles the dashboard event stream endpoint
///
/// Each connection gets its own subscriber outbox. The first messages replay
/// the latest metrics sample and every known service status, so a client that
/// just connected (or reconnected after missing events) starts from the full
/// current state. Live events follow until the client goes away or the server
/// shuts down; either way the subscriber is removed from the bus.
pub async fn event_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let events = event_feed(&state).filter_map(|event| encode(&event));
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Events for one client: the current state first, then the live feed.
pub fn event_feed(state: &AppState) -> impl Stream<Item = Event> + Send + 'static {
    // Subscribe before taking the snapshot so nothing published in between is lost.
    let subscription = state.bus.subscribe();
    info!("Client {} connected to event stream", subscription.id());

    let mut initial = Vec::new();
    if let Some(sample) = state.metrics.current() {
        initial.push(Event::MetricsSample(sample));
    }
    initial.extend(
        state
            .status
            .snapshot()
            .iter()
            .map(|(id, status)| Event::status_changed(id.clone(), *status)),
    );

    let live = unfold(
        (subscription, state.shutdown_token.clone()),
        |(mut subscription, shutdown)| async move {
            let event = tokio::select! {
                () = shutdown.cancelled() => None,
                event = subscription.recv() => event,
            }?;
            Some((event, (subscription, shutdown)))
        },
    );

    tokio_stream::iter(initial).chain(live)
}

fn encode(event: &Event) -> Option<Result<SseEvent, Infallible>> {
    match SseEvent::default().json_data(event) {
        Ok(sse) => Some(Ok(sse)),
        Err(e) => {
            error!("Failed to serialize {} event for SSE, dropping it: {e}", event.kind());
            None
        }
    }
}

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{RawQuery, State};
use axum::http::header::{CONTENT_ENCODING, CONTENT_TYPE, VARY};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt};

use logcollect_types::Payload;

use crate::encoding::{accepts_gzip, gzip};
use crate::error::HttpError;
use crate::query::query_param;
use crate::server::AppState;

/// Interval between SSE keep-alive comments
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// `GET /filter?q=<substring>`
pub(crate) async fn filter(
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let query = query_param(raw_query.as_deref(), "q")?.unwrap_or_default();
    let body = state.filter.render(&query);

    tracing::debug!(query = %query, bytes = body.len(), "filter request");

    if accepts_gzip(&headers) {
        let compressed = gzip(body.as_bytes()).map_err(HttpError::Compression)?;
        return Ok((
            [
                (CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN)),
                (CONTENT_ENCODING, HeaderValue::from_static("gzip")),
                (VARY, HeaderValue::from_static("accept-encoding")),
            ],
            compressed,
        )
            .into_response());
    }

    Ok((
        [
            (CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN)),
            (VARY, HeaderValue::from_static("accept-encoding")),
        ],
        body,
    )
        .into_response())
}

/// `GET /stream`
///
/// The subscription lives inside the response stream: when the client goes
/// away the stream is dropped and the subscriber unregistered.
pub(crate) async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.broadcaster.subscribe();
    tracing::debug!(
        subscriber_id = subscription.id(),
        subscribers = state.broadcaster.subscriber_count(),
        "stream client connected"
    );

    let events = subscription
        .take_until(state.shutdown.cancelled_owned())
        .map(|payload| Ok::<_, Infallible>(payload_event(&payload)));

    Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

/// One SSE event per batch. Lines become consecutive `data:` fields.
fn payload_event(payload: &Payload) -> Event {
    let data = payload.replace('\r', "");
    Event::default().data(data.trim_end_matches('\n'))
}

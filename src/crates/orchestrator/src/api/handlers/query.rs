//! `POST /api/v1/query` and `POST /api/v1/query/stream` handlers.

use axum::extract::State;
use axum::http::header::HeaderMap;
use axum::http::HeaderValue;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::QueryRequestDto;
use crate::api::routes::AppState;
use crate::pipeline::{QueryOutcome, QueryRequest};
use crate::stream::QueryStreamSink;

/// Bounded so a slow SSE client applies backpressure rather than unbounded
/// memory growth; matches the buffer size used in `stream.rs`'s own tests.
const STREAM_BUFFER: usize = 64;

/// A degraded-but-200 response (spec §7) carries this header so callers can
/// distinguish a full answer from a breaker-shed one without parsing the body.
pub async fn query(
    State(app_state): State<AppState>,
    Json(body): Json<QueryRequestDto>,
) -> ApiResult<(HeaderMap, Json<QueryOutcome>)> {
    body.validate()?;

    let outcome = app_state
        .pipeline
        .process_query(QueryRequest { text: body.question, user_id: body.user_id })
        .await
        .map_err(ApiError::from)?;

    let mut headers = HeaderMap::new();
    if outcome.degraded {
        headers.insert("x-response-warning", HeaderValue::from_static("degraded"));
    }

    Ok((headers, Json(outcome)))
}

pub async fn query_stream(
    State(app_state): State<AppState>,
    Json(body): Json<QueryRequestDto>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>> {
    body.validate()?;

    let (sink, receiver) = QueryStreamSink::new(STREAM_BUFFER);
    let pipeline = app_state.pipeline.clone();
    let request = QueryRequest { text: body.question, user_id: body.user_id };

    tokio::spawn(async move {
        if let Err(e) = pipeline.process_query_stream(request, sink).await {
            tracing::warn!(error = ?e, "streamed pipeline run ended with an error");
        }
    });

    let events = ReceiverStream::new(receiver)
        .map(|event| Ok(Event::default().event(event.event_name()).json_data(event.to_wire_json()).unwrap_or_else(|_| Event::default())));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

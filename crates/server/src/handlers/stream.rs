//! Artifact streaming (read path).

use crate::error::{ApiError, ApiResult};
use crate::metrics::{ARTIFACT_STREAMS, record_upload_error};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use reel_assembly::ByteRange;
use reel_core::SessionId;

/// Parse a single-range `Range` header (`bytes=a-b`, `bytes=a-`, `bytes=-n`).
///
/// Anything else, including multi-range requests, yields `None` and the
/// request is served whole.
pub fn parse_range_header(value: &str) -> Option<ByteRange> {
    let rest = value.trim().strip_prefix("bytes=")?;
    let (start_str, end_str) = rest.split_once('-')?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    if start_str.is_empty() {
        let len: u64 = end_str.parse().ok()?;
        return Some(ByteRange::Suffix { len });
    }

    let start: u64 = start_str.parse().ok()?;
    if end_str.is_empty() {
        return Some(ByteRange::From { start });
    }
    let end_inclusive: u64 = end_str.parse().ok()?;
    Some(ByteRange::Bounded {
        start,
        end_inclusive,
    })
}

/// GET /v1/reels/{session_id}/stream - Serve a published artifact.
///
/// Honors a single byte range. Sessions that have not completed answer
/// 425 without waiting on the merge.
#[tracing::instrument(skip(state, headers), fields(session_id = %session_id))]
pub async fn stream_artifact(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let session_id = SessionId::parse(&session_id)?;
    let range = headers
        .get(RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_range_header);

    let opened = match state.uploads.stream_artifact(session_id, range).await {
        Ok(opened) => opened,
        Err(e) => {
            record_upload_error(e.code());
            return Err(e.into());
        }
    };

    tracing::debug!(
        start = opened.start,
        end = opened.end,
        total = opened.total_size,
        partial = opened.partial,
        "serving artifact"
    );

    let kind = if opened.partial { "range" } else { "full" };
    ARTIFACT_STREAMS.with_label_values(&[kind]).inc();

    let status = if opened.partial {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };
    let content_type = HeaderValue::from_str(&opened.content_type)
        .map_err(|e| ApiError::Internal(format!("invalid artifact content type: {e}")))?;
    let content_range = opened
        .partial
        .then(|| format!("bytes {}-{}/{}", opened.start, opened.end - 1, opened.total_size));
    let content_length = opened.len();

    let body_stream = opened
        .stream
        .map(|result| result.map_err(|e| std::io::Error::other(e.to_string())));

    let mut response = (
        status,
        [
            (CONTENT_TYPE, content_type),
            (ACCEPT_RANGES, HeaderValue::from_static("bytes")),
            (CONTENT_LENGTH, HeaderValue::from(content_length)),
        ],
        Body::from_stream(body_stream),
    )
        .into_response();

    if let Some(content_range) = content_range {
        let value = HeaderValue::from_str(&content_range)
            .map_err(|e| ApiError::Internal(format!("invalid content range: {e}")))?;
        response.headers_mut().insert(CONTENT_RANGE, value);
    }

    Ok(response)
}

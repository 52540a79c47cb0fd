//! Upload endpoints (write path).

use crate::error::{ApiError, ApiResult};
use crate::metrics::{
    ARTIFACT_BYTES_PUBLISHED, BYTES_RECEIVED, CHUNK_UPLOAD_DURATION, CHUNKS_RECEIVED,
    UPLOADS_COMPLETED, record_upload_error,
};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use reel_assembly::{ChunkSubmission, SubmitOutcome};
use reel_core::{ChunkIndex, OwnerId, PublishedArtifact, SessionId, UploadSession, UploadState};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use time::format_description::well_known::Rfc3339;

/// Header carrying the caller identity, set by the upstream identity proxy.
pub const OWNER_HEADER: &str = "x-owner-id";

/// Query parameters for chunk upload.
#[derive(Debug, Deserialize)]
pub struct ChunkQuery {
    /// Number of chunks the client split the file into.
    pub total_chunks: Option<u32>,
}

/// Published artifact summary.
#[derive(Debug, Serialize)]
pub struct ArtifactResponse {
    pub size: u64,
    pub sha256: String,
    pub stream_url: String,
}

impl ArtifactResponse {
    fn new(session_id: SessionId, artifact: &PublishedArtifact) -> Self {
        Self {
            size: artifact.size,
            sha256: artifact.sha256.to_hex(),
            stream_url: format!("/v1/reels/{session_id}/stream"),
        }
    }
}

/// Response to a chunk upload.
#[derive(Debug, Serialize)]
pub struct ChunkResponse {
    pub session_id: String,
    /// True only on the request that assembled and published the artifact.
    pub complete: bool,
    pub state: UploadState,
    pub received: u32,
    pub expected: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactResponse>,
}

impl From<SubmitOutcome> for ChunkResponse {
    fn from(outcome: SubmitOutcome) -> Self {
        Self {
            session_id: outcome.session_id.to_string(),
            complete: outcome.complete,
            state: outcome.state,
            received: outcome.received,
            expected: outcome.expected,
            artifact: outcome
                .artifact
                .as_ref()
                .map(|artifact| ArtifactResponse::new(outcome.session_id, artifact)),
        }
    }
}

/// Session status.
#[derive(Debug, Serialize)]
pub struct UploadStatusResponse {
    pub session_id: String,
    pub state: UploadState,
    pub expected_chunks: Option<u32>,
    pub received_chunks: Vec<ChunkIndex>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_chunks: Option<Vec<ChunkIndex>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl UploadStatusResponse {
    fn new(session: UploadSession) -> ApiResult<Self> {
        let created_at = session
            .created_at
            .format(&Rfc3339)
            .map_err(|e| ApiError::Internal(format!("failed to format created_at: {e}")))?;
        let updated_at = session
            .updated_at
            .format(&Rfc3339)
            .map_err(|e| ApiError::Internal(format!("failed to format updated_at: {e}")))?;

        Ok(Self {
            session_id: session.id.to_string(),
            state: session.state,
            expected_chunks: session.expected_chunks,
            missing_chunks: session.missing_chunks(),
            artifact: session
                .artifact
                .as_ref()
                .map(|artifact| ArtifactResponse::new(session.id, artifact)),
            received_chunks: session.received.into_iter().collect(),
            error_code: session.error_code,
            error_detail: session.error_detail,
            created_at,
            updated_at,
        })
    }
}

fn owner_from_headers(headers: &HeaderMap) -> ApiResult<OwnerId> {
    let value = headers
        .get(OWNER_HEADER)
        .ok_or_else(|| ApiError::BadRequest("missing x-owner-id header".to_string()))?
        .to_str()
        .map_err(|_| ApiError::BadRequest("x-owner-id header is not valid text".to_string()))?;
    Ok(OwnerId::new(value)?)
}

/// PUT /v1/uploads/{session_id}/chunks/{index}?total_chunks=N - Upload a chunk.
///
/// The request body is the raw chunk. The request that completes the set
/// merges the session before responding.
#[tracing::instrument(
    skip(state, query, headers, body),
    fields(session_id = %session_id, index = %index)
)]
pub async fn upload_chunk(
    State(state): State<AppState>,
    Path((session_id, index)): Path<(String, String)>,
    Query(query): Query<ChunkQuery>,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<Json<ChunkResponse>> {
    let start_time = Instant::now();
    let result = submit_chunk(&state, &session_id, &index, query, &headers, body).await;
    CHUNK_UPLOAD_DURATION.observe(start_time.elapsed().as_secs_f64());

    match result {
        Ok(outcome) => Ok(Json(ChunkResponse::from(outcome))),
        Err(e) => {
            record_upload_error(e.code());
            Err(e)
        }
    }
}

async fn submit_chunk(
    state: &AppState,
    session_id: &str,
    index: &str,
    query: ChunkQuery,
    headers: &HeaderMap,
    body: Body,
) -> ApiResult<SubmitOutcome> {
    let session_id = SessionId::parse(session_id)?;
    let index: ChunkIndex = index
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid chunk index: {e}")))?;
    let total_chunks = query.total_chunks.ok_or_else(|| {
        ApiError::BadRequest("total_chunks query parameter is required".to_string())
    })?;
    let owner_id = owner_from_headers(headers)?;

    let payload = axum::body::to_bytes(body, state.max_chunk_size())
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read chunk: {e}")))?;
    let size = payload.len() as u64;

    let outcome = state
        .uploads
        .submit_chunk(ChunkSubmission {
            session_id,
            owner_id,
            index,
            total_chunks,
            payload,
        })
        .await?;

    CHUNKS_RECEIVED.inc();
    BYTES_RECEIVED.inc_by(size);
    if let Some(artifact) = &outcome.artifact {
        UPLOADS_COMPLETED.inc();
        ARTIFACT_BYTES_PUBLISHED.inc_by(artifact.size);
    }

    Ok(outcome)
}

/// GET /v1/uploads/{session_id} - Session status and received chunks.
#[tracing::instrument(skip(state), fields(session_id = %session_id))]
pub async fn get_upload(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<UploadStatusResponse>> {
    let session_id = SessionId::parse(&session_id)?;
    let session = state.uploads.session(session_id).await?;
    Ok(Json(UploadStatusResponse::new(session)?))
}

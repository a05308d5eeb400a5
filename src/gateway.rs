//! HTTP ingress/query/download surface. Routing and request validation
//! only - no pipeline business logic lives here. The query and download
//! handlers only ever read; the upload handler is the only one that
//! writes, and it writes exactly once before handing off to the pipeline.

use crate::aggregate_store::AggregateStore;
use crate::broker::{publish_json, MessageBroker};
use crate::messages::{SplitJob, TrackerOperation, SPLIT_QUEUE, TRACKER_QUEUE};
use crate::model::{agg_keys, object_keys};
use crate::object_store::ObjectStore;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct GatewayState {
    pub object_store: Arc<dyn ObjectStore>,
    pub broker: Arc<dyn MessageBroker>,
    pub aggregate_store: Arc<dyn AggregateStore>,
    pub max_upload_bytes: u64,
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/books", post(upload_book))
        .route("/books/:book_id/status", get(book_status))
        .route("/books/:book_id/chapters/:chapter_id/audio", get(download_chapter_audio))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    book_id: Uuid,
}

const EPUB_SIGNATURE: &[u8] = b"PK\x03\x04";

async fn upload_book(State(state): State<GatewayState>, body: Bytes) -> Response {
    if body.len() as u64 > state.max_upload_bytes {
        return (StatusCode::PAYLOAD_TOO_LARGE, "upload exceeds the size limit").into_response();
    }
    if !body.starts_with(EPUB_SIGNATURE) {
        return (StatusCode::BAD_REQUEST, "not a valid EPUB container").into_response();
    }

    let book_id = Uuid::new_v4();

    if let Err(e) = state.object_store.put(&object_keys::book_epub(book_id), body.to_vec()).await {
        warn!(error = %e, "failed to store uploaded epub");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to store upload").into_response();
    }

    if let Err(e) = publish_json(state.broker.as_ref(), TRACKER_QUEUE, &TrackerOperation::AddBook { book_uuid: book_id }).await {
        warn!(error = %e, "failed to notify tracker of new book");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to register upload").into_response();
    }

    if let Err(e) = publish_json(state.broker.as_ref(), SPLIT_QUEUE, &SplitJob { book_uuid: book_id }).await {
        warn!(error = %e, "failed to enqueue split job");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to enqueue conversion").into_response();
    }

    info!(%book_id, bytes = body.len(), "book uploaded and queued for conversion");
    (StatusCode::ACCEPTED, Json(UploadResponse { book_id })).into_response()
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    book_id: Uuid,
    status: String,
    total_chapters: i64,
    completed_chapters: i64,
}

async fn book_status(State(state): State<GatewayState>, Path(book_id): Path<Uuid>) -> Response {
    let status = match state.aggregate_store.get(&agg_keys::book_status(book_id)).await {
        Ok(Some(s)) => s,
        Ok(None) => return (StatusCode::NOT_FOUND, "unknown book").into_response(),
        Err(e) => {
            warn!(error = %e, "failed to read book status");
            return (StatusCode::INTERNAL_SERVER_ERROR, "failed to read status").into_response();
        }
    };

    let parse_counter = |raw: Option<String>| raw.and_then(|s| s.parse::<i64>().ok()).unwrap_or(0);
    let total_chapters = parse_counter(
        state.aggregate_store.get(&agg_keys::book_total_chapters(book_id)).await.unwrap_or_default(),
    );
    let completed_chapters = parse_counter(
        state.aggregate_store.get(&agg_keys::book_completed_chapters(book_id)).await.unwrap_or_default(),
    );

    Json(StatusResponse { book_id, status, total_chapters, completed_chapters }).into_response()
}

async fn download_chapter_audio(
    State(state): State<GatewayState>,
    Path((book_id, chapter_id)): Path<(Uuid, Uuid)>,
) -> Response {
    let key = object_keys::chapter_audio(book_id, chapter_id);
    match state.object_store.get(&key).await {
        Ok(bytes) => ([("content-type", "audio/mpeg")], bytes).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "chapter audio not ready").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate_store::InMemoryAggregateStore;
    use crate::broker::InMemoryBroker;
    use crate::object_store::InMemoryObjectStore;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state() -> GatewayState {
        GatewayState {
            object_store: Arc::new(InMemoryObjectStore::new()),
            broker: Arc::new(InMemoryBroker::new()),
            aggregate_store: Arc::new(InMemoryAggregateStore::new()),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }

    #[tokio::test]
    async fn rejects_uploads_without_an_epub_signature() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/books")
                    .body(Body::from(b"not an epub".to_vec()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn accepts_a_signed_upload_and_returns_a_book_id() {
        let app = router(test_state());
        let mut body = EPUB_SIGNATURE.to_vec();
        body.extend_from_slice(b"rest of a fake epub");

        let response = app
            .oneshot(Request::builder().method("POST").uri("/books").body(Body::from(body)).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn status_for_unknown_book_is_not_found() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/books/{}/status", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn download_before_stitching_completes_is_not_found() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/books/{}/chapters/{}/audio", Uuid::new_v4(), Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

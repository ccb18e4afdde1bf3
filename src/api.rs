//! HTTP surface for ragserve.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /ask` – Answer a question about a document; when the document is
//!   not processed yet, ingestion is kicked off and the response reports
//!   `processing` instead of an answer.
//! - `POST /documents/:id/process` – Explicitly enqueue ingestion for a
//!   document and return the job id.
//! - `GET /documents/:id/status` – Report whether the document is processed
//!   and whether an ingestion run is currently in flight.
//! - `GET /jobs/:id` – Poll a submitted ingestion job.
//! - `POST /documents/:id/convert` – Convert a stored DOCX document to PDF
//!   in place.
//!
//! Every response body carries a `status` field that is one of `success`,
//! `processing`, or `error`.

use crate::ingest::JobStatus;
use crate::qa::{AskOutcome, DocumentQa, QaError};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Build the HTTP router exposing the question-answering surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: DocumentQa + 'static,
{
    Router::new()
        .route("/ask", post(ask::<S>))
        .route("/documents/:id/process", post(process_document::<S>))
        .route("/documents/:id/status", get(document_status::<S>))
        .route("/documents/:id/convert", post(convert_document::<S>))
        .route("/jobs/:id", get(job_status::<S>))
        .with_state(service)
}

/// Request body for the `POST /ask` endpoint.
#[derive(Deserialize)]
struct AskRequest {
    /// Document to ask about.
    document_id: i64,
    /// Natural-language question.
    question: String,
}

/// Response body for a successfully answered question.
#[derive(Serialize)]
struct AnswerResponse {
    status: &'static str,
    answer: String,
}

/// Response body when the document is still being processed.
#[derive(Serialize)]
struct ProcessingResponse {
    status: &'static str,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<Uuid>,
}

/// Answer a question about a document, triggering ingestion when needed.
async fn ask<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<AskRequest>,
) -> Result<Response, AppError>
where
    S: DocumentQa,
{
    let outcome = service
        .answer_question(request.document_id, &request.question)
        .await?;
    tracing::info!(
        document_id = request.document_id,
        answered = matches!(outcome, AskOutcome::Answered { .. }),
        "Ask request completed"
    );

    Ok(match outcome {
        AskOutcome::Answered { answer } => Json(AnswerResponse {
            status: "success",
            answer,
        })
        .into_response(),
        AskOutcome::Processing { job_id } => (
            StatusCode::ACCEPTED,
            Json(ProcessingResponse {
                status: "processing",
                message: "Document is being processed; retry shortly.",
                job_id,
            }),
        )
            .into_response(),
    })
}

/// Response body for `POST /documents/:id/process`.
#[derive(Serialize)]
struct EnqueueResponse {
    status: &'static str,
    job_id: Uuid,
}

/// Enqueue an ingestion job for the document.
async fn process_document<S>(
    State(service): State<Arc<S>>,
    Path(document_id): Path<i64>,
) -> Result<(StatusCode, Json<EnqueueResponse>), AppError>
where
    S: DocumentQa,
{
    let job_id = service.enqueue_processing(document_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            status: "processing",
            job_id,
        }),
    ))
}

/// Response body for `GET /documents/:id/status`.
#[derive(Serialize)]
struct DocumentStatusResponse {
    status: &'static str,
    processed: bool,
    locked: bool,
}

/// Report the document's processing state.
async fn document_status<S>(
    State(service): State<Arc<S>>,
    Path(document_id): Path<i64>,
) -> Result<Json<DocumentStatusResponse>, AppError>
where
    S: DocumentQa,
{
    let state = service.document_status(document_id).await?;
    Ok(Json(DocumentStatusResponse {
        status: "success",
        processed: state.processed,
        locked: state.locked,
    }))
}

/// Response body for `GET /jobs/:id`.
#[derive(Serialize)]
struct JobStatusResponse {
    status: &'static str,
    document_id: i64,
    job_status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Poll a submitted ingestion job.
async fn job_status<S>(
    State(service): State<Arc<S>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, AppError>
where
    S: DocumentQa,
{
    let record = service
        .job_status(job_id)
        .ok_or(AppError::JobMissing(job_id))?;
    Ok(Json(JobStatusResponse {
        status: "success",
        document_id: record.document_id,
        job_status: record.status,
        error: record.error,
    }))
}

/// Response body for `POST /documents/:id/convert`.
#[derive(Serialize)]
struct ConvertResponse {
    status: &'static str,
}

/// Convert a stored DOCX document to PDF in place.
async fn convert_document<S>(
    State(service): State<Arc<S>>,
    Path(document_id): Path<i64>,
) -> Result<Json<ConvertResponse>, AppError>
where
    S: DocumentQa,
{
    service.convert_document(document_id).await?;
    Ok(Json(ConvertResponse { status: "success" }))
}

enum AppError {
    Qa(QaError),
    JobMissing(Uuid),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, message) = match self {
            Self::Qa(QaError::DocumentMissing(id)) => {
                (StatusCode::NOT_FOUND, format!("document {id} not found"))
            }
            Self::Qa(error) => (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
            Self::JobMissing(id) => (StatusCode::NOT_FOUND, format!("job {id} not found")),
        };
        (
            code,
            Json(serde_json::json!({ "status": "error", "message": message })),
        )
            .into_response()
    }
}

impl From<QaError> for AppError {
    fn from(inner: QaError) -> Self {
        Self::Qa(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::JobRecord;
    use crate::qa::DocumentState;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request},
    };
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use tower::ServiceExt;

    struct StubQa {
        processed: bool,
        locked: bool,
        enqueued: Mutex<Vec<i64>>,
        job: Option<JobRecord>,
    }

    impl StubQa {
        fn new() -> Self {
            Self {
                processed: false,
                locked: false,
                enqueued: Mutex::new(Vec::new()),
                job: None,
            }
        }
    }

    #[async_trait]
    impl DocumentQa for StubQa {
        async fn answer_question(
            &self,
            document_id: i64,
            _question: &str,
        ) -> Result<AskOutcome, QaError> {
            if self.processed {
                return Ok(AskOutcome::Answered {
                    answer: "42".into(),
                });
            }
            if self.locked {
                return Ok(AskOutcome::Processing { job_id: None });
            }
            self.enqueued.lock().unwrap().push(document_id);
            Ok(AskOutcome::Processing {
                job_id: Some(Uuid::nil()),
            })
        }

        async fn enqueue_processing(&self, document_id: i64) -> Result<Uuid, QaError> {
            self.enqueued.lock().unwrap().push(document_id);
            Ok(Uuid::nil())
        }

        async fn document_status(&self, _document_id: i64) -> Result<DocumentState, QaError> {
            Ok(DocumentState {
                processed: self.processed,
                locked: self.locked,
            })
        }

        fn job_status(&self, _job_id: Uuid) -> Option<JobRecord> {
            self.job.clone()
        }

        async fn convert_document(&self, document_id: i64) -> Result<(), QaError> {
            if document_id == 404 {
                return Err(QaError::DocumentMissing(document_id));
            }
            Ok(())
        }
    }

    async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = match body {
            Some(json) => Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn ask_returns_the_answer_for_processed_documents() {
        let service = Arc::new(StubQa {
            processed: true,
            ..StubQa::new()
        });
        let app = create_router(service);

        let (status, body) = send(
            app,
            Method::POST,
            "/ask",
            Some(json!({ "document_id": 1, "question": "meaning of life?" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["answer"], "42");
    }

    #[tokio::test]
    async fn ask_reports_processing_with_the_job_id() {
        let service = Arc::new(StubQa::new());
        let app = create_router(Arc::clone(&service));

        let (status, body) = send(
            app,
            Method::POST,
            "/ask",
            Some(json!({ "document_id": 9, "question": "anything" })),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "processing");
        assert_eq!(body["job_id"], Uuid::nil().to_string());
        assert_eq!(*service.enqueued.lock().unwrap(), vec![9]);
    }

    #[tokio::test]
    async fn ask_omits_the_job_id_while_a_run_is_in_flight() {
        let service = Arc::new(StubQa {
            locked: true,
            ..StubQa::new()
        });
        let app = create_router(Arc::clone(&service));

        let (status, body) = send(
            app,
            Method::POST,
            "/ask",
            Some(json!({ "document_id": 9, "question": "anything" })),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "processing");
        assert!(body.get("job_id").is_none());
        assert!(service.enqueued.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn process_route_enqueues_and_returns_the_job_id() {
        let service = Arc::new(StubQa::new());
        let app = create_router(Arc::clone(&service));

        let (status, body) = send(app, Method::POST, "/documents/7/process", None).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "processing");
        assert_eq!(body["job_id"], Uuid::nil().to_string());
        assert_eq!(*service.enqueued.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn status_route_reports_flags() {
        let service = Arc::new(StubQa {
            locked: true,
            ..StubQa::new()
        });
        let app = create_router(service);

        let (status, body) = send(app, Method::GET, "/documents/7/status", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["processed"], false);
        assert_eq!(body["locked"], true);
    }

    #[tokio::test]
    async fn job_route_reports_failure_details() {
        let service = Arc::new(StubQa {
            job: Some(JobRecord {
                document_id: 3,
                status: JobStatus::Failure,
                error: Some("partitioner unreachable".into()),
            }),
            ..StubQa::new()
        });
        let app = create_router(service);

        let uri = format!("/jobs/{}", Uuid::nil());
        let (status, body) = send(app, Method::GET, &uri, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["job_status"], "failure");
        assert_eq!(body["error"], "partitioner unreachable");
    }

    #[tokio::test]
    async fn unknown_job_is_a_404_error() {
        let app = create_router(Arc::new(StubQa::new()));
        let uri = format!("/jobs/{}", Uuid::new_v4());
        let (status, body) = send(app, Method::GET, &uri, None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn convert_route_maps_missing_documents_to_404() {
        let app = create_router(Arc::new(StubQa::new()));

        let (status, body) = send(app.clone(), Method::POST, "/documents/5/convert", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");

        let (status, body) = send(app, Method::POST, "/documents/404/convert", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");
    }
}

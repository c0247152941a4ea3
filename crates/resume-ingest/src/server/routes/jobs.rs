//! Batch job endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{JobResults, JobStatus, JobStatusView, ParsedResult, SubmitRequest};

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

/// Body of POST /api/jobs
#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub folder_id: String,
    /// Existing spreadsheet (or CSV file) to append to
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    #[serde(default)]
    pub results_ttl_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
}

/// POST /api/jobs - Start a job for a folder
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> Result<Json<CreateJobResponse>> {
    let mut submit = SubmitRequest::new(request.folder_id);
    if let Some(sink) = request.spreadsheet_id {
        submit = submit.with_sink(sink);
    }
    if let Some(ttl) = request.results_ttl_secs {
        submit = submit.with_results_ttl(Duration::from_secs(ttl));
    }

    let job_id = state.manager().submit(submit).await?;

    Ok(Json(CreateJobResponse {
        job_id,
        status: JobStatus::Pending,
        message: format!(
            "Job queued successfully. Use /api/jobs/{} to check progress.",
            job_id
        ),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobStatusView>,
    pub total_jobs: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// GET /api/jobs - Most recent jobs first
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<JobListResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let jobs = state.manager().list_jobs(limit).await?;

    let count = |status: JobStatus| jobs.iter().filter(|j| j.status == status).count();

    Ok(Json(JobListResponse {
        total_jobs: jobs.len(),
        pending: count(JobStatus::Pending),
        processing: count(JobStatus::Processing),
        completed: count(JobStatus::Completed),
        failed: count(JobStatus::Failed),
        cancelled: count(JobStatus::Cancelled),
        jobs,
    }))
}

/// GET /api/jobs/:id - Job status and progress
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusView>> {
    Ok(Json(state.manager().get_status(job_id).await?))
}

#[derive(Debug, Serialize)]
pub struct JobResultsResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    /// False while the job is still running
    pub complete: bool,
    pub total_files: Option<usize>,
    pub results: Vec<ParsedResult>,
}

/// GET /api/jobs/:id/results - 202 until processing starts
pub async fn get_job_results(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Response> {
    let manager = state.manager();
    let status = manager.get_status(job_id).await?;

    match manager.get_results(job_id).await? {
        JobResults::Pending => Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "job_id": job_id,
                "status": JobStatus::Pending,
            })),
        )
            .into_response()),
        JobResults::Ready(results) => Ok(Json(JobResultsResponse {
            job_id,
            complete: status.status.is_terminal(),
            status: status.status,
            total_files: status.total_files,
            results,
        })
        .into_response()),
    }
}

/// POST /api/jobs/:id/cancel - Stop starting new files
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusView>> {
    let manager = state.manager();
    manager.cancel(job_id).await?;
    Ok(Json(manager.get_status(job_id).await?))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::test_support::{
        read_json, test_app, wait_for_terminal, ScriptedFileSource, RESUME_TEXT,
    };
    use crate::types::JobRecord;

    fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_create_job_and_fetch_results() {
        let source = ScriptedFileSource::new()
            .with_file("a", "jane.pdf", RESUME_TEXT)
            .with_file("b", "notes.txt", "not a resume");
        let (app, manager, _) = test_app(source);

        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/jobs",
                serde_json::json!({ "folder_id": "folder-1" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["status"], "pending");
        let job_id: uuid::Uuid = serde_json::from_value(body["job_id"].clone()).unwrap();

        wait_for_terminal(&manager, job_id).await;

        let response = app
            .clone()
            .oneshot(get(&format!("/api/jobs/{}", job_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status = read_json(response).await;
        assert_eq!(status["status"], "completed");
        assert_eq!(status["processed_files"], 2);
        assert_eq!(status["progress"], 100);

        let response = app
            .oneshot(get(&format!("/api/jobs/{}/results", job_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["complete"], true);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);

        let jane = results.iter().find(|r| r["source_file"] == "jane.pdf").unwrap();
        assert_eq!(jane["email"], "jane.roe@example.com");
        let notes = results.iter().find(|r| r["source_file"] == "notes.txt").unwrap();
        assert!(!notes["errors"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_folder_is_bad_request() {
        let (app, _, _) = test_app(ScriptedFileSource::new());
        let response = app
            .oneshot(json_request(
                Method::POST,
                "/api/jobs",
                serde_json::json!({ "folder_id": "  " }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["error"]["type"], "invalid_input");
    }

    #[tokio::test]
    async fn test_huge_results_ttl_is_bad_request() {
        let (app, _, _) = test_app(ScriptedFileSource::new());
        let response = app
            .oneshot(json_request(
                Method::POST,
                "/api/jobs",
                serde_json::json!({ "folder_id": "folder", "results_ttl_secs": u64::MAX }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["error"]["type"], "invalid_input");
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let (app, _, _) = test_app(ScriptedFileSource::new());
        let missing = uuid::Uuid::new_v4();

        let response = app
            .clone()
            .oneshot(get(&format!("/api/jobs/{}", missing)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(read_json(response).await["error"]["type"], "not_found");

        let response = app
            .oneshot(json_request(
                Method::POST,
                &format!("/api/jobs/{}/cancel", missing),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_pending_results_are_accepted() {
        let (app, manager, _) = test_app(ScriptedFileSource::new());
        let job = JobRecord::new("folder", None, Duration::from_secs(60));
        manager.store().create_job(&job).unwrap();

        let response = app
            .oneshot(get(&format!("/api/jobs/{}/results", job.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(read_json(response).await["status"], "pending");
    }

    #[tokio::test]
    async fn test_cancel_pending_job() {
        let (app, manager, _) = test_app(ScriptedFileSource::new());
        let job = JobRecord::new("folder", None, Duration::from_secs(60));
        manager.store().create_job(&job).unwrap();

        let response = app
            .oneshot(json_request(
                Method::POST,
                &format!("/api/jobs/{}/cancel", job.id),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["cancel_requested"], true);
    }

    #[tokio::test]
    async fn test_list_jobs() {
        let source = ScriptedFileSource::new().with_file("a", "jane.pdf", RESUME_TEXT);
        let (app, manager, _) = test_app(source);
        let first = JobRecord::new("folder-1", None, Duration::from_secs(60));
        manager.store().create_job(&first).unwrap();
        let second = JobRecord::new("folder-2", None, Duration::from_secs(60));
        manager.store().create_job(&second).unwrap();

        let response = app.oneshot(get("/api/jobs?limit=10")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["total_jobs"], 2);
        assert_eq!(body["pending"], 2);
        assert_eq!(body["jobs"].as_array().unwrap().len(), 2);
    }
}

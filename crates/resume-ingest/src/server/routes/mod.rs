//! API routes for the ingestion server

pub mod jobs;
pub mod parse;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Batch jobs
        .route("/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/jobs/:id", get(jobs::get_job))
        .route("/jobs/:id/results", get(jobs::get_job_results))
        .route("/jobs/:id/cancel", post(jobs::cancel_job))
        // Single-file parsing, with a larger body limit for uploads
        .route(
            "/parse",
            post(parse::parse_file).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "resume-ingest",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Batch resume ingestion with OCR fallback and contact field extraction",
        "endpoints": {
            "POST /api/jobs": "Start a job for a folder ({folder_id, spreadsheet_id?})",
            "GET /api/jobs": "List recent jobs",
            "GET /api/jobs/:id": "Get job status and progress",
            "GET /api/jobs/:id/results": "Get parsed results (202 while pending)",
            "POST /api/jobs/:id/cancel": "Stop starting new files for a job",
            "POST /api/parse": "Parse a single uploaded PDF or DOCX"
        }
    }))
}

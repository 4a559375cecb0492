//! HTTP surface over the job engine (`tunedl serve`).

mod dto;
mod errors;
mod extract;
mod routes;


use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tunedl_core::resolver::Resolver;
use tunedl_core::JobManager;

pub use dto::{CreateJobRequest, CreateJobResponse, JobView, OkResponse, ResolveRequest};
pub use errors::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<JobManager>,
    pub resolver: Arc<dyn Resolver>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/resolve", post(routes::resolve))
        .route("/jobs", post(routes::create_job).get(routes::list_jobs))
        .route("/jobs/:id", get(routes::get_job))
        .route("/jobs/:id/cancel", post(routes::cancel_job))
        .route("/jobs/:id/pause", post(routes::pause_job))
        .route("/jobs/:id/resume", post(routes::resume_job))
        .route("/jobs/:id/delete", post(routes::delete_job))
        .route("/jobs/:id/items/:index/pause", post(routes::pause_item))
        .route("/jobs/:id/items/:index/resume", post(routes::resume_item))
        .route("/jobs/:id/download", get(routes::download_archive))
        .route("/jobs/:id/tracks", get(routes::job_tracks))
        .route("/jobs/:id/tracks/:track_id/stream", get(routes::stream_job_track))
        .route("/jobs/:id/tracks/:track_id/delete", post(routes::delete_job_track))
        .route("/library/tracks", get(routes::library_tracks))
        .route("/library/tracks/:track_id/stream", get(routes::stream_library_track))
        .route("/library/tracks/:track_id/delete", post(routes::delete_library_track))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves, then stop every job's worker.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let manager = Arc::clone(&state.manager);
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    manager.shutdown().await;
    Ok(())
}

//! Route handlers. Mutating endpoints answer `{"ok": true}` and are
//! idempotent on already-applied state.

use std::path::Path as FsPath;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tunedl_core::job::JobSummary;
use tunedl_core::resolver::Resolution;
use tunedl_core::EngineError;

use super::dto::{CreateJobRequest, CreateJobResponse, JobView, OkResponse, ResolveRequest, TrackList};
use super::extract::{ApiJson, ApiPath};
use super::{ApiError, AppState};

type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn resolve(State(state): State<AppState>, ApiJson(req): ApiJson<ResolveRequest>) -> ApiResult<Resolution> {
    Ok(Json(state.resolver.resolve(&req.url).await?))
}

pub async fn create_job(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateJobRequest>,
) -> ApiResult<CreateJobResponse> {
    let job_id = state.manager.create_job(req.into_new_job())?;
    Ok(Json(CreateJobResponse { job_id }))
}

pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobSummary>> {
    Json(state.manager.list_summaries())
}

pub async fn get_job(State(state): State<AppState>, ApiPath(id): ApiPath<String>) -> ApiResult<JobView> {
    Ok(Json(state.manager.get_job(&id)?.into()))
}

pub async fn cancel_job(State(state): State<AppState>, ApiPath(id): ApiPath<String>) -> ApiResult<OkResponse> {
    state.manager.cancel_job(&id)?;
    Ok(Json(OkResponse::ok()))
}

pub async fn pause_job(State(state): State<AppState>, ApiPath(id): ApiPath<String>) -> ApiResult<OkResponse> {
    state.manager.pause_job(&id)?;
    Ok(Json(OkResponse::ok()))
}

pub async fn resume_job(State(state): State<AppState>, ApiPath(id): ApiPath<String>) -> ApiResult<OkResponse> {
    state.manager.resume_job(&id)?;
    Ok(Json(OkResponse::ok()))
}

/// Deleting an unknown (or already deleted) job succeeds.
pub async fn delete_job(State(state): State<AppState>, ApiPath(id): ApiPath<String>) -> ApiResult<OkResponse> {
    match state.manager.delete_job(&id).await {
        Ok(()) | Err(EngineError::NotFound(_)) => Ok(Json(OkResponse::ok())),
        Err(e) => Err(e.into()),
    }
}

pub async fn pause_item(
    State(state): State<AppState>,
    ApiPath((id, index)): ApiPath<(String, u32)>,
) -> ApiResult<OkResponse> {
    state.manager.pause_item(&id, index)?;
    Ok(Json(OkResponse::ok()))
}

pub async fn resume_item(
    State(state): State<AppState>,
    ApiPath((id, index)): ApiPath<(String, u32)>,
) -> ApiResult<OkResponse> {
    state.manager.resume_item(&id, index)?;
    Ok(Json(OkResponse::ok()))
}

pub async fn download_archive(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    req: Request,
) -> Result<Response, ApiError> {
    let path = state
        .manager
        .archive_path(&id)?
        .ok_or_else(|| ApiError::BadRequest("not ready".to_string()))?;
    send_file(&path, Some(&format!("{id}.zip")), req).await
}

pub async fn job_tracks(State(state): State<AppState>, ApiPath(id): ApiPath<String>) -> ApiResult<TrackList> {
    let tracks = state.manager.job_tracks(&id).await?;
    Ok(Json(TrackList::new(&format!("/jobs/{id}/tracks"), tracks)))
}

pub async fn stream_job_track(
    State(state): State<AppState>,
    ApiPath((id, track_id)): ApiPath<(String, String)>,
    req: Request,
) -> Result<Response, ApiError> {
    let path = state.manager.job_track_path(&id, &track_id).await?;
    send_file(&path, None, req).await
}

pub async fn delete_job_track(
    State(state): State<AppState>,
    ApiPath((id, track_id)): ApiPath<(String, String)>,
) -> ApiResult<OkResponse> {
    state.manager.delete_job_track(&id, &track_id).await?;
    Ok(Json(OkResponse::ok()))
}

pub async fn library_tracks(State(state): State<AppState>) -> ApiResult<TrackList> {
    let tracks = state.manager.library_tracks().await?;
    Ok(Json(TrackList::new("/library/tracks", tracks)))
}

pub async fn stream_library_track(
    State(state): State<AppState>,
    ApiPath(track_id): ApiPath<String>,
    req: Request,
) -> Result<Response, ApiError> {
    let path = state.manager.library_track_path(&track_id).await?;
    send_file(&path, None, req).await
}

pub async fn delete_library_track(
    State(state): State<AppState>,
    ApiPath(track_id): ApiPath<String>,
) -> ApiResult<OkResponse> {
    state.manager.delete_library_track(&track_id).await?;
    Ok(Json(OkResponse::ok()))
}

/// Stream `path` from disk; content type follows the extension and range
/// requests are honored.
async fn send_file(path: &FsPath, attachment: Option<&str>, req: Request) -> Result<Response, ApiError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Err(ApiError::NotFound("file not found".to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("file not found".to_string()))
        }
        Err(e) => return Err(ApiError::Internal(format!("stat {}: {e}", path.display()))),
    }
    let res = match ServeFile::new(path).oneshot(req).await {
        Ok(res) => res,
        Err(never) => match never {},
    };
    let mut res = res.map(Body::new).into_response();
    if let Some(name) = attachment {
        let value = format!("attachment; filename=\"{name}\"");
        if let Ok(v) = header::HeaderValue::from_str(&value) {
            res.headers_mut().insert(header::CONTENT_DISPOSITION, v);
        }
    }
    Ok(res)
}

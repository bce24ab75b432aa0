use crate::{
    auth::Auth,
    backend::{self, BackendClient},
    error::{AppError, AppResult},
    forms::{self, DecodedImage},
};
use axum::{http::StatusCode, Router};
use diesel::QueryResult;

pub mod admin;
pub mod announcements;
pub mod auth;
pub mod clubs;
pub mod dashboard;
pub mod events;
pub mod home;
pub mod realtime;
pub mod search;

pub fn app() -> Router {
    Router::new()
        .nest("/auth", auth::app())
        .nest("/admin", admin::app())
        .merge(home::app())
        .merge(search::app())
        .merge(events::app())
        .merge(clubs::app())
        .merge(announcements::app())
        .merge(dashboard::app())
        .merge(realtime::app())
}

fn conflict(message: &'static str) -> AppError {
    AppError::from(StatusCode::CONFLICT, message)
}

/// Hosted-service failures keep their client status; the rest are 500s.
fn backend_error(err: anyhow::Error) -> AppError {
    match backend::client_status(&err) {
        Some((status, message)) => AppError::from(status, message),
        None => AppError::InternalServerError(err),
    }
}

/// Stores an already validated image under the user's folder and returns its
/// public url.
async fn upload_image(
    backend: &BackendClient,
    auth: &Auth,
    bucket: &str,
    prefix: &str,
    image: DecodedImage,
) -> AppResult<String> {
    let path = forms::object_path(prefix, auth.user_id(), &image.extension);
    if let Err(e) = backend
        .upload(&auth.token, bucket, &path, &image.content_type, image.bytes)
        .await
    {
        tracing::error!(bucket, %path, "image upload failed: {e:#}");
        return Err(backend_error(e));
    }
    Ok(backend.public_url(bucket, &path)?.to_string())
}

/// Passes a write result through. When the write failed after an image was
/// uploaded for it, the object stays in storage.
fn after_upload<T>(result: QueryResult<T>, image_url: Option<&str>) -> AppResult<T> {
    result.map_err(|e| {
        if let Some(url) = image_url {
            tracing::warn!(url, "write failed after upload, image left in storage");
        }
        e.into()
    })
}

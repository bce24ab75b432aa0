use crate::{
    auth::ExtractAuth,
    dashboard::{self, Dashboard},
    error::{AppError, AppResult},
    forms::ProfileForm,
    models::Profile,
    queries, DbPool,
};
use axum::{routing::get, Extension, Json, Router};

async fn show(
    ExtractAuth(auth): ExtractAuth,
    Extension(pool): Extension<DbPool>,
) -> AppResult<Json<Dashboard>> {
    let conn = &mut pool.get().await?;
    Ok(Json(dashboard::load(conn, auth.user_id()).await))
}

async fn profile(
    ExtractAuth(auth): ExtractAuth,
    Extension(pool): Extension<DbPool>,
) -> AppResult<Json<Profile>> {
    let conn = &mut pool.get().await?;
    queries::profiles::find(conn, auth.user_id())
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("no profile for this account"))
}

async fn edit_profile(
    ExtractAuth(auth): ExtractAuth,
    Extension(pool): Extension<DbPool>,
    Json(form): Json<ProfileForm>,
) -> AppResult<Json<Profile>> {
    let changes = form.into_changes()?;

    let conn = &mut pool.get().await?;
    let profile = queries::profiles::update(conn, auth.user_id(), changes)
        .await?
        .ok_or_else(|| AppError::not_found("no profile for this account"))?;

    tracing::info!(user_id = %auth.user_id(), "edited profile");
    Ok(Json(profile))
}

pub fn app() -> Router {
    Router::new()
        .route("/dashboard", get(show))
        .route("/profile", get(profile).put(edit_profile))
}

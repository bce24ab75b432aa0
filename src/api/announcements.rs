use crate::{
    auth::ExtractAuth,
    error::{AppError, AppResult},
    forms::{AnnouncementEditForm, AnnouncementForm, ANNOUNCEMENT_CATEGORIES},
    models::Announcement,
    queries,
    realtime::{Change, ChangeFeed, Table},
    views::Views,
    DbPool,
};
use axum::{
    extract::Path,
    http::StatusCode,
    routing::{get, put},
    Extension, Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

async fn list(Extension(views): Extension<Arc<Views>>) -> Json<Vec<Announcement>> {
    Json(views.announcements.rows().to_vec())
}

async fn list_categories() -> Json<Vec<&'static str>> {
    Json(ANNOUNCEMENT_CATEGORIES.to_vec())
}

async fn create(
    ExtractAuth(auth): ExtractAuth,
    Extension(pool): Extension<DbPool>,
    Extension(feed): Extension<ChangeFeed>,
    Json(form): Json<AnnouncementForm>,
) -> AppResult<(StatusCode, Json<Announcement>)> {
    let new = form.into_new_announcement(auth.user_id())?;

    let conn = &mut pool.get().await?;
    auth.ensure_admin(conn).await?;
    let announcement = queries::announcements::insert(conn, new).await?;

    tracing::info!(announcement_id = %announcement.id, user_id = %auth.user_id(), "posted announcement");
    feed.publish(Change::insert(Table::Announcements, &announcement));
    Ok((StatusCode::CREATED, Json(announcement)))
}

async fn edit(
    ExtractAuth(auth): ExtractAuth,
    Path(id): Path<Uuid>,
    Extension(pool): Extension<DbPool>,
    Extension(feed): Extension<ChangeFeed>,
    Json(form): Json<AnnouncementEditForm>,
) -> AppResult<Json<Announcement>> {
    let changes = form.into_changes()?;

    let conn = &mut pool.get().await?;
    let old = queries::announcements::find(conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("the announcement does not exist"))?;
    auth.ensure_owner_or_admin(conn, old.created_by).await?;
    let announcement = queries::announcements::update(conn, id, changes).await?;

    tracing::info!(announcement_id = %id, user_id = %auth.user_id(), "edited announcement");
    feed.publish(Change::update(
        Table::Announcements,
        Some(&old),
        &announcement,
    ));
    Ok(Json(announcement))
}

async fn remove(
    ExtractAuth(auth): ExtractAuth,
    Path(id): Path<Uuid>,
    Extension(pool): Extension<DbPool>,
    Extension(feed): Extension<ChangeFeed>,
) -> AppResult<StatusCode> {
    let conn = &mut pool.get().await?;
    let announcement = queries::announcements::find(conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("the announcement does not exist"))?;
    auth.ensure_owner_or_admin(conn, announcement.created_by).await?;

    let deleted = queries::announcements::delete(conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("the announcement does not exist"))?;

    tracing::info!(announcement_id = %id, user_id = %auth.user_id(), "deleted announcement");
    feed.publish(Change::delete(Table::Announcements, &deleted));
    Ok(StatusCode::NO_CONTENT)
}

pub fn app() -> Router {
    Router::new()
        .route("/announcements", get(list).post(create))
        .route("/announcement-categories", get(list_categories))
        .route("/announcements/:id", put(edit).delete(remove))
}

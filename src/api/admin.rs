use crate::{
    auth::AdminOnly,
    error::{AppError, AppResult},
    queries::{self, memberships::MembershipRow},
    DbPool,
};
use axum::{
    extract::Path,
    http::StatusCode,
    routing::{delete, get},
    Extension, Json, Router,
};
use uuid::Uuid;

async fn list_memberships(
    AdminOnly(_): AdminOnly,
    Extension(pool): Extension<DbPool>,
) -> AppResult<Json<Vec<MembershipRow>>> {
    let conn = &mut pool.get().await?;
    Ok(Json(queries::memberships::all_with_names(conn).await?))
}

async fn remove_membership(
    AdminOnly(admin): AdminOnly,
    Path(id): Path<Uuid>,
    Extension(pool): Extension<DbPool>,
) -> AppResult<StatusCode> {
    let conn = &mut pool.get().await?;
    let removed = queries::memberships::remove(conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("the membership does not exist"))?;

    tracing::info!(
        membership_id = %id,
        club_id = %removed.club_id,
        user_id = %removed.user_id,
        admin_id = %admin.user_id(),
        "removed club member"
    );
    Ok(StatusCode::NO_CONTENT)
}

pub fn app() -> Router {
    Router::new()
        .route("/memberships", get(list_memberships))
        .route("/memberships/:id", delete(remove_membership))
}

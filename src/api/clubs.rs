use super::{after_upload, conflict, events::EventCard, upload_image};
use crate::{
    auth::ExtractAuth,
    backend::{BackendClient, CLUB_IMAGES_BUCKET},
    error::{AppError, AppResult},
    forms::{ClubEditForm, ClubForm},
    models::Club,
    queries::{self, events::EventListing, memberships::ClubMember},
    realtime::{Change, ChangeFeed, Table},
    views::Views,
    DbPool,
};
use axum::{
    extract::Path,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::{collections::HashSet, sync::Arc};
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubCard {
    #[serde(flatten)]
    pub club: Club,
    pub is_member: bool,
}

async fn list(
    auth: Option<ExtractAuth>,
    Extension(pool): Extension<DbPool>,
    Extension(views): Extension<Arc<Views>>,
) -> AppResult<Json<Vec<ClubCard>>> {
    let joined: HashSet<Uuid> = match auth {
        Some(ExtractAuth(auth)) => {
            let conn = &mut pool.get().await?;
            queries::memberships::club_ids_for(conn, auth.user_id())
                .await?
                .into_iter()
                .collect()
        }
        None => HashSet::new(),
    };

    Ok(Json(
        views
            .clubs
            .rows()
            .iter()
            .map(|club| ClubCard {
                club: club.clone(),
                is_member: joined.contains(&club.id),
            })
            .collect(),
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClubDetail {
    #[serde(flatten)]
    club: Club,
    is_member: bool,
    events: Vec<EventCard>,
    members: Vec<ClubMember>,
}

async fn show(
    auth: Option<ExtractAuth>,
    Path(id): Path<Uuid>,
    Extension(pool): Extension<DbPool>,
) -> AppResult<Json<ClubDetail>> {
    let conn = &mut pool.get().await?;
    let club = queries::clubs::find(conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("the club does not exist"))?;
    let user_id = auth.map(|ExtractAuth(auth)| auth.user_id());

    let is_member = match user_id {
        Some(user_id) => queries::memberships::is_member(conn, user_id, id).await?,
        None => false,
    };
    let listings = queries::events::for_club(conn, id)
        .await?
        .into_iter()
        .map(|event| EventListing {
            event,
            club_name: Some(club.name.clone()),
        })
        .collect();
    let events = super::events::cards(conn, user_id, listings).await?;
    let members = queries::memberships::members_of(conn, id).await?;

    Ok(Json(ClubDetail {
        club,
        is_member,
        events,
        members,
    }))
}

async fn create(
    ExtractAuth(auth): ExtractAuth,
    Extension(pool): Extension<DbPool>,
    Extension(backend): Extension<BackendClient>,
    Extension(feed): Extension<ChangeFeed>,
    Json(mut form): Json<ClubForm>,
) -> AppResult<(StatusCode, Json<Club>)> {
    form.validate()?;
    let image = form.image.take().map(|i| i.decode()).transpose()?;

    let image_url = match image {
        Some(image) => {
            Some(upload_image(&backend, &auth, CLUB_IMAGES_BUCKET, "clubs", image).await?)
        }
        None => None,
    };
    let new = form.into_new_club(auth.user_id(), image_url.clone())?;
    let conn = &mut pool.get().await?;
    let club = after_upload(queries::clubs::insert(conn, new).await, image_url.as_deref())?;

    tracing::info!(club_id = %club.id, user_id = %auth.user_id(), "created club");
    feed.publish(Change::insert(Table::Clubs, &club));
    Ok((StatusCode::CREATED, Json(club)))
}

async fn edit(
    ExtractAuth(auth): ExtractAuth,
    Path(id): Path<Uuid>,
    Extension(pool): Extension<DbPool>,
    Extension(backend): Extension<BackendClient>,
    Extension(feed): Extension<ChangeFeed>,
    Json(form): Json<ClubEditForm>,
) -> AppResult<Json<Club>> {
    let (mut changes, image) = form.into_changes()?;
    let image = image.map(|i| i.decode()).transpose()?;

    let conn = &mut pool.get().await?;
    let old = queries::clubs::find(conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("the club does not exist"))?;
    auth.ensure_owner_or_admin(conn, old.created_by).await?;

    if let Some(image) = image {
        changes.image_url =
            Some(upload_image(&backend, &auth, CLUB_IMAGES_BUCKET, "clubs", image).await?);
    }
    let image_url = changes.image_url.clone();
    let club = after_upload(
        queries::clubs::update(conn, id, changes).await,
        image_url.as_deref(),
    )?;

    tracing::info!(club_id = %id, user_id = %auth.user_id(), "edited club");
    feed.publish(Change::update(Table::Clubs, Some(&old), &club));
    Ok(Json(club))
}

async fn remove(
    ExtractAuth(auth): ExtractAuth,
    Path(id): Path<Uuid>,
    Extension(pool): Extension<DbPool>,
    Extension(feed): Extension<ChangeFeed>,
) -> AppResult<StatusCode> {
    let conn = &mut pool.get().await?;
    let club = queries::clubs::find(conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("the club does not exist"))?;
    auth.ensure_owner_or_admin(conn, club.created_by).await?;

    // the schema takes these down with the club
    let hosted = queries::events::for_club(conn, id).await?;
    let deleted = queries::clubs::delete(conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("the club does not exist"))?;

    tracing::info!(
        club_id = %id,
        user_id = %auth.user_id(),
        events = hosted.len(),
        "deleted club"
    );
    for event in &hosted {
        feed.publish(Change::delete(Table::Events, event));
    }
    feed.publish(Change::delete(Table::Clubs, &deleted));
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MembershipStatus {
    club_id: Uuid,
    is_member: bool,
}

async fn join(
    ExtractAuth(auth): ExtractAuth,
    Path(id): Path<Uuid>,
    Extension(pool): Extension<DbPool>,
) -> AppResult<(StatusCode, Json<MembershipStatus>)> {
    let conn = &mut pool.get().await?;
    if queries::clubs::find(conn, id).await?.is_none() {
        return Err(AppError::not_found("the club does not exist"));
    }

    if !queries::memberships::join(conn, auth.user_id(), id).await? {
        return Err(conflict("You are already a member of this club."));
    }

    tracing::info!(club_id = %id, user_id = %auth.user_id(), "joined club");
    Ok((
        StatusCode::CREATED,
        Json(MembershipStatus {
            club_id: id,
            is_member: true,
        }),
    ))
}

async fn leave(
    ExtractAuth(auth): ExtractAuth,
    Path(id): Path<Uuid>,
    Extension(pool): Extension<DbPool>,
) -> AppResult<Json<MembershipStatus>> {
    let conn = &mut pool.get().await?;
    if !queries::memberships::leave(conn, auth.user_id(), id).await? {
        return Err(AppError::not_found("You are not a member of this club."));
    }

    tracing::info!(club_id = %id, user_id = %auth.user_id(), "left club");
    Ok(Json(MembershipStatus {
        club_id: id,
        is_member: false,
    }))
}

pub fn app() -> Router {
    Router::new()
        .route("/clubs", get(list).post(create))
        .route("/clubs/:id", get(show).put(edit).delete(remove))
        .route("/clubs/:id/membership", post(join).delete(leave))
}

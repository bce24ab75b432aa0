use super::{after_upload, conflict, upload_image};
use crate::{
    auth::ExtractAuth,
    backend::{BackendClient, EVENT_IMAGES_BUCKET},
    error::{AppError, AppResult},
    forms::{EventEditForm, EventForm},
    models::Event,
    queries::{self, events::EventListing, registrations::RegisterOutcome},
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
use diesel_async::AsyncPgConnection;
use serde::Serialize;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use uuid::Uuid;

pub const SUGGESTED_LIMIT: usize = 3;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCard {
    #[serde(flatten)]
    pub listing: EventListing,
    pub registered_count: i64,
    pub spots_left: i64,
    pub is_registered: bool,
}

impl EventCard {
    pub fn new(listing: EventListing, registered_count: i64, is_registered: bool) -> EventCard {
        let spots_left = (i64::from(listing.event.capacity) - registered_count).max(0);
        EventCard {
            listing,
            registered_count,
            spots_left,
            is_registered,
        }
    }
}

/// Registered counts and the caller's own registrations for `listings`, two
/// queries however many events there are.
pub async fn cards(
    conn: &mut AsyncPgConnection,
    user_id: Option<Uuid>,
    listings: Vec<EventListing>,
) -> AppResult<Vec<EventCard>> {
    let ids: Vec<Uuid> = listings.iter().map(|l| l.event.id).collect();
    let counts: HashMap<Uuid, i64> = queries::registrations::counts(conn, &ids).await?;
    let registered: HashSet<Uuid> = match user_id {
        Some(user_id) => queries::registrations::registered_among(conn, user_id, &ids).await?,
        None => HashSet::new(),
    };

    Ok(listings
        .into_iter()
        .map(|listing| {
            let id = listing.event.id;
            EventCard::new(
                listing,
                counts.get(&id).copied().unwrap_or(0),
                registered.contains(&id),
            )
        })
        .collect())
}

/// Moves up to `limit` events hosted by the user's clubs to the front
/// section. Order within both sections is preserved.
pub fn split_suggested(
    upcoming: Vec<EventListing>,
    joined_clubs: &HashSet<Uuid>,
    limit: usize,
) -> (Vec<EventListing>, Vec<EventListing>) {
    let mut suggested = Vec::new();
    let mut rest = Vec::new();
    for listing in upcoming {
        let from_joined_club = listing
            .event
            .club_id
            .map_or(false, |club_id| joined_clubs.contains(&club_id));
        if from_joined_club && suggested.len() < limit {
            suggested.push(listing);
        } else {
            rest.push(listing);
        }
    }
    (suggested, rest)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    suggested: Vec<EventCard>,
    events: Vec<EventCard>,
}

async fn list(
    auth: Option<ExtractAuth>,
    Extension(pool): Extension<DbPool>,
    Extension(views): Extension<Arc<Views>>,
) -> AppResult<Json<EventsPage>> {
    let today = queries::today();
    let upcoming: Vec<EventListing> = views
        .events
        .rows()
        .iter()
        .filter(|l| l.event.date >= today)
        .cloned()
        .collect();

    let conn = &mut pool.get().await?;
    let user_id = auth.map(|ExtractAuth(auth)| auth.user_id());
    let joined: HashSet<Uuid> = match user_id {
        Some(user_id) => queries::memberships::club_ids_for(conn, user_id)
            .await?
            .into_iter()
            .collect(),
        None => HashSet::new(),
    };

    let (suggested, rest) = split_suggested(upcoming, &joined, SUGGESTED_LIMIT);
    Ok(Json(EventsPage {
        suggested: cards(conn, user_id, suggested).await?,
        events: cards(conn, user_id, rest).await?,
    }))
}

async fn show(
    auth: Option<ExtractAuth>,
    Path(id): Path<Uuid>,
    Extension(pool): Extension<DbPool>,
) -> AppResult<Json<EventCard>> {
    let conn = &mut pool.get().await?;
    let listing = queries::events::find_with_club(conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("the event does not exist"))?;
    let user_id = auth.map(|ExtractAuth(auth)| auth.user_id());

    let card = cards(conn, user_id, vec![listing])
        .await?
        .pop()
        .ok_or_else(|| anyhow::anyhow!("`cards` should return one event"))?;
    Ok(Json(card))
}

async fn ensure_club_exists(conn: &mut AsyncPgConnection, club_id: Option<Uuid>) -> AppResult<()> {
    if let Some(club_id) = club_id {
        if queries::clubs::find(conn, club_id).await?.is_none() {
            return Err(AppError::not_found("the club does not exist"));
        }
    }
    Ok(())
}

async fn create(
    ExtractAuth(auth): ExtractAuth,
    Extension(pool): Extension<DbPool>,
    Extension(backend): Extension<BackendClient>,
    Extension(feed): Extension<ChangeFeed>,
    Json(mut form): Json<EventForm>,
) -> AppResult<(StatusCode, Json<Event>)> {
    form.validate()?;
    let image = form.image.take().map(|i| i.decode()).transpose()?;

    let conn = &mut pool.get().await?;
    ensure_club_exists(conn, form.club_id).await?;

    let image_url = match image {
        Some(image) => {
            Some(upload_image(&backend, &auth, EVENT_IMAGES_BUCKET, "events", image).await?)
        }
        None => None,
    };
    let new = form.into_new_event(auth.user_id(), image_url.clone())?;
    let event = after_upload(
        queries::events::insert(conn, new).await,
        image_url.as_deref(),
    )?;

    tracing::info!(event_id = %event.id, user_id = %auth.user_id(), "created event");
    feed.publish(Change::insert(Table::Events, &event));
    Ok((StatusCode::CREATED, Json(event)))
}

async fn edit(
    ExtractAuth(auth): ExtractAuth,
    Path(id): Path<Uuid>,
    Extension(pool): Extension<DbPool>,
    Extension(backend): Extension<BackendClient>,
    Extension(feed): Extension<ChangeFeed>,
    Json(form): Json<EventEditForm>,
) -> AppResult<Json<Event>> {
    let (mut changes, image) = form.into_changes()?;
    let image = image.map(|i| i.decode()).transpose()?;

    let conn = &mut pool.get().await?;
    let old = queries::events::find(conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("the event does not exist"))?;
    auth.ensure_owner_or_admin(conn, old.created_by).await?;
    ensure_club_exists(conn, changes.club_id.flatten()).await?;

    if let Some(image) = image {
        changes.image_url =
            Some(upload_image(&backend, &auth, EVENT_IMAGES_BUCKET, "events", image).await?);
    }
    let image_url = changes.image_url.clone();
    let event = after_upload(
        queries::events::update(conn, id, changes).await,
        image_url.as_deref(),
    )?;

    tracing::info!(event_id = %id, user_id = %auth.user_id(), "edited event");
    feed.publish(Change::update(Table::Events, Some(&old), &event));
    Ok(Json(event))
}

async fn remove(
    ExtractAuth(auth): ExtractAuth,
    Path(id): Path<Uuid>,
    Extension(pool): Extension<DbPool>,
    Extension(feed): Extension<ChangeFeed>,
) -> AppResult<StatusCode> {
    let conn = &mut pool.get().await?;
    let event = queries::events::find(conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("the event does not exist"))?;
    auth.ensure_owner_or_admin(conn, event.created_by).await?;

    let deleted = queries::events::delete(conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("the event does not exist"))?;

    tracing::info!(event_id = %id, user_id = %auth.user_id(), "deleted event");
    feed.publish(Change::delete(Table::Events, &deleted));
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationStatus {
    pub event_id: Uuid,
    pub registered_count: i64,
    pub spots_left: i64,
    pub is_registered: bool,
}

impl RegistrationStatus {
    fn new(event: &Event, registered_count: i64, is_registered: bool) -> RegistrationStatus {
        RegistrationStatus {
            event_id: event.id,
            registered_count,
            spots_left: (i64::from(event.capacity) - registered_count).max(0),
            is_registered,
        }
    }
}

async fn register(
    ExtractAuth(auth): ExtractAuth,
    Path(id): Path<Uuid>,
    Extension(pool): Extension<DbPool>,
) -> AppResult<(StatusCode, Json<RegistrationStatus>)> {
    let conn = &mut pool.get().await?;
    let event = queries::events::find(conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("the event does not exist"))?;

    match queries::registrations::register(conn, auth.user_id(), &event).await? {
        RegisterOutcome::Registered => {}
        RegisterOutcome::AlreadyRegistered => {
            return Err(conflict("You are already registered for this event."))
        }
        RegisterOutcome::Full => return Err(conflict("Sorry, this event is full.")),
    }

    let count = queries::registrations::count(conn, id).await?;
    tracing::info!(event_id = %id, user_id = %auth.user_id(), "registered for event");
    Ok((
        StatusCode::CREATED,
        Json(RegistrationStatus::new(&event, count, true)),
    ))
}

async fn unregister(
    ExtractAuth(auth): ExtractAuth,
    Path(id): Path<Uuid>,
    Extension(pool): Extension<DbPool>,
) -> AppResult<Json<RegistrationStatus>> {
    let conn = &mut pool.get().await?;
    let event = queries::events::find(conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("the event does not exist"))?;

    if !queries::registrations::unregister(conn, auth.user_id(), id).await? {
        return Err(AppError::not_found("You are not registered for this event."));
    }

    let count = queries::registrations::count(conn, id).await?;
    tracing::info!(event_id = %id, user_id = %auth.user_id(), "unregistered from event");
    Ok(Json(RegistrationStatus::new(&event, count, false)))
}

pub fn app() -> Router {
    Router::new()
        .route("/events", get(list).post(create))
        .route("/events/:id", get(show).put(edit).delete(remove))
        .route(
            "/events/:id/registration",
            post(register).delete(unregister),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, Utc};

    fn listing(title: &str, club_id: Option<Uuid>, capacity: i32) -> EventListing {
        EventListing {
            event: Event {
                id: Uuid::new_v4(),
                title: title.to_string(),
                description: "".to_string(),
                date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
                time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                location: "Hall".to_string(),
                capacity,
                image_url: None,
                club_id,
                created_by: None,
                created_at: Utc::now(),
            },
            club_name: None,
        }
    }

    fn titles(listings: &[EventListing]) -> Vec<&str> {
        listings.iter().map(|l| l.event.title.as_str()).collect()
    }

    #[test]
    fn suggestions_come_from_joined_clubs_only() {
        let (chess, drama) = (Uuid::new_v4(), Uuid::new_v4());
        let joined = HashSet::from([chess]);
        let upcoming = vec![
            listing("Open mic", Some(drama), 10),
            listing("Blitz night", Some(chess), 10),
            listing("Career fair", None, 10),
            listing("Simul", Some(chess), 10),
        ];

        let (suggested, rest) = split_suggested(upcoming, &joined, SUGGESTED_LIMIT);
        assert_eq!(titles(&suggested), ["Blitz night", "Simul"]);
        assert_eq!(titles(&rest), ["Open mic", "Career fair"]);
    }

    #[test]
    fn suggestions_are_capped() {
        let chess = Uuid::new_v4();
        let joined = HashSet::from([chess]);
        let upcoming = (0..5)
            .map(|i| listing(&format!("Round {i}"), Some(chess), 10))
            .collect();

        let (suggested, rest) = split_suggested(upcoming, &joined, SUGGESTED_LIMIT);
        assert_eq!(suggested.len(), 3);
        assert_eq!(titles(&rest), ["Round 3", "Round 4"]);

        let (none, all) = split_suggested(vec![listing("x", None, 1)], &HashSet::new(), 3);
        assert!(none.is_empty());
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn cards_never_show_negative_spots() {
        let card = EventCard::new(listing("Packed", None, 2), 3, false);
        assert_eq!(card.spots_left, 0);

        let card = EventCard::new(listing("Roomy", None, 40), 12, true);
        assert_eq!(card.spots_left, 28);
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["title"], "Roomy");
        assert_eq!(json["registeredCount"], 12);
        assert_eq!(json["isRegistered"], true);
    }
}

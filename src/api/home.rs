use crate::{
    error::AppResult,
    models::{Announcement, Club},
    queries::{self, events::EventListing},
    views::Views,
    DbPool,
};
use axum::{
    extract::Query,
    routing::get,
    Extension, Json, Router,
};
use chrono::{Datelike, NaiveDate};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

const LATEST_ANNOUNCEMENTS: i64 = 3;
const FEATURED_EVENTS: i64 = 3;

pub fn month_bounds(day: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(day.year(), day.month(), 1)?;
    let next = if day.month() == 12 {
        NaiveDate::from_ymd_opt(day.year() + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(day.year(), day.month() + 1, 1)?
    };
    Some((first, next.pred_opt()?))
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub is_past: bool,
}

pub fn calendar(dates: Vec<NaiveDate>, today: NaiveDate) -> Vec<CalendarDay> {
    dates
        .into_iter()
        .sorted_unstable()
        .dedup()
        .map(|date| CalendarDay {
            date,
            is_past: date < today,
        })
        .collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HomeStats {
    clubs: i64,
    events_this_month: i64,
    members: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HomePage {
    stats: HomeStats,
    latest_announcements: Vec<Announcement>,
    featured_events: Vec<EventListing>,
    calendar: Vec<CalendarDay>,
}

async fn home(Extension(pool): Extension<DbPool>) -> AppResult<Json<HomePage>> {
    let today = queries::today();
    let (first, last) =
        month_bounds(today).ok_or_else(|| anyhow::anyhow!("no month bounds for {today}"))?;
    let conn = &mut pool.get().await?;

    let stats = HomeStats {
        clubs: queries::clubs::count(conn).await?,
        events_this_month: queries::events::count_between(conn, first, last).await?,
        members: queries::profiles::count(conn).await?,
    };
    let latest_announcements =
        queries::announcements::latest(conn, LATEST_ANNOUNCEMENTS).await?;
    let featured_events =
        queries::events::upcoming_with_clubs(conn, today, Some(FEATURED_EVENTS)).await?;
    let dates = queries::events::dates_between(conn, first, last).await?;

    Ok(Json(HomePage {
        stats,
        latest_announcements,
        featured_events,
        calendar: calendar(dates, today),
    }))
}

#[derive(Deserialize)]
struct EventsAndClubsQuery {
    q: Option<String>,
    category: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsAndClubs {
    pub events: Vec<EventListing>,
    pub clubs: Vec<Club>,
}

fn contains_folded(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Upcoming events and clubs matching an optional text filter and club
/// category. Events take the category of the club hosting them; events
/// without a club drop out once a category is picked.
pub fn filter_events_and_clubs(
    events: &[EventListing],
    clubs: &[Club],
    today: NaiveDate,
    q: Option<&str>,
    category: Option<&str>,
) -> EventsAndClubs {
    let needle = q
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());
    let category = category.map(str::trim).filter(|c| !c.is_empty());
    let club_categories: HashMap<Uuid, &str> = clubs
        .iter()
        .map(|c| (c.id, c.category.as_str()))
        .collect();

    let events = events
        .iter()
        .filter(|l| l.event.date >= today)
        .filter(|l| match &needle {
            Some(n) => {
                contains_folded(&l.event.title, n) || contains_folded(&l.event.description, n)
            }
            None => true,
        })
        .filter(|l| match category {
            Some(category) => l
                .event
                .club_id
                .and_then(|id| club_categories.get(&id))
                .map_or(false, |c| c.eq_ignore_ascii_case(category)),
            None => true,
        })
        .cloned()
        .collect();

    let clubs = clubs
        .iter()
        .filter(|c| match &needle {
            Some(n) => contains_folded(&c.name, n) || contains_folded(&c.description, n),
            None => true,
        })
        .filter(|c| category.map_or(true, |category| c.category.eq_ignore_ascii_case(category)))
        .cloned()
        .collect();

    EventsAndClubs { events, clubs }
}

async fn events_and_clubs(
    Query(query): Query<EventsAndClubsQuery>,
    Extension(views): Extension<Arc<Views>>,
) -> Json<EventsAndClubs> {
    Json(filter_events_and_clubs(
        &views.events.rows(),
        &views.clubs.rows(),
        queries::today(),
        query.q.as_deref(),
        query.category.as_deref(),
    ))
}

pub fn app() -> Router {
    Router::new()
        .route("/home", get(home))
        .route("/events-and-clubs", get(events_and_clubs))
}

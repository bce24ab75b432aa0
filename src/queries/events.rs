use crate::{models::Event, schema::*};
use chrono::{NaiveDate, NaiveTime};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListing {
    #[serde(flatten)]
    pub event: Event,
    pub club_name: Option<String>,
}

impl From<(Event, Option<String>)> for EventListing {
    fn from((event, club_name): (Event, Option<String>)) -> Self {
        EventListing { event, club_name }
    }
}

#[derive(Debug, Clone, Queryable, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: Uuid,
    pub title: String,
    pub date: NaiveDate,
    pub location: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = events)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub location: String,
    pub capacity: i32,
    pub image_url: Option<String>,
    pub club_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, AsChangeset, Default)]
#[diesel(table_name = events)]
pub struct EventChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub location: Option<String>,
    pub capacity: Option<i32>,
    pub image_url: Option<String>,
    pub club_id: Option<Option<Uuid>>,
}

pub async fn list_with_clubs(conn: &mut AsyncPgConnection) -> QueryResult<Vec<EventListing>> {
    Ok(events::table
        .left_join(clubs::table)
        .select((events::all_columns, clubs::name.nullable()))
        .order((events::date.asc(), events::time.asc()))
        .load::<(Event, Option<String>)>(conn)
        .await?
        .into_iter()
        .map(EventListing::from)
        .collect())
}

pub async fn find_with_club(
    conn: &mut AsyncPgConnection,
    id: Uuid,
) -> QueryResult<Option<EventListing>> {
    Ok(events::table
        .left_join(clubs::table)
        .select((events::all_columns, clubs::name.nullable()))
        .filter(events::id.eq(id))
        .first::<(Event, Option<String>)>(conn)
        .await
        .optional()?
        .map(EventListing::from))
}

/// Events on or after `from`, soonest first. `None` means no limit.
pub async fn upcoming_with_clubs(
    conn: &mut AsyncPgConnection,
    from: NaiveDate,
    limit: Option<i64>,
) -> QueryResult<Vec<EventListing>> {
    let mut query = events::table
        .left_join(clubs::table)
        .select((events::all_columns, clubs::name.nullable()))
        .filter(events::date.ge(from))
        .order((events::date.asc(), events::time.asc()))
        .into_boxed();
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    Ok(query
        .load::<(Event, Option<String>)>(conn)
        .await?
        .into_iter()
        .map(EventListing::from)
        .collect())
}

pub async fn count_between(
    conn: &mut AsyncPgConnection,
    first: NaiveDate,
    last: NaiveDate,
) -> QueryResult<i64> {
    events::table
        .filter(events::date.between(first, last))
        .count()
        .get_result(conn)
        .await
}

pub async fn dates_between(
    conn: &mut AsyncPgConnection,
    first: NaiveDate,
    last: NaiveDate,
) -> QueryResult<Vec<NaiveDate>> {
    events::table
        .filter(events::date.between(first, last))
        .select(events::date)
        .order(events::date.asc())
        .load(conn)
        .await
}

pub async fn search(
    conn: &mut AsyncPgConnection,
    pattern: &str,
    limit: i64,
) -> QueryResult<Vec<EventListing>> {
    Ok(events::table
        .left_join(clubs::table)
        .select((events::all_columns, clubs::name.nullable()))
        .filter(
            events::title
                .ilike(pattern)
                .or(events::description.ilike(pattern)),
        )
        .order(events::date.asc())
        .limit(limit)
        .load::<(Event, Option<String>)>(conn)
        .await?
        .into_iter()
        .map(EventListing::from)
        .collect())
}

pub async fn find(conn: &mut AsyncPgConnection, id: Uuid) -> QueryResult<Option<Event>> {
    events::table.find(id).first(conn).await.optional()
}

pub async fn for_club(conn: &mut AsyncPgConnection, club_id: Uuid) -> QueryResult<Vec<Event>> {
    events::table
        .filter(events::club_id.eq(club_id))
        .order((events::date.asc(), events::time.asc()))
        .load(conn)
        .await
}

pub async fn created_by(conn: &mut AsyncPgConnection, user_id: Uuid) -> QueryResult<Vec<Event>> {
    events::table
        .filter(events::created_by.eq(user_id))
        .order(events::date.asc())
        .load(conn)
        .await
}

pub async fn registered_by(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
) -> QueryResult<Vec<EventSummary>> {
    event_registrations::table
        .inner_join(events::table)
        .filter(event_registrations::user_id.eq(user_id))
        .select((events::id, events::title, events::date, events::location))
        .order(events::date.asc())
        .load(conn)
        .await
}

pub async fn insert(conn: &mut AsyncPgConnection, new: NewEvent) -> QueryResult<Event> {
    diesel::insert_into(events::table)
        .values(new)
        .get_result(conn)
        .await
}

pub async fn update(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    changes: EventChanges,
) -> QueryResult<Event> {
    diesel::update(events::table.find(id))
        .set(changes)
        .get_result(conn)
        .await
}

/// Removes the event; its registrations go with it through the schema.
pub async fn delete(conn: &mut AsyncPgConnection, id: Uuid) -> QueryResult<Option<Event>> {
    diesel::delete(events::table.find(id))
        .get_result(conn)
        .await
        .optional()
}

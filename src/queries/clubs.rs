use crate::{models::Club, schema::*};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

#[derive(Debug, Insertable)]
#[diesel(table_name = clubs)]
pub struct NewClub {
    pub name: String,
    pub description: String,
    pub category: String,
    pub meeting_time: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub image_url: Option<String>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, AsChangeset, Default)]
#[diesel(table_name = clubs)]
pub struct ClubChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub meeting_time: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub email: Option<Option<String>>,
    pub website: Option<Option<String>>,
    pub image_url: Option<String>,
}

pub async fn list(conn: &mut AsyncPgConnection) -> QueryResult<Vec<Club>> {
    clubs::table.order(clubs::name.asc()).load(conn).await
}

pub async fn search(conn: &mut AsyncPgConnection, pattern: &str, limit: i64) -> QueryResult<Vec<Club>> {
    clubs::table
        .filter(clubs::name.ilike(pattern).or(clubs::description.ilike(pattern)))
        .order(clubs::name.asc())
        .limit(limit)
        .load(conn)
        .await
}

pub async fn find(conn: &mut AsyncPgConnection, id: Uuid) -> QueryResult<Option<Club>> {
    clubs::table.find(id).first(conn).await.optional()
}

pub async fn created_by(conn: &mut AsyncPgConnection, user_id: Uuid) -> QueryResult<Vec<Club>> {
    clubs::table
        .filter(clubs::created_by.eq(user_id))
        .order(clubs::created_at.desc())
        .load(conn)
        .await
}

pub async fn insert(conn: &mut AsyncPgConnection, new: NewClub) -> QueryResult<Club> {
    diesel::insert_into(clubs::table)
        .values(new)
        .get_result(conn)
        .await
}

pub async fn update(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    changes: ClubChanges,
) -> QueryResult<Club> {
    diesel::update(clubs::table.find(id))
        .set(changes)
        .get_result(conn)
        .await
}

/// Removes the club. The schema cascades to its events, their registrations
/// and the club's memberships.
pub async fn delete(conn: &mut AsyncPgConnection, id: Uuid) -> QueryResult<Option<Club>> {
    diesel::delete(clubs::table.find(id))
        .get_result(conn)
        .await
        .optional()
}

pub async fn count(conn: &mut AsyncPgConnection) -> QueryResult<i64> {
    clubs::table.count().get_result(conn).await
}

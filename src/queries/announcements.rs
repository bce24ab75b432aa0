use crate::{models::Announcement, schema::*};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

#[derive(Debug, Insertable)]
#[diesel(table_name = announcements)]
pub struct NewAnnouncement {
    pub title: String,
    pub message: String,
    pub category: String,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, AsChangeset, Default)]
#[diesel(table_name = announcements)]
pub struct AnnouncementChanges {
    pub title: Option<String>,
    pub message: Option<String>,
    pub category: Option<String>,
}

pub async fn list(conn: &mut AsyncPgConnection) -> QueryResult<Vec<Announcement>> {
    announcements::table
        .order(announcements::created_at.desc())
        .load(conn)
        .await
}

pub async fn latest(conn: &mut AsyncPgConnection, limit: i64) -> QueryResult<Vec<Announcement>> {
    announcements::table
        .order(announcements::created_at.desc())
        .limit(limit)
        .load(conn)
        .await
}

pub async fn search(
    conn: &mut AsyncPgConnection,
    pattern: &str,
    limit: i64,
) -> QueryResult<Vec<Announcement>> {
    announcements::table
        .filter(
            announcements::title
                .ilike(pattern)
                .or(announcements::message.ilike(pattern)),
        )
        .order(announcements::created_at.desc())
        .limit(limit)
        .load(conn)
        .await
}

pub async fn find(conn: &mut AsyncPgConnection, id: Uuid) -> QueryResult<Option<Announcement>> {
    announcements::table.find(id).first(conn).await.optional()
}

pub async fn insert(
    conn: &mut AsyncPgConnection,
    new: NewAnnouncement,
) -> QueryResult<Announcement> {
    diesel::insert_into(announcements::table)
        .values(new)
        .get_result(conn)
        .await
}

pub async fn update(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    changes: AnnouncementChanges,
) -> QueryResult<Announcement> {
    diesel::update(announcements::table.find(id))
        .set(changes)
        .get_result(conn)
        .await
}

pub async fn delete(
    conn: &mut AsyncPgConnection,
    id: Uuid,
) -> QueryResult<Option<Announcement>> {
    diesel::delete(announcements::table.find(id))
        .get_result(conn)
        .await
        .optional()
}

use crate::{models::Profile, schema::*};
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

#[derive(Debug, Insertable)]
#[diesel(table_name = profiles)]
pub struct NewProfile {
    pub id: Uuid,
    pub full_name: Option<String>,
}

#[derive(Debug, AsChangeset, Default)]
#[diesel(table_name = profiles)]
pub struct ProfileChanges {
    pub full_name: Option<String>,
    pub bio: Option<Option<String>>,
    pub avatar_url: Option<Option<String>>,
    pub date_of_birth: Option<Option<NaiveDate>>,
    pub phone: Option<Option<String>>,
}

pub async fn find(conn: &mut AsyncPgConnection, id: Uuid) -> QueryResult<Option<Profile>> {
    profiles::table.find(id).first(conn).await.optional()
}

pub async fn is_admin(conn: &mut AsyncPgConnection, id: Uuid) -> QueryResult<bool> {
    Ok(profiles::table
        .find(id)
        .select(profiles::is_admin)
        .first::<bool>(conn)
        .await
        .optional()?
        .unwrap_or(false))
}

/// Creates the profile row for a freshly signed-up user. An existing row is
/// returned untouched.
pub async fn insert(conn: &mut AsyncPgConnection, new: NewProfile) -> QueryResult<Profile> {
    let id = new.id;
    let inserted = diesel::insert_into(profiles::table)
        .values(new)
        .on_conflict(profiles::id)
        .do_nothing()
        .get_result::<Profile>(conn)
        .await
        .optional()?;

    match inserted {
        Some(profile) => Ok(profile),
        None => profiles::table.find(id).first(conn).await,
    }
}

pub async fn update(
    conn: &mut AsyncPgConnection,
    id: Uuid,
    changes: ProfileChanges,
) -> QueryResult<Option<Profile>> {
    diesel::update(profiles::table.find(id))
        .set(changes)
        .get_result(conn)
        .await
        .optional()
}

pub async fn count(conn: &mut AsyncPgConnection) -> QueryResult<i64> {
    profiles::table.count().get_result(conn).await
}

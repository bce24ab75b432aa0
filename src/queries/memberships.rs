use crate::{models::ClubMembership, schema::*};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use uuid::Uuid;

pub const UNKNOWN_USER: &str = "Unknown User";
pub const UNKNOWN_CLUB: &str = "Unknown Club";
pub const MEMBER_ROLE: &str = "member";

#[derive(Debug, Insertable)]
#[diesel(table_name = club_memberships)]
struct NewMembership<'a> {
    user_id: Uuid,
    club_id: Uuid,
    role: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubMember {
    pub user_id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedClub {
    pub id: Uuid,
    pub name: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub club_id: Uuid,
    pub role: String,
    pub joined_at: DateTime<Utc>,
    pub user_full_name: String,
    pub club_name: String,
}

pub fn display_name(full_name: Option<String>) -> String {
    full_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_USER.to_string())
}

/// Returns `false` when the user already was a member.
pub async fn join(conn: &mut AsyncPgConnection, user_id: Uuid, club_id: Uuid) -> QueryResult<bool> {
    let inserted = diesel::insert_into(club_memberships::table)
        .values(NewMembership {
            user_id,
            club_id,
            role: MEMBER_ROLE,
        })
        .on_conflict((club_memberships::user_id, club_memberships::club_id))
        .do_nothing()
        .execute(conn)
        .await?;
    Ok(inserted > 0)
}

/// Returns whether a membership was removed.
pub async fn leave(conn: &mut AsyncPgConnection, user_id: Uuid, club_id: Uuid) -> QueryResult<bool> {
    let removed = diesel::delete(
        club_memberships::table
            .filter(club_memberships::user_id.eq(user_id))
            .filter(club_memberships::club_id.eq(club_id)),
    )
    .execute(conn)
    .await?;
    Ok(removed > 0)
}

pub async fn club_ids_for(conn: &mut AsyncPgConnection, user_id: Uuid) -> QueryResult<Vec<Uuid>> {
    club_memberships::table
        .filter(club_memberships::user_id.eq(user_id))
        .select(club_memberships::club_id)
        .load(conn)
        .await
}

pub async fn is_member(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    club_id: Uuid,
) -> QueryResult<bool> {
    diesel::select(diesel::dsl::exists(
        club_memberships::table
            .filter(club_memberships::user_id.eq(user_id))
            .filter(club_memberships::club_id.eq(club_id)),
    ))
    .get_result(conn)
    .await
}

pub async fn members_of(conn: &mut AsyncPgConnection, club_id: Uuid) -> QueryResult<Vec<ClubMember>> {
    Ok(club_memberships::table
        .left_join(profiles::table)
        .filter(club_memberships::club_id.eq(club_id))
        .select((
            club_memberships::all_columns,
            profiles::full_name.nullable(),
            profiles::avatar_url.nullable(),
        ))
        .order(club_memberships::joined_at.asc())
        .load::<(ClubMembership, Option<String>, Option<String>)>(conn)
        .await?
        .into_iter()
        .map(|(membership, full_name, avatar_url)| ClubMember {
            user_id: membership.user_id,
            display_name: display_name(full_name),
            avatar_url,
            role: membership.role,
            joined_at: membership.joined_at,
        })
        .collect())
}

pub async fn joined_clubs(conn: &mut AsyncPgConnection, user_id: Uuid) -> QueryResult<Vec<JoinedClub>> {
    Ok(club_memberships::table
        .inner_join(clubs::table)
        .filter(club_memberships::user_id.eq(user_id))
        .select((clubs::id, clubs::name, club_memberships::joined_at))
        .order(club_memberships::joined_at.desc())
        .load::<(Uuid, String, DateTime<Utc>)>(conn)
        .await?
        .into_iter()
        .map(|(id, name, joined_at)| JoinedClub { id, name, joined_at })
        .collect())
}

pub async fn all_with_names(conn: &mut AsyncPgConnection) -> QueryResult<Vec<MembershipRow>> {
    Ok(club_memberships::table
        .left_join(clubs::table)
        .left_join(profiles::table)
        .select((
            club_memberships::all_columns,
            profiles::full_name.nullable(),
            clubs::name.nullable(),
        ))
        .order((clubs::name.nullable().asc(), club_memberships::joined_at.asc()))
        .load::<(ClubMembership, Option<String>, Option<String>)>(conn)
        .await?
        .into_iter()
        .map(|(membership, full_name, club_name)| MembershipRow {
            id: membership.id,
            user_id: membership.user_id,
            club_id: membership.club_id,
            role: membership.role,
            joined_at: membership.joined_at,
            user_full_name: display_name(full_name),
            club_name: club_name.unwrap_or_else(|| UNKNOWN_CLUB.to_string()),
        })
        .collect())
}

pub async fn remove(conn: &mut AsyncPgConnection, id: Uuid) -> QueryResult<Option<ClubMembership>> {
    diesel::delete(club_memberships::table.find(id))
        .get_result(conn)
        .await
        .optional()
}

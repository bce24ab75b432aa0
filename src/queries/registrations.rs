use crate::{models::Event, schema::*};
use diesel::{dsl::count_star, prelude::*};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Insertable)]
#[diesel(table_name = event_registrations)]
struct NewRegistration {
    user_id: Uuid,
    event_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    AlreadyRegistered,
    Full,
}

/// Registered counts for the given events in one grouped query. Events with
/// no registrations are absent from the map.
pub async fn counts(
    conn: &mut AsyncPgConnection,
    event_ids: &[Uuid],
) -> QueryResult<HashMap<Uuid, i64>> {
    if event_ids.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(event_registrations::table
        .filter(event_registrations::event_id.eq_any(event_ids))
        .group_by(event_registrations::event_id)
        .select((event_registrations::event_id, count_star()))
        .load::<(Uuid, i64)>(conn)
        .await?
        .into_iter()
        .collect())
}

pub async fn count(conn: &mut AsyncPgConnection, event_id: Uuid) -> QueryResult<i64> {
    event_registrations::table
        .filter(event_registrations::event_id.eq(event_id))
        .count()
        .get_result(conn)
        .await
}

pub async fn registered_among(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    event_ids: &[Uuid],
) -> QueryResult<HashSet<Uuid>> {
    if event_ids.is_empty() {
        return Ok(HashSet::new());
    }
    Ok(event_registrations::table
        .filter(event_registrations::user_id.eq(user_id))
        .filter(event_registrations::event_id.eq_any(event_ids))
        .select(event_registrations::event_id)
        .load::<Uuid>(conn)
        .await?
        .into_iter()
        .collect())
}

pub async fn is_registered(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    event_id: Uuid,
) -> QueryResult<bool> {
    Ok(!registered_among(conn, user_id, &[event_id]).await?.is_empty())
}

/// Registers the user unless they already are or the event is at capacity.
///
/// The capacity check and the insert are separate statements, so concurrent
/// registrations can still overshoot by a few seats. Duplicates cannot: the
/// `(user_id, event_id)` unique constraint turns them into a no-op.
pub async fn register(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    event: &Event,
) -> QueryResult<RegisterOutcome> {
    if is_registered(conn, user_id, event.id).await? {
        return Ok(RegisterOutcome::AlreadyRegistered);
    }
    if count(conn, event.id).await? >= i64::from(event.capacity) {
        return Ok(RegisterOutcome::Full);
    }

    let inserted = diesel::insert_into(event_registrations::table)
        .values(NewRegistration {
            user_id,
            event_id: event.id,
        })
        .on_conflict((event_registrations::user_id, event_registrations::event_id))
        .do_nothing()
        .execute(conn)
        .await?;

    Ok(if inserted == 0 {
        RegisterOutcome::AlreadyRegistered
    } else {
        RegisterOutcome::Registered
    })
}

/// Returns whether a registration was removed.
pub async fn unregister(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    event_id: Uuid,
) -> QueryResult<bool> {
    let removed = diesel::delete(
        event_registrations::table
            .filter(event_registrations::user_id.eq(user_id))
            .filter(event_registrations::event_id.eq(event_id)),
    )
    .execute(conn)
    .await?;
    Ok(removed > 0)
}

//! Per-user dashboard: registered events, joined clubs, and everything the
//! user created. Each section is loaded on its own; one failing query only
//! empties its own section.

use crate::{
    models::{Club, Event},
    queries::{self, events::EventSummary, memberships::JoinedClub},
};
use chrono::{DateTime, Utc};
use diesel::QueryResult;
use diesel_async::AsyncPgConnection;
use serde::Serialize;
use uuid::Uuid;

pub const NO_REGISTRATIONS: &str = "You haven't registered for any events yet.";
pub const NO_CLUBS: &str = "You haven't joined any clubs yet.";
pub const NO_CREATED_ITEMS: &str = "You haven't created any events or clubs yet.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_message: Option<&'static str>,
}

impl<T> Section<T> {
    fn settle(name: &str, result: QueryResult<Vec<T>>, empty_message: &'static str) -> Section<T> {
        let items = result.unwrap_or_else(|e| {
            tracing::error!(section = name, "failed to load dashboard section: {e}");
            Vec::new()
        });
        let empty_message = items.is_empty().then_some(empty_message);
        Section {
            items,
            empty_message,
        }
    }
}

/// Something the user created: the full row, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CreatedItem {
    Event(Event),
    Club(Club),
}

impl CreatedItem {
    pub fn id(&self) -> Uuid {
        match self {
            CreatedItem::Event(event) => event.id,
            CreatedItem::Club(club) => club.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CreatedItem::Event(event) => &event.title,
            CreatedItem::Club(club) => &club.name,
        }
    }

    fn created_at(&self) -> DateTime<Utc> {
        match self {
            CreatedItem::Event(event) => event.created_at,
            CreatedItem::Club(club) => club.created_at,
        }
    }
}

pub fn merge_created(events: Vec<Event>, clubs: Vec<Club>) -> Vec<CreatedItem> {
    let mut items: Vec<CreatedItem> = events
        .into_iter()
        .map(CreatedItem::Event)
        .chain(clubs.into_iter().map(CreatedItem::Club))
        .collect();
    items.sort_by_key(|item| std::cmp::Reverse(item.created_at()));
    items
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub registered_events: Section<EventSummary>,
    pub joined_clubs: Section<JoinedClub>,
    pub created_items: Section<CreatedItem>,
}

pub async fn load(conn: &mut AsyncPgConnection, user_id: Uuid) -> Dashboard {
    let registered = queries::events::registered_by(conn, user_id).await;
    let joined = queries::memberships::joined_clubs(conn, user_id).await;
    let created = match queries::events::created_by(conn, user_id).await {
        Ok(events) => queries::clubs::created_by(conn, user_id)
            .await
            .map(|clubs| merge_created(events, clubs)),
        Err(e) => Err(e),
    };

    Dashboard {
        registered_events: Section::settle("registered events", registered, NO_REGISTRATIONS),
        joined_clubs: Section::settle("joined clubs", joined, NO_CLUBS),
        created_items: Section::settle("created items", created, NO_CREATED_ITEMS),
    }
}

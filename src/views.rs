//! Server-wide list views for the events, clubs and announcements pages.

use crate::{
    live::{ListSource, ListView},
    models::{Announcement, Club},
    queries::{self, events::EventListing},
    realtime::{ChangeFeed, RealtimeStore, Table},
    DbPool,
};
use async_trait::async_trait;
use std::sync::Arc;

struct EventsSource(DbPool);

#[async_trait]
impl ListSource<EventListing> for EventsSource {
    async fn fetch(&self) -> anyhow::Result<Vec<EventListing>> {
        let conn = &mut self.0.get().await?;
        Ok(queries::events::list_with_clubs(conn).await?)
    }
}

struct ClubsSource(DbPool);

#[async_trait]
impl ListSource<Club> for ClubsSource {
    async fn fetch(&self) -> anyhow::Result<Vec<Club>> {
        let conn = &mut self.0.get().await?;
        Ok(queries::clubs::list(conn).await?)
    }
}

struct AnnouncementsSource(DbPool);

#[async_trait]
impl ListSource<Announcement> for AnnouncementsSource {
    async fn fetch(&self) -> anyhow::Result<Vec<Announcement>> {
        let conn = &mut self.0.get().await?;
        Ok(queries::announcements::list(conn).await?)
    }
}

pub struct Views {
    pub events: Arc<ListView<EventListing>>,
    pub clubs: Arc<ListView<Club>>,
    pub announcements: Arc<ListView<Announcement>>,
    // owns the channels the views listen on
    _realtime: RealtimeStore,
}

impl Views {
    /// Builds the views over the database, subscribes them to `feed` and
    /// loads them once.
    pub async fn mount(pool: DbPool, feed: ChangeFeed) -> Arc<Views> {
        Views::mount_sources(
            Arc::new(EventsSource(pool.clone())),
            Arc::new(ClubsSource(pool.clone())),
            Arc::new(AnnouncementsSource(pool)),
            feed,
        )
        .await
    }

    /// A view whose first load fails is re-fetched on its next change.
    pub async fn mount_sources(
        events: Arc<dyn ListSource<EventListing>>,
        clubs: Arc<dyn ListSource<Club>>,
        announcements: Arc<dyn ListSource<Announcement>>,
        feed: ChangeFeed,
    ) -> Arc<Views> {
        let realtime = RealtimeStore::new(feed);
        let events = ListView::<EventListing>::new("events", events);
        let clubs = ListView::<Club>::new("clubs", clubs);
        let announcements = ListView::<Announcement>::new("announcements", announcements);

        // events and clubs rows are joins, so they are re-fetched
        events.mount(&realtime, Table::Events).await;
        // club names show up on event rows
        realtime
            .on_change(Table::Clubs, {
                let (clubs, events) = (clubs.clone(), events.clone());
                move |_| {
                    let (clubs, events) = (clubs.clone(), events.clone());
                    tokio::spawn(async move {
                        let _ = tokio::join!(clubs.refresh(), events.refresh());
                    });
                }
            })
            .await;
        realtime.subscribe(Table::Clubs).await;
        announcements
            .mount_patching(&realtime, Table::Announcements)
            .await;

        let _ = tokio::join!(events.refresh(), clubs.refresh(), announcements.refresh());
        for (name, loaded) in [
            ("events", events.is_loaded()),
            ("clubs", clubs.is_loaded()),
            ("announcements", announcements.is_loaded()),
        ] {
            if !loaded {
                tracing::warn!(view = name, "list view starts empty");
            }
        }

        Arc::new(Views {
            events,
            clubs,
            announcements,
            _realtime: realtime,
        })
    }
}

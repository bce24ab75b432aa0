//! Runs the queries against a real Postgres. Set `TEST_DATABASE_URL` to
//! enable; every test works in a throwaway schema of its own.

use campus_hub::{
    dashboard::{self, CreatedItem},
    queries::{
        self,
        clubs::NewClub,
        events::NewEvent,
        profiles::NewProfile,
        registrations::RegisterOutcome,
    },
    search,
};
use chrono::{Duration, NaiveTime};
use diesel_async::{AsyncConnection, AsyncPgConnection, SimpleAsyncConnection};
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("../migrations/2024-03-01-000000_create_campus_hub/up.sql");

struct TestDb {
    conn: AsyncPgConnection,
    schema: String,
}

impl TestDb {
    async fn connect() -> Option<TestDb> {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL is not set, skipping");
            return None;
        };
        let mut conn = AsyncPgConnection::establish(&url).await.unwrap();
        let schema = format!("campus_hub_test_{}", Uuid::new_v4().simple());
        conn.batch_execute(&format!(
            "CREATE SCHEMA {schema}; SET search_path TO {schema}, public;"
        ))
        .await
        .unwrap();
        conn.batch_execute(SCHEMA_SQL).await.unwrap();
        Some(TestDb { conn, schema })
    }

    async fn finish(mut self) {
        self.conn
            .batch_execute(&format!("DROP SCHEMA {} CASCADE;", self.schema))
            .await
            .unwrap();
    }

    async fn profile(&mut self, name: &str) -> Uuid {
        queries::profiles::insert(
            &mut self.conn,
            NewProfile {
                id: Uuid::new_v4(),
                full_name: Some(name.to_string()),
            },
        )
        .await
        .unwrap()
        .id
    }

    async fn club(&mut self, name: &str, created_by: Uuid) -> Uuid {
        queries::clubs::insert(
            &mut self.conn,
            NewClub {
                name: name.to_string(),
                description: format!("All about {name}"),
                category: "Academic".to_string(),
                meeting_time: None,
                location: None,
                email: None,
                website: None,
                image_url: None,
                created_by: Some(created_by),
            },
        )
        .await
        .unwrap()
        .id
    }

    async fn event(
        &mut self,
        title: &str,
        capacity: i32,
        club_id: Option<Uuid>,
        created_by: Uuid,
    ) -> Uuid {
        queries::events::insert(
            &mut self.conn,
            NewEvent {
                title: title.to_string(),
                description: "See you there".to_string(),
                date: queries::today() + Duration::days(7),
                time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
                location: "Library".to_string(),
                capacity,
                image_url: None,
                club_id,
                created_by: Some(created_by),
            },
        )
        .await
        .unwrap()
        .id
    }
}

#[tokio::test]
async fn joining_twice_keeps_one_membership() {
    let Some(mut db) = TestDb::connect().await else { return };
    let ada = db.profile("Ada").await;
    let club = db.club("Math Circle", ada).await;

    assert!(queries::memberships::join(&mut db.conn, ada, club).await.unwrap());
    assert!(!queries::memberships::join(&mut db.conn, ada, club).await.unwrap());

    assert_eq!(
        queries::memberships::club_ids_for(&mut db.conn, ada).await.unwrap(),
        vec![club]
    );
    let members = queries::memberships::members_of(&mut db.conn, club).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].display_name, "Ada");

    assert!(queries::memberships::leave(&mut db.conn, ada, club).await.unwrap());
    assert!(!queries::memberships::is_member(&mut db.conn, ada, club).await.unwrap());
    db.finish().await;
}

#[tokio::test]
async fn registrations_respect_capacity_and_unregister_once() {
    let Some(mut db) = TestDb::connect().await else { return };
    let (a, b, c) = (
        db.profile("A").await,
        db.profile("B").await,
        db.profile("C").await,
    );
    let event_id = db.event("Study jam", 2, None, a).await;
    let event = queries::events::find(&mut db.conn, event_id).await.unwrap().unwrap();

    assert_eq!(
        queries::registrations::register(&mut db.conn, a, &event).await.unwrap(),
        RegisterOutcome::Registered
    );
    assert_eq!(
        queries::registrations::register(&mut db.conn, a, &event).await.unwrap(),
        RegisterOutcome::AlreadyRegistered
    );
    assert_eq!(
        queries::registrations::register(&mut db.conn, b, &event).await.unwrap(),
        RegisterOutcome::Registered
    );
    assert_eq!(
        queries::registrations::register(&mut db.conn, c, &event).await.unwrap(),
        RegisterOutcome::Full
    );

    let before = queries::registrations::count(&mut db.conn, event_id).await.unwrap();
    assert!(queries::registrations::unregister(&mut db.conn, a, event_id).await.unwrap());
    let after = queries::registrations::count(&mut db.conn, event_id).await.unwrap();
    assert_eq!(before - after, 1);
    assert!(!queries::registrations::is_registered(&mut db.conn, a, event_id).await.unwrap());
    assert!(!queries::registrations::unregister(&mut db.conn, a, event_id).await.unwrap());

    let counts = queries::registrations::counts(&mut db.conn, &[event_id]).await.unwrap();
    assert_eq!(counts.get(&event_id), Some(&1));
    db.finish().await;
}

#[tokio::test]
async fn deleting_a_club_takes_its_events_along() {
    let Some(mut db) = TestDb::connect().await else { return };
    let owner = db.profile("Owner").await;
    let club = db.club("Debate", owner).await;
    let event = db.event("Finals", 30, Some(club), owner).await;
    queries::memberships::join(&mut db.conn, owner, club).await.unwrap();

    let before = dashboard::load(&mut db.conn, owner).await;
    assert_eq!(before.created_items.items.len(), 2);
    assert_eq!(before.joined_clubs.items.len(), 1);

    assert!(queries::clubs::delete(&mut db.conn, club).await.unwrap().is_some());
    assert!(queries::events::find(&mut db.conn, event).await.unwrap().is_none());

    let after = dashboard::load(&mut db.conn, owner).await;
    assert!(!after
        .created_items
        .items
        .iter()
        .any(|item| matches!(item, CreatedItem::Club(_)) && item.id() == club));
    assert!(after.created_items.items.is_empty());
    assert_eq!(after.created_items.empty_message, Some(dashboard::NO_CREATED_ITEMS));
    assert!(after.joined_clubs.items.is_empty());
    db.finish().await;
}

#[tokio::test]
async fn search_reports_no_results_explicitly() {
    let Some(mut db) = TestDb::connect().await else { return };
    let owner = db.profile("Owner").await;
    db.club("Astronomy Society", owner).await;

    let found = search::search(&mut db.conn, "astro").await.unwrap();
    assert_eq!(found.clubs.len(), 1);
    assert!(!found.no_results);

    let nothing = search::search(&mut db.conn, "zzzz-no-such-thing").await.unwrap();
    assert!(nothing.no_results);
    assert!(nothing.events.is_empty() && nothing.clubs.is_empty());
    db.finish().await;
}
